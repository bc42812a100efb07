//! Frame pipeline worker
//!
//! One dedicated thread polls the frame source, packs each frame, orients it
//! and hands it to the consumer. Frames are handled strictly one at a time
//! and every acquired frame is released exactly once, whatever happens to it.

use crate::config::CameraConfig;
use crate::device::FrameSource;
use crate::error::ShutdownError;
use crate::throughput::FrameTally;
use camfeed_frame::{reformat, DisplayImage, Facing, OrientationTransform, RawFrame};
use crossbeam::channel::{self, Receiver, RecvTimeoutError};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Consumer of displayable frames, called on the pipeline thread
pub type FrameCallback = Arc<dyn Fn(DisplayImage) + Send + Sync>;

/// What happened to one frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    Delivered,
    Malformed,
    TransformFailed,
}

#[derive(Default)]
struct Counters {
    processed: AtomicU64,
    malformed: AtomicU64,
    transform_failed: AtomicU64,
    idle_ticks: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PipelineStats {
    pub processed: u64,
    pub malformed: u64,
    pub transform_failed: u64,
    pub idle_ticks: u64,
}

impl Counters {
    fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            processed: self.processed.load(Ordering::Relaxed),
            malformed: self.malformed.load(Ordering::Relaxed),
            transform_failed: self.transform_failed.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
        }
    }
}

/// Per-frame step: pack, orient, deliver, count, release
pub struct FrameProcessor {
    facing: Facing,
    transform: Arc<dyn OrientationTransform>,
    on_frame: Option<FrameCallback>,
    tally: FrameTally,
    counters: Arc<Counters>,
}

impl FrameProcessor {
    pub fn new(facing: Facing, transform: Arc<dyn OrientationTransform>, tally: FrameTally) -> Self {
        Self {
            facing,
            transform,
            on_frame: None,
            tally,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with_callback(mut self, on_frame: Option<FrameCallback>) -> Self {
        self.on_frame = on_frame;
        self
    }

    pub fn process(&self, frame: RawFrame) -> FrameOutcome {
        let packed = match reformat(&frame) {
            Ok(packed) => packed,
            Err(e) => {
                log::warn!("Dropping frame {}: {}", frame.timestamp(), e);
                self.counters.malformed.fetch_add(1, Ordering::Relaxed);
                frame.release();
                return FrameOutcome::Malformed;
            }
        };

        let image = match self.transform.apply(packed, self.facing) {
            Ok(image) => image.with_timestamp(frame.timestamp()),
            Err(e) => {
                log::warn!("Orientation failed for frame {}: {}", frame.timestamp(), e);
                self.counters.transform_failed.fetch_add(1, Ordering::Relaxed);
                frame.release();
                return FrameOutcome::TransformFailed;
            }
        };

        if let Some(on_frame) = &self.on_frame {
            on_frame(image);
        }
        self.tally.record();
        self.counters.processed.fetch_add(1, Ordering::Relaxed);
        frame.release();

        FrameOutcome::Delivered
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }
}

struct Worker {
    handle: JoinHandle<()>,
    // Disconnects when the worker thread exits
    exited: Receiver<()>,
}

/// Background frame pipeline
pub struct FramePipeline {
    counters: Arc<Counters>,
    running: Arc<AtomicBool>,
    join_timeout: Duration,
    worker: Option<Worker>,
}

impl FramePipeline {
    /// Spawn the worker thread polling `source`
    pub fn spawn<S: FrameSource>(
        source: Arc<S>,
        processor: FrameProcessor,
        config: &CameraConfig,
    ) -> io::Result<Self> {
        let counters = processor.counters.clone();
        let running = Arc::new(AtomicBool::new(true));
        let (exit_tx, exited) = channel::bounded::<()>(0);

        let idle_backoff = config.idle_backoff;
        let core = config.worker_core;
        let worker_running = running.clone();

        let handle = thread::Builder::new()
            .name("camfeed-pipeline".to_string())
            .spawn(move || {
                let _exit = exit_tx;

                if let Some(id) = core {
                    if !core_affinity::set_for_current(core_affinity::CoreId { id }) {
                        log::warn!("Could not pin pipeline worker to core {}", id);
                    }
                }

                log::info!("Frame pipeline started");
                while worker_running.load(Ordering::Acquire) {
                    match source.try_acquire_latest() {
                        Some(frame) => {
                            processor.process(frame);
                        }
                        None => {
                            processor.counters.idle_ticks.fetch_add(1, Ordering::Relaxed);
                            thread::sleep(idle_backoff);
                        }
                    }
                }
                log::info!("Frame pipeline exiting");
            })?;

        Ok(Self {
            counters,
            running,
            join_timeout: config.join_timeout,
            worker: Some(Worker { handle, exited }),
        })
    }

    pub fn is_running(&self) -> bool {
        self.worker.is_some()
    }

    pub fn stats(&self) -> PipelineStats {
        self.counters.snapshot()
    }

    /// Stop the worker and wait up to `timeout` for it to exit.
    ///
    /// On timeout the thread is detached and `Interrupted` is returned; the
    /// wait is not retried.
    pub fn shutdown(&mut self, timeout: Duration) -> Result<(), ShutdownError> {
        self.running.store(false, Ordering::Release);

        let Some(worker) = self.worker.take() else {
            return Ok(());
        };

        match worker.exited.recv_timeout(timeout) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => worker
                .handle
                .join()
                .map_err(|_| ShutdownError::Panicked),
            Err(RecvTimeoutError::Timeout) => Err(ShutdownError::Interrupted { waited: timeout }),
        }
    }
}

impl Drop for FramePipeline {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown(self.join_timeout) {
            log::error!("{}", e);
        }
    }
}
