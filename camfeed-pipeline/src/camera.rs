//! Camera lifecycle
//!
//! `start` walks the backend through device selection, open, session setup
//! and the repeating preview request, then runs the frame pipeline and the
//! throughput counter. `stop` tears everything down in reverse and is safe to
//! call at any point.

use crate::config::CameraConfig;
use crate::device::{
    find_device, CameraBackend, CameraDevice, CaptureRequest, CaptureSession, DeviceCallback,
    DeviceEvent, DeviceId, FrameSource,
};
use crate::error::{CameraError, DeviceError};
use crate::oneshot::{oneshot, Canceller, Completer};
use crate::pipeline::{FrameCallback, FramePipeline, FrameProcessor, PipelineStats};
use crate::throughput::ThroughputCounter;
use camfeed_frame::{DisplayImage, Nv21Rotator, OrientationTransform};
use parking_lot::Mutex;
use std::sync::Arc;

/// Receives one frames-per-interval sample, on the ticker thread
pub type RateCallback = Arc<dyn Fn(u64) + Send + Sync>;

type SessionOf<B> = <<B as CameraBackend>::Device as CameraDevice>::Session;

/// Aborts a `Camera::start` that is blocked waiting for the device to open.
///
/// Clone it out before calling `start` and use it from another thread. A
/// cancel that lands while no open is in flight is remembered and aborts the
/// next open instead; `Camera::stop` forgets it.
#[derive(Clone, Default)]
pub struct CancelHandle {
    state: Arc<Mutex<CancelState>>,
}

#[derive(Default)]
struct CancelState {
    requested: bool,
    active: Option<Canceller>,
}

impl CancelHandle {
    /// Returns false only if the in-flight open already resolved
    pub fn cancel(&self) -> bool {
        let mut state = self.state.lock();
        match state.active.as_ref() {
            Some(canceller) => canceller.cancel(),
            None => {
                state.requested = true;
                true
            }
        }
    }

    /// Install the canceller for an open about to be issued. Returns false,
    /// consuming the request, if a cancel is already pending.
    fn arm(&self, canceller: Canceller) -> bool {
        let mut state = self.state.lock();
        if std::mem::take(&mut state.requested) {
            return false;
        }
        state.active = Some(canceller);
        true
    }

    fn disarm(&self) {
        self.state.lock().active = None;
    }

    fn clear(&self) {
        self.state.lock().requested = false;
    }
}

pub struct Camera<B: CameraBackend> {
    backend: Arc<B>,
    config: CameraConfig,
    transform: Arc<dyn OrientationTransform>,
    on_frame: Option<FrameCallback>,
    on_rate: Option<RateCallback>,
    counter: ThroughputCounter,
    cancel: CancelHandle,
    session: Option<SessionOf<B>>,
    device: Option<B::Device>,
    source: Option<Arc<B::Source>>,
    pipeline: Option<FramePipeline>,
    running: bool,
}

impl<B: CameraBackend> Camera<B> {
    pub fn new(backend: Arc<B>, config: CameraConfig) -> Self {
        let counter = ThroughputCounter::new(config.rate_interval);
        Self {
            backend,
            config,
            transform: Arc::new(Nv21Rotator),
            on_frame: None,
            on_rate: None,
            counter,
            cancel: CancelHandle::default(),
            session: None,
            device: None,
            source: None,
            pipeline: None,
            running: false,
        }
    }

    /// Replace the default NV21 rotator
    pub fn with_transform(mut self, transform: Arc<dyn OrientationTransform>) -> Self {
        self.transform = transform;
        self
    }

    /// Consumer for displayable frames. Takes effect on the next `start`.
    pub fn on_frame<F>(&mut self, on_frame: F) -> &mut Self
    where
        F: Fn(DisplayImage) + Send + Sync + 'static,
    {
        self.on_frame = Some(Arc::new(on_frame));
        self
    }

    /// Consumer for throughput samples. Takes effect on the next `start`.
    pub fn on_rate<F>(&mut self, on_rate: F) -> &mut Self
    where
        F: Fn(u64) + Send + Sync + 'static,
    {
        self.on_rate = Some(Arc::new(on_rate));
        self
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        self.cancel.clone()
    }

    pub fn config(&self) -> &CameraConfig {
        &self.config
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn throughput(&self) -> &ThroughputCounter {
        &self.counter
    }

    pub fn pipeline_stats(&self) -> Option<PipelineStats> {
        self.pipeline.as_ref().map(FramePipeline::stats)
    }

    /// Open the configured camera and start streaming.
    ///
    /// Blocks until the backend reports the open outcome. On failure,
    /// everything acquired so far is released before the error is returned.
    pub fn start(&mut self) -> Result<(), CameraError> {
        if self.running {
            return Err(CameraError::AlreadyRunning);
        }
        self.config.validate()?;

        match self.try_start() {
            Ok(()) => {
                self.running = true;
                Ok(())
            }
            Err(e) => {
                log::error!("Camera start failed: {}", e);
                self.stop();
                Err(e)
            }
        }
    }

    fn try_start(&mut self) -> Result<(), CameraError> {
        let facing = self.config.facing;
        let id = find_device(&*self.backend, facing)
            .ok_or(CameraError::NoMatchingDevice { facing })?;
        let target = self.config.output_target();

        let source = self
            .backend
            .create_frame_source(&target)
            .map_err(CameraError::FrameSource)?;
        let source = Arc::new(source);
        self.source = Some(source.clone());

        let device = self.open_device(&id)?;
        let device = self.device.insert(device);
        log::info!("Camera {} opened ({} facing)", id, facing);

        let session = device
            .create_capture_session(&target)
            .map_err(CameraError::Session)?;
        let session = self.session.insert(session);

        let on_rate = self.on_rate.clone();
        self.counter.start(move |rate| {
            if let Some(on_rate) = &on_rate {
                on_rate(rate);
            }
        })?;

        let processor = FrameProcessor::new(facing, self.transform.clone(), self.counter.tally())
            .with_callback(self.on_frame.clone());
        self.pipeline = Some(FramePipeline::spawn(source, processor, &self.config)?);

        session
            .set_repeating_request(CaptureRequest::preview(target))
            .map_err(CameraError::Session)?;

        log::info!(
            "Camera {} streaming {}x{} {:?}",
            id,
            target.width,
            target.height,
            target.format
        );
        Ok(())
    }

    fn open_device(&self, id: &DeviceId) -> Result<B::Device, CameraError> {
        let (completer, pending) = oneshot::<Result<B::Device, CameraError>>();
        if !self.cancel.arm(pending.canceller()) {
            log::info!("Open of camera {} cancelled before it was issued", id);
            return Err(CameraError::OpenCancelled);
        }

        let callback = open_callback(id.clone(), completer);

        log::info!("Opening camera {}", id);
        self.backend.open(id, callback);

        let outcome = pending.wait();
        self.cancel.disarm();

        match outcome {
            Ok(result) => result,
            Err(_) => Err(CameraError::OpenCancelled),
        }
    }

    /// Release everything `start` acquired: session, device, frame source,
    /// pipeline worker, then the throughput counter.
    pub fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.close();
        }
        if let Some(mut device) = self.device.take() {
            device.close();
        }
        if let Some(source) = self.source.take() {
            source.close();
        }
        if let Some(mut pipeline) = self.pipeline.take() {
            if let Err(e) = pipeline.shutdown(self.config.join_timeout) {
                log::error!("{}", e);
            }
        }
        self.counter.stop();
        self.cancel.clear();

        if std::mem::take(&mut self.running) {
            log::info!("Camera stopped");
        }
    }
}

/// Route backend events for one open request into its completion slot.
///
/// Events arriving after the slot resolved are only logged, except a late
/// device, which is closed so it cannot leak.
fn open_callback<D: CameraDevice>(
    id: DeviceId,
    completer: Completer<Result<D, CameraError>>,
) -> DeviceCallback<D> {
    Box::new(move |event: DeviceEvent<D>| match event {
        DeviceEvent::Opened(device) => {
            if let Err(Ok(mut late)) = completer.complete(Ok(device)) {
                log::warn!("Camera {} opened after the wait ended, closing it", id);
                late.close();
            }
        }
        DeviceEvent::Disconnected => {
            let outcome = Err(CameraError::Disconnected { id: id.clone() });
            if completer.complete(outcome).is_err() {
                log::warn!("Camera {} disconnected", id);
            }
        }
        DeviceEvent::Error(code) => {
            let outcome = Err(CameraError::DeviceOpen {
                id: id.clone(),
                source: DeviceError::Hardware(code),
            });
            if completer.complete(outcome).is_err() {
                log::error!("Camera {} reported error {}", id, code);
            }
        }
    })
}

impl<B: CameraBackend> Drop for Camera<B> {
    fn drop(&mut self) {
        self.stop();
    }
}
