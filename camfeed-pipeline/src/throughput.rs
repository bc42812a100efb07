//! Frames-per-interval counter
//!
//! The pipeline worker bumps an atomic per delivered frame; a ticker thread
//! swaps it to zero once per interval and reports the previous value.

use crossbeam::channel::{self, Sender};
use parking_lot::Mutex;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Cheap handle for recording processed frames
#[derive(Clone)]
pub struct FrameTally {
    count: Arc<AtomicU64>,
}

impl FrameTally {
    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }
}

struct Ticker {
    stop_tx: Sender<()>,
    handle: JoinHandle<()>,
}

/// Samples processed frames once per fixed interval
pub struct ThroughputCounter {
    count: Arc<AtomicU64>,
    interval: Duration,
    ticker: Mutex<Option<Ticker>>,
}

impl ThroughputCounter {
    pub fn new(interval: Duration) -> Self {
        Self {
            count: Arc::new(AtomicU64::new(0)),
            interval,
            ticker: Mutex::new(None),
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn tally(&self) -> FrameTally {
        FrameTally {
            count: self.count.clone(),
        }
    }

    pub fn record(&self) {
        self.count.fetch_add(1, Ordering::Relaxed);
    }

    /// Read and reset the counter
    pub fn take_sample(&self) -> u64 {
        self.count.swap(0, Ordering::AcqRel)
    }

    pub fn is_running(&self) -> bool {
        self.ticker.lock().is_some()
    }

    /// Start emitting one sample per interval to `listener`.
    ///
    /// The counter is zeroed first. Calling this while running is a no-op.
    pub fn start<F>(&self, listener: F) -> io::Result<()>
    where
        F: Fn(u64) + Send + 'static,
    {
        let mut ticker = self.ticker.lock();
        if ticker.is_some() {
            log::debug!("Throughput counter already running");
            return Ok(());
        }

        self.count.store(0, Ordering::Relaxed);

        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let count = self.count.clone();
        let interval = self.interval;

        let handle = thread::Builder::new()
            .name("camfeed-throughput".to_string())
            .spawn(move || {
                let ticks = channel::tick(interval);
                loop {
                    channel::select! {
                        recv(ticks) -> _ => listener(count.swap(0, Ordering::AcqRel)),
                        recv(stop_rx) -> _ => break,
                    }
                }
                log::debug!("Throughput ticker exiting");
            })?;

        *ticker = Some(Ticker { stop_tx, handle });
        log::info!("Throughput counter started ({:?} interval)", interval);
        Ok(())
    }

    /// Stop emitting. Safe to call when never started; no sample is emitted
    /// once this returns.
    pub fn stop(&self) {
        let ticker = self.ticker.lock().take();
        if let Some(Ticker { stop_tx, handle }) = ticker {
            drop(stop_tx);
            if handle.join().is_err() {
                log::error!("Throughput listener panicked");
            }
            log::info!("Throughput counter stopped");
        }
    }
}

impl Default for ThroughputCounter {
    fn default() -> Self {
        Self::new(crate::config::RATE_INTERVAL)
    }
}

impl Drop for ThroughputCounter {
    fn drop(&mut self) {
        self.stop();
    }
}
