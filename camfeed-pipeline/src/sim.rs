//! In-process camera backend for tests and demos
//!
//! [`SimBackend`] implements the capture traits without hardware. Frames come
//! from a fixed pool of slots, the same way a hardware image queue hands out a
//! bounded number of buffers: a frame holds its slot until it is released, and
//! production stalls once every slot is taken.

use crate::device::{
    CameraBackend, CameraDevice, CaptureRequest, CaptureSession, DeviceCallback, DeviceEvent,
    DeviceId, FrameSource, OutputTarget,
};
use crate::error::DeviceError;
use camfeed_frame::{CropRect, Facing, PixelFormat, Plane, RawFrame};
use crossbeam::channel::{self, Sender};
use crossbeam_queue::ArrayQueue;
use parking_lot::Mutex;
use rand::Rng;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// Nominal spacing of simulated capture timestamps (30 fps)
pub const FRAME_INTERVAL_NS: u64 = 33_333_333;

const U_SAMPLE: u8 = 0x55;
const V_SAMPLE: u8 = 0xAA;

/// How the backend answers an open request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenBehavior {
    Succeed,
    /// Report a hardware error code
    Fail(i32),
    Disconnect,
    /// Never answer until [`SimBackend::complete_pending_open`]
    Hang,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChromaLayout {
    /// Separate U and V planes, pixel stride 1
    Planar,
    /// U and V share one buffer, pixel stride 2
    Interleaved,
}

/// Memory layout of generated frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameLayout {
    pub chroma: ChromaLayout,
    /// Extra bytes at the end of every row
    pub row_padding: usize,
    /// Fill luma with random bytes instead of the sequence number
    pub noise: bool,
}

impl Default for FrameLayout {
    fn default() -> Self {
        Self {
            chroma: ChromaLayout::Planar,
            row_padding: 0,
            noise: false,
        }
    }
}

/// Content of a produced frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    Valid,
    WrongFormat,
    MissingPlane,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub in_use: usize,
    pub available: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceStats {
    pub produced: u64,
    pub acquired: u64,
    pub released: u64,
    /// Ready frames recycled because a newer one arrived first
    pub dropped_backlog: u64,
    /// Produce attempts refused because every slot was taken
    pub stalled: u64,
    pub pool: PoolStats,
}

struct Ready {
    slot: usize,
    frame: RawFrame,
}

struct SourceInner {
    target: OutputTarget,
    layout: FrameLayout,
    slots: Mutex<Vec<bool>>,
    ready: ArrayQueue<Ready>,
    sequence: AtomicU64,
    closed: AtomicBool,
    produced: AtomicU64,
    acquired: AtomicU64,
    released: AtomicU64,
    dropped_backlog: AtomicU64,
    stalled: AtomicU64,
}

/// Simulated latest-frame image queue
#[derive(Clone)]
pub struct SimFrameSource {
    inner: Arc<SourceInner>,
}

impl SimFrameSource {
    /// `target.max_images` sets both the slot count and the ready queue depth
    pub fn new(target: OutputTarget, layout: FrameLayout) -> Self {
        let capacity = target.max_images.max(1);
        Self {
            inner: Arc::new(SourceInner {
                target,
                layout,
                slots: Mutex::new(vec![false; capacity]),
                ready: ArrayQueue::new(capacity),
                sequence: AtomicU64::new(0),
                closed: AtomicBool::new(false),
                produced: AtomicU64::new(0),
                acquired: AtomicU64::new(0),
                released: AtomicU64::new(0),
                dropped_backlog: AtomicU64::new(0),
                stalled: AtomicU64::new(0),
            }),
        }
    }

    pub fn target(&self) -> OutputTarget {
        self.inner.target
    }

    /// Capture one frame. Returns false if the source is closed or no slot
    /// is free.
    pub fn produce(&self, kind: FrameKind) -> bool {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return false;
        }

        let Some(slot) = inner.claim_slot() else {
            inner.stalled.fetch_add(1, Ordering::Relaxed);
            return false;
        };

        let sequence = inner.sequence.fetch_add(1, Ordering::Relaxed);
        let frame = inner.build_frame(kind, sequence);

        if let Err(rejected) = inner.ready.push(Ready { slot, frame }) {
            inner.free_slot(rejected.slot);
            inner.stalled.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        inner.produced.fetch_add(1, Ordering::Relaxed);

        // Lost a race with close
        if inner.closed.load(Ordering::Acquire) {
            inner.drain();
        }
        true
    }

    /// Produce valid frames every `interval` on a background thread
    pub fn spawn_producer(&self, interval: Duration) -> io::Result<SimProducer> {
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let source = self.clone();

        let handle = thread::Builder::new()
            .name("camfeed-sim-producer".to_string())
            .spawn(move || {
                let ticks = channel::tick(interval);
                loop {
                    channel::select! {
                        recv(ticks) -> _ => {
                            if source.inner.closed.load(Ordering::Acquire) {
                                break;
                            }
                            source.produce(FrameKind::Valid);
                        }
                        recv(stop_rx) -> _ => break,
                    }
                }
            })?;

        Ok(SimProducer {
            stop_tx: Some(stop_tx),
            handle: Some(handle),
        })
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn stats(&self) -> SourceStats {
        let inner = &self.inner;
        let capacity = inner.ready.capacity();
        let in_use = inner.slots.lock().iter().filter(|used| **used).count();

        SourceStats {
            produced: inner.produced.load(Ordering::Relaxed),
            acquired: inner.acquired.load(Ordering::Relaxed),
            released: inner.released.load(Ordering::Relaxed),
            dropped_backlog: inner.dropped_backlog.load(Ordering::Relaxed),
            stalled: inner.stalled.load(Ordering::Relaxed),
            pool: PoolStats {
                capacity,
                in_use,
                available: capacity - in_use,
            },
        }
    }
}

impl FrameSource for SimFrameSource {
    fn try_acquire_latest(&self) -> Option<RawFrame> {
        let inner = &self.inner;
        if inner.closed.load(Ordering::Acquire) {
            return None;
        }

        let mut latest = inner.ready.pop()?;
        while let Some(newer) = inner.ready.pop() {
            inner.recycle(latest);
            latest = newer;
        }
        inner.acquired.fetch_add(1, Ordering::Relaxed);

        let owner = inner.clone();
        let slot = latest.slot;
        Some(latest.frame.with_release(move || {
            owner.free_slot(slot);
            owner.released.fetch_add(1, Ordering::Relaxed);
        }))
    }

    fn close(&self) {
        if !self.inner.closed.swap(true, Ordering::AcqRel) {
            self.inner.drain();
            log::debug!("Simulated frame source closed");
        }
    }
}

impl SourceInner {
    fn claim_slot(&self) -> Option<usize> {
        let mut slots = self.slots.lock();
        let slot = slots.iter().position(|used| !used)?;
        slots[slot] = true;
        Some(slot)
    }

    fn free_slot(&self, slot: usize) {
        if let Some(used) = self.slots.lock().get_mut(slot) {
            *used = false;
        }
    }

    fn recycle(&self, ready: Ready) {
        self.free_slot(ready.slot);
        self.dropped_backlog.fetch_add(1, Ordering::Relaxed);
    }

    fn drain(&self) {
        while let Some(ready) = self.ready.pop() {
            self.free_slot(ready.slot);
        }
    }

    fn build_frame(&self, kind: FrameKind, sequence: u64) -> RawFrame {
        let width = self.target.width as usize;
        let height = self.target.height as usize;
        let padding = self.layout.row_padding;

        let luma_stride = width + padding;
        let mut luma = vec![sequence as u8; luma_stride * height];
        if self.layout.noise {
            rand::thread_rng().fill(&mut luma[..]);
        }

        let chroma_width = width.div_ceil(2);
        let chroma_height = height.div_ceil(2);

        let mut planes = vec![Plane::new(Arc::from(luma), luma_stride, 1)];
        match self.layout.chroma {
            ChromaLayout::Planar => {
                let stride = chroma_width + padding;
                let size = stride * chroma_height;
                planes.push(Plane::new(Arc::from(vec![U_SAMPLE; size]), stride, 1));
                planes.push(Plane::new(Arc::from(vec![V_SAMPLE; size]), stride, 1));
            }
            ChromaLayout::Interleaved => {
                let stride = chroma_width * 2 + padding;
                let mut shared = vec![0u8; stride * chroma_height];
                for row in shared.chunks_mut(stride) {
                    for pair in row[..chroma_width * 2].chunks_exact_mut(2) {
                        pair[0] = U_SAMPLE;
                        pair[1] = V_SAMPLE;
                    }
                }
                planes.push(Plane::new(Arc::from(&shared[..]), stride, 2));
                planes.push(Plane::new(Arc::from(&shared[1..]), stride, 2));
            }
        }

        let format = match kind {
            FrameKind::WrongFormat => PixelFormat::Jpeg,
            FrameKind::Valid | FrameKind::MissingPlane => PixelFormat::Yuv420,
        };
        if kind == FrameKind::MissingPlane {
            planes.truncate(1);
        }

        RawFrame::new(
            format,
            CropRect::full(self.target.width, self.target.height),
            planes,
            sequence * FRAME_INTERVAL_NS,
        )
    }
}

/// Background frame producer; stops on drop
pub struct SimProducer {
    stop_tx: Option<Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl SimProducer {
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        drop(self.stop_tx.take());
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                log::error!("Simulated producer panicked");
            }
        }
    }
}

impl Drop for SimProducer {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[derive(Default)]
struct BackendCounters {
    opens: AtomicU64,
    device_closes: AtomicU64,
    session_closes: AtomicU64,
    repeating_requests: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BackendStats {
    pub opens: u64,
    pub device_closes: u64,
    pub session_closes: u64,
    pub repeating_requests: u64,
}

/// Simulated camera stack
pub struct SimBackend {
    devices: Vec<(DeviceId, Facing)>,
    behavior: Mutex<OpenBehavior>,
    layout: FrameLayout,
    fail_sessions: AtomicBool,
    // Callback of the most recent open request
    callback: Mutex<Option<(DeviceId, DeviceCallback<SimDevice>)>>,
    source: Mutex<Option<SimFrameSource>>,
    counters: Arc<BackendCounters>,
}

impl Default for SimBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl SimBackend {
    /// One back camera ("0") and one front camera ("1")
    pub fn new() -> Self {
        Self {
            devices: vec![
                (DeviceId::new("0"), Facing::Back),
                (DeviceId::new("1"), Facing::Front),
            ],
            behavior: Mutex::new(OpenBehavior::Succeed),
            layout: FrameLayout::default(),
            fail_sessions: AtomicBool::new(false),
            callback: Mutex::new(None),
            source: Mutex::new(None),
            counters: Arc::new(BackendCounters::default()),
        }
    }

    pub fn with_devices(mut self, devices: Vec<(DeviceId, Facing)>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_open_behavior(self, behavior: OpenBehavior) -> Self {
        *self.behavior.lock() = behavior;
        self
    }

    pub fn with_layout(mut self, layout: FrameLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Make every capture session creation fail
    pub fn fail_sessions(self) -> Self {
        self.fail_sessions.store(true, Ordering::Relaxed);
        self
    }

    pub fn set_open_behavior(&self, behavior: OpenBehavior) {
        *self.behavior.lock() = behavior;
    }

    /// Most recently created frame source
    pub fn source(&self) -> Option<SimFrameSource> {
        self.source.lock().clone()
    }

    /// True once an open request has been received
    pub fn open_requested(&self) -> bool {
        self.callback.lock().is_some()
    }

    /// Answer a hung open with a freshly opened device. Returns false if no
    /// open request is outstanding.
    pub fn complete_pending_open(&self) -> bool {
        let device = match self.callback.lock().as_ref() {
            Some((id, _)) => self.make_device(id.clone()),
            None => return false,
        };
        self.notify(DeviceEvent::Opened(device))
    }

    /// Report that the last opened device went away
    pub fn disconnect(&self) -> bool {
        self.notify(DeviceEvent::Disconnected)
    }

    /// Report an asynchronous hardware error on the last opened device
    pub fn raise_error(&self, code: i32) -> bool {
        self.notify(DeviceEvent::Error(code))
    }

    pub fn stats(&self) -> BackendStats {
        let counters = &self.counters;
        BackendStats {
            opens: counters.opens.load(Ordering::Relaxed),
            device_closes: counters.device_closes.load(Ordering::Relaxed),
            session_closes: counters.session_closes.load(Ordering::Relaxed),
            repeating_requests: counters.repeating_requests.load(Ordering::Relaxed),
        }
    }

    fn make_device(&self, id: DeviceId) -> SimDevice {
        self.counters.opens.fetch_add(1, Ordering::Relaxed);
        SimDevice {
            id,
            fail_sessions: self.fail_sessions.load(Ordering::Relaxed),
            counters: self.counters.clone(),
            closed: false,
        }
    }

    // The callback runs without the lock held so it may call back into us
    fn notify(&self, event: DeviceEvent<SimDevice>) -> bool {
        let Some((id, mut callback)) = self.callback.lock().take() else {
            return false;
        };
        callback(event);

        let mut slot = self.callback.lock();
        if slot.is_none() {
            *slot = Some((id, callback));
        }
        true
    }
}

impl CameraBackend for SimBackend {
    type Device = SimDevice;
    type Source = SimFrameSource;

    fn list_devices(&self) -> Vec<DeviceId> {
        self.devices.iter().map(|(id, _)| id.clone()).collect()
    }

    fn facing(&self, id: &DeviceId) -> Option<Facing> {
        self.devices
            .iter()
            .find(|(known, _)| known == id)
            .map(|(_, facing)| *facing)
    }

    fn create_frame_source(&self, target: &OutputTarget) -> Result<SimFrameSource, DeviceError> {
        if target.max_images == 0 {
            return Err(DeviceError::Other("image queue needs at least one buffer".into()));
        }
        let source = SimFrameSource::new(*target, self.layout);
        *self.source.lock() = Some(source.clone());
        Ok(source)
    }

    fn open(&self, id: &DeviceId, callback: DeviceCallback<SimDevice>) {
        *self.callback.lock() = Some((id.clone(), callback));

        let behavior = *self.behavior.lock();
        log::debug!("Simulated open of camera {} ({:?})", id, behavior);
        match behavior {
            OpenBehavior::Succeed => {
                let device = self.make_device(id.clone());
                self.notify(DeviceEvent::Opened(device));
            }
            OpenBehavior::Fail(code) => {
                self.notify(DeviceEvent::Error(code));
            }
            OpenBehavior::Disconnect => {
                self.notify(DeviceEvent::Disconnected);
            }
            OpenBehavior::Hang => {}
        }
    }
}

pub struct SimDevice {
    id: DeviceId,
    fail_sessions: bool,
    counters: Arc<BackendCounters>,
    closed: bool,
}

impl SimDevice {
    pub fn id(&self) -> &DeviceId {
        &self.id
    }
}

impl CameraDevice for SimDevice {
    type Session = SimSession;

    fn create_capture_session(&mut self, _target: &OutputTarget) -> Result<SimSession, DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        if self.fail_sessions {
            return Err(DeviceError::Other("session configuration failed".into()));
        }
        Ok(SimSession {
            counters: self.counters.clone(),
            closed: false,
        })
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.device_closes.fetch_add(1, Ordering::Relaxed);
        }
    }
}

pub struct SimSession {
    counters: Arc<BackendCounters>,
    closed: bool,
}

impl CaptureSession for SimSession {
    fn set_repeating_request(&mut self, _request: CaptureRequest) -> Result<(), DeviceError> {
        if self.closed {
            return Err(DeviceError::Closed);
        }
        self.counters.repeating_requests.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.session_closes.fetch_add(1, Ordering::Relaxed);
        }
    }
}
