//! Capture backend seams
//!
//! The camera hardware is reached through these traits. Opening is
//! callback-driven, as it is on real camera stacks; everything else is a
//! plain call.

use crate::error::DeviceError;
use camfeed_frame::{Facing, PixelFormat, RawFrame};
use std::fmt;

/// Backend-assigned camera identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Where captured frames are delivered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputTarget {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// Frames the backend may have outstanding before capture stalls
    pub max_images: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestTemplate {
    Preview,
}

/// Request repeated by the session for every frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureRequest {
    pub template: RequestTemplate,
    pub target: OutputTarget,
}

impl CaptureRequest {
    pub fn preview(target: OutputTarget) -> Self {
        Self {
            template: RequestTemplate::Preview,
            target,
        }
    }
}

/// Events the backend reports for a device it was asked to open
#[derive(Debug)]
pub enum DeviceEvent<D> {
    Opened(D),
    Disconnected,
    Error(i32),
}

/// Receives every event for one open request, possibly on a backend thread
pub type DeviceCallback<D> = Box<dyn FnMut(DeviceEvent<D>) + Send>;

/// Latest-frame image queue fed by the hardware
pub trait FrameSource: Send + Sync + 'static {
    /// Newest ready frame, or `None` when nothing arrived since the last
    /// call. Older ready frames are recycled without being returned.
    fn try_acquire_latest(&self) -> Option<RawFrame>;

    /// Stop delivering frames. Must be idempotent.
    fn close(&self);
}

pub trait CaptureSession: Send {
    fn set_repeating_request(&mut self, request: CaptureRequest) -> Result<(), DeviceError>;

    /// Must be idempotent
    fn close(&mut self);
}

pub trait CameraDevice: Send + 'static {
    type Session: CaptureSession;

    fn create_capture_session(&mut self, target: &OutputTarget)
        -> Result<Self::Session, DeviceError>;

    /// Must be idempotent
    fn close(&mut self);
}

/// Entry point to a camera stack
pub trait CameraBackend: Send + Sync + 'static {
    type Device: CameraDevice;
    type Source: FrameSource;

    fn list_devices(&self) -> Vec<DeviceId>;

    fn facing(&self, id: &DeviceId) -> Option<Facing>;

    fn create_frame_source(&self, target: &OutputTarget) -> Result<Self::Source, DeviceError>;

    /// Start opening `id`. The outcome arrives through `callback`, which may
    /// also be called later with `Disconnected` or `Error` once open.
    fn open(&self, id: &DeviceId, callback: DeviceCallback<Self::Device>);
}

/// First device whose facing matches
pub fn find_device<B: CameraBackend + ?Sized>(backend: &B, facing: Facing) -> Option<DeviceId> {
    backend
        .list_devices()
        .into_iter()
        .find(|id| backend.facing(id) == Some(facing))
}
