use crate::device::DeviceId;
use camfeed_frame::Facing;
use std::time::Duration;
use thiserror::Error;

/// Failures reported by the capture backend
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Hardware error code {0}")]
    Hardware(i32),

    #[error("Device disconnected")]
    Disconnected,

    #[error("Resource already closed")]
    Closed,

    #[error("{0}")]
    Other(String),
}

/// Errors surfaced by `Camera::start`
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Configuration invalid: {reason}")]
    InvalidConfig { reason: String },

    #[error("No camera facing {facing}")]
    NoMatchingDevice { facing: Facing },

    #[error("Failed to open camera {id}: {source}")]
    DeviceOpen { id: DeviceId, source: DeviceError },

    #[error("Camera {id} disconnected while opening")]
    Disconnected { id: DeviceId },

    #[error("Camera open cancelled")]
    OpenCancelled,

    #[error("Capture session failed: {0}")]
    Session(#[source] DeviceError),

    #[error("Frame source failed: {0}")]
    FrameSource(#[source] DeviceError),

    #[error("Camera already running")]
    AlreadyRunning,

    #[error("Failed to spawn worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Problems stopping the pipeline worker. Teardown continues regardless.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShutdownError {
    #[error("Pipeline worker did not stop within {waited:?}")]
    Interrupted { waited: Duration },

    #[error("Pipeline worker panicked")]
    Panicked,
}
