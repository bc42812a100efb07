//! camfeed capture pipeline
//!
//! Drives a camera backend from open to teardown and turns its frames into
//! oriented NV21 images on a dedicated worker thread.
//!
//! Key properties:
//! - Latest-frame polling, one frame in flight, released exactly once
//! - Lock-free frame counting with a per-interval rate sample
//! - Blocking, cancellable device open over a callback-driven backend
//! - Ordered, idempotent shutdown

pub mod camera;
pub mod config;
pub mod device;
pub mod error;
pub mod oneshot;
pub mod pipeline;
pub mod sim;
pub mod throughput;

pub use camera::*;
pub use config::*;
pub use device::*;
pub use error::*;
pub use pipeline::*;
pub use throughput::*;
