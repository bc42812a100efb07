//! camfeed frame model and packing
//!
//! Converts the three strided planes delivered by camera hardware into a
//! single NV21 buffer and orients it for display.
//!
//! Key properties:
//! - One block copy per row whenever the planes are tightly packed
//! - Bounds-checked stride walking for padded or interleaved chroma
//! - No allocation beyond the output buffer

pub mod error;
pub mod orient;
pub mod reformat;
pub mod types;

pub use error::*;
pub use orient::*;
pub use reformat::*;
pub use types::*;
