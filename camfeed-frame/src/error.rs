//! Frame conversion errors

use crate::types::{CropRect, PixelFormat};
use thiserror::Error;

/// Reasons a captured frame cannot be packed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("Unsupported pixel format: {0:?}")]
    UnsupportedFormat(PixelFormat),

    #[error("Expected 3 planes, found {found}")]
    PlaneCount { found: usize },

    #[error("Empty crop rectangle: {0:?}")]
    EmptyCrop(CropRect),

    #[error("Crop {crop:?} falls outside plane {plane}")]
    CropOutOfBounds { plane: usize, crop: CropRect },

    #[error("Plane {plane} has a zero row or pixel stride")]
    InvalidStride { plane: usize },

    #[error("Plane {plane} holds {available} bytes but the crop reads {required}")]
    PlaneTooShort {
        plane: usize,
        required: usize,
        available: usize,
    },

    #[error("Output buffer holds {available} bytes but the frame needs {required}")]
    OutputTooSmall { required: usize, available: usize },
}

impl FrameError {
    /// True when the frame itself is at fault and should simply be dropped
    pub fn is_malformed(&self) -> bool {
        !matches!(self, FrameError::OutputTooSmall { .. })
    }
}

/// Orientation transform failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrientError {
    #[error("Buffer is {actual} bytes, {width}x{height} needs {expected}")]
    SizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
}
