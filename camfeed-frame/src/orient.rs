//! Rotation and mirroring of packed NV21 buffers for display
//!
//! Sensors are mounted sideways relative to the natural display orientation,
//! and front cameras are shown mirrored. The transform is applied directly in
//! the NV21 domain so no RGB round trip is needed.

use crate::error::OrientError;
use crate::types::{packed_len, Facing, PackedBuffer};

/// Clockwise rotation applied before mirroring
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rotation {
    Rotate0,
    Rotate90,
    Rotate180,
    Rotate270,
}

/// Rotation plus optional horizontal mirror
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Orientation {
    pub rotation: Rotation,
    pub mirror: bool,
}

impl Orientation {
    pub const IDENTITY: Orientation = Orientation {
        rotation: Rotation::Rotate0,
        mirror: false,
    };

    /// Display orientation for a sensor facing
    pub fn for_facing(facing: Facing) -> Self {
        match facing {
            Facing::Back => Orientation {
                rotation: Rotation::Rotate90,
                mirror: false,
            },
            Facing::Front => Orientation {
                rotation: Rotation::Rotate270,
                mirror: true,
            },
            Facing::External => Orientation::IDENTITY,
        }
    }

    /// True when width and height trade places
    pub fn swaps_axes(&self) -> bool {
        matches!(self.rotation, Rotation::Rotate90 | Rotation::Rotate270)
    }

    /// Output dimensions for a `width` x `height` source
    pub fn output_size(&self, width: usize, height: usize) -> (usize, usize) {
        if self.swaps_axes() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Destination coordinate of source sample (x, y) in a `width` x `height` grid
    fn map(&self, x: usize, y: usize, width: usize, height: usize) -> (usize, usize) {
        let (dx, dy) = match self.rotation {
            Rotation::Rotate0 => (x, y),
            Rotation::Rotate90 => (height - 1 - y, x),
            Rotation::Rotate180 => (width - 1 - x, height - 1 - y),
            Rotation::Rotate270 => (y, width - 1 - x),
        };
        if self.mirror {
            let (out_width, _) = self.output_size(width, height);
            (out_width - 1 - dx, dy)
        } else {
            (dx, dy)
        }
    }

    /// Rotate and mirror a packed buffer
    pub fn apply_to(&self, buffer: PackedBuffer) -> Result<DisplayImage, OrientError> {
        let width = buffer.width() as usize;
        let height = buffer.height() as usize;
        let expected = packed_len(buffer.width(), buffer.height());
        if buffer.len() != expected {
            return Err(OrientError::SizeMismatch {
                width: buffer.width(),
                height: buffer.height(),
                expected,
                actual: buffer.len(),
            });
        }

        let (out_width, out_height) = self.output_size(width, height);
        if *self == Orientation::IDENTITY {
            return Ok(DisplayImage {
                data: buffer.into_vec(),
                width: out_width as u32,
                height: out_height as u32,
                orientation: *self,
                timestamp: 0,
            });
        }

        let src = buffer.as_bytes();
        let mut dst = vec![0u8; src.len()];

        for y in 0..height {
            for x in 0..width {
                let (dx, dy) = self.map(x, y, width, height);
                dst[dy * out_width + dx] = src[y * width + x];
            }
        }

        // Chroma pairs move as a unit on the half-resolution grid
        let pixel_count = width * height;
        let (chroma_width, chroma_height) = (width / 2, height / 2);
        let (out_chroma_width, _) = self.output_size(chroma_width, chroma_height);
        for y in 0..chroma_height {
            for x in 0..chroma_width {
                let (dx, dy) = self.map(x, y, chroma_width, chroma_height);
                let from = pixel_count + 2 * (y * chroma_width + x);
                let to = pixel_count + 2 * (dy * out_chroma_width + dx);
                dst[to] = src[from];
                dst[to + 1] = src[from + 1];
            }
        }

        Ok(DisplayImage {
            data: dst,
            width: out_width as u32,
            height: out_height as u32,
            orientation: *self,
            timestamp: 0,
        })
    }
}

/// Displayable NV21 image in its final orientation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub orientation: Orientation,
    /// Capture timestamp of the source frame, nanoseconds
    pub timestamp: u64,
}

impl DisplayImage {
    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }

    pub fn luma(&self) -> &[u8] {
        &self.data[..self.width as usize * self.height as usize]
    }
}

/// Turns a packed buffer into a displayable image
pub trait OrientationTransform: Send + Sync {
    fn apply(&self, buffer: PackedBuffer, facing: Facing) -> Result<DisplayImage, OrientError>;
}

/// Rotates by sensor facing: back 90°, front 270° mirrored, external untouched
#[derive(Debug, Clone, Copy, Default)]
pub struct Nv21Rotator;

impl OrientationTransform for Nv21Rotator {
    fn apply(&self, buffer: PackedBuffer, facing: Facing) -> Result<DisplayImage, OrientError> {
        Orientation::for_facing(facing).apply_to(buffer)
    }
}

/// A fixed orientation ignores the facing
impl OrientationTransform for Orientation {
    fn apply(&self, buffer: PackedBuffer, _facing: Facing) -> Result<DisplayImage, OrientError> {
        self.apply_to(buffer)
    }
}
