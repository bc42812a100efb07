//! Frame data types and constants

use bytemuck::{Pod, Zeroable};
use std::fmt;
use std::sync::Arc;

/// Pixel format tag carried by captured frames
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Unknown = 0,
    Yuv420 = 1, // Planar YUV 4:2:0, three planes with independent strides
    Jpeg = 3,   // Compressed still
}

impl PixelFormat {
    /// Decode a raw tag coming across the C boundary
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => PixelFormat::Yuv420,
            3 => PixelFormat::Jpeg,
            _ => PixelFormat::Unknown,
        }
    }
}

/// Camera lens facing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Facing {
    Front,
    Back,
    External,
}

impl fmt::Display for Facing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Facing::Front => f.write_str("front"),
            Facing::Back => f.write_str("back"),
            Facing::External => f.write_str("external"),
        }
    }
}

/// Crop rectangle in pixel coordinates, origin top-left, right/bottom exclusive
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
pub struct CropRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl CropRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// Full-frame crop for a `width` x `height` image
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width as i32, height as i32)
    }

    /// Saturates instead of overflowing on extreme edges
    pub fn width(&self) -> i32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> i32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() <= 0 || self.height() <= 0
    }

    /// Chroma rectangle of a 4:2:0 image: every edge halved independently.
    ///
    /// Odd coordinates truncate, so an odd-sized crop loses its last chroma
    /// column/row.
    pub fn halved(&self) -> Self {
        Self::new(
            self.left / 2,
            self.top / 2,
            self.right / 2,
            self.bottom / 2,
        )
    }
}

/// Borrowed view of one image plane
#[derive(Debug, Clone, Copy)]
pub struct PlaneRef<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

/// One plane of a captured image: read-only backing memory plus strides
#[derive(Clone)]
pub struct Plane {
    data: Arc<[u8]>,
    row_stride: usize,
    pixel_stride: usize,
}

impl Plane {
    pub fn new(data: Arc<[u8]>, row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn row_stride(&self) -> usize {
        self.row_stride
    }

    pub fn pixel_stride(&self) -> usize {
        self.pixel_stride
    }

    pub fn view(&self) -> PlaneRef<'_> {
        PlaneRef {
            data: &self.data,
            row_stride: self.row_stride,
            pixel_stride: self.pixel_stride,
        }
    }
}

impl fmt::Debug for Plane {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Plane")
            .field("len", &self.data.len())
            .field("row_stride", &self.row_stride)
            .field("pixel_stride", &self.pixel_stride)
            .finish()
    }
}

type ReleaseHook = Box<dyn FnOnce() + Send>;

/// Captured frame handle.
///
/// The capture backend hands out frames from a small pool; each one must go
/// back exactly once. [`RawFrame::release`] does that explicitly and `Drop`
/// covers every path that forgets to.
pub struct RawFrame {
    format: PixelFormat,
    crop: CropRect,
    planes: Vec<Plane>,
    timestamp: u64,
    release: Option<ReleaseHook>,
}

impl RawFrame {
    pub fn new(format: PixelFormat, crop: CropRect, planes: Vec<Plane>, timestamp: u64) -> Self {
        Self {
            format,
            crop,
            planes,
            timestamp,
            release: None,
        }
    }

    /// Attach the hook that returns the frame's buffers to their owner
    pub fn with_release<F>(mut self, hook: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn crop(&self) -> CropRect {
        self.crop
    }

    pub fn planes(&self) -> &[Plane] {
        &self.planes
    }

    /// Capture timestamp in nanoseconds
    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Hand the frame back to its owner
    pub fn release(mut self) {
        self.run_release();
    }

    fn run_release(&mut self) {
        if let Some(hook) = self.release.take() {
            hook();
        }
    }
}

impl Drop for RawFrame {
    fn drop(&mut self) {
        self.run_release();
    }
}

impl fmt::Debug for RawFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RawFrame")
            .field("format", &self.format)
            .field("crop", &self.crop)
            .field("planes", &self.planes)
            .field("timestamp", &self.timestamp)
            .field("released", &self.release.is_none())
            .finish()
    }
}

/// Contiguous NV21 buffer: luma block followed by interleaved V/U samples
#[derive(Clone, PartialEq, Eq)]
pub struct PackedBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl PackedBuffer {
    pub fn from_parts(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn luma(&self) -> &[u8] {
        &self.data[..self.pixel_count()]
    }

    pub fn chroma(&self) -> &[u8] {
        &self.data[self.pixel_count()..]
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.data
    }
}

impl fmt::Debug for PackedBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PackedBuffer")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.data.len())
            .finish()
    }
}

/// Length of a packed 4:2:0 buffer, `ceil(width * height * 1.5)`
pub fn packed_len(width: u32, height: u32) -> usize {
    let pixels = width as usize * height as usize;
    (pixels * 3).div_ceil(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_packed_len_rounds_up() {
        assert_eq!(packed_len(4, 4), 24);
        assert_eq!(packed_len(640, 480), 460_800);
        assert_eq!(packed_len(5, 5), 38);
        assert_eq!(packed_len(0, 10), 0);
    }

    #[test]
    fn test_crop_halving_truncates() {
        let crop = CropRect::new(0, 0, 5, 7);
        let chroma = crop.halved();
        assert_eq!(chroma.width(), 2);
        assert_eq!(chroma.height(), 3);

        let shifted = CropRect::new(3, 1, 9, 9).halved();
        assert_eq!(shifted, CropRect::new(1, 0, 4, 4));
    }

    #[test]
    fn test_release_runs_once() {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = count.clone();
        let frame = RawFrame::new(PixelFormat::Yuv420, CropRect::full(2, 2), Vec::new(), 0)
            .with_release(move || {
                hook_count.fetch_add(1, Ordering::SeqCst);
            });

        frame.release();
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_drop_releases_forgotten_frame() {
        let count = Arc::new(AtomicUsize::new(0));
        let hook_count = count.clone();
        {
            let _frame = RawFrame::new(PixelFormat::Yuv420, CropRect::full(2, 2), Vec::new(), 0)
                .with_release(move || {
                    hook_count.fetch_add(1, Ordering::SeqCst);
                });
        }
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_format_from_raw() {
        assert_eq!(PixelFormat::from_raw(1), PixelFormat::Yuv420);
        assert_eq!(PixelFormat::from_raw(3), PixelFormat::Jpeg);
        assert_eq!(PixelFormat::from_raw(2), PixelFormat::Unknown);
        assert_eq!(PixelFormat::from_raw(99), PixelFormat::Unknown);
    }

    #[test]
    fn test_extreme_crop_sizes_saturate() {
        let crop = CropRect::new(-2, i32::MIN, i32::MAX, i32::MAX);
        assert_eq!(crop.width(), i32::MAX);
        assert_eq!(crop.height(), i32::MAX);
        assert!(!crop.is_empty());
        assert!(CropRect::new(i32::MAX, 0, i32::MIN, 1).is_empty());
    }
}
