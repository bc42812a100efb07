//! Strided 4:2:0 planes to packed NV21
//!
//! Capture hardware delivers three independent planes, each with its own row
//! and pixel stride. Downstream consumers want one contiguous buffer: the luma
//! block followed by chroma interleaved as V,U pairs. Tightly packed planes
//! take a block copy per row; padded or interleaved layouts fall back to a
//! per-sample walk.

use crate::error::FrameError;
use crate::types::{CropRect, PackedBuffer, PixelFormat, Plane, PlaneRef, RawFrame};

/// Row copy strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CopyPath {
    /// Block copy wherever both strides are 1
    Auto,
    /// Always walk sample by sample
    Strided,
}

/// Pack a captured frame into a freshly allocated NV21 buffer
pub fn reformat(frame: &RawFrame) -> Result<PackedBuffer, FrameError> {
    match frame.planes() {
        [y, u, v] => reformat_planes(frame.format(), frame.crop(), &[y.view(), u.view(), v.view()]),
        planes => Err(FrameError::PlaneCount {
            found: planes.len(),
        }),
    }
}

/// Pack borrowed planes into a freshly allocated NV21 buffer
pub fn reformat_planes(
    format: PixelFormat,
    crop: CropRect,
    planes: &[PlaneRef<'_>],
) -> Result<PackedBuffer, FrameError> {
    pack_owned(format, crop, planes, CopyPath::Auto)
}

/// Pack borrowed planes into a caller-provided buffer
///
/// Returns the number of bytes written, `ceil(width * height * 1.5)` of the
/// crop. Bytes past that point are left untouched.
pub fn reformat_into(
    format: PixelFormat,
    crop: CropRect,
    planes: &[PlaneRef<'_>],
    output: &mut [u8],
) -> Result<usize, FrameError> {
    let plan = plan(format, crop, planes)?;
    if output.len() < plan.total {
        return Err(FrameError::OutputTooSmall {
            required: plan.total,
            available: output.len(),
        });
    }
    copy(&plan, planes, output, CopyPath::Auto);
    Ok(plan.total)
}

fn pack_owned(
    format: PixelFormat,
    crop: CropRect,
    planes: &[PlaneRef<'_>],
    path: CopyPath,
) -> Result<PackedBuffer, FrameError> {
    // Nothing is allocated until every read and write is known to fit
    let plan = plan(format, crop, planes)?;
    let mut output = vec![0u8; plan.total];
    copy(&plan, planes, &mut output, path);
    Ok(PackedBuffer::from_parts(output, plan.width, plan.height))
}

/// Validated copy of one source plane into the packed buffer
#[derive(Debug, Clone, Copy)]
struct PlaneCopy {
    output_stride: usize,
    output_offset: usize,
    width: usize,
    height: usize,
    start: usize,
    row_stride: usize,
    pixel_stride: usize,
    /// Bytes from the first to the last sample of a row
    row_span: usize,
}

#[derive(Debug)]
struct Plan {
    width: u32,
    height: u32,
    total: usize,
    planes: [Option<PlaneCopy>; 3],
}

/// Validate the frame header and return the luma crop dimensions
fn check_layout(
    format: PixelFormat,
    crop: CropRect,
    plane_count: usize,
) -> Result<(u32, u32), FrameError> {
    if format != PixelFormat::Yuv420 {
        return Err(FrameError::UnsupportedFormat(format));
    }
    if plane_count != 3 {
        return Err(FrameError::PlaneCount { found: plane_count });
    }
    if crop.left < 0 || crop.top < 0 {
        return Err(FrameError::CropOutOfBounds { plane: 0, crop });
    }
    // Both origins are non-negative here, so the differences cannot overflow
    match (crop.right.checked_sub(crop.left), crop.bottom.checked_sub(crop.top)) {
        (Some(width), Some(height)) if width > 0 && height > 0 => {
            Ok((width as u32, height as u32))
        }
        _ => Err(FrameError::EmptyCrop(crop)),
    }
}

/// Output (stride, start offset) for each plane of the packed layout
fn output_layout(plane: usize, pixel_count: usize) -> Option<(usize, usize)> {
    match plane {
        0 => Some((1, 0)),
        1 => Some((2, pixel_count.checked_add(1)?)),
        2 => Some((2, pixel_count)),
        _ => None,
    }
}

/// Check every plane against the crop without touching any output
fn plan(format: PixelFormat, crop: CropRect, planes: &[PlaneRef<'_>]) -> Result<Plan, FrameError> {
    let (width, height) = check_layout(format, crop, planes.len())?;
    let out_of_bounds = |plane| FrameError::CropOutOfBounds { plane, crop };

    let pixel_count = (width as usize)
        .checked_mul(height as usize)
        .ok_or(out_of_bounds(0))?;
    let total = pixel_count
        .checked_mul(3)
        .map(|n| n.div_ceil(2))
        .ok_or(out_of_bounds(0))?;

    let mut copies = [None; 3];
    for (index, plane) in planes.iter().enumerate() {
        let Some((output_stride, output_offset)) = output_layout(index, pixel_count) else {
            continue;
        };

        let plane_crop = if index == 0 { crop } else { crop.halved() };
        let plane_width = plane_crop.width().max(0) as usize;
        let plane_height = plane_crop.height().max(0) as usize;
        if plane_width == 0 || plane_height == 0 {
            continue;
        }

        let row_stride = plane.row_stride;
        let pixel_stride = plane.pixel_stride;
        if row_stride == 0 || pixel_stride == 0 {
            return Err(FrameError::InvalidStride { plane: index });
        }

        let too_short = |required| FrameError::PlaneTooShort {
            plane: index,
            required,
            available: plane.data.len(),
        };
        let span = || -> Option<(usize, usize, usize)> {
            let row_span = (plane_width - 1).checked_mul(pixel_stride)?.checked_add(1)?;
            let start = row_stride
                .checked_mul(plane_crop.top as usize)?
                .checked_add(pixel_stride.checked_mul(plane_crop.left as usize)?)?;
            let required = (plane_height - 1)
                .checked_mul(row_stride)?
                .checked_add(start)?
                .checked_add(row_span)?;
            Some((start, row_span, required))
        };
        let (start, row_span, required) = span().ok_or_else(|| too_short(usize::MAX))?;
        if plane.data.len() < required {
            return Err(too_short(required));
        }

        // Odd-origin crops can halve into a chroma rect wider than the space
        // reserved for it.
        let last_write = (plane_width * plane_height - 1)
            .checked_mul(output_stride)
            .and_then(|n| n.checked_add(output_offset));
        if last_write.map_or(true, |last| last >= total) {
            return Err(out_of_bounds(index));
        }

        copies[index] = Some(PlaneCopy {
            output_stride,
            output_offset,
            width: plane_width,
            height: plane_height,
            start,
            row_stride,
            pixel_stride,
            row_span,
        });
    }

    Ok(Plan {
        width,
        height,
        total,
        planes: copies,
    })
}

/// Run a validated plan. `output` holds at least `plan.total` bytes.
fn copy(plan: &Plan, planes: &[PlaneRef<'_>], output: &mut [u8], path: CopyPath) {
    for (step, plane) in plan.planes.iter().zip(planes) {
        let Some(step) = step else {
            continue;
        };

        let block_copy = path == CopyPath::Auto && step.pixel_stride == 1 && step.output_stride == 1;
        let mut cursor = step.start;
        let mut output_offset = step.output_offset;
        for _ in 0..step.height {
            let row = &plane.data[cursor..cursor + step.row_span];
            if block_copy {
                output[output_offset..output_offset + step.width].copy_from_slice(row);
                output_offset += step.width;
            } else {
                for sample in row.iter().step_by(step.pixel_stride) {
                    output[output_offset] = *sample;
                    output_offset += step.output_stride;
                }
            }
            cursor += step.row_stride;
        }
    }
}

/// Pack a frame always walking sample by sample. Benchmarks compare this
/// against [`reformat`] to measure the block-copy path.
#[doc(hidden)]
pub fn reformat_strided(frame: &RawFrame) -> Result<PackedBuffer, FrameError> {
    let planes: Vec<PlaneRef<'_>> = frame.planes().iter().map(Plane::view).collect();
    pack_owned(frame.format(), frame.crop(), &planes, CopyPath::Strided)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use std::sync::Arc;

    /// Build a plane whose samples at (x, y) equal `value(x, y)`, with the
    /// given strides and unused padding bytes set to 0xEE.
    fn plane_with(
        width: usize,
        height: usize,
        row_stride: usize,
        pixel_stride: usize,
        value: impl Fn(usize, usize) -> u8,
    ) -> Plane {
        let mut data = vec![0xEE; row_stride * height];
        for y in 0..height {
            for x in 0..width {
                data[y * row_stride + x * pixel_stride] = value(x, y);
            }
        }
        Plane::new(Arc::from(data), row_stride, pixel_stride)
    }

    fn constant_frame(
        width: usize,
        height: usize,
        padding: usize,
        pixel_stride: usize,
        values: (u8, u8, u8),
    ) -> RawFrame {
        let cw = width.div_ceil(2);
        let ch = height.div_ceil(2);
        let chroma_stride = cw * pixel_stride + padding;
        RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::full(width as u32, height as u32),
            vec![
                plane_with(width, height, width + padding, 1, |_, _| values.0),
                plane_with(cw, ch, chroma_stride, pixel_stride, |_, _| values.1),
                plane_with(cw, ch, chroma_stride, pixel_stride, |_, _| values.2),
            ],
            0,
        )
    }

    #[test]
    fn test_constant_planes_pack_luma_then_vu() {
        for (width, height, padding, pixel_stride) in
            [(4, 4, 0, 1), (640, 480, 0, 1), (6, 4, 10, 2), (16, 8, 3, 1), (8, 2, 0, 2)]
        {
            let frame = constant_frame(width, height, padding, pixel_stride, (10, 20, 30));
            let packed = reformat(&frame).unwrap();

            assert_eq!(packed.len(), width * height * 3 / 2);
            assert!(packed.luma().iter().all(|&b| b == 10));
            for (i, &b) in packed.chroma().iter().enumerate() {
                let expected = if i % 2 == 0 { 30 } else { 20 };
                assert_eq!(b, expected, "chroma byte {i} of {width}x{height}");
            }
        }
    }

    #[test]
    fn test_four_by_four_offsets() {
        let frame = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::full(4, 4),
            vec![
                plane_with(4, 4, 4, 1, |x, y| (y * 4 + x) as u8),
                plane_with(2, 2, 2, 1, |x, y| 100 + (y * 2 + x) as u8),
                plane_with(2, 2, 2, 1, |x, y| 200 + (y * 2 + x) as u8),
            ],
            0,
        );
        let packed = reformat(&frame).unwrap();
        let bytes = packed.as_bytes();

        assert_eq!(bytes.len(), 24);
        assert_eq!(&bytes[..16], &(0..16).collect::<Vec<u8>>()[..]);
        // V (plane 2) starts at 16, U (plane 1) at 17
        assert_eq!(&bytes[16..], &[200, 100, 201, 101, 202, 102, 203, 103]);
    }

    #[test]
    fn test_odd_width_truncates_chroma() {
        let frame = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::full(5, 4),
            vec![
                plane_with(5, 4, 5, 1, |_, _| 1),
                plane_with(3, 2, 3, 1, |x, _| 50 + x as u8),
                plane_with(3, 2, 3, 1, |x, _| 60 + x as u8),
            ],
            0,
        );
        assert_eq!(frame.crop().halved().width(), 2);

        let packed = reformat(&frame).unwrap();
        assert_eq!(packed.len(), 30);
        // Two chroma columns per row; the third column is never read
        assert_eq!(&packed.chroma()[..8], &[60, 50, 61, 51, 60, 50, 61, 51]);
        assert!(packed.chroma()[8..].iter().all(|&b| b == 0));
    }

    #[test]
    fn test_crop_offsets_reads() {
        // 8x8 source, crop the 4x4 block at (2, 2)
        let frame = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::new(2, 2, 6, 6),
            vec![
                plane_with(8, 8, 10, 1, |x, y| (y * 8 + x) as u8),
                plane_with(4, 4, 4, 1, |x, y| 100 + (y * 4 + x) as u8),
                plane_with(4, 4, 4, 1, |x, y| 200 + (y * 4 + x) as u8),
            ],
            0,
        );
        let packed = reformat(&frame).unwrap();

        assert_eq!(&packed.luma()[..4], &[18, 19, 20, 21]);
        assert_eq!(&packed.luma()[12..], &[42, 43, 44, 45]);
        // Chroma crop is (1, 1)-(3, 3)
        assert_eq!(packed.chroma(), &[205, 105, 206, 106, 209, 109, 210, 110]);
    }

    #[test]
    fn test_block_copy_matches_strided_walk() {
        let mut rng = rand::thread_rng();
        for _ in 0..20 {
            let width = rng.gen_range(1..64usize);
            let height = rng.gen_range(1..48usize);
            let padding = rng.gen_range(0..8usize);
            let cw = width.div_ceil(2);
            let ch = height.div_ceil(2);

            let mut noise = |len: usize| {
                let mut data = vec![0u8; len];
                rng.fill(&mut data[..]);
                Arc::<[u8]>::from(data)
            };
            let frame = RawFrame::new(
                PixelFormat::Yuv420,
                CropRect::full(width as u32, height as u32),
                vec![
                    Plane::new(noise((width + padding) * height), width + padding, 1),
                    Plane::new(noise((cw + padding) * ch), cw + padding, 1),
                    Plane::new(noise((cw + padding) * ch), cw + padding, 1),
                ],
                0,
            );

            let fast = reformat(&frame).unwrap();
            let strided = reformat_strided(&frame).unwrap();
            assert_eq!(fast, strided, "{width}x{height} padding {padding}");
        }
    }

    #[test]
    fn test_last_row_without_padding() {
        // Final row is only as long as the samples it carries
        let mut u = vec![0u8; 2 * 3 + 3];
        u[6] = 7;
        u[8] = 9;
        let frame = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::full(4, 4),
            vec![
                Plane::new(Arc::from(vec![1u8; 16]), 4, 1),
                Plane::new(Arc::from(u), 6, 2),
                Plane::new(Arc::from(vec![3u8; 9]), 6, 2),
            ],
            0,
        );
        let packed = reformat(&frame).unwrap();
        assert_eq!(&packed.chroma()[4..], &[3, 7, 3, 9]);
    }

    #[test]
    fn test_rejects_wrong_format_and_plane_count() {
        let frame = constant_frame(4, 4, 0, 1, (1, 2, 3));
        let views: Vec<_> = frame.planes().iter().map(Plane::view).collect();

        assert_eq!(
            reformat_planes(PixelFormat::Jpeg, frame.crop(), &views),
            Err(FrameError::UnsupportedFormat(PixelFormat::Jpeg))
        );
        assert_eq!(
            reformat_planes(PixelFormat::Yuv420, frame.crop(), &views[..2]),
            Err(FrameError::PlaneCount { found: 2 })
        );

        let single = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::full(4, 4),
            vec![frame.planes()[0].clone()],
            0,
        );
        assert_eq!(reformat(&single), Err(FrameError::PlaneCount { found: 1 }));
    }

    #[test]
    fn test_short_plane_is_malformed() {
        let frame = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::full(4, 4),
            vec![
                Plane::new(Arc::from(vec![0u8; 15]), 4, 1),
                Plane::new(Arc::from(vec![0u8; 4]), 2, 1),
                Plane::new(Arc::from(vec![0u8; 4]), 2, 1),
            ],
            0,
        );
        let err = reformat(&frame).unwrap_err();
        assert_eq!(
            err,
            FrameError::PlaneTooShort {
                plane: 0,
                required: 16,
                available: 15
            }
        );
        assert!(err.is_malformed());
    }

    #[test]
    fn test_odd_origin_crop_overflow_is_rejected() {
        // 5x5 at (1, 1) halves to a 3x3 chroma rect that does not fit
        let frame = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::new(1, 1, 6, 6),
            vec![
                Plane::new(Arc::from(vec![0u8; 36]), 6, 1),
                Plane::new(Arc::from(vec![0u8; 9]), 3, 1),
                Plane::new(Arc::from(vec![0u8; 9]), 3, 1),
            ],
            0,
        );
        assert!(matches!(
            reformat(&frame),
            Err(FrameError::CropOutOfBounds { plane: 1, .. })
        ));
    }

    #[test]
    fn test_zero_stride_and_empty_crop() {
        let frame = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::full(2, 2),
            vec![
                Plane::new(Arc::from(vec![0u8; 4]), 2, 1),
                Plane::new(Arc::from(vec![0u8; 1]), 1, 0),
                Plane::new(Arc::from(vec![0u8; 1]), 1, 1),
            ],
            0,
        );
        assert_eq!(reformat(&frame), Err(FrameError::InvalidStride { plane: 1 }));

        let views: Vec<_> = frame.planes().iter().map(Plane::view).collect();
        assert!(matches!(
            reformat_planes(PixelFormat::Yuv420, CropRect::new(2, 2, 2, 4), &views),
            Err(FrameError::EmptyCrop(_))
        ));
    }

    fn tiny_planes() -> Vec<Plane> {
        vec![
            Plane::new(Arc::from(vec![0u8; 16]), 4, 1),
            Plane::new(Arc::from(vec![0u8; 4]), 2, 1),
            Plane::new(Arc::from(vec![0u8; 4]), 2, 1),
        ]
    }

    #[test]
    fn test_huge_crop_on_small_planes_is_malformed() {
        // Would need exabytes of output; must be rejected before allocating
        let frame = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::new(0, 0, i32::MAX, i32::MAX),
            tiny_planes(),
            0,
        );
        let err = reformat(&frame).unwrap_err();
        assert!(matches!(
            err,
            FrameError::PlaneTooShort {
                plane: 0,
                available: 16,
                ..
            }
        ));
        assert!(err.is_malformed());
        assert_eq!(reformat_strided(&frame).unwrap_err(), err);

        let views: Vec<_> = frame.planes().iter().map(Plane::view).collect();
        let mut out = vec![0u8; 24];
        assert_eq!(
            reformat_into(PixelFormat::Yuv420, frame.crop(), &views, &mut out),
            Err(err)
        );
    }

    #[test]
    fn test_negative_origin_with_extreme_edge_is_out_of_bounds() {
        for crop in [
            CropRect::new(-2, 0, i32::MAX, 2),
            CropRect::new(0, i32::MIN, 2, i32::MAX),
            CropRect::new(i32::MIN, i32::MIN, i32::MAX, i32::MAX),
        ] {
            let frame = RawFrame::new(PixelFormat::Yuv420, crop, tiny_planes(), 0);
            assert_eq!(
                reformat(&frame),
                Err(FrameError::CropOutOfBounds { plane: 0, crop }),
                "{crop:?}"
            );
        }

        let inverted = CropRect::new(i32::MAX, 0, 0, 2);
        let frame = RawFrame::new(PixelFormat::Yuv420, inverted, tiny_planes(), 0);
        assert_eq!(reformat(&frame), Err(FrameError::EmptyCrop(inverted)));
    }

    #[test]
    fn test_huge_strides_are_malformed() {
        let frame = RawFrame::new(
            PixelFormat::Yuv420,
            CropRect::new(0, 2, 4, 4),
            vec![
                Plane::new(Arc::from(vec![0u8; 16]), usize::MAX, 1),
                Plane::new(Arc::from(vec![0u8; 4]), 2, 1),
                Plane::new(Arc::from(vec![0u8; 4]), 2, 1),
            ],
            0,
        );
        assert_eq!(
            reformat(&frame),
            Err(FrameError::PlaneTooShort {
                plane: 0,
                required: usize::MAX,
                available: 16
            })
        );
    }

    #[test]
    fn test_reformat_into_caller_buffer() {
        let frame = constant_frame(4, 2, 0, 1, (9, 8, 7));
        let views: Vec<_> = frame.planes().iter().map(Plane::view).collect();

        let mut small = vec![0u8; 11];
        let err = reformat_into(PixelFormat::Yuv420, frame.crop(), &views, &mut small).unwrap_err();
        assert!(!err.is_malformed());

        let mut out = vec![0xAA; 16];
        let written = reformat_into(PixelFormat::Yuv420, frame.crop(), &views, &mut out).unwrap();
        assert_eq!(written, 12);
        assert_eq!(&out[..12], &[9, 9, 9, 9, 9, 9, 9, 9, 7, 8, 7, 8]);
        assert_eq!(&out[12..], &[0xAA; 4]);
    }
}
