//! Pixel conversion from camera plane layouts to packed RGB.
//!
//! YUV input is treated as full-range BT.601 (the JFIF convention, which is
//! what camera stacks hand to their own JPEG compressors). Chroma is 4:2:0:
//! each chroma sample covers a 2x2 block of luma samples.

use image::RgbImage;
use rayon::prelude::*;

use super::frame::{Plane, PixelFormat, RawFrame};
use super::EncodeError;

/// Where to find the chroma samples of a 4:2:0 frame.
#[derive(Clone, Copy)]
enum Chroma<'a> {
    /// Separate U and V planes (either may have a pixel stride above 1).
    Planar { u: Plane<'a>, v: Plane<'a> },
    /// One plane holding U/V pairs side by side.
    Interleaved { plane: Plane<'a>, u_first: bool },
}

impl Chroma<'_> {
    #[inline]
    fn sample(&self, col: usize, row: usize) -> (u8, u8) {
        match self {
            Self::Planar { u, v } => (u.data[u.offset(col, row)], v.data[v.offset(col, row)]),
            Self::Interleaved { plane, u_first } => {
                let at = plane.offset(col, row);
                let (first, second) = (plane.data[at], plane.data[at + 1]);
                if *u_first {
                    (first, second)
                } else {
                    (second, first)
                }
            }
        }
    }
}

/// Convert a validated frame into an RGB image of the same dimensions.
///
/// Rotation is not applied here.
///
/// # Errors
///
/// Returns the error from [`RawFrame::validate`] for inconsistent geometry,
/// or [`EncodeError::FrameTooLarge`] if the RGB output would not fit in
/// memory.
pub fn to_rgb(frame: &RawFrame<'_>) -> Result<RgbImage, EncodeError> {
    frame.validate()?;

    let width = frame.width() as usize;
    let len = PixelFormat::Rgb8
        .packed_len(frame.width(), frame.height())
        .ok_or(EncodeError::FrameTooLarge {
            format: frame.format(),
            width: frame.width(),
            height: frame.height(),
        })?;
    let planes = frame.planes();
    let mut rgb = vec![0u8; len];
    let rows = rgb.par_chunks_mut(width * 3).enumerate();

    match frame.format() {
        PixelFormat::I420 | PixelFormat::Yv12 | PixelFormat::Nv12 | PixelFormat::Nv21 => {
            let chroma = match frame.format() {
                PixelFormat::I420 => Chroma::Planar {
                    u: planes[1],
                    v: planes[2],
                },
                PixelFormat::Yv12 => Chroma::Planar {
                    u: planes[2],
                    v: planes[1],
                },
                PixelFormat::Nv12 => Chroma::Interleaved {
                    plane: planes[1],
                    u_first: true,
                },
                _ => Chroma::Interleaved {
                    plane: planes[1],
                    u_first: false,
                },
            };
            let luma = planes[0];
            rows.for_each(|(row, out)| {
                for (col, px) in out.chunks_exact_mut(3).enumerate() {
                    let y = luma.data[luma.offset(col, row)];
                    let (u, v) = chroma.sample(col / 2, row / 2);
                    px.copy_from_slice(&yuv_to_rgb(y, u, v));
                }
            });
        }
        PixelFormat::Gray8 => {
            let luma = planes[0];
            rows.for_each(|(row, out)| {
                for (col, px) in out.chunks_exact_mut(3).enumerate() {
                    px.fill(luma.data[luma.offset(col, row)]);
                }
            });
        }
        PixelFormat::Rgb8 | PixelFormat::Rgba8 => {
            let packed = planes[0];
            rows.for_each(|(row, out)| {
                for (col, px) in out.chunks_exact_mut(3).enumerate() {
                    let at = packed.offset(col, row);
                    px.copy_from_slice(&packed.data[at..at + 3]);
                }
            });
        }
    }

    RgbImage::from_raw(frame.width(), frame.height(), rgb).ok_or(EncodeError::BufferSize {
        expected: len,
        actual: 0,
    })
}

/// Full-range BT.601 YCbCr to RGB in 16.16 fixed point.
#[inline]
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    const HALF: i32 = 1 << 15;
    let y = i32::from(y);
    let u = i32::from(u) - 128;
    let v = i32::from(v) - 128;

    let r = y + ((91_881 * v + HALF) >> 16);
    let g = y - ((22_554 * u + 46_802 * v + HALF) >> 16);
    let b = y + ((116_130 * u + HALF) >> 16);
    [clamp(r), clamp(g), clamp(b)]
}

#[inline]
fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}
