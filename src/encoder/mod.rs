//! Frame encoder: raw camera planes in, compressed image bytes out.
//!
//! Encoding is a pure transformation. The encoder validates the frame
//! geometry, converts the planes to RGB, applies the rotation hint and
//! compresses the result as a maximum-quality JPEG.
//!
//! # Architecture
//!
//! * [`frame`]: borrowed frame description ([`RawFrame`], [`Plane`], [`PixelFormat`], [`Rotation`]).
//! * [`convert`]: YUV/gray/RGB plane conversion to packed RGB.
//!
//! # Example
//!
//! ```
//! use scanshot::encoder::{encode_jpeg, PixelFormat, RawFrame, Rotation};
//!
//! let pixels = vec![128u8; PixelFormat::I420.packed_len(64, 48).unwrap()];
//! let frame = RawFrame::packed(PixelFormat::I420, 64, 48, &pixels)
//!     .unwrap()
//!     .with_rotation(Rotation::Cw90);
//! let jpeg = encode_jpeg(&frame).unwrap();
//! assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
//! ```

pub mod convert;
pub mod frame;

use image::codecs::jpeg::JpegEncoder;
use image::{imageops, ExtendedColorType, RgbImage};

pub use frame::{PixelFormat, Plane, RawFrame, Rotation};

/// JPEG quality used for every captured frame.
///
/// Kept at the maximum so the stored image stays usable for verifying what
/// was scanned.
pub const JPEG_QUALITY: u8 = 100;

/// File extension of the images produced by [`JpegFrameEncoder`].
pub const JPEG_EXTENSION: &str = "jpeg";

/// Errors that can occur while encoding a frame.
#[derive(thiserror::Error, Debug)]
pub enum EncodeError {
    /// The pixel format is not one the encoder knows about.
    #[error("Unsupported pixel format: {0}")]
    UnsupportedFormat(String),

    /// The frame carries the wrong number of planes for its format.
    #[error("{format} frames need {expected} planes, got {actual}")]
    PlaneCount {
        format: PixelFormat,
        expected: usize,
        actual: usize,
    },

    /// Width or height is zero.
    #[error("Frame has no pixels ({width}x{height})")]
    EmptyFrame { width: u32, height: u32 },

    /// A stride cannot describe the declared width.
    #[error("Invalid stride on plane {plane}: row stride {row_stride}, pixel stride {pixel_stride}")]
    InvalidStride {
        plane: usize,
        row_stride: usize,
        pixel_stride: usize,
    },

    /// A plane buffer ends before the last sample the geometry requires.
    #[error("Plane {plane} too small: need {expected} bytes, got {actual}")]
    PlaneTooSmall {
        plane: usize,
        expected: usize,
        actual: usize,
    },

    /// A packed frame buffer is shorter than its format and size require.
    #[error("Frame buffer too small: need {expected} bytes, got {actual}")]
    BufferSize { expected: usize, actual: usize },

    /// The declared dimensions describe more bytes than fit in memory.
    #[error("Frame too large: {width}x{height} {format} does not fit in the address space")]
    FrameTooLarge {
        format: PixelFormat,
        width: u32,
        height: u32,
    },

    /// Rotation hint outside 0/90/180/270.
    #[error("Invalid rotation: {0} degrees (expected 0, 90, 180 or 270)")]
    InvalidRotation(u32),

    /// The image codec rejected the converted pixels.
    #[error("Image codec failed: {0}")]
    Codec(#[from] image::ImageError),
}

/// Turns a raw frame into stored image bytes.
///
/// The capture cache only sees the encoder through this trait, which keeps
/// the cache agnostic of the output format.
pub trait FrameEncoder: Send + Sync {
    /// Encode one frame. Must not keep references to the frame's buffers.
    fn encode(&self, frame: &RawFrame<'_>) -> Result<Vec<u8>, EncodeError>;

    /// Extension used for persisted files.
    fn extension(&self) -> &'static str {
        JPEG_EXTENSION
    }
}

/// The default encoder: quality-100 JPEG.
#[derive(Debug, Clone, Copy, Default)]
pub struct JpegFrameEncoder;

impl FrameEncoder for JpegFrameEncoder {
    fn encode(&self, frame: &RawFrame<'_>) -> Result<Vec<u8>, EncodeError> {
        encode_jpeg(frame)
    }
}

/// Encode a frame as JPEG, applying its rotation hint first.
///
/// # Errors
///
/// Returns [`EncodeError`] if the frame fails [`RawFrame::validate`] or the
/// JPEG codec rejects the converted image.
pub fn encode_jpeg(frame: &RawFrame<'_>) -> Result<Vec<u8>, EncodeError> {
    let rgb = rotate(convert::to_rgb(frame)?, frame.rotation());

    let mut buffer = Vec::with_capacity(rgb.as_raw().len() / 4);
    JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY).encode(
        rgb.as_raw(),
        rgb.width(),
        rgb.height(),
        ExtendedColorType::Rgb8,
    )?;

    log::trace!(
        "Encoded {}x{} {} frame (rotation {}) into {} bytes",
        frame.width(),
        frame.height(),
        frame.format(),
        frame.rotation().degrees(),
        buffer.len()
    );
    Ok(buffer)
}

fn rotate(image: RgbImage, rotation: Rotation) -> RgbImage {
    match rotation {
        Rotation::None => image,
        Rotation::Cw90 => imageops::rotate90(&image),
        Rotation::Cw180 => imageops::rotate180(&image),
        Rotation::Cw270 => imageops::rotate270(&image),
    }
}
