//! Raw camera frame description.
//!
//! A [`RawFrame`] borrows the pixel planes handed over by the camera layer
//! together with their geometry. Nothing here copies pixel data: the frame
//! only lives as long as the borrowed buffers, so the caller is free to
//! recycle them as soon as encoding returns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::EncodeError;

/// Pixel layouts the encoder understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Planar 4:2:0: Y plane, then U, then V.
    I420,
    /// Planar 4:2:0 with swapped chroma: Y plane, then V, then U.
    Yv12,
    /// Semi-planar 4:2:0: Y plane plus one interleaved UV plane.
    Nv12,
    /// Semi-planar 4:2:0: Y plane plus one interleaved VU plane.
    Nv21,
    /// Single 8-bit luma plane.
    Gray8,
    /// Packed 24-bit RGB (an already decoded bitmap).
    Rgb8,
    /// Packed 32-bit RGBA. Alpha is discarded.
    Rgba8,
}

impl PixelFormat {
    /// All formats, in declaration order.
    pub const ALL: [PixelFormat; 7] = [
        Self::I420,
        Self::Yv12,
        Self::Nv12,
        Self::Nv21,
        Self::Gray8,
        Self::Rgb8,
        Self::Rgba8,
    ];

    /// Lowercase name used on the command line and in replay scripts.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::I420 => "i420",
            Self::Yv12 => "yv12",
            Self::Nv12 => "nv12",
            Self::Nv21 => "nv21",
            Self::Gray8 => "gray8",
            Self::Rgb8 => "rgb8",
            Self::Rgba8 => "rgba8",
        }
    }

    /// Number of planes a frame of this format carries.
    #[must_use]
    pub fn plane_count(self) -> usize {
        match self {
            Self::I420 | Self::Yv12 => 3,
            Self::Nv12 | Self::Nv21 => 2,
            Self::Gray8 | Self::Rgb8 | Self::Rgba8 => 1,
        }
    }

    /// Whether the format stores luma and chroma separately.
    #[must_use]
    pub fn is_yuv(self) -> bool {
        matches!(self, Self::I420 | Self::Yv12 | Self::Nv12 | Self::Nv21)
    }

    /// Geometry of plane `index` for a `width`x`height` frame:
    /// `(columns, rows, bytes per sample)`.
    pub(crate) fn plane_geometry(self, index: usize, width: usize, height: usize) -> PlaneGeometry {
        let (chroma_w, chroma_h) = chroma_dimensions(width, height);
        match (self, index) {
            (Self::Rgb8, _) => PlaneGeometry::new(width, height, 3),
            (Self::Rgba8, _) => PlaneGeometry::new(width, height, 4),
            (_, 0) => PlaneGeometry::new(width, height, 1),
            (Self::Nv12 | Self::Nv21, _) => PlaneGeometry::new(chroma_w, chroma_h, 2),
            _ => PlaneGeometry::new(chroma_w, chroma_h, 1),
        }
    }

    /// Byte length of a tightly packed frame (no row padding).
    ///
    /// Returns `None` when the length does not fit in a `usize`.
    ///
    /// # Example
    ///
    /// ```
    /// use scanshot::encoder::PixelFormat;
    ///
    /// assert_eq!(PixelFormat::Nv21.packed_len(4, 2), Some(12));
    /// assert_eq!(PixelFormat::Rgba8.packed_len(u32::MAX, u32::MAX), None);
    /// ```
    #[must_use]
    pub fn packed_len(self, width: u32, height: u32) -> Option<usize> {
        let (w, h) = (width as usize, height as usize);
        (0..self.plane_count()).try_fold(0usize, |total, i| {
            total.checked_add(self.plane_geometry(i, w, h).packed_len()?)
        })
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PixelFormat {
    type Err = EncodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "i420" | "yuv420p" | "iyuv" => Ok(Self::I420),
            "yv12" => Ok(Self::Yv12),
            "nv12" => Ok(Self::Nv12),
            "nv21" => Ok(Self::Nv21),
            "gray8" | "gray" | "y8" => Ok(Self::Gray8),
            "rgb8" | "rgb" | "rgb24" => Ok(Self::Rgb8),
            "rgba8" | "rgba" => Ok(Self::Rgba8),
            _ => Err(EncodeError::UnsupportedFormat(s.to_string())),
        }
    }
}

/// Size of a 4:2:0 chroma plane; odd dimensions round up.
pub(crate) fn chroma_dimensions(width: usize, height: usize) -> (usize, usize) {
    (width.div_ceil(2), height.div_ceil(2))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PlaneGeometry {
    pub cols: usize,
    pub rows: usize,
    pub sample_bytes: usize,
}

impl PlaneGeometry {
    fn new(cols: usize, rows: usize, sample_bytes: usize) -> Self {
        Self {
            cols,
            rows,
            sample_bytes,
        }
    }

    fn packed_len(self) -> Option<usize> {
        self.cols
            .checked_mul(self.rows)?
            .checked_mul(self.sample_bytes)
    }
}

/// Clockwise rotation applied before compression to undo sensor orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum Rotation {
    #[default]
    None,
    Cw90,
    Cw180,
    Cw270,
}

impl Rotation {
    #[must_use]
    pub fn degrees(self) -> u32 {
        match self {
            Self::None => 0,
            Self::Cw90 => 90,
            Self::Cw180 => 180,
            Self::Cw270 => 270,
        }
    }

    /// Whether the encoded image has width and height swapped.
    #[must_use]
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Cw90 | Self::Cw270)
    }
}

impl TryFrom<u32> for Rotation {
    type Error = EncodeError;

    fn try_from(degrees: u32) -> Result<Self, Self::Error> {
        match degrees {
            0 => Ok(Self::None),
            90 => Ok(Self::Cw90),
            180 => Ok(Self::Cw180),
            270 => Ok(Self::Cw270),
            other => Err(EncodeError::InvalidRotation(other)),
        }
    }
}

impl From<Rotation> for u32 {
    fn from(rotation: Rotation) -> Self {
        rotation.degrees()
    }
}

/// One borrowed plane of pixel data.
///
/// `row_stride` is the distance in bytes between the starts of two rows and
/// `pixel_stride` the distance between two horizontally adjacent samples.
/// Android's `YUV_420_888` chroma planes report a pixel stride of 2 when the
/// underlying buffer is semi-planar; both shapes are accepted.
#[derive(Debug, Clone, Copy)]
pub struct Plane<'a> {
    pub data: &'a [u8],
    pub row_stride: usize,
    pub pixel_stride: usize,
}

impl<'a> Plane<'a> {
    #[must_use]
    pub fn new(data: &'a [u8], row_stride: usize, pixel_stride: usize) -> Self {
        Self {
            data,
            row_stride,
            pixel_stride,
        }
    }

    /// Byte offset of the sample at (`col`, `row`).
    #[inline]
    pub(crate) fn offset(&self, col: usize, row: usize) -> usize {
        row * self.row_stride + col * self.pixel_stride
    }

    /// `geometry` must have at least one column and one row.
    fn validate(&self, index: usize, geometry: PlaneGeometry) -> Result<(), EncodeError> {
        let invalid_stride = || EncodeError::InvalidStride {
            plane: index,
            row_stride: self.row_stride,
            pixel_stride: self.pixel_stride,
        };
        if self.pixel_stride < geometry.sample_bytes {
            return Err(invalid_stride());
        }
        let row_span = (geometry.cols - 1)
            .checked_mul(self.pixel_stride)
            .and_then(|span| span.checked_add(geometry.sample_bytes))
            .ok_or_else(invalid_stride)?;
        if self.row_stride < row_span {
            return Err(invalid_stride());
        }

        // The last row only needs to reach its final sample, not a full stride.
        // A stride that overflows here cannot index any real buffer.
        let expected = (geometry.rows - 1)
            .checked_mul(self.row_stride)
            .and_then(|len| len.checked_add(row_span))
            .ok_or_else(invalid_stride)?;
        if self.data.len() < expected {
            return Err(EncodeError::PlaneTooSmall {
                plane: index,
                expected,
                actual: self.data.len(),
            });
        }
        Ok(())
    }
}

/// A camera frame as handed over by the platform adapter.
#[derive(Debug, Clone)]
pub struct RawFrame<'a> {
    format: PixelFormat,
    width: u32,
    height: u32,
    planes: Vec<Plane<'a>>,
    rotation: Rotation,
}

impl<'a> RawFrame<'a> {
    /// Build a frame from explicit planes, given in the order the format
    /// declares (see [`PixelFormat`]).
    #[must_use]
    pub fn new(format: PixelFormat, width: u32, height: u32, planes: Vec<Plane<'a>>) -> Self {
        Self {
            format,
            width,
            height,
            planes,
            rotation: Rotation::None,
        }
    }

    /// Split a tightly packed buffer into planes.
    ///
    /// Planar formats are expected back to back (Y, then the chroma planes in
    /// the format's declared order). Extra trailing bytes are ignored.
    ///
    /// # Errors
    ///
    /// * [`EncodeError::EmptyFrame`] if either dimension is zero.
    /// * [`EncodeError::FrameTooLarge`] if the packed length overflows `usize`.
    /// * [`EncodeError::BufferSize`] if `data` is shorter than the packed length.
    pub fn packed(
        format: PixelFormat,
        width: u32,
        height: u32,
        data: &'a [u8],
    ) -> Result<Self, EncodeError> {
        if width == 0 || height == 0 {
            return Err(EncodeError::EmptyFrame { width, height });
        }
        let expected = format
            .packed_len(width, height)
            .ok_or(EncodeError::FrameTooLarge {
                format,
                width,
                height,
            })?;
        if data.len() < expected {
            return Err(EncodeError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        let (w, h) = (width as usize, height as usize);
        let mut planes = Vec::with_capacity(format.plane_count());
        let mut rest = data;
        for index in 0..format.plane_count() {
            let geometry = format.plane_geometry(index, w, h);
            let row_stride = geometry.cols * geometry.sample_bytes;
            let (head, tail) = rest.split_at(row_stride * geometry.rows);
            planes.push(Plane::new(head, row_stride, geometry.sample_bytes));
            rest = tail;
        }

        Ok(Self::new(format, width, height, planes))
    }

    /// Attach a rotation hint.
    #[must_use]
    pub fn with_rotation(mut self, rotation: Rotation) -> Self {
        self.rotation = rotation;
        self
    }

    #[must_use]
    pub fn format(&self) -> PixelFormat {
        self.format
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn rotation(&self) -> Rotation {
        self.rotation
    }

    #[must_use]
    pub fn planes(&self) -> &[Plane<'a>] {
        &self.planes
    }

    /// Check that plane count, strides and buffer sizes are consistent
    /// with the declared format and dimensions.
    ///
    /// # Errors
    ///
    /// Returns the first [`EncodeError`] found, checking dimensions, then the
    /// plane count, then each plane's strides and length in order. Strides
    /// whose byte offsets overflow `usize` are reported as
    /// [`EncodeError::InvalidStride`].
    pub fn validate(&self) -> Result<(), EncodeError> {
        if self.width == 0 || self.height == 0 {
            return Err(EncodeError::EmptyFrame {
                width: self.width,
                height: self.height,
            });
        }
        if self.planes.len() != self.format.plane_count() {
            return Err(EncodeError::PlaneCount {
                format: self.format,
                expected: self.format.plane_count(),
                actual: self.planes.len(),
            });
        }

        let (w, h) = (self.width as usize, self.height as usize);
        for (index, plane) in self.planes.iter().enumerate() {
            plane.validate(index, self.format.plane_geometry(index, w, h))?;
        }
        Ok(())
    }
}
