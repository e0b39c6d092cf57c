//! In-memory raster frames handed over by the detection pipeline.

use crate::error::ImageEncodingError;
use image::{DynamicImage, ImageBuffer, Luma, Rgb, Rgba};

/// Memory layout of a frame's pixels.
///
/// Camera and OpenCV-style pipelines usually deliver BGR(A) buffers, so both
/// channel orders are accepted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    Gray8,
    Rgb8,
    Bgr8,
    Rgba8,
    Bgra8,
}

impl PixelFormat {
    /// Bytes per pixel
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Gray8 => 1,
            PixelFormat::Rgb8 | PixelFormat::Bgr8 => 3,
            PixelFormat::Rgba8 | PixelFormat::Bgra8 => 4,
        }
    }
}

/// A width × height × channels image, row-major, 8 bits per channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl Frame {
    /// Wraps a raw pixel buffer.
    ///
    /// Fails with `BufferSize` when `data` is not exactly
    /// `width * height * channels` bytes long, and with `FrameTooLarge` when
    /// that size does not fit in memory. Zero-sized frames are accepted here
    /// and rejected when encoded.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: Vec<u8>,
    ) -> Result<Self, ImageEncodingError> {
        let expected = byte_len(width, height, format)
            .ok_or(ImageEncodingError::FrameTooLarge { width, height })?;
        if data.len() != expected {
            return Err(ImageEncodingError::BufferSize {
                expected,
                actual: data.len(),
            });
        }

        Ok(Self {
            width,
            height,
            format,
            data,
        })
    }

    /// Takes ownership of a decoded image.
    pub fn from_image(image: DynamicImage) -> Self {
        let (width, height) = (image.width(), image.height());
        let (format, data) = match image {
            DynamicImage::ImageLuma8(buffer) => (PixelFormat::Gray8, buffer.into_raw()),
            DynamicImage::ImageRgb8(buffer) => (PixelFormat::Rgb8, buffer.into_raw()),
            DynamicImage::ImageRgba8(buffer) => (PixelFormat::Rgba8, buffer.into_raw()),
            other if other.color().has_alpha() => (PixelFormat::Rgba8, other.to_rgba8().into_raw()),
            other => (PixelFormat::Rgb8, other.to_rgb8().into_raw()),
        };

        Self {
            width,
            height,
            format,
            data,
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// True when the frame has no pixels.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Copies the frame into an RGB-ordered `DynamicImage`.
    ///
    /// BGR(A) buffers are swizzled; the frame itself is left untouched.
    pub(crate) fn to_dynamic_image(&self) -> Result<DynamicImage, ImageEncodingError> {
        let size_error = || ImageEncodingError::BufferSize {
            expected: byte_len(self.width, self.height, self.format).unwrap_or(usize::MAX),
            actual: self.data.len(),
        };

        let image = match self.format {
            PixelFormat::Gray8 => DynamicImage::ImageLuma8(
                ImageBuffer::<Luma<u8>, _>::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(size_error)?,
            ),
            PixelFormat::Rgb8 => DynamicImage::ImageRgb8(
                ImageBuffer::<Rgb<u8>, _>::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(size_error)?,
            ),
            PixelFormat::Bgr8 => DynamicImage::ImageRgb8(
                ImageBuffer::<Rgb<u8>, _>::from_raw(self.width, self.height, swap_red_blue(&self.data, 3))
                    .ok_or_else(size_error)?,
            ),
            PixelFormat::Rgba8 => DynamicImage::ImageRgba8(
                ImageBuffer::<Rgba<u8>, _>::from_raw(self.width, self.height, self.data.clone())
                    .ok_or_else(size_error)?,
            ),
            PixelFormat::Bgra8 => DynamicImage::ImageRgba8(
                ImageBuffer::<Rgba<u8>, _>::from_raw(self.width, self.height, swap_red_blue(&self.data, 4))
                    .ok_or_else(size_error)?,
            ),
        };

        Ok(image)
    }
}

fn byte_len(width: u32, height: u32, format: PixelFormat) -> Option<usize> {
    (width as usize)
        .checked_mul(height as usize)?
        .checked_mul(format.channels())
}

fn swap_red_blue(data: &[u8], channels: usize) -> Vec<u8> {
    let mut swapped = data.to_vec();
    for pixel in swapped.chunks_exact_mut(channels) {
        pixel.swap(0, 2);
    }
    swapped
}
