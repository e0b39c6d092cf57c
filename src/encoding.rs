//! PNG + Base64 transcoding of frames.
//!
//! Every encoded image is decoded again before it is handed out, so a payload
//! never carries Base64 text that the dashboard would fail to read.

use crate::error::ImageEncodingError;
use crate::frame::Frame;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::codecs::png::{CompressionType, FilterType as PngFilter, PngEncoder};
use image::imageops::FilterType;
use image::ImageEncoder as _;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn, Span};

/// Resolution used for live-stream frames.
pub const LIVE_STREAM_SIZE: (u32, u32) = (960, 540);

/// Mid-range PNG compression level.
pub const DEFAULT_COMPRESSION: u8 = 5;

/// Highest accepted PNG compression level.
pub const MAX_COMPRESSION: u8 = 9;

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

/// Turns frames into validated Base64 PNG text.
#[derive(Debug, Clone)]
pub struct ImageEncoder {
    compression: u8,
    debug_dump: Option<PathBuf>,
    span: Span,
}

impl Default for ImageEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_COMPRESSION)
    }
}

impl ImageEncoder {
    /// Creates an encoder with a PNG compression level in `0..=9`.
    ///
    /// Higher levels are clamped to 9. The level only trades CPU time for
    /// size; PNG is always lossless.
    pub fn new(compression: u8) -> Self {
        Self {
            compression: compression.min(MAX_COMPRESSION),
            debug_dump: None,
            span: tracing::info_span!("image_encoder"),
        }
    }

    /// Also write every encoded image to `path`, overwriting it each time.
    ///
    /// The dump is for inspection only. Failing to write it is logged and
    /// otherwise ignored.
    pub fn with_debug_dump<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.debug_dump = Some(path.into());
        self
    }

    /// Log under `span` instead of the default `image_encoder` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn compression(&self) -> u8 {
        self.compression
    }

    pub fn debug_dump(&self) -> Option<&Path> {
        self.debug_dump.as_deref()
    }

    /// Encodes `frame` as PNG and returns the Base64 text.
    ///
    /// With `for_live_stream` the frame is first resized to 960×540. The
    /// caller's frame is never modified.
    pub fn encode_image(
        &self,
        frame: &Frame,
        for_live_stream: bool,
    ) -> Result<String, ImageEncodingError> {
        let _guard = self.span.enter();

        match self.encode_validated(frame, for_live_stream) {
            Ok(encoded) => {
                info!("Image successfully encoded and validated as Base64");
                self.write_debug_dump(&encoded);
                Ok(encoded)
            }
            Err(e) => {
                error!("Error encoding image: {}", e);
                Err(e)
            }
        }
    }

    fn encode_validated(
        &self,
        frame: &Frame,
        for_live_stream: bool,
    ) -> Result<String, ImageEncodingError> {
        if frame.is_empty() {
            return Err(ImageEncodingError::EmptyFrame);
        }

        let mut image = frame.to_dynamic_image()?;
        if for_live_stream {
            let (width, height) = LIVE_STREAM_SIZE;
            debug!(
                "Resizing frame from {}x{} to {}x{}",
                frame.width(),
                frame.height(),
                width,
                height
            );
            image = image.resize_exact(width, height, FilterType::Triangle);
        }

        let mut png = Vec::new();
        let encoder =
            PngEncoder::new_with_quality(&mut png, self.compression_type(), PngFilter::Adaptive);
        encoder.write_image(
            image.as_bytes(),
            image.width(),
            image.height(),
            image.color().into(),
        )?;
        debug!("Encoded {} PNG bytes", png.len());

        let encoded = STANDARD.encode(&png);

        let decoded = STANDARD.decode(encoded.as_bytes())?;
        if decoded != png {
            return Err(ImageEncodingError::Corrupted(
                "decoded bytes differ from the PNG stream".to_string(),
            ));
        }
        if !decoded.starts_with(&PNG_SIGNATURE) {
            return Err(ImageEncodingError::Corrupted(
                "missing PNG signature".to_string(),
            ));
        }

        Ok(encoded)
    }

    fn compression_type(&self) -> CompressionType {
        match self.compression {
            0..=3 => CompressionType::Fast,
            4..=6 => CompressionType::Default,
            _ => CompressionType::Best,
        }
    }

    fn write_debug_dump(&self, encoded: &str) {
        let Some(path) = &self.debug_dump else {
            return;
        };

        match std::fs::write(path, encoded) {
            Ok(()) => debug!("Encoded Base64 string written to {}", path.display()),
            Err(e) => warn!(
                "Failed to write encoded image to {}: {}",
                path.display(),
                e
            ),
        }
    }
}
