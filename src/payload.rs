//! Turns raw detection events into `TransmissionPayload`s.

use crate::encoding::ImageEncoder;
use crate::error::ImageEncodingError;
use crate::frame::Frame;
use crate::types::{
    Detection, DetectionLabel, TransmissionPayload, DATE_FORMAT, DEFAULT_SEVERITY,
};
use std::collections::BTreeSet;
use tracing::{debug, warn, Span};

/// Builds payloads from `(location_id, frame, detection_types)` events.
#[derive(Debug, Clone)]
pub struct PayloadBuilder {
    encoder: ImageEncoder,
    span: Span,
}

impl Default for PayloadBuilder {
    fn default() -> Self {
        Self::new(ImageEncoder::default())
    }
}

impl PayloadBuilder {
    pub fn new(encoder: ImageEncoder) -> Self {
        Self {
            encoder,
            span: tracing::info_span!("payload_builder"),
        }
    }

    /// Log under `span` instead of the default `payload_builder` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    pub fn encoder(&self) -> &ImageEncoder {
        &self.encoder
    }

    /// Builds a complete payload or nothing.
    ///
    /// Location 0 is reported as 1. Duplicate labels collapse into one
    /// detection and unknown labels are skipped with a warning. The payload's
    /// `type` is the highest detection code, or 1 when no label was
    /// recognized. Detections are ordered by label.
    pub fn build_payload<I, S>(
        &self,
        location_id: u32,
        frame: &Frame,
        detection_types: I,
    ) -> Result<TransmissionPayload, ImageEncodingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let _guard = self.span.enter();

        let location_id = normalize_location(location_id);
        let date = chrono::Local::now().format(DATE_FORMAT).to_string();

        let unique: BTreeSet<String> = detection_types
            .into_iter()
            .map(|label| label.as_ref().to_string())
            .collect();

        let mut detections = Vec::with_capacity(unique.len());
        for label in &unique {
            match DetectionLabel::parse(label) {
                DetectionLabel::Known(kind) => detections.push(Detection::from(kind)),
                DetectionLabel::Unrecognized(label) => {
                    warn!("Detection type '{}' not found in mapping. Skipping.", label);
                }
            }
        }

        let severity = detections
            .iter()
            .map(|detection| detection.code)
            .max()
            .unwrap_or(DEFAULT_SEVERITY);
        debug!(
            "Location {}: {} distinct labels, {} detections, type {}",
            location_id,
            unique.len(),
            detections.len(),
            severity
        );

        let image = self.encoder.encode_image(frame, false)?;

        Ok(TransmissionPayload {
            location_id,
            date,
            severity,
            detections,
            image,
        })
    }
}

/// Location 0 is not a valid dashboard location and is reported as 1.
pub fn normalize_location(location_id: u32) -> u32 {
    if location_id == 0 {
        1
    } else {
        location_id
    }
}
