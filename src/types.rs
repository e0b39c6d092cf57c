//! Data structures shared by the payload builder and the delivery worker.
//!
//! `TransmissionPayload` is the wire record posted to the dashboard. Its
//! serialized field names follow the dashboard API, so the Rust names differ
//! in a few places (`severity` is sent as `type`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Protective-equipment violations the dashboard understands.
///
/// The dashboard identifies each violation by a numeric code, which also
/// acts as its severity:
/// - 0: NoGloves
/// - 1: NoSleeves
/// - 2: NoHelmet
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DetectionType {
    /// Worker without gloves (0)
    NoGloves = 0,
    /// Worker without sleeves (1)
    NoSleeves = 1,
    /// Worker without a helmet (2)
    NoHelmet = 2,
}

impl DetectionType {
    /// All known detection types, in code order.
    pub const ALL: [DetectionType; 3] = [
        DetectionType::NoGloves,
        DetectionType::NoSleeves,
        DetectionType::NoHelmet,
    ];

    /// Numeric code sent to the dashboard.
    pub fn code(self) -> u8 {
        self as u8
    }

    /// Label as produced by the detector.
    pub fn label(self) -> &'static str {
        match self {
            DetectionType::NoGloves => "No_Gloves",
            DetectionType::NoSleeves => "No_Sleeves",
            DetectionType::NoHelmet => "No_Helmet",
        }
    }

    /// Human-readable form: lowercase, underscores replaced by spaces.
    pub fn details(self) -> String {
        self.label().replace('_', " ").to_lowercase()
    }
}

impl fmt::Display for DetectionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Result of interpreting a raw detector label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionLabel {
    Known(DetectionType),
    Unrecognized(String),
}

impl DetectionLabel {
    /// Matches `label` exactly (case-sensitive) against the known labels.
    pub fn parse(label: &str) -> Self {
        DetectionType::ALL
            .into_iter()
            .find(|kind| kind.label() == label)
            .map(DetectionLabel::Known)
            .unwrap_or_else(|| DetectionLabel::Unrecognized(label.to_string()))
    }
}

/// One entry of the payload's `detections` list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Detection {
    /// Detection code
    #[serde(rename = "type")]
    pub code: u8,
    /// Readable description, e.g. "no helmet"
    pub details: String,
}

impl From<DetectionType> for Detection {
    fn from(kind: DetectionType) -> Self {
        Self {
            code: kind.code(),
            details: kind.details(),
        }
    }
}

/// Severity reported when an event has no recognized detections.
pub const DEFAULT_SEVERITY: u8 = 1;

/// Timestamp layout used in the `date` field.
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Transmission-ready record built from one detection event.
///
/// The image has already been encoded and validated when a payload exists,
/// so the channel never carries raw frames.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmissionPayload {
    /// Location identifier (never 0)
    pub location_id: u32,
    /// Local time of construction, `YYYY-MM-DD HH:MM:SS`
    pub date: String,
    /// Highest code among `detections`, or 1 when empty
    #[serde(rename = "type")]
    pub severity: u8,
    /// Distinct recognized detections
    pub detections: Vec<Detection>,
    /// Base64 of the PNG-encoded frame
    pub image: String,
}

// The image is routinely hundreds of kilobytes; keep it out of log lines.
impl fmt::Debug for TransmissionPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransmissionPayload")
            .field("location_id", &self.location_id)
            .field("date", &self.date)
            .field("type", &self.severity)
            .field("detections", &self.detections)
            .field("image", &format_args!("<{} base64 chars>", self.image.len()))
            .finish()
    }
}
