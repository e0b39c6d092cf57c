//! Error types for the dashboard relay.
//!
//! Errors are split by where they surface. Payload construction errors
//! (`ImageEncodingError`, `EnqueueError`) are returned to the producer.
//! Delivery errors (`DeliveryError`) never leave the worker loop; the worker
//! logs them and moves on. `ConfigError` is only seen at startup.

use std::error::Error;
use std::fmt;
use thiserror::Error;

/// Represents all the ways turning a frame into a Base64 PNG can fail.
///
/// Any of these is fatal for the event being built: the payload is not
/// constructed and nothing is enqueued.
#[derive(Error, Debug)]
pub enum ImageEncodingError {
    /// The frame has zero width or zero height.
    #[error("Cannot encode an empty frame")]
    EmptyFrame,

    /// The pixel buffer does not match the declared dimensions.
    ///
    /// This error occurs when:
    /// - The buffer was truncated by the producer
    /// - The pixel format does not match the channel count of the data
    #[error("Frame buffer has {actual} bytes, expected {expected}")]
    BufferSize { expected: usize, actual: usize },

    /// The declared dimensions describe more bytes than can be addressed.
    #[error("Frame of {width}x{height} pixels is too large")]
    FrameTooLarge { width: u32, height: u32 },

    /// The PNG encoder or the resize step rejected the frame.
    #[error("PNG encoding failed: {0}")]
    Png(#[from] image::ImageError),

    /// The Base64 text could not be decoded back.
    #[error("Base64 validation failed: {0}")]
    Base64(#[from] base64::DecodeError),

    /// The Base64 text decoded, but not to the PNG bytes that were encoded.
    #[error("Encoded image is corrupted: {0}")]
    Corrupted(String),
}

/// Errors returned to a producer when an event cannot be queued.
#[derive(Error, Debug)]
pub enum EnqueueError {
    /// The payload could not be built.
    #[error("Failed to build payload: {0}")]
    Encoding(#[from] ImageEncodingError),

    /// The delivery worker has dropped its end of the channel.
    #[error("Event channel is closed")]
    ChannelClosed,
}

/// Invalid or missing configuration.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration variable {0}")]
    Missing(&'static str),

    #[error("Invalid value {value:?} for {var}")]
    Invalid { var: &'static str, value: String },
}

/// A failed submission to the dashboard.
#[derive(Debug)]
pub enum DeliveryError {
    Server {
        status_code: u16,
        message: String,
    },
    Network(reqwest::Error),
    Json(serde_json::Error),
    Header(reqwest::header::InvalidHeaderValue),
}

impl fmt::Display for DeliveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeliveryError::Server {
                status_code,
                message,
            } => {
                write!(f, "Dashboard returned {}: {}", status_code, message)
            }
            DeliveryError::Network(e) => write!(f, "Network error: {}", e),
            DeliveryError::Json(e) => write!(f, "JSON error: {}", e),
            DeliveryError::Header(e) => write!(f, "Header error: {}", e),
        }
    }
}

impl Error for DeliveryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            DeliveryError::Network(e) => Some(e),
            DeliveryError::Json(e) => Some(e),
            DeliveryError::Header(e) => Some(e),
            DeliveryError::Server { .. } => None,
        }
    }
}

impl From<reqwest::Error> for DeliveryError {
    fn from(err: reqwest::Error) -> Self {
        DeliveryError::Network(err)
    }
}

impl From<serde_json::Error> for DeliveryError {
    fn from(err: serde_json::Error) -> Self {
        DeliveryError::Json(err)
    }
}

impl From<reqwest::header::InvalidHeaderValue> for DeliveryError {
    fn from(err: reqwest::header::InvalidHeaderValue) -> Self {
        DeliveryError::Header(err)
    }
}
