//! Relay for detection events.
//!
//! Detection events (a location, a frame and the labels the detector found)
//! are turned into [`TransmissionPayload`]s by a [`PayloadBuilder`], queued on
//! an unbounded FIFO channel and posted one at a time to a dashboard by a
//! [`DeliveryWorker`].
//!
//! ```no_run
//! use dashboard_relay::{
//!     event_channel, DashboardClient, DeliveryWorker, EventProducer, Frame, PayloadBuilder,
//!     PixelFormat,
//! };
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, rx) = event_channel();
//! let worker = DeliveryWorker::new(DashboardClient::new("https://dashboard.local/api", "token"))
//!     .spawn(rx);
//!
//! let producer = EventProducer::new(PayloadBuilder::default(), tx);
//! let frame = Frame::new(2, 2, PixelFormat::Bgr8, vec![0; 12])?;
//! producer.accumulate_event(3, &frame, ["No_Helmet", "No_Gloves"])?;
//! producer.stop()?;
//!
//! let report = worker.await?;
//! println!("{} delivered", report.delivered);
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod delivery;
pub mod encoding;
mod error;
pub mod frame;
pub mod payload;
pub mod producer;
pub mod response;
pub mod types;

pub use channel::{event_channel, Envelope, EventReceiver, EventSender};
pub use config::RelayConfig;
pub use delivery::{
    run_delivery_loop, DashboardClient, Delivered, DeliveryReport, DeliveryWorker, FailurePolicy,
    WorkerExit,
};
pub use encoding::ImageEncoder;
pub use error::{ConfigError, DeliveryError, EnqueueError, ImageEncodingError};
pub use frame::{Frame, PixelFormat};
pub use payload::PayloadBuilder;
pub use producer::EventProducer;
pub use response::{parse_response, MarkupSummary, ParsedResponse};
pub use types::{Detection, DetectionLabel, DetectionType, TransmissionPayload};

#[cfg(test)]
mod tests;
