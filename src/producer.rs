//! Producer-facing entry points.

use crate::channel::EventSender;
use crate::error::EnqueueError;
use crate::frame::Frame;
use crate::payload::PayloadBuilder;
use tracing::info;

/// Builds payloads from detection events and queues them for delivery.
///
/// Building happens synchronously on the caller's thread, so encoding errors
/// reach the caller and the event is not queued.
#[derive(Debug, Clone)]
pub struct EventProducer {
    builder: PayloadBuilder,
    sender: EventSender,
}

impl EventProducer {
    pub fn new(builder: PayloadBuilder, sender: EventSender) -> Self {
        Self { builder, sender }
    }

    /// Builds a payload for one detection event and queues it.
    pub fn accumulate_event<I, S>(
        &self,
        location_id: u32,
        frame: &Frame,
        detection_types: I,
    ) -> Result<(), EnqueueError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let payload = self
            .builder
            .build_payload(location_id, frame, detection_types)?;
        info!("Final results for queue: {:?}", payload);
        self.sender.push(payload)
    }

    /// Queues the stop sentinel; the worker exits once it reaches it.
    pub fn stop(&self) -> Result<(), EnqueueError> {
        info!("Queueing stop sentinel");
        self.sender.stop()
    }
}
