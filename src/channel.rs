//! FIFO handoff between producers and the delivery worker.
//!
//! The channel is unbounded: pushing never blocks and never fails while the
//! worker is alive. The stop sentinel travels through the same queue as the
//! payloads, so everything pushed before it is delivered first.

use crate::error::EnqueueError;
use crate::types::TransmissionPayload;
use tokio::sync::mpsc;

/// An item on the event channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Envelope {
    Payload(Box<TransmissionPayload>),
    /// Tells the worker to stop after everything queued before it.
    Stop,
}

/// Producer side of the channel. Cheap to clone and usable from any thread.
#[derive(Debug, Clone)]
pub struct EventSender {
    tx: mpsc::UnboundedSender<Envelope>,
}

/// Consumer side of the channel, owned by the delivery worker.
#[derive(Debug)]
pub struct EventReceiver {
    rx: mpsc::UnboundedReceiver<Envelope>,
}

/// Creates the event channel.
pub fn event_channel() -> (EventSender, EventReceiver) {
    let (tx, rx) = mpsc::unbounded_channel();
    (EventSender { tx }, EventReceiver { rx })
}

impl EventSender {
    /// Queues a payload for delivery.
    pub fn push(&self, payload: TransmissionPayload) -> Result<(), EnqueueError> {
        self.send(Envelope::Payload(Box::new(payload)))
    }

    /// Queues the stop sentinel.
    pub fn stop(&self) -> Result<(), EnqueueError> {
        self.send(Envelope::Stop)
    }

    fn send(&self, envelope: Envelope) -> Result<(), EnqueueError> {
        self.tx
            .send(envelope)
            .map_err(|_| EnqueueError::ChannelClosed)
    }
}

impl EventReceiver {
    /// Waits for the next envelope.
    ///
    /// Returns `None` once every sender has been dropped and the queue is
    /// drained.
    pub async fn pop(&mut self) -> Option<Envelope> {
        self.rx.recv().await
    }

    /// Number of envelopes waiting.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}
