//! Delivery of payloads to the dashboard.
//!
//! `DashboardClient` performs a single POST. `DeliveryWorker` owns a client
//! and drains the event channel one payload at a time, in FIFO order, until it
//! receives the stop sentinel or an external cancellation.
//!
//! A failed delivery never stops the worker. Under the default
//! [`FailurePolicy::Drop`] the payload is logged and discarded; there is no
//! persistence and nothing is reported back to the producer.

use crate::channel::{Envelope, EventReceiver};
use crate::error::DeliveryError;
use crate::response::parse_response;
use crate::types::TransmissionPayload;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn, Instrument, Span};

/// A successful (2xx) dashboard response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivered {
    pub status: u16,
    pub body: String,
}

/// HTTP client bound to one dashboard endpoint and token.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    client: reqwest::Client,
    endpoint: String,
    token: String,
}

impl DashboardClient {
    /// Creates a client without a request timeout.
    ///
    /// A hung endpoint stalls the worker until the transport gives up.
    pub fn new<E: Into<String>, T: Into<String>>(endpoint: E, token: T) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            token: token.into(),
        }
    }

    /// Creates a client whose requests fail after `timeout`.
    pub fn with_timeout<E: Into<String>, T: Into<String>>(
        endpoint: E,
        token: T,
        timeout: Duration,
    ) -> Result<Self, DeliveryError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            token: token.into(),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// POSTs `payload` as JSON with bearer authentication.
    pub async fn submit(&self, payload: &TransmissionPayload) -> Result<Delivered, DeliveryError> {
        debug!("Serializing payload for location {}", payload.location_id);
        let body = serde_json::to_vec(payload)?;

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, format!("Bearer {}", self.token).parse()?);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        debug!("Sending {} bytes to: {}", body.len(), self.endpoint);
        let response = self
            .client
            .post(&self.endpoint)
            .headers(headers)
            .body(body)
            .send()
            .await?;

        let status = response.status();
        debug!("Response status: {}", status);

        let response_text = response.text().await?;

        if !status.is_success() {
            return Err(DeliveryError::Server {
                status_code: status.as_u16(),
                message: response_text,
            });
        }

        Ok(Delivered {
            status: status.as_u16(),
            body: response_text,
        })
    }
}

/// What the worker does with a payload whose submission failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Log and discard the payload.
    #[default]
    Drop,
    /// Resubmit the same payload up to `max_attempts` times in total, waiting
    /// `delay` between attempts, then discard it. Later payloads wait.
    Retry { max_attempts: u32, delay: Duration },
}

impl FailurePolicy {
    fn max_attempts(&self) -> u32 {
        match self {
            FailurePolicy::Drop => 1,
            FailurePolicy::Retry { max_attempts, .. } => (*max_attempts).max(1),
        }
    }

    fn delay(&self) -> Duration {
        match self {
            FailurePolicy::Drop => Duration::ZERO,
            FailurePolicy::Retry { delay, .. } => *delay,
        }
    }
}

/// Why the worker loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The stop sentinel was dequeued.
    Sentinel,
    /// The shutdown signal fired.
    Cancelled,
    /// Every sender was dropped and the queue was drained.
    ChannelClosed,
}

/// Totals for one run of the worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub dropped: usize,
    pub exit: WorkerExit,
}

enum Undelivered {
    Dropped,
    Cancelled,
}

/// Single consumer of the event channel.
#[derive(Debug)]
pub struct DeliveryWorker {
    client: DashboardClient,
    policy: FailurePolicy,
    shutdown: Option<watch::Receiver<bool>>,
    span: Span,
}

impl DeliveryWorker {
    pub fn new(client: DashboardClient) -> Self {
        Self {
            client,
            policy: FailurePolicy::Drop,
            shutdown: None,
            span: tracing::info_span!("delivery_worker"),
        }
    }

    pub fn with_policy(mut self, policy: FailurePolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop as soon as `shutdown` holds `true`, without waiting for the
    /// sentinel. A request already in flight is allowed to finish.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    /// Log under `span` instead of the default `delivery_worker` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Runs the worker on the current tokio runtime.
    pub fn spawn(self, events: EventReceiver) -> JoinHandle<DeliveryReport> {
        tokio::spawn(self.run(events))
    }

    /// Drains `events` until the sentinel, cancellation, or channel closure.
    pub async fn run(self, events: EventReceiver) -> DeliveryReport {
        let span = self.span.clone();
        self.run_loop(events).instrument(span).await
    }

    async fn run_loop(mut self, mut events: EventReceiver) -> DeliveryReport {
        info!("Delivery worker started for {}", self.client.endpoint());
        let mut delivered = 0;
        let mut dropped = 0;

        let exit = loop {
            let envelope = tokio::select! {
                biased;
                _ = cancelled(&mut self.shutdown) => break WorkerExit::Cancelled,
                envelope = events.pop() => envelope,
            };

            let payload = match envelope {
                Some(Envelope::Payload(payload)) => payload,
                Some(Envelope::Stop) => {
                    info!("Received stop sentinel. Stopping delivery worker.");
                    break WorkerExit::Sentinel;
                }
                None => {
                    info!("Event channel closed. Stopping delivery worker.");
                    break WorkerExit::ChannelClosed;
                }
            };
            debug!("{} events waiting", events.len());

            match self.deliver(&payload).await {
                Ok(()) => delivered += 1,
                Err(Undelivered::Dropped) => dropped += 1,
                Err(Undelivered::Cancelled) => {
                    dropped += 1;
                    break WorkerExit::Cancelled;
                }
            }
        };

        if exit == WorkerExit::Cancelled {
            info!("Shutdown requested. Stopping delivery worker.");
        }
        info!(
            "Delivery worker finished: {} delivered, {} dropped",
            delivered, dropped
        );

        DeliveryReport {
            delivered,
            dropped,
            exit,
        }
    }

    async fn deliver(&mut self, payload: &TransmissionPayload) -> Result<(), Undelivered> {
        let attempts = self.policy.max_attempts();

        for attempt in 1..=attempts {
            match self.client.submit(payload).await {
                Ok(delivered) => {
                    info!("Event pushed successfully: {}", delivered.status);
                    let parsed = parse_response(&delivered.body);
                    debug!("Response from dashboard: {}", parsed);
                    return Ok(());
                }
                Err(e) => {
                    error!(
                        "Error pushing event to dashboard (attempt {}/{}): {}",
                        attempt, attempts, e
                    );
                    if attempt < attempts {
                        tokio::select! {
                            biased;
                            _ = cancelled(&mut self.shutdown) => return Err(Undelivered::Cancelled),
                            _ = tokio::time::sleep(self.policy.delay()) => {}
                        }
                    }
                }
            }
        }

        warn!(
            "Dropping event for location {} dated {}",
            payload.location_id, payload.date
        );
        Err(Undelivered::Dropped)
    }
}

/// Convenience for a worker with default policy and no external shutdown.
pub async fn run_delivery_loop(events: EventReceiver, client: DashboardClient) -> DeliveryReport {
    DeliveryWorker::new(client).run(events).await
}

// Resolves once shutdown is requested; never resolves without a signal.
async fn cancelled(shutdown: &mut Option<watch::Receiver<bool>>) {
    if let Some(rx) = shutdown {
        let signalled = rx.wait_for(|stop| *stop).await.is_ok();
        if signalled {
            return;
        }
    }
    std::future::pending::<()>().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::event_channel;
    use crate::types::{Detection, DetectionType};
    use mockito::{Matcher, Server};
    use serde_json::json;
    use tracing_test::traced_test;

    const TOKEN: &str = "test_token";

    fn create_test_payload(location_id: u32) -> TransmissionPayload {
        TransmissionPayload {
            location_id,
            date: "2024-05-01 10:00:00".to_string(),
            severity: 2,
            detections: vec![Detection::from(DetectionType::NoHelmet)],
            image: "iVBORw0KGgo=".to_string(),
        }
    }

    fn create_worker(url: &str) -> DeliveryWorker {
        DeliveryWorker::new(DashboardClient::new(format!("{}/events", url), TOKEN))
    }

    #[test]
    #[traced_test]
    fn test_successful_delivery() {
        let mut server = Server::new();

        let mock = server
            .mock("POST", "/events")
            .match_header("authorization", "Bearer test_token")
            .match_header("content-type", "application/json")
            .match_body(Matcher::Json(json!({
                "location_id": 4,
                "date": "2024-05-01 10:00:00",
                "type": 2,
                "detections": [{"type": 2, "details": "no helmet"}],
                "image": "iVBORw0KGgo=",
            })))
            .with_status(201)
            .with_header("content-type", "application/json")
            .with_body(r#"{"id": 17}"#)
            .expect(1)
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let (tx, rx) = event_channel();
            tx.push(create_test_payload(4)).unwrap();
            tx.stop().unwrap();

            let report = create_worker(&server.url()).run(rx).await;
            assert_eq!(
                report,
                DeliveryReport {
                    delivered: 1,
                    dropped: 0,
                    exit: WorkerExit::Sentinel,
                }
            );
        });

        mock.assert();
        assert!(logs_contain("Event pushed successfully: 201"));
        assert!(logs_contain("Received stop sentinel"));
    }

    #[test]
    fn test_submit_reports_server_error() {
        let mut server = Server::new();

        let mock = server
            .mock("POST", "/events")
            .with_status(400)
            .with_body("Invalid data")
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let client = DashboardClient::new(format!("{}/events", server.url()), TOKEN);
            let result = client.submit(&create_test_payload(1)).await;

            match result {
                Err(DeliveryError::Server {
                    status_code,
                    message,
                }) => {
                    assert_eq!(status_code, 400);
                    assert_eq!(message, "Invalid data");
                }
                other => panic!("Expected Server error, got {:?}", other),
            }
        });

        mock.assert();
    }

    #[test]
    fn test_items_after_sentinel_are_not_delivered() {
        let mut server = Server::new();

        let mock = server
            .mock("POST", "/events")
            .with_status(200)
            .with_body("{}")
            .expect(2)
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let (tx, rx) = event_channel();
            tx.push(create_test_payload(1)).unwrap();
            tx.push(create_test_payload(2)).unwrap();
            tx.stop().unwrap();
            tx.push(create_test_payload(3)).unwrap();

            let report = create_worker(&server.url()).run(rx).await;
            assert_eq!(report.delivered, 2);
            assert_eq!(report.exit, WorkerExit::Sentinel);
        });

        mock.assert();
    }

    #[test]
    #[traced_test]
    fn test_failed_delivery_does_not_stop_worker() {
        let mut server = Server::new();

        let failing = server
            .mock("POST", "/events")
            .match_body(Matcher::PartialJson(json!({"location_id": 5})))
            .with_status(500)
            .with_header("content-type", "text/html")
            .with_body("<html><head><title>Oops</title></head></html>")
            .expect(1)
            .create();
        let succeeding = server
            .mock("POST", "/events")
            .match_body(Matcher::PartialJson(json!({"location_id": 6})))
            .with_status(200)
            .with_body(r#"{"ok": true}"#)
            .expect(1)
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let (tx, rx) = event_channel();
            tx.push(create_test_payload(5)).unwrap();
            tx.push(create_test_payload(6)).unwrap();
            tx.stop().unwrap();

            let report = create_worker(&server.url()).run(rx).await;
            assert_eq!(
                report,
                DeliveryReport {
                    delivered: 1,
                    dropped: 1,
                    exit: WorkerExit::Sentinel,
                }
            );
        });

        failing.assert();
        succeeding.assert();
        assert!(logs_contain("Error pushing event to dashboard"));
        assert!(logs_contain("Dashboard returned 500"));
    }

    #[test]
    #[traced_test]
    fn test_transport_errors_are_contained() {
        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let (tx, rx) = event_channel();
            tx.push(create_test_payload(1)).unwrap();
            tx.push(create_test_payload(2)).unwrap();
            tx.stop().unwrap();

            // Nothing listens on port 1
            let report = create_worker("http://127.0.0.1:1").run(rx).await;
            assert_eq!(report.delivered, 0);
            assert_eq!(report.dropped, 2);
            assert_eq!(report.exit, WorkerExit::Sentinel);
        });

        assert!(logs_contain("Network error"));
    }

    #[test]
    fn test_retry_policy_resubmits() {
        let mut server = Server::new();

        let mock = server
            .mock("POST", "/events")
            .with_status(503)
            .with_body("busy")
            .expect(3)
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let (tx, rx) = event_channel();
            tx.push(create_test_payload(1)).unwrap();
            tx.stop().unwrap();

            let report = create_worker(&server.url())
                .with_policy(FailurePolicy::Retry {
                    max_attempts: 3,
                    delay: Duration::from_millis(1),
                })
                .run(rx)
                .await;
            assert_eq!(report.dropped, 1);
            assert_eq!(report.exit, WorkerExit::Sentinel);
        });

        mock.assert();
    }

    #[test]
    fn test_cancellation_interrupts_retry_delay() {
        let mut server = Server::new();

        let mock = server
            .mock("POST", "/events")
            .with_status(500)
            .expect(1)
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let (shutdown_tx, shutdown_rx) = watch::channel(false);
            let (tx, rx) = event_channel();
            tx.push(create_test_payload(1)).unwrap();

            let handle = create_worker(&server.url())
                .with_policy(FailurePolicy::Retry {
                    max_attempts: 5,
                    delay: Duration::from_secs(60),
                })
                .with_shutdown(shutdown_rx)
                .spawn(rx);

            for _ in 0..500 {
                if mock.matched_async().await {
                    break;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            shutdown_tx.send(true).unwrap();

            let report = tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .expect("worker did not observe cancellation")
                .unwrap();
            assert_eq!(report.exit, WorkerExit::Cancelled);
            assert_eq!(report.dropped, 1);
        });

        mock.assert();
    }

    #[tokio::test]
    async fn test_cancellation_without_sentinel() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let (_tx, rx) = event_channel();

        let handle = create_worker("http://127.0.0.1:1")
            .with_shutdown(shutdown_rx)
            .spawn(rx);
        shutdown_tx.send(true).unwrap();

        let report = handle.await.unwrap();
        assert_eq!(
            report,
            DeliveryReport {
                delivered: 0,
                dropped: 0,
                exit: WorkerExit::Cancelled,
            }
        );
    }

    #[tokio::test]
    async fn test_closed_channel_ends_worker() {
        let (tx, rx) = event_channel();
        drop(tx);

        let client = DashboardClient::new("http://127.0.0.1:1/events", TOKEN);
        let report = run_delivery_loop(rx, client).await;
        assert_eq!(report.exit, WorkerExit::ChannelClosed);
    }

    #[test]
    fn test_failure_policy_attempts() {
        assert_eq!(FailurePolicy::Drop.max_attempts(), 1);
        let retry = FailurePolicy::Retry {
            max_attempts: 0,
            delay: Duration::from_millis(5),
        };
        assert_eq!(retry.max_attempts(), 1);
        assert_eq!(retry.delay(), Duration::from_millis(5));
    }
}
