#[cfg(test)]
mod tests {
    use crate::{
        event_channel, DashboardClient, DeliveryReport, DeliveryWorker, EventProducer, Frame,
        PayloadBuilder, PixelFormat, WorkerExit,
    };
    use mockito::{Matcher, Server};
    use serde_json::json;
    use tracing_test::traced_test;

    fn create_test_frame(width: u32, height: u32) -> Frame {
        let data = (0..width * height * 3).map(|i| (i * 7 % 256) as u8).collect();
        Frame::new(width, height, PixelFormat::Bgr8, data).unwrap()
    }

    #[test]
    #[traced_test]
    fn test_events_flow_from_producer_to_dashboard() {
        let mut server = Server::new();

        // Every PNG starts with the same eight bytes, "iVBORw0KGgo" in Base64
        let helmet = server
            .mock("POST", "/api/events")
            .match_header("authorization", "Bearer e2e_token")
            .match_body(Matcher::AllOf(vec![
                Matcher::PartialJson(json!({
                    "location_id": 1,
                    "type": 2,
                    "detections": [
                        {"type": 0, "details": "no gloves"},
                        {"type": 2, "details": "no helmet"},
                    ],
                })),
                Matcher::Regex(r#""image":"iVBORw0KGgo"#.to_string()),
            ]))
            .with_status(200)
            .with_body(r#"{"saved": true}"#)
            .expect(1)
            .create();
        let unknown = server
            .mock("POST", "/api/events")
            .match_body(Matcher::PartialJson(json!({
                "location_id": 9,
                "type": 1,
                "detections": [],
            })))
            .with_status(200)
            .with_body("<html><title>Accepted</title></html>")
            .expect(1)
            .create();

        let rt = tokio::runtime::Runtime::new().unwrap();

        rt.block_on(async {
            let (tx, rx) = event_channel();
            let client = DashboardClient::new(format!("{}/api/events", server.url()), "e2e_token");
            let worker = DeliveryWorker::new(client);

            let producer = EventProducer::new(PayloadBuilder::default(), tx);
            producer
                .accumulate_event(
                    0,
                    &create_test_frame(32, 24),
                    ["No_Helmet", "No_Gloves", "No_Helmet"],
                )
                .unwrap();
            producer
                .accumulate_event(9, &create_test_frame(8, 8), ["Hard_Hat"])
                .unwrap();
            producer.stop().unwrap();

            let report = worker.run(rx).await;
            assert_eq!(
                report,
                DeliveryReport {
                    delivered: 2,
                    dropped: 0,
                    exit: WorkerExit::Sentinel,
                }
            );
        });

        helmet.assert();
        unknown.assert();
        assert!(logs_contain("Detection type 'Hard_Hat' not found in mapping"));
    }
}
