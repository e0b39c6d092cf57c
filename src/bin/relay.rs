//! Dashboard relay
//!
//! Sends one detection event per image file to the dashboard configured in the
//! environment, then stops the delivery worker and reports what was sent.
//!
//! Usage:
//!   relay --location <id> --label No_Helmet --label No_Gloves <images>... [--env-file <path>] [--debug]

use clap::Parser;
use dashboard_relay::{
    event_channel, DeliveryWorker, EventProducer, Frame, PayloadBuilder, RelayConfig,
};
use std::error::Error;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// Command line parameters for the relay
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Location the detections were made at
    #[arg(short, long, default_value_t = 1)]
    location: u32,

    /// Detection label, may be repeated (e.g. No_Helmet)
    #[arg(short = 't', long = "label")]
    labels: Vec<String>,

    /// Environment file with DASHBOARD_LINK, TOKEN, ...
    #[arg(short, long)]
    env_file: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, default_value_t = false)]
    debug: bool,

    /// Images to send, one event each
    #[arg(required = true)]
    images: Vec<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if args.debug { "debug" } else { "info" }));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Some(path) = &args.env_file {
        dotenvy::from_path(path)?;
    }
    let config = RelayConfig::from_env()?;
    info!("Relaying to {}", config.dashboard_url);

    let (tx, rx) = event_channel();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let worker = DeliveryWorker::new(config.dashboard_client()?)
        .with_policy(config.failure_policy)
        .with_shutdown(shutdown_rx.clone())
        .spawn(rx);

    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, stopping delivery worker");
            let _ = shutdown_tx.send(true);
        }
    });

    let producer = EventProducer::new(PayloadBuilder::new(config.image_encoder()), tx);
    let location = args.location;
    let labels = args.labels;
    let images = args.images;

    // PNG encoding is CPU bound, keep it off the async workers
    let queued = tokio::task::spawn_blocking(move || {
        let queued = queue_images(&producer, location, &labels, &images, &shutdown_rx);
        if let Err(e) = producer.stop() {
            warn!("Could not queue stop sentinel: {}", e);
        }
        queued
    })
    .await?;
    info!("Queued {} events", queued);

    let report = worker.await?;
    info!(
        "Done: {} delivered, {} dropped ({:?})",
        report.delivered, report.dropped, report.exit
    );

    Ok(())
}

/// Queues one event per readable image and returns how many were queued.
///
/// Stops before the next image once shutdown has been requested.
fn queue_images(
    producer: &EventProducer,
    location: u32,
    labels: &[String],
    images: &[PathBuf],
    shutdown: &watch::Receiver<bool>,
) -> usize {
    let mut queued = 0;
    for path in images {
        if *shutdown.borrow() {
            warn!("Shutdown requested, skipping remaining images");
            break;
        }
        let frame = match image::open(path) {
            Ok(image) => Frame::from_image(image),
            Err(e) => {
                error!("Failed to read {}: {}", path.display(), e);
                continue;
            }
        };
        match producer.accumulate_event(location, &frame, labels) {
            Ok(()) => queued += 1,
            Err(e) => error!("Failed to queue {}: {}", path.display(), e),
        }
    }
    queued
}
