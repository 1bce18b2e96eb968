//! Example: stream synthetic sensor frames over UDP while watching the
//! controller adapt.
//!
//! - NetworkController::start_session spawns the monitor and session worker
//! - a synthetic probe reports a healthy wifi link
//! - frames are submitted at ~30 fps and every event is printed
//!
//! Run with:
//! ```
//! cargo run -p pulselink-session --example stream_demo [ENDPOINT]
//! ```

use std::{env::args, error::Error, time::Duration};

use async_trait::async_trait;
use bytes::Bytes;
use pulselink_core::{NetworkClass, NetworkSample, TransmissionFrame};
use pulselink_session::{ControllerOptions, NetworkController, Probe, SessionOptions};
use tracing::{info, metadata::LevelFilter};
use tracing_subscriber::EnvFilter;

struct WifiProbe;

#[async_trait]
impl Probe for WifiProbe {
    async fn sample(&self) -> NetworkSample {
        NetworkSample {
            at: std::time::Instant::now(),
            class: NetworkClass::Wifi,
            throughput_bps: 20_000_000,
            rtt: Duration::from_millis(25),
            signal_strength: 0.9,
            loss_ratio: 0.01,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::default()
                .add_directive("pulselink_session=debug".parse()?)
                .add_directive("pulselink_transport=debug".parse()?)
                .add_directive(LevelFilter::INFO.into()),
        )
        .with_line_number(false)
        .with_file(false)
        .init();

    let endpoint = args().nth(1).unwrap_or_else(|| "127.0.0.1:9000".to_string());
    info!("streaming to {endpoint}");

    let controller = NetworkController::new(ControllerOptions::default());
    let mut events = controller.events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            info!(?event, "event");
        }
    });

    let opts = SessionOptions::default().with_sampling_interval(Duration::from_millis(500));
    let handle = controller.start_session(endpoint, opts, WifiProbe)?;

    let mut ticker = tokio::time::interval(Duration::from_millis(33));
    for seq in 1..=90u64 {
        ticker.tick().await;
        let frame = TransmissionFrame::new(seq, Bytes::from(vec![0u8; 1200]));
        controller.submit_frame(&handle, frame)?;
    }

    controller.stop_session(&handle)?;
    tokio::time::sleep(Duration::from_millis(100)).await;

    if let Some(snapshot) = controller.snapshot(&handle) {
        info!(
            state = %snapshot.state,
            bytes = snapshot.bytes_sent,
            dropped = snapshot.frames_dropped,
            "final session snapshot"
        );
    }
    Ok(())
}
