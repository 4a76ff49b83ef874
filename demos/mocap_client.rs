//! Motion-capture consumer - receives frames and reports actions.
//!
//! This demo:
//! - Connects to a running `mocap_server`
//! - Prints every received frame
//! - Answers every fifth frame with an action report
//! - Exits when the server quits
//!
//! # Running
//!
//! ```text
//! cargo run --example mocap_client -- 127.0.0.1:5003
//! ```

use std::time::Duration;

use mocap_netop::mocap::{max_frame_body, ActionReport, MocapClientCodec, PoseAction};
use mocap_netop::TcpClient;

const REPORT_EVERY: u64 = 5;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mocap_netop=info".parse()?),
        )
        .init();

    let server_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:5003".to_string());

    let mut client = TcpClient::builder(server_addr)
        .body_capacity(max_frame_body(16, 16) as u32)
        .build(MocapClientCodec::new())?;
    client.connect().await?;

    let repo = client.repository();
    let mut received = 0u64;

    while client.is_connected() {
        let frame = match tokio::time::timeout(Duration::from_millis(500), repo.recv_inbound()).await
        {
            Ok(frame) => frame,
            Err(_) => continue,
        };
        received += 1;

        println!(
            "frame {}: {} poses, {} actions",
            frame.timestamp,
            frame.poses.len(),
            frame.actions.len()
        );

        if received % REPORT_EVERY == 0 {
            let actions = frame
                .poses
                .iter()
                .map(|pose| PoseAction {
                    pose_id: pose.id,
                    action: (frame.timestamp % 4) as i32,
                })
                .collect();
            repo.push_outbound(ActionReport {
                timestamp: frame.timestamp,
                actions,
            });
        }
    }

    println!("received {} frames", received);
    client.disconnect().await?;

    Ok(())
}
