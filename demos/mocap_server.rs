//! Motion-capture producer - broadcasts synthetic frames.
//!
//! This demo:
//! - Binds the server, retrying for up to 2 seconds while the port is busy
//! - Broadcasts 100 synthetic frames of walking skeletons
//! - Prints the action reports sent back by consumers
//!
//! # Running
//!
//! ```text
//! cargo run --example mocap_server -- 0.0.0.0:5003
//! cargo run --example mocap_client -- 127.0.0.1:5003
//! ```
//!
//! Set `RUST_LOG=mocap_netop=debug` for per-connection logs.

use std::time::{Duration, Instant};

use mocap_netop::mocap::{max_frame_body, Joint, MocapFrame, MocapServerCodec, Pose, PoseAction};
use mocap_netop::{NetopError, TcpServer};

const FRAME_COUNT: u64 = 100;
const POSES_PER_FRAME: u64 = 3;
const FRAME_INTERVAL: Duration = Duration::from_millis(33);
const BIND_RETRY: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("mocap_netop=info".parse()?),
        )
        .init();

    let bind_addr = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "0.0.0.0:5003".to_string());

    let mut server = TcpServer::builder(bind_addr)
        .max_connections(5)
        .body_capacity(max_frame_body(POSES_PER_FRAME as usize, POSES_PER_FRAME as usize) as u32)
        .build(MocapServerCodec)?;

    start_with_retry(&mut server).await?;

    let repo = server.repository();
    for n in 0..FRAME_COUNT {
        repo.push_outbound(synthetic_frame(n));

        while let Some(report) = repo.pop_inbound() {
            for action in &report.actions {
                println!(
                    "frame {}: pose {} -> action {}",
                    report.timestamp, action.pose_id, action.action
                );
            }
        }

        tokio::time::sleep(FRAME_INTERVAL).await;
    }

    println!("stats: {}", serde_json::to_string(&server.stats())?);
    server.stop().await?;

    Ok(())
}

/// Bind, retrying while the address is still held by a previous run.
async fn start_with_retry(server: &mut TcpServer<MocapServerCodec>) -> mocap_netop::Result<()> {
    let deadline = Instant::now() + BIND_RETRY;
    loop {
        match server.start().await {
            Err(NetopError::Bind { addr, source }) if Instant::now() < deadline => {
                tracing::warn!("bind {} failed ({}), retrying", addr, source);
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
            result => return result,
        }
    }
}

fn synthetic_frame(n: u64) -> MocapFrame {
    let t = n as f32 * FRAME_INTERVAL.as_secs_f32();

    let poses = (0..POSES_PER_FRAME)
        .map(|id| {
            let mut pose = Pose::new(id);
            for (j, joint) in pose.joints.iter_mut().enumerate() {
                *joint = Joint {
                    x: id as f32 + 0.5 * t,
                    y: j as f32 * 0.1,
                    z: (t + j as f32).sin() * 0.05,
                };
            }
            pose
        })
        .collect();

    MocapFrame {
        timestamp: n,
        poses,
        actions: vec![PoseAction {
            pose_id: n % POSES_PER_FRAME,
            action: 0,
        }],
    }
}
