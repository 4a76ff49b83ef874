//! Motion-capture payload codec.
//!
//! A producer broadcasts [`MocapFrame`]s (3D poses plus recognized actions);
//! consumers answer with [`ActionReport`]s. Body layouts, all big-endian:
//!
//! ```text
//! frame body:
//! ┌─────────────┬────────────────────────────────────┬──────────────┬──────────────────────────┐
//! │ pose_count  │ pose_count × pose                  │ action_count │ action_count × action    │
//! │ u32         │ u64 id, 17 × (f32 x, f32 y, f32 z) │ u32          │ u64 pose_id, i32 action  │
//! └─────────────┴────────────────────────────────────┴──────────────┴──────────────────────────┘
//!
//! action report body:
//! ┌──────────────┬──────────────────────────┐
//! │ action_count │ action_count × action    │
//! └──────────────┴──────────────────────────┘
//! ```
//!
//! The frame timestamp travels in the frame header, not in the body.
//!
//! # Example
//!
//! ```
//! use mocap_netop::codec::Codec;
//! use mocap_netop::mocap::{MocapClientCodec, MocapFrame, MocapServerCodec, Pose};
//! use bytes::BytesMut;
//!
//! let frame = MocapFrame {
//!     timestamp: 1_700,
//!     poses: vec![Pose::new(1)],
//!     actions: vec![],
//! };
//!
//! let mut body = BytesMut::new();
//! MocapServerCodec.encode(&frame, &mut body).unwrap();
//!
//! let received = MocapClientCodec::default().decode(1_700, &body).unwrap();
//! assert_eq!(received, frame);
//! ```

use bytes::{Buf, BufMut, BytesMut};
use serde::{Deserialize, Serialize};

use crate::codec::Codec;
use crate::error::{NetopError, Result};

/// Joints per pose.
pub const JOINT_COUNT: usize = 17;

/// Encoded size of one joint.
pub const JOINT_SIZE: usize = 12;

/// Encoded size of one pose.
pub const POSE_SIZE: usize = 8 + JOINT_COUNT * JOINT_SIZE;

/// Encoded size of one pose action.
pub const ACTION_SIZE: usize = 12;

/// Body capacity needed for frames of up to `max_poses` poses and
/// `max_actions` actions.
///
/// ```
/// use mocap_netop::mocap::max_frame_body;
///
/// assert_eq!(max_frame_body(0, 0), 8);
/// assert_eq!(max_frame_body(1, 1), 8 + 212 + 12);
/// ```
pub const fn max_frame_body(max_poses: usize, max_actions: usize) -> usize {
    4 + max_poses * POSE_SIZE + 4 + max_actions * ACTION_SIZE
}

/// One 3D joint position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Joint {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// One tracked skeleton.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Tracking id, stable across frames.
    pub id: u64,
    pub joints: [Joint; JOINT_COUNT],
}

impl Pose {
    /// A pose with every joint at the origin.
    pub fn new(id: u64) -> Self {
        Self {
            id,
            joints: [Joint::default(); JOINT_COUNT],
        }
    }
}

/// Recognized action of one pose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PoseAction {
    pub pose_id: u64,
    pub action: i32,
}

/// One captured frame as broadcast by the producer.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MocapFrame {
    pub timestamp: u64,
    pub poses: Vec<Pose>,
    pub actions: Vec<PoseAction>,
}

impl MocapFrame {
    /// Encoded body size of this frame.
    pub fn body_len(&self) -> usize {
        max_frame_body(self.poses.len(), self.actions.len())
    }
}

/// Actions a consumer recognized, sent back to the producer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionReport {
    /// Timestamp of the frame this report answers.
    pub timestamp: u64,
    pub actions: Vec<PoseAction>,
}

/// Producer side: sends [`MocapFrame`]s, receives [`ActionReport`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct MocapServerCodec;

impl Codec for MocapServerCodec {
    type Outbound = MocapFrame;
    type Inbound = ActionReport;

    fn timestamp(&self, item: &MocapFrame) -> u64 {
        item.timestamp
    }

    fn encode(&self, item: &MocapFrame, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(item.body_len());
        put_count(dst, item.poses.len())?;
        for pose in &item.poses {
            dst.put_u64(pose.id);
            for joint in &pose.joints {
                dst.put_f32(joint.x);
                dst.put_f32(joint.y);
                dst.put_f32(joint.z);
            }
        }
        put_actions(dst, &item.actions)
    }

    fn decode(&self, timestamp: u64, body: &[u8]) -> Result<ActionReport> {
        let mut buf = body;
        let actions = get_actions(&mut buf)?;
        ensure_consumed(buf)?;
        Ok(ActionReport { timestamp, actions })
    }
}

/// Consumer side: sends [`ActionReport`]s, receives [`MocapFrame`]s.
///
/// A codec built with [`MocapClientCodec::poses_only`] drops the action
/// section of received frames, for consumers that only need skeletons.
#[derive(Debug, Clone, Copy, Default)]
pub struct MocapClientCodec {
    poses_only: bool,
}

impl MocapClientCodec {
    /// Codec that keeps poses and actions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Codec that keeps poses and discards received actions.
    pub fn poses_only() -> Self {
        Self { poses_only: true }
    }
}

impl Codec for MocapClientCodec {
    type Outbound = ActionReport;
    type Inbound = MocapFrame;

    fn timestamp(&self, item: &ActionReport) -> u64 {
        item.timestamp
    }

    fn encode(&self, item: &ActionReport, dst: &mut BytesMut) -> Result<()> {
        dst.reserve(4 + item.actions.len() * ACTION_SIZE);
        put_actions(dst, &item.actions)
    }

    fn decode(&self, timestamp: u64, body: &[u8]) -> Result<MocapFrame> {
        let mut buf = body;

        let pose_count = get_count(&mut buf, POSE_SIZE, "pose")?;
        let mut poses = Vec::with_capacity(pose_count);
        for _ in 0..pose_count {
            let mut pose = Pose::new(buf.get_u64());
            for joint in pose.joints.iter_mut() {
                joint.x = buf.get_f32();
                joint.y = buf.get_f32();
                joint.z = buf.get_f32();
            }
            poses.push(pose);
        }

        let mut actions = get_actions(&mut buf)?;
        ensure_consumed(buf)?;
        if self.poses_only {
            actions.clear();
        }

        Ok(MocapFrame {
            timestamp,
            poses,
            actions,
        })
    }
}

fn put_count(dst: &mut BytesMut, count: usize) -> Result<()> {
    let count = u32::try_from(count)
        .map_err(|_| NetopError::Protocol(format!("{count} entries do not fit a u32 count")))?;
    dst.put_u32(count);
    Ok(())
}

fn put_actions(dst: &mut BytesMut, actions: &[PoseAction]) -> Result<()> {
    put_count(dst, actions.len())?;
    for action in actions {
        dst.put_u64(action.pose_id);
        dst.put_i32(action.action);
    }
    Ok(())
}

/// Read a count and check that `count` entries of `entry_size` bytes follow.
fn get_count(buf: &mut &[u8], entry_size: usize, what: &str) -> Result<usize> {
    if buf.remaining() < 4 {
        return Err(NetopError::MalformedPayload(format!(
            "body ends before the {what} count"
        )));
    }
    let count = buf.get_u32() as usize;

    let needed = count.checked_mul(entry_size).unwrap_or(usize::MAX);
    if buf.remaining() < needed {
        return Err(NetopError::MalformedPayload(format!(
            "{count} {what} entries need {needed} bytes, {} left",
            buf.remaining()
        )));
    }
    Ok(count)
}

fn get_actions(buf: &mut &[u8]) -> Result<Vec<PoseAction>> {
    let count = get_count(buf, ACTION_SIZE, "action")?;
    Ok((0..count)
        .map(|_| PoseAction {
            pose_id: buf.get_u64(),
            action: buf.get_i32(),
        })
        .collect())
}

fn ensure_consumed(rest: &[u8]) -> Result<()> {
    if !rest.is_empty() {
        return Err(NetopError::MalformedPayload(format!(
            "{} trailing bytes",
            rest.len()
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> MocapFrame {
        let mut pose = Pose::new(42);
        for (i, joint) in pose.joints.iter_mut().enumerate() {
            *joint = Joint {
                x: i as f32,
                y: -(i as f32) * 0.5,
                z: 1.25,
            };
        }

        MocapFrame {
            timestamp: 123_456,
            poses: vec![pose, Pose::new(7)],
            actions: vec![
                PoseAction {
                    pose_id: 42,
                    action: 3,
                },
                PoseAction {
                    pose_id: 7,
                    action: -1,
                },
            ],
        }
    }

    #[test]
    fn test_frame_roundtrip() {
        let frame = sample_frame();
        let mut body = BytesMut::new();
        MocapServerCodec.encode(&frame, &mut body).unwrap();

        assert_eq!(body.len(), frame.body_len());
        assert_eq!(MocapServerCodec.timestamp(&frame), 123_456);

        let decoded = MocapClientCodec::new()
            .decode(frame.timestamp, &body)
            .unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn test_frame_byte_layout() {
        let frame = MocapFrame {
            timestamp: 0,
            poses: vec![Pose::new(0x0102)],
            actions: vec![PoseAction {
                pose_id: 5,
                action: -2,
            }],
        };
        let mut body = BytesMut::new();
        MocapServerCodec.encode(&frame, &mut body).unwrap();

        // pose count, then pose id
        assert_eq!(&body[0..4], &[0, 0, 0, 1]);
        assert_eq!(&body[4..12], &[0, 0, 0, 0, 0, 0, 0x01, 0x02]);

        // action section starts after the single pose
        let actions = 4 + POSE_SIZE;
        assert_eq!(&body[actions..actions + 4], &[0, 0, 0, 1]);
        assert_eq!(&body[actions + 12..actions + 16], &(-2i32).to_be_bytes());
    }

    #[test]
    fn test_action_report_roundtrip() {
        let report = ActionReport {
            timestamp: 99,
            actions: vec![PoseAction {
                pose_id: 1,
                action: 8,
            }],
        };
        let mut body = BytesMut::new();
        MocapClientCodec::new().encode(&report, &mut body).unwrap();

        assert_eq!(body.len(), 4 + ACTION_SIZE);
        assert_eq!(MocapServerCodec.decode(99, &body).unwrap(), report);
    }

    #[test]
    fn test_poses_only_drops_actions() {
        let frame = sample_frame();
        let mut body = BytesMut::new();
        MocapServerCodec.encode(&frame, &mut body).unwrap();

        let decoded = MocapClientCodec::poses_only().decode(1, &body).unwrap();
        assert_eq!(decoded.poses, frame.poses);
        assert!(decoded.actions.is_empty());
    }

    #[test]
    fn test_empty_frame_encodes_counts() {
        let mut body = BytesMut::new();
        MocapServerCodec
            .encode(&MocapFrame::default(), &mut body)
            .unwrap();
        assert_eq!(&body[..], &[0u8; 8]);
    }

    #[test]
    fn test_truncated_body_is_malformed() {
        let mut body = BytesMut::new();
        MocapServerCodec.encode(&sample_frame(), &mut body).unwrap();

        for len in [0, 3, 4 + POSE_SIZE, body.len() - 1] {
            let err = MocapClientCodec::new().decode(0, &body[..len]).unwrap_err();
            assert!(
                matches!(err, NetopError::MalformedPayload(_)),
                "length {len}"
            );
        }
    }

    #[test]
    fn test_huge_count_is_malformed() {
        let body = u32::MAX.to_be_bytes();
        let err = MocapServerCodec.decode(0, &body).unwrap_err();
        assert!(matches!(err, NetopError::MalformedPayload(_)));
    }

    #[test]
    fn test_trailing_bytes_are_malformed() {
        let mut body = BytesMut::new();
        MocapClientCodec::new()
            .encode(&ActionReport::default(), &mut body)
            .unwrap();
        body.put_u8(0);

        assert!(MocapServerCodec.decode(0, &body).is_err());
    }

    #[test]
    fn test_max_frame_body() {
        assert_eq!(POSE_SIZE, 212);
        assert_eq!(max_frame_body(10, 10), 8 + 2120 + 120);
        assert_eq!(sample_frame().body_len(), max_frame_body(2, 2));
    }
}
