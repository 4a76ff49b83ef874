//! Codec module - translation between application items and frame bodies.
//!
//! The engines are generic over one [`Codec`], which fixes both the item type
//! the application pushes outbound and the item type received inbound:
//!
//! - [`RawCodec`] - Pass-through for raw bytes
//! - [`MsgPackCodec`] - MessagePack using `rmp-serde` (`to_vec_named`)
//! - [`FnCodec`] - Encode/decode closures
//! - [`crate::mocap`] - The motion-capture frame layout
//!
//! # Example
//!
//! ```
//! use mocap_netop::codec::{Codec, MsgPackCodec};
//! use bytes::BytesMut;
//!
//! let codec = MsgPackCodec::<String, String>::new();
//!
//! let mut body = BytesMut::new();
//! codec.encode(&"hello".to_string(), &mut body).unwrap();
//!
//! let decoded = codec.decode(0, &body).unwrap();
//! assert_eq!(decoded, "hello");
//! ```

mod func;
mod msgpack;
mod raw;

use bytes::BytesMut;

use crate::error::Result;
use crate::protocol::{check_body, encode_frame_into, Header, HEADER_SIZE};

pub use func::FnCodec;
pub use msgpack::MsgPackCodec;
pub use raw::RawCodec;

/// Encode/decode pair used by an engine.
///
/// `encode` appends the body for one item to `dst` and must not touch bytes
/// already in it. `decode` receives the complete body of one data frame and
/// must consume all of it, failing with `MalformedPayload` otherwise.
pub trait Codec: Send + Sync + 'static {
    /// Item type taken from the outbound queue.
    type Outbound: Send + 'static;
    /// Item type pushed to the inbound queue.
    type Inbound: Send + 'static;

    /// Timestamp written into the frame header for `item`.
    fn timestamp(&self, _item: &Self::Outbound) -> u64 {
        0
    }

    /// Append the encoded body of `item` to `dst`.
    fn encode(&self, item: &Self::Outbound, dst: &mut BytesMut) -> Result<()>;

    /// Decode one frame body.
    fn decode(&self, timestamp: u64, body: &[u8]) -> Result<Self::Inbound>;
}

/// Turns outbound items into complete data frames.
///
/// Owns the body and frame scratch buffers of one send task; both are sized
/// once for the body capacity.
#[derive(Debug)]
pub struct FrameEncoder {
    body: BytesMut,
    frame: BytesMut,
    body_capacity: u32,
}

impl FrameEncoder {
    /// Create an encoder for frames of at most `body_capacity` body bytes.
    pub fn new(body_capacity: u32) -> Self {
        Self {
            body: BytesMut::with_capacity(body_capacity as usize),
            frame: BytesMut::with_capacity(HEADER_SIZE + body_capacity as usize),
            body_capacity,
        }
    }

    /// Encode `item` and return the frame bytes ready for the wire.
    ///
    /// # Errors
    ///
    /// - `CapacityViolation` if the body is larger than the body capacity
    /// - `EmptyBody` if the codec wrote nothing
    /// - any error returned by the codec itself
    pub fn encode<C: Codec>(&mut self, codec: &C, item: &C::Outbound) -> Result<&[u8]> {
        self.body.clear();
        codec.encode(item, &mut self.body)?;
        check_body(self.body.len(), self.body_capacity)?;

        let header = Header::data(
            codec.timestamp(item),
            self.body.len() as u32,
            self.body_capacity,
        );
        self.frame.clear();
        encode_frame_into(&mut self.frame, &header, &self.body);

        Ok(&self.frame[..])
    }

    /// Body capacity this encoder enforces.
    pub fn body_capacity(&self) -> u32 {
        self.body_capacity
    }
}
