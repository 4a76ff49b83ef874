//! Raw codec - pass-through for binary data.
//!
//! Used when items are already serialized by the application.
//!
//! # Example
//!
//! ```
//! use mocap_netop::codec::{Codec, RawCodec};
//! use bytes::{Bytes, BytesMut};
//!
//! let mut body = BytesMut::new();
//! RawCodec.encode(&Bytes::from_static(b"binary payload"), &mut body).unwrap();
//! assert_eq!(&body[..], b"binary payload");
//!
//! let item = RawCodec.decode(0, &body).unwrap();
//! assert_eq!(item, Bytes::from_static(b"binary payload"));
//! ```

use bytes::{Bytes, BytesMut};

use super::Codec;
use crate::error::Result;

/// Raw codec that passes bytes through without transformation.
///
/// Frames carry timestamp 0.
#[derive(Debug, Clone, Copy, Default)]
pub struct RawCodec;

impl Codec for RawCodec {
    type Outbound = Bytes;
    type Inbound = Bytes;

    #[inline]
    fn encode(&self, item: &Bytes, dst: &mut BytesMut) -> Result<()> {
        dst.extend_from_slice(item);
        Ok(())
    }

    #[inline]
    fn decode(&self, _timestamp: u64, body: &[u8]) -> Result<Bytes> {
        Ok(Bytes::copy_from_slice(body))
    }
}
