//! Closure-backed codec.

use std::fmt;
use std::marker::PhantomData;

use bytes::BytesMut;

use super::Codec;
use crate::error::Result;

/// Codec built from an encode closure and a decode closure.
///
/// # Example
///
/// ```
/// use mocap_netop::codec::{Codec, FnCodec};
/// use bytes::{BufMut, BytesMut};
///
/// let codec = FnCodec::new(
///     |value: &u32, dst: &mut BytesMut| {
///         dst.put_u32(*value);
///         Ok(())
///     },
///     |_ts, body: &[u8]| Ok(body.len()),
/// )
/// .with_timestamp(|value: &u32| u64::from(*value));
///
/// let mut body = BytesMut::new();
/// codec.encode(&9, &mut body).unwrap();
/// assert_eq!(codec.timestamp(&9), 9);
/// assert_eq!(codec.decode(0, &body).unwrap(), 4);
/// ```
pub struct FnCodec<Out, In, E, D> {
    encode: E,
    decode: D,
    timestamp: Option<fn(&Out) -> u64>,
    _types: PhantomData<fn(&Out) -> In>,
}

impl<Out, In, E, D> FnCodec<Out, In, E, D>
where
    E: Fn(&Out, &mut BytesMut) -> Result<()>,
    D: Fn(u64, &[u8]) -> Result<In>,
{
    /// Create a codec from an encode and a decode closure.
    pub fn new(encode: E, decode: D) -> Self {
        Self {
            encode,
            decode,
            timestamp: None,
            _types: PhantomData,
        }
    }

    /// Stamp outgoing frames with `timestamp(item)` instead of 0.
    pub fn with_timestamp(mut self, timestamp: fn(&Out) -> u64) -> Self {
        self.timestamp = Some(timestamp);
        self
    }
}

impl<Out, In, E, D> fmt::Debug for FnCodec<Out, In, E, D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnCodec")
            .field("timestamp", &self.timestamp.is_some())
            .finish_non_exhaustive()
    }
}

impl<Out, In, E, D> Codec for FnCodec<Out, In, E, D>
where
    Out: Send + 'static,
    In: Send + 'static,
    E: Fn(&Out, &mut BytesMut) -> Result<()> + Send + Sync + 'static,
    D: Fn(u64, &[u8]) -> Result<In> + Send + Sync + 'static,
{
    type Outbound = Out;
    type Inbound = In;

    fn timestamp(&self, item: &Out) -> u64 {
        self.timestamp.map_or(0, |f| f(item))
    }

    fn encode(&self, item: &Out, dst: &mut BytesMut) -> Result<()> {
        (self.encode)(item, dst)
    }

    fn decode(&self, timestamp: u64, body: &[u8]) -> Result<In> {
        (self.decode)(timestamp, body)
    }
}
