//! MsgPack codec using `rmp-serde`.
//!
//! Always uses `to_vec_named`: structs are written as maps with field names,
//! which other MessagePack implementations read without a shared schema.
//!
//! # Example
//!
//! ```
//! use mocap_netop::codec::{Codec, MsgPackCodec};
//! use serde::{Deserialize, Serialize};
//! use bytes::BytesMut;
//!
//! #[derive(Serialize, Deserialize, PartialEq, Debug)]
//! struct Detection {
//!     pose_id: u64,
//!     label: String,
//! }
//!
//! let codec = MsgPackCodec::<Detection, Detection>::new();
//! let item = Detection { pose_id: 3, label: "wave".to_string() };
//!
//! let mut body = BytesMut::new();
//! codec.encode(&item, &mut body).unwrap();
//! assert_eq!(codec.decode(0, &body).unwrap(), item);
//! ```

use std::fmt;
use std::io::Cursor;
use std::marker::PhantomData;

use bytes::BytesMut;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::Codec;
use crate::error::{NetopError, Result};

/// MessagePack codec for structured items.
///
/// `Out` is the outbound item type, `In` the inbound one. A server and its
/// clients use mirrored parameters.
pub struct MsgPackCodec<Out, In> {
    _types: PhantomData<fn(&Out) -> In>,
}

impl<Out, In> MsgPackCodec<Out, In> {
    /// Create a new codec.
    pub fn new() -> Self {
        Self {
            _types: PhantomData,
        }
    }
}

impl<Out, In> Default for MsgPackCodec<Out, In> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Out, In> Clone for MsgPackCodec<Out, In> {
    fn clone(&self) -> Self {
        Self::new()
    }
}

impl<Out, In> fmt::Debug for MsgPackCodec<Out, In> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MsgPackCodec").finish()
    }
}

impl<Out, In> Codec for MsgPackCodec<Out, In>
where
    Out: Serialize + Send + 'static,
    In: DeserializeOwned + Send + 'static,
{
    type Outbound = Out;
    type Inbound = In;

    fn encode(&self, item: &Out, dst: &mut BytesMut) -> Result<()> {
        // to_vec_named, NOT to_vec
        let bytes = rmp_serde::to_vec_named(item)?;
        dst.extend_from_slice(&bytes);
        Ok(())
    }

    fn decode(&self, _timestamp: u64, body: &[u8]) -> Result<In> {
        let mut cursor = Cursor::new(body);
        let value = {
            let mut de = rmp_serde::Deserializer::new(&mut cursor);
            In::deserialize(&mut de).map_err(|e| NetopError::MalformedPayload(e.to_string()))?
        };

        let consumed = cursor.position() as usize;
        if consumed != body.len() {
            return Err(NetopError::MalformedPayload(format!(
                "{} trailing bytes after MsgPack value",
                body.len() - consumed
            )));
        }

        Ok(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct TestStruct {
        id: u32,
        name: String,
        active: bool,
    }

    fn roundtrip<T>(value: &T) -> T
    where
        T: Serialize + DeserializeOwned + Send + 'static,
    {
        let codec = MsgPackCodec::<T, T>::new();
        let mut body = BytesMut::new();
        codec.encode(value, &mut body).unwrap();
        codec.decode(0, &body).unwrap()
    }

    #[test]
    fn test_encode_decode_struct() {
        let original = TestStruct {
            id: 42,
            name: "test".to_string(),
            active: true,
        };
        assert_eq!(roundtrip(&original), original);
    }

    #[test]
    fn test_encode_decode_collections() {
        let vec = vec![1, 2, 3, 4, 5];
        assert_eq!(roundtrip(&vec), vec);

        let mut map = HashMap::new();
        map.insert("key1".to_string(), 100);
        map.insert("key2".to_string(), 200);
        assert_eq!(roundtrip(&map), map);
    }

    #[test]
    fn test_to_vec_named_produces_map_format() {
        let codec = MsgPackCodec::<TestStruct, TestStruct>::new();
        let mut body = BytesMut::new();
        codec
            .encode(
                &TestStruct {
                    id: 1,
                    name: "x".to_string(),
                    active: false,
                },
                &mut body,
            )
            .unwrap();

        // fixmap with 3 elements, not fixarray (0x93)
        assert_eq!(body[0], 0x83);
    }

    #[test]
    fn test_decode_error_is_malformed_payload() {
        let codec = MsgPackCodec::<TestStruct, TestStruct>::new();
        let err = codec.decode(0, b"not valid msgpack").unwrap_err();
        assert!(matches!(err, NetopError::MalformedPayload(_)));
    }

    #[test]
    fn test_trailing_bytes_rejected() {
        let codec = MsgPackCodec::<u32, u32>::new();
        let mut body = BytesMut::new();
        codec.encode(&7, &mut body).unwrap();
        body.extend_from_slice(&[0x01]);

        let err = codec.decode(0, &body).unwrap_err();
        assert!(err.to_string().contains("trailing"));
    }

    #[test]
    fn test_encode_appends_to_existing_bytes() {
        let codec = MsgPackCodec::<bool, bool>::new();
        let mut body = BytesMut::from(&b"xy"[..]);
        codec.encode(&true, &mut body).unwrap();

        assert_eq!(&body[..], &[b'x', b'y', 0xc3]);
    }
}
