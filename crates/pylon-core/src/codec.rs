//! Serialization codecs carried by the envelope.
//!
//! A [`CodecPair`] is attached to every envelope when it is acquired. Stages
//! encode responses and decode request bodies through it instead of reaching
//! for a concrete format, so a router can swap the wire format in one place.
//! Encoders and decoders exchange [`serde_json::Value`] trees; the typed
//! helpers on [`CodecPair`] handle the conversion to and from user types.

use crate::error::{CoreError, CoreResult};
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Turns a value tree into bytes.
pub trait Encoder: Send + Sync + fmt::Debug {
    /// The `Content-Type` of the produced bytes.
    fn content_type(&self) -> &str;

    /// Encodes `value`.
    fn encode(&self, value: &serde_json::Value) -> CoreResult<Bytes>;
}

/// Turns bytes into a value tree.
pub trait Decoder: Send + Sync + fmt::Debug {
    /// Decodes `input`.
    fn decode(&self, input: &[u8]) -> CoreResult<serde_json::Value>;
}

/// JSON encoder and decoder backed by `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec {
    pretty: bool,
}

impl JsonCodec {
    /// Compact JSON.
    #[must_use]
    pub const fn new() -> Self {
        Self { pretty: false }
    }

    /// Indented JSON.
    #[must_use]
    pub const fn pretty() -> Self {
        Self { pretty: true }
    }
}

impl Encoder for JsonCodec {
    fn content_type(&self) -> &str {
        "application/json"
    }

    fn encode(&self, value: &serde_json::Value) -> CoreResult<Bytes> {
        let encoded = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        };
        encoded.map(Bytes::from).map_err(CoreError::encode)
    }
}

impl Decoder for JsonCodec {
    fn decode(&self, input: &[u8]) -> CoreResult<serde_json::Value> {
        serde_json::from_slice(input).map_err(CoreError::decode)
    }
}

/// The encoder/decoder pair active for a request.
#[derive(Debug, Clone)]
pub struct CodecPair {
    encoder: Arc<dyn Encoder>,
    decoder: Arc<dyn Decoder>,
}

impl CodecPair {
    /// Pairs an encoder with a decoder.
    pub fn new(encoder: impl Encoder + 'static, decoder: impl Decoder + 'static) -> Self {
        Self {
            encoder: Arc::new(encoder),
            decoder: Arc::new(decoder),
        }
    }

    /// Compact JSON in both directions.
    #[must_use]
    pub fn json() -> Self {
        Self::new(JsonCodec::new(), JsonCodec::new())
    }

    /// Returns the encoder.
    #[must_use]
    pub fn encoder(&self) -> &dyn Encoder {
        &*self.encoder
    }

    /// Returns the decoder.
    #[must_use]
    pub fn decoder(&self) -> &dyn Decoder {
        &*self.decoder
    }

    /// The `Content-Type` of encoded output.
    #[must_use]
    pub fn content_type(&self) -> &str {
        self.encoder.content_type()
    }

    /// Encodes a serializable value.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CoreResult<Bytes> {
        let tree = serde_json::to_value(value).map_err(CoreError::encode)?;
        self.encoder.encode(&tree)
    }

    /// Decodes bytes into `T`.
    pub fn decode<T: DeserializeOwned>(&self, input: &[u8]) -> CoreResult<T> {
        let tree = self.decoder.decode(input)?;
        serde_json::from_value(tree).map_err(CoreError::decode)
    }
}

impl Default for CodecPair {
    fn default() -> Self {
        Self::json()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct User {
        id: u32,
        name: String,
    }

    #[test]
    fn test_json_pair() {
        let codec = CodecPair::json();
        let user = User {
            id: 7,
            name: "ada".into(),
        };

        let bytes = codec.encode(&user).unwrap();
        assert_eq!(&bytes[..], br#"{"id":7,"name":"ada"}"#);
        assert_eq!(codec.content_type(), "application/json");
        assert_eq!(codec.decode::<User>(&bytes).unwrap(), user);
    }

    #[test]
    fn test_pretty_encoder() {
        let codec = CodecPair::new(JsonCodec::pretty(), JsonCodec::new());
        let bytes = codec.encode(&serde_json::json!({"a": 1})).unwrap();
        assert!(std::str::from_utf8(&bytes).unwrap().contains('\n'));
    }

    #[test]
    fn test_decode_errors() {
        let codec = CodecPair::json();
        assert!(matches!(
            codec.decode::<User>(b"{not json"),
            Err(CoreError::Decode { .. })
        ));
        assert!(matches!(
            codec.decode::<User>(br#"{"id":"x"}"#),
            Err(CoreError::Decode { .. })
        ));
    }
}
