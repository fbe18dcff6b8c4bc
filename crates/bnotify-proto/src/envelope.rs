//! Encrypted wire object and its gateway encoding.
//!
//! An `Envelope` is CBOR-encoded and then standard-base64 encoded into a single
//! opaque string field ([`PAYLOAD_KEY`]) of the push gateway's key/value data.
//! The gateway never sees plaintext, and the nonce is not secret: only its
//! uniqueness per key matters.

use base64::{Engine, engine::general_purpose::STANDARD};
use serde::{Deserialize, Serialize};

use crate::{
    cbor,
    errors::{ProtocolError, Result},
};

/// Name of the gateway data field carrying the encoded envelope.
pub const PAYLOAD_KEY: &str = "payload";

/// Sealed message as it travels through the gateway.
///
/// Produced by `bnotify_crypto::seal`. No structural validation happens here;
/// a wrong-length nonce or truncated ciphertext is rejected at open time as an
/// authentication failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// AEAD output including the 16-byte authentication tag
    #[serde(with = "serde_bytes")]
    pub ciphertext: Vec<u8>,
    /// `server_id ‖ big-endian(seq)`
    #[serde(with = "serde_bytes")]
    pub nonce: Vec<u8>,
}

impl Envelope {
    /// Serialize to CBOR.
    pub fn encode(&self) -> Result<Vec<u8>> {
        cbor::encode(self)
    }

    /// Deserialize from CBOR.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        cbor::decode(bytes)
    }

    /// Encode as the gateway payload string (base64 of the CBOR bytes).
    pub fn to_gateway_payload(&self) -> Result<String> {
        Ok(STANDARD.encode(self.encode()?))
    }

    /// Parse a gateway payload string.
    pub fn from_gateway_payload(payload: &str) -> Result<Self> {
        // base64 expands by 4/3, reject before allocating
        let max_encoded = cbor::MAX_DECODE_SIZE.div_ceil(3) * 4;
        if payload.len() > max_encoded {
            return Err(ProtocolError::PayloadTooLarge { size: payload.len(), max: max_encoded });
        }

        let bytes =
            STANDARD.decode(payload.trim()).map_err(|e| ProtocolError::Base64(e.to_string()))?;
        Self::decode(&bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Envelope {
        Envelope { ciphertext: vec![0xAB; 48], nonce: (0u8..24).collect() }
    }

    #[test]
    fn gateway_payload_roundtrip() {
        let envelope = sample();
        let payload = envelope.to_gateway_payload().unwrap();

        assert!(payload.chars().all(|c| c.is_ascii_alphanumeric() || "+/=".contains(c)));
        assert_eq!(Envelope::from_gateway_payload(&payload).unwrap(), envelope);
    }

    #[test]
    fn gateway_payload_tolerates_trailing_newline() {
        let envelope = sample();
        let payload = format!("{}\n", envelope.to_gateway_payload().unwrap());

        assert_eq!(Envelope::from_gateway_payload(&payload).unwrap(), envelope);
    }

    #[test]
    fn invalid_base64_rejected() {
        assert!(matches!(
            Envelope::from_gateway_payload("not*base64!"),
            Err(ProtocolError::Base64(_))
        ));
    }

    #[test]
    fn valid_base64_of_garbage_rejected() {
        let payload = STANDARD.encode([0xffu8, 0xff, 0xff]);
        assert!(matches!(
            Envelope::from_gateway_payload(&payload),
            Err(ProtocolError::CborDecode(_))
        ));
    }

    #[test]
    fn byte_fields_encode_as_byte_strings() {
        let envelope = sample();
        let bytes = envelope.encode().unwrap();

        // map header, two text keys, two 2-byte byte-string headers
        let keys = 1 + "ciphertext".len() + 1 + "nonce".len();
        assert_eq!(bytes.len(), 1 + keys + 2 + 48 + 2 + 24);
    }

    #[test]
    fn oversized_payload_rejected_before_decoding() {
        let payload = "A".repeat(200 * 1024);
        assert!(matches!(
            Envelope::from_gateway_payload(&payload),
            Err(ProtocolError::PayloadTooLarge { .. })
        ));
    }
}
