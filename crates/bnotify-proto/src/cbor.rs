//! CBOR helpers shared by every wire object.

use serde::{Serialize, de::DeserializeOwned};

use crate::errors::{ProtocolError, Result};

/// Largest CBOR document this crate will attempt to parse.
pub const MAX_DECODE_SIZE: usize = 64 * 1024;

pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::ser::into_writer(value, &mut bytes)
        .map_err(|e| ProtocolError::CborEncode(e.to_string()))?;
    Ok(bytes)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    // Size check before parsing so oversized input never reaches the parser
    if bytes.len() > MAX_DECODE_SIZE {
        return Err(ProtocolError::PayloadTooLarge { size: bytes.len(), max: MAX_DECODE_SIZE });
    }

    ciborium::de::from_reader(bytes).map_err(|e| ProtocolError::CborDecode(e.to_string()))
}
