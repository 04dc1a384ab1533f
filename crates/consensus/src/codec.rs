//! Message encoding and decoding for gossip transport.
//!
//! # Wire Format
//!
//! ```text
//! [version: u8][payload: bincode-encoded HareMessage]
//! ```
//!
//! Version is currently `1`. The payload layout is pinned by the serde
//! derives on the message types; signatures cover the inner payload bytes,
//! so encoding is deterministic by construction.

use hare_types::HareMessage;
use thiserror::Error;

/// Current wire format version.
pub const WIRE_VERSION: u8 = 1;

/// Gossip protocol name all instances publish on. The broker demultiplexes
/// by the instance id carried in each message.
pub const GOSSIP_PROTOCOL: &str = "HARE_PROTOCOL";

/// Errors that can occur during message encoding/decoding.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("unknown wire version: {0}")]
    UnknownVersion(u8),

    #[error("message too short")]
    MessageTooShort,

    #[error("decode error: {0}")]
    Decode(String),

    #[error("encode error: {0}")]
    Encode(String),
}

/// Encode a message to wire format.
pub fn encode_message(message: &HareMessage) -> Result<Vec<u8>, CodecError> {
    let payload = bincode::serialize(message).map_err(|e| CodecError::Encode(e.to_string()))?;
    let mut bytes = Vec::with_capacity(1 + payload.len());
    bytes.push(WIRE_VERSION);
    bytes.extend(payload);
    Ok(bytes)
}

/// Decode a message from wire format.
pub fn decode_message(data: &[u8]) -> Result<HareMessage, CodecError> {
    let (&version, payload) = data.split_first().ok_or(CodecError::MessageTooShort)?;
    if version != WIRE_VERSION {
        return Err(CodecError::UnknownVersion(version));
    }
    bincode::deserialize(payload).map_err(|e| CodecError::Decode(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{keypair, make_status};
    use hare_types::InstanceId;

    #[test]
    fn test_encode_decode_roundtrip() {
        let signer = keypair(1);
        let msg = make_status(&signer, InstanceId(1), 0, -1, &[1, 2]);

        let bytes = encode_message(&msg).unwrap();
        assert_eq!(bytes[0], WIRE_VERSION);

        let decoded = decode_message(&bytes).unwrap();
        assert_eq!(decoded, msg);
        assert!(decoded.verify_signature());
    }

    #[test]
    fn test_unknown_version() {
        let result = decode_message(&[99, 1, 2, 3]);
        assert!(matches!(result, Err(CodecError::UnknownVersion(99))));
    }

    #[test]
    fn test_empty_payload() {
        let result = decode_message(&[]);
        assert!(matches!(result, Err(CodecError::MessageTooShort)));
    }

    #[test]
    fn test_garbage_payload() {
        let result = decode_message(&[WIRE_VERSION, 0xff, 0xff]);
        assert!(matches!(result, Err(CodecError::Decode(_))));
    }
}
