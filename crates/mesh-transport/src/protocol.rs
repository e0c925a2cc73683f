//! Wire framing for [`MessageEnvelope`]s.
//!
//! Envelopes are postcard-encoded and length-prefixed with a 4-byte
//! big-endian length, both over TCP session streams and inside UDP
//! discovery datagrams.

use bytes::Bytes;
use mesh_core::envelope::MessageEnvelope;

use crate::error::FramingError;

/// Maximum encoded envelope size (1 MiB), matching the largest single
/// DataChunk body plus header overhead.
pub const MAX_MESSAGE_SIZE: usize = 1024 * 1024 + 4096;

/// Length-prefix and serialize an envelope for wire transmission.
pub fn frame_message(msg: &MessageEnvelope) -> Result<Bytes, FramingError> {
    let serialized =
        postcard::to_allocvec(msg).map_err(|e| FramingError::Serialization(e.to_string()))?;

    if serialized.len() > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge { size: serialized.len(), max: MAX_MESSAGE_SIZE });
    }

    let len = serialized.len() as u32;
    let mut framed = Vec::with_capacity(4 + serialized.len());
    framed.extend_from_slice(&len.to_be_bytes());
    framed.extend_from_slice(&serialized);
    Ok(Bytes::from(framed))
}

/// Parse a single length-prefixed envelope from `data`.
pub fn parse_framed_message(data: &[u8]) -> Result<MessageEnvelope, FramingError> {
    if data.len() < 4 {
        return Err(FramingError::InsufficientData { needed: 4, available: data.len() });
    }

    let len = u32::from_be_bytes([data[0], data[1], data[2], data[3]]) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(FramingError::MessageTooLarge { size: len, max: MAX_MESSAGE_SIZE });
    }
    if data.len() < 4 + len {
        return Err(FramingError::InsufficientData { needed: 4 + len, available: data.len() });
    }

    postcard::from_bytes(&data[4..4 + len]).map_err(|e| FramingError::Deserialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use mesh_core::envelope::{DataBody, EnvelopeBody};
    use mesh_core::identity::NodeId;
    use uuid::Uuid;

    fn sample_envelope() -> MessageEnvelope {
        MessageEnvelope::new(
            Uuid::new_v4(),
            NodeId::from_bytes(vec![1, 2, 3]).unwrap(),
            EnvelopeBody::Data(DataBody::Complete { group_id: Uuid::new_v4() }),
        )
    }

    #[test]
    fn roundtrip() {
        let env = sample_envelope();
        let framed = frame_message(&env).unwrap();
        let parsed = parse_framed_message(&framed).unwrap();
        assert_eq!(parsed.message_id, env.message_id);
    }

    #[test]
    fn rejects_short_buffer() {
        assert!(parse_framed_message(&[0x00, 0x00]).is_err());
    }

    #[test]
    fn rejects_truncated_frame() {
        let framed = frame_message(&sample_envelope()).unwrap();
        let truncated = &framed[..framed.len() - 1];
        assert!(parse_framed_message(truncated).is_err());
    }

    #[test]
    fn rejects_oversized_declared_length() {
        let mut data = (MAX_MESSAGE_SIZE as u32 + 1).to_be_bytes().to_vec();
        data.extend_from_slice(&[0u8; 8]);
        assert!(parse_framed_message(&data).is_err());
    }
}
