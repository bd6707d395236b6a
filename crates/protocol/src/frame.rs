//! Binary chunk framing: `[4 bytes BE index][4 bytes BE length][payload]`.
//!
//! The index travels with the bytes so a receiver can check a binary
//! message against the `chunk-meta` that announced it.

/// Size of the fixed frame header.
pub const FRAME_HEADER_LEN: usize = 8;

/// Errors from chunk frame parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("frame too short (need at least {FRAME_HEADER_LEN} bytes, got {0})")]
    TooShort(usize),

    #[error("frame length mismatch: header says {declared} bytes, payload has {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("payload of {0} bytes does not fit a chunk frame")]
    PayloadTooLarge(usize),
}

/// Encodes one chunk for sending as a binary message.
pub fn encode_chunk_frame(index: u32, payload: &[u8]) -> Result<Vec<u8>, FrameError> {
    let len = u32::try_from(payload.len())
        .map_err(|_| FrameError::PayloadTooLarge(payload.len()))?;

    let mut buf = Vec::with_capacity(FRAME_HEADER_LEN + payload.len());
    buf.extend_from_slice(&index.to_be_bytes());
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(payload);
    Ok(buf)
}

/// Splits a binary message into its chunk index and payload.
pub fn decode_chunk_frame(data: &[u8]) -> Result<(u32, &[u8]), FrameError> {
    if data.len() < FRAME_HEADER_LEN {
        return Err(FrameError::TooShort(data.len()));
    }

    let index = u32::from_be_bytes([data[0], data[1], data[2], data[3]]);
    let declared = u32::from_be_bytes([data[4], data[5], data[6], data[7]]) as usize;
    let payload = &data[FRAME_HEADER_LEN..];

    if payload.len() != declared {
        return Err(FrameError::LengthMismatch {
            declared,
            actual: payload.len(),
        });
    }
    Ok((index, payload))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_layout_is_big_endian() {
        let frame = encode_chunk_frame(0x0102_0304, b"xyz").unwrap();
        assert_eq!(&frame[..4], &[1, 2, 3, 4]);
        assert_eq!(&frame[4..8], &[0, 0, 0, 3]);
        assert_eq!(&frame[8..], b"xyz");
    }

    #[test]
    fn decode_returns_index_and_payload() {
        let frame = encode_chunk_frame(5, b"payload").unwrap();
        let (index, payload) = decode_chunk_frame(&frame).unwrap();
        assert_eq!(index, 5);
        assert_eq!(payload, b"payload");
    }

    #[test]
    fn empty_payload_is_valid() {
        let frame = encode_chunk_frame(0, b"").unwrap();
        assert_eq!(frame.len(), FRAME_HEADER_LEN);
        assert_eq!(decode_chunk_frame(&frame).unwrap(), (0, &b""[..]));
    }

    #[test]
    fn rejects_short_frame() {
        assert_eq!(decode_chunk_frame(&[0, 0, 1]), Err(FrameError::TooShort(3)));
    }

    #[test]
    fn rejects_raw_unframed_bytes() {
        let raw = vec![0xAAu8; 100];
        assert!(matches!(
            decode_chunk_frame(&raw),
            Err(FrameError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut frame = encode_chunk_frame(1, b"abcdef").unwrap();
        frame.truncate(frame.len() - 2);
        assert_eq!(
            decode_chunk_frame(&frame),
            Err(FrameError::LengthMismatch {
                declared: 6,
                actual: 4
            })
        );
    }
}
