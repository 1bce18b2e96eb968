//! On-the-wire frame layout shared by every transport strategy.
//!
//! Header (little-endian): magic `u16`, version `u8`, flags `u8`,
//! sequence `u64`, capture offset ms `u32`, payload length `u32`,
//! then the payload bytes.

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::TransportError;

const MAGIC: u16 = 0x504C; // "PL"
const VERSION: u8 = 1;
pub(crate) const HEADER_LEN: usize = 2 + 1 + 1 + 8 + 4 + 4;

/// Flag bit: payload is high priority.
pub const FLAG_PRIORITY: u8 = 0b0000_0001;
/// Flag bit: payload is AES-128-CBC encrypted.
pub const FLAG_ENCRYPTED: u8 = 0b0000_0010;

/// One frame as it travels on the wire.
#[derive(Clone, Debug, PartialEq)]
pub struct WireFrame {
    pub seq: u64,
    /// Milliseconds between session start and frame capture.
    pub capture_offset_ms: u32,
    pub flags: u8,
    pub payload: Bytes,
}

impl WireFrame {
    pub fn new(seq: u64, capture_offset_ms: u32, payload: Bytes) -> Self {
        Self {
            seq,
            capture_offset_ms,
            flags: 0,
            payload,
        }
    }

    pub fn with_flag(mut self, flag: u8) -> Self {
        self.flags |= flag;
        self
    }

    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    pub fn encode(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(self.encoded_len());
        buf.put_u16_le(MAGIC);
        buf.put_u8(VERSION);
        buf.put_u8(self.flags);
        buf.put_u64_le(self.seq);
        buf.put_u32_le(self.capture_offset_ms);
        buf.put_u32_le(self.payload.len() as u32);
        buf.put_slice(&self.payload);
        buf.freeze()
    }

    pub fn decode(mut buf: Bytes) -> Result<Self, TransportError> {
        if buf.len() < HEADER_LEN {
            return Err(TransportError::MalformedFrame(format!(
                "{} bytes is shorter than the {HEADER_LEN}-byte header",
                buf.len()
            )));
        }

        let magic = buf.get_u16_le();
        if magic != MAGIC {
            return Err(TransportError::MalformedFrame(format!(
                "bad magic 0x{magic:04X}"
            )));
        }
        let version = buf.get_u8();
        if version != VERSION {
            return Err(TransportError::MalformedFrame(format!(
                "unsupported version {version}"
            )));
        }

        let flags = buf.get_u8();
        let seq = buf.get_u64_le();
        let capture_offset_ms = buf.get_u32_le();
        let payload_len = buf.get_u32_le() as usize;
        if buf.len() != payload_len {
            return Err(TransportError::MalformedFrame(format!(
                "payload length {} does not match header ({payload_len})",
                buf.len()
            )));
        }

        Ok(Self {
            seq,
            capture_offset_ms,
            flags,
            payload: buf,
        })
    }
}

#[cfg(test)]
mod tests {
    use rstest::*;

    use super::*;

    #[rstest]
    #[case::empty(0, 0, Bytes::new(), 0)]
    #[case::small(42, 1500, Bytes::from_static(b"ecg-sample"), FLAG_PRIORITY)]
    #[case::encrypted(u64::MAX, u32::MAX, Bytes::from(vec![7u8; 512]), FLAG_ENCRYPTED)]
    fn encode_decode(
        #[case] seq: u64,
        #[case] offset: u32,
        #[case] payload: Bytes,
        #[case] flags: u8,
    ) {
        let frame = WireFrame {
            seq,
            capture_offset_ms: offset,
            flags,
            payload,
        };
        let encoded = frame.encode();
        assert_eq!(encoded.len(), frame.encoded_len());

        let decoded = WireFrame::decode(encoded).unwrap();
        assert_eq!(decoded, frame);
    }

    #[test]
    fn rejects_short_buffer() {
        let result = WireFrame::decode(Bytes::from_static(b"PL"));
        assert!(matches!(result, Err(TransportError::MalformedFrame(_))));
    }

    #[test]
    fn rejects_bad_magic() {
        let mut encoded = WireFrame::new(1, 0, Bytes::new()).encode().to_vec();
        encoded[0] = 0xFF;
        let result = WireFrame::decode(Bytes::from(encoded));
        assert!(matches!(result, Err(TransportError::MalformedFrame(_))));
    }

    #[test]
    fn rejects_truncated_payload() {
        let mut encoded = WireFrame::new(1, 0, Bytes::from_static(b"abcdef"))
            .encode()
            .to_vec();
        encoded.truncate(encoded.len() - 2);
        let result = WireFrame::decode(Bytes::from(encoded));
        assert!(matches!(result, Err(TransportError::MalformedFrame(_))));
    }

    #[test]
    fn flag_helpers() {
        let frame = WireFrame::new(1, 0, Bytes::new()).with_flag(FLAG_ENCRYPTED);
        assert!(frame.is_encrypted());
        assert!(!WireFrame::new(1, 0, Bytes::new()).is_encrypted());
    }
}
