use std::time::Duration;

use bytes::{Buf, BufMut, Bytes, BytesMut};

use crate::error::{FrameError, Result};

/// Length header: total message length as a big-endian `u64`.
pub const LENGTH_HEADER_SIZE: usize = 8;

/// Chunk frame prefix: payload length as a big-endian `u16`.
pub const CHUNK_HEADER_SIZE: usize = 2;

/// Messages at or above this many bytes are sent as chunk frames: 1 MiB.
pub const DEFAULT_STREAMING_THRESHOLD: u64 = 1 << 20;

/// Largest payload a single chunk frame can carry.
pub const MAX_CHUNK_SIZE: usize = u16::MAX as usize;

/// How the body following the length header is laid out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyMode {
    /// Raw bytes, no sub-framing.
    Oneshot,
    /// Repeated `{u16 BE n, n bytes}` chunk frames.
    Chunked,
}

/// One step of a message as seen by the receive side.
///
/// A well-formed message yields exactly one `Header` followed by chunks
/// whose lengths sum to `len`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessagePart {
    Header { len: u64 },
    Chunk(Bytes),
}

/// Encode the 8-byte length header.
pub fn encode_length_header(len: u64) -> [u8; LENGTH_HEADER_SIZE] {
    len.to_be_bytes()
}

/// Decode the 8-byte length header.
pub fn decode_length_header(header: [u8; LENGTH_HEADER_SIZE]) -> u64 {
    u64::from_be_bytes(header)
}

/// Append the length header to `dst`.
pub fn put_length_header(len: u64, dst: &mut BytesMut) {
    dst.reserve(LENGTH_HEADER_SIZE);
    dst.put_u64(len);
}

/// Encode one chunk frame into `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────────────┐
/// │ Length (2B)  │ Payload          │
/// │ u16 BE       │ (Length bytes)   │
/// └──────────────┴──────────────────┘
/// ```
pub fn encode_chunk_frame(payload: &[u8], dst: &mut BytesMut) -> Result<()> {
    if payload.len() > MAX_CHUNK_SIZE {
        return Err(FrameError::ChunkTooLarge {
            size: payload.len(),
            max: MAX_CHUNK_SIZE,
        });
    }
    dst.reserve(CHUNK_HEADER_SIZE + payload.len());
    dst.put_u16(payload.len() as u16);
    dst.put_slice(payload);
    Ok(())
}

/// Decode one chunk frame from a buffer.
///
/// Returns `None` if the buffer doesn't hold a complete frame yet. On
/// success, consumes the frame bytes from the buffer.
pub fn decode_chunk_frame(src: &mut BytesMut) -> Option<Bytes> {
    if src.len() < CHUNK_HEADER_SIZE {
        return None;
    }
    let size = u16::from_be_bytes([src[0], src[1]]) as usize;
    if src.len() < CHUNK_HEADER_SIZE + size {
        return None;
    }
    src.advance(CHUNK_HEADER_SIZE);
    Some(src.split_to(size).freeze())
}

/// Number of chunk frames a sender emits for `len` bytes when every source
/// read fills a whole chunk.
pub fn chunk_frame_count(len: u64, max_chunk_size: usize) -> u64 {
    len.div_ceil(max_chunk_size.clamp(1, MAX_CHUNK_SIZE) as u64)
}

/// Configuration shared by the sending and receiving sides.
///
/// Both peers must agree on `streaming_threshold`, since it selects how the
/// body is framed.
#[derive(Debug, Clone)]
pub struct FrameConfig {
    /// Messages of at least this many bytes use chunk frames. Default: 1 MiB.
    pub streaming_threshold: u64,
    /// Largest chunk written or delivered, in bytes. Default: 65535.
    pub max_chunk_size: usize,
    /// Read timeout for blocking operations.
    pub read_timeout: Option<Duration>,
    /// Write timeout for blocking operations.
    pub write_timeout: Option<Duration>,
}

impl FrameConfig {
    /// Body layout for a message of `len` bytes.
    pub fn body_mode(&self, len: u64) -> BodyMode {
        if len < self.streaming_threshold {
            BodyMode::Oneshot
        } else {
            BodyMode::Chunked
        }
    }

    /// Chunk size actually used for reads and writes.
    pub fn effective_chunk_size(&self) -> usize {
        self.max_chunk_size.clamp(1, MAX_CHUNK_SIZE)
    }

    /// Reject settings the wire format cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.max_chunk_size == 0 || self.max_chunk_size > MAX_CHUNK_SIZE {
            return Err(FrameError::InvalidConfig(format!(
                "max_chunk_size must be in 1..={MAX_CHUNK_SIZE}, got {}",
                self.max_chunk_size
            )));
        }
        for (name, timeout) in [
            ("read_timeout", self.read_timeout),
            ("write_timeout", self.write_timeout),
        ] {
            if timeout == Some(Duration::ZERO) {
                return Err(FrameError::InvalidConfig(format!(
                    "{name} must be non-zero when set"
                )));
            }
        }
        Ok(())
    }
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            streaming_threshold: DEFAULT_STREAMING_THRESHOLD,
            max_chunk_size: MAX_CHUNK_SIZE,
            read_timeout: None,
            write_timeout: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn length_header_is_big_endian() {
        assert_eq!(encode_length_header(10), [0, 0, 0, 0, 0, 0, 0, 0x0A]);
        assert_eq!(
            encode_length_header(2_000_000),
            [0, 0, 0, 0, 0, 0x1E, 0x84, 0x80]
        );
    }

    #[test]
    fn put_length_header_appends() {
        let mut buf = BytesMut::from(&b"xx"[..]);
        put_length_header(0x0102, &mut buf);
        assert_eq!(buf.as_ref(), &[b'x', b'x', 0, 0, 0, 0, 0, 0, 1, 2]);
    }

    #[test]
    fn chunk_frame_layout() {
        let mut buf = BytesMut::new();
        encode_chunk_frame(b"abc", &mut buf).unwrap();
        assert_eq!(buf.as_ref(), &[0x00, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn chunk_frame_at_max_size() {
        let payload = vec![0x5A; MAX_CHUNK_SIZE];
        let mut buf = BytesMut::new();
        encode_chunk_frame(&payload, &mut buf).unwrap();
        assert_eq!(&buf[..2], &[0xFF, 0xFF]);

        let decoded = decode_chunk_frame(&mut buf).unwrap();
        assert_eq!(decoded.len(), MAX_CHUNK_SIZE);
        assert!(buf.is_empty());
    }

    #[test]
    fn oversized_chunk_rejected() {
        let payload = vec![0u8; MAX_CHUNK_SIZE + 1];
        let mut buf = BytesMut::new();
        let err = encode_chunk_frame(&payload, &mut buf).unwrap_err();
        assert!(matches!(err, FrameError::ChunkTooLarge { size, .. } if size == MAX_CHUNK_SIZE + 1));
        assert!(buf.is_empty());
    }

    #[test]
    fn decode_incomplete_chunk() {
        let mut buf = BytesMut::from(&[0x00][..]);
        assert!(decode_chunk_frame(&mut buf).is_none());

        let mut buf = BytesMut::from(&[0x00, 0x04, b'a', b'b'][..]);
        assert!(decode_chunk_frame(&mut buf).is_none());
        assert_eq!(buf.len(), 4, "incomplete frame must not be consumed");
    }

    #[test]
    fn decode_consecutive_chunks() {
        let mut buf = BytesMut::new();
        encode_chunk_frame(b"first", &mut buf).unwrap();
        encode_chunk_frame(b"", &mut buf).unwrap();
        encode_chunk_frame(b"second", &mut buf).unwrap();

        assert_eq!(decode_chunk_frame(&mut buf).unwrap().as_ref(), b"first");
        assert!(decode_chunk_frame(&mut buf).unwrap().is_empty());
        assert_eq!(decode_chunk_frame(&mut buf).unwrap().as_ref(), b"second");
        assert!(decode_chunk_frame(&mut buf).is_none());
    }

    #[test]
    fn body_mode_switches_at_threshold() {
        let cfg = FrameConfig::default();
        assert_eq!(cfg.body_mode(0), BodyMode::Oneshot);
        assert_eq!(cfg.body_mode(DEFAULT_STREAMING_THRESHOLD - 1), BodyMode::Oneshot);
        assert_eq!(cfg.body_mode(DEFAULT_STREAMING_THRESHOLD), BodyMode::Chunked);

        let tuned = FrameConfig {
            streaming_threshold: 16,
            ..FrameConfig::default()
        };
        assert_eq!(tuned.body_mode(16), BodyMode::Chunked);
    }

    #[test]
    fn frame_count_for_two_million_bytes() {
        assert_eq!(chunk_frame_count(2_000_000, MAX_CHUNK_SIZE), 31);
        assert_eq!(chunk_frame_count(0, MAX_CHUNK_SIZE), 0);
        assert_eq!(chunk_frame_count(65_535, MAX_CHUNK_SIZE), 1);
        assert_eq!(chunk_frame_count(65_536, MAX_CHUNK_SIZE), 2);
    }

    #[test]
    fn validate_rejects_unusable_chunk_sizes() {
        for bad in [0, MAX_CHUNK_SIZE + 1] {
            let cfg = FrameConfig {
                max_chunk_size: bad,
                ..FrameConfig::default()
            };
            assert!(matches!(cfg.validate(), Err(FrameError::InvalidConfig(_))));
        }
        assert!(FrameConfig::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_zero_timeouts() {
        let read = FrameConfig {
            read_timeout: Some(Duration::ZERO),
            ..FrameConfig::default()
        };
        let write = FrameConfig {
            write_timeout: Some(Duration::ZERO),
            ..FrameConfig::default()
        };
        assert!(matches!(read.validate(), Err(FrameError::InvalidConfig(_))));
        assert!(matches!(write.validate(), Err(FrameError::InvalidConfig(_))));

        let bounded = FrameConfig {
            read_timeout: Some(Duration::from_millis(1)),
            write_timeout: Some(Duration::from_secs(5)),
            ..FrameConfig::default()
        };
        assert!(bounded.validate().is_ok());
    }

    proptest! {
        #[test]
        fn length_header_law(len in any::<u64>()) {
            prop_assert_eq!(decode_length_header(encode_length_header(len)), len);
        }

        #[test]
        fn chunk_frame_preserves_payload(payload in proptest::collection::vec(any::<u8>(), 0..2048)) {
            let mut buf = BytesMut::new();
            encode_chunk_frame(&payload, &mut buf).unwrap();
            prop_assert_eq!(buf.len(), CHUNK_HEADER_SIZE + payload.len());
            let decoded = decode_chunk_frame(&mut buf).unwrap();
            prop_assert_eq!(decoded.as_ref(), payload.as_slice());
        }
    }
}
