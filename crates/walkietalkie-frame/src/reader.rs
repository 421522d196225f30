use std::io::{ErrorKind, Read};

use bytes::{Bytes, BytesMut};
use tracing::trace;
use walkietalkie_transport::WtStream;

use crate::codec::{
    decode_length_header, BodyMode, FrameConfig, CHUNK_HEADER_SIZE, LENGTH_HEADER_SIZE,
};
use crate::error::{FrameError, Result};

/// Upper bound on the up-front allocation in [`MessageReader::read_message`].
const PREALLOC_LIMIT: u64 = 1 << 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ReadState {
    AwaitHeader,
    Oneshot,
    ChunkHeader,
    ChunkBody { remaining: usize },
    Done,
}

/// Reads one message off any `Read` stream, chunk by chunk.
///
/// The reader trusts the outer length header for termination and never
/// reads past the declared length, so bytes a peer writes after the message
/// stay unread. Chunked bodies have each 2-byte prefix parsed before its
/// payload; oneshot bodies are read raw. Each chunk handed out is whatever
/// a single transport read returned, capped at the configured chunk size.
pub struct MessageReader<T> {
    inner: T,
    config: FrameConfig,
    state: ReadState,
    message_len: Option<u64>,
    offset: u64,
    buf: Vec<u8>,
}

impl<T: Read> MessageReader<T> {
    /// Create a new message reader with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message reader with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        Self {
            inner,
            buf: vec![0u8; config.effective_chunk_size()],
            config,
            state: ReadState::AwaitHeader,
            message_len: None,
            offset: 0,
        }
    }

    /// Read the 8-byte length header (blocking).
    ///
    /// Idempotent once the header has been read.
    pub fn read_header(&mut self) -> Result<u64> {
        if let Some(len) = self.message_len {
            return Ok(len);
        }

        let mut header = [0u8; LENGTH_HEADER_SIZE];
        read_full(&mut self.inner, &mut header)?;
        let len = decode_length_header(header);

        self.message_len = Some(len);
        self.state = if len == 0 {
            ReadState::Done
        } else {
            match self.config.body_mode(len) {
                BodyMode::Oneshot => ReadState::Oneshot,
                BodyMode::Chunked => ReadState::ChunkHeader,
            }
        };
        trace!(len, state = ?self.state, "read length header");
        Ok(len)
    }

    /// Read the next chunk of the message (blocking).
    ///
    /// Returns `Ok(None)` once the full declared length has been delivered.
    /// Returns `Err(FrameError::ConnectionClosed)` on EOF before that.
    pub fn next_chunk(&mut self) -> Result<Option<Bytes>> {
        loop {
            match self.state {
                ReadState::AwaitHeader => {
                    self.read_header()?;
                }
                ReadState::Done => return Ok(None),
                ReadState::Oneshot => {
                    let want = self.window(self.remaining());
                    let n = self.read_some(want)?;
                    return Ok(Some(self.advance(n)));
                }
                ReadState::ChunkHeader => {
                    let mut prefix = [0u8; CHUNK_HEADER_SIZE];
                    read_full(&mut self.inner, &mut prefix)?;
                    let size = u16::from_be_bytes(prefix) as usize;
                    let remaining = self.remaining();
                    if size as u64 > remaining {
                        return Err(FrameError::ChunkOverrun { size, remaining });
                    }
                    // Zero-length frames carry nothing; wait for the next prefix.
                    if size > 0 {
                        self.state = ReadState::ChunkBody { remaining: size };
                    }
                }
                ReadState::ChunkBody { remaining } => {
                    let want = self.window(remaining as u64);
                    let n = self.read_some(want)?;
                    self.state = if n == remaining {
                        ReadState::ChunkHeader
                    } else {
                        ReadState::ChunkBody {
                            remaining: remaining - n,
                        }
                    };
                    return Ok(Some(self.advance(n)));
                }
            }
        }
    }

    /// Read the whole message into one buffer.
    pub fn read_message(&mut self) -> Result<Bytes> {
        let len = self.read_header()?;
        let mut out = BytesMut::with_capacity(len.min(PREALLOC_LIMIT) as usize);
        while let Some(chunk) = self.next_chunk()? {
            out.extend_from_slice(&chunk);
        }
        Ok(out.freeze())
    }

    /// Declared message length, once the header has been read.
    pub fn message_len(&self) -> Option<u64> {
        self.message_len
    }

    /// Body bytes delivered so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// True once every declared byte has been delivered.
    pub fn is_done(&self) -> bool {
        self.state == ReadState::Done
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the reader and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current reader configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    fn remaining(&self) -> u64 {
        self.message_len.unwrap_or(0) - self.offset
    }

    fn window(&self, limit: u64) -> usize {
        limit.min(self.buf.len() as u64) as usize
    }

    fn read_some(&mut self, want: usize) -> Result<usize> {
        loop {
            match self.inner.read(&mut self.buf[..want]) {
                Ok(0) => return Err(FrameError::ConnectionClosed),
                Ok(n) => return Ok(n),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    fn advance(&mut self, n: usize) -> Bytes {
        self.offset += n as u64;
        if Some(self.offset) == self.message_len {
            self.state = ReadState::Done;
        }
        Bytes::copy_from_slice(&self.buf[..n])
    }
}

impl MessageReader<WtStream> {
    /// Create a message reader for `WtStream` and apply read timeout from config.
    pub fn with_config_stream(inner: WtStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_read_timeout(config.read_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

fn read_full<T: Read>(inner: &mut T, buf: &mut [u8]) -> Result<()> {
    let mut filled = 0usize;
    while filled < buf.len() {
        match inner.read(&mut buf[filled..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => filled += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

pub(crate) fn transport_to_frame_error(err: walkietalkie_transport::TransportError) -> FrameError {
    match err {
        walkietalkie_transport::TransportError::Io(io)
        | walkietalkie_transport::TransportError::Accept(io) => FrameError::Io(io),
        walkietalkie_transport::TransportError::Bind { source, .. }
        | walkietalkie_transport::TransportError::Connect { source, .. } => FrameError::Io(source),
        other => FrameError::Io(std::io::Error::other(other.to_string())),
    }
}
