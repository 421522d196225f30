use std::io::{ErrorKind, Read, Write};

use bytes::BytesMut;
use tracing::trace;
use walkietalkie_transport::WtStream;

use crate::codec::{encode_chunk_frame, put_length_header, BodyMode, FrameConfig};
use crate::error::{FrameError, Result};
use crate::reader::transport_to_frame_error;

/// Writes one framed message to any `Write` stream.
///
/// The 8-byte length header is always written first. Bodies below the
/// streaming threshold follow as raw bytes; larger bodies are cut into chunk
/// frames of at most the configured chunk size, one per source read.
pub struct MessageWriter<T> {
    inner: T,
    frame: BytesMut,
    chunk: Vec<u8>,
    config: FrameConfig,
}

impl<T: Write> MessageWriter<T> {
    /// Create a new message writer with default configuration.
    pub fn new(inner: T) -> Self {
        Self::with_config(inner, FrameConfig::default())
    }

    /// Create a new message writer with explicit configuration.
    pub fn with_config(inner: T, config: FrameConfig) -> Self {
        let chunk_size = config.effective_chunk_size();
        Self {
            inner,
            frame: BytesMut::with_capacity(crate::codec::CHUNK_HEADER_SIZE + chunk_size),
            chunk: vec![0u8; chunk_size],
            config,
        }
    }

    /// Write a message of exactly `len` bytes pulled from `source` (blocking).
    ///
    /// Fails with [`FrameError::SourceExhausted`] if `source` ends early. Bytes
    /// the source holds beyond `len` are left unread.
    pub fn send<R: Read>(&mut self, mut source: R, len: u64) -> Result<()> {
        self.frame.clear();
        put_length_header(len, &mut self.frame);
        write_all(&mut self.inner, &self.frame)?;

        let mode = self.config.body_mode(len);
        trace!(len, ?mode, "wrote length header");

        let mut offset = 0u64;
        while offset < len {
            let want = (len - offset).min(self.chunk.len() as u64) as usize;
            let n = read_source(&mut source, &mut self.chunk[..want])?;
            if n == 0 {
                return Err(FrameError::SourceExhausted {
                    expected: len,
                    sent: offset,
                });
            }

            match mode {
                BodyMode::Oneshot => write_all(&mut self.inner, &self.chunk[..n])?,
                BodyMode::Chunked => {
                    self.frame.clear();
                    encode_chunk_frame(&self.chunk[..n], &mut self.frame)?;
                    write_all(&mut self.inner, &self.frame)?;
                }
            }
            offset += n as u64;
        }

        self.flush()
    }

    /// Write an in-memory message.
    pub fn send_bytes(&mut self, payload: &[u8]) -> Result<()> {
        self.send(payload, payload.len() as u64)
    }

    /// Flush the underlying stream.
    pub fn flush(&mut self) -> Result<()> {
        loop {
            match self.inner.flush() {
                Ok(()) => return Ok(()),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(FrameError::Io(err)),
            }
        }
    }

    /// Borrow the underlying stream.
    pub fn get_ref(&self) -> &T {
        &self.inner
    }

    /// Mutably borrow the underlying stream.
    pub fn get_mut(&mut self) -> &mut T {
        &mut self.inner
    }

    /// Consume the writer and return the inner stream.
    pub fn into_inner(self) -> T {
        self.inner
    }

    /// Current writer configuration.
    pub fn config(&self) -> &FrameConfig {
        &self.config
    }
}

impl MessageWriter<WtStream> {
    /// Create a message writer for `WtStream` and apply write timeout from config.
    pub fn with_config_stream(inner: WtStream, config: FrameConfig) -> Result<Self> {
        inner
            .set_write_timeout(config.write_timeout)
            .map_err(transport_to_frame_error)?;
        Ok(Self::with_config(inner, config))
    }
}

// Blocking sockets report an expired write timeout as `WouldBlock`, so only
// `Interrupted` is retried.
fn write_all<T: Write>(inner: &mut T, bytes: &[u8]) -> Result<()> {
    let mut offset = 0usize;
    while offset < bytes.len() {
        match inner.write(&bytes[offset..]) {
            Ok(0) => return Err(FrameError::ConnectionClosed),
            Ok(n) => offset += n,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
    Ok(())
}

fn read_source<R: Read>(source: &mut R, buf: &mut [u8]) -> Result<usize> {
    loop {
        match source.read(buf) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Source(err)),
        }
    }
}
