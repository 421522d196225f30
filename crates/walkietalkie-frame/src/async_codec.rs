//! Tokio codec and writer for the message framing.

use bytes::{Buf, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio_util::codec::Decoder;

use crate::codec::{
    encode_chunk_frame, put_length_header, BodyMode, FrameConfig, MessagePart,
    CHUNK_HEADER_SIZE, LENGTH_HEADER_SIZE,
};
use crate::error::{FrameError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DecodeState {
    AwaitHeader,
    Oneshot,
    ChunkHeader,
    ChunkBody { remaining: usize },
    Done,
}

/// Decodes one message into a [`MessagePart::Header`] followed by chunks.
///
/// Once the declared length has been yielded the decoder reports
/// [`MessageDecoder::is_done`] and ignores anything else in the buffer.
/// Callers should stop polling at that point instead of waiting for EOF.
#[derive(Debug)]
pub struct MessageDecoder {
    config: FrameConfig,
    state: DecodeState,
    message_len: Option<u64>,
    offset: u64,
}

impl MessageDecoder {
    pub fn new(config: FrameConfig) -> Self {
        Self {
            config,
            state: DecodeState::AwaitHeader,
            message_len: None,
            offset: 0,
        }
    }

    pub fn is_done(&self) -> bool {
        self.state == DecodeState::Done
    }

    pub fn message_len(&self) -> Option<u64> {
        self.message_len
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }

    fn remaining(&self) -> u64 {
        self.message_len.unwrap_or(0) - self.offset
    }

    fn take(&mut self, src: &mut BytesMut, limit: u64) -> MessagePart {
        let n = (src.len() as u64)
            .min(limit)
            .min(self.config.effective_chunk_size() as u64) as usize;
        let chunk = src.split_to(n).freeze();
        self.offset += n as u64;
        if let DecodeState::ChunkBody { remaining } = self.state {
            self.state = if remaining == n {
                DecodeState::ChunkHeader
            } else {
                DecodeState::ChunkBody {
                    remaining: remaining - n,
                }
            };
        }
        if Some(self.offset) == self.message_len {
            self.state = DecodeState::Done;
        }
        MessagePart::Chunk(chunk)
    }
}

impl Decoder for MessageDecoder {
    type Item = MessagePart;
    type Error = FrameError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<MessagePart>> {
        loop {
            match self.state {
                DecodeState::Done => return Ok(None),
                DecodeState::AwaitHeader => {
                    if src.len() < LENGTH_HEADER_SIZE {
                        src.reserve(LENGTH_HEADER_SIZE - src.len());
                        return Ok(None);
                    }
                    let len = src.get_u64();
                    self.message_len = Some(len);
                    self.state = if len == 0 {
                        DecodeState::Done
                    } else {
                        match self.config.body_mode(len) {
                            BodyMode::Oneshot => DecodeState::Oneshot,
                            BodyMode::Chunked => DecodeState::ChunkHeader,
                        }
                    };
                    return Ok(Some(MessagePart::Header { len }));
                }
                DecodeState::Oneshot => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    let remaining = self.remaining();
                    return Ok(Some(self.take(src, remaining)));
                }
                DecodeState::ChunkHeader => {
                    if src.len() < CHUNK_HEADER_SIZE {
                        return Ok(None);
                    }
                    let size = src.get_u16() as usize;
                    let remaining = self.remaining();
                    if size as u64 > remaining {
                        return Err(FrameError::ChunkOverrun { size, remaining });
                    }
                    if size > 0 {
                        self.state = DecodeState::ChunkBody { remaining: size };
                    }
                }
                DecodeState::ChunkBody { remaining } => {
                    if src.is_empty() {
                        return Ok(None);
                    }
                    return Ok(Some(self.take(src, remaining as u64)));
                }
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<MessagePart>> {
        match self.decode(src)? {
            Some(part) => Ok(Some(part)),
            None if self.is_done() => Ok(None),
            None => Err(FrameError::ConnectionClosed),
        }
    }
}

/// Write a message of exactly `len` bytes pulled from `source`.
///
/// Same layout as [`crate::MessageWriter::send`]: header first, then a raw
/// body or chunk frames depending on `config`.
pub async fn write_message<W, R>(
    dst: &mut W,
    source: &mut R,
    len: u64,
    config: &FrameConfig,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
    R: AsyncRead + Unpin,
{
    let chunk_size = config.effective_chunk_size();
    let mut frame = BytesMut::with_capacity(CHUNK_HEADER_SIZE + chunk_size);
    put_length_header(len, &mut frame);
    dst.write_all(&frame).await?;

    let mode = config.body_mode(len);
    let mut chunk = vec![0u8; chunk_size];
    let mut offset = 0u64;
    while offset < len {
        let want = (len - offset).min(chunk_size as u64) as usize;
        let n = source
            .read(&mut chunk[..want])
            .await
            .map_err(FrameError::Source)?;
        if n == 0 {
            return Err(FrameError::SourceExhausted {
                expected: len,
                sent: offset,
            });
        }

        match mode {
            BodyMode::Oneshot => dst.write_all(&chunk[..n]).await?,
            BodyMode::Chunked => {
                frame.clear();
                encode_chunk_frame(&chunk[..n], &mut frame)?;
                dst.write_all(&frame).await?;
            }
        }
        offset += n as u64;
    }

    dst.flush().await?;
    Ok(())
}
