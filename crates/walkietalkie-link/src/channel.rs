//! Bounded, closable chunk queue between a receiver loop and its consumer.
//!
//! Single producer, single consumer, FIFO. The producer blocks while the
//! queue is full; dropping the producer closes the queue, which the consumer
//! sees as the end of the chunk sequence.

use std::io::{ErrorKind, Read};
use std::sync::mpsc::{self, Receiver, SyncSender};

use bytes::{Buf, Bytes, BytesMut};
use walkietalkie_frame::MessagePart;

use crate::error::{LinkError, Result};

/// Create a queue holding at most `capacity` undelivered chunks.
///
/// The length header gets a slot of its own, so an idle consumer still lets
/// `capacity` chunks through before the producer blocks.
pub fn chunk_channel(capacity: usize) -> (ChunkSink, ChunkSource) {
    let (tx, rx) = mpsc::sync_channel(capacity.saturating_add(1));
    (
        ChunkSink { tx },
        ChunkSource {
            rx,
            message_len: None,
            received: 0,
            pending: Bytes::new(),
        },
    )
}

/// Producer side, owned by the receiver loop.
#[derive(Debug)]
pub struct ChunkSink {
    tx: SyncSender<MessagePart>,
}

impl ChunkSink {
    /// Push one part, blocking while the queue is full.
    ///
    /// Fails with [`LinkError::ConsumerGone`] once the source is dropped.
    pub fn push(&self, part: MessagePart) -> Result<()> {
        self.tx.send(part).map_err(|_| LinkError::ConsumerGone)
    }
}

/// Consumer side: the chunks of one message, in wire order.
///
/// Iterating yields each chunk as delivered by the receiver loop. The
/// sequence ends when the message is complete or the connection failed;
/// [`ChunkSource::is_complete`] tells the two apart.
#[derive(Debug)]
pub struct ChunkSource {
    rx: Receiver<MessagePart>,
    message_len: Option<u64>,
    received: u64,
    pending: Bytes,
}

impl ChunkSource {
    /// Next chunk (blocking). `None` once the queue is closed.
    pub fn next_chunk(&mut self) -> Option<Bytes> {
        if !self.pending.is_empty() {
            return Some(std::mem::take(&mut self.pending));
        }
        loop {
            match self.rx.recv().ok()? {
                MessagePart::Header { len } => self.message_len = Some(len),
                MessagePart::Chunk(chunk) => {
                    self.received += chunk.len() as u64;
                    return Some(chunk);
                }
            }
        }
    }

    /// Block until the length header has arrived.
    ///
    /// Returns `None` if the connection closed before a header was read.
    pub fn wait_for_header(&mut self) -> Option<u64> {
        while self.message_len.is_none() {
            match self.rx.recv().ok()? {
                MessagePart::Header { len } => self.message_len = Some(len),
                MessagePart::Chunk(chunk) => {
                    self.received += chunk.len() as u64;
                    let mut joined = BytesMut::from(self.pending.as_ref());
                    joined.extend_from_slice(&chunk);
                    self.pending = joined.freeze();
                }
            }
        }
        self.message_len
    }

    /// Declared message length, if the header has been delivered.
    pub fn message_len(&self) -> Option<u64> {
        self.message_len
    }

    /// Bytes delivered so far.
    pub fn received(&self) -> u64 {
        self.received
    }

    /// True when every declared byte has been delivered.
    pub fn is_complete(&self) -> bool {
        self.message_len == Some(self.received)
    }

    /// Drain the queue inline, calling `f` for every chunk.
    ///
    /// Returns whether the full message was delivered.
    pub fn for_each_chunk(mut self, mut f: impl FnMut(&[u8])) -> bool {
        while let Some(chunk) = self.next_chunk() {
            f(&chunk);
        }
        self.is_complete()
    }

    /// Collect the whole message.
    pub fn into_message(mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_chunk() {
            out.extend_from_slice(&chunk);
        }
        if !self.is_complete() {
            return Err(LinkError::Incomplete {
                received: self.received,
                expected: self.message_len,
            });
        }
        Ok(out.freeze())
    }
}

impl Iterator for ChunkSource {
    type Item = Bytes;

    fn next(&mut self) -> Option<Bytes> {
        self.next_chunk()
    }
}

/// Reads the message body; an early end surfaces as `UnexpectedEof`.
impl Read for ChunkSource {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        if self.pending.is_empty() {
            match self.next_chunk() {
                Some(chunk) => self.pending = chunk,
                None if self.is_complete() => return Ok(0),
                None => {
                    return Err(std::io::Error::new(
                        ErrorKind::UnexpectedEof,
                        LinkError::Incomplete {
                            received: self.received,
                            expected: self.message_len,
                        },
                    ))
                }
            }
        }
        let n = buf.len().min(self.pending.len());
        buf[..n].copy_from_slice(&self.pending[..n]);
        self.pending.advance(n);
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::*;

    fn chunk(bytes: &'static [u8]) -> MessagePart {
        MessagePart::Chunk(Bytes::from_static(bytes))
    }

    #[test]
    fn delivers_in_fifo_order() {
        let (sink, source) = chunk_channel(4);
        sink.push(MessagePart::Header { len: 6 }).unwrap();
        sink.push(chunk(b"ab")).unwrap();
        sink.push(chunk(b"cd")).unwrap();
        sink.push(chunk(b"ef")).unwrap();
        drop(sink);

        let chunks: Vec<Bytes> = source.collect();
        assert_eq!(chunks, vec![&b"ab"[..], &b"cd"[..], &b"ef"[..]]);
    }

    #[test]
    fn into_message_requires_full_length() {
        let (sink, source) = chunk_channel(4);
        sink.push(MessagePart::Header { len: 3 }).unwrap();
        sink.push(chunk(b"abc")).unwrap();
        drop(sink);
        assert_eq!(source.into_message().unwrap().as_ref(), b"abc");

        let (sink, source) = chunk_channel(4);
        sink.push(MessagePart::Header { len: 10 }).unwrap();
        sink.push(chunk(b"abc")).unwrap();
        drop(sink);
        let err = source.into_message().unwrap_err();
        assert!(matches!(
            err,
            LinkError::Incomplete {
                received: 3,
                expected: Some(10)
            }
        ));
    }

    #[test]
    fn closed_before_header_is_empty_and_incomplete() {
        let (sink, mut source) = chunk_channel(4);
        drop(sink);
        assert!(source.wait_for_header().is_none());
        assert!(source.next_chunk().is_none());
        assert!(!source.is_complete());
        assert_eq!(source.received(), 0);
    }

    #[test]
    fn empty_message_is_complete() {
        let (sink, source) = chunk_channel(4);
        sink.push(MessagePart::Header { len: 0 }).unwrap();
        drop(sink);
        let mut calls = 0;
        assert!(source.for_each_chunk(|_| calls += 1));
        assert_eq!(calls, 0);
    }

    #[test]
    fn io_read_spans_chunks_and_flags_truncation() {
        let (sink, mut source) = chunk_channel(4);
        sink.push(MessagePart::Header { len: 8 }).unwrap();
        sink.push(chunk(b"hello")).unwrap();
        drop(sink);

        let mut buf = [0u8; 3];
        assert_eq!(source.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf, b"hel");
        assert_eq!(source.read(&mut buf).unwrap(), 2);
        assert_eq!(&buf[..2], b"lo");
        let err = source.read(&mut buf).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::UnexpectedEof);
    }

    #[test]
    fn io_read_to_end_on_complete_message() {
        let (sink, mut source) = chunk_channel(4);
        sink.push(MessagePart::Header { len: 4 }).unwrap();
        sink.push(chunk(b"ab")).unwrap();
        sink.push(chunk(b"cd")).unwrap();
        drop(sink);

        let mut out = Vec::new();
        Read::read_to_end(&mut source, &mut out).unwrap();
        assert_eq!(out, b"abcd");
    }

    #[test]
    fn wait_for_header_keeps_chunks() {
        let (sink, mut source) = chunk_channel(4);
        sink.push(MessagePart::Header { len: 2 }).unwrap();
        sink.push(chunk(b"xy")).unwrap();
        drop(sink);

        assert_eq!(source.wait_for_header(), Some(2));
        assert_eq!(source.next_chunk().unwrap().as_ref(), b"xy");
        assert!(source.is_complete());
    }

    #[test]
    fn push_fails_after_consumer_drops() {
        let (sink, source) = chunk_channel(4);
        drop(source);
        assert!(matches!(
            sink.push(chunk(b"late")),
            Err(LinkError::ConsumerGone)
        ));
    }

    #[test]
    fn full_queue_blocks_producer() {
        let (sink, mut source) = chunk_channel(4);
        let chunks_pushed = Arc::new(AtomicUsize::new(0));

        let producer = {
            let chunks_pushed = Arc::clone(&chunks_pushed);
            std::thread::spawn(move || {
                sink.push(MessagePart::Header { len: 8 }).unwrap();
                for _ in 0..8 {
                    sink.push(chunk(b"x")).unwrap();
                    chunks_pushed.fetch_add(1, Ordering::SeqCst);
                }
            })
        };

        std::thread::sleep(Duration::from_millis(100));
        assert_eq!(
            chunks_pushed.load(Ordering::SeqCst),
            4,
            "producer must stall once four chunks are queued behind the header"
        );

        let mut total = 0;
        while let Some(chunk) = source.next_chunk() {
            total += chunk.len();
        }
        producer.join().unwrap();
        assert_eq!(total, 8);
        assert!(source.is_complete());
    }

    #[test]
    fn capacity_one_still_queues_a_chunk() {
        let (sink, mut source) = chunk_channel(1);
        sink.push(MessagePart::Header { len: 1 }).unwrap();
        sink.push(chunk(b"z")).unwrap();
        drop(sink);

        assert_eq!(source.next_chunk().unwrap().as_ref(), b"z");
        assert!(source.is_complete());
    }
}
