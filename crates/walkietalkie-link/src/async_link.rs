//! Tokio flavour of the listener and sender.
//!
//! Each accepted connection gets a receive task that decodes the message with
//! [`MessageDecoder`] and forwards parts over a bounded `tokio::sync::mpsc`
//! queue. The consumer runs as its own task.

use std::future::Future;
use std::io::ErrorKind;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_util::StreamExt;
use tokio::io::{AsyncRead, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tracing::{debug, warn};
use walkietalkie_frame::{
    write_message, FrameConfig, FrameError, MessageDecoder, MessagePart, CHUNK_HEADER_SIZE,
    LENGTH_HEADER_SIZE,
};
use walkietalkie_transport::{connect_async, AsyncStream, AsyncTransportListener, Endpoint};

use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::receiver::ReceiveOutcome;

/// Consumer side of one inbound message.
#[derive(Debug)]
pub struct AsyncChunkSource {
    rx: mpsc::Receiver<MessagePart>,
    message_len: Option<u64>,
    received: u64,
}

impl AsyncChunkSource {
    fn new(rx: mpsc::Receiver<MessagePart>) -> Self {
        Self {
            rx,
            message_len: None,
            received: 0,
        }
    }

    /// Next chunk. `None` once the queue is closed.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await? {
                MessagePart::Header { len } => self.message_len = Some(len),
                MessagePart::Chunk(chunk) => {
                    self.received += chunk.len() as u64;
                    return Some(chunk);
                }
            }
        }
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

    /// Collect the whole message.
    pub async fn into_message(mut self) -> Result<Bytes> {
        let mut out = BytesMut::new();
        while let Some(chunk) = self.next_chunk().await {
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

/// Write half of an accepted async connection.
#[derive(Debug)]
pub struct AsyncReplySink {
    writer: WriteHalf<AsyncStream>,
    config: FrameConfig,
}

impl AsyncReplySink {
    /// Send an in-memory framed reply.
    pub async fn reply(&mut self, payload: &[u8]) -> Result<()> {
        let mut source = payload;
        self.reply_from(&mut source, payload.len() as u64).await
    }

    /// Send a framed reply of `len` bytes pulled from `source`.
    pub async fn reply_from<R>(&mut self, source: &mut R, len: u64) -> Result<()>
    where
        R: AsyncRead + Unpin,
    {
        write_message(&mut self.writer, source, len, &self.config).await?;
        Ok(())
    }

    /// Shut down the write half.
    pub async fn close(mut self) -> Result<()> {
        self.writer.shutdown().await.map_err(FrameError::Io)?;
        Ok(())
    }

    /// Raw access to the write half.
    pub fn get_mut(&mut self) -> &mut WriteHalf<AsyncStream> {
        &mut self.writer
    }
}

/// One accepted async connection.
#[derive(Debug)]
pub struct AsyncInbound {
    pub id: String,
    pub peer: String,
    pub source: AsyncChunkSource,
    pub reply: AsyncReplySink,
}

/// Async counterpart of [`crate::Listener`].
pub struct AsyncListener {
    transport: AsyncTransportListener,
    config: LinkConfig,
    next_conn_id: AtomicU64,
}

impl AsyncListener {
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        Self::bind_with_config(endpoint, LinkConfig::default()).await
    }

    pub async fn bind_with_config(endpoint: &Endpoint, config: LinkConfig) -> Result<Self> {
        config.validate()?;
        let transport = AsyncTransportListener::bind(endpoint).await?;
        Ok(Self {
            transport,
            config,
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Accept the next connection and spawn its receive task.
    pub async fn accept(&self) -> Result<AsyncInbound> {
        let (stream, peer) = self.transport.accept().await?;
        let id = format!("conn-{}", self.next_conn_id.fetch_add(1, Ordering::Relaxed));
        let (read_half, writer) = tokio::io::split(stream);
        let (tx, rx) = part_channel(self.config.channel_capacity);

        tokio::spawn(receive_task(
            read_half,
            tx,
            self.config.frame.clone(),
            id.clone(),
        ));

        debug!(conn = %id, %peer, "receive task started");
        Ok(AsyncInbound {
            id,
            peer,
            source: AsyncChunkSource::new(rx),
            reply: AsyncReplySink {
                writer,
                config: self.config.frame.clone(),
            },
        })
    }

    /// Accept forever, spawning `on_message` per connection.
    pub async fn listen<F, Fut>(&self, on_message: F) -> Result<()>
    where
        F: Fn(AsyncChunkSource, AsyncReplySink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let on_message = Arc::new(on_message);
        loop {
            let AsyncInbound {
                id, source, reply, ..
            } = self.accept().await?;
            let handler = Arc::clone(&on_message);
            tokio::spawn(async move {
                let task = tokio::spawn(handler(source, reply));
                if let Err(err) = task.await {
                    if err.is_panic() {
                        warn!(conn = %id, "message handler panicked");
                    }
                }
            });
        }
    }

    pub fn local_endpoint(&self) -> Result<Endpoint> {
        Ok(self.transport.local_endpoint()?)
    }

    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

/// Bounded queue for `capacity` chunks plus the length header.
fn part_channel(capacity: usize) -> (mpsc::Sender<MessagePart>, mpsc::Receiver<MessagePart>) {
    mpsc::channel(capacity.saturating_add(1))
}

/// Decode one message from `read_half` into `tx`.
///
/// Stops as soon as the declared length has been forwarded, without waiting
/// for EOF, so the peer can keep its write half open for a reply.
pub async fn receive_task(
    read_half: ReadHalf<AsyncStream>,
    tx: mpsc::Sender<MessagePart>,
    config: FrameConfig,
    conn_id: String,
) -> ReceiveOutcome {
    let read_timeout = config.read_timeout;
    let capacity = LENGTH_HEADER_SIZE + CHUNK_HEADER_SIZE + config.effective_chunk_size();
    let mut frames = FramedRead::with_capacity(read_half, MessageDecoder::new(config), capacity);

    let error = loop {
        if frames.decoder().is_done() {
            let len = frames.decoder().message_len().unwrap_or(0);
            debug!(conn = %conn_id, len, "message received");
            return ReceiveOutcome::Complete { len };
        }

        let next = match read_timeout {
            Some(limit) => match tokio::time::timeout(limit, frames.next()).await {
                Ok(next) => next,
                Err(_) => break LinkError::Frame(FrameError::Io(ErrorKind::TimedOut.into())),
            },
            None => frames.next().await,
        };

        match next {
            Some(Ok(part)) => {
                if tx.send(part).await.is_err() {
                    break LinkError::ConsumerGone;
                }
            }
            Some(Err(err)) => break err.into(),
            None => break LinkError::Frame(FrameError::ConnectionClosed),
        }
    };

    let offset = frames.decoder().offset();
    debug!(conn = %conn_id, offset, %error, "receive aborted");
    ReceiveOutcome::Aborted { offset, error }
}

/// Connect to `endpoint` and send one message of `len` bytes from `source`.
pub async fn send_async<R>(
    endpoint: &Endpoint,
    source: &mut R,
    len: u64,
    config: &LinkConfig,
) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    config.validate()?;
    let mut stream = connect_async(endpoint).await?;
    write_message(&mut stream, source, len, &config.frame).await?;
    debug!(%endpoint, len, "message sent");
    Ok(())
}

/// Send one message and wait for a single framed reply.
pub async fn request_async<R>(
    endpoint: &Endpoint,
    source: &mut R,
    len: u64,
    config: &LinkConfig,
) -> Result<Bytes>
where
    R: AsyncRead + Unpin,
{
    config.validate()?;
    let stream = connect_async(endpoint).await?;
    let (read_half, mut write_half) = tokio::io::split(stream);
    write_message(&mut write_half, source, len, &config.frame).await?;

    let (tx, rx) = part_channel(config.channel_capacity);
    let reader = tokio::spawn(receive_task(
        read_half,
        tx,
        config.frame.clone(),
        endpoint.to_string(),
    ));
    let reply = AsyncChunkSource::new(rx).into_message().await;
    match reader.await {
        Ok(ReceiveOutcome::Aborted { error, .. }) if reply.is_err() => Err(error),
        _ => reply,
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpStream;

    use super::*;

    async fn loopback() -> (AsyncListener, Endpoint) {
        let listener = AsyncListener::bind(&Endpoint::tcp("127.0.0.1:0"))
            .await
            .expect("listener should bind");
        let endpoint = listener.local_endpoint().unwrap();
        (listener, endpoint)
    }

    #[tokio::test]
    async fn part_channel_queues_header_plus_capacity_chunks() {
        let (tx, mut rx) = part_channel(4);
        tx.try_send(MessagePart::Header { len: 4 }).unwrap();
        for _ in 0..4 {
            tx.try_send(MessagePart::Chunk(Bytes::from_static(b"x"))).unwrap();
        }
        assert!(matches!(
            tx.try_send(MessagePart::Chunk(Bytes::from_static(b"y"))),
            Err(mpsc::error::TrySendError::Full(_))
        ));
        assert_eq!(rx.recv().await, Some(MessagePart::Header { len: 4 }));
    }

    #[tokio::test]
    async fn small_message_roundtrip() {
        let (listener, endpoint) = loopback().await;
        let client = tokio::spawn(async move {
            let mut payload: &[u8] = b"async hello";
            send_async(&endpoint, &mut payload, 11, &LinkConfig::default()).await
        });

        let inbound = listener.accept().await.unwrap();
        let message = inbound.source.into_message().await.unwrap();
        assert_eq!(message.as_ref(), b"async hello");
        client.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn chunked_message_roundtrip() {
        let (listener, endpoint) = loopback().await;
        let payload: Vec<u8> = (0..2_000_000u32).map(|i| (i % 251) as u8).collect();
        let expected = payload.clone();
        let client = tokio::spawn(async move {
            let mut source = payload.as_slice();
            send_async(&endpoint, &mut source, 2_000_000, &LinkConfig::default()).await
        });

        let mut source = listener.accept().await.unwrap().source;
        let mut out = Vec::new();
        while let Some(chunk) = source.next_chunk().await {
            assert!(chunk.len() <= walkietalkie_frame::MAX_CHUNK_SIZE);
            out.extend_from_slice(&chunk);
        }
        assert!(source.is_complete());
        assert_eq!(out, expected);
        client.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn truncated_message_is_incomplete() {
        let (listener, endpoint) = loopback().await;
        let addr = match endpoint {
            Endpoint::Tcp(addr) => addr,
            #[cfg(unix)]
            Endpoint::Unix(_) => unreachable!("loopback listener is tcp"),
        };
        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            stream.write_all(&16u64.to_be_bytes()).await.unwrap();
            stream.write_all(b"partial").await.unwrap();
        });

        let inbound = listener.accept().await.unwrap();
        client.await.unwrap();
        let result = inbound.source.into_message().await;
        assert!(matches!(
            result,
            Err(LinkError::Incomplete {
                received: 7,
                expected: Some(16)
            })
        ));
    }

    #[tokio::test]
    async fn request_reply_over_listen() {
        let (listener, endpoint) = loopback().await;
        tokio::spawn(async move {
            let _ = listener
                .listen(|source, mut reply| async move {
                    if let Ok(message) = source.into_message().await {
                        let _ = reply.reply(&message).await;
                    }
                })
                .await;
        });

        let mut payload: &[u8] = b"ping";
        let response = request_async(&endpoint, &mut payload, 4, &LinkConfig::default())
            .await
            .unwrap();
        assert_eq!(response.as_ref(), b"ping");
    }

    #[tokio::test]
    async fn silent_peer_times_out() {
        let config = LinkConfig {
            frame: FrameConfig {
                read_timeout: Some(Duration::from_millis(50)),
                ..FrameConfig::default()
            },
            ..LinkConfig::default()
        };
        let listener = AsyncListener::bind_with_config(&Endpoint::tcp("127.0.0.1:0"), config)
            .await
            .unwrap();
        let addr = match listener.local_endpoint().unwrap() {
            Endpoint::Tcp(addr) => addr,
            #[cfg(unix)]
            Endpoint::Unix(_) => unreachable!("loopback listener is tcp"),
        };

        let _client = TcpStream::connect(addr).await.unwrap();
        let inbound = listener.accept().await.unwrap();
        let mut source = inbound.source;
        assert!(source.next_chunk().await.is_none());
        assert_eq!(source.message_len(), None);
    }
}
