use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;

use tracing::{debug, warn};
use walkietalkie_transport::{Endpoint, TransportListener, WtStream};

use crate::channel::{chunk_channel, ChunkSource};
use crate::config::LinkConfig;
use crate::error::{LinkError, Result};
use crate::receiver::receive_connection;
use crate::reply::ReplySink;

/// One accepted connection whose receiver loop is already running.
#[derive(Debug)]
pub struct Inbound {
    /// Listener-assigned connection id (`conn-N`).
    pub id: String,
    /// Remote address label.
    pub peer: String,
    /// Chunks of the incoming message.
    pub source: ChunkSource,
    /// Write half of the same connection.
    pub reply: ReplySink,
}

/// Accepts connections and receives one message on each.
pub struct Listener {
    transport: TransportListener,
    config: LinkConfig,
    next_conn_id: AtomicU64,
}

impl Listener {
    /// Bind with default configuration.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        Self::bind_with_config(endpoint, LinkConfig::default())
    }

    /// Bind with explicit configuration.
    pub fn bind_with_config(endpoint: &Endpoint, config: LinkConfig) -> Result<Self> {
        config.validate()?;
        let transport = TransportListener::bind(endpoint)?;
        debug!(
            transport = transport.transport_name(),
            %endpoint,
            capacity = config.channel_capacity,
            "link listener bound"
        );
        Ok(Self {
            transport,
            config,
            next_conn_id: AtomicU64::new(1),
        })
    }

    /// Accept the next connection and start its receiver loop.
    ///
    /// The receiver runs on its own thread; the caller drives the returned
    /// [`ChunkSource`] at whatever pace it likes.
    pub fn accept(&self) -> Result<Inbound> {
        let (stream, peer) = self.transport.accept()?;
        self.start_connection(stream, peer)
    }

    /// Accept forever, running `on_message` on its own thread per connection.
    ///
    /// Only returns on an accept failure. A connection that cannot be set up
    /// is logged and dropped; the loop keeps accepting.
    pub fn listen<F>(&self, on_message: F) -> Result<()>
    where
        F: Fn(ChunkSource, ReplySink) + Send + Sync + 'static,
    {
        let on_message = Arc::new(on_message);
        loop {
            let (stream, peer) = self.transport.accept()?;
            let Inbound {
                id, source, reply, ..
            } = match self.start_connection(stream, peer) {
                Ok(inbound) => inbound,
                Err(err) => {
                    warn!(error = %err, "connection setup failed, dropping it");
                    continue;
                }
            };

            let handler = Arc::clone(&on_message);
            let conn_id = id.clone();
            let spawned = thread::Builder::new()
                .name(format!("wt-consume-{id}"))
                .spawn(move || {
                    if catch_unwind(AssertUnwindSafe(|| handler(source, reply))).is_err() {
                        warn!(conn = %conn_id, "message handler panicked");
                    }
                });
            if let Err(err) = spawned {
                warn!(conn = %id, error = %err, "failed to start consumer, dropping connection");
            }
        }
    }

    fn start_connection(&self, stream: WtStream, peer: String) -> Result<Inbound> {
        let id = format!("conn-{}", self.next_conn_id.fetch_add(1, Ordering::Relaxed));

        let reply = ReplySink::new(stream.try_clone()?, self.config.frame.clone())?;
        let (sink, source) = chunk_channel(self.config.channel_capacity);

        let frame_config = self.config.frame.clone();
        let conn_id = id.clone();
        thread::Builder::new()
            .name(format!("wt-recv-{id}"))
            .spawn(move || {
                receive_connection(stream, sink, frame_config, &conn_id);
            })
            .map_err(LinkError::Spawn)?;

        debug!(conn = %id, %peer, "receiver started");
        Ok(Inbound {
            id,
            peer,
            source,
            reply,
        })
    }

    /// The endpoint actually bound (ephemeral TCP ports resolved).
    pub fn local_endpoint(&self) -> Endpoint {
        self.transport.local_endpoint()
    }

    /// Current listener configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }
}

/// Bind `endpoint` and serve forever with default configuration.
pub fn listen<F>(endpoint: &Endpoint, on_message: F) -> Result<()>
where
    F: Fn(ChunkSource, ReplySink) + Send + Sync + 'static,
{
    Listener::bind(endpoint)?.listen(on_message)
}

#[cfg(test)]
mod tests {
    use std::io::{Read, Write};
    use std::net::TcpStream;
    use std::sync::mpsc;
    use std::time::Duration;

    use bytes::Bytes;
    use walkietalkie_frame::{FrameConfig, MessageWriter};
    use walkietalkie_transport::TransportError;

    use super::*;
    use crate::sender::Sender;

    fn loopback() -> Listener {
        Listener::bind(&Endpoint::tcp("127.0.0.1:0")).expect("listener should bind")
    }

    fn pattern(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 253) as u8).collect()
    }

    fn tcp_addr(endpoint: &Endpoint) -> String {
        match endpoint {
            Endpoint::Tcp(addr) => addr.clone(),
            #[cfg(unix)]
            Endpoint::Unix(_) => unreachable!("loopback listener is tcp"),
        }
    }

    #[test]
    fn oneshot_roundtrip() {
        let listener = loopback();
        let sender = Sender::new(listener.local_endpoint());

        let client = thread::spawn(move || sender.send_bytes(b"0123456789"));
        let inbound = listener.accept().expect("accept should succeed");
        assert_eq!(inbound.id, "conn-1");

        let message = inbound.source.into_message().expect("message should be complete");
        assert_eq!(message.as_ref(), b"0123456789");
        client.join().unwrap().expect("send should succeed");
    }

    #[test]
    fn chunked_roundtrip_two_million_bytes() {
        let listener = loopback();
        let sender = Sender::new(listener.local_endpoint());
        let payload = pattern(2_000_000);
        let expected = payload.clone();

        let client = thread::spawn(move || sender.send(payload.as_slice(), 2_000_000));
        let inbound = listener.accept().unwrap();

        let mut source = inbound.source;
        let mut out = Vec::with_capacity(expected.len());
        while let Some(chunk) = source.next_chunk() {
            assert!(!chunk.is_empty() && chunk.len() <= walkietalkie_frame::MAX_CHUNK_SIZE);
            out.extend_from_slice(&chunk);
        }
        assert!(source.is_complete());
        assert_eq!(source.message_len(), Some(2_000_000));
        assert_eq!(out, expected);
        client.join().unwrap().unwrap();
    }

    #[test]
    fn drop_after_header_delivers_nothing() {
        let listener = loopback();
        let addr = tcp_addr(&listener.local_endpoint());

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(&16u64.to_be_bytes()).unwrap();
        });

        let inbound = listener.accept().unwrap();
        client.join().unwrap();

        let mut source = inbound.source;
        assert!(source.next_chunk().is_none());
        assert_eq!(source.message_len(), Some(16));
        assert_eq!(source.received(), 0);
        assert!(!source.is_complete());
    }

    #[test]
    fn drop_before_header_closes_source() {
        let listener = loopback();
        let addr = tcp_addr(&listener.local_endpoint());

        let client = thread::spawn(move || {
            let mut stream = TcpStream::connect(addr).unwrap();
            stream.write_all(&[0, 0, 0]).unwrap();
        });

        let inbound = listener.accept().unwrap();
        client.join().unwrap();

        let mut source = inbound.source;
        assert!(source.wait_for_header().is_none());
        assert!(source.next_chunk().is_none());
    }

    #[test]
    fn bytes_after_declared_length_are_ignored() {
        let listener = loopback();
        let addr = tcp_addr(&listener.local_endpoint());

        let client = thread::spawn(move || {
            let stream = TcpStream::connect(addr).unwrap();
            let mut writer = MessageWriter::new(stream);
            writer.send_bytes(b"first").unwrap();
            let mut stream = writer.into_inner();
            // A would-be second message on the same connection.
            let _ = stream.write_all(&3u64.to_be_bytes());
            let _ = stream.write_all(b"two");
        });

        let inbound = listener.accept().unwrap();
        let chunks: Vec<Bytes> = inbound.source.collect();
        let joined: Vec<u8> = chunks.concat();
        assert_eq!(joined, b"first");
        client.join().unwrap();
    }

    #[test]
    fn concurrent_connections_stay_independent() {
        let listener = loopback();
        let endpoint = listener.local_endpoint();
        let (done_tx, done_rx) = mpsc::channel::<(u8, Vec<u8>, bool)>();

        let server = thread::spawn(move || {
            listener.listen(move |source, _reply| {
                let mut bytes = Vec::new();
                let complete = source.for_each_chunk(|chunk| bytes.extend_from_slice(chunk));
                let tag = bytes.first().copied().unwrap_or(0);
                let _ = done_tx.send((tag, bytes, complete));
            })
        });

        let clients: Vec<_> = [1u8, 2u8]
            .into_iter()
            .map(|tag| {
                let sender = Sender::new(endpoint.clone());
                thread::spawn(move || {
                    let payload = vec![tag; 1_500_000];
                    sender.send_bytes(&payload).unwrap();
                })
            })
            .collect();
        for client in clients {
            client.join().unwrap();
        }

        let mut seen = Vec::new();
        for _ in 0..2 {
            let (tag, bytes, complete) = done_rx
                .recv_timeout(Duration::from_secs(10))
                .expect("both consumers should finish");
            assert!(complete);
            assert_eq!(bytes.len(), 1_500_000);
            assert!(bytes.iter().all(|&b| b == tag), "chunks must not interleave");
            seen.push(tag);
        }
        seen.sort_unstable();
        assert_eq!(seen, vec![1, 2]);
        drop(server);
    }

    #[test]
    fn slow_consumer_still_receives_everything() {
        let listener = loopback();
        let sender = Sender::new(listener.local_endpoint());
        let payload = pattern(3_000_000);
        let expected_len = payload.len();

        let client = thread::spawn(move || sender.send_bytes(&payload));
        let inbound = listener.accept().unwrap();

        let mut source = inbound.source;
        let mut total = 0usize;
        while let Some(chunk) = source.next_chunk() {
            total += chunk.len();
            thread::sleep(Duration::from_millis(1));
        }
        assert_eq!(total, expected_len);
        assert!(source.is_complete());
        client.join().unwrap().unwrap();
    }

    #[test]
    fn request_gets_framed_reply() {
        let listener = loopback();
        let sender = Sender::new(listener.local_endpoint());

        let server = thread::spawn(move || {
            let Inbound { source, mut reply, .. } = listener.accept().unwrap();
            let message = source.into_message().unwrap();
            let mut upper = message.to_vec();
            upper.make_ascii_uppercase();
            reply.reply(&upper).unwrap();
        });

        let response = sender.request(&b"walkie"[..], 6).unwrap();
        assert_eq!(response.as_ref(), b"WALKIE");
        server.join().unwrap();
    }

    #[test]
    fn tuned_threshold_and_chunk_size_roundtrip() {
        let config = LinkConfig {
            frame: FrameConfig {
                streaming_threshold: 64,
                max_chunk_size: 100,
                ..FrameConfig::default()
            },
            channel_capacity: 2,
        };
        let listener =
            Listener::bind_with_config(&Endpoint::tcp("127.0.0.1:0"), config.clone()).unwrap();
        let sender = Sender::with_config(listener.local_endpoint(), config);
        let payload = pattern(10_000);
        let expected = payload.clone();

        let client = thread::spawn(move || sender.send_bytes(&payload));
        let inbound = listener.accept().unwrap();
        let mut source = inbound.source;
        let mut out = Vec::new();
        while let Some(chunk) = source.next_chunk() {
            assert!(chunk.len() <= 100);
            out.extend_from_slice(&chunk);
        }
        assert_eq!(out, expected);
        client.join().unwrap().unwrap();
    }

    #[test]
    fn bind_conflict_is_transport_error() {
        let first = loopback();
        let result = Listener::bind(&first.local_endpoint());
        assert!(matches!(
            result,
            Err(LinkError::Transport(TransportError::Bind { .. }))
        ));
    }

    #[test]
    fn invalid_config_rejected_before_bind() {
        let config = LinkConfig {
            channel_capacity: 0,
            ..LinkConfig::default()
        };
        let result = Listener::bind_with_config(&Endpoint::tcp("127.0.0.1:0"), config);
        assert!(matches!(result, Err(LinkError::InvalidConfig(_))));
    }

    #[test]
    fn zero_timeout_rejected_before_bind() {
        let config = LinkConfig {
            frame: FrameConfig {
                write_timeout: Some(Duration::ZERO),
                ..FrameConfig::default()
            },
            ..LinkConfig::default()
        };
        let result = Listener::bind_with_config(&Endpoint::tcp("127.0.0.1:0"), config);
        assert!(matches!(result, Err(LinkError::Frame(_))));
    }

    #[test]
    fn failed_connection_setup_keeps_listening() {
        // Skips validation so every accepted connection fails in setup.
        let listener = Listener {
            transport: TransportListener::bind(&Endpoint::tcp("127.0.0.1:0")).unwrap(),
            config: LinkConfig {
                frame: FrameConfig {
                    write_timeout: Some(Duration::ZERO),
                    ..FrameConfig::default()
                },
                ..LinkConfig::default()
            },
            next_conn_id: AtomicU64::new(1),
        };
        let addr = tcp_addr(&listener.local_endpoint());
        let (called_tx, called_rx) = mpsc::channel::<()>();

        let server = thread::spawn(move || {
            listener.listen(move |_source, _reply| {
                let _ = called_tx.send(());
            })
        });

        for _ in 0..3 {
            let mut stream = TcpStream::connect(&addr).expect("listener should still accept");
            stream
                .set_read_timeout(Some(Duration::from_secs(5)))
                .unwrap();
            let mut buf = [0u8; 1];
            // The server drops the connection: EOF or a reset, never data.
            assert!(!matches!(stream.read(&mut buf), Ok(n) if n > 0));
        }

        thread::sleep(Duration::from_millis(50));
        assert!(!server.is_finished(), "listen must survive per-connection failures");
        assert!(called_rx.try_recv().is_err());
    }

    #[test]
    #[cfg(unix)]
    fn roundtrip_over_unix_socket() {
        let dir = std::env::temp_dir().join(format!(
            "wt-link-uds-{}-{}",
            std::process::id(),
            std::time::SystemTime::now()
                .duration_since(std::time::UNIX_EPOCH)
                .expect("time should be after epoch")
                .as_nanos()
        ));
        std::fs::create_dir_all(&dir).unwrap();
        let endpoint = Endpoint::unix(dir.join("link.sock"));

        let listener = Listener::bind(&endpoint).unwrap();
        let sender = Sender::new(endpoint);
        let client = thread::spawn(move || sender.send_bytes(b"over uds"));

        let inbound = listener.accept().unwrap();
        assert_eq!(inbound.source.into_message().unwrap().as_ref(), b"over uds");
        client.join().unwrap().unwrap();

        drop(listener);
        let _ = std::fs::remove_dir_all(&dir);
    }
}
