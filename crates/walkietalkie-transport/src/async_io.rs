//! Tokio equivalents of the blocking transport types.

use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use crate::endpoint::Endpoint;
use crate::error::{Result, TransportError};
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A connected async stream over TCP or a Unix domain socket.
pub struct AsyncStream {
    inner: AsyncStreamInner,
}

enum AsyncStreamInner {
    Tcp(TcpStream),
    #[cfg(unix)]
    Unix(tokio::net::UnixStream),
}

impl AsyncRead for AsyncStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            AsyncStreamInner::Tcp(stream) => Pin::new(stream).poll_read(cx, buf),
            #[cfg(unix)]
            AsyncStreamInner::Unix(stream) => Pin::new(stream).poll_read(cx, buf),
        }
    }
}

impl AsyncWrite for AsyncStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        match &mut self.get_mut().inner {
            AsyncStreamInner::Tcp(stream) => Pin::new(stream).poll_write(cx, buf),
            #[cfg(unix)]
            AsyncStreamInner::Unix(stream) => Pin::new(stream).poll_write(cx, buf),
        }
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            AsyncStreamInner::Tcp(stream) => Pin::new(stream).poll_flush(cx),
            #[cfg(unix)]
            AsyncStreamInner::Unix(stream) => Pin::new(stream).poll_flush(cx),
        }
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        match &mut self.get_mut().inner {
            AsyncStreamInner::Tcp(stream) => Pin::new(stream).poll_shutdown(cx),
            #[cfg(unix)]
            AsyncStreamInner::Unix(stream) => Pin::new(stream).poll_shutdown(cx),
        }
    }
}

impl std::fmt::Debug for AsyncStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kind = match &self.inner {
            AsyncStreamInner::Tcp(_) => "tcp",
            #[cfg(unix)]
            AsyncStreamInner::Unix(_) => "unix",
        };
        f.debug_struct("AsyncStream").field("type", &kind).finish()
    }
}

/// A bound async listener.
pub struct AsyncTransportListener {
    inner: AsyncListenerInner,
}

enum AsyncListenerInner {
    Tcp(TcpListener),
    /// The blocking socket is kept for its cleanup-on-drop behavior.
    #[cfg(unix)]
    Unix(tokio::net::UnixListener, UnixDomainSocket),
}

impl AsyncTransportListener {
    /// Bind to an endpoint.
    pub async fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => {
                let listener = TcpListener::bind(addr.as_str()).await.map_err(|e| {
                    TransportError::Bind {
                        endpoint: addr.clone(),
                        source: e,
                    }
                })?;
                info!(local_addr = ?listener.local_addr().ok(), "listening on tcp (async)");
                Ok(Self {
                    inner: AsyncListenerInner::Tcp(listener),
                })
            }
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let socket = UnixDomainSocket::bind(path)?;
                let bind_err = |source: io::Error| TransportError::Bind {
                    endpoint: path.display().to_string(),
                    source,
                };
                let std_listener = socket.listener().try_clone().map_err(bind_err)?;
                std_listener.set_nonblocking(true).map_err(bind_err)?;
                let listener = tokio::net::UnixListener::from_std(std_listener).map_err(bind_err)?;
                Ok(Self {
                    inner: AsyncListenerInner::Unix(listener, socket),
                })
            }
        }
    }

    /// Accept the next connection, returning the stream and a peer label.
    pub async fn accept(&self) -> Result<(AsyncStream, String)> {
        match &self.inner {
            AsyncListenerInner::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(TransportError::Accept)?;
                debug!(%peer, "accepted tcp connection");
                Ok((
                    AsyncStream {
                        inner: AsyncStreamInner::Tcp(stream),
                    },
                    peer.to_string(),
                ))
            }
            #[cfg(unix)]
            AsyncListenerInner::Unix(listener, socket) => {
                let (stream, _addr) = listener.accept().await.map_err(TransportError::Accept)?;
                debug!(path = ?socket.path(), "accepted unix connection");
                Ok((
                    AsyncStream {
                        inner: AsyncStreamInner::Unix(stream),
                    },
                    format!("unix:{}", socket.path().display()),
                ))
            }
        }
    }

    /// The endpoint actually bound (ephemeral TCP ports resolved).
    pub fn local_endpoint(&self) -> Result<Endpoint> {
        match &self.inner {
            AsyncListenerInner::Tcp(listener) => {
                Ok(Endpoint::Tcp(listener.local_addr()?.to_string()))
            }
            #[cfg(unix)]
            AsyncListenerInner::Unix(_, socket) => Ok(Endpoint::Unix(socket.path().to_path_buf())),
        }
    }
}

/// Dial an endpoint.
pub async fn connect_async(endpoint: &Endpoint) -> Result<AsyncStream> {
    match endpoint {
        Endpoint::Tcp(addr) => {
            let stream = TcpStream::connect(addr.as_str()).await.map_err(|e| {
                TransportError::Connect {
                    endpoint: addr.clone(),
                    source: e,
                }
            })?;
            debug!(addr = addr.as_str(), "connected over tcp (async)");
            Ok(AsyncStream {
                inner: AsyncStreamInner::Tcp(stream),
            })
        }
        #[cfg(unix)]
        Endpoint::Unix(path) => {
            let stream = tokio::net::UnixStream::connect(path).await.map_err(|e| {
                TransportError::Connect {
                    endpoint: path.display().to_string(),
                    source: e,
                }
            })?;
            debug!(?path, "connected to unix domain socket (async)");
            Ok(AsyncStream {
                inner: AsyncStreamInner::Unix(stream),
            })
        }
    }
}
