use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::stream::WtStream;
use crate::tcp::TcpTransport;
#[cfg(unix)]
use crate::uds::UnixDomainSocket;

/// A bound listener for any supported [`Endpoint`] kind.
pub enum TransportListener {
    Tcp(TcpTransport),
    #[cfg(unix)]
    Unix(UnixDomainSocket),
}

impl TransportListener {
    /// Bind to an endpoint.
    pub fn bind(endpoint: &Endpoint) -> Result<Self> {
        match endpoint {
            Endpoint::Tcp(addr) => Ok(Self::Tcp(TcpTransport::bind(addr)?)),
            #[cfg(unix)]
            Endpoint::Unix(path) => Ok(Self::Unix(UnixDomainSocket::bind(path)?)),
        }
    }

    /// Accept the next connection, returning the stream and a peer label.
    pub fn accept(&self) -> Result<(WtStream, String)> {
        match self {
            Self::Tcp(transport) => transport.accept(),
            #[cfg(unix)]
            Self::Unix(socket) => socket.accept(),
        }
    }

    /// The endpoint actually bound (ephemeral TCP ports resolved).
    pub fn local_endpoint(&self) -> Endpoint {
        match self {
            Self::Tcp(transport) => Endpoint::Tcp(transport.local_addr().to_string()),
            #[cfg(unix)]
            Self::Unix(socket) => Endpoint::Unix(socket.path().to_path_buf()),
        }
    }

    /// Transport name for diagnostics.
    pub fn transport_name(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            #[cfg(unix)]
            Self::Unix(_) => "unix-domain-socket",
        }
    }
}

/// Dial an endpoint (blocking).
pub fn connect(endpoint: &Endpoint) -> Result<WtStream> {
    match endpoint {
        Endpoint::Tcp(addr) => TcpTransport::connect(addr),
        #[cfg(unix)]
        Endpoint::Unix(path) => UnixDomainSocket::connect(path),
    }
}
