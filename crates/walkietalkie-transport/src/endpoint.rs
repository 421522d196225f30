use std::fmt;
#[cfg(unix)]
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{Result, TransportError};

/// Where a listener binds or a sender dials.
///
/// Parsed from `tcp://host:port`, a bare `host:port`, or (Unix only)
/// `unix:///path/to.sock`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A TCP socket address, kept as `host:port` so hostnames resolve at use.
    Tcp(String),
    /// A filesystem-path Unix domain socket.
    #[cfg(unix)]
    Unix(PathBuf),
}

impl Endpoint {
    /// TCP endpoint from a `host:port` string.
    pub fn tcp(addr: impl Into<String>) -> Self {
        Self::Tcp(addr.into())
    }

    /// Unix domain socket endpoint.
    #[cfg(unix)]
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }

    /// URL scheme of this endpoint.
    pub fn scheme(&self) -> &'static str {
        match self {
            Self::Tcp(_) => "tcp",
            #[cfg(unix)]
            Self::Unix(_) => "unix",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Tcp(addr) => write!(f, "tcp://{addr}"),
            #[cfg(unix)]
            Self::Unix(path) => write!(f, "unix://{}", path.display()),
        }
    }
}

impl FromStr for Endpoint {
    type Err = TransportError;

    fn from_str(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err(invalid(input, "endpoint must not be empty"));
        }

        if let Some(path) = trimmed.strip_prefix("unix://") {
            return parse_unix(input, path);
        }

        let addr = trimmed.strip_prefix("tcp://").unwrap_or(trimmed);
        if addr.contains("://") {
            return Err(invalid(input, "unsupported scheme (expected tcp:// or unix://)"));
        }

        let (host, port) = addr
            .rsplit_once(':')
            .ok_or_else(|| invalid(input, "missing port (expected host:port)"))?;
        if host.is_empty() {
            return Err(invalid(input, "missing host"));
        }
        port.parse::<u16>()
            .map_err(|_| invalid(input, "port must be a number in 0..=65535"))?;

        Ok(Self::Tcp(addr.to_string()))
    }
}

#[cfg(unix)]
fn parse_unix(input: &str, path: &str) -> Result<Endpoint> {
    if path.is_empty() {
        return Err(invalid(input, "missing socket path"));
    }
    Ok(Endpoint::Unix(PathBuf::from(path)))
}

#[cfg(not(unix))]
fn parse_unix(input: &str, _path: &str) -> Result<Endpoint> {
    Err(invalid(
        input,
        "unix domain sockets are not supported on this platform",
    ))
}

fn invalid(input: &str, reason: &'static str) -> TransportError {
    TransportError::InvalidEndpoint {
        input: input.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_and_prefixed_tcp() {
        assert_eq!(
            "127.0.0.1:7000".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("127.0.0.1:7000")
        );
        assert_eq!(
            "tcp://localhost:80".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("localhost:80")
        );
        assert_eq!(
            "[::1]:9000".parse::<Endpoint>().unwrap(),
            Endpoint::tcp("[::1]:9000")
        );
    }

    #[test]
    #[cfg(unix)]
    fn parses_unix_path() {
        let endpoint: Endpoint = "unix:///tmp/wt.sock".parse().unwrap();
        assert_eq!(endpoint, Endpoint::unix("/tmp/wt.sock"));
        assert_eq!(endpoint.scheme(), "unix");
        assert_eq!(endpoint.to_string(), "unix:///tmp/wt.sock");
    }

    #[test]
    fn rejects_malformed_endpoints() {
        for input in ["", "localhost", ":80", "host:notaport", "http://x:1", "unix://"] {
            let err = input.parse::<Endpoint>().unwrap_err();
            assert!(
                matches!(err, TransportError::InvalidEndpoint { .. }),
                "{input:?} should be rejected"
            );
        }
    }

    #[test]
    fn display_roundtrips_through_parse() {
        let endpoint = Endpoint::tcp("10.0.0.1:4242");
        assert_eq!(endpoint.to_string().parse::<Endpoint>().unwrap(), endpoint);
    }
}
