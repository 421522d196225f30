//! Connection-oriented stream transport for walkietalkie.
//!
//! Provides listen/accept/dial over:
//! - TCP (any platform)
//! - Unix domain sockets (Linux/macOS)
//!
//! This is the lowest layer of walkietalkie. The framing and link crates
//! build on the [`WtStream`] type provided here, or on [`AsyncStream`] with
//! the `async` feature.

pub mod endpoint;
pub mod error;
pub mod listener;
pub mod stream;
pub mod tcp;

#[cfg(unix)]
pub mod uds;

#[cfg(feature = "async")]
pub mod async_io;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use listener::{connect, TransportListener};
pub use stream::WtStream;
pub use tcp::TcpTransport;

#[cfg(unix)]
pub use uds::UnixDomainSocket;

#[cfg(feature = "async")]
pub use async_io::{connect_async, AsyncStream, AsyncTransportListener};
