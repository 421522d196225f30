//! One message per connection, consumed as a backpressured chunk stream.
//!
//! This is the "just works" layer. A [`Listener`] accepts connections and
//! runs one receiver loop per connection, which decodes the framed message
//! and pushes its chunks into a bounded queue. The consumer reads the
//! queue through a [`ChunkSource`] and may answer on the same connection
//! through a [`ReplySink`]. A [`Sender`] dials, sends, and closes.

pub mod channel;
pub mod config;
pub mod error;
pub mod listener;
pub mod receiver;
pub mod reply;
pub mod sender;

#[cfg(feature = "async")]
pub mod async_link;

pub use channel::{chunk_channel, ChunkSink, ChunkSource};
pub use config::{LinkConfig, DEFAULT_CHANNEL_CAPACITY};
pub use error::{LinkError, Result};
pub use listener::{listen, Inbound, Listener};
pub use receiver::{pump, receive_connection, ReceiveOutcome};
pub use reply::ReplySink;
pub use sender::{send, Sender};

#[cfg(feature = "async")]
pub use async_link::{
    receive_task, request_async, send_async, AsyncChunkSource, AsyncInbound, AsyncListener,
    AsyncReplySink,
};
