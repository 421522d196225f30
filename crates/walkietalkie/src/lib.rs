//! One message per connection, streamed as backpressured chunks.
//!
//! A sender dials, writes an 8-byte length header followed by the body, and
//! closes. Small bodies go out raw; bodies at or above the streaming
//! threshold go out as 2-byte-prefixed chunk frames. The listener runs one
//! receiver loop per connection and hands its consumer the chunks through a
//! bounded queue, so a slow consumer throttles the socket read.
//!
//! # Crate Structure
//!
//! - [`transport`]: TCP and Unix-domain listen/accept/dial
//! - [`frame`]: length header and chunk frame codec, blocking reader/writer
//! - [`link`]: listener, sender, chunk queue, and reply sink
//!
//! The `async` feature adds tokio equivalents at every layer.

/// Re-export transport types.
pub mod transport {
    pub use walkietalkie_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use walkietalkie_frame::*;
}

/// Re-export link types.
pub mod link {
    pub use walkietalkie_link::*;
}

pub use walkietalkie_link::{listen, send, ChunkSource, LinkConfig, Listener, ReplySink, Sender};
pub use walkietalkie_transport::Endpoint;
