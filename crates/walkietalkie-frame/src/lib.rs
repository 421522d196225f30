//! Length-prefixed, optionally chunked message framing.
//!
//! Every connection carries exactly one message:
//! - An 8-byte big-endian total length `L`
//! - Then, for `L` below the streaming threshold (1 MiB by default), the raw
//!   `L` bytes
//! - Otherwise a sequence of chunk frames, each a 2-byte big-endian length
//!   `n` followed by `n` payload bytes, summing to `L`
//!
//! [`MessageWriter`] produces that layout from any `Read` source and
//! [`MessageReader`] turns it back into a sequence of chunks without ever
//! reading past `L`.

pub mod codec;
pub mod error;
pub mod reader;
pub mod writer;

#[cfg(feature = "async")]
pub mod async_codec;

pub use codec::{
    chunk_frame_count, decode_chunk_frame, decode_length_header, encode_chunk_frame,
    encode_length_header, put_length_header, BodyMode, FrameConfig, MessagePart,
    CHUNK_HEADER_SIZE, DEFAULT_STREAMING_THRESHOLD, LENGTH_HEADER_SIZE, MAX_CHUNK_SIZE,
};
pub use error::{FrameError, Result};
pub use reader::MessageReader;
pub use writer::MessageWriter;

#[cfg(feature = "async")]
pub use async_codec::{write_message, MessageDecoder};
