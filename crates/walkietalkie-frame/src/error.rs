/// Errors that can occur while encoding, writing, or reading a message.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// An I/O error occurred on the connection.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection was closed before the declared message length arrived.
    #[error("connection closed (incomplete message)")]
    ConnectionClosed,

    /// A chunk payload does not fit the 2-byte chunk length prefix.
    #[error("chunk too large ({size} bytes, max {max})")]
    ChunkTooLarge { size: usize, max: usize },

    /// A chunk frame announced more bytes than remain in the message.
    #[error("chunk of {size} bytes overruns message ({remaining} bytes remaining)")]
    ChunkOverrun { size: usize, remaining: u64 },

    /// The message source ended before the declared length was produced.
    #[error("message source exhausted after {sent} of {expected} bytes")]
    SourceExhausted { expected: u64, sent: u64 },

    /// Reading from the message source failed.
    #[error("failed reading message source: {0}")]
    Source(#[source] std::io::Error),

    /// The framing configuration is unusable.
    #[error("invalid frame config: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, FrameError>;
