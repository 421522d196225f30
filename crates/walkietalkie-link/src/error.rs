/// Errors that can occur in listener, sender, and consumer operations.
#[derive(Debug, thiserror::Error)]
pub enum LinkError {
    /// Transport-level error (bind, connect, accept).
    #[error("transport error: {0}")]
    Transport(#[from] walkietalkie_transport::TransportError),

    /// Framing error while reading or writing a message.
    #[error("frame error: {0}")]
    Frame(#[from] walkietalkie_frame::FrameError),

    /// The chunk sequence ended before the declared length was delivered.
    #[error("message incomplete: received {received} of {} bytes", expected_len(.expected))]
    Incomplete { received: u64, expected: Option<u64> },

    /// The consumer dropped its chunk source while chunks were still arriving.
    #[error("consumer dropped the chunk source")]
    ConsumerGone,

    /// Link configuration is unusable.
    #[error("invalid link config: {0}")]
    InvalidConfig(String),

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(std::io::Error),
}

pub type Result<T> = std::result::Result<T, LinkError>;

fn expected_len(expected: &Option<u64>) -> String {
    match expected {
        Some(len) => len.to_string(),
        None => "unknown".to_string(),
    }
}
