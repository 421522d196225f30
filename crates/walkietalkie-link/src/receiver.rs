//! The per-connection receiver loop.

use std::io::Read;
use std::net::Shutdown;

use tracing::debug;
use walkietalkie_frame::{FrameConfig, MessagePart, MessageReader};
use walkietalkie_transport::WtStream;

use crate::channel::ChunkSink;
use crate::error::{LinkError, Result};

/// How a receiver loop ended.
#[derive(Debug)]
pub enum ReceiveOutcome {
    /// Every declared byte was delivered.
    Complete { len: u64 },
    /// The loop stopped early; the consumer saw a truncated sequence.
    Aborted { offset: u64, error: LinkError },
}

/// Pump one message from `reader` into `sink`.
///
/// Pushes the header, then every chunk, blocking whenever the queue is full.
/// Returns the message length once `offset == len`.
pub fn pump<T: Read>(reader: &mut MessageReader<T>, sink: &ChunkSink) -> Result<u64> {
    let len = reader.read_header()?;
    sink.push(MessagePart::Header { len })?;
    while let Some(chunk) = reader.next_chunk()? {
        sink.push(MessagePart::Chunk(chunk))?;
    }
    Ok(len)
}

/// Run the receiver loop for an accepted connection to completion.
///
/// The queue is closed before the connection is touched, so the consumer
/// observes end-of-message first. On success only the read half is shut
/// down and the reply sink stays usable; on failure both halves are.
pub fn receive_connection(
    stream: WtStream,
    sink: ChunkSink,
    config: FrameConfig,
    conn_id: &str,
) -> ReceiveOutcome {
    let mut reader = match MessageReader::with_config_stream(stream, config) {
        Ok(reader) => reader,
        Err(err) => {
            debug!(conn = conn_id, error = %err, "receiver setup failed");
            return ReceiveOutcome::Aborted {
                offset: 0,
                error: err.into(),
            };
        }
    };

    let result = pump(&mut reader, &sink);
    drop(sink);

    let offset = reader.offset();
    let stream = reader.into_inner();
    match result {
        Ok(len) => {
            debug!(conn = conn_id, len, "message received");
            let _ = stream.shutdown(Shutdown::Read);
            ReceiveOutcome::Complete { len }
        }
        Err(error) => {
            debug!(conn = conn_id, offset, %error, "receive aborted");
            let _ = stream.shutdown(Shutdown::Both);
            ReceiveOutcome::Aborted { offset, error }
        }
    }
}
