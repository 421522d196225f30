//! Minimal echo server: replies to each message with its own bytes.
//!
//! Run with:
//!   cargo run --example echo-server
//!
//! In another terminal:
//!   cargo run --features cli -- send 127.0.0.1:7400 --data hello --wait

use walkietalkie::{ChunkSource, Endpoint, Listener, ReplySink};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint: Endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7400".to_string())
        .parse()?;

    let listener = Listener::bind(&endpoint)?;
    eprintln!("Listening on {}", listener.local_endpoint());

    listener.listen(|source: ChunkSource, mut reply: ReplySink| {
        match source.into_message() {
            Ok(message) => {
                eprintln!("Received {} bytes", message.len());
                if let Err(e) = reply.reply(&message) {
                    eprintln!("Reply failed: {e}");
                }
            }
            Err(e) => eprintln!("Dropped message: {e}"),
        }
    })?;

    Ok(())
}
