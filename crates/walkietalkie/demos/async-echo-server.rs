//! Tokio echo server: one task per connection, chunks counted as they arrive.
//!
//! Run with:
//!   cargo run --example async-echo-server --features async

use walkietalkie::link::{AsyncChunkSource, AsyncListener, AsyncReplySink};
use walkietalkie::Endpoint;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let endpoint: Endpoint = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "127.0.0.1:7401".to_string())
        .parse()?;

    let listener = AsyncListener::bind(&endpoint).await?;
    eprintln!("Listening on {}", listener.local_endpoint()?);

    listener
        .listen(|mut source: AsyncChunkSource, mut reply: AsyncReplySink| async move {
            let mut body = Vec::new();
            let mut chunks = 0usize;
            while let Some(chunk) = source.next_chunk().await {
                chunks += 1;
                body.extend_from_slice(&chunk);
            }
            if !source.is_complete() {
                eprintln!("Dropped message after {} bytes", source.received());
                return;
            }
            eprintln!("Received {} bytes in {chunks} chunks", body.len());
            if let Err(e) = reply.reply(&body).await {
                eprintln!("Reply failed: {e}");
            }
        })
        .await?;

    Ok(())
}
