use walkietalkie_link::{ChunkSource, LinkConfig, Listener, ReplySink};

use crate::cmd::EchoArgs;
use crate::exit::{link_error, CliResult, SUCCESS};

pub fn run(args: EchoArgs, config: LinkConfig) -> CliResult<i32> {
    let listener = Listener::bind_with_config(&args.endpoint, config)
        .map_err(|err| link_error("bind failed", err))?;
    tracing::info!(endpoint = %listener.local_endpoint(), "echo server ready");

    listener
        .listen(echo_message)
        .map_err(|err| link_error("accept failed", err))?;

    Ok(SUCCESS)
}

// Collect before replying; a request-style sender only reads after its last write.
fn echo_message(source: ChunkSource, mut reply: ReplySink) {
    match source.into_message() {
        Ok(message) => {
            tracing::info!(size = message.len(), "echoing message");
            if let Err(err) = reply.reply(&message) {
                tracing::warn!(error = %err, "echo reply failed");
            }
        }
        Err(err) => tracing::warn!(error = %err, "dropping incomplete message"),
    }
}
