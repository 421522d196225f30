mod cmd;
mod exit;
mod logging;
mod output;

use clap::Parser;
use walkietalkie_frame::{FrameConfig, DEFAULT_STREAMING_THRESHOLD, MAX_CHUNK_SIZE};
use walkietalkie_link::{LinkConfig, DEFAULT_CHANNEL_CAPACITY};

use crate::cmd::Command;
use crate::exit::{link_error, CliResult};
use crate::logging::{init_logging, LogFormat, LogLevel};
use crate::output::OutputFormat;

#[derive(Parser, Debug)]
#[command(
    name = "walkietalkie",
    version,
    about = "Send and receive one message per connection"
)]
struct Cli {
    /// Output format.
    #[arg(long, value_name = "FORMAT", global = true)]
    format: Option<OutputFormat>,

    /// Log output format (stderr).
    #[arg(long, value_name = "FORMAT", default_value = "text", global = true)]
    log_format: LogFormat,

    /// Minimum log level (stderr). RUST_LOG overrides it when set.
    #[arg(long, value_name = "LEVEL", default_value = "info", global = true)]
    log_level: LogLevel,

    /// Message length at which the body switches to chunk frames.
    #[arg(
        long,
        value_name = "BYTES",
        env = "WALKIETALKIE_THRESHOLD",
        default_value_t = DEFAULT_STREAMING_THRESHOLD,
        global = true
    )]
    threshold: u64,

    /// Largest chunk read or written at once (1..=65535).
    #[arg(
        long,
        value_name = "BYTES",
        env = "WALKIETALKIE_CHUNK_SIZE",
        default_value_t = MAX_CHUNK_SIZE,
        global = true
    )]
    chunk_size: usize,

    /// Chunks buffered between a receiver loop and its consumer.
    #[arg(
        long,
        value_name = "N",
        env = "WALKIETALKIE_CHANNEL_CAPACITY",
        default_value_t = DEFAULT_CHANNEL_CAPACITY,
        global = true
    )]
    channel_capacity: usize,

    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn link_config(&self) -> CliResult<LinkConfig> {
        let config = LinkConfig {
            frame: FrameConfig {
                streaming_threshold: self.threshold,
                max_chunk_size: self.chunk_size,
                ..FrameConfig::default()
            },
            channel_capacity: self.channel_capacity,
        };
        config
            .validate()
            .map_err(|err| link_error("invalid configuration", err))?;
        Ok(config)
    }
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.log_format, cli.log_level);

    let format = cli.format.unwrap_or_else(OutputFormat::default_for_stdout);
    let result = cli
        .link_config()
        .and_then(|config| cmd::run(cli.command, format, config));

    match result {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("error: {err}");
            std::process::exit(err.code);
        }
    }
}
