use std::fs::File;
use std::io::{Cursor, Read};
use std::time::Duration;

use walkietalkie_link::{LinkConfig, Sender};

use crate::cmd::SendArgs;
use crate::exit::{io_error, link_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_message, MessageRecord, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat, mut config: LinkConfig) -> CliResult<i32> {
    if args.wait {
        config.frame.read_timeout = Some(parse_duration(&args.wait_timeout)?);
    }
    let sender = Sender::with_config(args.endpoint.clone(), config);
    let (source, len) = resolve_payload(&args)?;

    if args.wait {
        let reply = sender
            .request(source, len)
            .map_err(|err| link_error("request failed", err))?;
        print_message(
            &MessageRecord::reply(args.endpoint.to_string(), reply),
            format,
        );
    } else {
        sender
            .send(source, len)
            .map_err(|err| link_error("send failed", err))?;
        tracing::debug!(endpoint = %args.endpoint, len, "send complete");
    }

    Ok(SUCCESS)
}

/// The payload and its exact length, which goes on the wire first.
fn resolve_payload(args: &SendArgs) -> CliResult<(Box<dyn Read>, u64)> {
    if let Some(data) = &args.data {
        let len = data.len() as u64;
        return Ok((Box::new(Cursor::new(data.clone().into_bytes())), len));
    }
    if let Some(path) = &args.file {
        let context = format!("failed reading {}", path.display());
        let file = File::open(path).map_err(|err| io_error(&context, err))?;
        let len = file.metadata().map_err(|err| io_error(&context, err))?.len();
        return Ok((Box::new(file), len));
    }

    let mut buf = Vec::new();
    std::io::stdin()
        .lock()
        .read_to_end(&mut buf)
        .map_err(|err| io_error("failed reading stdin", err))?;
    let len = buf.len() as u64;
    Ok((Box::new(Cursor::new(buf)), len))
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}
