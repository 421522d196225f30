use std::sync::mpsc;
use std::thread;

use walkietalkie_link::{Inbound, LinkConfig, LinkError, Listener};
use walkietalkie_transport::TransportError;

use crate::cmd::{install_ctrlc_handler, ListenArgs};
use crate::exit::{link_error, CliError, CliResult, INTERNAL, SUCCESS};
use crate::output::{print_message, MessageRecord, OutputFormat};

enum Event {
    Message(MessageRecord),
    Failed(CliError),
    Interrupted,
}

pub fn run(args: ListenArgs, format: OutputFormat, config: LinkConfig) -> CliResult<i32> {
    let listener = Listener::bind_with_config(&args.endpoint, config)
        .map_err(|err| link_error("bind failed", err))?;
    tracing::info!(endpoint = %listener.local_endpoint(), "listening");

    let (events_tx, events_rx) = mpsc::channel();
    let interrupt = events_tx.clone();
    install_ctrlc_handler(move || {
        let _ = interrupt.send(Event::Interrupted);
    })?;

    thread::Builder::new()
        .name("wt-accept".to_string())
        .spawn(move || accept_loop(listener, events_tx))
        .map_err(|err| CliError::new(INTERNAL, format!("failed to start accept loop: {err}")))?;

    let mut printed = 0usize;
    for event in events_rx {
        match event {
            Event::Message(record) => {
                if !record.complete {
                    tracing::warn!(
                        conn = %record.conn,
                        received = record.received,
                        declared = ?record.declared,
                        "connection closed before the message was complete"
                    );
                }
                print_message(&record, format);
                printed = printed.saturating_add(1);

                if let Some(count) = args.count {
                    if printed >= count {
                        return Ok(SUCCESS);
                    }
                }
            }
            Event::Failed(err) => return Err(err),
            Event::Interrupted => break,
        }
    }

    Ok(SUCCESS)
}

/// Accept forever, draining each connection on its own consumer thread.
fn accept_loop(listener: Listener, events: mpsc::Sender<Event>) {
    loop {
        let Inbound {
            id,
            peer,
            source,
            reply,
        } = match listener.accept() {
            Ok(inbound) => inbound,
            Err(err) if ends_accept_loop(&err) => {
                let _ = events.send(Event::Failed(link_error("accept failed", err)));
                return;
            }
            Err(err) => {
                tracing::warn!(error = %err, "connection setup failed, dropping it");
                continue;
            }
        };

        let consumer_events = events.clone();
        let spawned = thread::Builder::new()
            .name(format!("wt-consume-{id}"))
            .spawn(move || {
                drop(reply);
                let record = MessageRecord::collect(id, peer, source);
                let _ = consumer_events.send(Event::Message(record));
            });
        if let Err(err) = spawned {
            tracing::warn!(error = %err, "failed to start consumer, dropping connection");
        }
    }
}

/// Only a failing listening socket stops the loop.
fn ends_accept_loop(err: &LinkError) -> bool {
    matches!(err, LinkError::Transport(TransportError::Accept(_)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_accept_failures_end_the_loop() {
        let accept = LinkError::Transport(TransportError::Accept(std::io::Error::from(
            std::io::ErrorKind::Other,
        )));
        assert!(ends_accept_loop(&accept));

        let setup = LinkError::Transport(TransportError::Io(std::io::Error::from(
            std::io::ErrorKind::InvalidInput,
        )));
        assert!(!ends_accept_loop(&setup));
        assert!(!ends_accept_loop(&LinkError::Spawn(std::io::Error::from(
            std::io::ErrorKind::WouldBlock
        ))));
    }
}
