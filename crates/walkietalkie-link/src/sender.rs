use std::io::Read;

use bytes::Bytes;
use tracing::debug;
use walkietalkie_frame::{MessageReader, MessageWriter};
use walkietalkie_transport::{connect, Endpoint, WtStream};

use crate::config::LinkConfig;
use crate::error::Result;

/// Client side: one connection per message.
#[derive(Debug, Clone)]
pub struct Sender {
    endpoint: Endpoint,
    config: LinkConfig,
}

impl Sender {
    /// Sender for `endpoint` with default configuration.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_config(endpoint, LinkConfig::default())
    }

    /// Sender with explicit configuration, validated on each send.
    pub fn with_config(endpoint: Endpoint, config: LinkConfig) -> Self {
        Self { endpoint, config }
    }

    /// Connect, send `len` bytes read from `source`, then close.
    ///
    /// Uses raw mode below the streaming threshold and chunk frames at or
    /// above it. The receiver must share the same threshold.
    pub fn send<R: Read>(&self, source: R, len: u64) -> Result<()> {
        let stream = self.open()?;
        let mut writer = MessageWriter::with_config_stream(stream, self.config.frame.clone())?;
        writer.send(source, len)?;
        debug!(endpoint = %self.endpoint, len, "message sent");
        Ok(())
    }

    /// Send an in-memory payload.
    pub fn send_bytes(&self, payload: &[u8]) -> Result<()> {
        self.send(payload, payload.len() as u64)
    }

    /// Send a message and wait for one framed reply on the same connection.
    pub fn request<R: Read>(&self, source: R, len: u64) -> Result<Bytes> {
        let stream = self.open()?;
        let read_half = stream.try_clone()?;

        let mut writer = MessageWriter::with_config_stream(stream, self.config.frame.clone())?;
        writer.send(source, len)?;
        debug!(endpoint = %self.endpoint, len, "request sent, awaiting reply");

        let mut reader = MessageReader::with_config_stream(read_half, self.config.frame.clone())?;
        let reply = reader.read_message()?;
        debug!(endpoint = %self.endpoint, len = reply.len(), "reply received");
        Ok(reply)
    }

    /// Target endpoint.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Current sender configuration.
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    fn open(&self) -> Result<WtStream> {
        self.config.validate()?;
        Ok(connect(&self.endpoint)?)
    }
}

/// Send one message to `endpoint` with default configuration.
pub fn send<R: Read>(endpoint: &Endpoint, source: R, len: u64) -> Result<()> {
    Sender::new(endpoint.clone()).send(source, len)
}
