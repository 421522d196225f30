use std::io::{Read, Write};
use std::net::Shutdown;

use walkietalkie_frame::{FrameConfig, MessageWriter};
use walkietalkie_transport::WtStream;

use crate::error::Result;

/// Write half of an accepted connection, handed to the consumer.
///
/// Raw bytes can be written through `std::io::Write`; [`ReplySink::reply`]
/// writes a complete framed message a `Sender::request` caller can read.
#[derive(Debug)]
pub struct ReplySink {
    stream: WtStream,
    config: FrameConfig,
}

impl ReplySink {
    pub(crate) fn new(stream: WtStream, config: FrameConfig) -> Result<Self> {
        stream.set_write_timeout(config.write_timeout)?;
        Ok(Self { stream, config })
    }

    /// Send an in-memory framed reply.
    pub fn reply(&mut self, payload: &[u8]) -> Result<()> {
        self.reply_from(payload, payload.len() as u64)
    }

    /// Send a framed reply of `len` bytes pulled from `source`.
    pub fn reply_from<R: Read>(&mut self, source: R, len: u64) -> Result<()> {
        let mut writer = MessageWriter::with_config(&mut self.stream, self.config.clone());
        writer.send(source, len)?;
        Ok(())
    }

    /// Shut down the write half, signalling EOF to the peer.
    pub fn close(self) -> Result<()> {
        self.stream.shutdown(Shutdown::Write)?;
        Ok(())
    }
}

impl Write for ReplySink {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.stream.flush()
    }
}
