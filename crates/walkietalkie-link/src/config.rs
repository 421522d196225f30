use walkietalkie_frame::FrameConfig;

use crate::error::{LinkError, Result};

/// Chunks buffered between a receiver loop and its consumer.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 4;

/// Listener and sender configuration.
#[derive(Debug, Clone)]
pub struct LinkConfig {
    /// Framing parameters; both peers must use the same streaming threshold.
    pub frame: FrameConfig,
    /// Capacity of the per-connection chunk queue. Default: 4.
    pub channel_capacity: usize,
}

impl LinkConfig {
    pub fn validate(&self) -> Result<()> {
        self.frame.validate()?;
        if self.channel_capacity == 0 {
            return Err(LinkError::InvalidConfig(
                "channel_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            frame: FrameConfig::default(),
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}
