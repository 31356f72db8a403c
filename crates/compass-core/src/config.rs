use serde::{Deserialize, Serialize};
use thiserror_no_std::Error;

extern crate alloc;
use alloc::vec::Vec;

/// Idle time after which an unread magnetometer channel is closed.
pub const DEFAULT_IDLE_TIMEOUT_MS: f32 = 30_000.0;

/// Runtime configuration for the heading service.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct CompassConfig {
    /// Initial idle timeout in milliseconds.
    pub idle_timeout_ms: f32,
    /// Whether `setTimeout` / `getTimeout` are exposed on the command
    /// surface. When off the timeout stays at `idle_timeout_ms`.
    pub timeout_commands: bool,
}

impl Default for CompassConfig {
    fn default() -> Self {
        Self {
            idle_timeout_ms: DEFAULT_IDLE_TIMEOUT_MS,
            timeout_commands: true,
        }
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Failed to decode compass config")]
    Decode,
    #[error("Failed to encode compass config")]
    Encode,
}

impl CompassConfig {
    pub fn with_idle_timeout_ms(mut self, idle_timeout_ms: f32) -> Self {
        self.idle_timeout_ms = idle_timeout_ms;
        self
    }

    pub fn with_timeout_commands(mut self, enabled: bool) -> Self {
        self.timeout_commands = enabled;
        self
    }

    /// Load a config previously written with [`to_vec`](Self::to_vec).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, ConfigError> {
        postcard::from_bytes(bytes).map_err(|_| ConfigError::Decode)
    }

    pub fn to_vec(&self) -> Result<Vec<u8>, ConfigError> {
        postcard::to_allocvec(self).map_err(|_| ConfigError::Encode)
    }
}
