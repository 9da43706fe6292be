//! Checker configuration: expander addresses, settle times, bus deadline.

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::pins::validate_addresses;
use crate::verify::Timing;
use crate::ConfigError;

/// Expander addresses of the reference socket board, in pin order.
pub const DEFAULT_EXPANDERS: [u8; 3] = [0x20, 0x21, 0x22];

/// Default per-transaction bus deadline in milliseconds.
pub const DEFAULT_BUS_TIMEOUT_MS: u64 = 1000;

/// Checker configuration. Missing JSON fields take their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CheckerConfig {
    /// Expander addresses; the n-th owns logical pins `16n..16n+16`.
    pub expanders: Vec<u8>,
    /// Wait after power-up, in milliseconds.
    pub power_settle_ms: u64,
    /// Wait after driving a row, in milliseconds.
    pub propagation_ms: u64,
    /// Per-transaction deadline in milliseconds; 0 disables it.
    pub bus_timeout_ms: u64,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        let timing = Timing::default();
        Self {
            expanders: DEFAULT_EXPANDERS.to_vec(),
            power_settle_ms: millis(timing.power_settle),
            propagation_ms: millis(timing.propagation),
            bus_timeout_ms: DEFAULT_BUS_TIMEOUT_MS,
        }
    }
}

fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

impl CheckerConfig {
    /// Parses a JSON configuration document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed JSON or unknown fields.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text).map_err(|error| ConfigError::Parse(error.to_string()))
    }

    /// Reads and parses a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`CheckerConfig::from_json`].
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path)
            .map_err(|error| ConfigError::Io(format!("{}: {error}", path.display())))?;
        Self::from_json(&text)
    }

    /// Rejects empty or repeated expander lists.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::NoExpanders`] or [`ConfigError::DuplicateAddress`].
    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_addresses(&self.expanders)
    }

    /// Settle times as a [`Timing`].
    #[must_use]
    pub const fn timing(&self) -> Timing {
        Timing {
            power_settle: Duration::from_millis(self.power_settle_ms),
            propagation: Duration::from_millis(self.propagation_ms),
        }
    }

    /// Bus deadline, or `None` when disabled.
    #[must_use]
    pub const fn bus_timeout(&self) -> Option<Duration> {
        if self.bus_timeout_ms == 0 {
            None
        } else {
            Some(Duration::from_millis(self.bus_timeout_ms))
        }
    }
}
