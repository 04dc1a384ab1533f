//! Protocol configuration.

use std::time::Duration;
use thiserror::Error;

/// Configuration errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The committee cannot tolerate the configured number of faults.
    #[error("committee of {n} cannot tolerate {f} Byzantine faults (requires n >= 3f + 1)")]
    FaultBoundViolated { n: usize, f: usize },

    /// Proposed sets must be allowed to hold at least one value.
    #[error("set_size must be at least 1")]
    EmptySetSize,
}

/// Parameters of one agreement instance.
#[derive(Debug, Clone)]
pub struct HareConfig {
    /// Committee size.
    pub n: usize,
    /// Number of Byzantine faults tolerated. Requires `n >= 3f + 1`.
    pub f: usize,
    /// Maximum cardinality of a proposed set.
    pub set_size: usize,
    /// Wall-clock duration of each round.
    pub round_duration: Duration,
}

impl Default for HareConfig {
    fn default() -> Self {
        // Smallest committee that tolerates one fault.
        Self {
            n: 4,
            f: 1,
            set_size: 8,
            round_duration: Duration::from_millis(500),
        }
    }
}

impl HareConfig {
    /// Evidence threshold: f+1 distinct senders.
    pub fn threshold(&self) -> usize {
        self.f + 1
    }

    /// Validate the fault bound and set capacity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.n < 3 * self.f + 1 {
            return Err(ConfigError::FaultBoundViolated {
                n: self.n,
                f: self.f,
            });
        }
        if self.set_size == 0 {
            return Err(ConfigError::EmptySetSize);
        }
        Ok(())
    }
}
