//! Retry policy as carried on the wire (manifest) and read by the runner.

use crate::duration::DurationMs;
use serde::{Deserialize, Serialize};

/// Retry policy for a function.
///
/// Only [`Retries::max_retries`] is read by the local runner's retry loop.
/// `initial_delay_sec`, `max_delay_sec`, and `delay_multiplier` are carried
/// for wire compatibility with the function manifest (a remote scheduler may
/// use them to schedule backoff) but the in-process retry loop retries
/// immediately; this mirrors the upstream system this was distilled from,
/// where the same fields exist on the retry model but only `max_retries`
/// drives in-process behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Retries {
    /// Maximum number of additional attempts after the first failure.
    pub max_retries: u32,
    /// Declared, not honored by the local runner.
    #[serde(default)]
    pub initial_delay_sec: f64,
    /// Declared, not honored by the local runner.
    #[serde(default)]
    pub max_delay_sec: f64,
    /// Declared, not honored by the local runner.
    #[serde(default = "default_multiplier")]
    pub delay_multiplier: f64,
}

fn default_multiplier() -> f64 {
    1.0
}

impl Default for Retries {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_delay_sec: 0.0,
            max_delay_sec: 0.0,
            delay_multiplier: 1.0,
        }
    }
}

impl Retries {
    /// Construct a policy with only a retry count, zero backoff fields.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    /// No retries, function errors surface on first failure.
    pub fn none() -> Self {
        Self::default()
    }

    /// Backoff declared by this policy, as `DurationMs`, for informational
    /// display only (not used by the local runner's scheduling).
    pub fn initial_delay(&self) -> DurationMs {
        DurationMs::from_millis((self.initial_delay_sec * 1000.0) as u64)
    }
}
