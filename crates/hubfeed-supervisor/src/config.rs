//! Supervisor configuration.

use std::time::Duration;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Timing knobs for the connection supervisor.
///
/// The defaults are the baseline contract: a fixed 5-second retry with no
/// jitter, a 1-second graceful stop and a 10-second connect timeout.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Delay between failed reconnect attempts.
    pub retry_delay: Duration,
    /// Upper bound of a uniform random delay added to each retry.
    /// Zero disables jitter.
    pub retry_jitter: Duration,
    /// How long `stop()` waits for the hub to close gracefully.
    pub stop_grace: Duration,
    /// How long one connect attempt may take before it counts as failed.
    pub connect_timeout: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            retry_delay: Duration::from_secs(5),
            retry_jitter: Duration::ZERO,
            stop_grace: Duration::from_secs(1),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl SupervisorConfig {
    /// Smallest retry delay accepted by [`validated`](Self::validated).
    pub const MIN_RETRY_DELAY: Duration = Duration::from_millis(100);

    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay = delay;
        self
    }

    pub fn with_retry_jitter(mut self, jitter: Duration) -> Self {
        self.retry_jitter = jitter;
        self
    }

    pub fn with_stop_grace(mut self, grace: Duration) -> Self {
        self.stop_grace = grace;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Fixes out-of-range values so the config is safe to use.
    ///
    /// Called by [`ConnectionSupervisor::new`](crate::ConnectionSupervisor::new).
    /// Rules:
    /// - a zero `connect_timeout` falls back to the default;
    /// - `retry_delay` is raised to [`Self::MIN_RETRY_DELAY`];
    /// - `retry_jitter` is capped to `retry_delay`.
    pub fn validated(mut self) -> Self {
        if self.connect_timeout.is_zero() {
            warn!("connect_timeout is zero, using default");
            self.connect_timeout = Self::default().connect_timeout;
        }
        if self.retry_delay < Self::MIN_RETRY_DELAY {
            warn!(
                delay = ?self.retry_delay,
                min = ?Self::MIN_RETRY_DELAY,
                "retry_delay below minimum, clamping"
            );
            self.retry_delay = Self::MIN_RETRY_DELAY;
        }
        if self.retry_jitter > self.retry_delay {
            self.retry_jitter = self.retry_delay;
        }
        self
    }

    /// The delay before the next reconnect attempt, jitter included.
    pub fn next_retry_delay(&self) -> Duration {
        let jitter_nanos = u64::try_from(self.retry_jitter.as_nanos()).unwrap_or(u64::MAX);
        if jitter_nanos == 0 {
            return self.retry_delay;
        }
        let extra = rand::rng().random_range(0..jitter_nanos);
        self.retry_delay + Duration::from_nanos(extra)
    }
}
