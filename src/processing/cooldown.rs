//! Fixed-interval gate pacing calls to the rate-limited parser.

use std::time::Duration;
use tokio::time::Instant;

/// Cooldowns applied after each parse, keyed by outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CooldownPolicy {
    /// Wait after a successful parse.
    pub after_success: Duration,
    /// Wait after a failed parse.
    pub after_failure: Duration,
}

impl CooldownPolicy {
    /// No waiting at all.
    pub const NONE: Self = Self {
        after_success: Duration::ZERO,
        after_failure: Duration::ZERO,
    };
}

impl Default for CooldownPolicy {
    fn default() -> Self {
        Self {
            after_success: Duration::from_secs(10),
            after_failure: Duration::from_secs(5),
        }
    }
}

/// Remembers when the next parse may start.
///
/// The gate outlives individual ingestion requests, so back-to-back uploads are spaced the
/// same way as files within one upload.
#[derive(Debug)]
pub struct CooldownGate {
    policy: CooldownPolicy,
    ready_at: Option<Instant>,
}

impl CooldownGate {
    /// Create an open gate with the given policy.
    pub fn new(policy: CooldownPolicy) -> Self {
        Self {
            policy,
            ready_at: None,
        }
    }

    /// Wait until the cooldown from the previous parse has elapsed.
    pub async fn ready(&self) {
        if let Some(deadline) = self.ready_at {
            if deadline > Instant::now() {
                tracing::debug!(
                    wait_ms = (deadline - Instant::now()).as_millis() as u64,
                    "Waiting for parser cooldown"
                );
                tokio::time::sleep_until(deadline).await;
            }
        }
    }

    /// Record the outcome of a parse, arming the matching cooldown.
    pub fn record(&mut self, succeeded: bool) {
        let delay = if succeeded {
            self.policy.after_success
        } else {
            self.policy.after_failure
        };
        self.ready_at = Some(Instant::now() + delay);
    }
}
