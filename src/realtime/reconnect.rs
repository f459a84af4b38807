use std::time::Duration;

/// Client-side reconnection policy for the realtime channel: a fixed number
/// of attempts with a fixed delay between them. Exhausting the budget leaves
/// the client in a degraded polling-only mode until an explicit reset (app
/// foreground, re-login).
#[derive(Debug, Clone, Copy)]
pub struct ReconnectPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_secs(5),
        }
    }
}

/// Attempt counter paired with a [`ReconnectPolicy`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ReconnectState {
    attempts: u32,
}

impl ReconnectState {
    /// Record a failed connection and return the delay to wait before the
    /// next attempt, or `None` once the budget is exhausted.
    pub fn next_attempt(&mut self, policy: &ReconnectPolicy) -> Option<Duration> {
        if self.attempts >= policy.max_attempts {
            return None;
        }
        self.attempts += 1;
        Some(policy.delay)
    }

    /// Called after a successful connection or an explicit reconnect trigger.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }
}
