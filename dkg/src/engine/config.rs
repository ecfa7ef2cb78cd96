use apm_cryptography::commitment::Address;
use std::time::Duration;

/// Bounded exponential backoff used while polling the roster.
#[derive(Clone, Copy, Debug)]
pub struct Backoff {
    /// Delay before the first retry.
    pub initial: Duration,

    /// Upper bound on the delay between retries.
    pub max: Duration,

    /// Number of polls before giving up.
    pub attempts: u32,
}

impl Backoff {
    /// Returns the delay to wait after `attempt` (0-based) failed.
    pub fn delay(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.initial.saturating_mul(factor).min(self.max)
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            initial: Duration::from_secs(1),
            max: Duration::from_secs(30),
            attempts: 10,
        }
    }
}

/// Configuration for the [Engine](super::Engine).
#[derive(Clone, Debug)]
pub struct Config {
    /// Identifier of the session (the market id).
    pub session: u64,

    /// Address of the local member.
    pub address: Address,

    /// Number of shares required to reconstruct the joint secret.
    pub threshold: u32,

    /// Backoff applied while waiting for enough members to register.
    pub backoff: Backoff,

    /// Maximum time spent in any protocol phase.
    pub phase_timeout: Duration,

    /// Maximum time spent establishing connections.
    pub connect_timeout: Duration,

    /// Capacity of the mailbox.
    pub mailbox_size: usize,
}

impl Config {
    /// Returns a configuration with default timeouts.
    pub fn new(session: u64, address: Address, threshold: u32) -> Self {
        Self {
            session,
            address,
            threshold,
            backoff: Backoff::default(),
            phase_timeout: Duration::from_secs(60),
            connect_timeout: Duration::from_secs(10),
            mailbox_size: 64,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_doubles_until_max() {
        let backoff = Backoff {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(1_000),
            attempts: 8,
        };
        let delays = (0..6).map(|a| backoff.delay(a)).collect::<Vec<_>>();
        assert_eq!(
            delays,
            [100, 200, 400, 800, 1_000, 1_000].map(Duration::from_millis)
        );
        assert_eq!(backoff.delay(64), backoff.max);
    }
}
