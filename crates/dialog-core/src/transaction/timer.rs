//! RFC 3261 timer values used by the tracker
//!
//! - **Timer A/E**: request retransmission, starting at T1 and doubling
//!   (non-INVITE capped at T2), unreliable transports only
//! - **Timer B/F**: 64·T1, after which the client transaction is timed out

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Base timer durations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimerSettings {
    /// RTT estimate (default 500ms)
    pub t1: Duration,
    /// Maximum retransmit interval for non-INVITE requests (default 4s)
    pub t2: Duration,
}

impl Default for TimerSettings {
    fn default() -> Self {
        TimerSettings {
            t1: Duration::from_millis(500),
            t2: Duration::from_secs(4),
        }
    }
}

impl TimerSettings {
    pub fn new(t1: Duration, t2: Duration) -> Self {
        TimerSettings { t1, t2 }
    }

    /// Timer B / Timer F
    pub fn transaction_timeout(&self) -> Duration {
        self.t1 * 64
    }

    /// Next retransmit interval after `current`
    pub fn next_interval(&self, current: Duration, invite: bool) -> Duration {
        let doubled = current * 2;
        if invite {
            doubled
        } else {
            doubled.min(self.t2)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = TimerSettings::default();
        assert_eq!(settings.t1, Duration::from_millis(500));
        assert_eq!(settings.t2, Duration::from_secs(4));
        assert_eq!(settings.transaction_timeout(), Duration::from_secs(32));
    }

    #[test]
    fn test_non_invite_interval_capped_at_t2() {
        let settings = TimerSettings::default();
        let mut interval = settings.t1;
        for _ in 0..6 {
            interval = settings.next_interval(interval, false);
        }
        assert_eq!(interval, settings.t2);
        assert_eq!(settings.next_interval(Duration::from_secs(4), true), Duration::from_secs(8));
    }
}
