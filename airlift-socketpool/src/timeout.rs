//! Socket timeouts and poll-loop deadlines.
//!
//! Blocking socket calls are bounded poll loops.  A [`Timeout`] says how long
//! a loop may run, a [`Deadline`] tracks one loop's budget against the
//! platform's monotonic clock, and [`PollConfig`] holds the pacing between
//! polls.

/// Raw timeout value meaning "never give up".
pub const BLOCK_FOREVER: u32 = u32::MAX;

/// How long a blocking socket call may wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Fail with would-block instead of waiting.
    NonBlocking,
    /// Give up after this many milliseconds.
    Millis(u32),
    /// Wait until the operation completes or the user interrupts.
    Forever,
}

impl Timeout {
    /// Decode the raw form: 0 is non-blocking, [`BLOCK_FOREVER`] blocks forever.
    pub fn from_millis(ms: u32) -> Self {
        match ms {
            0 => Timeout::NonBlocking,
            BLOCK_FOREVER => Timeout::Forever,
            ms => Timeout::Millis(ms),
        }
    }

    pub fn as_millis(self) -> u32 {
        match self {
            Timeout::NonBlocking => 0,
            Timeout::Millis(ms) => ms,
            Timeout::Forever => BLOCK_FOREVER,
        }
    }

    /// Time the co-processor gets to answer one command on behalf of a
    /// socket with this timeout.
    pub fn transaction_ms(self, default_ms: u32) -> u32 {
        match self {
            Timeout::NonBlocking => default_ms,
            Timeout::Millis(ms) => ms,
            Timeout::Forever => BLOCK_FOREVER,
        }
    }
}

/// Budget of one poll loop, captured at loop entry.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start_ms: u64,
    timeout: Timeout,
}

impl Deadline {
    pub fn start(now_ms: u64, timeout: Timeout) -> Self {
        Self {
            start_ms: now_ms,
            timeout,
        }
    }

    /// A forever deadline never expires; a non-blocking one always has.
    pub fn expired(&self, now_ms: u64) -> bool {
        match self.timeout {
            Timeout::NonBlocking => true,
            Timeout::Millis(ms) => now_ms.saturating_sub(self.start_ms) >= ms as u64,
            Timeout::Forever => false,
        }
    }
}

/// Pacing of socket poll loops.
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Sleep between polls so the co-processor can make progress.
    pub interval_ms: u32,
    /// Timeout given to newly allocated sockets.
    pub default_timeout: Timeout,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval_ms: 50,
            default_timeout: Timeout::Forever,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_sentinels() {
        assert_eq!(Timeout::from_millis(0), Timeout::NonBlocking);
        assert_eq!(Timeout::from_millis(u32::MAX), Timeout::Forever);
        assert_eq!(Timeout::from_millis(3000), Timeout::Millis(3000));
        assert_eq!(Timeout::Forever.as_millis(), BLOCK_FOREVER);
    }

    #[test]
    fn deadline_expiry() {
        let d = Deadline::start(100, Timeout::Millis(50));
        assert!(!d.expired(149));
        assert!(d.expired(150));

        assert!(!Deadline::start(0, Timeout::Forever).expired(u64::MAX));
        assert!(Deadline::start(0, Timeout::NonBlocking).expired(0));
    }

    #[test]
    fn non_blocking_commands_still_get_the_link_timeout() {
        assert_eq!(Timeout::NonBlocking.transaction_ms(1000), 1000);
        assert_eq!(Timeout::Millis(20).transaction_ms(1000), 20);
    }
}
