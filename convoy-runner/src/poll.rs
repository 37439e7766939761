//! Poll policies
//!
//! A policy yields the sequence of waits used while awaiting a job's
//! completion: first an initial delay after start (so a freshly launched
//! container is not queried immediately), then the interval between polls.

use std::time::Duration;

/// How long to wait before each completion poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollPolicy {
    /// Flat delay, then a constant interval
    Fixed {
        initial_delay: Duration,
        interval: Duration,
    },
    /// Flat delay, then intervals doubling up to `max_interval`
    Exponential {
        initial_delay: Duration,
        initial_interval: Duration,
        max_interval: Duration,
    },
}

impl PollPolicy {
    pub fn fixed(initial_delay: Duration, interval: Duration) -> Self {
        PollPolicy::Fixed {
            initial_delay,
            interval,
        }
    }

    pub fn exponential(
        initial_delay: Duration,
        initial_interval: Duration,
        max_interval: Duration,
    ) -> Self {
        PollPolicy::Exponential {
            initial_delay,
            initial_interval,
            max_interval,
        }
    }

    pub fn initial_delay(&self) -> Duration {
        match self {
            PollPolicy::Fixed { initial_delay, .. } => *initial_delay,
            PollPolicy::Exponential { initial_delay, .. } => *initial_delay,
        }
    }

    /// Infinite sequence of waits, starting with the initial delay
    pub fn delays(&self) -> PollDelays {
        let interval = match self {
            PollPolicy::Fixed { interval, .. } => *interval,
            PollPolicy::Exponential {
                initial_interval, ..
            } => *initial_interval,
        };

        PollDelays {
            policy: self.clone(),
            started: false,
            interval,
        }
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy::fixed(Duration::from_secs(1), Duration::from_secs(1))
    }
}

/// Iterator over the waits of a [`PollPolicy`]; never ends
#[derive(Debug, Clone)]
pub struct PollDelays {
    policy: PollPolicy,
    started: bool,
    interval: Duration,
}

impl Iterator for PollDelays {
    type Item = Duration;

    fn next(&mut self) -> Option<Duration> {
        if !self.started {
            self.started = true;
            return Some(self.policy.initial_delay());
        }

        let current = self.interval;
        if let PollPolicy::Exponential { max_interval, .. } = &self.policy {
            self.interval = (self.interval * 2).min(*max_interval);
        }
        Some(current)
    }
}
