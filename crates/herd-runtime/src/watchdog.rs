//! Stall watchdog.
//!
//! A single-shot deadline that the generation driver re-arms after every
//! forwarded delta. On expiry the process is nudged; after `max_nudges`
//! consecutive nudges without new output the generation is escalated to
//! cancellation.

use herd_core::{DEFAULT_MAX_STALL_NUDGES, DEFAULT_STALL_TIMEOUT_SECS, Settings};
use std::time::Duration;
use tokio::time::Instant;

/// Timeout and nudge cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StallPolicy {
    pub timeout: Duration,
    pub max_nudges: u32,
}

impl Default for StallPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_STALL_TIMEOUT_SECS),
            max_nudges: DEFAULT_MAX_STALL_NUDGES,
        }
    }
}

impl StallPolicy {
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            timeout: settings.stall_timeout(),
            max_nudges: settings.max_stall_nudges,
        }
    }
}

/// What to do about an expired deadline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StallAction {
    /// Write a newline to the process. `attempt` counts from 1.
    Nudge { attempt: u32 },
    /// Give up on the process.
    Escalate,
}

#[derive(Debug)]
pub struct StallWatchdog {
    policy: StallPolicy,
    deadline: Option<Instant>,
    nudges: u32,
}

impl StallWatchdog {
    pub const fn new(policy: StallPolicy) -> Self {
        Self {
            policy,
            deadline: None,
            nudges: 0,
        }
    }

    /// Start (or restart) the timer after fresh output.
    pub fn arm(&mut self) {
        self.deadline = Some(Instant::now() + self.policy.timeout);
        self.nudges = 0;
    }

    pub const fn disarm(&mut self) {
        self.deadline = None;
    }

    pub const fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub const fn nudges(&self) -> u32 {
        self.nudges
    }

    /// Handle an expired deadline.
    ///
    /// A nudge re-arms the timer without resetting the nudge count, so
    /// only real output resets it.
    pub fn on_expiry(&mut self) -> StallAction {
        if self.nudges < self.policy.max_nudges {
            self.nudges += 1;
            self.deadline = Some(Instant::now() + self.policy.timeout);
            StallAction::Nudge {
                attempt: self.nudges,
            }
        } else {
            self.deadline = None;
            StallAction::Escalate
        }
    }
}

/// Sleep until `deadline`, or forever when there is none.
pub async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
