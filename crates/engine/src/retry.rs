//! Retry policy for dispatch jobs.
//!
//! A job moves `pending -> sent`, `pending -> pending` (retry) or
//! `pending -> failed` (exhausted). The transition is a pure function of the
//! attempts made so far and the outcome of the current attempt, so the whole
//! policy is testable without storage or network.

use chrono::{DateTime, Duration, Utc};

use flock_common::types::JobStatus;

/// Delivery attempts allowed before a job is terminally failed.
pub const MAX_ATTEMPTS: i32 = 3;

/// Fixed delay before a failed job becomes due again (5 minutes).
pub const RETRY_BACKOFF_SECONDS: i64 = 300;

pub fn retry_backoff() -> Duration {
    Duration::seconds(RETRY_BACKOFF_SECONDS)
}

/// Result of one processing attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Delivered,
    Failed,
}

/// Next state of a pending job after one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Delivered. `attempts` stays where it was.
    Sent,
    /// Failed with attempts left; due again at `scheduled_at`.
    Retry {
        attempts: i32,
        scheduled_at: DateTime<Utc>,
    },
    /// Failed on the last allowed attempt; `scheduled_at` frozen at `now`.
    Exhausted {
        attempts: i32,
        scheduled_at: DateTime<Utc>,
    },
}

impl Transition {
    pub fn status(&self) -> JobStatus {
        match self {
            Transition::Sent => JobStatus::Sent,
            Transition::Retry { .. } => JobStatus::Pending,
            Transition::Exhausted { .. } => JobStatus::Failed,
        }
    }
}

/// Compute the transition for a pending job that has made `current_attempts`
/// failed attempts so far.
pub fn next_state(current_attempts: i32, outcome: Outcome, now: DateTime<Utc>) -> Transition {
    match outcome {
        Outcome::Delivered => Transition::Sent,
        Outcome::Failed => {
            let attempts = current_attempts.saturating_add(1);
            if attempts >= MAX_ATTEMPTS {
                Transition::Exhausted {
                    attempts,
                    scheduled_at: now,
                }
            } else {
                Transition::Retry {
                    attempts,
                    scheduled_at: now + retry_backoff(),
                }
            }
        }
    }
}
