//! Bounded retry queue with exponential backoff.
//!
//! Entries carry the task, how many retries have been spent and the
//! earliest instant the next attempt may run. The delay before retry `n`
//! (0-based) is `base_delay × 2^n`.

use std::time::{Duration, Instant};

use heapless::Deque;
use log::warn;

use crate::config::NotifyConfig;

/// Cap on the backoff exponent so the delay cannot overflow.
const MAX_BACKOFF_SHIFT: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries allowed after the initial failure.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub fn from_config(cfg: &NotifyConfig) -> Self {
        Self {
            max_attempts: cfg.max_attempts,
            base_delay: Duration::from_secs(u64::from(cfg.base_delay_secs)),
        }
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay
            .saturating_mul(1 << attempt.min(MAX_BACKOFF_SHIFT))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetryEntry<T> {
    pub task: T,
    /// Retries already spent.
    pub attempts: u32,
    pub not_before: Instant,
}

pub struct RetryQueue<T, const N: usize> {
    policy: RetryPolicy,
    entries: Deque<RetryEntry<T>, N>,
}

impl<T, const N: usize> RetryQueue<T, N> {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            entries: Deque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Queue a task whose first attempt just failed.
    ///
    /// Returns `false` if the policy allows no retries. A full queue drops
    /// its oldest entry to make room.
    pub fn push(&mut self, task: T, now: Instant) -> bool {
        if self.policy.max_attempts == 0 {
            return false;
        }
        if self.entries.is_full() {
            warn!("RETRY: queue full, dropping oldest entry");
            self.entries.pop_front();
        }
        self.entries
            .push_back(RetryEntry {
                task,
                attempts: 0,
                not_before: now + self.policy.delay_for(0),
            })
            .is_ok()
    }

    /// Take the first entry whose backoff has elapsed, keeping the order of
    /// the rest.
    pub fn pop_due(&mut self, now: Instant) -> Option<RetryEntry<T>> {
        let mut found = None;
        for _ in 0..self.entries.len() {
            let entry = self.entries.pop_front()?;
            if found.is_none() && entry.not_before <= now {
                found = Some(entry);
            } else {
                // Cannot fail: the pop above freed a slot.
                let _ = self.entries.push_back(entry);
            }
        }
        found
    }

    /// Re-queue an entry whose retry failed.
    ///
    /// Returns the task back when the attempt budget is exhausted.
    pub fn retry_later(&mut self, mut entry: RetryEntry<T>, now: Instant) -> Result<(), T> {
        entry.attempts += 1;
        if entry.attempts >= self.policy.max_attempts {
            return Err(entry.task);
        }
        entry.not_before = now + self.policy.delay_for(entry.attempts);
        self.entries.push_back(entry).map_err(|e| e.task)
    }
}
