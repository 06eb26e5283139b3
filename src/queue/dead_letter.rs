//! Dead-letter log.
//!
//! Messages the kernel could not deliver are recorded here instead of being
//! dropped silently. The log is bounded; the oldest entries are evicted first,
//! but `total` keeps counting.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::message::Message;

/// Why a message became a dead letter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeadLetterReason {
    /// `to` names no registered or subscribed agent.
    Unroutable,
    /// Failed field-presence validation at dispatch time.
    Invalid,
    /// Dropped by the bounded buffer's overflow policy.
    Overflow,
}

/// An undeliverable message with its cause.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetter {
    pub message: Message,
    pub reason: DeadLetterReason,
    pub detail: String,
    pub dead_lettered_at: DateTime<Utc>,
}

impl DeadLetter {
    pub fn new(message: Message, reason: DeadLetterReason, detail: impl Into<String>) -> Self {
        Self {
            message,
            reason,
            detail: detail.into(),
            dead_lettered_at: Utc::now(),
        }
    }
}

/// Bounded in-memory dead-letter log.
#[derive(Debug)]
pub struct DeadLetterLog {
    entries: VecDeque<DeadLetter>,
    capacity: usize,
    total: u64,
}

impl DeadLetterLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity.min(64)),
            capacity,
            total: 0,
        }
    }

    /// Record a dead letter, evicting the oldest retained entry when full.
    pub fn record(&mut self, letter: DeadLetter) {
        self.total += 1;
        if self.capacity == 0 {
            return;
        }
        if self.entries.len() >= self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(letter);
    }

    /// Retained entries, oldest first.
    pub fn entries(&self) -> Vec<DeadLetter> {
        self.entries.iter().cloned().collect()
    }

    /// Remove and return all retained entries.
    pub fn take(&mut self) -> Vec<DeadLetter> {
        self.entries.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Dead letters recorded since creation, including evicted ones.
    pub fn total(&self) -> u64 {
        self.total
    }
}
