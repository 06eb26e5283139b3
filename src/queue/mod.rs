//! Event queue: the shared FIFO buffer and subscriber table.
//!
//! All agent traffic flows through one `EventQueue`, owned by the orchestrator.
//! Two paths exist:
//!   - **Buffered**: `push` appends to the tail, the dispatch loop drains the head.
//!   - **Direct**: `route_if_possible` hands a message straight to a subscribed
//!     agent, bypassing the buffer.
//!
//! Ordering caveat: the buffer is strictly FIFO, but a message delivered
//! directly through `enqueue` skips everything already buffered. Direct
//! delivery is a low-latency path for addressed traffic and may overtake
//! earlier queued messages.
//!
//! The buffer and the subscriber table share a single `RwLock`. The lock is
//! never held while an agent runs, so handlers may push re-entrantly.

mod dead_letter;

pub use dead_letter::{DeadLetter, DeadLetterLog, DeadLetterReason};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify, RwLock};

use crate::agent::{invoke, Agent};
use crate::message::Message;
use crate::types::{Error, OverflowPolicy, QueueConfig, Result};

/// Result of `route_if_possible`.
#[derive(Debug)]
pub enum RouteOutcome {
    /// The subscriber processed the message; its result is attached.
    Delivered(Value),
    /// No live subscriber. Ownership returns to the caller, which must buffer
    /// or dead-letter the message.
    NotDelivered(Message),
}

/// Result of `enqueue`.
#[derive(Debug, Clone, PartialEq)]
pub enum Delivery {
    /// Delivered out-of-band to a subscriber.
    Delivered(Value),
    /// Appended to the buffer for the dispatch loop.
    Queued,
}

/// Counters describing queue usage.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    /// Messages admitted to the buffer.
    pub pushed: u64,
    pub popped: u64,
    /// Messages `enqueue` handed straight to a subscriber, never buffered.
    pub direct_delivered: u64,
    pub overflow_dropped: u64,
    pub dead_lettered: u64,
    pub pending: usize,
    pub subscribers: usize,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<Message>,
    subscribers: HashMap<String, Arc<dyn Agent>>,
    stats: QueueStats,
}

/// What a push did to the buffer.
enum Admission {
    Accepted,
    Evicted(Message),
    Rejected(Message),
}

/// In-memory event queue with a direct-delivery subscriber table.
#[derive(Debug)]
pub struct EventQueue {
    state: RwLock<QueueState>,
    dead_letters: Mutex<DeadLetterLog>,
    wakeup: Notify,
    config: QueueConfig,
}

impl EventQueue {
    /// Create a queue with default configuration.
    pub fn new() -> Self {
        Self::with_config(QueueConfig::default())
    }

    pub fn with_config(config: QueueConfig) -> Self {
        Self {
            state: RwLock::new(QueueState::default()),
            dead_letters: Mutex::new(DeadLetterLog::new(config.dead_letter_capacity)),
            wakeup: Notify::new(),
            config,
        }
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    // =========================================================================
    // Buffer
    // =========================================================================

    /// Append a message to the tail and wake the consumer. Never blocks on
    /// capacity: a full buffer applies the overflow policy instead.
    pub async fn push(&self, message: Message) -> Result<()> {
        let admission = {
            let mut state = self.state.write().await;
            let full = self
                .config
                .capacity
                .is_some_and(|capacity| state.pending.len() >= capacity);

            let admission = if !full {
                state.pending.push_back(message);
                Admission::Accepted
            } else {
                match self.config.overflow {
                    OverflowPolicy::DropNewest => Admission::Rejected(message),
                    OverflowPolicy::DropOldest => match state.pending.pop_front() {
                        Some(evicted) => {
                            state.pending.push_back(message);
                            Admission::Evicted(evicted)
                        }
                        None => Admission::Rejected(message),
                    },
                }
            };

            match &admission {
                Admission::Accepted => state.stats.pushed += 1,
                Admission::Evicted(_) => {
                    state.stats.pushed += 1;
                    state.stats.overflow_dropped += 1;
                }
                Admission::Rejected(_) => state.stats.overflow_dropped += 1,
            }
            admission
        };

        match admission {
            Admission::Accepted => {
                self.wakeup.notify_one();
                Ok(())
            }
            Admission::Evicted(evicted) => {
                tracing::warn!(
                    "Queue full, evicted oldest message id={} to={}",
                    evicted.id,
                    evicted.to
                );
                self.dead_letter(evicted, DeadLetterReason::Overflow, "evicted by drop_oldest")
                    .await;
                self.wakeup.notify_one();
                Ok(())
            }
            Admission::Rejected(rejected) => {
                let capacity = self.config.capacity.unwrap_or_default();
                tracing::warn!(
                    "Queue full, rejected message id={} to={}",
                    rejected.id,
                    rejected.to
                );
                self.dead_letter(rejected, DeadLetterReason::Overflow, "rejected by drop_newest")
                    .await;
                Err(Error::queue_full(format!("capacity {} reached", capacity)))
            }
        }
    }

    /// Remove and return the head message. `None` when empty.
    pub async fn pop(&self) -> Option<Message> {
        let mut state = self.state.write().await;
        let message = state.pending.pop_front()?;
        state.stats.popped += 1;
        Some(message)
    }

    /// Return a copy of the head message without removing it.
    pub async fn peek(&self) -> Option<Message> {
        self.state.read().await.pending.front().cloned()
    }

    pub async fn len(&self) -> usize {
        self.state.read().await.pending.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.state.read().await.pending.is_empty()
    }

    /// Resolves after the next `push` (or immediately if a push happened since
    /// the last wake-up).
    pub async fn notified(&self) {
        self.wakeup.notified().await;
    }

    // =========================================================================
    // Direct Delivery
    // =========================================================================

    /// Deliver `message` synchronously if its recipient is subscribed.
    pub async fn route_if_possible(&self, message: Message) -> RouteOutcome {
        let recipient = self.state.read().await.subscribers.get(&message.to).cloned();

        let Some(agent) = recipient else {
            return RouteOutcome::NotDelivered(message);
        };

        tracing::debug!(
            "Direct delivery action={} from={} to={}",
            message.action,
            message.from,
            message.to
        );
        RouteOutcome::Delivered(invoke(agent.as_ref(), message).await)
    }

    /// Route-first submission: deliver directly when possible, otherwise buffer.
    pub async fn enqueue(&self, message: Message) -> Result<Delivery> {
        match self.route_if_possible(message).await {
            RouteOutcome::Delivered(result) => {
                self.state.write().await.stats.direct_delivered += 1;
                Ok(Delivery::Delivered(result))
            }
            RouteOutcome::NotDelivered(message) => {
                self.push(message).await?;
                Ok(Delivery::Queued)
            }
        }
    }

    // =========================================================================
    // Subscribers
    // =========================================================================

    /// Add or replace a subscriber. Only the orchestrator's registry calls
    /// this, keeping the two tables in step.
    pub(crate) async fn subscribe(&self, agent_id: impl Into<String>, agent: Arc<dyn Agent>) {
        let agent_id = agent_id.into();
        let mut state = self.state.write().await;
        state.subscribers.insert(agent_id.clone(), agent);
        tracing::debug!("Subscribed {}", agent_id);
    }

    /// Remove a subscriber. Unknown ids are ignored.
    pub(crate) async fn unsubscribe(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        let removed = self.state.write().await.subscribers.remove(agent_id);
        if removed.is_some() {
            tracing::debug!("Unsubscribed {}", agent_id);
        }
        removed
    }

    pub async fn is_subscribed(&self, agent_id: &str) -> bool {
        self.state.read().await.subscribers.contains_key(agent_id)
    }

    /// Subscribed agent ids, sorted.
    pub async fn subscriber_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.state.read().await.subscribers.keys().cloned().collect();
        ids.sort();
        ids
    }

    // =========================================================================
    // Dead Letters
    // =========================================================================

    /// Record an undeliverable message.
    pub async fn dead_letter(
        &self,
        message: Message,
        reason: DeadLetterReason,
        detail: impl Into<String>,
    ) {
        let letter = DeadLetter::new(message, reason, detail);
        self.dead_letters.lock().await.record(letter);
    }

    /// Retained dead letters, oldest first.
    pub async fn dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.entries()
    }

    /// Remove and return retained dead letters.
    pub async fn take_dead_letters(&self) -> Vec<DeadLetter> {
        self.dead_letters.lock().await.take()
    }

    // =========================================================================
    // Statistics
    // =========================================================================

    /// Get current queue statistics.
    pub async fn stats(&self) -> QueueStats {
        let mut stats = {
            let state = self.state.read().await;
            let mut stats = state.stats.clone();
            stats.pending = state.pending.len();
            stats.subscribers = state.subscribers.len();
            stats
        };
        stats.dead_lettered = self.dead_letters.lock().await.total();
        stats
    }

    /// Reset traffic counters. Pending messages and subscribers are untouched.
    pub async fn reset_stats(&self) {
        self.state.write().await.stats = QueueStats::default();
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
