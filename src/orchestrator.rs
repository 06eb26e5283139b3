//! Orchestrator - agent registry and dispatch loop.
//!
//! The Orchestrator:
//!   - Owns the event queue (agents only get weak handles)
//!   - Keeps the agent registry in sync with the queue's subscriber table
//!   - Drains the queue one message at a time and dispatches it
//!   - Synthesizes `response` messages for `reply_to`
//!   - Dead-letters messages it cannot route
//!
//! Dispatch is sequential on a single task: a slow handler delays every
//! message behind it. Reply chains are not policed; a handler that replies to a
//! `reply_to` which replies again can generate traffic indefinitely.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::agent::{invoke, Agent, QueueHandle};
use crate::message::Message;
use crate::queue::{DeadLetterReason, Delivery, EventQueue, RouteOutcome};
use crate::types::{Config, Error, OrchestratorConfig, Result};
use crate::validation::validate_non_empty;

/// What happened to a dispatched message.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// An agent processed the message and returned this result.
    Delivered(Value),
    /// The message was recorded as a dead letter.
    DeadLettered(DeadLetterReason),
}

impl DispatchOutcome {
    pub fn result(&self) -> Option<&Value> {
        match self {
            DispatchOutcome::Delivered(result) => Some(result),
            DispatchOutcome::DeadLettered(_) => None,
        }
    }
}

/// Central coordinator: owns the queue and the agent registry.
#[derive(Debug)]
pub struct Orchestrator {
    queue: Arc<EventQueue>,
    agents: RwLock<HashMap<String, Arc<dyn Agent>>>,
    config: OrchestratorConfig,
    cancel: CancellationToken,
}

impl Orchestrator {
    /// Create an orchestrator with default configuration.
    pub fn new() -> Self {
        Self::with_config(&Config::default())
    }

    pub fn with_config(config: &Config) -> Self {
        Self {
            queue: Arc::new(EventQueue::with_config(config.queue.clone())),
            agents: RwLock::new(HashMap::new()),
            config: config.orchestrator.clone(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }

    // =========================================================================
    // Agent Registry
    // =========================================================================

    /// Register an agent under its own id.
    ///
    /// Adds it to the registry and the queue's subscriber table, then injects
    /// the queue handle. Fails with `DuplicateAgent` if the id is taken.
    pub async fn register_agent(&self, agent: Arc<dyn Agent>) -> Result<()> {
        let agent_id = agent.agent_id().to_string();
        validate_non_empty(&agent_id, "agent_id")?;

        let mut agents = self.agents.write().await;
        if agents.contains_key(&agent_id) {
            return Err(Error::duplicate_agent(agent_id));
        }

        self.queue.subscribe(agent_id.clone(), agent.clone()).await;
        agent.context().attach_queue(QueueHandle::new(&self.queue));
        tracing::info!("Registered agent {} (role={})", agent_id, agent.role());
        agents.insert(agent_id, agent);

        Ok(())
    }

    /// Remove an agent from the registry and the subscriber table.
    ///
    /// Returns the removed agent, or `None` (no-op) when the id is unknown.
    pub async fn unregister_agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        let mut agents = self.agents.write().await;
        let agent = agents.remove(agent_id)?;

        self.queue.unsubscribe(agent_id).await;
        agent.context().detach_queue();
        tracing::info!("Unregistered agent {}", agent_id);

        Some(agent)
    }

    pub async fn get_agent(&self, agent_id: &str) -> Option<Arc<dyn Agent>> {
        self.agents.read().await.get(agent_id).cloned()
    }

    /// Registered agent ids, sorted.
    pub async fn agent_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.agents.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// External entry point: validate, then deliver directly or buffer.
    pub async fn submit(&self, message: Message) -> Result<Delivery> {
        message.validate()?;
        self.queue.enqueue(message).await
    }

    /// Dispatch a single message to its recipient.
    ///
    /// Never fails: invalid and unroutable messages become dead letters.
    pub async fn dispatch_one(&self, message: Message) -> DispatchOutcome {
        if let Err(e) = message.validate() {
            tracing::warn!("Dropping invalid message id={}: {}", message.id, e);
            self.queue
                .dead_letter(message, DeadLetterReason::Invalid, e.to_string())
                .await;
            return DispatchOutcome::DeadLettered(DeadLetterReason::Invalid);
        }

        let message = match self.queue.route_if_possible(message).await {
            RouteOutcome::Delivered(result) => return DispatchOutcome::Delivered(result),
            RouteOutcome::NotDelivered(message) => message,
        };

        let agent = self.agents.read().await.get(&message.to).cloned();
        match agent {
            Some(agent) => DispatchOutcome::Delivered(invoke(agent.as_ref(), message).await),
            None => {
                tracing::warn!(
                    "No agent registered under id '{}', dead-lettering message id={} action={}",
                    message.to,
                    message.id,
                    message.action
                );
                let detail = format!("no agent '{}'", message.to);
                self.queue
                    .dead_letter(message, DeadLetterReason::Unroutable, detail)
                    .await;
                DispatchOutcome::DeadLettered(DeadLetterReason::Unroutable)
            }
        }
    }

    /// One loop iteration: pop the head, dispatch it, route any reply.
    ///
    /// Returns `None` when the queue was empty.
    pub async fn run_once(&self) -> Option<DispatchOutcome> {
        let message = self.queue.pop().await?;
        tracing::debug!(
            "Dispatching {} from {} -> {}",
            message.action,
            message.from,
            message.to
        );

        let origin = message.reply_to.is_some().then(|| message.clone());
        let outcome = self.dispatch_one(message).await;

        let response = origin
            .zip(outcome.result())
            .and_then(|(origin, result)| origin.reply(result.clone()));
        if let Some(response) = response {
            let target = response.to.clone();
            match self.queue.enqueue(response).await {
                Ok(Delivery::Delivered(_)) => tracing::debug!("Reply delivered to {}", target),
                Ok(Delivery::Queued) => tracing::debug!("Reply queued for {}", target),
                Err(e) => tracing::warn!("Reply to {} not routed: {}", target, e),
            }
        }

        Some(outcome)
    }

    /// Dispatch until the queue is empty. Returns the number of messages handled.
    ///
    /// Does not terminate while agents keep producing (e.g. reply cycles).
    pub async fn run_until_idle(&self) -> usize {
        let mut handled = 0;
        while self.run_once().await.is_some() {
            handled += 1;
        }
        handled
    }

    // =========================================================================
    // Event Loop
    // =========================================================================

    /// Run the dispatch loop until `stop` is called.
    ///
    /// Waits for a push (or at most `idle_wait`) when the queue is empty. The
    /// stop signal is checked before each dispatch and during each wait; a
    /// dispatch in progress always completes.
    pub async fn run(&self) {
        tracing::info!(
            "Orchestrator loop started (idle_wait={:?})",
            self.config.idle_wait
        );

        loop {
            if self.cancel.is_cancelled() {
                break;
            }
            if self.run_once().await.is_some() {
                continue;
            }

            tokio::select! {
                _ = self.cancel.cancelled() => break,
                _ = self.queue.notified() => {}
                _ = tokio::time::sleep(self.config.idle_wait) => {}
            }
        }

        tracing::info!("Orchestrator loop stopped");
    }

    /// Spawn the dispatch loop on the tokio runtime.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        let orchestrator = Arc::clone(self);
        tokio::spawn(async move { orchestrator.run().await })
    }

    /// Signal the loop to stop. Terminal: a stopped orchestrator stays stopped.
    pub fn stop(&self) {
        if !self.cancel.is_cancelled() {
            tracing::info!("Orchestrator stop requested");
        }
        self.cancel.cancel();
    }

    pub fn is_stopped(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Token observed by the loop, for wiring into external shutdown.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.cancel.clone()
    }
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Tests
// =============================================================================
