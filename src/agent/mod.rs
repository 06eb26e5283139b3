//! Agent capability contract.
//!
//! Any type implementing [`Agent`] can be registered with the orchestrator.
//! Shared behaviour lives in [`AgentContext`], which agents hold by
//! composition: identity, role, permissions, and the queue back-reference used
//! by `send_message` and `audit_log`.
//!
//! The queue reference is a [`QueueHandle`] (weak). It is injected on
//! registration and cleared on removal; the orchestrator remains the only owner
//! of the queue.

mod permissions;
pub mod reply;

#[cfg(test)]
pub(crate) mod testing;

pub use permissions::PermissionSet;

use async_trait::async_trait;
use chrono::Utc;
use futures::FutureExt;
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::message::Message;
use crate::queue::EventQueue;
use crate::types::{Error, Result};

/// Well-known id of the audit trail agent.
pub const AUDIT_LOGGER_ID: &str = "audit_logger";

/// Action the audit trail agent records.
pub const LOG_EVENT_ACTION: &str = "log_event";

// =============================================================================
// Agent Trait
// =============================================================================

/// A participant that receives messages and may emit new ones.
#[async_trait]
pub trait Agent: Send + Sync + fmt::Debug {
    /// Shared identity, permissions and queue association.
    fn context(&self) -> &AgentContext;

    /// Handle one message. Runs on the dispatch task and must return promptly.
    ///
    /// Never fails: unsupported actions and denials are error-shaped values
    /// (see [`reply`]).
    async fn process_message(&self, message: Message) -> Value;

    fn agent_id(&self) -> &str {
        self.context().agent_id()
    }

    fn role(&self) -> &str {
        self.context().role()
    }

    fn permissions(&self) -> &PermissionSet {
        self.context().permissions()
    }

    fn check_permission(&self, action: &str) -> bool {
        self.context().check_permission(action)
    }
}

/// Invoke an agent, turning a handler panic into an error reply.
pub(crate) async fn invoke(agent: &dyn Agent, message: Message) -> Value {
    let action = message.action.clone();
    match AssertUnwindSafe(agent.process_message(message))
        .catch_unwind()
        .await
    {
        Ok(result) => result,
        Err(_) => {
            tracing::error!(
                "Agent {} panicked while handling action={}",
                agent.agent_id(),
                action
            );
            reply::error(format!(
                "agent '{}' failed while handling '{}'",
                agent.agent_id(),
                action
            ))
        }
    }
}

/// Parse an action string into an agent's action enum.
///
/// Action enums derive `Deserialize` with `rename_all = "snake_case"`; `None`
/// means the action is not supported.
pub fn parse_action<A: DeserializeOwned>(action: &str) -> Option<A> {
    serde_json::from_value(Value::String(action.to_string())).ok()
}

/// Decode a message payload into a typed request.
pub fn parse_payload<T: DeserializeOwned>(data: &Value) -> Result<T> {
    serde_json::from_value(data.clone())
        .map_err(|e| Error::validation(format!("invalid payload: {}", e)))
}

// =============================================================================
// Queue Handle
// =============================================================================

/// Non-owning reference to the orchestrator's event queue.
#[derive(Debug, Clone)]
pub struct QueueHandle(Weak<EventQueue>);

impl QueueHandle {
    pub fn new(queue: &Arc<EventQueue>) -> Self {
        Self(Arc::downgrade(queue))
    }

    /// The queue, if its owner is still alive.
    pub fn upgrade(&self) -> Option<Arc<EventQueue>> {
        self.0.upgrade()
    }
}

// =============================================================================
// Agent Context
// =============================================================================

/// Identity, permissions and messaging helpers shared by all agents.
#[derive(Debug)]
pub struct AgentContext {
    agent_id: String,
    role: String,
    permissions: PermissionSet,
    queue: RwLock<Option<QueueHandle>>,
}

impl AgentContext {
    pub fn new<I, S>(agent_id: impl Into<String>, role: impl Into<String>, permissions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            agent_id: agent_id.into(),
            role: role.into(),
            permissions: permissions.into_iter().collect(),
            queue: RwLock::new(None),
        }
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn role(&self) -> &str {
        &self.role
    }

    pub fn permissions(&self) -> &PermissionSet {
        &self.permissions
    }

    pub fn check_permission(&self, action: &str) -> bool {
        self.permissions.check(action)
    }

    /// Associate with a queue. Called by the orchestrator on registration.
    pub fn attach_queue(&self, handle: QueueHandle) {
        *self.queue.write().unwrap_or_else(PoisonError::into_inner) = Some(handle);
    }

    /// Drop the queue association. Called on removal.
    pub fn detach_queue(&self) {
        *self.queue.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_attached(&self) -> bool {
        self.queue().is_ok()
    }

    fn queue(&self) -> Result<Arc<EventQueue>> {
        self.queue
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .and_then(QueueHandle::upgrade)
            .ok_or_else(|| Error::not_attached(self.agent_id.clone()))
    }

    /// Push an already-built message onto the associated queue.
    pub async fn send(&self, message: Message) -> Result<()> {
        let queue = self.queue()?;
        tracing::debug!(
            "{} -> {} action={}",
            message.from,
            message.to,
            message.action
        );
        queue.push(message).await
    }

    /// Send `action` to `target` with `from` set to this agent.
    pub async fn send_message(&self, target: &str, action: &str, data: Value) -> Result<()> {
        self.send(Message::new(self.agent_id.clone(), target, action, data))
            .await
    }

    /// Like `send_message`, asking for the handler result to go to `reply_to`.
    pub async fn send_message_with_reply(
        &self,
        target: &str,
        action: &str,
        data: Value,
        reply_to: &str,
    ) -> Result<()> {
        let message =
            Message::new(self.agent_id.clone(), target, action, data).with_reply_to(reply_to);
        self.send(message).await
    }

    /// Record an event with the audit trail agent.
    pub async fn audit_log(
        &self,
        action: &str,
        subject_id: Option<&str>,
        details: &str,
    ) -> Result<()> {
        self.send(self.audit_message(action, subject_id, details))
            .await
    }

    /// Send a follow-up to a change that is already committed.
    ///
    /// The change cannot be undone, so a failed send is logged and reported
    /// as `false` instead of turning the handler's reply into an error.
    pub async fn send_after_commit(&self, message: Message) -> bool {
        let (to, action) = (message.to.clone(), message.action.clone());
        match self.send(message).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(
                    "{} could not send {} to {} after commit: {}",
                    self.agent_id,
                    action,
                    to,
                    e
                );
                false
            }
        }
    }

    /// `audit_log` for a committed change; see [`send_after_commit`](Self::send_after_commit).
    pub async fn audit_after_commit(
        &self,
        action: &str,
        subject_id: Option<&str>,
        details: &str,
    ) -> bool {
        self.send_after_commit(self.audit_message(action, subject_id, details))
            .await
    }

    fn audit_message(&self, action: &str, subject_id: Option<&str>, details: &str) -> Message {
        let entry = json!({
            "agent_id": self.agent_id,
            "action": action,
            "patient_id": subject_id,
            "details": details,
            "timestamp": Utc::now().to_rfc3339(),
        });
        Message::new(self.agent_id.clone(), AUDIT_LOGGER_ID, LOG_EVENT_ACTION, entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::testing::{PanickingAgent, RecordingAgent};
    use serde::Deserialize;
    use tracing_test::traced_test;

    #[derive(Debug, Deserialize, PartialEq)]
    #[serde(rename_all = "snake_case")]
    enum SampleAction {
        CreatePatient,
        RetrievePatient,
    }

    #[test]
    fn test_check_permission() {
        let context = AgentContext::new("doctor_agent", "doctor", ["read_record"]);
        assert!(context.check_permission("read_record"));
        assert!(!context.check_permission("write_record"));
        assert_eq!(context.role(), "doctor");
    }

    #[test]
    fn test_parse_action() {
        assert_eq!(
            parse_action::<SampleAction>("create_patient"),
            Some(SampleAction::CreatePatient)
        );
        assert_eq!(
            parse_action::<SampleAction>("retrieve_patient"),
            Some(SampleAction::RetrievePatient)
        );
        assert_eq!(parse_action::<SampleAction>("drop_tables"), None);
    }

    #[tokio::test]
    async fn test_send_without_queue_fails() {
        let context = AgentContext::new("receptionist", "receptionist", Vec::<String>::new());
        assert!(!context.is_attached());

        let err = context
            .send_message("ehr_agent", "create_patient", json!({}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotAttached(_)));
    }

    #[tokio::test]
    async fn test_send_message_pushes_to_queue() {
        let queue = Arc::new(EventQueue::new());
        let context = AgentContext::new("receptionist", "receptionist", Vec::<String>::new());
        context.attach_queue(QueueHandle::new(&queue));

        context
            .send_message_with_reply("ehr_agent", "create_patient", json!({"name": "Jane"}), "api")
            .await
            .unwrap();

        let message = queue.pop().await.unwrap();
        assert_eq!(message.from, "receptionist");
        assert_eq!(message.to, "ehr_agent");
        assert_eq!(message.reply_to.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn test_audit_log_targets_audit_logger() {
        let queue = Arc::new(EventQueue::new());
        let context = AgentContext::new("ehr_agent", "ehr_system", Vec::<String>::new());
        context.attach_queue(QueueHandle::new(&queue));

        context
            .audit_log("create_patient", Some("P001"), "record created")
            .await
            .unwrap();

        let message = queue.pop().await.unwrap();
        assert_eq!(message.to, AUDIT_LOGGER_ID);
        assert_eq!(message.action, LOG_EVENT_ACTION);
        assert_eq!(message.data["agent_id"], "ehr_agent");
        assert_eq!(message.data["patient_id"], "P001");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_after_commit_sends_warn_instead_of_failing() {
        let context = AgentContext::new("ehr_agent", "ehr_system", ["write"]);
        assert!(!context.audit_after_commit("create_patient", Some("P001"), "x").await);
        assert!(logs_contain("could not send log_event to audit_logger after commit"));

        let queue = Arc::new(EventQueue::new());
        context.attach_queue(QueueHandle::new(&queue));
        assert!(context.audit_after_commit("create_patient", Some("P001"), "x").await);
        assert_eq!(queue.pop().await.unwrap().data["patient_id"], "P001");
    }

    #[tokio::test]
    async fn test_detach_and_dropped_queue() {
        let queue = Arc::new(EventQueue::new());
        let context = AgentContext::new("lab_agent", "lab", Vec::<String>::new());
        context.attach_queue(QueueHandle::new(&queue));
        assert!(context.is_attached());

        context.detach_queue();
        assert!(!context.is_attached());

        context.attach_queue(QueueHandle::new(&queue));
        drop(queue);
        assert!(!context.is_attached());
    }

    #[tokio::test]
    async fn test_invoke_captures_panic() {
        let agent = PanickingAgent::new("flaky");
        let result = invoke(agent.as_ref(), Message::new("api", "flaky", "boom", json!({}))).await;
        assert_eq!(reply::status_of(&result), Some(reply::ReplyStatus::Error));
    }

    #[tokio::test]
    async fn test_trait_defaults_delegate_to_context() {
        let agent = RecordingAgent::new("ehr_agent");
        assert_eq!(agent.agent_id(), "ehr_agent");
        assert!(agent.check_permission("receive"));
        assert!(!agent.check_permission("write_record"));
    }
}
