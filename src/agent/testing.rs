//! Test agents shared by unit tests.

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};

use super::{Agent, AgentContext};
use crate::message::Message;

/// Records every message and answers with a fixed reply.
#[derive(Debug)]
pub(crate) struct RecordingAgent {
    context: AgentContext,
    received: Mutex<Vec<Message>>,
    reply: Value,
}

impl RecordingAgent {
    pub(crate) fn new(agent_id: &str) -> Arc<Self> {
        Self::with_reply(agent_id, json!({"status": "success"}))
    }

    pub(crate) fn with_reply(agent_id: &str, reply: Value) -> Arc<Self> {
        Arc::new(Self {
            context: AgentContext::new(agent_id, "test", ["receive"]),
            received: Mutex::new(Vec::new()),
            reply,
        })
    }

    pub(crate) fn received(&self) -> Vec<Message> {
        self.received.lock().unwrap().clone()
    }
}

#[async_trait]
impl Agent for RecordingAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        self.received.lock().unwrap().push(message);
        self.reply.clone()
    }
}

/// Panics on every message.
#[derive(Debug)]
pub(crate) struct PanickingAgent {
    context: AgentContext,
}

impl PanickingAgent {
    pub(crate) fn new(agent_id: &str) -> Arc<Self> {
        Arc::new(Self {
            context: AgentContext::new(agent_id, "test", Vec::<String>::new()),
        })
    }
}

#[async_trait]
impl Agent for PanickingAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        panic!("cannot handle {}", message.action)
    }
}
