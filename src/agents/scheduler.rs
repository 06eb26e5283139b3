//! Doctor scheduling.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use serde::Deserialize;
use serde_json::{json, Value};

use super::DOCTOR_SCHEDULER_ID;
use crate::agent::{parse_action, reply, Agent, AgentContext};
use crate::message::Message;
use crate::types::Result;

/// Lead time between a scheduling request and the assigned slot.
const SLOT_LEAD_MINUTES: i64 = 15;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum SchedulerAction {
    ScheduleNextAvailable,
}

/// Assigns the next available doctor slot.
#[derive(Debug)]
pub struct DoctorSchedulerAgent {
    context: AgentContext,
}

impl DoctorSchedulerAgent {
    pub fn new() -> Self {
        Self::with_id(DOCTOR_SCHEDULER_ID)
    }

    pub fn with_id(agent_id: &str) -> Self {
        Self {
            context: AgentContext::new(agent_id, "scheduler", ["schedule_doctor"]),
        }
    }

    async fn schedule_next_available(&self, data: &Value) -> Result<Value> {
        if !self.check_permission("schedule_doctor") {
            return Ok(reply::permission_denied("schedule_doctor"));
        }
        let appointment_time = Utc::now() + Duration::minutes(SLOT_LEAD_MINUTES);
        tracing::info!("scheduled doctor appointment at {}", appointment_time);

        // Requests carry either a registered id or just the intake name.
        let mut fields = json!({"appointment_time": appointment_time.to_rfc3339()});
        for key in ["patient_id", "patient_name"] {
            if let Some(value) = data.get(key) {
                fields[key] = value.clone();
            }
        }
        Ok(reply::success(fields))
    }
}

impl Default for DoctorSchedulerAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for DoctorSchedulerAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        let Some(action) = parse_action::<SchedulerAction>(&message.action) else {
            return reply::unsupported(&message.action);
        };
        let outcome = match action {
            SchedulerAction::ScheduleNextAvailable => {
                self.schedule_next_available(&message.data).await
            }
        };
        outcome.unwrap_or_else(|e| reply::error(e.to_string()))
    }
}
