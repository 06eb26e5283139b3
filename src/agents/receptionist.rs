//! Front desk: patient intake.

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{json, Value};

use super::{DOCTOR_SCHEDULER_ID, EHR_AGENT_ID, RECEPTIONIST_ID};
use crate::agent::{parse_action, parse_payload, reply, Agent, AgentContext};
use crate::message::Message;
use crate::types::Result;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum ReceptionistAction {
    PatientIntake,
}

#[derive(Debug, Deserialize)]
struct IntakeRequest {
    name: String,
    dob: NaiveDate,
}

/// Registers arriving patients through the EHR agent and books a doctor.
#[derive(Debug)]
pub struct ReceptionistAgent {
    context: AgentContext,
}

impl ReceptionistAgent {
    pub fn new() -> Self {
        Self::with_id(RECEPTIONIST_ID)
    }

    pub fn with_id(agent_id: &str) -> Self {
        Self {
            context: AgentContext::new(
                agent_id,
                "receptionist",
                [
                    "create_patient",
                    "read_patient_basics",
                    "update_appointment",
                    "schedule_doctor",
                ],
            ),
        }
    }

    /// Forwards the intake to the EHR agent (results go to the intake's
    /// `reply_to`, if any), audits it, then requests a doctor slot.
    async fn patient_intake(&self, message: &Message) -> Result<Value> {
        if !self.check_permission("create_patient") {
            return Ok(reply::permission_denied("create_patient"));
        }
        let intake: IntakeRequest = parse_payload(&message.data)?;

        match &message.reply_to {
            Some(reply_to) => {
                self.context
                    .send_message_with_reply(
                        EHR_AGENT_ID,
                        "create_patient",
                        message.data.clone(),
                        reply_to,
                    )
                    .await?
            }
            None => {
                self.context
                    .send_message(EHR_AGENT_ID, "create_patient", message.data.clone())
                    .await?
            }
        }

        self.context
            .audit_after_commit(
                "patient_registered",
                None,
                &format!("Receptionist registered new patient {}.", intake.name),
            )
            .await;

        // The create request is already queued; a failed booking is reported,
        // not turned into an error the caller would retry.
        let scheduling_requested = self.check_permission("schedule_doctor")
            && self
                .context
                .send_after_commit(Message::new(
                    self.context.agent_id(),
                    DOCTOR_SCHEDULER_ID,
                    "schedule_next_available",
                    json!({"patient_name": intake.name, "dob": intake.dob}),
                ))
                .await;

        Ok(reply::success(json!({
            "message": "Patient registered and routed to doctor",
            "patient_name": intake.name,
            "scheduling_requested": scheduling_requested,
        })))
    }
}

impl Default for ReceptionistAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for ReceptionistAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        let Some(action) = parse_action::<ReceptionistAction>(&message.action) else {
            return reply::unsupported(&message.action);
        };
        let outcome = match action {
            ReceptionistAction::PatientIntake => self.patient_intake(&message).await,
        };
        outcome.unwrap_or_else(|e| reply::error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{QueueHandle, AUDIT_LOGGER_ID};
    use crate::queue::EventQueue;
    use crate::types::{OverflowPolicy, QueueConfig};
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn intake() -> Message {
        Message::new(
            "api",
            RECEPTIONIST_ID,
            "patient_intake",
            json!({"name": "Jane Doe", "dob": "1990-01-15"}),
        )
    }

    #[tokio::test]
    async fn test_intake_emits_create_audit_and_schedule() {
        let queue = Arc::new(EventQueue::new());
        let agent = ReceptionistAgent::new();
        agent.context().attach_queue(QueueHandle::new(&queue));

        let result = agent.process_message(intake()).await;
        assert!(reply::is_success(&result), "{}", result);

        let create = queue.pop().await.unwrap();
        assert_eq!(create.to, EHR_AGENT_ID);
        assert_eq!(create.action, "create_patient");
        assert_eq!(create.data["name"], "Jane Doe");

        let audit = queue.pop().await.unwrap();
        assert_eq!(audit.to, AUDIT_LOGGER_ID);
        assert_eq!(audit.data["action"], "patient_registered");

        let schedule = queue.pop().await.unwrap();
        assert_eq!(schedule.to, DOCTOR_SCHEDULER_ID);
        assert_eq!(result["scheduling_requested"], true);
        assert!(queue.pop().await.is_none());
    }

    #[tokio::test]
    async fn test_intake_propagates_reply_to() {
        let queue = Arc::new(EventQueue::new());
        let agent = ReceptionistAgent::new();
        agent.context().attach_queue(QueueHandle::new(&queue));

        agent.process_message(intake().with_reply_to("api")).await;

        assert_eq!(queue.pop().await.unwrap().reply_to.as_deref(), Some("api"));
    }

    #[tokio::test]
    async fn test_intake_rejects_bad_payload() {
        let queue = Arc::new(EventQueue::new());
        let agent = ReceptionistAgent::new();
        agent.context().attach_queue(QueueHandle::new(&queue));

        let mut message = intake();
        message.data = json!({"name": "Jane Doe", "dob": "yesterday"});
        let result = agent.process_message(message).await;

        assert_eq!(result["status"], "error");
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    #[traced_test]
    async fn test_intake_succeeds_once_create_is_queued() {
        let queue = Arc::new(EventQueue::with_config(QueueConfig {
            capacity: Some(1),
            overflow: OverflowPolicy::DropNewest,
            ..QueueConfig::default()
        }));
        let agent = ReceptionistAgent::new();
        agent.context().attach_queue(QueueHandle::new(&queue));

        let result = agent.process_message(intake()).await;

        assert!(reply::is_success(&result), "{}", result);
        assert_eq!(result["scheduling_requested"], false);
        assert_eq!(queue.len().await, 1);
        assert_eq!(queue.pop().await.unwrap().action, "create_patient");
        assert!(logs_contain("could not send schedule_next_available"));
        assert!(logs_contain("could not send log_event"));
    }

    #[tokio::test]
    async fn test_intake_without_queue_is_error_shaped() {
        let result = ReceptionistAgent::new().process_message(intake()).await;
        assert_eq!(result["status"], "error");
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let mut message = intake();
        message.action = "discharge_patient".to_string();
        let result = ReceptionistAgent::new().process_message(message).await;
        assert_eq!(result["message"], "Unknown action: discharge_patient");
    }
}
