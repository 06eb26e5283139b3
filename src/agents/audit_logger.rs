//! Audit trail agent.
//!
//! Receives `log_event` messages from every other agent (see
//! [`AgentContext::audit_log`](crate::agent::AgentContext::audit_log)),
//! categorises them and appends them to the access log. It never audits its
//! own handling, or every entry would produce another.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::AUDIT_LOGGER_ID;
use crate::agent::{parse_action, parse_payload, reply, Agent, AgentContext};
use crate::message::{timestamp, Message};
use crate::storage::{AccessLogEntry, AccessLogFilter, AuditCategory, RecordStore};
use crate::types::{AuditEntryId, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AuditAction {
    LogEvent,
    QueryLogs,
    GetStatistics,
}

#[derive(Debug, Deserialize)]
struct LogEventRequest {
    agent_id: Option<String>,
    action: String,
    #[serde(default)]
    patient_id: Option<String>,
    #[serde(default)]
    details: String,
    #[serde(default, deserialize_with = "timestamp::deserialize_option")]
    timestamp: Option<DateTime<Utc>>,
}

/// Map an audited action to its category.
///
/// `log_event` is open to any sender, so the table also covers actions from
/// departments outside the built-in roster, such as billing.
pub fn categorize(action: &str) -> AuditCategory {
    match action {
        "access_granted"
        | "access_denied"
        | "retrieve_patient"
        | "retrieve_patient_record"
        | "read_patient_basics" => AuditCategory::Access,
        "create_patient" | "update_medical_record" | "write_diagnosis" | "update_appointment"
        | "update_vitals" => AuditCategory::Modification,
        "security_alert_generated"
        | "privacy_filter_applied"
        | "access_control_validation"
        | "ids_anomaly_detected" => AuditCategory::Security,
        "order_lab"
        | "order_lab_test"
        | "cancel_lab_order"
        | "lab_result_received"
        | "order_imaging"
        | "prescribe_medication"
        | "discharge_patient" => AuditCategory::Clinical,
        "patient_registered"
        | "patient_assigned"
        | "doctor_scheduled"
        | "generate_bill"
        | "update_insurance" => AuditCategory::Administrative,
        _ => AuditCategory::Other,
    }
}

#[derive(Debug)]
pub struct AuditLoggerAgent {
    context: AgentContext,
    store: Arc<dyn RecordStore>,
}

impl AuditLoggerAgent {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_id(AUDIT_LOGGER_ID, store)
    }

    pub fn with_id(agent_id: &str, store: Arc<dyn RecordStore>) -> Self {
        Self {
            context: AgentContext::new(
                agent_id,
                "audit_logger",
                ["write_audit_logs", "read_audit_logs"],
            ),
            store,
        }
    }

    async fn log_event(&self, sender: &str, data: &Value) -> Result<Value> {
        if !self.check_permission("write_audit_logs") {
            return Ok(reply::permission_denied("write_audit_logs"));
        }
        let event: LogEventRequest = parse_payload(data)?;
        let entry = AccessLogEntry {
            log_id: AuditEntryId::new(),
            // The sender is authoritative when the payload omits it.
            agent_id: event.agent_id.unwrap_or_else(|| sender.to_string()),
            patient_id: event.patient_id,
            category: categorize(&event.action),
            action: event.action,
            details: event.details,
            timestamp: event.timestamp.unwrap_or_else(Utc::now),
        };
        let entry = self.store.append_access_log(entry).await?;
        tracing::debug!(
            "audit {:?} {} by {}",
            entry.category,
            entry.action,
            entry.agent_id
        );

        Ok(reply::success(json!({
            "log_id": entry.log_id,
            "category": entry.category,
        })))
    }

    async fn query_logs(&self, data: &Value) -> Result<Value> {
        if !self.check_permission("read_audit_logs") {
            return Ok(reply::permission_denied("read_audit_logs"));
        }
        let filter: AccessLogFilter = parse_payload(data)?;
        let logs = self.store.query_access_logs(&filter).await?;

        Ok(reply::success(json!({
            "count": logs.len(),
            "logs": logs,
        })))
    }

    async fn get_statistics(&self) -> Result<Value> {
        if !self.check_permission("read_audit_logs") {
            return Ok(reply::permission_denied("read_audit_logs"));
        }
        let filter = AccessLogFilter {
            limit: Some(usize::MAX),
            ..AccessLogFilter::default()
        };
        let logs = self.store.query_access_logs(&filter).await?;

        let mut by_category: BTreeMap<String, usize> = BTreeMap::new();
        let mut by_agent: BTreeMap<String, usize> = BTreeMap::new();
        for entry in &logs {
            let category = serde_json::to_value(entry.category)?
                .as_str()
                .unwrap_or_default()
                .to_string();
            *by_category.entry(category).or_default() += 1;
            *by_agent.entry(entry.agent_id.clone()).or_default() += 1;
        }

        Ok(reply::success(json!({
            "total": logs.len(),
            "by_category": by_category,
            "by_agent": by_agent,
        })))
    }
}

#[async_trait]
impl Agent for AuditLoggerAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        let Some(action) = parse_action::<AuditAction>(&message.action) else {
            return reply::unsupported(&message.action);
        };
        let outcome = match action {
            AuditAction::LogEvent => self.log_event(&message.from, &message.data).await,
            AuditAction::QueryLogs => self.query_logs(&message.data).await,
            AuditAction::GetStatistics => self.get_statistics().await,
        };
        outcome.unwrap_or_else(|e| reply::error(e.to_string()))
    }
}
