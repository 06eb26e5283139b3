//! Role-based access decisions for patient data.
//!
//! Callers are mapped to a role by agent id. Each role carries the actions it
//! may perform and the record fields it may read and write; the EHR system
//! role is unrestricted. Denials are kept for security review and audited.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};

use super::{ACCESS_CONTROL_ID, DOCTOR_AGENT_ID, EHR_AGENT_ID, LAB_AGENT_ID, RECEPTIONIST_ID};
use crate::agent::{parse_action, parse_payload, reply, Agent, AgentContext};
use crate::message::Message;
use crate::types::{PatientId, Result};

/// Denials retained for `get_denied_attempts`, oldest dropped first.
const MAX_DENIALS: usize = 1_000;

const DEFAULT_WINDOW_MINUTES: i64 = 60;

const VALIDATE: &str = "validate_all_requests";
const REVIEW: &str = "audit_all_access_decisions";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum AccessAction {
    ValidateAccess,
    CheckWritePermission,
    GetDeniedAttempts,
}

/// Role a requesting agent acts under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Receptionist,
    Doctor,
    LabTech,
    Billing,
    EhrSystem,
}

struct Grants {
    actions: &'static [&'static str],
    read_fields: &'static [&'static str],
    write_fields: &'static [&'static str],
}

const RECEPTIONIST_GRANTS: Grants = Grants {
    actions: &[
        "create_patient",
        "update_appointment",
        "read_patient_basics",
        "schedule_doctor",
        "patient_intake",
    ],
    read_fields: &["patient_id", "name", "dob", "contact", "appointment_time"],
    write_fields: &["contact", "appointment_time"],
};

const DOCTOR_GRANTS: Grants = Grants {
    actions: &[
        "retrieve_patient",
        "write_diagnosis",
        "order_lab",
        "order_imaging",
        "prescribe_medication",
        "update_medical_record",
        "discharge_patient",
    ],
    read_fields: &[
        "patient_id",
        "name",
        "dob",
        "contact",
        "diagnosis",
        "medications",
        "lab_results",
        "imaging_results",
        "notes",
        "psychiatric_history",
        "substance_abuse_history",
        "allergies",
        "medical_history",
    ],
    write_fields: &["diagnosis", "medications", "notes", "treatment_plan", "prescription"],
};

const LAB_TECH_GRANTS: Grants = Grants {
    actions: &["retrieve_test_order", "submit_lab_results", "update_test_status"],
    read_fields: &["patient_id", "name", "dob", "test_order"],
    write_fields: &["lab_results"],
};

const BILLING_GRANTS: Grants = Grants {
    actions: &[
        "generate_bill",
        "update_insurance",
        "process_payment",
        "retrieve_billing_info",
    ],
    read_fields: &[
        "patient_id",
        "name",
        "dob",
        "ssn",
        "insurance_details",
        "charges",
        "address",
        "account_number",
    ],
    write_fields: &["charges", "insurance_status", "payment_status"],
};

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Receptionist => "receptionist",
            Role::Doctor => "doctor",
            Role::LabTech => "lab_tech",
            Role::Billing => "billing",
            Role::EhrSystem => "ehr_system",
        }
    }

    /// Role for an agent id. A numeric instance suffix (`doctor_agent_2`)
    /// maps to the same role as the base id.
    pub fn for_agent(agent_id: &str) -> Option<Role> {
        let base = match agent_id.rsplit_once('_') {
            Some((base, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => base,
            _ => agent_id,
        };
        match base {
            RECEPTIONIST_ID | "receptionist_agent" => Some(Role::Receptionist),
            DOCTOR_AGENT_ID => Some(Role::Doctor),
            LAB_AGENT_ID => Some(Role::LabTech),
            "billing_agent" => Some(Role::Billing),
            EHR_AGENT_ID => Some(Role::EhrSystem),
            _ => None,
        }
    }

    /// `None` means unrestricted.
    fn grants(self) -> Option<&'static Grants> {
        match self {
            Role::Receptionist => Some(&RECEPTIONIST_GRANTS),
            Role::Doctor => Some(&DOCTOR_GRANTS),
            Role::LabTech => Some(&LAB_TECH_GRANTS),
            Role::Billing => Some(&BILLING_GRANTS),
            Role::EhrSystem => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct AccessRequest {
    requested_action: String,
    #[serde(default)]
    fields: Vec<String>,
    #[serde(default)]
    patient_id: Option<PatientId>,
}

#[derive(Debug, Deserialize)]
struct WriteCheck {
    field: String,
}

#[derive(Debug, Default, Deserialize)]
struct DenialWindow {
    #[serde(default)]
    time_window_minutes: Option<i64>,
}

/// A refused access request.
#[derive(Debug, Clone, Serialize)]
pub struct Denial {
    pub timestamp: DateTime<Utc>,
    pub agent: String,
    pub action: String,
    pub patient_id: Option<PatientId>,
    pub reason: String,
}

/// Validates requests against the role matrix and remembers denials.
#[derive(Debug)]
pub struct AccessControlAgent {
    context: AgentContext,
    denials: Mutex<VecDeque<Denial>>,
}

impl AccessControlAgent {
    pub fn new() -> Self {
        Self::with_id(ACCESS_CONTROL_ID)
    }

    pub fn with_id(agent_id: &str) -> Self {
        Self {
            context: AgentContext::new(
                agent_id,
                "security",
                [VALIDATE, "enforce_rbac", REVIEW],
            ),
            denials: Mutex::new(VecDeque::new()),
        }
    }

    async fn validate_access(&self, requester: &str, data: &Value) -> Result<Value> {
        if !self.check_permission(VALIDATE) {
            return Ok(reply::permission_denied(VALIDATE));
        }
        let request: AccessRequest = parse_payload(data)?;

        let Some(role) = Role::for_agent(requester) else {
            let reason = format!("Unknown agent: {}", requester);
            return Ok(self.deny(requester, &request, reason).await);
        };
        let Some(grants) = role.grants() else {
            return Ok(reply::success(json!({
                "decision": "approved",
                "role": role,
                "allowed_fields": ["*"],
                "allowed_actions": ["*"],
            })));
        };

        if !grants.actions.contains(&request.requested_action.as_str()) {
            let reason = format!(
                "Action '{}' not permitted for role '{}'",
                request.requested_action,
                role.as_str()
            );
            return Ok(self.deny(requester, &request, reason).await);
        }
        let unreadable: Vec<&str> = request
            .fields
            .iter()
            .map(String::as_str)
            .filter(|field| !grants.read_fields.contains(field))
            .collect();
        if !unreadable.is_empty() {
            let reason = format!("Cannot access fields: {}", unreadable.join(", "));
            return Ok(self.deny(requester, &request, reason).await);
        }

        self.context
            .audit_after_commit(
                "access_granted",
                request.patient_id.as_ref().map(PatientId::as_str),
                &format!(
                    "Agent: {}, Role: {}, Action: {}",
                    requester,
                    role.as_str(),
                    request.requested_action
                ),
            )
            .await;

        Ok(reply::success(json!({
            "decision": "approved",
            "role": role,
            "allowed_fields": grants.read_fields,
            "allowed_actions": grants.actions,
        })))
    }

    async fn deny(&self, requester: &str, request: &AccessRequest, reason: String) -> Value {
        let denial = Denial {
            timestamp: Utc::now(),
            agent: requester.to_string(),
            action: request.requested_action.clone(),
            patient_id: request.patient_id.clone(),
            reason: reason.clone(),
        };
        tracing::warn!(
            "access denied: agent={} action={} reason={}",
            denial.agent,
            denial.action,
            denial.reason
        );
        {
            let mut denials = self.denials.lock().unwrap_or_else(PoisonError::into_inner);
            if denials.len() == MAX_DENIALS {
                denials.pop_front();
            }
            denials.push_back(denial);
        }

        self.context
            .audit_after_commit(
                "access_denied",
                request.patient_id.as_ref().map(PatientId::as_str),
                &format!(
                    "Agent: {}, Action: {}, Reason: {}",
                    requester, request.requested_action, reason
                ),
            )
            .await;

        let mut body = reply::denied(reason);
        body["severity"] = json!("security_alert");
        body
    }

    fn check_write_permission(&self, requester: &str, data: &Value) -> Result<Value> {
        if !self.check_permission(VALIDATE) {
            return Ok(reply::permission_denied(VALIDATE));
        }
        let check: WriteCheck = parse_payload(data)?;
        let Some(role) = Role::for_agent(requester) else {
            return Ok(reply::denied(format!("Unknown agent: {}", requester)));
        };
        let can_write = role
            .grants()
            .map_or(true, |grants| grants.write_fields.contains(&check.field.as_str()));

        if can_write {
            Ok(reply::success(json!({"field": check.field, "can_write": true})))
        } else {
            let mut body = reply::denied(format!("Role '{}' may not write {}", role.as_str(), check.field));
            body["can_write"] = json!(false);
            Ok(body)
        }
    }

    fn get_denied_attempts(&self, data: &Value) -> Result<Value> {
        if !self.check_permission(REVIEW) {
            return Ok(reply::permission_denied(REVIEW));
        }
        let window: DenialWindow = parse_payload(data)?;
        let minutes = window.time_window_minutes.unwrap_or(DEFAULT_WINDOW_MINUTES);
        let cutoff = Utc::now() - Duration::minutes(minutes);

        let recent: Vec<Denial> = self
            .denials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|d| d.timestamp > cutoff)
            .cloned()
            .collect();

        Ok(reply::success(json!({
            "denial_count": recent.len(),
            "denials": recent,
        })))
    }
}

impl Default for AccessControlAgent {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Agent for AccessControlAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        let Some(action) = parse_action::<AccessAction>(&message.action) else {
            return reply::unsupported(&message.action);
        };
        let outcome = match action {
            AccessAction::ValidateAccess => {
                self.validate_access(&message.from, &message.data).await
            }
            AccessAction::CheckWritePermission => {
                self.check_write_permission(&message.from, &message.data)
            }
            AccessAction::GetDeniedAttempts => self.get_denied_attempts(&message.data),
        };
        outcome.unwrap_or_else(|e| reply::error(e.to_string()))
    }
}
