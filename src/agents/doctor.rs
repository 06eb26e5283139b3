//! Attending doctor: chart retrieval, diagnosis, lab orders and results.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashSet;
use tokio::sync::RwLock;

use super::{ACCESS_CONTROL_ID, DOCTOR_AGENT_ID, EHR_AGENT_ID, LAB_AGENT_ID};
use crate::agent::{parse_action, parse_payload, reply, Agent, AgentContext};
use crate::message::Message;
use crate::types::{PatientId, Result};
use crate::validation::validate_non_empty;

/// Fields requested from the chart on retrieval.
const CHART_FIELDS: [&str; 8] = [
    "patient_id",
    "name",
    "dob",
    "diagnosis",
    "medications",
    "lab_results",
    "imaging_results",
    "allergies",
];

const DEFAULT_SPECIALIZATION: &str = "General";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum DoctorAction {
    AssignPatient,
    RetrievePatient,
    WriteDiagnosis,
    OrderLabTest,
    LabResultsReady,
    DischargePatient,
}

#[derive(Debug, Deserialize)]
struct PatientRef {
    patient_id: PatientId,
}

#[derive(Debug, Deserialize)]
struct Diagnosis {
    patient_id: PatientId,
    diagnosis: String,
    #[serde(default)]
    medications: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabTestOrder {
    patient_id: PatientId,
    test_type: String,
    #[serde(default)]
    priority: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LabResults {
    patient_id: PatientId,
    test_type: String,
    #[serde(default)]
    result: Value,
    #[serde(default)]
    flag: Option<String>,
}

/// A doctor caring for a set of assigned patients.
///
/// Chart reads and writes go through the EHR agent. Retrieval also asks the
/// access-control agent to validate the request, which records and audits
/// any denial.
#[derive(Debug)]
pub struct DoctorAgent {
    context: AgentContext,
    doctor_name: String,
    specialization: String,
    active_patients: RwLock<HashSet<PatientId>>,
}

impl DoctorAgent {
    pub fn new(doctor_name: impl Into<String>) -> Self {
        Self::with_id(DOCTOR_AGENT_ID, doctor_name)
    }

    pub fn with_id(agent_id: &str, doctor_name: impl Into<String>) -> Self {
        Self {
            context: AgentContext::new(
                agent_id,
                "doctor",
                [
                    "retrieve_patient_record",
                    "read_all_clinical_data",
                    "write_diagnosis",
                    "write_medications",
                    "order_lab_tests",
                    "discharge_patient",
                    "update_medical_record",
                ],
            ),
            doctor_name: doctor_name.into(),
            specialization: DEFAULT_SPECIALIZATION.to_string(),
            active_patients: RwLock::new(HashSet::new()),
        }
    }

    pub fn with_specialization(mut self, specialization: impl Into<String>) -> Self {
        self.specialization = specialization.into();
        self
    }

    pub async fn active_patients(&self) -> Vec<PatientId> {
        self.active_patients.read().await.iter().cloned().collect()
    }

    async fn is_assigned(&self, patient_id: &PatientId) -> bool {
        self.active_patients.read().await.contains(patient_id)
    }

    /// Send on behalf of `origin`, keeping its reply target.
    async fn forward(
        &self,
        origin: &Message,
        target: &str,
        action: &str,
        data: Value,
    ) -> Result<()> {
        match &origin.reply_to {
            Some(reply_to) => {
                self.context
                    .send_message_with_reply(target, action, data, reply_to)
                    .await
            }
            None => self.context.send_message(target, action, data).await,
        }
    }

    fn not_assigned(&self, patient_id: &PatientId) -> Value {
        reply::error(format!(
            "Patient {} not assigned to Dr. {}",
            patient_id, self.doctor_name
        ))
    }

    async fn assign_patient(&self, data: &Value) -> Result<Value> {
        let PatientRef { patient_id } = parse_payload(data)?;
        self.active_patients.write().await.insert(patient_id.clone());

        self.context
            .audit_after_commit(
                "patient_assigned",
                Some(patient_id.as_str()),
                &format!(
                    "Patient assigned to Dr. {} ({})",
                    self.doctor_name, self.specialization
                ),
            )
            .await;

        Ok(reply::success(json!({
            "patient_id": patient_id,
            "doctor": self.doctor_name,
        })))
    }

    async fn retrieve_patient(&self, message: &Message) -> Result<Value> {
        if !self.check_permission("retrieve_patient_record") {
            return Ok(reply::permission_denied("retrieve_patient_record"));
        }
        let PatientRef { patient_id } = parse_payload(&message.data)?;

        self.context
            .send_message(
                ACCESS_CONTROL_ID,
                "validate_access",
                json!({
                    "requested_action": "retrieve_patient",
                    "fields": CHART_FIELDS,
                    "patient_id": patient_id,
                }),
            )
            .await?;
        self.forward(
            message,
            EHR_AGENT_ID,
            "retrieve_patient",
            json!({"patient_id": patient_id}),
        )
        .await?;

        self.context
            .audit_after_commit(
                "retrieve_patient_record",
                Some(patient_id.as_str()),
                "Chart requested from EHR",
            )
            .await;

        Ok(reply::success(json!({
            "patient_id": patient_id,
            "message": "Record retrieval request sent to EHR agent",
        })))
    }

    async fn write_diagnosis(&self, message: &Message) -> Result<Value> {
        if !self.check_permission("write_diagnosis") {
            return Ok(reply::permission_denied("write_diagnosis"));
        }
        let diagnosis: Diagnosis = parse_payload(&message.data)?;
        validate_non_empty(&diagnosis.diagnosis, "diagnosis")?;
        if !self.is_assigned(&diagnosis.patient_id).await {
            return Ok(self.not_assigned(&diagnosis.patient_id));
        }

        self.forward(
            message,
            EHR_AGENT_ID,
            "update_medical_record",
            json!({
                "patient_id": diagnosis.patient_id,
                "diagnosis": diagnosis.diagnosis,
                "medications": diagnosis.medications,
            }),
        )
        .await?;

        self.context
            .audit_after_commit(
                "write_diagnosis",
                Some(diagnosis.patient_id.as_str()),
                &format!("Diagnosis: {}", diagnosis.diagnosis),
            )
            .await;

        Ok(reply::success(json!({
            "patient_id": diagnosis.patient_id,
            "diagnosis": diagnosis.diagnosis,
        })))
    }

    async fn order_lab_test(&self, message: &Message) -> Result<Value> {
        if !self.check_permission("order_lab_tests") {
            return Ok(reply::permission_denied("order_lab_tests"));
        }
        let order: LabTestOrder = parse_payload(&message.data)?;
        validate_non_empty(&order.test_type, "test_type")?;

        self.forward(
            message,
            LAB_AGENT_ID,
            "process_lab_order",
            json!({
                "patient_id": order.patient_id,
                "test_type": order.test_type,
                "priority": order.priority,
            }),
        )
        .await?;

        self.context
            .audit_after_commit(
                "order_lab_test",
                Some(order.patient_id.as_str()),
                &format!(
                    "Test: {}, Priority: {}",
                    order.test_type,
                    order.priority.as_deref().unwrap_or("routine")
                ),
            )
            .await;

        Ok(reply::success(json!({
            "patient_id": order.patient_id,
            "message": format!("Lab test \"{}\" ordered", order.test_type),
        })))
    }

    async fn lab_results_ready(&self, data: &Value) -> Result<Value> {
        let results: LabResults = parse_payload(data)?;
        let flag = results.flag.as_deref().unwrap_or("unflagged");
        if matches!(flag, "abnormal" | "critical") {
            tracing::warn!(
                "Dr. {}: {} result for {} is {}",
                self.doctor_name,
                results.test_type,
                results.patient_id,
                flag
            );
        }

        self.context
            .audit_after_commit(
                "lab_result_received",
                Some(results.patient_id.as_str()),
                &format!("{}: {} ({})", results.test_type, results.result, flag),
            )
            .await;

        Ok(reply::success(json!({
            "patient_id": results.patient_id,
            "reviewed": true,
        })))
    }

    async fn discharge_patient(&self, data: &Value) -> Result<Value> {
        if !self.check_permission("discharge_patient") {
            return Ok(reply::permission_denied("discharge_patient"));
        }
        let PatientRef { patient_id } = parse_payload(data)?;
        if !self.active_patients.write().await.remove(&patient_id) {
            return Ok(self.not_assigned(&patient_id));
        }

        self.context
            .audit_after_commit(
                "discharge_patient",
                Some(patient_id.as_str()),
                &format!("Discharged by Dr. {}", self.doctor_name),
            )
            .await;

        Ok(reply::success(json!({"patient_id": patient_id, "discharged": true})))
    }
}

#[async_trait]
impl Agent for DoctorAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        let Some(action) = parse_action::<DoctorAction>(&message.action) else {
            return reply::unsupported(&message.action);
        };
        let outcome = match action {
            DoctorAction::AssignPatient => self.assign_patient(&message.data).await,
            DoctorAction::RetrievePatient => self.retrieve_patient(&message).await,
            DoctorAction::WriteDiagnosis => self.write_diagnosis(&message).await,
            DoctorAction::OrderLabTest => self.order_lab_test(&message).await,
            DoctorAction::LabResultsReady => self.lab_results_ready(&message.data).await,
            DoctorAction::DischargePatient => self.discharge_patient(&message.data).await,
        };
        outcome.unwrap_or_else(|e| reply::error(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::{QueueHandle, AUDIT_LOGGER_ID};
    use crate::agents::LAB_RESULTS_READY_ACTION;
    use crate::queue::EventQueue;
    use std::sync::Arc;
    use tracing_test::traced_test;

    fn setup() -> (Arc<EventQueue>, DoctorAgent) {
        let queue = Arc::new(EventQueue::new());
        let agent = DoctorAgent::new("House").with_specialization("Diagnostics");
        agent.context().attach_queue(QueueHandle::new(&queue));
        (queue, agent)
    }

    fn to_doctor(action: &str, data: Value) -> Message {
        Message::new("api", DOCTOR_AGENT_ID, action, data)
    }

    async fn drain(queue: &EventQueue) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Some(message) = queue.pop().await {
            messages.push(message);
        }
        messages
    }

    #[tokio::test]
    async fn test_retrieve_validates_then_asks_ehr() {
        let (queue, agent) = setup();

        let result = agent
            .process_message(
                to_doctor("retrieve_patient", json!({"patient_id": "P001"})).with_reply_to("api"),
            )
            .await;
        assert!(reply::is_success(&result), "{}", result);

        let sent = drain(&queue).await;
        let targets: Vec<(&str, &str)> = sent
            .iter()
            .map(|m| (m.to.as_str(), m.action.as_str()))
            .collect();
        assert_eq!(
            targets,
            vec![
                (ACCESS_CONTROL_ID, "validate_access"),
                (EHR_AGENT_ID, "retrieve_patient"),
                (AUDIT_LOGGER_ID, "log_event"),
            ]
        );
        assert_eq!(sent[0].data["requested_action"], "retrieve_patient");
        assert_eq!(sent[0].reply_to, None);
        assert_eq!(sent[1].reply_to.as_deref(), Some("api"));
        assert_eq!(sent[2].data["action"], "retrieve_patient_record");
    }

    #[tokio::test]
    async fn test_diagnosis_requires_assignment() {
        let (queue, agent) = setup();
        let diagnose = || {
            to_doctor(
                "write_diagnosis",
                json!({"patient_id": "P001", "diagnosis": "Type 2 diabetes"}),
            )
        };

        let refused = agent.process_message(diagnose()).await;
        assert_eq!(refused["message"], "Patient P001 not assigned to Dr. House");
        assert!(queue.is_empty().await);

        let assigned = agent
            .process_message(to_doctor("assign_patient", json!({"patient_id": "P001"})))
            .await;
        assert!(reply::is_success(&assigned));
        assert_eq!(drain(&queue).await[0].data["action"], "patient_assigned");

        let written = agent.process_message(diagnose()).await;
        assert_eq!(written["diagnosis"], "Type 2 diabetes");
        let sent = drain(&queue).await;
        assert_eq!(sent[0].to, EHR_AGENT_ID);
        assert_eq!(sent[0].action, "update_medical_record");
        assert_eq!(sent[0].data["diagnosis"], "Type 2 diabetes");
        assert_eq!(sent[1].data["action"], "write_diagnosis");
    }

    #[tokio::test]
    async fn test_order_lab_test_goes_to_lab() {
        let (queue, agent) = setup();

        let result = agent
            .process_message(to_doctor(
                "order_lab_test",
                json!({"patient_id": "P001", "test_type": "blood_glucose", "priority": "stat"}),
            ))
            .await;
        assert_eq!(result["message"], "Lab test \"blood_glucose\" ordered");

        let order = queue.pop().await.unwrap();
        assert_eq!(order.from, DOCTOR_AGENT_ID);
        assert_eq!(order.to, LAB_AGENT_ID);
        assert_eq!(order.action, "process_lab_order");
        assert_eq!(order.data["priority"], "stat");
        assert_eq!(queue.pop().await.unwrap().data["action"], "order_lab_test");
    }

    #[tokio::test]
    #[traced_test]
    async fn test_critical_lab_results_are_logged() {
        let (queue, agent) = setup();

        let result = agent
            .process_message(Message::new(
                LAB_AGENT_ID,
                DOCTOR_AGENT_ID,
                LAB_RESULTS_READY_ACTION,
                json!({
                    "patient_id": "P001",
                    "test_type": "blood_glucose",
                    "result": {"value": 250},
                    "flag": "critical",
                }),
            ))
            .await;

        assert_eq!(result["reviewed"], true);
        assert!(logs_contain("blood_glucose result for P001 is critical"));
        let audit = queue.pop().await.unwrap();
        assert_eq!(audit.data["action"], "lab_result_received");
    }

    #[tokio::test]
    async fn test_discharge_releases_patient() {
        let (_queue, agent) = setup();
        agent
            .process_message(to_doctor("assign_patient", json!({"patient_id": "P001"})))
            .await;
        assert_eq!(agent.active_patients().await.len(), 1);

        let discharged = agent
            .process_message(to_doctor("discharge_patient", json!({"patient_id": "P001"})))
            .await;
        assert_eq!(discharged["discharged"], true);
        assert!(agent.active_patients().await.is_empty());

        let again = agent
            .process_message(to_doctor("discharge_patient", json!({"patient_id": "P001"})))
            .await;
        assert_eq!(again["status"], "error");
    }

    #[tokio::test]
    async fn test_unknown_action() {
        let (_queue, agent) = setup();
        let result = agent
            .process_message(to_doctor("prescribe_placebo", json!({})))
            .await;
        assert_eq!(result["message"], "Unknown action: prescribe_placebo");
    }
}
