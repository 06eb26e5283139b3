//! Electronic health record agent: the only writer of patient data.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

use super::EHR_AGENT_ID;
use crate::agent::{parse_action, parse_payload, reply, Agent, AgentContext};
use crate::message::Message;
use crate::storage::{NewMedicalRecord, NewPatient, RecordStore};
use crate::types::{PatientId, Result};

const READ: &str = "read_all_patient_data";
const WRITE: &str = "write_all_patient_data";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum EhrAction {
    CreatePatient,
    RetrievePatient,
    UpdateMedicalRecord,
    UpdateAppointment,
    LatestPatient,
}

#[derive(Debug, Deserialize)]
struct PatientLookup {
    patient_id: PatientId,
}

#[derive(Debug, Deserialize)]
struct AppointmentUpdate {
    patient_id: PatientId,
    appointment_time: String,
}

#[derive(Debug)]
pub struct EhrAgent {
    context: AgentContext,
    store: Arc<dyn RecordStore>,
}

impl EhrAgent {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_id(EHR_AGENT_ID, store)
    }

    pub fn with_id(agent_id: &str, store: Arc<dyn RecordStore>) -> Self {
        Self {
            context: AgentContext::new(
                agent_id,
                "ehr_system",
                [READ, WRITE, "query_across_departments", "aggregate_records"],
            ),
            store,
        }
    }

    async fn create_patient(&self, data: &Value) -> Result<Value> {
        if !self.check_permission(WRITE) {
            return Ok(reply::permission_denied(WRITE));
        }
        let patient = self.store.create_patient(parse_payload::<NewPatient>(data)?).await?;
        let patient_id = patient.patient_id.to_string();

        self.context
            .audit_after_commit("create_patient", Some(&patient_id), "New patient record created.")
            .await;

        Ok(reply::success(json!({"patient_id": patient_id})))
    }

    async fn retrieve_patient(&self, requester: &str, data: &Value) -> Result<Value> {
        if !self.check_permission(READ) {
            return Ok(reply::permission_denied(READ));
        }
        let lookup: PatientLookup = parse_payload(data)?;
        let Some(patient) = self.store.get_patient(&lookup.patient_id).await? else {
            return Ok(reply::error("Patient not found"));
        };
        let record = self.store.latest_medical_record(&lookup.patient_id).await?;

        self.context
            .audit_after_commit(
                "retrieve_patient",
                Some(lookup.patient_id.as_str()),
                &format!("Requested by {}", requester),
            )
            .await;

        Ok(reply::success(json!({
            "patient": patient,
            "medical_record": record,
        })))
    }

    async fn update_medical_record(&self, requester: &str, data: &Value) -> Result<Value> {
        if !self.check_permission(WRITE) {
            return Ok(reply::permission_denied(WRITE));
        }
        let record = self
            .store
            .add_medical_record(parse_payload::<NewMedicalRecord>(data)?)
            .await?;

        self.context
            .audit_after_commit(
                "update_medical_record",
                Some(record.patient_id.as_str()),
                &format!("Updated by {}", requester),
            )
            .await;

        Ok(reply::success(json!({"record_id": record.record_id})))
    }

    async fn update_appointment(&self, data: &Value) -> Result<Value> {
        if !self.check_permission(WRITE) {
            return Ok(reply::permission_denied(WRITE));
        }
        let update: AppointmentUpdate = parse_payload(data)?;
        if self.store.get_patient(&update.patient_id).await?.is_none() {
            return Ok(reply::error("Patient not found"));
        }

        self.context
            .audit_after_commit(
                "update_appointment",
                Some(update.patient_id.as_str()),
                &format!("Appointment at {}", update.appointment_time),
            )
            .await;

        Ok(reply::success(json!({
            "patient_id": update.patient_id,
            "appointment_time": update.appointment_time,
        })))
    }

    async fn latest_patient(&self) -> Result<Value> {
        if !self.check_permission(READ) {
            return Ok(reply::permission_denied(READ));
        }
        match self.store.latest_patient().await? {
            Some(patient) => Ok(reply::success(json!({"patient": patient}))),
            None => Ok(reply::error("No patients registered")),
        }
    }
}

#[async_trait]
impl Agent for EhrAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        let Some(action) = parse_action::<EhrAction>(&message.action) else {
            return reply::unsupported(&message.action);
        };
        let outcome = match action {
            EhrAction::CreatePatient => self.create_patient(&message.data).await,
            EhrAction::RetrievePatient => self.retrieve_patient(&message.from, &message.data).await,
            EhrAction::UpdateMedicalRecord => {
                self.update_medical_record(&message.from, &message.data).await
            }
            EhrAction::UpdateAppointment => self.update_appointment(&message.data).await,
            EhrAction::LatestPatient => self.latest_patient().await,
        };
        outcome.unwrap_or_else(|e| {
            tracing::warn!("ehr action={} failed: {}", message.action, e);
            reply::error(e.to_string())
        })
    }
}
