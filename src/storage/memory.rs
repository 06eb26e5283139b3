//! In-memory record store.

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{
    AccessLogEntry, AccessLogFilter, LabRequest, LabStatus, MedicalRecord, NewLabRequest,
    NewMedicalRecord, NewPatient, Patient, RecordStore,
};
use crate::types::{Error, LabRequestId, PatientId, RecordId, Result};

#[derive(Debug, Default)]
struct Tables {
    patients: Vec<Patient>,
    records: Vec<MedicalRecord>,
    access_log: Vec<AccessLogEntry>,
    lab_requests: HashMap<LabRequestId, LabRequest>,
    lab_order: Vec<LabRequestId>,
}

/// `RecordStore` backed by process memory. Rows are append-ordered.
#[derive(Debug, Default)]
pub struct InMemoryRecordStore {
    tables: RwLock<Tables>,
}

impl InMemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn patient_count(&self) -> usize {
        self.tables.read().await.patients.len()
    }

    pub async fn access_log_len(&self) -> usize {
        self.tables.read().await.access_log.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryRecordStore {
    async fn create_patient(&self, patient: NewPatient) -> Result<Patient> {
        if patient.name.trim().is_empty() {
            return Err(Error::validation("patient name cannot be empty"));
        }
        let patient = Patient {
            patient_id: PatientId::new(),
            name: patient.name,
            dob: patient.dob,
            contact: patient.contact,
            created_at: Utc::now(),
        };
        self.tables.write().await.patients.push(patient.clone());
        Ok(patient)
    }

    async fn get_patient(&self, patient_id: &PatientId) -> Result<Option<Patient>> {
        let tables = self.tables.read().await;
        Ok(tables
            .patients
            .iter()
            .find(|p| &p.patient_id == patient_id)
            .cloned())
    }

    async fn latest_patient(&self) -> Result<Option<Patient>> {
        Ok(self.tables.read().await.patients.last().cloned())
    }

    async fn add_medical_record(&self, record: NewMedicalRecord) -> Result<MedicalRecord> {
        let mut tables = self.tables.write().await;
        if !tables.patients.iter().any(|p| p.patient_id == record.patient_id) {
            return Err(Error::not_found(format!("patient {}", record.patient_id)));
        }
        let record = MedicalRecord {
            record_id: RecordId::new(),
            patient_id: record.patient_id,
            diagnosis: record.diagnosis,
            medications: record.medications,
            lab_results: record.lab_results,
            imaging_results: record.imaging_results,
            created_at: Utc::now(),
        };
        tables.records.push(record.clone());
        Ok(record)
    }

    async fn latest_medical_record(
        &self,
        patient_id: &PatientId,
    ) -> Result<Option<MedicalRecord>> {
        let tables = self.tables.read().await;
        Ok(tables
            .records
            .iter()
            .rev()
            .find(|r| &r.patient_id == patient_id)
            .cloned())
    }

    async fn append_access_log(&self, entry: AccessLogEntry) -> Result<AccessLogEntry> {
        self.tables.write().await.access_log.push(entry.clone());
        Ok(entry)
    }

    async fn query_access_logs(&self, filter: &AccessLogFilter) -> Result<Vec<AccessLogEntry>> {
        let limit = filter.limit.unwrap_or(AccessLogFilter::DEFAULT_LIMIT);
        let tables = self.tables.read().await;
        Ok(tables
            .access_log
            .iter()
            .rev()
            .filter(|entry| filter.matches(entry))
            .take(limit)
            .cloned()
            .collect())
    }

    async fn create_lab_request(&self, request: NewLabRequest) -> Result<LabRequest> {
        let mut tables = self.tables.write().await;
        if !tables.patients.iter().any(|p| p.patient_id == request.patient_id) {
            return Err(Error::not_found(format!("patient {}", request.patient_id)));
        }
        let request = LabRequest {
            request_id: LabRequestId::new(),
            patient_id: request.patient_id,
            doctor_id: request.doctor_id,
            test_type: request.test_type,
            priority: request.priority,
            status: LabStatus::default(),
            result: None,
            created_at: Utc::now(),
        };
        tables.lab_order.push(request.request_id.clone());
        tables
            .lab_requests
            .insert(request.request_id.clone(), request.clone());
        Ok(request)
    }

    async fn get_lab_request(&self, request_id: &LabRequestId) -> Result<Option<LabRequest>> {
        Ok(self.tables.read().await.lab_requests.get(request_id).cloned())
    }

    async fn update_lab_request(
        &self,
        request_id: &LabRequestId,
        status: LabStatus,
        result: Option<Value>,
    ) -> Result<LabRequest> {
        let mut tables = self.tables.write().await;
        let request = tables
            .lab_requests
            .get_mut(request_id)
            .ok_or_else(|| Error::not_found(format!("lab request {}", request_id)))?;
        if !request.status.can_become(status) {
            return Err(Error::validation(format!(
                "lab request {} is {}, cannot become {}",
                request_id, request.status, status
            )));
        }
        request.status = status;
        if result.is_some() {
            request.result = result;
        }
        Ok(request.clone())
    }

    async fn pending_lab_requests(&self) -> Result<Vec<LabRequest>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lab_order
            .iter()
            .filter_map(|id| tables.lab_requests.get(id))
            .filter(|r| r.status.is_open())
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::AuditCategory;
    use crate::types::AuditEntryId;
    use chrono::NaiveDate;
    use serde_json::json;

    fn jane() -> NewPatient {
        NewPatient {
            name: "Jane Doe".to_string(),
            dob: NaiveDate::from_ymd_opt(1990, 1, 15).unwrap(),
            contact: None,
        }
    }

    fn log_entry(agent_id: &str, patient_id: Option<&str>, category: AuditCategory) -> AccessLogEntry {
        AccessLogEntry {
            log_id: AuditEntryId::new(),
            agent_id: agent_id.to_string(),
            patient_id: patient_id.map(str::to_string),
            action: "retrieve_patient".to_string(),
            details: String::new(),
            category,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_patient_round_trip() {
        let store = InMemoryRecordStore::new();
        let created = store.create_patient(jane()).await.unwrap();

        let fetched = store.get_patient(&created.patient_id).await.unwrap().unwrap();
        assert_eq!(fetched, created);
        assert_eq!(store.latest_patient().await.unwrap().unwrap(), created);
        assert!(store.get_patient(&PatientId::new()).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_patient_rejects_blank_name() {
        let store = InMemoryRecordStore::new();
        let mut patient = jane();
        patient.name = " ".to_string();
        assert!(store.create_patient(patient).await.is_err());
    }

    #[tokio::test]
    async fn test_medical_record_requires_patient() {
        let store = InMemoryRecordStore::new();
        let orphan = NewMedicalRecord {
            patient_id: PatientId::new(),
            diagnosis: Some("Seasonal fever".to_string()),
            medications: None,
            lab_results: None,
            imaging_results: None,
        };
        assert!(matches!(
            store.add_medical_record(orphan).await.unwrap_err(),
            Error::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn test_latest_medical_record() {
        let store = InMemoryRecordStore::new();
        let patient = store.create_patient(jane()).await.unwrap();
        for diagnosis in ["first", "second"] {
            store
                .add_medical_record(NewMedicalRecord {
                    patient_id: patient.patient_id.clone(),
                    diagnosis: Some(diagnosis.to_string()),
                    medications: None,
                    lab_results: Some(json!({"glucose": 95})),
                    imaging_results: None,
                })
                .await
                .unwrap();
        }

        let latest = store
            .latest_medical_record(&patient.patient_id)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(latest.diagnosis.as_deref(), Some("second"));
    }

    #[tokio::test]
    async fn test_access_log_filters_newest_first() {
        let store = InMemoryRecordStore::new();
        store
            .append_access_log(log_entry("doctor_agent", Some("P1"), AuditCategory::Access))
            .await
            .unwrap();
        store
            .append_access_log(log_entry("ehr_agent", Some("P1"), AuditCategory::Modification))
            .await
            .unwrap();
        store
            .append_access_log(log_entry("ehr_agent", Some("P2"), AuditCategory::Access))
            .await
            .unwrap();

        let p1 = store
            .query_access_logs(&AccessLogFilter {
                patient_id: Some("P1".to_string()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(p1.len(), 2);
        assert_eq!(p1[0].agent_id, "ehr_agent");

        let limited = store
            .query_access_logs(&AccessLogFilter {
                category: Some(AuditCategory::Access),
                limit: Some(1),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].patient_id.as_deref(), Some("P2"));
    }

    #[tokio::test]
    async fn test_lab_request_lifecycle() {
        let store = InMemoryRecordStore::new();
        let patient = store.create_patient(jane()).await.unwrap();
        let request = store
            .create_lab_request(NewLabRequest {
                patient_id: patient.patient_id.clone(),
                doctor_id: "doctor_agent".to_string(),
                test_type: "blood_glucose".to_string(),
                priority: "routine".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(request.status, LabStatus::Pending);
        assert_eq!(store.pending_lab_requests().await.unwrap().len(), 1);

        store
            .update_lab_request(&request.request_id, LabStatus::InProgress, None)
            .await
            .unwrap();
        assert_eq!(store.pending_lab_requests().await.unwrap().len(), 1);

        let done = store
            .update_lab_request(&request.request_id, LabStatus::Completed, Some(json!({"value": 92})))
            .await
            .unwrap();
        assert_eq!(done.status, LabStatus::Completed);
        assert_eq!(done.result, Some(json!({"value": 92})));
        assert!(store.pending_lab_requests().await.unwrap().is_empty());

        let reopened = store
            .update_lab_request(&request.request_id, LabStatus::Cancelled, None)
            .await;
        assert!(matches!(reopened, Err(Error::Validation(_))));

        assert!(store
            .update_lab_request(&LabRequestId::new(), LabStatus::Cancelled, None)
            .await
            .is_err());
    }
}
