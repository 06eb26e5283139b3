//! Storage collaborator used by agents.
//!
//! The kernel never touches storage; agents call into a [`RecordStore`] for
//! the four record kinds of the hospital workflow: patients, medical records,
//! access-log entries and lab requests.

mod memory;

pub use memory::InMemoryRecordStore;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

use crate::types::{AuditEntryId, LabRequestId, PatientId, RecordId, Result};

// =============================================================================
// Records
// =============================================================================

/// A registered patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Patient {
    pub patient_id: PatientId,
    pub name: String,
    pub dob: NaiveDate,
    pub contact: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields supplied at patient creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub dob: NaiveDate,
    #[serde(default)]
    pub contact: Option<String>,
}

/// A clinical record linked to a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MedicalRecord {
    pub record_id: RecordId,
    pub patient_id: PatientId,
    pub diagnosis: Option<String>,
    pub medications: Option<String>,
    pub lab_results: Option<Value>,
    pub imaging_results: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewMedicalRecord {
    pub patient_id: PatientId,
    #[serde(default)]
    pub diagnosis: Option<String>,
    #[serde(default)]
    pub medications: Option<String>,
    #[serde(default)]
    pub lab_results: Option<Value>,
    #[serde(default)]
    pub imaging_results: Option<Value>,
}

/// Audit category of an access-log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditCategory {
    Access,
    Modification,
    Security,
    Clinical,
    Administrative,
    Other,
}

/// Who did what, to whom, when.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessLogEntry {
    pub log_id: AuditEntryId,
    pub agent_id: String,
    pub patient_id: Option<String>,
    pub action: String,
    pub details: String,
    pub category: AuditCategory,
    pub timestamp: DateTime<Utc>,
}

/// Filters for access-log queries. Unset fields match everything.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessLogFilter {
    pub patient_id: Option<String>,
    pub agent_id: Option<String>,
    pub action: Option<String>,
    pub category: Option<AuditCategory>,
    pub limit: Option<usize>,
}

impl AccessLogFilter {
    /// Default result cap.
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn matches(&self, entry: &AccessLogEntry) -> bool {
        self.patient_id
            .as_ref()
            .map_or(true, |id| entry.patient_id.as_ref() == Some(id))
            && self.agent_id.as_ref().map_or(true, |id| &entry.agent_id == id)
            && self.action.as_ref().map_or(true, |a| &entry.action == a)
            && self.category.map_or(true, |c| entry.category == c)
    }
}

/// Lab request lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Cancelled,
}

impl LabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Still awaiting a result.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }

    /// Orders move forward only: pending, then in progress, then completed
    /// or cancelled. Closed orders never change again.
    pub fn can_become(&self, next: LabStatus) -> bool {
        match (self, next) {
            (Self::Pending, Self::InProgress) => true,
            (from, Self::Completed | Self::Cancelled) => from.is_open(),
            _ => false,
        }
    }
}

impl fmt::Display for LabStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A lab test ordered for a patient.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LabRequest {
    pub request_id: LabRequestId,
    pub patient_id: PatientId,
    pub doctor_id: String,
    pub test_type: String,
    pub priority: String,
    pub status: LabStatus,
    pub result: Option<Value>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewLabRequest {
    pub patient_id: PatientId,
    pub doctor_id: String,
    pub test_type: String,
    pub priority: String,
}

// =============================================================================
// Store Trait
// =============================================================================

/// CRUD-style operations over the hospital records.
#[async_trait]
pub trait RecordStore: Send + Sync + fmt::Debug {
    async fn create_patient(&self, patient: NewPatient) -> Result<Patient>;

    async fn get_patient(&self, patient_id: &PatientId) -> Result<Option<Patient>>;

    /// Most recently created patient.
    async fn latest_patient(&self) -> Result<Option<Patient>>;

    async fn add_medical_record(&self, record: NewMedicalRecord) -> Result<MedicalRecord>;

    /// Most recent record for a patient.
    async fn latest_medical_record(&self, patient_id: &PatientId)
        -> Result<Option<MedicalRecord>>;

    async fn append_access_log(&self, entry: AccessLogEntry) -> Result<AccessLogEntry>;

    /// Matching entries, newest first, capped by `filter.limit`.
    async fn query_access_logs(&self, filter: &AccessLogFilter) -> Result<Vec<AccessLogEntry>>;

    async fn create_lab_request(&self, request: NewLabRequest) -> Result<LabRequest>;

    async fn get_lab_request(&self, request_id: &LabRequestId) -> Result<Option<LabRequest>>;

    /// Move a request to `status`, rejecting transitions `can_become` forbids.
    async fn update_lab_request(
        &self,
        request_id: &LabRequestId,
        status: LabStatus,
        result: Option<Value>,
    ) -> Result<LabRequest>;

    /// Requests not yet completed or cancelled, oldest first.
    async fn pending_lab_requests(&self) -> Result<Vec<LabRequest>>;
}
