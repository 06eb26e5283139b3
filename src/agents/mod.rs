//! Hospital workflow agents.
//!
//! Each agent declares a closed action enum, parsed from `Message::action`
//! and matched exhaustively; anything else gets an "Unknown action" reply.

mod access_control;
mod audit_logger;
mod doctor;
mod ehr;
mod lab;
mod receptionist;
mod scheduler;

pub use access_control::{AccessControlAgent, Denial, Role};
pub use audit_logger::{categorize, AuditLoggerAgent};
pub use doctor::DoctorAgent;
pub use ehr::EhrAgent;
pub use lab::{classify_result, LabAgent, ResultFlag, LAB_RESULTS_READY_ACTION};
pub use receptionist::ReceptionistAgent;
pub use scheduler::DoctorSchedulerAgent;

use std::sync::Arc;

use crate::agent::Agent;
use crate::storage::RecordStore;

pub use crate::agent::AUDIT_LOGGER_ID;
pub const RECEPTIONIST_ID: &str = "receptionist";
pub const EHR_AGENT_ID: &str = "ehr_agent";
pub const DOCTOR_SCHEDULER_ID: &str = "doctor_scheduler";
pub const LAB_AGENT_ID: &str = "lab_agent";
pub const DOCTOR_AGENT_ID: &str = "doctor_agent";
pub const ACCESS_CONTROL_ID: &str = "access_control";

const ATTENDING_DOCTOR: &str = "Attending";

/// The standard agent roster, all sharing one store.
pub fn hospital_agents(store: Arc<dyn RecordStore>) -> Vec<Arc<dyn Agent>> {
    vec![
        Arc::new(ReceptionistAgent::new()),
        Arc::new(EhrAgent::new(store.clone())),
        Arc::new(AuditLoggerAgent::new(store.clone())),
        Arc::new(DoctorSchedulerAgent::new()),
        Arc::new(LabAgent::new(store)),
        Arc::new(DoctorAgent::new(ATTENDING_DOCTOR)),
        Arc::new(AccessControlAgent::new()),
    ]
}
