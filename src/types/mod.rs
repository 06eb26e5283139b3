//! Core types for the routing kernel.
//!
//! This module provides foundational types used throughout the system:
//! - **IDs**: Strongly-typed identifiers (MessageId, PatientId, etc.)
//! - **Errors**: Application error types with thiserror derives
//! - **Config**: Configuration structures for the queue, orchestrator and logging

mod config;
mod errors;
mod ids;

pub use config::{Config, ObservabilityConfig, OrchestratorConfig, OverflowPolicy, QueueConfig};
pub use errors::{Error, Result};
pub use ids::{AuditEntryId, LabRequestId, MessageId, PatientId, RecordId};
