//! # Careflow Core - Hospital Agent Routing Kernel
//!
//! In-process message routing for cooperating hospital workflow agents:
//! - `Message` contract with field-presence validation and reply synthesis
//! - `EventQueue`: FIFO buffer, subscriber table and direct delivery
//! - `Agent` capability trait with permission checks, sending and audit logging
//! - `Orchestrator`: registry, `dispatch_one`, cancellable dispatch loop
//! - Dead-letter log for unroutable, invalid and overflowed messages
//!
//! ## Architecture
//!
//! Agents never call each other; every interaction is a message:
//! ```text
//!   submit / push →  ┌──────────────────────────────────┐
//!                    │           EventQueue             │
//!                    │  ┌──────────┐  ┌─────────────┐   │
//!                    │  │ pending  │  │ subscribers │   │
//!                    │  │ (FIFO)   │  │ id → agent  │   │
//!                    │  └──────────┘  └─────────────┘   │
//!                    └───────┬──────────────────────────┘
//!                            │ pop
//!                    ┌───────▼──────────┐   reply_to
//!                    │   Orchestrator   │ ───────────→ enqueue(response)
//!                    │   dispatch_one   │
//!                    └───────┬──────────┘
//!                            │ process_message
//!                    ┌───────▼──────────┐
//!                    │      Agent       │ ──send_message──→ push
//!                    └──────────────────┘
//! ```

// Enforce strict safety at compile time
#![deny(unsafe_code)]
#![warn(missing_debug_implementations)]
#![warn(rust_2018_idioms)]

// Re-export public API
pub mod agent;
pub mod agents;
pub mod message;
pub mod orchestrator;
pub mod queue;
pub mod storage;
pub mod types;

// Internal utilities
pub mod observability;
pub mod validation;

pub use agent::{Agent, AgentContext, PermissionSet, QueueHandle};
pub use message::Message;
pub use orchestrator::{DispatchOutcome, Orchestrator};
pub use queue::{DeadLetter, DeadLetterReason, Delivery, EventQueue, QueueStats, RouteOutcome};
pub use types::{Config, Error, Result};
