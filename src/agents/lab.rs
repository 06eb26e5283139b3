//! Laboratory: order intake, status, result flagging and notification.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;

use super::LAB_AGENT_ID;
use crate::agent::{parse_action, parse_payload, reply, Agent, AgentContext};
use crate::message::Message;
use crate::storage::{LabRequest, LabStatus, NewLabRequest, RecordStore};
use crate::types::{LabRequestId, PatientId, Result};
use crate::validation::validate_non_empty;

/// Action sent to the ordering agent when results are in.
pub const LAB_RESULTS_READY_ACTION: &str = "lab_results_ready";

const DEFAULT_PRIORITY: &str = "routine";

/// Results this far outside the reference range are critical.
const CRITICAL_MARGIN: f64 = 0.2;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
enum LabAction {
    ProcessLabOrder,
    CheckOrderStatus,
    GetPendingOrders,
    StartOrder,
    CancelOrder,
    CompleteOrder,
}

#[derive(Debug, Deserialize)]
struct LabOrder {
    patient_id: PatientId,
    test_type: String,
    #[serde(default)]
    priority: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderLookup {
    order_id: LabRequestId,
}

#[derive(Debug, Deserialize)]
struct OrderCompletion {
    order_id: LabRequestId,
    result: Value,
}

/// How a numeric result compares to the reference range for its test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResultFlag {
    Normal,
    Abnormal,
    Critical,
}

/// Adult reference range `(min, max)` for a test, keyed by normalized name.
fn reference_range(test_type: &str) -> Option<(f64, f64)> {
    let key = test_type.trim().to_ascii_lowercase().replace([' ', '-'], "_");
    let range = match key.as_str() {
        "blood_glucose" => (70.0, 100.0),
        "hemoglobin" => (12.0, 16.0),
        "wbc_count" => (4_000.0, 11_000.0),
        "platelet_count" => (150_000.0, 450_000.0),
        "creatinine" => (0.6, 1.2),
        "alt_liver" => (7.0, 56.0),
        "cholesterol" => (0.0, 200.0),
        "triglycerides" => (0.0, 150.0),
        _ => return None,
    };
    Some(range)
}

/// Unknown tests are reported as normal.
pub fn classify_result(test_type: &str, value: f64) -> ResultFlag {
    let Some((min, max)) = reference_range(test_type) else {
        return ResultFlag::Normal;
    };
    if value < min * (1.0 - CRITICAL_MARGIN) || value > max * (1.0 + CRITICAL_MARGIN) {
        ResultFlag::Critical
    } else if value < min || value > max {
        ResultFlag::Abnormal
    } else {
        ResultFlag::Normal
    }
}

/// Flag for a result carrying a numeric `value`; other shapes are not judged.
fn flag_for(request: &LabRequest) -> Option<ResultFlag> {
    let value = request.result.as_ref()?.get("value")?.as_f64()?;
    Some(classify_result(&request.test_type, value))
}

fn estimated_completion(priority: &str) -> &'static str {
    match priority.to_ascii_lowercase().as_str() {
        "stat" => "10-15 minutes",
        "urgent" => "30-60 minutes",
        _ => "2-4 hours",
    }
}

#[derive(Debug)]
pub struct LabAgent {
    context: AgentContext,
    store: Arc<dyn RecordStore>,
}

impl LabAgent {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_id(LAB_AGENT_ID, store)
    }

    pub fn with_id(agent_id: &str, store: Arc<dyn RecordStore>) -> Self {
        Self {
            context: AgentContext::new(
                agent_id,
                "lab",
                ["receive_lab_orders", "report_lab_results"],
            ),
            store,
        }
    }

    /// The sender of the order is recorded as the ordering doctor.
    async fn process_lab_order(&self, message: &Message) -> Result<Value> {
        if !self.check_permission("receive_lab_orders") {
            return Ok(reply::permission_denied("receive_lab_orders"));
        }
        let order: LabOrder = parse_payload(&message.data)?;
        validate_non_empty(&order.test_type, "test_type")?;
        let priority = order
            .priority
            .unwrap_or_else(|| DEFAULT_PRIORITY.to_string());

        let request = self
            .store
            .create_lab_request(NewLabRequest {
                patient_id: order.patient_id,
                doctor_id: message.from.clone(),
                test_type: order.test_type,
                priority,
            })
            .await?;

        self.context
            .audit_after_commit(
                "order_lab",
                Some(request.patient_id.as_str()),
                &format!(
                    "Order {}: {} ({})",
                    request.request_id, request.test_type, request.priority
                ),
            )
            .await;

        Ok(reply::success(json!({
            "order_id": request.request_id,
            "estimated_completion": estimated_completion(&request.priority),
        })))
    }

    async fn check_order_status(&self, data: &Value) -> Result<Value> {
        let lookup: OrderLookup = parse_payload(data)?;
        match self.store.get_lab_request(&lookup.order_id).await? {
            Some(request) => Ok(reply::success(json!({
                "order_status": request.status,
                "result": request.result,
                "estimated_completion": estimated_completion(&request.priority),
            }))),
            None => Ok(reply::error(format!("Order {} not found", lookup.order_id))),
        }
    }

    async fn get_pending_orders(&self) -> Result<Value> {
        let pending = self.store.pending_lab_requests().await?;
        Ok(reply::success(json!({
            "count": pending.len(),
            "pending_orders": pending,
        })))
    }

    /// Pending orders move to in progress once a technician picks them up.
    async fn start_order(&self, data: &Value) -> Result<Value> {
        if !self.check_permission("report_lab_results") {
            return Ok(reply::permission_denied("report_lab_results"));
        }
        let lookup: OrderLookup = parse_payload(data)?;
        let request = self
            .store
            .update_lab_request(&lookup.order_id, LabStatus::InProgress, None)
            .await?;
        Ok(reply::success(json!({
            "order_id": request.request_id,
            "order_status": request.status,
        })))
    }

    async fn cancel_order(&self, data: &Value) -> Result<Value> {
        if !self.check_permission("receive_lab_orders") {
            return Ok(reply::permission_denied("receive_lab_orders"));
        }
        let lookup: OrderLookup = parse_payload(data)?;
        let request = self
            .store
            .update_lab_request(&lookup.order_id, LabStatus::Cancelled, None)
            .await?;

        self.context
            .audit_after_commit(
                "cancel_lab_order",
                Some(request.patient_id.as_str()),
                &format!("Order {} cancelled", request.request_id),
            )
            .await;

        Ok(reply::success(json!({
            "order_id": request.request_id,
            "order_status": request.status,
        })))
    }

    /// Stores the result and notifies whoever ordered the test. Orders that
    /// are already completed or cancelled are refused.
    async fn complete_order(&self, data: &Value) -> Result<Value> {
        if !self.check_permission("report_lab_results") {
            return Ok(reply::permission_denied("report_lab_results"));
        }
        let completion: OrderCompletion = parse_payload(data)?;
        let request = self
            .store
            .update_lab_request(
                &completion.order_id,
                LabStatus::Completed,
                Some(completion.result),
            )
            .await?;
        let flag = flag_for(&request);
        if let Some(out_of_range @ (ResultFlag::Abnormal | ResultFlag::Critical)) = flag {
            tracing::warn!(
                "order {} for {}: {} result is {:?}",
                request.request_id,
                request.patient_id,
                request.test_type,
                out_of_range
            );
        }

        let delivered = self
            .context
            .send_after_commit(Message::new(
                self.context.agent_id(),
                request.doctor_id.as_str(),
                LAB_RESULTS_READY_ACTION,
                json!({
                    "order_id": request.request_id,
                    "patient_id": request.patient_id,
                    "test_type": request.test_type,
                    "result": request.result,
                    "flag": flag,
                }),
            ))
            .await;
        let notified = delivered.then(|| request.doctor_id.clone());
        self.context
            .audit_after_commit(
                "lab_result_sent",
                Some(request.patient_id.as_str()),
                &format!("{} results sent to {}", request.test_type, request.doctor_id),
            )
            .await;

        Ok(reply::success(json!({
            "order_id": request.request_id,
            "flag": flag,
            "notified": notified,
        })))
    }
}

#[async_trait]
impl Agent for LabAgent {
    fn context(&self) -> &AgentContext {
        &self.context
    }

    async fn process_message(&self, message: Message) -> Value {
        let Some(action) = parse_action::<LabAction>(&message.action) else {
            return reply::unsupported(&message.action);
        };
        let outcome = match action {
            LabAction::ProcessLabOrder => self.process_lab_order(&message).await,
            LabAction::CheckOrderStatus => self.check_order_status(&message.data).await,
            LabAction::GetPendingOrders => self.get_pending_orders().await,
            LabAction::StartOrder => self.start_order(&message.data).await,
            LabAction::CancelOrder => self.cancel_order(&message.data).await,
            LabAction::CompleteOrder => self.complete_order(&message.data).await,
        };
        outcome.unwrap_or_else(|e| reply::error(e.to_string()))
    }
}
