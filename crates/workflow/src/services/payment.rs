//! Payment gateway trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Money;
use serde::{Deserialize, Serialize};

use super::signature::WebhookSigner;
use crate::error::WorkflowError;

/// Provider-side status of a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    RequiresConfirmation,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

/// A chargeable intent issued by the payment provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
    pub amount: Money,
    pub currency: String,
    pub status: IntentStatus,
}

/// What a verified notification reports.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NotificationKind {
    Succeeded,
    Failed,
    Canceled,
    /// Any event type the storefront does not act on.
    Other(String),
}

/// A parsed payment notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotification {
    pub event_id: String,
    pub kind: NotificationKind,
    pub intent_id: Option<String>,
}

/// Trait for payment provider operations.
///
/// Amounts always come from the stored order; the gateway never trusts a
/// client-supplied figure.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Creates a payment intent for `amount`.
    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        order_reference: &str,
    ) -> Result<PaymentIntent, WorkflowError>;

    /// Looks up an intent.
    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, WorkflowError>;

    /// Confirms an intent with a payment method and returns the new status.
    async fn confirm_intent(
        &self,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<IntentStatus, WorkflowError>;

    /// Refunds `amount` of a settled intent. Returns the refund id.
    async fn refund(&self, intent_id: &str, amount: Money) -> Result<String, WorkflowError>;

    /// Checks a notification signature header.
    fn verify_signature(&self, payload: &[u8], signature: &str, now: DateTime<Utc>) -> bool;

    /// Parses a verified notification payload.
    fn parse_notification(&self, payload: &[u8]) -> Result<PaymentNotification, WorkflowError>;
}

/// Wire shape of a notification: `{"id", "type", "data": {"object": {"id"}}}`.
#[derive(Debug, Serialize, Deserialize)]
struct EventEnvelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: EventData,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct EventData {
    #[serde(default)]
    object: Option<EventObject>,
}

#[derive(Debug, Serialize, Deserialize)]
struct EventObject {
    id: String,
}

pub const EVENT_SUCCEEDED: &str = "payment_intent.succeeded";
pub const EVENT_FAILED: &str = "payment_intent.payment_failed";
pub const EVENT_CANCELED: &str = "payment_intent.canceled";

/// Parses the provider's notification envelope.
pub fn parse_event(payload: &[u8]) -> Result<PaymentNotification, WorkflowError> {
    let envelope: EventEnvelope = serde_json::from_slice(payload)
        .map_err(|e| WorkflowError::BadRequest(format!("malformed notification: {e}")))?;

    let kind = match envelope.event_type.as_str() {
        EVENT_SUCCEEDED => NotificationKind::Succeeded,
        EVENT_FAILED => NotificationKind::Failed,
        EVENT_CANCELED => NotificationKind::Canceled,
        _ => NotificationKind::Other(envelope.event_type),
    };

    Ok(PaymentNotification {
        event_id: envelope.id,
        kind,
        intent_id: envelope.data.object.map(|o| o.id),
    })
}

/// Builds a notification payload in the provider's wire format.
pub fn event_payload(event_id: &str, event_type: &str, intent_id: &str) -> String {
    serde_json::json!({
        "id": event_id,
        "type": event_type,
        "data": { "object": { "id": intent_id } },
    })
    .to_string()
}

#[derive(Debug, Clone)]
struct IntentRecord {
    intent: PaymentIntent,
    order_reference: String,
    refunded: Money,
}

#[derive(Debug, Default)]
struct InMemoryPaymentState {
    intents: HashMap<String, IntentRecord>,
    refunds: Vec<(String, String, Money)>,
    next_id: u32,
    fail_on_create: bool,
    fail_on_confirm: bool,
    fail_on_refund: bool,
    latency: Option<Duration>,
}

/// In-memory payment gateway for tests and local runs.
///
/// Intent ids are sequential (`pi_0001`). Confirming with the payment
/// method `pm_card_declined` fails the intent.
#[derive(Debug, Clone)]
pub struct InMemoryPaymentGateway {
    state: Arc<RwLock<InMemoryPaymentState>>,
    signer: WebhookSigner,
}

pub const DECLINED_PAYMENT_METHOD: &str = "pm_card_declined";

impl InMemoryPaymentGateway {
    /// Creates a gateway that signs notifications with `webhook_secret`.
    pub fn new(webhook_secret: impl Into<String>) -> Self {
        Self {
            state: Arc::default(),
            signer: WebhookSigner::new(webhook_secret),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, InMemoryPaymentState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryPaymentState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    /// Configures the gateway to fail intent creation.
    pub fn set_fail_on_create(&self, fail: bool) {
        self.write().fail_on_create = fail;
    }

    /// Configures the gateway to fail confirmations.
    pub fn set_fail_on_confirm(&self, fail: bool) {
        self.write().fail_on_confirm = fail;
    }

    /// Configures the gateway to fail refunds.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().fail_on_refund = fail;
    }

    /// Adds an artificial delay to every call.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.write().latency = latency;
    }

    /// Returns the number of intents issued.
    pub fn intent_count(&self) -> usize {
        self.read().intents.len()
    }

    /// Returns the number of refunds issued.
    pub fn refund_count(&self) -> usize {
        self.read().refunds.len()
    }

    /// Order reference an intent was created for.
    pub fn order_reference(&self, intent_id: &str) -> Option<String> {
        self.read()
            .intents
            .get(intent_id)
            .map(|r| r.order_reference.clone())
    }

    /// Signs `payload` the way the provider signs notifications.
    pub fn sign(&self, payload: &[u8], timestamp: i64) -> Result<String, WorkflowError> {
        self.signer
            .sign(payload, timestamp)
            .map_err(|e| WorkflowError::PaymentProvider(e.to_string()))
    }

    async fn simulate_latency(&self) {
        let latency = self.read().latency;
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
    }

    fn record(&self, intent_id: &str) -> Result<IntentRecord, WorkflowError> {
        self.read()
            .intents
            .get(intent_id)
            .cloned()
            .ok_or_else(|| WorkflowError::not_found("payment intent", intent_id))
    }
}

impl Default for InMemoryPaymentGateway {
    fn default() -> Self {
        Self::new("whsec_test")
    }
}

#[async_trait]
impl PaymentGateway for InMemoryPaymentGateway {
    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        order_reference: &str,
    ) -> Result<PaymentIntent, WorkflowError> {
        self.simulate_latency().await;
        let mut state = self.write();

        if state.fail_on_create {
            return Err(WorkflowError::PaymentProvider(
                "Payment provider unavailable".to_string(),
            ));
        }

        state.next_id += 1;
        let id = format!("pi_{:04}", state.next_id);
        let intent = PaymentIntent {
            client_secret: format!("{id}_secret_{}", state.next_id),
            id: id.clone(),
            amount,
            currency: currency.to_string(),
            status: IntentStatus::RequiresPaymentMethod,
        };
        state.intents.insert(
            id,
            IntentRecord {
                intent: intent.clone(),
                order_reference: order_reference.to_string(),
                refunded: Money::zero(),
            },
        );

        Ok(intent)
    }

    async fn retrieve_intent(&self, intent_id: &str) -> Result<PaymentIntent, WorkflowError> {
        self.simulate_latency().await;
        Ok(self.record(intent_id)?.intent)
    }

    async fn confirm_intent(
        &self,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<IntentStatus, WorkflowError> {
        self.simulate_latency().await;
        let mut state = self.write();

        if state.fail_on_confirm {
            return Err(WorkflowError::PaymentProvider(
                "Payment provider unavailable".to_string(),
            ));
        }

        let record = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| WorkflowError::not_found("payment intent", intent_id))?;
        record.intent.status = if payment_method == DECLINED_PAYMENT_METHOD {
            IntentStatus::Failed
        } else {
            IntentStatus::Succeeded
        };

        Ok(record.intent.status)
    }

    async fn refund(&self, intent_id: &str, amount: Money) -> Result<String, WorkflowError> {
        self.simulate_latency().await;
        let mut state = self.write();

        if state.fail_on_refund {
            return Err(WorkflowError::PaymentProvider("Refund failed".to_string()));
        }

        let record = state
            .intents
            .get_mut(intent_id)
            .ok_or_else(|| WorkflowError::not_found("payment intent", intent_id))?;
        if record.refunded + amount > record.intent.amount {
            return Err(WorkflowError::PaymentProvider(
                "Refund exceeds captured amount".to_string(),
            ));
        }
        record.refunded += amount;

        let refund_id = format!("re_{:04}", state.refunds.len() + 1);
        state
            .refunds
            .push((refund_id.clone(), intent_id.to_string(), amount));
        Ok(refund_id)
    }

    fn verify_signature(&self, payload: &[u8], signature: &str, now: DateTime<Utc>) -> bool {
        match self.signer.verify(payload, signature, now) {
            Ok(()) => true,
            Err(reason) => {
                tracing::debug!(%reason, "payment notification rejected");
                false
            }
        }
    }

    fn parse_notification(&self, payload: &[u8]) -> Result<PaymentNotification, WorkflowError> {
        parse_event(payload)
    }
}
