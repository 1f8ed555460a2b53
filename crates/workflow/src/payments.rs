//! Payment intents and reconciliation of provider notifications.
//!
//! Order confirmation is driven by the signed success notification, never
//! by the client. The notification flips the payment status, the order
//! status and the stock in one store transition, so a duplicate delivery
//! finds the order already confirmed and does nothing.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use common::{Money, OrderId, UserId};
use domain::{Order, OrderStatus, PaymentStatus};
use serde::Serialize;
use store::{Store, StoreError};

use crate::error::{Result, WorkflowError};
use crate::services::{IntentStatus, NotificationKind, PaymentGateway, PaymentIntent};
use crate::settings::WorkflowSettings;

/// Runs a payment provider call under `timeout` and records its latency.
pub(crate) async fn call_provider<T, F>(
    timeout: Duration,
    operation: &'static str,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    let start = Instant::now();
    let result = tokio::time::timeout(timeout, call).await;
    metrics::histogram!("payment_call_duration_seconds", "operation" => operation)
        .record(start.elapsed().as_secs_f64());

    match result {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!(operation, ?timeout, "payment provider call timed out");
            Err(WorkflowError::PaymentProvider(format!(
                "{operation} timed out after {}ms",
                timeout.as_millis()
            )))
        }
    }
}

/// Result of confirming an intent with a payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmOutcome {
    pub intent_id: String,
    pub status: IntentStatus,
}

/// Payment fields of an order, as shown to its owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentSummary {
    pub order_id: OrderId,
    pub order_number: String,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub total: Money,
    pub currency: String,
}

impl From<&Order> for PaymentSummary {
    fn from(order: &Order) -> Self {
        Self {
            order_id: order.id,
            order_number: order.order_number.to_string(),
            payment_status: order.payment_status,
            payment_intent_id: order.payment_intent_id.clone(),
            total: order.total,
            currency: order.currency.clone(),
        }
    }
}

/// What a verified notification did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    /// The order moved to `confirmed` and its stock was taken.
    Confirmed { order_id: OrderId },
    /// The order was already past `pending`; nothing changed.
    AlreadyProcessed { order_id: OrderId },
    /// Payment settled for a cancelled order and needs a manual refund.
    PaidAfterCancellation { order_id: OrderId },
    /// The payment was recorded as failed.
    MarkedFailed { order_id: OrderId },
    /// Unknown intent, settled payment or unhandled event type.
    Ignored,
}

impl WebhookOutcome {
    fn label(&self) -> &'static str {
        match self {
            WebhookOutcome::Confirmed { .. } => "confirmed",
            WebhookOutcome::AlreadyProcessed { .. } => "already_processed",
            WebhookOutcome::PaidAfterCancellation { .. } => "paid_after_cancellation",
            WebhookOutcome::MarkedFailed { .. } => "marked_failed",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

/// Payment operations.
#[derive(Clone)]
pub struct PaymentService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    settings: Arc<WorkflowSettings>,
}

impl PaymentService {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        settings: Arc<WorkflowSettings>,
    ) -> Self {
        Self {
            store,
            gateway,
            settings,
        }
    }

    async fn own_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| WorkflowError::not_found("order", order_id))
    }

    /// Creates a payment intent for the stored total of a pending order.
    ///
    /// An intent already attached to the order is returned again while the
    /// provider still considers it payable, so repeated calls never leave a
    /// second live intent behind.
    #[tracing::instrument(skip(self))]
    pub async fn create_intent(&self, user_id: UserId, order_id: OrderId) -> Result<PaymentIntent> {
        let order = self.own_order(user_id, order_id).await?;
        if order.status != OrderStatus::Pending {
            return Err(WorkflowError::BadRequest(format!(
                "Order {} is {}; only pending orders can be paid",
                order.order_number, order.status
            )));
        }
        if order.payment_status == PaymentStatus::Paid {
            return Err(WorkflowError::BadRequest("Order is already paid".to_string()));
        }

        if let Some(existing) = self.reusable_intent(&order).await? {
            tracing::debug!(
                order_number = %order.order_number,
                intent_id = %existing.id,
                "reusing open payment intent"
            );
            return Ok(existing);
        }

        let intent = call_provider(
            self.settings.payment_timeout,
            "create_intent",
            self.gateway
                .create_intent(order.total, &order.currency, order.order_number.as_str()),
        )
        .await?;

        let current = order.payment_intent_id.as_deref();
        match self
            .store
            .attach_payment_intent(order.id, current, &intent.id)
            .await
        {
            Ok(_) => {}
            // A concurrent request attached its intent first; hand out that one.
            Err(StoreError::StatusConflict { .. }) => {
                let latest = self.own_order(user_id, order_id).await?;
                if let Some(winner) = self.reusable_intent(&latest).await? {
                    tracing::warn!(
                        order_number = %order.order_number,
                        discarded = %intent.id,
                        intent_id = %winner.id,
                        "concurrent payment intent creation"
                    );
                    return Ok(winner);
                }
                return Err(WorkflowError::Conflict(format!(
                    "Order {} changed while creating its payment intent",
                    order.order_number
                )));
            }
            Err(e) => return Err(e.into()),
        }

        tracing::info!(
            order_number = %order.order_number,
            intent_id = %intent.id,
            amount = %order.total,
            "payment intent created"
        );
        Ok(intent)
    }

    /// The order's attached intent, if the provider can still settle it for
    /// the order's current total.
    async fn reusable_intent(&self, order: &Order) -> Result<Option<PaymentIntent>> {
        let Some(intent_id) = order.payment_intent_id.as_deref() else {
            return Ok(None);
        };
        let intent = call_provider(
            self.settings.payment_timeout,
            "retrieve_intent",
            self.gateway.retrieve_intent(intent_id),
        )
        .await?;

        let open = matches!(
            intent.status,
            IntentStatus::RequiresPaymentMethod
                | IntentStatus::RequiresConfirmation
                | IntentStatus::Processing
                | IntentStatus::Succeeded
        );
        let same_amount = intent.amount == order.total
            && intent.currency.eq_ignore_ascii_case(&order.currency);
        Ok((open && same_amount).then_some(intent))
    }

    /// Confirms an intent with a payment method. The order itself only moves
    /// when the provider's notification arrives.
    #[tracing::instrument(skip(self))]
    pub async fn confirm(
        &self,
        user_id: UserId,
        intent_id: &str,
        payment_method: &str,
    ) -> Result<ConfirmOutcome> {
        let order = self
            .store
            .find_order_by_payment_intent(intent_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| WorkflowError::not_found("payment intent", intent_id))?;

        let timeout = self.settings.payment_timeout;
        let intent = call_provider(
            timeout,
            "retrieve_intent",
            self.gateway.retrieve_intent(intent_id),
        )
        .await?;
        if intent.status == IntentStatus::Succeeded {
            return Err(WorkflowError::BadRequest(
                "Payment already confirmed".to_string(),
            ));
        }

        let status = call_provider(
            timeout,
            "confirm_intent",
            self.gateway.confirm_intent(intent_id, payment_method),
        )
        .await?;

        tracing::info!(
            order_number = %order.order_number,
            intent_id,
            ?status,
            "payment intent confirmed"
        );
        Ok(ConfirmOutcome {
            intent_id: intent_id.to_string(),
            status,
        })
    }

    pub async fn payment_status(
        &self,
        user_id: UserId,
        order_id: OrderId,
    ) -> Result<PaymentSummary> {
        let order = self.own_order(user_id, order_id).await?;
        Ok(PaymentSummary::from(&order))
    }

    /// Verifies and applies a provider notification.
    ///
    /// Safe under at-least-once delivery. An error leaves the store
    /// untouched and asks the provider to redeliver.
    #[tracing::instrument(skip(self, payload, signature))]
    pub async fn handle_webhook(
        &self,
        payload: &[u8],
        signature: &str,
        now: DateTime<Utc>,
    ) -> Result<WebhookOutcome> {
        if !self.gateway.verify_signature(payload, signature, now) {
            metrics::counter!("payment_webhooks_total", "outcome" => "invalid_signature")
                .increment(1);
            return Err(WorkflowError::InvalidSignature);
        }
        let notification = self.gateway.parse_notification(payload)?;

        let outcome = match (&notification.kind, notification.intent_id.as_deref()) {
            (NotificationKind::Other(event_type), _) => {
                tracing::info!(
                    event_id = %notification.event_id,
                    %event_type,
                    "unhandled payment event"
                );
                WebhookOutcome::Ignored
            }
            (_, None) => {
                tracing::warn!(event_id = %notification.event_id, "payment event without intent");
                WebhookOutcome::Ignored
            }
            (kind, Some(intent_id)) => {
                match self.store.find_order_by_payment_intent(intent_id).await? {
                    None => {
                        tracing::warn!(intent_id, "payment event for unknown intent");
                        WebhookOutcome::Ignored
                    }
                    Some(order) => match kind {
                        NotificationKind::Succeeded => self.payment_succeeded(order).await?,
                        _ => self.payment_failed(order).await?,
                    },
                }
            }
        };

        metrics::counter!("payment_webhooks_total", "outcome" => outcome.label()).increment(1);
        Ok(outcome)
    }

    async fn payment_succeeded(&self, order: Order) -> Result<WebhookOutcome> {
        match order.status {
            OrderStatus::Pending => {}
            OrderStatus::Cancelled => return self.paid_after_cancellation(order).await,
            _ => {
                tracing::debug!(order_number = %order.order_number, "duplicate payment success");
                return Ok(WebhookOutcome::AlreadyProcessed { order_id: order.id });
            }
        }

        let transition = order
            .plan(OrderStatus::Confirmed)?
            .with_payment_status(PaymentStatus::Paid);

        match self.store.apply_transition(&transition).await {
            Ok(outcome) => {
                metrics::counter!("orders_confirmed_total").increment(1);
                tracing::info!(
                    order_number = %order.order_number,
                    lines = outcome.ledger_entries.len(),
                    "order confirmed by payment"
                );
                Ok(WebhookOutcome::Confirmed { order_id: order.id })
            }
            // A concurrent delivery won the compare-and-set.
            Err(StoreError::StatusConflict { .. }) => {
                let current = self
                    .store
                    .get_order(order.id)
                    .await?
                    .ok_or_else(|| WorkflowError::not_found("order", order.id))?;
                match current.status {
                    OrderStatus::Cancelled => self.paid_after_cancellation(current).await,
                    OrderStatus::Pending => Err(WorkflowError::Conflict(format!(
                        "Order {} changed during confirmation",
                        current.order_number
                    ))),
                    _ => Ok(WebhookOutcome::AlreadyProcessed { order_id: order.id }),
                }
            }
            Err(e) => {
                tracing::error!(
                    order_number = %order.order_number,
                    error = %e,
                    "payment settled but order could not be confirmed"
                );
                Err(e.into())
            }
        }
    }

    async fn paid_after_cancellation(&self, order: Order) -> Result<WebhookOutcome> {
        if order.payment_status != PaymentStatus::Paid {
            self.store
                .update_payment_status(
                    order.id,
                    &[PaymentStatus::Pending, PaymentStatus::Failed],
                    PaymentStatus::Paid,
                )
                .await?;
        }
        tracing::warn!(
            order_number = %order.order_number,
            intent_id = ?order.payment_intent_id,
            "payment settled for a cancelled order; refund manually"
        );
        Ok(WebhookOutcome::PaidAfterCancellation { order_id: order.id })
    }

    async fn payment_failed(&self, order: Order) -> Result<WebhookOutcome> {
        if !order.payment_status.can_mark_failed() {
            tracing::info!(
                order_number = %order.order_number,
                payment_status = %order.payment_status,
                "failure notification for a settled payment ignored"
            );
            return Ok(WebhookOutcome::Ignored);
        }

        match self
            .store
            .update_payment_status(
                order.id,
                &[PaymentStatus::Pending, PaymentStatus::Failed],
                PaymentStatus::Failed,
            )
            .await
        {
            Ok(_) => {
                tracing::info!(order_number = %order.order_number, "payment failed");
                Ok(WebhookOutcome::MarkedFailed { order_id: order.id })
            }
            // Settled in the meantime.
            Err(StoreError::StatusConflict { .. }) => Ok(WebhookOutcome::Ignored),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn slow_provider_call_times_out() {
        let result: Result<()> = call_provider(Duration::from_millis(10), "create_intent", async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok(())
        })
        .await;

        let err = result.unwrap_err();
        assert!(matches!(err, WorkflowError::PaymentProvider(_)));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn provider_errors_pass_through() {
        let result: Result<()> = call_provider(Duration::from_secs(1), "refund", async {
            Err(WorkflowError::PaymentProvider("declined".into()))
        })
        .await;
        assert!(matches!(result, Err(WorkflowError::PaymentProvider(m)) if m == "declined"));
    }

    #[test]
    fn outcome_serializes_with_tag() {
        let id = OrderId::new();
        let json = serde_json::to_value(WebhookOutcome::Confirmed { order_id: id }).unwrap();
        assert_eq!(json["outcome"], "confirmed");
        assert_eq!(json["order_id"], id.to_string());
    }
}
