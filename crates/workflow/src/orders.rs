//! Checkout and the order lifecycle.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Money, OrderId, Page, PageRequest, UserId};
use domain::{
    Address, CartOwner, CheckoutDraft, CouponError, Order, OrderLine, OrderNumber, OrderStatus,
    PaymentStatus, Transition,
};
use serde::{Deserialize, Serialize};
use store::{OrderQuery, Store, StoreError};

use crate::error::{Result, WorkflowError};
use crate::payments::call_provider;
use crate::services::PaymentGateway;
use crate::settings::WorkflowSettings;

/// Checkout details supplied by the customer. Items and prices come from
/// the stored cart, never from the request.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckoutRequest {
    pub shipping_address: Address,
    #[serde(default)]
    pub billing_address: Option<Address>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Public tracking view of an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OrderTracking {
    pub order_number: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub tracking_number: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Order operations for customers and admins.
#[derive(Clone)]
pub struct OrderService {
    store: Arc<dyn Store>,
    gateway: Arc<dyn PaymentGateway>,
    settings: Arc<WorkflowSettings>,
}

impl OrderService {
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

    /// Turns the user's cart into a `pending` order.
    ///
    /// Stock is checked but not taken; it moves when the payment settles.
    /// The order insert, coupon redemption and cart reset commit together.
    #[tracing::instrument(skip(self, request))]
    pub async fn create_order(&self, user_id: UserId, request: CheckoutRequest) -> Result<Order> {
        let owner = CartOwner::User(user_id);
        let cart = match self.store.get_cart(&owner).await? {
            Some(cart) if !cart.is_empty() => cart,
            _ => return Err(WorkflowError::invalid("cart", "cart is empty")),
        };

        let ids: Vec<_> = cart.items.iter().map(|i| i.product_id).collect();
        let products: HashMap<_, _> = self
            .store
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut lines = Vec::with_capacity(cart.items.len());
        for item in &cart.items {
            let product = products
                .get(&item.product_id)
                .ok_or_else(|| WorkflowError::OutOfStock {
                    product: item.product_id.to_string(),
                })?;
            if !product.can_fulfill(item.quantity) {
                return Err(WorkflowError::OutOfStock {
                    product: product.name.clone(),
                });
            }
            lines.push(OrderLine::new(
                product.id,
                item.variant.clone(),
                product.name.clone(),
                product.primary_image().map(str::to_string),
                item.quantity,
                item.unit_price,
            ));
        }

        let now = Utc::now();
        let coupon_discount = match &cart.coupon_code {
            Some(code) => {
                let coupon = self
                    .store
                    .find_coupon_by_code(code)
                    .await?
                    .ok_or(CouponError::InvalidCode)?;
                coupon.validate(cart.subtotal(), now)?
            }
            None => Money::zero(),
        };

        let draft = CheckoutDraft {
            user_id,
            lines,
            shipping_address: request.shipping_address,
            billing_address: request.billing_address,
            notes: request.notes,
            coupon_code: cart.coupon_code.clone(),
            coupon_discount,
            currency: self.settings.currency.clone(),
        };

        let attempts = self.settings.order_number_attempts.max(1);
        for attempt in 1..=attempts {
            let order = Order::place(
                draft.clone(),
                &self.settings.pricing,
                OrderNumber::generate(now),
                now,
            )?;

            match self.store.commit_checkout(order, &owner).await {
                Ok(order) => {
                    metrics::counter!("orders_created_total").increment(1);
                    tracing::info!(
                        order_number = %order.order_number,
                        total = %order.total,
                        items = order.total_items(),
                        "order created"
                    );
                    return Ok(order);
                }
                Err(StoreError::Duplicate { entity: "order", key }) if attempt < attempts => {
                    tracing::debug!(%key, attempt, "order number collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(WorkflowError::Conflict(
            "could not allocate a unique order number".to_string(),
        ))
    }

    /// An order the caller owns. Other users' orders read as missing.
    pub async fn get_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .filter(|o| o.user_id == user_id)
            .ok_or_else(|| WorkflowError::not_found("order", order_id))
    }

    pub async fn list_orders(&self, user_id: UserId, page: PageRequest) -> Result<Page<Order>> {
        self.list_all(OrderQuery::for_user(user_id), page).await
    }

    pub async fn track_order(&self, user_id: UserId, order_id: OrderId) -> Result<OrderTracking> {
        let order = self.get_order(user_id, order_id).await?;
        Ok(OrderTracking {
            order_number: order.order_number.to_string(),
            status: order.status,
            payment_status: order.payment_status,
            tracking_number: order.tracking_number,
            created_at: order.created_at,
            updated_at: order.updated_at,
        })
    }

    /// Cancels an order the caller owns.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, user_id: UserId, order_id: OrderId) -> Result<Order> {
        let order = self.get_order(user_id, order_id).await?;
        let transition = order
            .plan(OrderStatus::Cancelled)?
            .performed_by(Some(user_id));
        self.apply(transition).await
    }

    // -- Admin --

    pub async fn list_all(&self, query: OrderQuery, page: PageRequest) -> Result<Page<Order>> {
        let (items, total) = self.store.list_orders(&query.page(page)).await?;
        Ok(Page::new(items, page, total))
    }

    pub async fn get_any(&self, order_id: OrderId) -> Result<Order> {
        self.store
            .get_order(order_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("order", order_id))
    }

    /// Drives the state machine on behalf of an admin.
    #[tracing::instrument(skip(self))]
    pub async fn update_status(
        &self,
        order_id: OrderId,
        target: OrderStatus,
        admin: UserId,
    ) -> Result<Order> {
        let order = self.get_any(order_id).await?;
        let transition = order.plan(target)?.performed_by(Some(admin));

        if target == OrderStatus::Refunded {
            return self.refund(&order, transition).await;
        }
        self.apply(transition).await
    }

    /// Claims the payment as `refunding` before the provider is called, so
    /// a second refund fails the claim instead of reaching the provider.
    /// Once the money has moved the payment always ends `refunded`, even if
    /// a cancellation won the status race in the meantime.
    async fn refund(&self, order: &Order, transition: Transition) -> Result<Order> {
        let intent_id = order.payment_intent_id.as_deref().ok_or_else(|| {
            WorkflowError::BadRequest(format!(
                "Order {} has no payment to refund",
                order.order_number
            ))
        })?;

        self.store
            .update_payment_status(order.id, &[PaymentStatus::Paid], PaymentStatus::Refunding)
            .await
            .map_err(|err| match err {
                StoreError::StatusConflict { .. } => WorkflowError::Conflict(format!(
                    "Order {} already has a refund in progress",
                    order.order_number
                )),
                other => other.into(),
            })?;

        let refunded = call_provider(
            self.settings.payment_timeout,
            "refund",
            self.gateway.refund(intent_id, order.total),
        )
        .await;
        let refund_id = match refunded {
            Ok(refund_id) => refund_id,
            Err(err) => {
                self.store
                    .update_payment_status(
                        order.id,
                        &[PaymentStatus::Refunding],
                        PaymentStatus::Paid,
                    )
                    .await?;
                return Err(err);
            }
        };
        tracing::info!(order_number = %order.order_number, %refund_id, "payment refunded");

        match self.apply(transition).await {
            Ok(order) => Ok(order),
            Err(err) => {
                let order = self
                    .store
                    .update_payment_status(
                        order.id,
                        &[PaymentStatus::Refunding],
                        PaymentStatus::Refunded,
                    )
                    .await?;
                tracing::warn!(
                    order_number = %order.order_number,
                    status = %order.status,
                    %refund_id,
                    error = %err,
                    "order moved during refund, payment recorded as refunded"
                );
                Err(err)
            }
        }
    }

    #[tracing::instrument(skip(self))]
    pub async fn set_tracking(&self, order_id: OrderId, tracking_number: &str) -> Result<Order> {
        let tracking_number = tracking_number.trim();
        if tracking_number.is_empty() {
            return Err(WorkflowError::invalid("tracking_number", "is required"));
        }
        Ok(self
            .store
            .set_tracking_number(order_id, tracking_number)
            .await?)
    }

    async fn apply(&self, transition: Transition) -> Result<Order> {
        let outcome = self.store.apply_transition(&transition).await?;
        match transition.to {
            OrderStatus::Confirmed => metrics::counter!("orders_confirmed_total").increment(1),
            OrderStatus::Cancelled => metrics::counter!("orders_cancelled_total").increment(1),
            OrderStatus::Refunded => metrics::counter!("orders_refunded_total").increment(1),
            _ => {}
        }
        tracing::info!(
            order_number = %transition.order_number,
            from = %transition.from,
            to = %transition.to,
            stock_entries = outcome.ledger_entries.len(),
            "order status changed"
        );
        Ok(outcome.order)
    }
}
