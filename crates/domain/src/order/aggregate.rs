//! The order record and its transitions.

use chrono::{DateTime, Utc};
use common::{Money, OrderId, ProductId, UserId};
use serde::{Deserialize, Serialize};

use super::{
    Address, OrderError, OrderLine, OrderNumber, OrderStatus, PaymentStatus, PricingPolicy,
    StockEffect,
};
use crate::error::{DomainError, Validator};
use crate::inventory::{ReferenceType, StockAdjustment, StockChange};

const MAX_NOTES_LEN: usize = 1000;

/// Everything checkout collects before an order is priced and numbered.
#[derive(Debug, Clone)]
pub struct CheckoutDraft {
    pub user_id: UserId,
    pub lines: Vec<OrderLine>,
    pub shipping_address: Address,
    pub billing_address: Option<Address>,
    pub notes: Option<String>,
    pub coupon_code: Option<String>,
    pub coupon_discount: Money,
    pub currency: String,
}

impl CheckoutDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.lines.is_empty() {
            return Err(OrderError::NoItems.into());
        }
        self.shipping_address.validate()?;
        if let Some(billing) = &self.billing_address {
            billing.validate()?;
        }
        Validator::default()
            .check(
                self.lines.iter().all(|l| l.quantity > 0),
                "items",
                "quantity must be at least 1",
            )
            .check(
                self.notes
                    .as_ref()
                    .is_none_or(|n| n.chars().count() <= MAX_NOTES_LEN),
                "notes",
                "cannot exceed 1000 characters",
            )
            .finish()
    }
}

/// A placed order.
///
/// Lines, amounts and addresses are fixed at creation. Only the status
/// pair, the payment reference and the tracking number change afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub order_number: OrderNumber,
    pub user_id: UserId,
    pub items: Vec<OrderLine>,
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_status: PaymentStatus,
    pub payment_intent_id: Option<String>,
    pub shipping_address: Address,
    pub billing_address: Address,
    pub tracking_number: Option<String>,
    pub notes: Option<String>,
    pub coupon_code: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Prices a validated checkout and creates the order in `pending`.
    pub fn place(
        draft: CheckoutDraft,
        pricing: &PricingPolicy,
        order_number: OrderNumber,
        now: DateTime<Utc>,
    ) -> Result<Self, DomainError> {
        draft.validate()?;
        let totals = pricing.totals(&draft.lines, draft.coupon_discount);
        let billing_address = draft
            .billing_address
            .unwrap_or_else(|| draft.shipping_address.clone());

        Ok(Self {
            id: OrderId::new(),
            order_number,
            user_id: draft.user_id,
            items: draft.lines,
            subtotal: totals.subtotal,
            shipping_cost: totals.shipping_cost,
            tax: totals.tax,
            discount: totals.discount,
            total: totals.total,
            currency: draft.currency,
            status: OrderStatus::Pending,
            payment_status: PaymentStatus::Pending,
            payment_intent_id: None,
            shipping_address: draft.shipping_address,
            billing_address,
            tracking_number: None,
            notes: draft.notes,
            coupon_code: draft.coupon_code,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn total_items(&self) -> u32 {
        self.items.iter().map(|l| l.quantity).sum()
    }

    /// Plans a move to `target` from the current status.
    pub fn plan(&self, target: OrderStatus) -> Result<Transition, OrderError> {
        let stock_effect = self.status.plan_transition(target, self.payment_status)?;
        let payment_status = match target {
            OrderStatus::Refunded => Some(PaymentStatus::Refunded),
            _ => None,
        };
        Ok(Transition {
            order_id: self.id,
            order_number: self.order_number.clone(),
            from: self.status,
            to: target,
            stock_effect,
            payment_status,
            performed_by: None,
        })
    }

    /// Applies a planned transition to this in-memory copy.
    pub fn apply(&mut self, transition: &Transition, now: DateTime<Utc>) {
        self.status = transition.to;
        if let Some(payment_status) = transition.payment_status {
            self.payment_status = payment_status;
        }
        self.updated_at = now;
    }

    /// Stock changes implied by a transition, one per line.
    pub fn stock_changes(&self, transition: &Transition) -> Vec<(ProductId, StockChange)> {
        let adjustment: fn(u32) -> StockAdjustment = match transition.stock_effect {
            StockEffect::None => return Vec::new(),
            StockEffect::Decrement => StockAdjustment::Out,
            StockEffect::Restore => StockAdjustment::In,
        };
        let reason = transition.ledger_reason();
        self.items
            .iter()
            .map(|line| {
                let change = StockChange::new(adjustment(line.quantity), reason.clone())
                    .reference(transition.reference_type(), self.id.to_string())
                    .performed_by(transition.performed_by);
                (line.product_id, change)
            })
            .collect()
    }
}

/// A validated status change, carried to the store to be applied
/// atomically with its stock effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub order_id: OrderId,
    pub order_number: OrderNumber,
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub stock_effect: StockEffect,
    pub payment_status: Option<PaymentStatus>,
    pub performed_by: Option<UserId>,
}

impl Transition {
    pub fn with_payment_status(mut self, payment_status: PaymentStatus) -> Self {
        self.payment_status = Some(payment_status);
        self
    }

    pub fn performed_by(mut self, user: Option<UserId>) -> Self {
        self.performed_by = user;
        self
    }

    pub fn reference_type(&self) -> ReferenceType {
        match self.to {
            OrderStatus::Refunded => ReferenceType::Return,
            _ => ReferenceType::Order,
        }
    }

    pub fn ledger_reason(&self) -> String {
        format!("Order {} {}", self.order_number, self.to)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inventory::StockAdjustment;

    fn address() -> Address {
        Address {
            street: "1 Main St".into(),
            city: "Springfield".into(),
            state: "IL".into(),
            zip_code: "62701".into(),
            country: "US".into(),
            phone: "555-0100".into(),
        }
    }

    fn draft(lines: Vec<OrderLine>) -> CheckoutDraft {
        CheckoutDraft {
            user_id: UserId::new(),
            lines,
            shipping_address: address(),
            billing_address: None,
            notes: None,
            coupon_code: None,
            coupon_discount: Money::zero(),
            currency: "usd".into(),
        }
    }

    fn order() -> Order {
        let lines = vec![OrderLine::new(
            ProductId::new(),
            None,
            "Lamp",
            None,
            2,
            Money::from_cents(2500),
        )];
        Order::place(
            draft(lines),
            &PricingPolicy::default(),
            OrderNumber::generate(Utc::now()),
            Utc::now(),
        )
        .unwrap()
    }

    #[test]
    fn place_prices_server_side_and_defaults_billing() {
        let order = order();
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.subtotal, Money::from_cents(5000));
        assert_eq!(order.tax, Money::from_cents(500));
        assert_eq!(order.total, Money::from_cents(5500));
        assert_eq!(order.billing_address, order.shipping_address);
        assert_eq!(order.total_items(), 2);
    }

    #[test]
    fn place_rejects_empty_checkout() {
        let err = Order::place(
            draft(vec![]),
            &PricingPolicy::default(),
            OrderNumber::generate(Utc::now()),
            Utc::now(),
        )
        .unwrap_err();
        assert!(matches!(err, DomainError::Order(OrderError::NoItems)));
    }

    #[test]
    fn confirm_plans_one_out_change_per_line() {
        let order = order();
        let transition = order
            .plan(OrderStatus::Confirmed)
            .unwrap()
            .with_payment_status(PaymentStatus::Paid);
        let changes = order.stock_changes(&transition);

        assert_eq!(changes.len(), 1);
        let (product_id, change) = &changes[0];
        assert_eq!(*product_id, order.items[0].product_id);
        assert_eq!(change.adjustment, StockAdjustment::Out(2));
        assert_eq!(change.reference_type, ReferenceType::Order);
        assert_eq!(change.reference_id, Some(order.id.to_string()));
    }

    #[test]
    fn apply_moves_status_pair() {
        let mut order = order();
        let transition = order
            .plan(OrderStatus::Confirmed)
            .unwrap()
            .with_payment_status(PaymentStatus::Paid);
        order.apply(&transition, Utc::now());
        assert_eq!(order.status, OrderStatus::Confirmed);
        assert_eq!(order.payment_status, PaymentStatus::Paid);

        let cancel = order.plan(OrderStatus::Cancelled).unwrap();
        assert_eq!(cancel.stock_effect, StockEffect::Restore);
        assert_eq!(
            order.stock_changes(&cancel)[0].1.adjustment,
            StockAdjustment::In(2)
        );
    }

    #[test]
    fn pending_cancel_has_no_stock_changes() {
        let order = order();
        let cancel = order.plan(OrderStatus::Cancelled).unwrap();
        assert!(order.stock_changes(&cancel).is_empty());
    }

    #[test]
    fn refund_marks_payment_refunded_and_uses_return_reference() {
        let mut order = order();
        order.status = OrderStatus::Processing;
        order.payment_status = PaymentStatus::Paid;
        let refund = order.plan(OrderStatus::Refunded).unwrap();
        assert_eq!(refund.payment_status, Some(PaymentStatus::Refunded));
        assert_eq!(refund.reference_type(), ReferenceType::Return);
        assert_eq!(order.stock_changes(&refund).len(), 1);
    }
}
