//! Order state machine.

use serde::{Deserialize, Serialize};

use super::OrderError;

/// Fulfilment status of an order.
///
/// ```text
/// pending ──► confirmed ──► processing ──► shipped ──► delivered
///    │            │              │             │           │
///    │            ├──────────────┴─────────────┴───────────┴──► refunded (paid only)
///    └────────────┴──────────────┴─────────────┴──► cancelled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    /// Created from a cart, awaiting payment.
    #[default]
    Pending,
    /// Payment settled; stock has been taken.
    Confirmed,
    Processing,
    Shipped,
    /// Terminal.
    Delivered,
    /// Terminal.
    Cancelled,
    /// Terminal.
    Refunded,
}

/// What a transition does to product stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StockEffect {
    None,
    Decrement,
    Restore,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 7] = [
        OrderStatus::Pending,
        OrderStatus::Confirmed,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
        OrderStatus::Refunded,
    ];

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderStatus::Delivered | OrderStatus::Cancelled | OrderStatus::Refunded
        )
    }

    /// True once the order has passed through `confirmed`, i.e. stock for
    /// its lines is currently taken out of the catalog.
    pub fn holds_stock(&self) -> bool {
        matches!(
            self,
            OrderStatus::Confirmed
                | OrderStatus::Processing
                | OrderStatus::Shipped
                | OrderStatus::Delivered
        )
    }

    pub fn can_cancel(&self) -> bool {
        !self.is_terminal()
    }

    /// Validates a move to `target` and returns its stock side effect.
    pub fn plan_transition(
        self,
        target: OrderStatus,
        payment_status: PaymentStatus,
    ) -> Result<StockEffect, OrderError> {
        use OrderStatus::*;

        match (self, target) {
            (Pending, Confirmed) => Ok(StockEffect::Decrement),
            (Confirmed, Processing) | (Processing, Shipped) | (Shipped, Delivered) => {
                Ok(StockEffect::None)
            }
            (Pending, Cancelled) => Ok(StockEffect::None),
            (Confirmed | Processing | Shipped, Cancelled) => Ok(StockEffect::Restore),
            (Confirmed | Processing | Shipped | Delivered, Refunded) => {
                if payment_status != PaymentStatus::Paid {
                    return Err(OrderError::PaymentNotSettled {
                        payment_status,
                    });
                }
                // Shipped goods come back through a manual return adjustment.
                if matches!(self, Shipped | Delivered) {
                    Ok(StockEffect::None)
                } else {
                    Ok(StockEffect::Restore)
                }
            }
            (from, to) => Err(OrderError::InvalidTransition { from, to }),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Confirmed => "confirmed",
            OrderStatus::Processing => "processing",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
            OrderStatus::Refunded => "refunded",
        }
    }
}

impl std::fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for OrderStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| OrderError::UnknownStatus(s.to_string()))
    }
}

/// Settlement status reported by the payment collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Pending,
    Paid,
    Failed,
    /// Claimed by a refund whose provider call has not finished.
    Refunding,
    Refunded,
}

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Pending => "pending",
            PaymentStatus::Paid => "paid",
            PaymentStatus::Failed => "failed",
            PaymentStatus::Refunding => "refunding",
            PaymentStatus::Refunded => "refunded",
        }
    }

    /// A failure notification only downgrades payments that have not settled.
    pub fn can_mark_failed(&self) -> bool {
        matches!(self, PaymentStatus::Pending | PaymentStatus::Failed)
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = OrderError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(PaymentStatus::Pending),
            "paid" => Ok(PaymentStatus::Paid),
            "failed" => Ok(PaymentStatus::Failed),
            "refunding" => Ok(PaymentStatus::Refunding),
            "refunded" => Ok(PaymentStatus::Refunded),
            other => Err(OrderError::UnknownStatus(other.to_string())),
        }
    }
}
