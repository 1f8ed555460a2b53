//! Orders: state machine, pricing and the order record.

mod aggregate;
mod number;
mod pricing;
mod state;
mod value_objects;

pub use aggregate::{CheckoutDraft, Order, Transition};
pub use number::OrderNumber;
pub use pricing::{FlatRateShipping, PricingPolicy, ShippingPolicy, Totals};
pub use state::{OrderStatus, PaymentStatus, StockEffect};
pub use value_objects::{Address, OrderLine};

use thiserror::Error;

/// Errors that can occur during order operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    /// The requested status is not reachable from the current one.
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    /// Refunds need a settled payment.
    #[error("Payment is {payment_status}, expected paid")]
    PaymentNotSettled { payment_status: PaymentStatus },

    /// Order has no items.
    #[error("Order has no items")]
    NoItems,

    #[error("Unknown status: {0}")]
    UnknownStatus(String),

    #[error("Invalid order number: {0}")]
    InvalidOrderNumber(String),
}
