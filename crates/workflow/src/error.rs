//! Workflow error types.

use common::ProductId;
use domain::{CartError, CouponError, DomainError, FieldError, InventoryError, OrderError};
use store::StoreError;
use thiserror::Error;

/// Errors that can occur while running a storefront use case.
#[derive(Debug, Error)]
pub enum WorkflowError {
    /// The entity does not exist, or is not visible to the caller.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// The order state machine rejected the move.
    #[error("{0}")]
    InvalidTransition(OrderError),

    /// Not enough units on hand to take stock out.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A product in the cart cannot be sold right now.
    #[error("{product} is out of stock")]
    OutOfStock { product: String },

    /// A payment notification failed signature verification.
    #[error("Invalid webhook signature")]
    InvalidSignature,

    /// One or more input fields failed validation.
    #[error("Validation failed: {}", format_fields(.0))]
    ValidationFailed(Vec<FieldError>),

    /// The request is well-formed but cannot be honoured in the current state.
    #[error("{0}")]
    BadRequest(String),

    /// A coupon was rejected.
    #[error("{0}")]
    Coupon(#[from] CouponError),

    /// The payment collaborator failed or timed out. Safe to retry.
    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    /// The asset store failed.
    #[error("Asset store error: {0}")]
    AssetStore(String),

    /// Concurrent modification or duplicate key.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Any other store failure.
    #[error("Store error: {0}")]
    Store(#[source] StoreError),
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl WorkflowError {
    /// Shorthand for a single-field validation failure.
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        WorkflowError::ValidationFailed(vec![FieldError::new(field, message)])
    }

    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        WorkflowError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// True when repeating the same request may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WorkflowError::PaymentProvider(_) | WorkflowError::Conflict(_)
        )
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { entity, id } => WorkflowError::NotFound { entity, id },
            StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            } => WorkflowError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            StoreError::StatusConflict { .. } | StoreError::Duplicate { .. } => {
                WorkflowError::Conflict(err.to_string())
            }
            StoreError::CouponUnavailable { .. } => {
                WorkflowError::Coupon(CouponError::UsageLimitReached)
            }
            StoreError::InvalidAdjustment(message) => WorkflowError::invalid("quantity", message),
            StoreError::InUse { .. } => WorkflowError::BadRequest(err.to_string()),
            other => WorkflowError::Store(other),
        }
    }
}

impl From<DomainError> for WorkflowError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Order(e) => e.into(),
            DomainError::Coupon(e) => WorkflowError::Coupon(e),
            DomainError::Inventory(e) => e.into(),
            DomainError::Cart(e) => e.into(),
            DomainError::Validation(fields) => WorkflowError::ValidationFailed(fields),
        }
    }
}

impl From<OrderError> for WorkflowError {
    fn from(err: OrderError) -> Self {
        match err {
            OrderError::NoItems => WorkflowError::invalid("items", "order has no items"),
            OrderError::UnknownStatus(status) => {
                WorkflowError::invalid("status", format!("unknown status: {status}"))
            }
            other => WorkflowError::InvalidTransition(other),
        }
    }
}

impl From<InventoryError> for WorkflowError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => WorkflowError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            other => WorkflowError::invalid("quantity", other.to_string()),
        }
    }
}

impl From<CartError> for WorkflowError {
    fn from(err: CartError) -> Self {
        match err {
            CartError::ItemNotFound { product_id } => {
                WorkflowError::not_found("cart item", product_id)
            }
            CartError::Empty => WorkflowError::invalid("cart", "cart is empty"),
            other @ CartError::InvalidQuantity { .. } => {
                WorkflowError::invalid("quantity", other.to_string())
            }
        }
    }
}

/// Convenience type alias for workflow results.
pub type Result<T> = std::result::Result<T, WorkflowError>;

#[cfg(test)]
mod tests {
    use super::*;
    use common::OrderId;
    use domain::OrderStatus;

    #[test]
    fn store_conflicts_are_retryable() {
        let err: WorkflowError = StoreError::StatusConflict {
            order_id: OrderId::new(),
            expected: "pending".into(),
            actual: "confirmed".into(),
        }
        .into();
        assert!(matches!(err, WorkflowError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn exhausted_coupon_surfaces_as_coupon_rejection() {
        let err: WorkflowError = StoreError::CouponUnavailable {
            code: "SAVE".into(),
        }
        .into();
        assert!(matches!(
            err,
            WorkflowError::Coupon(CouponError::UsageLimitReached)
        ));
    }

    #[test]
    fn deleting_a_used_record_is_a_bad_request() {
        let err: WorkflowError = StoreError::InUse {
            entity: "category",
            key: "lamps".into(),
            count: 3,
        }
        .into();
        assert!(matches!(err, WorkflowError::BadRequest(_)));
        assert_eq!(err.to_string(), "category lamps is still used by 3 record(s)");
        assert!(!err.is_retryable());
    }

    #[test]
    fn transition_errors_keep_their_message() {
        let err: WorkflowError = DomainError::from(OrderError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Shipped,
        })
        .into();
        assert_eq!(
            err.to_string(),
            "Invalid status transition from pending to shipped"
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn empty_cart_is_a_validation_failure() {
        let err: WorkflowError = CartError::Empty.into();
        match err {
            WorkflowError::ValidationFailed(fields) => {
                assert_eq!(fields[0].message, "cart is empty")
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
