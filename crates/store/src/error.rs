use common::{OrderId, ProductId};
use domain::InventoryError;
use thiserror::Error;

/// Errors that can occur when interacting with the store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The entity was not found.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },

    /// An order was not in the status a compare-and-set expected.
    /// Another request changed it first.
    #[error("Order {order_id} is {actual}, expected {expected}")]
    StatusConflict {
        order_id: OrderId,
        expected: String,
        actual: String,
    },

    /// A conditional stock decrement found too few units.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    /// A unique key is already taken.
    #[error("{entity} already exists: {key}")]
    Duplicate { entity: &'static str, key: String },

    /// The entity cannot be removed while other records point at it.
    #[error("{entity} {key} is still used by {count} record(s)")]
    InUse {
        entity: &'static str,
        key: String,
        count: u64,
    },

    /// The coupon could not be redeemed, e.g. its usage limit was hit
    /// between validation and checkout.
    #[error("Coupon {code} is no longer available")]
    CouponUnavailable { code: String },

    /// A stock adjustment was malformed.
    #[error("Invalid adjustment: {0}")]
    InvalidAdjustment(String),

    /// A stored row could not be decoded.
    #[error("Corrupt record: {0}")]
    Corrupt(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StoreError {
    pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            entity,
            id: id.to_string(),
        }
    }
}

impl From<InventoryError> for StoreError {
    fn from(err: InventoryError) -> Self {
        match err {
            InventoryError::InsufficientStock {
                product_id,
                requested,
                available,
            } => StoreError::InsufficientStock {
                product_id,
                requested,
                available,
            },
            other => StoreError::InvalidAdjustment(other.to_string()),
        }
    }
}

/// Result type for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
