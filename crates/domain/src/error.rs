//! Domain error types.

use thiserror::Error;

use crate::cart::CartError;
use crate::coupon::CouponError;
use crate::inventory::InventoryError;
use crate::order::OrderError;

/// Field-level validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field}: {message}")]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

/// Errors raised by domain rules.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Order error: {0}")]
    Order(#[from] OrderError),

    #[error("Coupon error: {0}")]
    Coupon(#[from] CouponError),

    #[error("Inventory error: {0}")]
    Inventory(#[from] InventoryError),

    #[error("Cart error: {0}")]
    Cart(#[from] CartError),

    /// One or more input fields failed validation.
    #[error("Validation failed: {}", format_fields(.0))]
    Validation(Vec<FieldError>),
}

fn format_fields(fields: &[FieldError]) -> String {
    fields
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Collects field errors and turns them into a single result.
#[derive(Debug, Default)]
pub(crate) struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub(crate) fn check(&mut self, ok: bool, field: &'static str, message: &str) -> &mut Self {
        if !ok {
            self.errors.push(FieldError::new(field, message));
        }
        self
    }

    pub(crate) fn finish(&mut self) -> Result<(), DomainError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(DomainError::Validation(std::mem::take(&mut self.errors)))
        }
    }
}
