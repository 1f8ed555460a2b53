//! Value objects for the order domain.

use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Validator};

/// Postal address captured on the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub street: String,
    pub city: String,
    pub state: String,
    pub zip_code: String,
    pub country: String,
    pub phone: String,
}

impl Address {
    pub fn validate(&self) -> Result<(), DomainError> {
        Validator::default()
            .check(!self.street.trim().is_empty(), "street", "is required")
            .check(!self.city.trim().is_empty(), "city", "is required")
            .check(!self.state.trim().is_empty(), "state", "is required")
            .check(!self.zip_code.trim().is_empty(), "zip_code", "is required")
            .check(!self.country.trim().is_empty(), "country", "is required")
            .check(!self.phone.trim().is_empty(), "phone", "is required")
            .finish()
    }
}

/// Snapshot of a purchased product taken when the order is placed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub name: String,
    pub image: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
    pub line_total: Money,
}

impl OrderLine {
    pub fn new(
        product_id: ProductId,
        variant: Option<String>,
        name: impl Into<String>,
        image: Option<String>,
        quantity: u32,
        unit_price: Money,
    ) -> Self {
        Self {
            product_id,
            variant,
            name: name.into(),
            image,
            quantity,
            unit_price,
            line_total: unit_price.multiply(quantity),
        }
    }
}
