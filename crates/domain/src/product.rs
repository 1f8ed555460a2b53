//! Catalog products.

use chrono::{DateTime, Utc};
use common::{Money, ProductId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Validator};

/// Default threshold under which a product counts as low on stock.
pub const DEFAULT_LOW_STOCK_THRESHOLD: u32 = 10;

const MAX_NAME_LEN: usize = 200;
const MAX_DESCRIPTION_LEN: usize = 5000;

/// An image attached to a product, held by the asset store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductImage {
    pub asset_id: String,
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
}

/// A sellable catalog entry.
///
/// `stock` is only ever changed through an inventory adjustment so that
/// every change has a matching ledger entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub sku: String,
    pub description: String,
    pub category: String,
    pub tags: Vec<String>,
    pub price: Money,
    pub compare_at_price: Option<Money>,
    pub images: Vec<ProductImage>,
    pub stock: u32,
    pub low_stock_threshold: u32,
    pub is_active: bool,
    pub is_featured: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    pub fn in_stock(&self) -> bool {
        self.stock > 0
    }

    /// True when stock is positive but at or below the threshold.
    pub fn is_low_stock(&self) -> bool {
        self.stock > 0 && self.stock <= self.low_stock_threshold
    }

    /// True when stock is at or below the threshold, including sold out.
    pub fn needs_restock(&self) -> bool {
        self.stock <= self.low_stock_threshold
    }

    /// Returns true if `quantity` units can currently be sold.
    pub fn can_fulfill(&self, quantity: u32) -> bool {
        self.is_active && self.stock >= quantity
    }

    /// Percentage off the compare-at price, rounded to a whole percent.
    pub fn discount_percentage(&self) -> Option<u32> {
        let compare = self.compare_at_price?;
        if compare.cents() <= self.price.cents() || compare.cents() == 0 {
            return None;
        }
        let off = (compare.cents() - self.price.cents()) * 100;
        Some(((off + compare.cents() / 2) / compare.cents()) as u32)
    }

    /// URL of the first image, used as the order line thumbnail.
    pub fn primary_image(&self) -> Option<&str> {
        self.images.first().map(|img| img.url.as_str())
    }
}

/// Input for creating a product.
#[derive(Debug, Clone, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub sku: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub tags: Vec<String>,
    pub price: Money,
    #[serde(default)]
    pub compare_at_price: Option<Money>,
    /// Opening stock; recorded as a restock ledger entry.
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub low_stock_threshold: Option<u32>,
    #[serde(default)]
    pub is_active: Option<bool>,
    #[serde(default)]
    pub is_featured: bool,
}

impl ProductDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        Validator::default()
            .check(!self.name.trim().is_empty(), "name", "is required")
            .check(
                self.name.chars().count() <= MAX_NAME_LEN,
                "name",
                "cannot exceed 200 characters",
            )
            .check(!self.sku.trim().is_empty(), "sku", "is required")
            .check(
                self.description.chars().count() <= MAX_DESCRIPTION_LEN,
                "description",
                "cannot exceed 5000 characters",
            )
            .check(!self.price.is_negative(), "price", "cannot be negative")
            .check(
                self.compare_at_price.is_none_or(|p| !p.is_negative()),
                "compare_at_price",
                "cannot be negative",
            )
            .finish()
    }

    /// Builds the product. Stock starts at zero; the opening stock is
    /// applied by the store together with its ledger entry.
    pub fn into_product(self, now: DateTime<Utc>) -> Product {
        Product {
            id: ProductId::new(),
            name: self.name.trim().to_string(),
            sku: self.sku.trim().to_uppercase(),
            description: self.description,
            category: self.category,
            tags: self.tags,
            price: self.price,
            compare_at_price: self.compare_at_price,
            images: Vec::new(),
            stock: 0,
            low_stock_threshold: self
                .low_stock_threshold
                .unwrap_or(DEFAULT_LOW_STOCK_THRESHOLD),
            is_active: self.is_active.unwrap_or(true),
            is_featured: self.is_featured,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update for a product. Stock is not patchable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProductPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub tags: Option<Vec<String>>,
    pub price: Option<Money>,
    pub compare_at_price: Option<Money>,
    pub low_stock_threshold: Option<u32>,
    pub is_active: Option<bool>,
    pub is_featured: Option<bool>,
}

impl ProductPatch {
    pub fn validate(&self) -> Result<(), DomainError> {
        Validator::default()
            .check(
                self.name.as_ref().is_none_or(|n| !n.trim().is_empty()),
                "name",
                "is required",
            )
            .check(
                self.name
                    .as_ref()
                    .is_none_or(|n| n.chars().count() <= MAX_NAME_LEN),
                "name",
                "cannot exceed 200 characters",
            )
            .check(
                self.description
                    .as_ref()
                    .is_none_or(|d| d.chars().count() <= MAX_DESCRIPTION_LEN),
                "description",
                "cannot exceed 5000 characters",
            )
            .check(
                self.price.is_none_or(|p| !p.is_negative()),
                "price",
                "cannot be negative",
            )
            .finish()
    }

    pub fn apply(self, product: &mut Product, now: DateTime<Utc>) {
        if let Some(name) = self.name {
            product.name = name.trim().to_string();
        }
        if let Some(description) = self.description {
            product.description = description;
        }
        if let Some(category) = self.category {
            product.category = category;
        }
        if let Some(tags) = self.tags {
            product.tags = tags;
        }
        if let Some(price) = self.price {
            product.price = price;
        }
        if let Some(compare) = self.compare_at_price {
            product.compare_at_price = Some(compare);
        }
        if let Some(threshold) = self.low_stock_threshold {
            product.low_stock_threshold = threshold;
        }
        if let Some(active) = self.is_active {
            product.is_active = active;
        }
        if let Some(featured) = self.is_featured {
            product.is_featured = featured;
        }
        product.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> ProductDraft {
        ProductDraft {
            name: "Desk Lamp".to_string(),
            sku: "lamp-01".to_string(),
            description: String::new(),
            category: "lighting".to_string(),
            tags: vec![],
            price: Money::from_cents(2500),
            compare_at_price: Some(Money::from_cents(3000)),
            stock: 5,
            low_stock_threshold: None,
            is_active: None,
            is_featured: false,
        }
    }

    #[test]
    fn into_product_normalizes_and_defaults() {
        let product = draft().into_product(Utc::now());
        assert_eq!(product.sku, "LAMP-01");
        assert_eq!(product.stock, 0);
        assert_eq!(product.low_stock_threshold, DEFAULT_LOW_STOCK_THRESHOLD);
        assert!(product.is_active);
    }

    #[test]
    fn stock_flags() {
        let mut product = draft().into_product(Utc::now());
        assert!(!product.in_stock());
        assert!(!product.is_low_stock());

        product.stock = 10;
        assert!(product.in_stock());
        assert!(product.is_low_stock());

        product.stock = 11;
        assert!(!product.is_low_stock());
        assert!(!product.needs_restock());

        product.stock = 0;
        assert!(product.needs_restock());
    }

    #[test]
    fn can_fulfill_requires_active_and_stock() {
        let mut product = draft().into_product(Utc::now());
        product.stock = 2;
        assert!(product.can_fulfill(2));
        assert!(!product.can_fulfill(3));
        product.is_active = false;
        assert!(!product.can_fulfill(1));
    }

    #[test]
    fn discount_percentage_from_compare_price() {
        let product = draft().into_product(Utc::now());
        assert_eq!(product.discount_percentage(), Some(17));

        let mut no_compare = product.clone();
        no_compare.compare_at_price = None;
        assert_eq!(no_compare.discount_percentage(), None);
    }

    #[test]
    fn draft_validation_rejects_bad_fields() {
        let mut bad = draft();
        bad.name = " ".to_string();
        bad.price = Money::from_cents(-1);
        assert!(matches!(bad.validate(), Err(DomainError::Validation(f)) if f.len() == 2));
        assert!(draft().validate().is_ok());
    }

    #[test]
    fn patch_never_touches_stock() {
        let mut product = draft().into_product(Utc::now());
        product.stock = 7;
        ProductPatch {
            price: Some(Money::from_cents(1999)),
            ..Default::default()
        }
        .apply(&mut product, Utc::now());
        assert_eq!(product.price.cents(), 1999);
        assert_eq!(product.stock, 7);
    }
}
