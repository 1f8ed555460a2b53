//! Shopping cart aggregate.

use chrono::{DateTime, Utc};
use common::{Money, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors from cart operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    #[error("Invalid quantity: {quantity} (must be at least 1)")]
    InvalidQuantity { quantity: u32 },

    #[error("Item not found in cart: {product_id}")]
    ItemNotFound { product_id: ProductId },

    #[error("Cart is empty")]
    Empty,
}

/// Who a cart belongs to: a signed-in user or an anonymous session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "id", rename_all = "lowercase")]
pub enum CartOwner {
    User(UserId),
    Session(String),
}

impl CartOwner {
    pub fn user_id(&self) -> Option<UserId> {
        match self {
            CartOwner::User(id) => Some(*id),
            CartOwner::Session(_) => None,
        }
    }

    /// Stable storage key for the owner.
    pub fn key(&self) -> String {
        match self {
            CartOwner::User(id) => format!("user:{id}"),
            CartOwner::Session(id) => format!("session:{id}"),
        }
    }
}

impl std::fmt::Display for CartOwner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key())
    }
}

/// A line in the cart. The price is the one seen when the item was added.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartItem {
    pub product_id: ProductId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    pub quantity: u32,
    pub unit_price: Money,
}

impl CartItem {
    pub fn line_total(&self) -> Money {
        self.unit_price.multiply(self.quantity)
    }

    fn matches(&self, product_id: ProductId, variant: Option<&str>) -> bool {
        self.product_id == product_id && self.variant.as_deref() == variant
    }
}

/// Pending selections of one owner, with at most one line per
/// (product, variant) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    pub owner: CartOwner,
    pub items: Vec<CartItem>,
    pub coupon_code: Option<String>,
    pub coupon_discount: Money,
    pub updated_at: DateTime<Utc>,
}

impl Cart {
    pub fn new(owner: CartOwner, now: DateTime<Utc>) -> Self {
        Self {
            owner,
            items: Vec::new(),
            coupon_code: None,
            coupon_discount: Money::zero(),
            updated_at: now,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn subtotal(&self) -> Money {
        self.items.iter().map(CartItem::line_total).sum()
    }

    pub fn total_items(&self) -> u32 {
        self.items.iter().map(|i| i.quantity).sum()
    }

    /// Subtotal less the applied coupon discount, never negative.
    pub fn total(&self) -> Money {
        let subtotal = self.subtotal();
        subtotal - self.coupon_discount.clamp_to(subtotal)
    }

    /// Quantity already in the cart for a (product, variant) pair.
    pub fn quantity_of(&self, product_id: ProductId, variant: Option<&str>) -> u32 {
        self.items
            .iter()
            .find(|i| i.matches(product_id, variant))
            .map_or(0, |i| i.quantity)
    }

    /// Adds units, merging with an existing line for the same pair.
    /// Returns the resulting quantity of that line.
    pub fn add_item(
        &mut self,
        product_id: ProductId,
        variant: Option<String>,
        quantity: u32,
        unit_price: Money,
        now: DateTime<Utc>,
    ) -> Result<u32, CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }

        let merged = match self
            .items
            .iter_mut()
            .find(|i| i.matches(product_id, variant.as_deref()))
        {
            Some(existing) => {
                existing.quantity += quantity;
                existing.quantity
            }
            None => {
                self.items.push(CartItem {
                    product_id,
                    variant,
                    quantity,
                    unit_price,
                });
                quantity
            }
        };
        self.updated_at = now;
        Ok(merged)
    }

    pub fn update_quantity(
        &mut self,
        product_id: ProductId,
        variant: Option<&str>,
        quantity: u32,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        if quantity == 0 {
            return Err(CartError::InvalidQuantity { quantity });
        }
        let item = self
            .items
            .iter_mut()
            .find(|i| i.matches(product_id, variant))
            .ok_or(CartError::ItemNotFound { product_id })?;
        item.quantity = quantity;
        self.updated_at = now;
        Ok(())
    }

    pub fn remove_item(
        &mut self,
        product_id: ProductId,
        variant: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| !i.matches(product_id, variant));
        if self.items.len() == before {
            return Err(CartError::ItemNotFound { product_id });
        }
        self.updated_at = now;
        Ok(())
    }

    /// Empties the cart and drops any applied coupon.
    pub fn clear(&mut self, now: DateTime<Utc>) {
        self.items.clear();
        self.remove_coupon(now);
    }

    pub fn apply_coupon(&mut self, code: impl Into<String>, discount: Money, now: DateTime<Utc>) {
        self.coupon_code = Some(code.into());
        self.coupon_discount = discount;
        self.updated_at = now;
    }

    pub fn remove_coupon(&mut self, now: DateTime<Utc>) {
        self.coupon_code = None;
        self.coupon_discount = Money::zero();
        self.updated_at = now;
    }

    /// Folds another cart's lines into this one. The other cart's coupon
    /// is only taken when this cart has none.
    pub fn merge_from(&mut self, other: Cart, now: DateTime<Utc>) {
        for item in other.items {
            // Quantities from a stored cart are always >= 1.
            let _ = self.add_item(
                item.product_id,
                item.variant,
                item.quantity,
                item.unit_price,
                now,
            );
        }
        if self.coupon_code.is_none()
            && let Some(code) = other.coupon_code
        {
            self.apply_coupon(code, other.coupon_discount, now);
        }
        self.updated_at = now;
    }
}
