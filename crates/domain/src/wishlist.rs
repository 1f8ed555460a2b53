//! Wishlist aggregate.

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WishlistItem {
    pub product_id: ProductId,
    pub added_at: DateTime<Utc>,
}

/// A user's saved products. Each product appears at most once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Wishlist {
    pub user_id: UserId,
    pub items: Vec<WishlistItem>,
}

impl Wishlist {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            items: Vec::new(),
        }
    }

    pub fn contains(&self, product_id: ProductId) -> bool {
        self.items.iter().any(|i| i.product_id == product_id)
    }

    /// Adds a product. Returns false if it was already present.
    pub fn add(&mut self, product_id: ProductId, now: DateTime<Utc>) -> bool {
        if self.contains(product_id) {
            return false;
        }
        self.items.push(WishlistItem {
            product_id,
            added_at: now,
        });
        true
    }

    /// Removes a product. Returns false if it was not present.
    pub fn remove(&mut self, product_id: ProductId) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }
}
