use std::collections::HashMap;
use std::pin::Pin;

use async_trait::async_trait;
use common::{CategoryId, CouponId, OrderId, ProductId, ReviewId, UserId};
use domain::{
    Cart, CartOwner, Category, Coupon, InventoryLogEntry, Order, PaymentStatus, Product,
    RatingSummary, Review, StockChange, Transition, Wishlist,
};
use futures_core::Stream;
use serde::{Deserialize, Serialize};

use crate::{InventoryLogQuery, OrderQuery, ProductQuery, Result, ReviewQuery};

/// A stream of ledger entries in creation order.
pub type LedgerStream = Pin<Box<dyn Stream<Item = Result<InventoryLogEntry>> + Send>>;

/// Aggregate stock figures across the catalog.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryStats {
    pub total_products: u64,
    pub total_stock: u64,
    /// Products at or below their threshold, sold-out ones included.
    pub low_stock_count: u64,
    pub out_of_stock_count: u64,
}

/// Outcome of applying a transition.
#[derive(Debug, Clone)]
pub struct TransitionOutcome {
    pub order: Order,
    pub ledger_entries: Vec<InventoryLogEntry>,
}

/// Persistence for every storefront entity.
///
/// Each method is atomic. Stock never goes negative, and every stock change
/// is written together with its ledger entry. Implementations must be
/// thread-safe (Send + Sync).
#[async_trait]
pub trait Store: Send + Sync {
    // -- Catalog --

    /// Inserts a product. When `opening_stock` is given the stock is applied
    /// with its ledger entry in the same unit of work.
    ///
    /// Fails with `Duplicate` if the SKU is taken.
    async fn insert_product(
        &self,
        product: Product,
        opening_stock: Option<StockChange>,
    ) -> Result<Product>;

    /// Persists every field except `stock`, which only moves through
    /// [`Store::adjust_stock`] and order transitions.
    async fn update_product(&self, product: Product) -> Result<Product>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>>;

    /// Returns the products that exist among `ids`, in no particular order.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>>;

    /// Returns the requested page and the total number of matches.
    async fn list_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)>;

    async fn delete_product(&self, id: ProductId) -> Result<()>;

    // -- Categories --

    /// Fails with `Duplicate` if the slug is taken.
    async fn insert_category(&self, category: Category) -> Result<Category>;

    /// When the slug changed, products filed under the old slug move to the
    /// new one in the same unit of work.
    async fn update_category(&self, category: Category) -> Result<Category>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>>;

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>>;

    /// By `sort_order`, then name.
    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>>;

    /// Fails with `InUse` while products are filed under the category.
    /// Subcategories become top-level.
    async fn delete_category(&self, id: CategoryId) -> Result<()>;

    // -- Reviews --

    /// Fails with `Duplicate` if the user already reviewed the product.
    async fn insert_review(&self, review: Review) -> Result<Review>;

    /// Persists the editable fields and approval; `helpful_count` is left
    /// alone.
    async fn update_review(&self, review: Review) -> Result<Review>;

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>>;

    async fn list_reviews(&self, query: &ReviewQuery) -> Result<(Vec<Review>, u64)>;

    async fn delete_review(&self, id: ReviewId) -> Result<()>;

    /// Atomic increment.
    async fn increment_review_helpful(&self, id: ReviewId) -> Result<Review>;

    /// Ratings from approved reviews. Products without any are absent.
    async fn rating_summaries(
        &self,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, RatingSummary>>;

    /// A delivered order of `user_id` that contains `product_id`.
    async fn find_delivered_purchase(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<OrderId>>;

    // -- Inventory --

    /// Applies a stock adjustment and appends its ledger entry atomically.
    async fn adjust_stock(
        &self,
        product_id: ProductId,
        change: StockChange,
    ) -> Result<InventoryLogEntry>;

    async fn list_inventory_logs(
        &self,
        query: &InventoryLogQuery,
    ) -> Result<(Vec<InventoryLogEntry>, u64)>;

    /// Streams ledger entries oldest first, optionally for a single product.
    async fn stream_inventory_logs(&self, product_id: Option<ProductId>) -> Result<LedgerStream>;

    async fn inventory_stats(&self) -> Result<InventoryStats>;

    // -- Carts & wishlists --

    async fn get_cart(&self, owner: &CartOwner) -> Result<Option<Cart>>;

    async fn save_cart(&self, cart: &Cart) -> Result<()>;

    async fn delete_cart(&self, owner: &CartOwner) -> Result<()>;

    async fn get_wishlist(&self, user_id: UserId) -> Result<Option<Wishlist>>;

    async fn save_wishlist(&self, wishlist: &Wishlist) -> Result<()>;

    // -- Coupons --

    /// Fails with `Duplicate` if the code is taken.
    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon>;

    async fn update_coupon(&self, coupon: Coupon) -> Result<Coupon>;

    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>>;

    /// Case-insensitive lookup.
    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>>;

    /// Newest first.
    async fn list_coupons(&self) -> Result<Vec<Coupon>>;

    async fn delete_coupon(&self, id: CouponId) -> Result<()>;

    // -- Orders --

    /// Persists a new order, redeems its coupon (if any) and clears the
    /// owner's cart as one unit of work.
    ///
    /// Fails with `Duplicate { entity: "order", .. }` on an order-number
    /// collision and `CouponUnavailable` if the coupon hit its limit.
    async fn commit_checkout(&self, order: Order, cart_owner: &CartOwner) -> Result<Order>;

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>>;

    /// Resolves any intent ever attached to an order, not only the current
    /// one.
    async fn find_order_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>>;

    async fn list_orders(&self, query: &OrderQuery) -> Result<(Vec<Order>, u64)>;

    /// Applies a planned transition: compare-and-set on `transition.from`,
    /// then every stock change with its ledger entry, then the payment
    /// status. Nothing is written if any step fails.
    async fn apply_transition(&self, transition: &Transition) -> Result<TransitionOutcome>;

    /// Records the payment intent of a `pending`, unpaid order.
    ///
    /// Compare-and-set on the current reference: fails with
    /// `StatusConflict` unless the order still carries `current`. The
    /// superseded intent stays resolvable through
    /// [`Store::find_order_by_payment_intent`].
    async fn attach_payment_intent(
        &self,
        order_id: OrderId,
        current: Option<&str>,
        intent_id: &str,
    ) -> Result<Order>;

    /// Compare-and-set on the payment status alone; the order status is
    /// left untouched.
    async fn update_payment_status(
        &self,
        order_id: OrderId,
        expected: &[PaymentStatus],
        status: PaymentStatus,
    ) -> Result<Order>;

    async fn set_tracking_number(&self, order_id: OrderId, tracking_number: &str)
    -> Result<Order>;
}
