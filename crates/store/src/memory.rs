use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use common::{CategoryId, CouponId, OrderId, ProductId, ReviewId, UserId};
use domain::{
    Cart, CartOwner, Category, Coupon, InventoryLogEntry, Order, OrderStatus, PaymentStatus,
    Product, RatingSummary, Review, StockAdjustment, StockChange, Transition, Wishlist,
    normalize_code,
};
use tokio::sync::RwLock;

use crate::query::paginate;
use crate::store::{InventoryStats, LedgerStream, Store, TransitionOutcome};
use crate::{
    InventoryLogQuery, OrderQuery, ProductQuery, ProductSort, Result, ReviewQuery, StoreError,
};

#[derive(Debug, Default)]
struct State {
    products: HashMap<ProductId, Product>,
    categories: HashMap<CategoryId, Category>,
    reviews: HashMap<ReviewId, Review>,
    ledger: Vec<InventoryLogEntry>,
    carts: HashMap<String, Cart>,
    wishlists: HashMap<UserId, Wishlist>,
    coupons: HashMap<CouponId, Coupon>,
    orders: HashMap<OrderId, Order>,
    /// Every intent ever attached, so a superseded one still resolves.
    payment_intents: HashMap<String, OrderId>,
}

impl State {
    /// Applies stock changes to a staged copy and commits only if every
    /// change succeeds.
    ///
    /// With `for_order` set, a restore for a product that has since been
    /// deleted is skipped and a decrement reports zero availability.
    fn apply_stock_changes(
        &mut self,
        changes: &[(ProductId, StockChange)],
        for_order: bool,
    ) -> Result<Vec<InventoryLogEntry>> {
        let now = Utc::now();
        let mut staged: HashMap<ProductId, u32> = HashMap::new();
        let mut entries = Vec::with_capacity(changes.len());

        for (product_id, change) in changes {
            let previous = match staged.get(product_id) {
                Some(stock) => *stock,
                None => match (self.products.get(product_id), change.adjustment) {
                    (Some(product), _) => product.stock,
                    (None, StockAdjustment::In(_)) if for_order => {
                        tracing::warn!(%product_id, "product no longer exists, skipping restore");
                        continue;
                    }
                    (None, StockAdjustment::Out(requested)) if for_order => {
                        return Err(StoreError::InsufficientStock {
                            product_id: *product_id,
                            requested,
                            available: 0,
                        });
                    }
                    (None, _) => return Err(StoreError::not_found("product", product_id)),
                },
            };
            let entry = InventoryLogEntry::from_change(*product_id, previous, change, now)?;
            staged.insert(*product_id, entry.new_stock);
            entries.push(entry);
        }

        for (product_id, stock) in staged {
            if let Some(product) = self.products.get_mut(&product_id) {
                product.stock = stock;
                product.updated_at = now;
            }
        }
        self.ledger.extend(entries.iter().cloned());
        Ok(entries)
    }

    fn order_mut(&mut self, order_id: OrderId) -> Result<&mut Order> {
        self.orders
            .get_mut(&order_id)
            .ok_or_else(|| StoreError::not_found("order", order_id))
    }

    fn sku_taken(&self, sku: &str, except: Option<ProductId>) -> bool {
        self.products
            .values()
            .any(|p| Some(p.id) != except && p.sku.eq_ignore_ascii_case(sku))
    }

    fn slug_taken(&self, slug: &str, except: Option<CategoryId>) -> bool {
        self.categories
            .values()
            .any(|c| Some(c.id) != except && c.slug == slug)
    }

    fn review_mut(&mut self, id: ReviewId) -> Result<&mut Review> {
        self.reviews
            .get_mut(&id)
            .ok_or_else(|| StoreError::not_found("review", id))
    }

    fn code_taken(&self, code: &str, except: Option<CouponId>) -> bool {
        self.coupons
            .values()
            .any(|c| Some(c.id) != except && c.code == code)
    }
}

/// In-memory store for tests and local runs.
///
/// A single lock guards every collection, so each operation observes and
/// leaves a consistent state, like a database transaction would.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    state: Arc<RwLock<State>>,
}

impl InMemoryStore {
    /// Creates a new empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the total number of ledger entries.
    pub async fn ledger_len(&self) -> usize {
        self.state.read().await.ledger.len()
    }

    /// Clears every collection.
    pub async fn clear(&self) {
        *self.state.write().await = State::default();
    }
}

fn sort_products(products: &mut [Product], sort: ProductSort) {
    match sort {
        ProductSort::Newest => {
            products.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)))
        }
        ProductSort::PriceAsc => {
            products.sort_by(|a, b| a.price.cmp(&b.price).then(a.id.cmp(&b.id)))
        }
        ProductSort::PriceDesc => {
            products.sort_by(|a, b| b.price.cmp(&a.price).then(a.id.cmp(&b.id)))
        }
        ProductSort::Name => products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id))),
        ProductSort::StockAsc => {
            products.sort_by(|a, b| a.stock.cmp(&b.stock).then(a.id.cmp(&b.id)))
        }
    }
}

#[async_trait]
impl Store for InMemoryStore {
    async fn insert_product(
        &self,
        product: Product,
        opening_stock: Option<StockChange>,
    ) -> Result<Product> {
        let mut state = self.state.write().await;
        if state.sku_taken(&product.sku, None) {
            return Err(StoreError::Duplicate {
                entity: "product",
                key: product.sku,
            });
        }

        let id = product.id;
        state.products.insert(id, product);
        if let Some(change) = opening_stock
            && let Err(e) = state.apply_stock_changes(&[(id, change)], false)
        {
            state.products.remove(&id);
            return Err(e);
        }
        Ok(state.products[&id].clone())
    }

    async fn update_product(&self, mut product: Product) -> Result<Product> {
        let mut state = self.state.write().await;
        if state.sku_taken(&product.sku, Some(product.id)) {
            return Err(StoreError::Duplicate {
                entity: "product",
                key: product.sku,
            });
        }
        let existing = state
            .products
            .get_mut(&product.id)
            .ok_or_else(|| StoreError::not_found("product", product.id))?;
        product.stock = existing.stock;
        *existing = product.clone();
        Ok(product)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.products.get(id).cloned())
            .collect())
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        let state = self.state.read().await;
        let mut products: Vec<_> = state
            .products
            .values()
            .filter(|p| query.matches(p))
            .cloned()
            .collect();
        sort_products(&mut products, query.sort);
        let total = products.len() as u64;
        Ok((paginate(products, query.offset, query.limit), total))
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        self.state
            .write()
            .await
            .products
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("product", id))
    }

    async fn insert_category(&self, category: Category) -> Result<Category> {
        let mut state = self.state.write().await;
        if state.slug_taken(&category.slug, None) {
            return Err(StoreError::Duplicate {
                entity: "category",
                key: category.slug,
            });
        }
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn update_category(&self, category: Category) -> Result<Category> {
        let mut state = self.state.write().await;
        if state.slug_taken(&category.slug, Some(category.id)) {
            return Err(StoreError::Duplicate {
                entity: "category",
                key: category.slug,
            });
        }
        let previous = state
            .categories
            .get(&category.id)
            .map(|c| c.slug.clone())
            .ok_or_else(|| StoreError::not_found("category", category.id))?;

        if previous != category.slug {
            for product in state.products.values_mut() {
                if product.category == previous {
                    product.category = category.slug.clone();
                    product.updated_at = category.updated_at;
                }
            }
        }
        state.categories.insert(category.id, category.clone());
        Ok(category)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        Ok(self.state.read().await.categories.get(&id).cloned())
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        Ok(self
            .state
            .read()
            .await
            .categories
            .values()
            .find(|c| c.slug == slug)
            .cloned())
    }

    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>> {
        let state = self.state.read().await;
        let mut categories: Vec<_> = state
            .categories
            .values()
            .filter(|c| !active_only || c.is_active)
            .cloned()
            .collect();
        categories.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| a.name.cmp(&b.name))
        });
        Ok(categories)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<()> {
        let mut state = self.state.write().await;
        let slug = state
            .categories
            .get(&id)
            .map(|c| c.slug.clone())
            .ok_or_else(|| StoreError::not_found("category", id))?;

        let count = state
            .products
            .values()
            .filter(|p| p.category == slug)
            .count() as u64;
        if count > 0 {
            return Err(StoreError::InUse {
                entity: "category",
                key: slug,
                count,
            });
        }

        state.categories.remove(&id);
        for child in state.categories.values_mut() {
            if child.parent_id == Some(id) {
                child.parent_id = None;
            }
        }
        Ok(())
    }

    async fn insert_review(&self, review: Review) -> Result<Review> {
        let mut state = self.state.write().await;
        if state
            .reviews
            .values()
            .any(|r| r.product_id == review.product_id && r.user_id == review.user_id)
        {
            return Err(StoreError::Duplicate {
                entity: "review",
                key: format!("{}/{}", review.product_id, review.user_id),
            });
        }
        state.reviews.insert(review.id, review.clone());
        Ok(review)
    }

    async fn update_review(&self, review: Review) -> Result<Review> {
        let mut state = self.state.write().await;
        let stored = state.review_mut(review.id)?;
        stored.rating = review.rating;
        stored.title = review.title;
        stored.comment = review.comment;
        stored.images = review.images;
        stored.is_approved = review.is_approved;
        stored.updated_at = review.updated_at;
        Ok(stored.clone())
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>> {
        Ok(self.state.read().await.reviews.get(&id).cloned())
    }

    async fn list_reviews(&self, query: &ReviewQuery) -> Result<(Vec<Review>, u64)> {
        let state = self.state.read().await;
        let mut reviews: Vec<_> = state
            .reviews
            .values()
            .filter(|r| query.matches(r))
            .cloned()
            .collect();
        reviews.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.id.cmp(&b.id)));
        let total = reviews.len() as u64;
        Ok((paginate(reviews, query.offset, query.limit), total))
    }

    async fn delete_review(&self, id: ReviewId) -> Result<()> {
        self.state
            .write()
            .await
            .reviews
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("review", id))
    }

    async fn increment_review_helpful(&self, id: ReviewId) -> Result<Review> {
        let mut state = self.state.write().await;
        let review = state.review_mut(id)?;
        review.helpful_count = review.helpful_count.saturating_add(1);
        Ok(review.clone())
    }

    async fn rating_summaries(
        &self,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, RatingSummary>> {
        let state = self.state.read().await;
        let mut ratings: HashMap<ProductId, Vec<u8>> = HashMap::new();
        for review in state.reviews.values() {
            if review.is_approved && product_ids.contains(&review.product_id) {
                ratings
                    .entry(review.product_id)
                    .or_default()
                    .push(review.rating);
            }
        }
        Ok(ratings
            .into_iter()
            .map(|(id, ratings)| (id, RatingSummary::from_ratings(ratings)))
            .collect())
    }

    async fn find_delivered_purchase(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<OrderId>> {
        Ok(self
            .state
            .read()
            .await
            .orders
            .values()
            .filter(|o| o.user_id == user_id && o.status == OrderStatus::Delivered)
            .find(|o| o.items.iter().any(|line| line.product_id == product_id))
            .map(|o| o.id))
    }

    async fn adjust_stock(
        &self,
        product_id: ProductId,
        change: StockChange,
    ) -> Result<InventoryLogEntry> {
        let mut state = self.state.write().await;
        let mut entries = state.apply_stock_changes(&[(product_id, change)], false)?;
        entries
            .pop()
            .ok_or_else(|| StoreError::not_found("product", product_id))
    }

    async fn list_inventory_logs(
        &self,
        query: &InventoryLogQuery,
    ) -> Result<(Vec<InventoryLogEntry>, u64)> {
        let state = self.state.read().await;
        let entries: Vec<_> = state
            .ledger
            .iter()
            .rev()
            .filter(|e| query.matches(e))
            .cloned()
            .collect();
        let total = entries.len() as u64;
        Ok((paginate(entries, query.offset, query.limit), total))
    }

    async fn stream_inventory_logs(&self, product_id: Option<ProductId>) -> Result<LedgerStream> {
        use futures_util::stream;

        let state = self.state.read().await;
        let entries: Vec<_> = state
            .ledger
            .iter()
            .filter(|e| product_id.is_none_or(|p| e.product_id == p))
            .cloned()
            .collect();
        Ok(Box::pin(stream::iter(entries.into_iter().map(Ok))))
    }

    async fn inventory_stats(&self) -> Result<InventoryStats> {
        let state = self.state.read().await;
        Ok(state
            .products
            .values()
            .fold(InventoryStats::default(), |mut stats, p| {
                stats.total_products += 1;
                stats.total_stock += u64::from(p.stock);
                if p.needs_restock() {
                    stats.low_stock_count += 1;
                }
                if p.stock == 0 {
                    stats.out_of_stock_count += 1;
                }
                stats
            }))
    }

    async fn get_cart(&self, owner: &CartOwner) -> Result<Option<Cart>> {
        Ok(self.state.read().await.carts.get(&owner.key()).cloned())
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        self.state
            .write()
            .await
            .carts
            .insert(cart.owner.key(), cart.clone());
        Ok(())
    }

    async fn delete_cart(&self, owner: &CartOwner) -> Result<()> {
        self.state.write().await.carts.remove(&owner.key());
        Ok(())
    }

    async fn get_wishlist(&self, user_id: UserId) -> Result<Option<Wishlist>> {
        Ok(self.state.read().await.wishlists.get(&user_id).cloned())
    }

    async fn save_wishlist(&self, wishlist: &Wishlist) -> Result<()> {
        self.state
            .write()
            .await
            .wishlists
            .insert(wishlist.user_id, wishlist.clone());
        Ok(())
    }

    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        let mut state = self.state.write().await;
        if state.code_taken(&coupon.code, None) {
            return Err(StoreError::Duplicate {
                entity: "coupon",
                key: coupon.code,
            });
        }
        state.coupons.insert(coupon.id, coupon.clone());
        Ok(coupon)
    }

    async fn update_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        let mut state = self.state.write().await;
        if state.code_taken(&coupon.code, Some(coupon.id)) {
            return Err(StoreError::Duplicate {
                entity: "coupon",
                key: coupon.code,
            });
        }
        let existing = state
            .coupons
            .get_mut(&coupon.id)
            .ok_or_else(|| StoreError::not_found("coupon", coupon.id))?;
        *existing = coupon.clone();
        Ok(coupon)
    }

    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        Ok(self.state.read().await.coupons.get(&id).cloned())
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        let code = normalize_code(code);
        Ok(self
            .state
            .read()
            .await
            .coupons
            .values()
            .find(|c| c.code == code)
            .cloned())
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let state = self.state.read().await;
        let mut coupons: Vec<_> = state.coupons.values().cloned().collect();
        coupons.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(a.code.cmp(&b.code)));
        Ok(coupons)
    }

    async fn delete_coupon(&self, id: CouponId) -> Result<()> {
        self.state
            .write()
            .await
            .coupons
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| StoreError::not_found("coupon", id))
    }

    async fn commit_checkout(&self, order: Order, cart_owner: &CartOwner) -> Result<Order> {
        let mut state = self.state.write().await;

        if state
            .orders
            .values()
            .any(|o| o.order_number == order.order_number)
        {
            return Err(StoreError::Duplicate {
                entity: "order",
                key: order.order_number.to_string(),
            });
        }

        if let Some(code) = &order.coupon_code {
            let code = normalize_code(code);
            let coupon = state
                .coupons
                .values_mut()
                .find(|c| c.code == code)
                .filter(|c| !c.is_usage_limit_reached())
                .ok_or(StoreError::CouponUnavailable { code })?;
            coupon.used_count += 1;
        }

        state.carts.remove(&cart_owner.key());
        state.orders.insert(order.id, order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        Ok(self.state.read().await.orders.get(&id).cloned())
    }

    async fn find_order_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        let state = self.state.read().await;
        Ok(state
            .payment_intents
            .get(intent_id)
            .and_then(|id| state.orders.get(id))
            .cloned())
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<(Vec<Order>, u64)> {
        let state = self.state.read().await;
        let mut orders: Vec<_> = state
            .orders
            .values()
            .filter(|o| query.matches(o))
            .cloned()
            .collect();
        orders.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then(b.order_number.as_str().cmp(a.order_number.as_str()))
        });
        let total = orders.len() as u64;
        Ok((paginate(orders, query.offset, query.limit), total))
    }

    async fn apply_transition(&self, transition: &Transition) -> Result<TransitionOutcome> {
        let mut state = self.state.write().await;

        let order = state
            .orders
            .get(&transition.order_id)
            .ok_or_else(|| StoreError::not_found("order", transition.order_id))?;
        if order.status != transition.from {
            return Err(StoreError::StatusConflict {
                order_id: order.id,
                expected: transition.from.to_string(),
                actual: order.status.to_string(),
            });
        }

        let changes = order.stock_changes(transition);
        let ledger_entries = state.apply_stock_changes(&changes, true)?;

        let order = state.order_mut(transition.order_id)?;
        order.apply(transition, Utc::now());
        Ok(TransitionOutcome {
            order: order.clone(),
            ledger_entries,
        })
    }

    async fn attach_payment_intent(
        &self,
        order_id: OrderId,
        current: Option<&str>,
        intent_id: &str,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.order_mut(order_id)?;
        if order.status != OrderStatus::Pending
            || order.payment_status == PaymentStatus::Paid
        {
            return Err(StoreError::StatusConflict {
                order_id,
                expected: "pending/unpaid".to_string(),
                actual: format!("{}/{}", order.status, order.payment_status),
            });
        }
        if order.payment_intent_id.as_deref() != current {
            return Err(StoreError::StatusConflict {
                order_id,
                expected: format!("intent {}", current.unwrap_or("none")),
                actual: format!(
                    "intent {}",
                    order.payment_intent_id.as_deref().unwrap_or("none")
                ),
            });
        }
        order.payment_intent_id = Some(intent_id.to_string());
        order.updated_at = Utc::now();
        let order = order.clone();
        state.payment_intents.insert(intent_id.to_string(), order_id);
        Ok(order)
    }

    async fn update_payment_status(
        &self,
        order_id: OrderId,
        expected: &[PaymentStatus],
        status: PaymentStatus,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.order_mut(order_id)?;
        if !expected.contains(&order.payment_status) {
            return Err(StoreError::StatusConflict {
                order_id,
                expected: expected
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join("|"),
                actual: order.payment_status.to_string(),
            });
        }
        order.payment_status = status;
        order.updated_at = Utc::now();
        Ok(order.clone())
    }

    async fn set_tracking_number(
        &self,
        order_id: OrderId,
        tracking_number: &str,
    ) -> Result<Order> {
        let mut state = self.state.write().await;
        let order = state.order_mut(order_id)?;
        order.tracking_number = Some(tracking_number.to_string());
        order.updated_at = Utc::now();
        Ok(order.clone())
    }
}
