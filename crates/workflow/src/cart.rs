//! Cart, coupon application and wishlist use cases.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{ProductId, UserId};
use domain::{Cart, CartOwner, CouponError, Product, Wishlist};
use store::Store;

use crate::error::{Result, WorkflowError};

/// Cart and wishlist operations.
#[derive(Clone)]
pub struct CartService {
    store: Arc<dyn Store>,
}

impl CartService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Returns the owner's cart, or a fresh empty one.
    pub async fn get_cart(&self, owner: &CartOwner) -> Result<Cart> {
        Ok(self
            .store
            .get_cart(owner)
            .await?
            .unwrap_or_else(|| Cart::new(owner.clone(), Utc::now())))
    }

    /// Loads a product that can be put in a cart.
    async fn sellable(&self, product_id: ProductId) -> Result<Product> {
        let product = self
            .store
            .get_product(product_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("product", product_id))?;
        if !product.is_active {
            return Err(WorkflowError::OutOfStock {
                product: product.name,
            });
        }
        Ok(product)
    }

    fn ensure_stock(product: &Product, quantity: u32) -> Result<()> {
        if product.stock < quantity {
            return Err(WorkflowError::InsufficientStock {
                product_id: product.id,
                requested: quantity,
                available: product.stock,
            });
        }
        Ok(())
    }

    /// Recomputes the applied coupon's discount after the items changed.
    /// A coupon that no longer applies is dropped.
    async fn refresh_coupon(&self, cart: &mut Cart, now: DateTime<Utc>) -> Result<()> {
        let Some(code) = cart.coupon_code.clone() else {
            return Ok(());
        };
        if cart.is_empty() {
            cart.remove_coupon(now);
            return Ok(());
        }

        let outcome = match self.store.find_coupon_by_code(&code).await? {
            Some(coupon) => coupon.validate(cart.subtotal(), now),
            None => Err(CouponError::InvalidCode),
        };
        match outcome {
            Ok(discount) => cart.apply_coupon(code, discount, now),
            Err(reason) => {
                tracing::info!(%code, %reason, "coupon dropped from cart");
                cart.remove_coupon(now);
            }
        }
        Ok(())
    }

    async fn save(&self, mut cart: Cart, now: DateTime<Utc>) -> Result<Cart> {
        self.refresh_coupon(&mut cart, now).await?;
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Adds units of a product at its current price.
    #[tracing::instrument(skip(self))]
    pub async fn add_item(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        variant: Option<String>,
        quantity: u32,
    ) -> Result<Cart> {
        if quantity == 0 {
            return Err(WorkflowError::invalid("quantity", "must be at least 1"));
        }
        let product = self.sellable(product_id).await?;
        let mut cart = self.get_cart(owner).await?;
        let now = Utc::now();

        let merged = cart.quantity_of(product_id, variant.as_deref()) + quantity;
        Self::ensure_stock(&product, merged)?;
        cart.add_item(product_id, variant, quantity, product.price, now)?;

        self.save(cart, now).await
    }

    /// Sets the quantity of an existing line.
    #[tracing::instrument(skip(self))]
    pub async fn update_quantity(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        variant: Option<String>,
        quantity: u32,
    ) -> Result<Cart> {
        let mut cart = self.get_cart(owner).await?;
        let now = Utc::now();

        if quantity > 0 {
            let product = self.sellable(product_id).await?;
            Self::ensure_stock(&product, quantity)?;
        }
        cart.update_quantity(product_id, variant.as_deref(), quantity, now)?;

        self.save(cart, now).await
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_item(
        &self,
        owner: &CartOwner,
        product_id: ProductId,
        variant: Option<String>,
    ) -> Result<Cart> {
        let mut cart = self.get_cart(owner).await?;
        let now = Utc::now();
        cart.remove_item(product_id, variant.as_deref(), now)?;
        self.save(cart, now).await
    }

    /// Empties the cart and drops its coupon.
    #[tracing::instrument(skip(self))]
    pub async fn clear(&self, owner: &CartOwner) -> Result<Cart> {
        let mut cart = self.get_cart(owner).await?;
        cart.clear(Utc::now());
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Validates a coupon against the cart subtotal and applies it.
    #[tracing::instrument(skip(self))]
    pub async fn apply_coupon(&self, owner: &CartOwner, code: &str) -> Result<Cart> {
        let mut cart = self.get_cart(owner).await?;
        if cart.is_empty() {
            return Err(WorkflowError::invalid("cart", "cart is empty"));
        }
        let now = Utc::now();

        let coupon = self
            .store
            .find_coupon_by_code(code)
            .await?
            .ok_or(CouponError::InvalidCode)?;
        let discount = coupon.validate(cart.subtotal(), now)?;
        cart.apply_coupon(coupon.code, discount, now);

        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_coupon(&self, owner: &CartOwner) -> Result<Cart> {
        let mut cart = self.get_cart(owner).await?;
        cart.remove_coupon(Utc::now());
        self.store.save_cart(&cart).await?;
        Ok(cart)
    }

    /// Folds an anonymous session cart into the user's cart after sign-in.
    #[tracing::instrument(skip(self))]
    pub async fn merge_session_cart(&self, user_id: UserId, session_id: &str) -> Result<Cart> {
        let user_owner = CartOwner::User(user_id);
        let session_owner = CartOwner::Session(session_id.to_string());

        let Some(session_cart) = self.store.get_cart(&session_owner).await? else {
            return self.get_cart(&user_owner).await;
        };

        let now = Utc::now();
        let mut cart = self.get_cart(&user_owner).await?;
        cart.merge_from(session_cart, now);
        let cart = self.save(cart, now).await?;
        self.store.delete_cart(&session_owner).await?;

        tracing::info!(%user_id, items = cart.total_items(), "session cart merged");
        Ok(cart)
    }

    // -- Wishlist --

    pub async fn get_wishlist(&self, user_id: UserId) -> Result<Wishlist> {
        Ok(self
            .store
            .get_wishlist(user_id)
            .await?
            .unwrap_or_else(|| Wishlist::new(user_id)))
    }

    /// Adds a product; adding it twice is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn add_to_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Wishlist> {
        if self.store.get_product(product_id).await?.is_none() {
            return Err(WorkflowError::not_found("product", product_id));
        }
        let mut wishlist = self.get_wishlist(user_id).await?;
        if wishlist.add(product_id, Utc::now()) {
            self.store.save_wishlist(&wishlist).await?;
        }
        Ok(wishlist)
    }

    #[tracing::instrument(skip(self))]
    pub async fn remove_from_wishlist(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Wishlist> {
        let mut wishlist = self.get_wishlist(user_id).await?;
        if wishlist.remove(product_id) {
            self.store.save_wishlist(&wishlist).await?;
        }
        Ok(wishlist)
    }

    #[tracing::instrument(skip(self))]
    pub async fn clear_wishlist(&self, user_id: UserId) -> Result<Wishlist> {
        let mut wishlist = self.get_wishlist(user_id).await?;
        wishlist.clear();
        self.store.save_wishlist(&wishlist).await?;
        Ok(wishlist)
    }

    /// Moves one unit of a wishlisted product into the user's cart.
    #[tracing::instrument(skip(self))]
    pub async fn move_to_cart(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<(Cart, Wishlist)> {
        let mut wishlist = self.get_wishlist(user_id).await?;
        if !wishlist.contains(product_id) {
            return Err(WorkflowError::not_found("wishlist item", product_id));
        }

        let cart = self
            .add_item(&CartOwner::User(user_id), product_id, None, 1)
            .await?;
        wishlist.remove(product_id);
        self.store.save_wishlist(&wishlist).await?;
        Ok((cart, wishlist))
    }
}
