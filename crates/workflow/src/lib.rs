//! Storefront use cases.
//!
//! Services orchestrate the domain rules over a [`store::Store`] and the
//! external collaborators:
//! - [`CatalogService`]: products and their images
//! - [`CategoryService`]: the category tree and browsing by category
//! - [`CartService`]: carts, applied coupons and wishlists
//! - [`CouponService`]: coupon validation and administration
//! - [`OrderService`]: checkout and the order state machine
//! - [`PaymentService`]: payment intents and notification reconciliation
//! - [`InventoryService`]: manual adjustments and the stock ledger
//! - [`ReviewService`]: product reviews, ratings and moderation
//!
//! [`Storefront`] wires them all from one set of dependencies.

pub mod cart;
pub mod catalog;
pub mod categories;
pub mod coupons;
pub mod error;
pub mod inventory;
pub mod orders;
pub mod payments;
pub mod reviews;
pub mod services;
pub mod settings;

use std::sync::Arc;

use store::Store;

pub use cart::CartService;
pub use catalog::{CatalogService, ImageUpload, MAX_IMAGE_BYTES};
pub use categories::{CategoryDetail, CategoryProducts, CategoryRef, CategoryService};
pub use coupons::{CouponQuote, CouponService};
pub use error::{Result, WorkflowError};
pub use inventory::{
    AdjustmentOutcome, AdjustmentRequest, BulkUpdateResult, InventoryOverview, InventoryService,
    StockLevel,
};
pub use orders::{CheckoutRequest, OrderService, OrderTracking};
pub use payments::{ConfirmOutcome, PaymentService, PaymentSummary, WebhookOutcome};
pub use reviews::{HelpfulVote, ProductReviews, ReviewService};
pub use services::{AssetStore, PaymentGateway};
pub use settings::WorkflowSettings;

/// Every storefront service, sharing one store and one set of collaborators.
#[derive(Clone)]
pub struct Storefront {
    pub catalog: CatalogService,
    pub categories: CategoryService,
    pub carts: CartService,
    pub coupons: CouponService,
    pub orders: OrderService,
    pub payments: PaymentService,
    pub inventory: InventoryService,
    pub reviews: ReviewService,
}

impl Storefront {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        assets: Arc<dyn AssetStore>,
        settings: WorkflowSettings,
    ) -> Self {
        let settings = Arc::new(settings);
        Self {
            catalog: CatalogService::new(store.clone(), assets),
            categories: CategoryService::new(store.clone()),
            carts: CartService::new(store.clone()),
            coupons: CouponService::new(store.clone()),
            orders: OrderService::new(store.clone(), gateway.clone(), settings.clone()),
            payments: PaymentService::new(store.clone(), gateway, settings),
            inventory: InventoryService::new(store.clone()),
            reviews: ReviewService::new(store),
        }
    }
}
