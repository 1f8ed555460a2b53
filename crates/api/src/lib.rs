//! HTTP API server with observability for the storefront backend.
//!
//! Provides REST endpoints for the catalog, categories, reviews, carts,
//! checkout, payments, inventory, coupons and analytics, with structured logging (tracing) and
//! Prometheus metrics. Identity comes from headers set by an upstream
//! authentication layer (see [`auth`]).

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use analytics::{DashboardService, ReportService, StockAudit};
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post, put};
use metrics_exporter_prometheus::PrometheusHandle;
use sqlx::postgres::PgPoolOptions;
use store::{InMemoryStore, PostgresStore, Store};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use workflow::services::{AssetStore, InMemoryAssetStore, InMemoryPaymentGateway, PaymentGateway};
use workflow::{MAX_IMAGE_BYTES, Storefront, WorkflowSettings};

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub storefront: Storefront,
    pub dashboards: DashboardService,
    pub reports: ReportService,
    pub audit: StockAudit,
}

impl AppState {
    pub fn new(
        store: Arc<dyn Store>,
        gateway: Arc<dyn PaymentGateway>,
        assets: Arc<dyn AssetStore>,
        settings: WorkflowSettings,
    ) -> Self {
        Self {
            storefront: Storefront::new(store.clone(), gateway, assets, settings),
            dashboards: DashboardService::new(store.clone()),
            reports: ReportService::new(store.clone()),
            audit: StockAudit::new(store),
        }
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    use routes::{
        analytics, cart, categories, coupons, health, inventory, metrics, orders, payments,
        products, reviews,
    };

    let metrics_router = Router::new()
        .route("/metrics", get(metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(health::check))
        // Catalog
        .route("/products", get(products::list).post(products::create))
        .route("/products/featured", get(products::featured))
        .route(
            "/products/{id}",
            get(products::get)
                .put(products::update)
                .delete(products::remove),
        )
        .route(
            "/products/{id}/images",
            post(products::upload_image).layer(DefaultBodyLimit::max(MAX_IMAGE_BYTES + 1024)),
        )
        .route(
            "/products/{id}/images/{asset_id}",
            delete(products::remove_image),
        )
        // Categories
        .route("/categories", get(categories::list).post(categories::create))
        .route(
            "/categories/{id}",
            get(categories::get)
                .put(categories::update)
                .delete(categories::remove),
        )
        .route("/categories/{id}/products", get(categories::products))
        // Reviews
        .route(
            "/reviews/products/{product_id}",
            get(reviews::for_product).post(reviews::create),
        )
        .route("/reviews/admin/all", get(reviews::list_all))
        .route("/reviews/admin/{id}/approve", put(reviews::approve))
        .route("/reviews/{id}", put(reviews::update).delete(reviews::remove))
        .route("/reviews/{id}/helpful", post(reviews::helpful))
        // Cart
        .route("/cart", get(cart::get).delete(cart::clear))
        .route("/cart/items", post(cart::add_item))
        .route(
            "/cart/items/{product_id}",
            put(cart::update_item).delete(cart::remove_item),
        )
        .route(
            "/cart/coupon",
            post(cart::apply_coupon).delete(cart::remove_coupon),
        )
        .route("/cart/merge", post(cart::merge))
        // Wishlist
        .route("/wishlist", get(cart::get_wishlist).delete(cart::clear_wishlist))
        .route("/wishlist/items", post(cart::add_to_wishlist))
        .route(
            "/wishlist/items/{product_id}",
            delete(cart::remove_from_wishlist),
        )
        .route("/wishlist/move-to-cart", post(cart::move_to_cart))
        // Orders
        .route("/orders", post(orders::create).get(orders::list))
        .route("/orders/admin/all", get(orders::list_all))
        .route("/orders/admin/{id}/status", put(orders::update_status))
        .route("/orders/admin/{id}/tracking", put(orders::set_tracking))
        .route("/orders/{id}", get(orders::get))
        .route("/orders/{id}/track", get(orders::track))
        .route("/orders/{id}/cancel", post(orders::cancel))
        // Payments
        .route("/payments/intent", post(payments::create_intent))
        .route("/payments/confirm", post(payments::confirm))
        .route("/payments/webhook", post(payments::webhook))
        .route("/payments/{order_id}", get(payments::status))
        // Inventory
        .route("/inventory", get(inventory::overview))
        .route("/inventory/logs", get(inventory::logs))
        .route("/inventory/adjust", post(inventory::adjust))
        .route("/inventory/bulk-update", post(inventory::bulk_update))
        .route("/inventory/audit", get(inventory::audit))
        // Coupons
        .route("/coupons/validate", post(coupons::validate))
        .route("/coupons/admin", post(coupons::create))
        .route("/coupons/admin/all", get(coupons::list))
        .route(
            "/coupons/admin/{id}",
            get(coupons::get).put(coupons::update).delete(coupons::remove),
        )
        // Analytics
        .route("/analytics/dashboard", get(analytics::dashboard))
        .route("/analytics/sales", get(analytics::sales))
        .route("/analytics/products", get(analytics::products))
        .route("/analytics/customers", get(analytics::customers))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Creates state backed by the in-memory store and collaborators.
pub fn create_default_state(config: &Config) -> Arc<AppState> {
    state_for_store(config, InMemoryStore::new())
}

fn state_for_store(config: &Config, store: impl Store + 'static) -> Arc<AppState> {
    Arc::new(AppState::new(
        Arc::new(store),
        Arc::new(InMemoryPaymentGateway::new(
            config.payment_webhook_secret.clone(),
        )),
        Arc::new(InMemoryAssetStore::new(config.asset_base_url.clone())),
        config.workflow_settings(),
    ))
}

/// Creates state for `config`: PostgreSQL with migrations applied when
/// `DATABASE_URL` is set, the in-memory store otherwise.
pub async fn build_state(config: &Config) -> Result<Arc<AppState>, store::StoreError> {
    let Some(url) = config.database_url.as_deref() else {
        tracing::warn!("DATABASE_URL not set, using the in-memory store");
        return Ok(create_default_state(config));
    };

    let pool = PgPoolOptions::new()
        .max_connections(config.database_max_connections)
        .connect(url)
        .await?;
    let store = PostgresStore::new(pool);
    store.run_migrations().await?;
    tracing::info!("connected to PostgreSQL, migrations applied");

    Ok(state_for_store(config, store))
}
