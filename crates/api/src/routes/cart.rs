//! Cart and wishlist endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use common::{Money, ProductId};
use domain::{Cart, Wishlist};
use serde::{Deserialize, Serialize};

use super::parse_id;
use crate::AppState;
use crate::auth::{CartIdentity, CurrentUser, SessionId};
use crate::error::{ApiError, ApiResult};

// -- Request types --

#[derive(Debug, Deserialize)]
pub struct AddItemRequest {
    pub product_id: ProductId,
    #[serde(default)]
    pub variant: Option<String>,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub quantity: u32,
    #[serde(default)]
    pub variant: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RemoveItemQuery {
    pub variant: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ApplyCouponRequest {
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductRef {
    pub product_id: ProductId,
}

// -- Response types --

/// A cart with its computed totals.
#[derive(Debug, Serialize)]
pub struct CartResponse {
    #[serde(flatten)]
    pub cart: Cart,
    pub subtotal: Money,
    pub total: Money,
    pub total_items: u32,
}

impl From<Cart> for CartResponse {
    fn from(cart: Cart) -> Self {
        Self {
            subtotal: cart.subtotal(),
            total: cart.total(),
            total_items: cart.total_items(),
            cart,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct MoveToCartResponse {
    pub cart: CartResponse,
    pub wishlist: Wishlist,
}

// -- Cart handlers --

/// GET /cart
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
) -> ApiResult<Json<CartResponse>> {
    let cart = state.storefront.carts.get_cart(&owner).await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart
#[tracing::instrument(skip(state))]
pub async fn clear(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
) -> ApiResult<Json<CartResponse>> {
    let cart = state.storefront.carts.clear(&owner).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/items
#[tracing::instrument(skip(state))]
pub async fn add_item(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
    Json(req): Json<AddItemRequest>,
) -> ApiResult<Json<CartResponse>> {
    let cart = state
        .storefront
        .carts
        .add_item(&owner, req.product_id, req.variant, req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// PUT /cart/items/:product_id
#[tracing::instrument(skip(state))]
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
    Path(product_id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> ApiResult<Json<CartResponse>> {
    let product_id: ProductId = parse_id(&product_id, "product")?;
    let cart = state
        .storefront
        .carts
        .update_quantity(&owner, product_id, req.variant, req.quantity)
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/items/:product_id?variant=
#[tracing::instrument(skip(state))]
pub async fn remove_item(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
    Path(product_id): Path<String>,
    Query(query): Query<RemoveItemQuery>,
) -> ApiResult<Json<CartResponse>> {
    let product_id: ProductId = parse_id(&product_id, "product")?;
    let cart = state
        .storefront
        .carts
        .remove_item(&owner, product_id, query.variant)
        .await?;
    Ok(Json(cart.into()))
}

/// POST /cart/coupon
#[tracing::instrument(skip(state))]
pub async fn apply_coupon(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
    Json(req): Json<ApplyCouponRequest>,
) -> ApiResult<Json<CartResponse>> {
    let cart = state
        .storefront
        .carts
        .apply_coupon(&owner, &req.code)
        .await?;
    Ok(Json(cart.into()))
}

/// DELETE /cart/coupon
#[tracing::instrument(skip(state))]
pub async fn remove_coupon(
    State(state): State<Arc<AppState>>,
    CartIdentity(owner): CartIdentity,
) -> ApiResult<Json<CartResponse>> {
    let cart = state.storefront.carts.remove_coupon(&owner).await?;
    Ok(Json(cart.into()))
}

/// POST /cart/merge
///
/// Folds the `x-session-id` cart into the user's cart.
#[tracing::instrument(skip(state))]
pub async fn merge(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    SessionId(session): SessionId,
) -> ApiResult<Json<CartResponse>> {
    let session = session.ok_or_else(|| {
        ApiError::BadRequest(format!(
            "{} header is required",
            crate::auth::SESSION_ID_HEADER
        ))
    })?;
    let cart = state
        .storefront
        .carts
        .merge_session_cart(user.id, &session)
        .await?;
    Ok(Json(cart.into()))
}

// -- Wishlist handlers --

/// GET /wishlist
#[tracing::instrument(skip(state))]
pub async fn get_wishlist(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Wishlist>> {
    Ok(Json(state.storefront.carts.get_wishlist(user.id).await?))
}

/// DELETE /wishlist
#[tracing::instrument(skip(state))]
pub async fn clear_wishlist(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> ApiResult<Json<Wishlist>> {
    Ok(Json(state.storefront.carts.clear_wishlist(user.id).await?))
}

/// POST /wishlist/items
#[tracing::instrument(skip(state))]
pub async fn add_to_wishlist(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<ProductRef>,
) -> ApiResult<Json<Wishlist>> {
    let wishlist = state
        .storefront
        .carts
        .add_to_wishlist(user.id, req.product_id)
        .await?;
    Ok(Json(wishlist))
}

/// DELETE /wishlist/items/:product_id
#[tracing::instrument(skip(state))]
pub async fn remove_from_wishlist(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(product_id): Path<String>,
) -> ApiResult<Json<Wishlist>> {
    let product_id: ProductId = parse_id(&product_id, "product")?;
    let wishlist = state
        .storefront
        .carts
        .remove_from_wishlist(user.id, product_id)
        .await?;
    Ok(Json(wishlist))
}

/// POST /wishlist/move-to-cart
#[tracing::instrument(skip(state))]
pub async fn move_to_cart(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<ProductRef>,
) -> ApiResult<Json<MoveToCartResponse>> {
    let (cart, wishlist) = state
        .storefront
        .carts
        .move_to_cart(user.id, req.product_id)
        .await?;
    Ok(Json(MoveToCartResponse {
        cart: cart.into(),
        wishlist,
    }))
}
