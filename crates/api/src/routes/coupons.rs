//! Coupon endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{CouponId, Money};
use domain::{Coupon, CouponDraft};
use serde::Deserialize;
use workflow::CouponQuote;

use super::parse_id;
use crate::AppState;
use crate::auth::AdminUser;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct ValidateRequest {
    pub code: String,
    pub cart_total: Money,
}

/// POST /coupons/validate
///
/// Read-only; nothing is redeemed.
#[tracing::instrument(skip(state))]
pub async fn validate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ValidateRequest>,
) -> ApiResult<Json<CouponQuote>> {
    let quote = state
        .storefront
        .coupons
        .validate_coupon(&req.code, req.cart_total)
        .await?;
    Ok(Json(quote))
}

/// GET /coupons/admin/all
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
) -> ApiResult<Json<Vec<Coupon>>> {
    Ok(Json(state.storefront.coupons.list_coupons().await?))
}

/// GET /coupons/admin/:id
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Coupon>> {
    let id: CouponId = parse_id(&id, "coupon")?;
    Ok(Json(state.storefront.coupons.get_coupon(id).await?))
}

/// POST /coupons/admin
#[tracing::instrument(skip(state, draft))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(draft): Json<CouponDraft>,
) -> ApiResult<(StatusCode, Json<Coupon>)> {
    let coupon = state.storefront.coupons.create_coupon(draft).await?;
    Ok((StatusCode::CREATED, Json(coupon)))
}

/// PUT /coupons/admin/:id
#[tracing::instrument(skip(state, draft))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(draft): Json<CouponDraft>,
) -> ApiResult<Json<Coupon>> {
    let id: CouponId = parse_id(&id, "coupon")?;
    Ok(Json(state.storefront.coupons.update_coupon(id, draft).await?))
}

/// DELETE /coupons/admin/:id
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: CouponId = parse_id(&id, "coupon")?;
    state.storefront.coupons.delete_coupon(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
