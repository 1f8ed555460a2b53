//! Checkout and order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use common::{OrderId, Page, UserId};
use domain::{Order, OrderStatus};
use serde::Deserialize;
use store::OrderQuery;
use workflow::{CheckoutRequest, OrderTracking};

use super::{PageParams, parse_id};
use crate::AppState;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::{ApiError, ApiResult};

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct AdminOrdersQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub status: Option<String>,
    pub user_id: Option<UserId>,
    pub from: Option<DateTime<Utc>>,
    pub to: Option<DateTime<Utc>>,
}

impl AdminOrdersQuery {
    fn to_query(&self) -> ApiResult<OrderQuery> {
        let mut query = match self.user_id {
            Some(user_id) => OrderQuery::for_user(user_id),
            None => OrderQuery::new(),
        };
        if let Some(status) = &self.status {
            let status = status
                .parse::<OrderStatus>()
                .map_err(|e| ApiError::BadRequest(e.to_string()))?;
            query = query.status(status);
        }
        if let Some(from) = self.from {
            query = query.from_timestamp(from);
        }
        if let Some(to) = self.to {
            query = query.to_timestamp(to);
        }
        Ok(query)
    }
}

#[derive(Debug, Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Debug, Deserialize)]
pub struct TrackingRequest {
    pub tracking_number: String,
}

// -- Customer handlers --

/// POST /orders
///
/// Turns the caller's cart into a pending order.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CheckoutRequest>,
) -> ApiResult<(StatusCode, Json<Order>)> {
    let order = state.storefront.orders.create_order(user.id, req).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

/// GET /orders
///
/// The caller's orders, newest first.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(page): Query<PageParams>,
) -> ApiResult<Json<Page<Order>>> {
    let orders = state
        .storefront
        .orders
        .list_orders(user.id, page.into())
        .await?;
    Ok(Json(orders))
}

/// GET /orders/:id
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    let id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.storefront.orders.get_order(user.id, id).await?))
}

/// GET /orders/:id/track
#[tracing::instrument(skip(state))]
pub async fn track(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<OrderTracking>> {
    let id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.storefront.orders.track_order(user.id, id).await?))
}

/// POST /orders/:id/cancel
#[tracing::instrument(skip(state))]
pub async fn cancel(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Order>> {
    let id: OrderId = parse_id(&id, "order")?;
    Ok(Json(state.storefront.orders.cancel_order(user.id, id).await?))
}

// -- Admin handlers --

/// GET /orders/admin/all
#[tracing::instrument(skip(state))]
pub async fn list_all(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<AdminOrdersQuery>,
) -> ApiResult<Json<Page<Order>>> {
    let query = params.to_query()?;
    let page = PageParams::new(params.page, params.limit).into();
    Ok(Json(state.storefront.orders.list_all(query, page).await?))
}

/// PUT /orders/admin/:id/status
#[tracing::instrument(skip(state))]
pub async fn update_status(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Path(id): Path<String>,
    Json(req): Json<UpdateStatusRequest>,
) -> ApiResult<Json<Order>> {
    let id: OrderId = parse_id(&id, "order")?;
    let order = state
        .storefront
        .orders
        .update_status(id, req.status, admin)
        .await?;
    Ok(Json(order))
}

/// PUT /orders/admin/:id/tracking
#[tracing::instrument(skip(state))]
pub async fn set_tracking(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(req): Json<TrackingRequest>,
) -> ApiResult<Json<Order>> {
    let id: OrderId = parse_id(&id, "order")?;
    let order = state
        .storefront
        .orders
        .set_tracking(id, &req.tracking_number)
        .await?;
    Ok(Json(order))
}
