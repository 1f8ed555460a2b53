//! Inventory administration endpoints.

use std::sync::Arc;

use analytics::AuditReport;
use axum::Json;
use axum::extract::{Query, State};
use common::{Page, ProductId};
use domain::{InventoryLogEntry, LedgerEntryType};
use serde::Deserialize;
use workflow::{
    AdjustmentOutcome, AdjustmentRequest, BulkUpdateResult, InventoryOverview, StockLevel,
};

use super::PageParams;
use crate::AppState;
use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct OverviewQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    #[serde(default)]
    pub low_stock: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub product_id: Option<ProductId>,
    #[serde(rename = "type")]
    pub entry_type: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct BulkUpdateRequest {
    pub updates: Vec<StockLevel>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AuditQuery {
    pub product_id: Option<ProductId>,
}

/// GET /inventory
///
/// Products by stock, lowest first, plus totals.
#[tracing::instrument(skip(state))]
pub async fn overview(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<OverviewQuery>,
) -> ApiResult<Json<InventoryOverview>> {
    let page = PageParams::new(params.page, params.limit).into();
    let overview = state
        .storefront
        .inventory
        .overview(params.low_stock, page)
        .await?;
    Ok(Json(overview))
}

/// GET /inventory/logs?product_id=&type=
#[tracing::instrument(skip(state))]
pub async fn logs(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<LogsQuery>,
) -> ApiResult<Json<Page<InventoryLogEntry>>> {
    let entry_type = params
        .entry_type
        .as_deref()
        .map(str::parse::<LedgerEntryType>)
        .transpose()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let page = PageParams::new(params.page, params.limit).into();
    let logs = state
        .storefront
        .inventory
        .logs(params.product_id, entry_type, page)
        .await?;
    Ok(Json(logs))
}

/// POST /inventory/adjust
#[tracing::instrument(skip(state))]
pub async fn adjust(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<AdjustmentRequest>,
) -> ApiResult<Json<AdjustmentOutcome>> {
    Ok(Json(state.storefront.inventory.adjust(req, admin).await?))
}

/// POST /inventory/bulk-update
#[tracing::instrument(skip(state, req), fields(count = req.updates.len()))]
pub async fn bulk_update(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(req): Json<BulkUpdateRequest>,
) -> ApiResult<Json<Vec<BulkUpdateResult>>> {
    let results = state
        .storefront
        .inventory
        .bulk_update(req.updates, admin)
        .await?;
    Ok(Json(results))
}

/// GET /inventory/audit
///
/// Replays the ledger against current stock.
#[tracing::instrument(skip(state))]
pub async fn audit(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<AuditQuery>,
) -> ApiResult<Json<AuditReport>> {
    Ok(Json(state.audit.run(params.product_id).await?))
}
