//! Admin analytics endpoints.

use std::sync::Arc;

use analytics::{
    CustomerReport, DEFAULT_RANKING_LIMIT, DateRange, Grouping, Period, ProductPerformance,
    Ranking, SalesDashboard, SalesReport,
};
use axum::Json;
use axum::extract::{Query, State};
use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;

use crate::AppState;
use crate::auth::AdminUser;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    pub period: Option<String>,
}

/// `?start_date=&end_date=`, either RFC 3339 timestamps or plain dates.
#[derive(Debug, Default, Deserialize)]
pub struct RangeQuery {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub group_by: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ProductsQuery {
    pub limit: Option<usize>,
    pub sort_by: Option<String>,
}

/// A plain date covers the whole day: the start bound is its first
/// instant, the end bound its last.
fn parse_bound(raw: &str, field: &str, end_of_day: bool) -> Result<DateTime<Utc>, ApiError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let invalid = || ApiError::BadRequest(format!("Invalid {field}: {raw}"));
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| invalid())?;
    let at = if end_of_day {
        date.and_hms_milli_opt(23, 59, 59, 999)
    } else {
        date.and_hms_opt(0, 0, 0)
    };
    at.map(|dt| dt.and_utc()).ok_or_else(invalid)
}

fn parse_range(params: &RangeQuery) -> ApiResult<DateRange> {
    let start = params
        .start_date
        .as_deref()
        .map(|raw| parse_bound(raw, "start_date", false))
        .transpose()?;
    let end = params
        .end_date
        .as_deref()
        .map(|raw| parse_bound(raw, "end_date", true))
        .transpose()?;
    Ok(DateRange::new(start, end)?)
}

/// GET /analytics/dashboard?period=today|week|month|year|all
#[tracing::instrument(skip(state))]
pub async fn dashboard(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<DashboardQuery>,
) -> ApiResult<Json<SalesDashboard>> {
    let period = match params.period.as_deref() {
        Some(raw) => raw.parse::<Period>()?,
        None => Period::default(),
    };
    Ok(Json(state.dashboards.dashboard(period, Utc::now()).await?))
}

/// GET /analytics/sales?start_date=&end_date=&group_by=day|week|month
#[tracing::instrument(skip(state))]
pub async fn sales(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<RangeQuery>,
) -> ApiResult<Json<SalesReport>> {
    let range = parse_range(&params)?;
    let group_by = match params.group_by.as_deref() {
        Some(raw) => raw.parse::<Grouping>()?,
        None => Grouping::default(),
    };
    Ok(Json(state.reports.sales(range, group_by).await?))
}

/// GET /analytics/products?limit=&sort_by=revenue|sales
#[tracing::instrument(skip(state))]
pub async fn products(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<ProductsQuery>,
) -> ApiResult<Json<Vec<ProductPerformance>>> {
    let ranking = match params.sort_by.as_deref() {
        Some(raw) => raw.parse::<Ranking>()?,
        None => Ranking::default(),
    };
    let limit = params.limit.unwrap_or(DEFAULT_RANKING_LIMIT);
    Ok(Json(state.reports.products(ranking, limit).await?))
}

/// GET /analytics/customers?start_date=&end_date=
#[tracing::instrument(skip(state))]
pub async fn customers(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<RangeQuery>,
) -> ApiResult<Json<CustomerReport>> {
    let range = parse_range(&params)?;
    Ok(Json(state.reports.customers(range).await?))
}
