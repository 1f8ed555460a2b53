//! Category endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{CategoryId, Page};
use domain::{Category, CategoryDraft, CategoryPatch};
use serde::{Deserialize, Serialize};
use workflow::{CategoryDetail, CategoryProducts};

use super::products::{ProductResponse, parse_sort};
use super::{PageParams, parse_id};
use crate::AppState;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct ListCategoriesQuery {
    /// Admins only.
    #[serde(default)]
    pub include_inactive: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct CategoryProductsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CategoryProductsResponse {
    pub category: Category,
    pub products: Page<ProductResponse>,
}

impl From<CategoryProducts> for CategoryProductsResponse {
    fn from(listing: CategoryProducts) -> Self {
        Self {
            category: listing.category,
            products: listing.products.map(ProductResponse::from),
        }
    }
}

/// GET /categories
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: Option<CurrentUser>,
    Query(params): Query<ListCategoriesQuery>,
) -> ApiResult<Json<Vec<CategoryDetail>>> {
    let active_only = !(params.include_inactive && user.is_some_and(|u| u.is_admin()));
    Ok(Json(
        state
            .storefront
            .categories
            .list_categories(active_only)
            .await?,
    ))
}

/// GET /categories/:id
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<CategoryDetail>> {
    let id: CategoryId = parse_id(&id, "category")?;
    Ok(Json(state.storefront.categories.get_category(id).await?))
}

/// GET /categories/:slug/products
///
/// Shares its first path segment with `/categories/:id`; here it is a slug.
#[tracing::instrument(skip(state))]
pub async fn products(
    State(state): State<Arc<AppState>>,
    Path(slug): Path<String>,
    Query(params): Query<CategoryProductsQuery>,
) -> ApiResult<Json<CategoryProductsResponse>> {
    let sort = parse_sort(params.sort.as_deref())?;
    let listing = state
        .storefront
        .categories
        .category_products(&slug, sort, PageParams::new(params.page, params.limit).into())
        .await?;
    Ok(Json(listing.into()))
}

/// POST /categories
#[tracing::instrument(skip(state, draft))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Json(draft): Json<CategoryDraft>,
) -> ApiResult<(StatusCode, Json<CategoryDetail>)> {
    let category = state.storefront.categories.create_category(draft).await?;
    Ok((StatusCode::CREATED, Json(category)))
}

/// PUT /categories/:id
#[tracing::instrument(skip(state, patch))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(patch): Json<CategoryPatch>,
) -> ApiResult<Json<CategoryDetail>> {
    let id: CategoryId = parse_id(&id, "category")?;
    Ok(Json(
        state.storefront.categories.update_category(id, patch).await?,
    ))
}

/// DELETE /categories/:id
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: CategoryId = parse_id(&id, "category")?;
    state.storefront.categories.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
