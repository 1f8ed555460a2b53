//! Catalog endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use common::{Page, ProductId};
use domain::{Product, ProductDraft, ProductPatch};
use serde::{Deserialize, Serialize};
use store::{ProductQuery, ProductSort};
use workflow::ImageUpload;

use super::{PageParams, parse_id};
use crate::AppState;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::{ApiError, ApiResult};

// -- Request types --

#[derive(Debug, Default, Deserialize)]
pub struct ListProductsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub category: Option<String>,
    #[serde(default)]
    pub featured: bool,
    /// newest, price_asc, price_desc or name.
    pub sort: Option<String>,
    /// Admins only.
    #[serde(default)]
    pub low_stock: bool,
}

#[derive(Debug, Default, Deserialize)]
pub struct FeaturedQuery {
    pub limit: Option<u32>,
}

/// Default size of the featured listing.
const FEATURED_LIMIT: u32 = 10;

/// Parses an optional `?sort=` value.
pub(crate) fn parse_sort(raw: Option<&str>) -> Result<ProductSort, ApiError> {
    raw.map(str::parse)
        .transpose()
        .map(Option::unwrap_or_default)
        .map_err(ApiError::BadRequest)
}

// -- Response types --

/// A product with its derived stock and pricing flags.
#[derive(Debug, Serialize)]
pub struct ProductResponse {
    #[serde(flatten)]
    pub product: Product,
    pub in_stock: bool,
    pub is_low_stock: bool,
    pub discount_percentage: Option<u32>,
}

impl From<Product> for ProductResponse {
    fn from(product: Product) -> Self {
        Self {
            in_stock: product.in_stock(),
            is_low_stock: product.is_low_stock(),
            discount_percentage: product.discount_percentage(),
            product,
        }
    }
}

// -- Handlers --

/// GET /products
///
/// Active products for shoppers; everything for admins.
#[tracing::instrument(skip(state))]
pub async fn list(
    State(state): State<Arc<AppState>>,
    user: Option<CurrentUser>,
    Query(params): Query<ListProductsQuery>,
) -> ApiResult<Json<Page<ProductResponse>>> {
    let is_admin = user.is_some_and(|u| u.is_admin());
    let mut query = if is_admin {
        ProductQuery::new().low_stock_only(params.low_stock)
    } else {
        ProductQuery::storefront()
    };
    if let Some(category) = params.category {
        query = query.category(category);
    }
    query = query
        .featured_only(params.featured)
        .sort(parse_sort(params.sort.as_deref())?);

    let page = state
        .storefront
        .catalog
        .list_products(query, PageParams::new(params.page, params.limit).into())
        .await?;
    Ok(Json(page.map(ProductResponse::from)))
}

/// GET /products/featured?limit=
#[tracing::instrument(skip(state))]
pub async fn featured(
    State(state): State<Arc<AppState>>,
    Query(params): Query<FeaturedQuery>,
) -> ApiResult<Json<Vec<ProductResponse>>> {
    let products = state
        .storefront
        .catalog
        .featured_products(params.limit.unwrap_or(FEATURED_LIMIT))
        .await?;
    Ok(Json(products.into_iter().map(ProductResponse::from).collect()))
}

/// GET /products/:id
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProductResponse>> {
    let id: ProductId = parse_id(&id, "product")?;
    let product = state.storefront.catalog.get_product(id).await?;
    Ok(Json(product.into()))
}

/// POST /products
#[tracing::instrument(skip(state, draft))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    AdminUser(admin): AdminUser,
    Json(draft): Json<ProductDraft>,
) -> ApiResult<(StatusCode, Json<ProductResponse>)> {
    let product = state
        .storefront
        .catalog
        .create_product(draft, Some(admin))
        .await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// PUT /products/:id
///
/// Every field except stock.
#[tracing::instrument(skip(state, patch))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Json(patch): Json<ProductPatch>,
) -> ApiResult<Json<ProductResponse>> {
    let id: ProductId = parse_id(&id, "product")?;
    let product = state.storefront.catalog.update_product(id, patch).await?;
    Ok(Json(product.into()))
}

/// DELETE /products/:id
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: ProductId = parse_id(&id, "product")?;
    state.storefront.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct UploadQuery {
    pub filename: Option<String>,
    pub alt: Option<String>,
}

/// POST /products/:id/images
///
/// The raw image is the request body.
#[tracing::instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn upload_image(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
    Query(query): Query<UploadQuery>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<(StatusCode, Json<ProductResponse>)> {
    let id: ProductId = parse_id(&id, "product")?;
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    let upload = ImageUpload {
        bytes: body.to_vec(),
        filename: query.filename.unwrap_or_else(|| "image".to_string()),
        content_type,
        alt: query.alt,
    };

    let product = state.storefront.catalog.upload_image(id, upload).await?;
    Ok((StatusCode::CREATED, Json(product.into())))
}

/// DELETE /products/:id/images/:asset_id
#[tracing::instrument(skip(state))]
pub async fn remove_image(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path((id, asset_id)): Path<(String, String)>,
) -> ApiResult<Json<ProductResponse>> {
    let id: ProductId = parse_id(&id, "product")?;
    let product = state
        .storefront
        .catalog
        .remove_image(id, &asset_id)
        .await?;
    Ok(Json(product.into()))
}
