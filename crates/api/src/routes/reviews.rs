//! Review endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use common::{Page, ProductId, ReviewId};
use domain::{Review, ReviewDraft, ReviewPatch};
use serde::Deserialize;
use workflow::{HelpfulVote, ProductReviews};

use super::{PageParams, parse_id};
use crate::AppState;
use crate::auth::{AdminUser, CurrentUser};
use crate::error::ApiResult;

#[derive(Debug, Default, Deserialize)]
pub struct AdminReviewsQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub approved: Option<bool>,
}

/// GET /reviews/products/:product_id
///
/// Published reviews and the product's rating.
#[tracing::instrument(skip(state))]
pub async fn for_product(
    State(state): State<Arc<AppState>>,
    Path(product_id): Path<String>,
    Query(params): Query<PageParams>,
) -> ApiResult<Json<ProductReviews>> {
    let product_id: ProductId = parse_id(&product_id, "product")?;
    let reviews = state
        .storefront
        .reviews
        .product_reviews(product_id, params.into())
        .await?;
    Ok(Json(reviews))
}

/// POST /reviews/products/:product_id
#[tracing::instrument(skip(state, draft))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(product_id): Path<String>,
    Json(draft): Json<ReviewDraft>,
) -> ApiResult<(StatusCode, Json<Review>)> {
    let product_id: ProductId = parse_id(&product_id, "product")?;
    let review = state
        .storefront
        .reviews
        .create_review(user.id, product_id, draft)
        .await?;
    Ok((StatusCode::CREATED, Json(review)))
}

/// PUT /reviews/:id
#[tracing::instrument(skip(state, patch))]
pub async fn update(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
    Json(patch): Json<ReviewPatch>,
) -> ApiResult<Json<Review>> {
    let id: ReviewId = parse_id(&id, "review")?;
    let review = state
        .storefront
        .reviews
        .update_review(user.id, id, patch)
        .await?;
    Ok(Json(review))
}

/// DELETE /reviews/:id
#[tracing::instrument(skip(state))]
pub async fn remove(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: ReviewId = parse_id(&id, "review")?;
    state
        .storefront
        .reviews
        .delete_review(user.id, user.is_admin(), id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /reviews/:id/helpful
#[tracing::instrument(skip(state))]
pub async fn helpful(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<String>,
) -> ApiResult<Json<HelpfulVote>> {
    let id: ReviewId = parse_id(&id, "review")?;
    Ok(Json(state.storefront.reviews.mark_helpful(id).await?))
}

/// GET /reviews/admin/all?approved=
#[tracing::instrument(skip(state))]
pub async fn list_all(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Query(params): Query<AdminReviewsQuery>,
) -> ApiResult<Json<Page<Review>>> {
    let page = PageParams::new(params.page, params.limit).into();
    let reviews = state
        .storefront
        .reviews
        .list_all(params.approved, page)
        .await?;
    Ok(Json(reviews))
}

/// PUT /reviews/admin/:id/approve
#[tracing::instrument(skip(state))]
pub async fn approve(
    State(state): State<Arc<AppState>>,
    _admin: AdminUser,
    Path(id): Path<String>,
) -> ApiResult<Json<Review>> {
    let id: ReviewId = parse_id(&id, "review")?;
    Ok(Json(state.storefront.reviews.approve(id).await?))
}
