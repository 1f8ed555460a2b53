//! Payment intent and notification endpoints.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use chrono::Utc;
use common::OrderId;
use serde::Deserialize;
use workflow::services::PaymentIntent;
use workflow::{ConfirmOutcome, PaymentSummary, WebhookOutcome, WorkflowError};

use super::parse_id;
use crate::AppState;
use crate::auth::CurrentUser;
use crate::error::ApiResult;

/// Header carrying the provider's notification signature.
pub const SIGNATURE_HEADER: &str = "payment-signature";

#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub order_id: OrderId,
}

#[derive(Debug, Deserialize)]
pub struct ConfirmRequest {
    pub payment_intent_id: String,
    pub payment_method: String,
}

/// POST /payments/intent
///
/// The amount comes from the stored order.
#[tracing::instrument(skip(state))]
pub async fn create_intent(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<CreateIntentRequest>,
) -> ApiResult<(StatusCode, Json<PaymentIntent>)> {
    let intent = state
        .storefront
        .payments
        .create_intent(user.id, req.order_id)
        .await?;
    Ok((StatusCode::CREATED, Json(intent)))
}

/// POST /payments/confirm
#[tracing::instrument(skip(state))]
pub async fn confirm(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(req): Json<ConfirmRequest>,
) -> ApiResult<Json<ConfirmOutcome>> {
    let outcome = state
        .storefront
        .payments
        .confirm(user.id, &req.payment_intent_id, &req.payment_method)
        .await?;
    Ok(Json(outcome))
}

/// GET /payments/:order_id
#[tracing::instrument(skip(state))]
pub async fn status(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(order_id): Path<String>,
) -> ApiResult<Json<PaymentSummary>> {
    let order_id: OrderId = parse_id(&order_id, "order")?;
    let summary = state
        .storefront
        .payments
        .payment_status(user.id, order_id)
        .await?;
    Ok(Json(summary))
}

/// POST /payments/webhook
///
/// Authenticated by signature only. Any error response makes the provider
/// redeliver.
#[tracing::instrument(skip(state, headers, body), fields(bytes = body.len()))]
pub async fn webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<WebhookOutcome>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(WorkflowError::InvalidSignature)?;

    let outcome = state
        .storefront
        .payments
        .handle_webhook(&body, signature, Utc::now())
        .await?;
    Ok(Json(outcome))
}
