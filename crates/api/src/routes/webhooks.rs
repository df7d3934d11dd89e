//! Inbound webhooks from payment gateways and carriers.
//!
//! Gateways retry on any non-2xx answer, so every delivery that passes
//! verification is acknowledged, including duplicates and events the core
//! chooses to ignore.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::State;
use axum::http::HeaderMap;
use domain::PaymentMethod;
use fulfillment::{WebhookHeaders, WebhookOutcome};
use serde::{Deserialize, Serialize};
use store::Store;

use super::orders::ShipmentResponse;
use crate::AppState;
use crate::error::ApiError;

#[derive(Serialize)]
pub struct WebhookResponse {
    pub received: bool,
    pub outcome: WebhookOutcome,
}

#[derive(Deserialize)]
pub struct CarrierWebhookRequest {
    pub tracking_number: String,
    pub status: String,
    pub details: Option<String>,
}

#[derive(Serialize)]
pub struct CarrierWebhookResponse {
    pub received: bool,
    pub outcome: WebhookOutcome,
    pub shipment: ShipmentResponse,
}

/// POST /webhooks/stripe
#[tracing::instrument(skip_all)]
pub async fn stripe<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    payment_webhook(&state, PaymentMethod::Stripe, &headers, &body).await
}

/// POST /webhooks/paypal
#[tracing::instrument(skip_all)]
pub async fn paypal<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookResponse>, ApiError> {
    payment_webhook(&state, PaymentMethod::PayPal, &headers, &body).await
}

async fn payment_webhook<S: Store + Clone + 'static>(
    state: &AppState<S>,
    method: PaymentMethod,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<Json<WebhookResponse>, ApiError> {
    let payload = utf8_payload(body)?;
    let outcome = state
        .payments
        .handle_webhook(method, payload, &webhook_headers(headers))
        .await?;

    Ok(Json(WebhookResponse {
        received: true,
        outcome,
    }))
}

/// POST /webhooks/carrier
///
/// When a carrier secret is configured the raw body must carry a valid
/// `x-carrier-signature`.
#[tracing::instrument(skip_all)]
pub async fn carrier<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CarrierWebhookResponse>, ApiError> {
    let payload = utf8_payload(&body)?;
    state
        .shipments
        .verify_webhook(payload, &webhook_headers(&headers))?;
    let request: CarrierWebhookRequest = serde_json::from_str(payload)
        .map_err(|e| ApiError::BadRequest(format!("Invalid carrier webhook body: {e}")))?;

    let update = state
        .shipments
        .handle_webhook_update(
            &request.tracking_number,
            &request.status,
            request.details.as_deref(),
        )
        .await?;

    Ok(Json(CarrierWebhookResponse {
        received: true,
        outcome: update.outcome,
        shipment: ShipmentResponse::from(&update.shipment),
    }))
}

fn utf8_payload(body: &[u8]) -> Result<&str, ApiError> {
    std::str::from_utf8(body)
        .map_err(|_| ApiError::BadRequest("Webhook payload is not valid UTF-8".to_string()))
}

fn webhook_headers(headers: &HeaderMap) -> WebhookHeaders {
    headers
        .iter()
        .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
        .collect()
}
