//! Payment administration endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use store::Store;

use super::orders::PaymentResponse;
use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

/// POST /payments/:id/refund — refund a captured payment in full.
#[tracing::instrument(skip(state))]
pub async fn refund<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<PaymentResponse>, ApiError> {
    let payment = state
        .payments
        .initiate_refund(parse_id(&id)?, requester)
        .await?;
    Ok(Json(PaymentResponse::from(&payment)))
}
