//! Order lifecycle endpoints.

use std::sync::Arc;

use axum::Json;
use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use domain::{
    OrderDetails, OrderItem, OrderStatus, Payment, PaymentMethod, Shipment, StatusChange,
};
use fulfillment::{Cancellation, NewOrder, PaymentInitiation, RefundOutcome};
use serde::{Deserialize, Serialize};
use store::Store;

use super::parse_id;
use crate::AppState;
use crate::error::ApiError;
use crate::identity::Identity;

// -- Request types --

#[derive(Deserialize)]
pub struct UpdateStatusRequest {
    pub status: OrderStatus,
}

#[derive(Deserialize)]
pub struct InitiatePaymentRequest {
    pub method: PaymentMethod,
}

#[derive(Deserialize)]
pub struct CreateShipmentRequest {
    pub carrier: String,
}

// -- Response types --

#[derive(Serialize)]
pub struct OrderResponse {
    pub id: String,
    pub order_number: String,
    pub customer_id: String,
    pub seller_id: String,
    pub shipping_address_id: String,
    pub billing_address_id: String,
    pub status: OrderStatus,
    pub items: Vec<OrderItemResponse>,
    pub total_cents: i64,
    pub total: String,
    pub payment: Option<PaymentResponse>,
    pub shipments: Vec<ShipmentResponse>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct OrderItemResponse {
    pub product_id: String,
    pub quantity: u32,
    pub price_at_purchase_cents: i64,
    pub line_total_cents: i64,
}

#[derive(Serialize)]
pub struct PaymentResponse {
    pub id: String,
    pub order_id: String,
    pub method: Option<PaymentMethod>,
    pub status: domain::PaymentStatus,
    pub amount_cents: i64,
    pub gateway_transaction_id: Option<String>,
    pub refund_transaction_id: Option<String>,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct ShipmentResponse {
    pub id: String,
    pub order_id: String,
    pub carrier: String,
    pub tracking_number: String,
    pub label_url: Option<String>,
    pub status: domain::ShipmentStatus,
    pub logistics_provider: String,
    pub updated_at: String,
}

#[derive(Serialize)]
pub struct CancellationResponse {
    pub order_id: String,
    pub status: OrderStatus,
    pub refund: RefundOutcome,
    pub already_cancelled: bool,
}

#[derive(Serialize)]
pub struct StatusChangeResponse {
    pub from: OrderStatus,
    pub to: OrderStatus,
    pub reason: String,
    pub changed_at: String,
}

impl From<&OrderItem> for OrderItemResponse {
    fn from(item: &OrderItem) -> Self {
        Self {
            product_id: item.product_id.to_string(),
            quantity: item.quantity,
            price_at_purchase_cents: item.price_at_purchase.cents(),
            line_total_cents: item.line_total().cents(),
        }
    }
}

impl From<&Payment> for PaymentResponse {
    fn from(payment: &Payment) -> Self {
        Self {
            id: payment.id.to_string(),
            order_id: payment.order_id.to_string(),
            method: payment.method,
            status: payment.status,
            amount_cents: payment.amount.cents(),
            gateway_transaction_id: payment.gateway_transaction_id.clone(),
            refund_transaction_id: payment.refund_transaction_id.clone(),
            updated_at: payment.updated_at.to_rfc3339(),
        }
    }
}

impl From<&Shipment> for ShipmentResponse {
    fn from(shipment: &Shipment) -> Self {
        Self {
            id: shipment.id.to_string(),
            order_id: shipment.order_id.to_string(),
            carrier: shipment.carrier.clone(),
            tracking_number: shipment.tracking_number.clone(),
            label_url: shipment.label_url.clone(),
            status: shipment.status,
            logistics_provider: shipment.logistics_provider.clone(),
            updated_at: shipment.updated_at.to_rfc3339(),
        }
    }
}

impl From<&OrderDetails> for OrderResponse {
    fn from(details: &OrderDetails) -> Self {
        let order = &details.order;
        Self {
            id: order.id.to_string(),
            order_number: order.order_number.to_string(),
            customer_id: order.customer_id.to_string(),
            seller_id: order.seller_id.to_string(),
            shipping_address_id: order.shipping_address_id.to_string(),
            billing_address_id: order.billing_address_id.to_string(),
            status: order.status,
            items: order.items.iter().map(OrderItemResponse::from).collect(),
            total_cents: order.total_amount.cents(),
            total: order.total_amount.to_string(),
            payment: details.payment.as_ref().map(PaymentResponse::from),
            shipments: details.shipments.iter().map(ShipmentResponse::from).collect(),
            created_at: order.created_at.to_rfc3339(),
            updated_at: order.updated_at.to_rfc3339(),
        }
    }
}

impl From<&StatusChange> for StatusChangeResponse {
    fn from(change: &StatusChange) -> Self {
        Self {
            from: change.from,
            to: change.to,
            reason: change.reason.clone(),
            changed_at: change.changed_at.to_rfc3339(),
        }
    }
}

impl From<Cancellation> for CancellationResponse {
    fn from(cancellation: Cancellation) -> Self {
        Self {
            order_id: cancellation.order.id.to_string(),
            status: cancellation.order.status,
            refund: cancellation.refund,
            already_cancelled: cancellation.already_cancelled,
        }
    }
}

// -- Handlers --

/// POST /orders — place an order for the calling customer.
#[tracing::instrument(skip(state, payload))]
pub async fn create<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    payload: Result<Json<NewOrder>, JsonRejection>,
) -> Result<(StatusCode, Json<OrderResponse>), ApiError> {
    let Json(request) = payload?;
    let details = state.engine.create_order(requester.user_id, request).await?;
    Ok((StatusCode::CREATED, Json(OrderResponse::from(&details))))
}

/// GET /orders/:id — load an order with its payment and shipments.
#[tracing::instrument(skip(state))]
pub async fn get<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<OrderResponse>, ApiError> {
    let details = state.engine.get_order(parse_id(&id)?, requester).await?;
    Ok(Json(OrderResponse::from(&details)))
}

/// PATCH /orders/:id/status — move an order along its transition table.
#[tracing::instrument(skip(state, payload))]
pub async fn update_status<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
    payload: Result<Json<UpdateStatusRequest>, JsonRejection>,
) -> Result<Json<OrderResponse>, ApiError> {
    let order_id = parse_id(&id)?;
    let Json(request) = payload?;
    state
        .engine
        .update_order_status(order_id, request.status, requester)
        .await?;
    let details = state.engine.get_order(order_id, requester).await?;
    Ok(Json(OrderResponse::from(&details)))
}

/// POST /orders/:id/cancel — cancel an order, refunding a captured payment.
#[tracing::instrument(skip(state))]
pub async fn cancel<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<CancellationResponse>, ApiError> {
    let cancellation = state.engine.cancel_order(parse_id(&id)?, requester).await?;
    Ok(Json(CancellationResponse::from(cancellation)))
}

/// GET /orders/:id/history — status audit trail, oldest first.
#[tracing::instrument(skip(state))]
pub async fn history<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
) -> Result<Json<Vec<StatusChangeResponse>>, ApiError> {
    let history = state.engine.order_history(parse_id(&id)?, requester).await?;
    Ok(Json(history.iter().map(StatusChangeResponse::from).collect()))
}

/// POST /orders/:id/payment — create a gateway intent for the pending payment.
#[tracing::instrument(skip(state, payload))]
pub async fn initiate_payment<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
    payload: Result<Json<InitiatePaymentRequest>, JsonRejection>,
) -> Result<Json<PaymentInitiation>, ApiError> {
    let order_id = parse_id(&id)?;
    let Json(request) = payload?;
    let initiation = state
        .payments
        .initiate_payment(order_id, request.method, requester)
        .await?;
    Ok(Json(initiation))
}

/// POST /orders/:id/shipments — book a shipment with the carrier.
#[tracing::instrument(skip(state, payload))]
pub async fn create_shipment<S: Store + Clone + 'static>(
    State(state): State<Arc<AppState<S>>>,
    Identity(requester): Identity,
    Path(id): Path<String>,
    payload: Result<Json<CreateShipmentRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<ShipmentResponse>), ApiError> {
    let order_id = parse_id(&id)?;
    let Json(request) = payload?;
    if request.carrier.trim().is_empty() {
        return Err(ApiError::BadRequest("carrier must not be empty".to_string()));
    }
    let shipment = state
        .shipments
        .create_shipment_for_order(order_id, request.carrier.trim(), requester)
        .await?;
    Ok((StatusCode::CREATED, Json(ShipmentResponse::from(&shipment))))
}
