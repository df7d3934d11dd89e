//! HTTP API server with observability for the order fulfillment system.
//!
//! Exposes the order lifecycle, payment initiation and refunds, shipment
//! booking and the gateway/carrier webhooks over REST, with structured
//! logging (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod identity;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, patch, post};
use fulfillment::{
    GatewayRegistry, OrderEngine, PayPalGateway, PaymentReconciler, SandboxCarrier,
    ShipmentReconciler, StripeGateway,
};
use metrics_exporter_prometheus::PrometheusHandle;
use store::Store;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;

/// Shared application state accessible from all handlers.
pub struct AppState<S: Store> {
    pub engine: OrderEngine<S>,
    pub payments: PaymentReconciler<S>,
    pub shipments: ShipmentReconciler<S, SandboxCarrier>,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app<S: Store + Clone + 'static>(
    state: Arc<AppState<S>>,
    metrics_handle: PrometheusHandle,
) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::create::<S>))
        .route("/orders/{id}", get(routes::orders::get::<S>))
        .route("/orders/{id}/status", patch(routes::orders::update_status::<S>))
        .route("/orders/{id}/cancel", post(routes::orders::cancel::<S>))
        .route("/orders/{id}/history", get(routes::orders::history::<S>))
        .route("/orders/{id}/payment", post(routes::orders::initiate_payment::<S>))
        .route("/orders/{id}/shipments", post(routes::orders::create_shipment::<S>))
        .route("/payments/{id}/refund", post(routes::payments::refund::<S>))
        .route("/webhooks/stripe", post(routes::webhooks::stripe::<S>))
        .route("/webhooks/paypal", post(routes::webhooks::paypal::<S>))
        .route("/webhooks/carrier", post(routes::webhooks::carrier::<S>))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the gateway lookup table from the configured credentials.
pub fn build_gateways(config: &Config) -> GatewayRegistry {
    let mut registry = GatewayRegistry::new();
    if let Some(credentials) = &config.stripe {
        registry.register(Arc::new(StripeGateway::new(credentials.clone())));
    }
    if let Some(credentials) = &config.paypal {
        registry.register(Arc::new(PayPalGateway::new(credentials.clone())));
    }
    if registry.methods().is_empty() {
        tracing::warn!("no payment gateway configured, payment endpoints will reject requests");
    }
    registry
}

/// Creates the application state over `store` with the sandbox carrier.
pub fn create_default_state<S: Store + Clone + 'static>(
    store: S,
    config: &Config,
) -> Arc<AppState<S>> {
    if config.carrier_webhook_secret.is_none() {
        tracing::warn!("CARRIER_WEBHOOK_SECRET not set, carrier webhooks are accepted unsigned");
    }
    create_state(store, build_gateways(config), SandboxCarrier::new(), config)
}

/// Creates the application state from explicit collaborators.
pub fn create_state<S: Store + Clone + 'static>(
    store: S,
    gateways: GatewayRegistry,
    carrier: SandboxCarrier,
    config: &Config,
) -> Arc<AppState<S>> {
    let gateways = Arc::new(gateways);
    let settings = config.settings();

    Arc::new(AppState {
        engine: OrderEngine::new(store.clone(), gateways.clone(), settings.clone()),
        payments: PaymentReconciler::new(store.clone(), gateways, settings.clone()),
        shipments: ShipmentReconciler::new(store, carrier, settings),
    })
}
