//! Shipment creation and carrier webhook reconciliation.

use std::collections::BTreeMap;

use chrono::Utc;
use common::{OrderId, Requester, ShipmentId};
use domain::{OrderStatus, Parcel, Product, ProductId, Shipment, ShipmentStatus};
use serde::Serialize;
use store::{Store, StoreError, Transaction, TransactionExt};

use crate::carrier::{Carrier, normalize_status};
use crate::error::{FulfillmentError, Result};
use crate::gateway::{WebhookHeaders, signature};
use crate::payments::WebhookOutcome;
use crate::settings::Settings;

/// Header carrying the hex HMAC-SHA256 of a carrier webhook body.
pub const CARRIER_SIGNATURE_HEADER: &str = "x-carrier-signature";

/// Result of [`ShipmentReconciler::handle_webhook_update`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShipmentUpdate {
    pub shipment: Shipment,
    pub outcome: WebhookOutcome,
}

/// Owns the shipment state machine.
#[derive(Clone)]
pub struct ShipmentReconciler<S: Store, C: Carrier> {
    store: S,
    carrier: C,
    settings: Settings,
}

impl<S: Store, C: Carrier> ShipmentReconciler<S, C> {
    /// Creates a new shipment reconciler.
    pub fn new(store: S, carrier: C, settings: Settings) -> Self {
        Self {
            store,
            carrier,
            settings,
        }
    }

    /// Books a shipment with the carrier and marks the order shipped.
    ///
    /// Ships from the seller's warehouse. Nothing is persisted when the
    /// carrier call fails.
    #[tracing::instrument(skip(self))]
    pub async fn create_shipment_for_order(
        &self,
        order_id: OrderId,
        carrier_name: &str,
        requester: Requester,
    ) -> Result<Shipment> {
        if !requester.is_admin() {
            return Err(FulfillmentError::AdminRequired);
        }

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        if !order.status.can_transition_to(OrderStatus::Shipped) {
            return Err(FulfillmentError::InvalidStatusTransition {
                from: order.status,
                to: OrderStatus::Shipped,
            });
        }

        let to = tx
            .find_address(order.shipping_address_id, order.customer_id)
            .await?
            .ok_or_else(|| {
                FulfillmentError::ShipmentNotReady("shipping address is missing".to_string())
            })?;
        let seller = tx.find_seller(order.seller_id).await?.ok_or_else(|| {
            FulfillmentError::ShipmentNotReady(format!("seller {} not found", order.seller_id))
        })?;
        let from = seller.warehouse_address.ok_or_else(|| {
            FulfillmentError::ShipmentNotReady(format!(
                "seller {} has no warehouse address",
                seller.id
            ))
        })?;

        let mut products: BTreeMap<ProductId, Product> = BTreeMap::new();
        for item in &order.items {
            if products.contains_key(&item.product_id) {
                continue;
            }
            let product = tx
                .lock_product(&item.product_id)
                .await?
                .ok_or_else(|| FulfillmentError::ProductNotFound(item.product_id.clone()))?;
            products.insert(item.product_id.clone(), product);
        }
        let parcel = Parcel::for_lines(
            order
                .items
                .iter()
                .filter_map(|item| products.get(&item.product_id).map(|p| (p, item.quantity))),
        );

        let booked = self
            .settings
            .call_external(
                "carrier",
                self.carrier
                    .create_shipment(&from, &to, &parcel, carrier_name),
            )
            .await
            .map_err(FulfillmentError::ShipmentCreation)?;

        let now = Utc::now();
        let shipment = Shipment {
            id: ShipmentId::new(),
            order_id,
            carrier: carrier_name.to_string(),
            tracking_number: booked.tracking_number,
            label_url: booked.label_url,
            status: normalize_status(&booked.initial_status),
            logistics_provider: self.carrier.provider().to_string(),
            created_at: now,
            updated_at: now,
        };
        tx.insert_shipment(&shipment).await.map_err(|e| match e {
            StoreError::Duplicate { key, .. } => {
                FulfillmentError::ShipmentCreation(format!("duplicate tracking number {key}"))
            }
            other => FulfillmentError::Store(other),
        })?;

        let change = order.transition_to(
            OrderStatus::Shipped,
            format!("shipped via {carrier_name} ({})", shipment.tracking_number),
            now,
        )?;
        tx.save_status_change(&order, &change).await?;
        tx.commit().await?;

        metrics::counter!("shipments_created_total").increment(1);
        tracing::info!(
            shipment_id = %shipment.id,
            tracking_number = %shipment.tracking_number,
            "shipment created"
        );
        Ok(shipment)
    }

    /// Applies a carrier status update.
    ///
    /// Unknown carrier statuses are treated as in transit. A delivered
    /// shipment advances its order to DELIVERED unless the order is already
    /// delivered or cancelled.
    #[tracing::instrument(skip(self, details))]
    pub async fn handle_webhook_update(
        &self,
        tracking_number: &str,
        external_status: &str,
        details: Option<&str>,
    ) -> Result<ShipmentUpdate> {
        let status = normalize_status(external_status);

        // Resolve the owning order first so locks are taken order before shipment.
        let order_id = self
            .store
            .shipment_by_tracking(tracking_number)
            .await?
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(tracking_number.to_string()))?
            .order_id;

        let mut tx = self.store.begin().await?;
        let order = tx.lock_order(order_id).await?;
        let mut shipment = tx
            .lock_shipment_by_tracking(tracking_number)
            .await?
            .ok_or_else(|| FulfillmentError::ShipmentNotFound(tracking_number.to_string()))?;

        if shipment.status == status {
            tracing::debug!(%status, "shipment status unchanged");
            return Ok(self.record(shipment, WebhookOutcome::Duplicate));
        }

        let now = Utc::now();
        let previous = shipment.status;
        shipment.status = status;
        shipment.updated_at = now;
        tx.update_shipment_status(&shipment).await?;

        if status == ShipmentStatus::Delivered
            && let Some(mut order) = order
            && !matches!(order.status, OrderStatus::Delivered | OrderStatus::Cancelled)
        {
            let reason = match details {
                Some(details) => format!("carrier reported delivery: {details}"),
                None => "carrier reported delivery".to_string(),
            };
            if let Some(change) = order.force_status(OrderStatus::Delivered, reason, now) {
                tx.save_status_change(&order, &change).await?;
            }
        }

        tx.commit().await?;
        tracing::info!(from = %previous, to = %status, details = ?details, "shipment status updated");
        Ok(self.record(shipment, WebhookOutcome::Applied))
    }

    /// Checks a carrier webhook body against the shared secret.
    ///
    /// Without a configured secret every delivery is accepted.
    pub fn verify_webhook(&self, payload: &str, headers: &WebhookHeaders) -> Result<()> {
        let Some(secret) = self.settings.carrier_webhook_secret.as_deref() else {
            return Ok(());
        };
        headers
            .require(CARRIER_SIGNATURE_HEADER)
            .and_then(|sig| signature::verify(secret, payload, sig))
            .map_err(|e| {
                tracing::warn!(error = %e, "carrier webhook rejected");
                metrics::counter!("shipment_webhooks_total", "outcome" => "rejected").increment(1);
                FulfillmentError::WebhookVerification(e.to_string())
            })
    }

    fn record(&self, shipment: Shipment, outcome: WebhookOutcome) -> ShipmentUpdate {
        metrics::counter!("shipment_webhooks_total", "outcome" => outcome.as_str()).increment(1);
        ShipmentUpdate { shipment, outcome }
    }
}
