//! Order engine: creation, reads, status changes and cancellation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use common::{AddressId, OrderId, Requester, SellerId, UserId};
use domain::{
    Order, OrderDetails, OrderItem, OrderStatus, Payment, PaymentStatus, Product, ProductId,
    StatusChange,
};
use serde::{Deserialize, Serialize};
use store::{Store, Transaction, TransactionExt};

use crate::error::{FulfillmentError, Result};
use crate::gateway::GatewayRegistry;
use crate::inventory::InventoryLedger;
use crate::payments::{refund_within, report_unrecorded_refund};
use crate::settings::Settings;

/// One requested order line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderLine {
    pub product_id: ProductId,
    pub quantity: u32,
}

/// Input to [`OrderEngine::create_order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewOrder {
    pub shipping_address_id: AddressId,
    pub billing_address_id: AddressId,
    pub items: Vec<OrderLine>,
}

/// Result of the refund step of a cancellation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RefundOutcome {
    /// No captured payment to return.
    NotRequired,
    Refunded { refund_id: String },
    /// The gateway refused or timed out; the order was cancelled anyway.
    Failed { reason: String },
}

/// Result of [`OrderEngine::cancel_order`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cancellation {
    pub order: Order,
    pub refund: RefundOutcome,
    /// True when the order was already cancelled and nothing changed.
    pub already_cancelled: bool,
}

/// Core orchestrator of the order lifecycle.
///
/// Every mutating operation runs in one store transaction. Stock is
/// reserved at creation, before any payment, and only comes back through
/// cancellation or a failed payment.
#[derive(Clone)]
pub struct OrderEngine<S: Store> {
    store: S,
    gateways: Arc<GatewayRegistry>,
    settings: Settings,
}

impl<S: Store> OrderEngine<S> {
    /// Creates a new order engine.
    pub fn new(store: S, gateways: Arc<GatewayRegistry>, settings: Settings) -> Self {
        Self {
            store,
            gateways,
            settings,
        }
    }

    /// Places an order, reserving stock and creating its pending payment.
    #[tracing::instrument(skip(self, request), fields(customer_id = %customer_id, lines = request.items.len()))]
    pub async fn create_order(&self, customer_id: UserId, request: NewOrder) -> Result<OrderDetails> {
        let started = Instant::now();

        if request.items.is_empty() {
            return Err(FulfillmentError::EmptyOrder);
        }
        if let Some(line) = request.items.iter().find(|l| l.quantity == 0) {
            return Err(FulfillmentError::InvalidQuantity {
                product_id: line.product_id.clone(),
                quantity: line.quantity,
            });
        }

        let mut tx = self.store.begin().await?;

        tx.find_customer(customer_id)
            .await?
            .ok_or(FulfillmentError::CustomerNotFound(customer_id))?;
        for address_id in [request.shipping_address_id, request.billing_address_id] {
            tx.find_address(address_id, customer_id)
                .await?
                .ok_or(FulfillmentError::AddressNotFound(address_id))?;
        }

        // Lock every product up front in id order, then walk the lines as requested.
        let mut catalog: BTreeMap<ProductId, Option<Product>> = BTreeMap::new();
        for line in &request.items {
            catalog.entry(line.product_id.clone()).or_default();
        }
        for (product_id, slot) in catalog.iter_mut() {
            *slot = tx.lock_product(product_id).await?;
        }

        let order_id = OrderId::new();
        let mut seller: Option<SellerId> = None;
        let mut items = Vec::with_capacity(request.items.len());

        for line in &request.items {
            let product = catalog
                .get(&line.product_id)
                .and_then(Option::as_ref)
                .ok_or_else(|| FulfillmentError::ProductNotFound(line.product_id.clone()))?;

            match (seller, product.seller_id) {
                (Some(expected), Some(actual)) if expected != actual => {
                    return Err(FulfillmentError::MultiSellerOrder {
                        product_id: line.product_id.clone(),
                    });
                }
                (None, Some(actual)) => seller = Some(actual),
                _ => {}
            }

            let reserved = InventoryLedger::reserve(&mut tx, &line.product_id, line.quantity).await?;
            items.push(OrderItem::new(
                order_id,
                line.product_id.clone(),
                line.quantity,
                reserved.price,
            )?);
        }

        let seller_id = seller.ok_or_else(|| {
            FulfillmentError::OrderCreation("no seller could be derived from the items".to_string())
        })?;

        let now = Utc::now();
        let order = Order::new(
            order_id,
            customer_id,
            seller_id,
            request.shipping_address_id,
            request.billing_address_id,
            items,
            now,
        );
        let payment = Payment::pending(order.id, order.total_amount, now);

        tx.insert_order(&order).await?;
        tx.insert_payment(&payment).await?;
        tx.commit().await?;

        metrics::counter!("orders_created_total").increment(1);
        metrics::histogram!("order_creation_duration_seconds")
            .record(started.elapsed().as_secs_f64());
        tracing::info!(
            order_id = %order.id,
            order_number = %order.order_number,
            total = %order.total_amount,
            "order created"
        );

        Ok(OrderDetails {
            order,
            payment: Some(payment),
            shipments: Vec::new(),
        })
    }

    /// Loads an order visible to the requester.
    #[tracing::instrument(skip(self))]
    pub async fn get_order(&self, order_id: OrderId, requester: Requester) -> Result<OrderDetails> {
        let details = self
            .store
            .order_details(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        if !requester.may_access(details.order.customer_id) {
            return Err(FulfillmentError::UnauthorizedAccess(order_id));
        }
        Ok(details)
    }

    /// Returns the status audit trail of an order visible to the requester.
    pub async fn order_history(
        &self,
        order_id: OrderId,
        requester: Requester,
    ) -> Result<Vec<StatusChange>> {
        self.get_order(order_id, requester).await?;
        Ok(self.store.order_history(order_id).await?)
    }

    /// Moves an order to `new_status` on behalf of an administrator.
    ///
    /// Only moves allowed by the order transition table are accepted; asking
    /// for the current status is a no-op.
    #[tracing::instrument(skip(self))]
    pub async fn update_order_status(
        &self,
        order_id: OrderId,
        new_status: OrderStatus,
        requester: Requester,
    ) -> Result<Order> {
        if !requester.is_admin() {
            return Err(FulfillmentError::AdminRequired);
        }

        let mut tx = self.store.begin().await?;
        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;

        if order.status == new_status {
            return Ok(order);
        }

        let reason = format!("status set by administrator {}", requester.user_id);
        let change = order.transition_to(new_status, reason, Utc::now())?;
        tx.save_status_change(&order, &change).await?;
        tx.commit().await?;

        tracing::info!(from = %change.from, to = %change.to, "order status updated");
        Ok(order)
    }

    /// Cancels an order, restoring stock and refunding a captured payment.
    ///
    /// Stock is always restored. A refund failure is logged and reported in
    /// the result; it never blocks the cancellation.
    #[tracing::instrument(skip(self))]
    pub async fn cancel_order(&self, order_id: OrderId, requester: Requester) -> Result<Cancellation> {
        let mut tx = self.store.begin().await?;

        let mut order = tx
            .lock_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        if !requester.may_access(order.customer_id) {
            return Err(FulfillmentError::UnauthorizedAccess(order_id));
        }

        match order.status {
            OrderStatus::Shipped | OrderStatus::Delivered => {
                return Err(FulfillmentError::OrderCancellation {
                    status: order.status,
                });
            }
            OrderStatus::Cancelled => {
                tracing::info!("order already cancelled");
                return Ok(Cancellation {
                    order,
                    refund: RefundOutcome::NotRequired,
                    already_cancelled: true,
                });
            }
            OrderStatus::Pending | OrderStatus::Processing => {}
        }

        let mut payment = tx.lock_payment_for_order(order_id).await?;
        InventoryLedger::release_items(&mut tx, &order.items).await?;

        let refund = match payment.as_mut() {
            Some(payment) if payment.status == PaymentStatus::Success => {
                match refund_within(&self.gateways, &self.settings, &mut tx, payment).await {
                    Ok(refund_id) => RefundOutcome::Refunded { refund_id },
                    Err(e) => {
                        tracing::warn!(
                            payment_id = %payment.id,
                            error = %e,
                            "refund failed during cancellation, manual follow-up required"
                        );
                        RefundOutcome::Failed {
                            reason: e.to_string(),
                        }
                    }
                }
            }
            _ => RefundOutcome::NotRequired,
        };

        let reason = if requester.is_admin() {
            "cancelled by administrator"
        } else {
            "cancelled by customer"
        };
        let change = order.transition_to(OrderStatus::Cancelled, reason, Utc::now())?;
        let saved = tx.save_status_change(&order, &change).await;
        let persisted = match saved {
            Ok(()) => tx.commit().await,
            Err(e) => Err(e),
        };
        if let Err(e) = persisted {
            if let (RefundOutcome::Refunded { refund_id }, Some(payment)) = (&refund, &payment) {
                report_unrecorded_refund(payment.id, refund_id, &e);
            }
            return Err(e.into());
        }

        metrics::counter!("orders_cancelled_total").increment(1);
        tracing::info!(refund = ?refund, "order cancelled");

        Ok(Cancellation {
            order,
            refund,
            already_cancelled: false,
        })
    }
}
