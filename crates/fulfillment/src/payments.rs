//! Payment initiation, webhook reconciliation and refunds.

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, PaymentId, Requester};
use domain::{Money, Order, OrderStatus, Payment, PaymentMethod, PaymentStatus};
use serde::Serialize;
use store::{Store, StoreError, Transaction, TransactionExt};

use crate::error::{FulfillmentError, Result};
use crate::gateway::{
    GatewayError, GatewayEventKind, GatewayRegistry, IntentMetadata, WebhookHeaders,
};
use crate::inventory::InventoryLedger;
use crate::settings::Settings;

/// Client-side credentials returned by [`PaymentReconciler::initiate_payment`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PaymentInitiation {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
    pub method: PaymentMethod,
    pub gateway_transaction_id: String,
    /// Client secret (Stripe) or gateway order id (PayPal).
    pub client_credential: String,
    pub amount: Money,
    pub currency: String,
}

/// What a webhook delivery did to local state.
///
/// Every variant is acknowledged to the sender; only verification failures
/// are reported as errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WebhookOutcome {
    /// State was updated.
    Applied,
    /// The event repeated the current state.
    Duplicate,
    /// The event was irrelevant, stale or referenced missing data.
    Ignored,
}

impl WebhookOutcome {
    /// Returns the outcome as a metric label.
    pub fn as_str(&self) -> &'static str {
        match self {
            WebhookOutcome::Applied => "applied",
            WebhookOutcome::Duplicate => "duplicate",
            WebhookOutcome::Ignored => "ignored",
        }
    }
}

/// Owns the payment state machine and reconciles it with gateway signals.
#[derive(Clone)]
pub struct PaymentReconciler<S: Store> {
    store: S,
    gateways: Arc<GatewayRegistry>,
    settings: Settings,
}

impl<S: Store> PaymentReconciler<S> {
    /// Creates a new payment reconciler.
    pub fn new(store: S, gateways: Arc<GatewayRegistry>, settings: Settings) -> Self {
        Self {
            store,
            gateways,
            settings,
        }
    }

    /// Creates a gateway payment intent for the order's pending payment.
    #[tracing::instrument(skip(self), fields(order_id = %order_id, method = %method))]
    pub async fn initiate_payment(
        &self,
        order_id: OrderId,
        method: PaymentMethod,
        requester: Requester,
    ) -> Result<PaymentInitiation> {
        let gateway = self
            .gateways
            .get(method)
            .ok_or(FulfillmentError::GatewayNotConfigured(method))?;

        let mut tx = self.store.begin().await?;

        let order = tx
            .lock_order(order_id)
            .await?
            .ok_or(FulfillmentError::OrderNotFound(order_id))?;
        if order.customer_id != requester.user_id {
            return Err(FulfillmentError::UnauthorizedAccess(order_id));
        }

        let mut payment = tx
            .lock_payment_for_order(order_id)
            .await?
            .ok_or_else(|| FulfillmentError::PaymentNotFound(format!("order {order_id}")))?;
        if payment.status != PaymentStatus::Pending {
            return Err(FulfillmentError::PaymentNotPending {
                status: payment.status,
            });
        }
        if order.status != OrderStatus::Pending {
            return Err(FulfillmentError::Payment(format!(
                "Order is {} and no longer awaits payment",
                order.status
            )));
        }

        let metadata = IntentMetadata {
            payment_id: payment.id,
            order_id,
        };
        let intent = self
            .settings
            .call_external(
                "payment gateway",
                gateway.create_intent(payment.amount, &self.settings.currency, metadata),
            )
            .await
            .map_err(FulfillmentError::Payment)?;

        payment.method = Some(method);
        payment.gateway_transaction_id = Some(intent.gateway_transaction_id.clone());
        payment.updated_at = Utc::now();
        tx.update_payment(&payment).await?;
        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            gateway_transaction_id = %intent.gateway_transaction_id,
            "payment initiated"
        );

        Ok(PaymentInitiation {
            payment_id: payment.id,
            order_id,
            method,
            gateway_transaction_id: intent.gateway_transaction_id,
            client_credential: intent.client_credential,
            amount: payment.amount,
            currency: self.settings.currency.clone(),
        })
    }

    /// Verifies and applies a gateway webhook.
    ///
    /// Only a failed verification is an error. Unparseable, missing or
    /// inconsistent data behind a valid signature is logged and acknowledged
    /// so the gateway does not keep retrying.
    #[tracing::instrument(skip(self, payload, headers), fields(gateway = %method))]
    pub async fn handle_webhook(
        &self,
        method: PaymentMethod,
        payload: &str,
        headers: &WebhookHeaders,
    ) -> Result<WebhookOutcome> {
        let gateway = self
            .gateways
            .get(method)
            .ok_or(FulfillmentError::GatewayNotConfigured(method))?;

        let event = match gateway.verify_and_parse(payload, headers) {
            Ok(event) => event,
            Err(GatewayError::MalformedPayload(reason)) => {
                tracing::warn!(%reason, "signed webhook payload could not be parsed");
                return Ok(self.record_outcome(method, WebhookOutcome::Ignored));
            }
            Err(e) => {
                tracing::warn!(error = %e, "webhook rejected");
                metrics::counter!(
                    "payment_webhooks_total",
                    "gateway" => method.as_str(),
                    "outcome" => "rejected"
                )
                .increment(1);
                return Err(FulfillmentError::WebhookVerification(e.to_string()));
            }
        };

        let target = match &event.kind {
            GatewayEventKind::PaymentSucceeded => PaymentStatus::Success,
            GatewayEventKind::PaymentFailed => PaymentStatus::Failed,
            GatewayEventKind::Other(event_type) => {
                tracing::info!(%event_type, "ignoring unhandled webhook event");
                return Ok(self.record_outcome(method, WebhookOutcome::Ignored));
            }
        };

        let ids = event
            .payment_id
            .as_deref()
            .and_then(|p| p.parse::<PaymentId>().ok())
            .zip(
                event
                    .order_id
                    .as_deref()
                    .and_then(|o| o.parse::<OrderId>().ok()),
            );
        let Some((payment_id, order_id)) = ids else {
            tracing::warn!(
                payment_id = ?event.payment_id,
                order_id = ?event.order_id,
                "webhook without usable correlation metadata"
            );
            return Ok(self.record_outcome(method, WebhookOutcome::Ignored));
        };

        let outcome = self
            .apply_status_update(
                payment_id,
                order_id,
                target,
                event.gateway_transaction_id.as_deref(),
            )
            .await?;
        Ok(self.record_outcome(method, outcome))
    }

    fn record_outcome(&self, method: PaymentMethod, outcome: WebhookOutcome) -> WebhookOutcome {
        metrics::counter!(
            "payment_webhooks_total",
            "gateway" => method.as_str(),
            "outcome" => outcome.as_str()
        )
        .increment(1);
        outcome
    }

    /// Idempotently moves a payment to `target` and follows up on its order.
    async fn apply_status_update(
        &self,
        payment_id: PaymentId,
        order_id: OrderId,
        target: PaymentStatus,
        gateway_transaction_id: Option<&str>,
    ) -> Result<WebhookOutcome> {
        let mut tx = self.store.begin().await?;

        let Some(mut order) = tx.lock_order(order_id).await? else {
            tracing::warn!(%order_id, "webhook for unknown order");
            return Ok(WebhookOutcome::Ignored);
        };
        let Some(mut payment) = tx.lock_payment(payment_id).await? else {
            tracing::warn!(%payment_id, "webhook for unknown payment");
            return Ok(WebhookOutcome::Ignored);
        };
        if payment.order_id != order_id {
            tracing::warn!(%payment_id, %order_id, "webhook payment does not belong to order");
            return Ok(WebhookOutcome::Ignored);
        }

        if payment.status == target {
            tracing::info!(%payment_id, status = %target, "duplicate webhook delivery");
            return Ok(WebhookOutcome::Duplicate);
        }
        if payment.status == PaymentStatus::Refunded {
            tracing::warn!(%payment_id, status = %target, "webhook for refunded payment ignored");
            return Ok(WebhookOutcome::Ignored);
        }
        if payment.status.is_terminal() {
            tracing::warn!(
                %payment_id,
                from = %payment.status,
                to = %target,
                "gateway reversed a settled payment, trusting latest signal"
            );
        }

        let now = Utc::now();
        payment.status = target;
        if let Some(id) = gateway_transaction_id {
            payment.gateway_transaction_id = Some(id.to_string());
        }
        payment.updated_at = now;
        tx.update_payment(&payment).await?;

        match target {
            PaymentStatus::Success => self.on_payment_succeeded(&mut tx, &mut order).await?,
            _ => self.on_payment_failed(&mut tx, &mut order).await?,
        }

        tx.commit().await?;
        tracing::info!(%payment_id, status = %target, order_status = %order.status, "payment reconciled");
        Ok(WebhookOutcome::Applied)
    }

    async fn on_payment_succeeded(&self, tx: &mut S::Tx, order: &mut Order) -> Result<()> {
        if order.status == OrderStatus::Cancelled {
            tracing::error!(
                order_id = %order.id,
                "payment captured for a cancelled order, manual follow-up required"
            );
            metrics::counter!("payment_reconcile_conflicts_total").increment(1);
            return Ok(());
        }
        if !order.status.can_transition_to(OrderStatus::Processing) {
            return Ok(());
        }

        let change = order.transition_to(OrderStatus::Processing, "payment captured", Utc::now())?;
        tx.save_status_change(order, &change).await?;
        Ok(())
    }

    async fn on_payment_failed(&self, tx: &mut S::Tx, order: &mut Order) -> Result<()> {
        match order.status {
            OrderStatus::Cancelled => Ok(()),
            OrderStatus::Shipped | OrderStatus::Delivered => {
                tracing::error!(
                    order_id = %order.id,
                    status = %order.status,
                    "payment failed for a fulfilled order, manual follow-up required"
                );
                metrics::counter!("payment_reconcile_conflicts_total").increment(1);
                Ok(())
            }
            OrderStatus::Pending | OrderStatus::Processing => {
                InventoryLedger::release_items(tx, &order.items).await?;
                let change =
                    order.transition_to(OrderStatus::Cancelled, "payment failed", Utc::now())?;
                tx.save_status_change(order, &change).await?;
                Ok(())
            }
        }
    }

    /// Refunds a captured payment in full.
    #[tracing::instrument(skip(self), fields(payment_id = %payment_id))]
    pub async fn initiate_refund(
        &self,
        payment_id: PaymentId,
        requester: Requester,
    ) -> Result<Payment> {
        if !requester.is_admin() {
            return Err(FulfillmentError::AdminRequired);
        }

        // Resolve the owning order first so locks are taken order before payment.
        let order_id = self
            .store
            .payment(payment_id)
            .await?
            .ok_or_else(|| FulfillmentError::PaymentNotFound(payment_id.to_string()))?
            .order_id;

        let mut tx = self.store.begin().await?;
        tx.lock_order(order_id).await?;
        let mut payment = tx
            .lock_payment(payment_id)
            .await?
            .ok_or_else(|| FulfillmentError::PaymentNotFound(payment_id.to_string()))?;

        let refund_id = refund_within(&self.gateways, &self.settings, &mut tx, &mut payment).await?;
        if let Err(e) = tx.commit().await {
            report_unrecorded_refund(payment.id, &refund_id, &e);
            return Err(e.into());
        }
        Ok(payment)
    }
}

/// Flags a refund the gateway issued but the store failed to record.
pub(crate) fn report_unrecorded_refund(
    payment_id: PaymentId,
    refund_id: &str,
    error: &dyn std::fmt::Display,
) {
    tracing::error!(
        %payment_id,
        %refund_id,
        %error,
        "refund issued but not recorded, manual follow-up required"
    );
    metrics::counter!("payment_reconcile_conflicts_total").increment(1);
}

/// Refunds `payment` through its gateway and persists the result in `tx`.
///
/// On error the payment is left untouched.
pub(crate) async fn refund_within<T: Transaction>(
    gateways: &GatewayRegistry,
    settings: &Settings,
    tx: &mut T,
    payment: &mut Payment,
) -> Result<String> {
    let result = refund_inner(gateways, settings, tx, payment).await;
    let outcome = if result.is_ok() { "success" } else { "failed" };
    metrics::counter!("refunds_total", "outcome" => outcome).increment(1);
    result
}

async fn refund_inner<T: Transaction>(
    gateways: &GatewayRegistry,
    settings: &Settings,
    tx: &mut T,
    payment: &mut Payment,
) -> Result<String> {
    if payment.status != PaymentStatus::Success {
        return Err(FulfillmentError::RefundNotAllowed(format!(
            "Payment is not in SUCCESS status (current: {})",
            payment.status
        )));
    }
    let method = payment.method.ok_or_else(|| {
        FulfillmentError::RefundNotAllowed("Payment has no gateway method".to_string())
    })?;
    let gateway = gateways
        .get(method)
        .ok_or(FulfillmentError::GatewayNotConfigured(method))?;
    let transaction_id = payment
        .gateway_transaction_id
        .as_deref()
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| {
            FulfillmentError::RefundNotAllowed("Missing gateway transaction id".to_string())
        })?;

    let receipt = settings
        .call_external(
            "refund",
            gateway.create_refund(transaction_id, payment.amount),
        )
        .await
        .map_err(FulfillmentError::Refund)?;

    let mut refunded = payment.clone();
    refunded
        .mark_refunded(receipt.refund_id.clone(), Utc::now())
        .map_err(|e| FulfillmentError::Refund(e.to_string()))?;
    if let Err(e) = tx.update_payment(&refunded).await {
        report_unrecorded_refund(payment.id, &receipt.refund_id, &e);
        return Err(match e {
            StoreError::NotFound { .. } => {
                FulfillmentError::PaymentNotFound(payment.id.to_string())
            }
            other => FulfillmentError::Store(other),
        });
    }
    *payment = refunded;

    tracing::info!(payment_id = %payment.id, refund_id = %receipt.refund_id, "payment refunded");
    Ok(receipt.refund_id)
}
