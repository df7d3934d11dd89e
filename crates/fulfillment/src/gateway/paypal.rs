//! PayPal orders and webhooks.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use domain::{Money, PaymentMethod};
use serde::Deserialize;

use super::{
    GatewayCredentials, GatewayError, GatewayEvent, GatewayEventKind, IntentMetadata,
    PaymentGateway, PaymentIntent, RefundReceipt, SandboxBackend, WebhookHeaders, signature,
};

const TRANSMISSION_ID: &str = "paypal-transmission-id";
const TRANSMISSION_TIME: &str = "paypal-transmission-time";
const TRANSMISSION_SIG: &str = "paypal-transmission-sig";

#[derive(Debug, Deserialize)]
struct PayPalEvent {
    event_type: String,
    resource: PayPalResource,
}

#[derive(Debug, Deserialize)]
struct PayPalResource {
    id: Option<String>,
    /// `"<paymentId>:<orderId>"`, set when the order was created.
    custom_id: Option<String>,
}

/// PayPal adapter.
///
/// The client credential is the PayPal order id itself. Webhook signatures
/// cover `"<transmission id>|<transmission time>|<payload>"`.
#[derive(Debug, Clone)]
pub struct PayPalGateway {
    credentials: GatewayCredentials,
    backend: SandboxBackend,
}

impl PayPalGateway {
    /// Creates an adapter backed by the in-process sandbox.
    pub fn new(credentials: GatewayCredentials) -> Self {
        Self {
            credentials,
            backend: SandboxBackend::new("PAYPAL-", "PAYPAL-REFUND-"),
        }
    }

    /// Returns the sandbox backend for inspection and fault injection.
    pub fn backend(&self) -> &SandboxBackend {
        &self.backend
    }

    /// Produces the transmission headers PayPal would send.
    pub fn signed_headers(
        &self,
        transmission_id: &str,
        transmission_time: DateTime<Utc>,
        payload: &str,
    ) -> Result<WebhookHeaders, GatewayError> {
        let time = transmission_time.to_rfc3339();
        let signed = signature::sign(
            &self.credentials.webhook_secret,
            &format!("{transmission_id}|{time}|{payload}"),
        )?;
        Ok(WebhookHeaders::new()
            .with(TRANSMISSION_ID, transmission_id)
            .with(TRANSMISSION_TIME, time)
            .with(TRANSMISSION_SIG, signed))
    }

    fn verify(&self, payload: &str, headers: &WebhookHeaders) -> Result<(), GatewayError> {
        let transmission_id = headers.require(TRANSMISSION_ID)?;
        let time = headers.require(TRANSMISSION_TIME)?;
        let sig = headers.require(TRANSMISSION_SIG)?;

        let sent_at = DateTime::parse_from_rfc3339(time)
            .map_err(|_| GatewayError::MalformedHeader(TRANSMISSION_TIME))?;
        let age = Utc::now().signed_duration_since(sent_at).num_seconds();
        if age.unsigned_abs() > self.credentials.tolerance.as_secs() {
            return Err(GatewayError::StaleTimestamp);
        }

        signature::verify(
            &self.credentials.webhook_secret,
            &format!("{transmission_id}|{time}|{payload}"),
            sig,
        )
    }
}

#[async_trait]
impl PaymentGateway for PayPalGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::PayPal
    }

    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, GatewayError> {
        let order_id = self
            .backend
            .create_intent(amount, &currency.to_ascii_uppercase(), metadata)?;
        Ok(PaymentIntent {
            client_credential: order_id.clone(),
            gateway_transaction_id: order_id,
        })
    }

    async fn create_refund(
        &self,
        gateway_transaction_id: &str,
        amount: Money,
    ) -> Result<RefundReceipt, GatewayError> {
        let refund_id = self.backend.create_refund(gateway_transaction_id, amount)?;
        Ok(RefundReceipt { refund_id })
    }

    fn verify_and_parse(
        &self,
        payload: &str,
        headers: &WebhookHeaders,
    ) -> Result<GatewayEvent, GatewayError> {
        self.verify(payload, headers)?;

        let event: PayPalEvent = serde_json::from_str(payload)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

        let kind = match event.event_type.as_str() {
            "PAYMENT.CAPTURE.COMPLETED" => GatewayEventKind::PaymentSucceeded,
            "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.DECLINED" => {
                GatewayEventKind::PaymentFailed
            }
            _ => GatewayEventKind::Other(event.event_type),
        };

        let (payment_id, order_id) = match event
            .resource
            .custom_id
            .as_deref()
            .and_then(|c| c.split_once(':'))
        {
            Some((payment, order)) => (Some(payment.to_string()), Some(order.to_string())),
            None => (None, None),
        };

        Ok(GatewayEvent {
            kind,
            gateway_transaction_id: event.resource.id,
            payment_id,
            order_id,
        })
    }
}
