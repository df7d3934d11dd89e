//! Stripe payment intents and webhooks.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use domain::{Money, PaymentMethod};
use serde::Deserialize;
use sha2::{Digest, Sha256};

use super::{
    GatewayCredentials, GatewayError, GatewayEvent, GatewayEventKind, IntentMetadata,
    PaymentGateway, PaymentIntent, RefundReceipt, SandboxBackend, WebhookHeaders, signature,
};

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
struct StripeEvent {
    #[serde(rename = "type")]
    event_type: String,
    data: StripeEventData,
}

#[derive(Debug, Deserialize)]
struct StripeEventData {
    object: StripeObject,
}

#[derive(Debug, Deserialize)]
struct StripeObject {
    id: Option<String>,
    #[serde(default)]
    metadata: HashMap<String, String>,
}

/// Stripe adapter.
///
/// Webhooks carry `Stripe-Signature: t=<unix>,v1=<hex>` where the signature
/// covers `"<t>.<payload>"`.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    credentials: GatewayCredentials,
    backend: SandboxBackend,
}

impl StripeGateway {
    /// Creates an adapter backed by the in-process sandbox.
    pub fn new(credentials: GatewayCredentials) -> Self {
        Self {
            credentials,
            backend: SandboxBackend::new("pi_", "re_"),
        }
    }

    /// Returns the sandbox backend for inspection and fault injection.
    pub fn backend(&self) -> &SandboxBackend {
        &self.backend
    }

    /// Produces the `Stripe-Signature` header value Stripe would send.
    pub fn signature_header(&self, payload: &str, timestamp: i64) -> Result<String, GatewayError> {
        let signed = signature::sign(
            &self.credentials.webhook_secret,
            &format!("{timestamp}.{payload}"),
        )?;
        Ok(format!("t={timestamp},v1={signed}"))
    }

    fn client_secret(&self, intent_id: &str) -> String {
        let digest = Sha256::new()
            .chain_update(self.credentials.api_key.as_bytes())
            .chain_update(intent_id.as_bytes())
            .finalize();
        format!("{intent_id}_secret_{}", &hex::encode(digest)[..24])
    }

    fn verify(&self, payload: &str, headers: &WebhookHeaders) -> Result<(), GatewayError> {
        let header = headers.require(SIGNATURE_HEADER)?;

        let mut timestamp = None;
        let mut candidates = Vec::new();
        for part in header.split(',') {
            match part.trim().split_once('=') {
                Some(("t", value)) => timestamp = value.parse::<i64>().ok(),
                Some(("v1", value)) => candidates.push(value),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(GatewayError::MalformedHeader(SIGNATURE_HEADER))?;
        if candidates.is_empty() {
            return Err(GatewayError::MalformedHeader(SIGNATURE_HEADER));
        }

        if Utc::now().timestamp().abs_diff(timestamp) > self.credentials.tolerance.as_secs() {
            return Err(GatewayError::StaleTimestamp);
        }

        let message = format!("{timestamp}.{payload}");
        let mut result = Err(GatewayError::InvalidSignature);
        for candidate in candidates {
            result = signature::verify(&self.credentials.webhook_secret, &message, candidate);
            if result.is_ok() {
                break;
            }
        }
        result
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn method(&self) -> PaymentMethod {
        PaymentMethod::Stripe
    }

    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, GatewayError> {
        let id = self.backend.create_intent(amount, currency, metadata)?;
        Ok(PaymentIntent {
            client_credential: self.client_secret(&id),
            gateway_transaction_id: id,
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

        let event: StripeEvent = serde_json::from_str(payload)
            .map_err(|e| GatewayError::MalformedPayload(e.to_string()))?;

        let kind = match event.event_type.as_str() {
            "payment_intent.succeeded" => GatewayEventKind::PaymentSucceeded,
            "payment_intent.payment_failed" => GatewayEventKind::PaymentFailed,
            _ => GatewayEventKind::Other(event.event_type),
        };
        let mut object = event.data.object;

        Ok(GatewayEvent {
            kind,
            gateway_transaction_id: object.id,
            payment_id: object.metadata.remove("paymentId"),
            order_id: object.metadata.remove("orderId"),
        })
    }
}
