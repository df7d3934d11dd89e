//! Payment gateway contract and the adapters implementing it.

mod paypal;
mod sandbox;
pub mod signature;
mod stripe;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{OrderId, PaymentId};
use domain::{Money, PaymentMethod};
use thiserror::Error;

pub use paypal::PayPalGateway;
pub use sandbox::SandboxBackend;
pub use stripe::StripeGateway;

/// Errors raised by payment gateway adapters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// The gateway refused the request.
    #[error("Gateway declined the request: {0}")]
    Declined(String),

    /// The gateway could not be reached.
    #[error("Gateway unavailable: {0}")]
    Unavailable(String),

    #[error("Missing webhook header: {0}")]
    MissingHeader(&'static str),

    #[error("Malformed webhook header: {0}")]
    MalformedHeader(&'static str),

    #[error("Webhook signature mismatch")]
    InvalidSignature,

    #[error("Webhook timestamp outside tolerance")]
    StaleTimestamp,

    #[error("Webhook secret is not configured")]
    MissingSecret,

    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(String),
}

/// Credentials an adapter is constructed with at process start.
#[derive(Debug, Clone)]
pub struct GatewayCredentials {
    pub api_key: String,
    pub webhook_secret: String,
    /// Maximum age of a signed webhook.
    pub tolerance: Duration,
}

impl GatewayCredentials {
    /// Creates credentials with the default five minute webhook tolerance.
    pub fn new(api_key: impl Into<String>, webhook_secret: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            webhook_secret: webhook_secret.into(),
            tolerance: Duration::from_secs(300),
        }
    }

    /// Overrides the webhook tolerance.
    pub fn with_tolerance(mut self, tolerance: Duration) -> Self {
        self.tolerance = tolerance;
        self
    }
}

/// Correlation data attached to a payment intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntentMetadata {
    pub payment_id: PaymentId,
    pub order_id: OrderId,
}

/// Result of creating a payment intent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentIntent {
    /// Gateway identifier used to correlate webhooks and refunds.
    pub gateway_transaction_id: String,
    /// Credential handed to the client to complete payment.
    pub client_credential: String,
}

/// Result of a refund call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundReceipt {
    pub refund_id: String,
}

/// Kind of a verified gateway event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayEventKind {
    PaymentSucceeded,
    PaymentFailed,
    /// Any event type the reconciler does not act on.
    Other(String),
}

/// A verified and parsed webhook event.
///
/// Correlation ids are kept as received; the reconciler decides what to do
/// with missing or unparseable values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayEvent {
    pub kind: GatewayEventKind,
    pub gateway_transaction_id: Option<String>,
    pub payment_id: Option<String>,
    pub order_id: Option<String>,
}

/// Webhook request headers with case-insensitive lookup.
#[derive(Debug, Clone, Default)]
pub struct WebhookHeaders {
    headers: HashMap<String, String>,
}

impl WebhookHeaders {
    /// Creates an empty header set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a header, replacing any previous value.
    pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
        self.headers
            .insert(name.as_ref().to_ascii_lowercase(), value.into());
    }

    /// Builder-style [`WebhookHeaders::insert`].
    pub fn with(mut self, name: impl AsRef<str>, value: impl Into<String>) -> Self {
        self.insert(name, value);
        self
    }

    /// Looks up a header by name.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// Looks up a header that must be present.
    pub fn require(&self, name: &'static str) -> Result<&str, GatewayError> {
        self.get(name).ok_or(GatewayError::MissingHeader(name))
    }
}

impl<K: AsRef<str>, V: Into<String>> FromIterator<(K, V)> for WebhookHeaders {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut headers = WebhookHeaders::new();
        for (name, value) in iter {
            headers.insert(name, value);
        }
        headers
    }
}

/// Contract every payment gateway adapter fulfils.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// The payment method this adapter serves.
    fn method(&self) -> PaymentMethod;

    /// Creates a payment intent for `amount`.
    async fn create_intent(
        &self,
        amount: Money,
        currency: &str,
        metadata: IntentMetadata,
    ) -> Result<PaymentIntent, GatewayError>;

    /// Refunds a captured payment in full.
    async fn create_refund(
        &self,
        gateway_transaction_id: &str,
        amount: Money,
    ) -> Result<RefundReceipt, GatewayError>;

    /// Verifies the webhook signature, then parses the event.
    ///
    /// Nothing in `payload` is inspected before the signature checks out.
    fn verify_and_parse(
        &self,
        payload: &str,
        headers: &WebhookHeaders,
    ) -> Result<GatewayEvent, GatewayError>;
}

/// Lookup table from payment method to its adapter.
#[derive(Clone, Default)]
pub struct GatewayRegistry {
    gateways: HashMap<PaymentMethod, Arc<dyn PaymentGateway>>,
}

impl GatewayRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an adapter under its own method, replacing any previous one.
    pub fn register(&mut self, gateway: Arc<dyn PaymentGateway>) {
        self.gateways.insert(gateway.method(), gateway);
    }

    /// Builder-style [`GatewayRegistry::register`].
    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.register(gateway);
        self
    }

    /// Returns the adapter for `method`.
    pub fn get(&self, method: PaymentMethod) -> Option<Arc<dyn PaymentGateway>> {
        self.gateways.get(&method).cloned()
    }

    /// Returns the configured methods.
    pub fn methods(&self) -> Vec<PaymentMethod> {
        PaymentMethod::ALL
            .into_iter()
            .filter(|m| self.gateways.contains_key(m))
            .collect()
    }
}

impl std::fmt::Debug for GatewayRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayRegistry")
            .field("methods", &self.methods())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_are_case_insensitive() {
        let headers = WebhookHeaders::new().with("Stripe-Signature", "t=1,v1=ab");
        assert_eq!(headers.get("stripe-signature"), Some("t=1,v1=ab"));
        assert_eq!(headers.get("STRIPE-SIGNATURE"), Some("t=1,v1=ab"));
        assert_eq!(
            headers.require("paypal-transmission-id"),
            Err(GatewayError::MissingHeader("paypal-transmission-id"))
        );
    }

    #[test]
    fn test_registry_lookup() {
        let registry = GatewayRegistry::new().with(Arc::new(StripeGateway::new(
            GatewayCredentials::new("sk_test", "whsec_test"),
        )));

        assert!(registry.get(PaymentMethod::Stripe).is_some());
        assert!(registry.get(PaymentMethod::PayPal).is_none());
        assert_eq!(registry.methods(), vec![PaymentMethod::Stripe]);
    }
}
