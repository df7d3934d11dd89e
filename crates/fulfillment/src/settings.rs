//! Runtime settings shared by the engine and reconcilers.

use std::future::Future;
use std::time::Duration;

/// Tunables injected at construction.
#[derive(Debug, Clone)]
pub struct Settings {
    /// ISO currency code passed to payment gateways.
    pub currency: String,
    /// Upper bound on every payment gateway and carrier call.
    pub gateway_timeout: Duration,
    /// Shared secret for carrier webhook signatures. `None` accepts unsigned
    /// updates.
    pub carrier_webhook_secret: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            currency: "usd".to_string(),
            gateway_timeout: Duration::from_millis(10_000),
            carrier_webhook_secret: None,
        }
    }
}

impl Settings {
    /// Runs an external call under the gateway timeout.
    ///
    /// Both a timeout and an adapter error come back as a message for the
    /// caller to wrap in its own error variant.
    pub(crate) async fn call_external<T, E, F>(&self, what: &str, call: F) -> Result<T, String>
    where
        E: std::fmt::Display,
        F: Future<Output = Result<T, E>>,
    {
        match tokio::time::timeout(self.gateway_timeout, call).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(e.to_string()),
            Err(_) => Err(format!(
                "{what} timed out after {}ms",
                self.gateway_timeout.as_millis()
            )),
        }
    }
}
