//! Application configuration loaded from environment variables.

use std::time::Duration;

use fulfillment::{GatewayCredentials, Settings};

/// Output format of the tracing subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    fn parse(value: &str) -> Self {
        if value.eq_ignore_ascii_case("json") {
            LogFormat::Json
        } else {
            LogFormat::Text
        }
    }
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `text` or `json` (default: `text`)
/// - `DATABASE_URL` — Postgres connection string; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS` — pool size (default: `10`)
/// - `PAYMENT_CURRENCY` — ISO currency passed to gateways (default: `"usd"`)
/// - `GATEWAY_TIMEOUT_MS` — bound on gateway and carrier calls (default: `10000`)
/// - `WEBHOOK_TOLERANCE_SECS` — accepted webhook clock skew (default: `300`)
/// - `STRIPE_API_KEY`, `STRIPE_WEBHOOK_SECRET` — enable the Stripe gateway
/// - `PAYPAL_CLIENT_ID`, `PAYPAL_WEBHOOK_SECRET` — enable the PayPal gateway
/// - `CARRIER_WEBHOOK_SECRET` — require signed carrier webhooks
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub currency: String,
    pub gateway_timeout: Duration,
    pub webhook_tolerance: Duration,
    pub stripe: Option<GatewayCredentials>,
    pub paypal: Option<GatewayCredentials>,
    pub carrier_webhook_secret: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds configuration from an arbitrary variable source.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let number = |key: &str, default: u64| {
            lookup(key)
                .and_then(|v| v.trim().parse::<u64>().ok())
                .unwrap_or(default)
        };
        let webhook_tolerance = Duration::from_secs(number(
            "WEBHOOK_TOLERANCE_SECS",
            defaults.webhook_tolerance.as_secs(),
        ));
        let credentials = |key_var: &str, secret_var: &str| {
            let api_key = lookup(key_var).filter(|v| !v.is_empty())?;
            let secret = lookup(secret_var).filter(|v| !v.is_empty())?;
            Some(GatewayCredentials::new(api_key, secret).with_tolerance(webhook_tolerance))
        };

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|v| !v.is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            currency: lookup("PAYMENT_CURRENCY")
                .map(|c| c.to_ascii_lowercase())
                .unwrap_or(defaults.currency),
            gateway_timeout: Duration::from_millis(number(
                "GATEWAY_TIMEOUT_MS",
                defaults.gateway_timeout.as_millis() as u64,
            )),
            webhook_tolerance,
            stripe: credentials("STRIPE_API_KEY", "STRIPE_WEBHOOK_SECRET"),
            paypal: credentials("PAYPAL_CLIENT_ID", "PAYPAL_WEBHOOK_SECRET"),
            carrier_webhook_secret: lookup("CARRIER_WEBHOOK_SECRET").filter(|v| !v.is_empty()),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the core engine settings.
    pub fn settings(&self) -> Settings {
        Settings {
            currency: self.currency.clone(),
            gateway_timeout: self.gateway_timeout,
            carrier_webhook_secret: self.carrier_webhook_secret.clone(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            currency: settings.currency,
            gateway_timeout: settings.gateway_timeout,
            webhook_tolerance: Duration::from_secs(300),
            stripe: None,
            paypal: None,
            carrier_webhook_secret: settings.carrier_webhook_secret,
        }
    }
}
