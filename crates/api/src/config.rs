//! Application configuration loaded from environment variables.

use std::sync::Arc;
use std::time::Duration;

use common::Money;
use domain::{FlatRateShipping, PricingPolicy};
use workflow::WorkflowSettings;

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
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
/// - `HOST`: bind address (default `0.0.0.0`)
/// - `PORT`: listen port (default `3000`)
/// - `RUST_LOG`: tracing filter directive (default `info`)
/// - `LOG_FORMAT`: `text` or `json` (default `text`)
/// - `DATABASE_URL`: PostgreSQL URL; unset runs on the in-memory store
/// - `DATABASE_MAX_CONNECTIONS`: pool size (default `10`)
/// - `PAYMENT_WEBHOOK_SECRET`: notification signing secret
/// - `PAYMENT_TIMEOUT_MS`: bound on payment provider calls (default `10000`)
/// - `CURRENCY`: order currency (default `usd`)
/// - `TAX_RATE_BPS`: tax in basis points of the subtotal (default `1000`)
/// - `SHIPPING_FLAT_CENTS`: flat shipping charge (default `0`)
/// - `FREE_SHIPPING_THRESHOLD_CENTS`: subtotal that waives shipping (unset)
/// - `ORDER_NUMBER_ATTEMPTS`: order number retries (default `5`)
/// - `ASSET_BASE_URL`: public prefix for uploaded images
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub payment_webhook_secret: String,
    pub payment_timeout: Duration,
    pub currency: String,
    pub tax_rate_bps: u32,
    pub shipping_flat: Money,
    pub free_shipping_threshold: Option<Money>,
    pub order_number_attempts: u32,
    pub asset_base_url: String,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`, falling back to defaults for
    /// missing or unparseable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let parsed = |key: &str| lookup(key).and_then(|v| v.trim().parse::<i64>().ok());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .map(|f| LogFormat::parse(&f))
                .unwrap_or(defaults.log_format),
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            database_max_connections: lookup("DATABASE_MAX_CONNECTIONS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.database_max_connections),
            payment_webhook_secret: lookup("PAYMENT_WEBHOOK_SECRET")
                .unwrap_or(defaults.payment_webhook_secret),
            payment_timeout: lookup("PAYMENT_TIMEOUT_MS")
                .and_then(|ms| ms.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(defaults.payment_timeout),
            currency: lookup("CURRENCY")
                .map(|c| c.to_lowercase())
                .unwrap_or(defaults.currency),
            tax_rate_bps: lookup("TAX_RATE_BPS")
                .and_then(|bps| bps.parse().ok())
                .unwrap_or(defaults.tax_rate_bps),
            shipping_flat: parsed("SHIPPING_FLAT_CENTS")
                .map(Money::from_cents)
                .unwrap_or(defaults.shipping_flat),
            free_shipping_threshold: parsed("FREE_SHIPPING_THRESHOLD_CENTS").map(Money::from_cents),
            order_number_attempts: lookup("ORDER_NUMBER_ATTEMPTS")
                .and_then(|n| n.parse().ok())
                .unwrap_or(defaults.order_number_attempts),
            asset_base_url: lookup("ASSET_BASE_URL").unwrap_or(defaults.asset_base_url),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Checkout and payment settings for the workflow services.
    pub fn workflow_settings(&self) -> WorkflowSettings {
        let shipping = FlatRateShipping {
            flat: self.shipping_flat,
            free_threshold: self.free_shipping_threshold,
        };
        WorkflowSettings {
            pricing: PricingPolicy::new(self.tax_rate_bps, Arc::new(shipping)),
            currency: self.currency.clone(),
            order_number_attempts: self.order_number_attempts,
            payment_timeout: self.payment_timeout,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            database_max_connections: 10,
            payment_webhook_secret: "whsec_test".to_string(),
            payment_timeout: Duration::from_millis(10_000),
            currency: "usd".to_string(),
            tax_rate_bps: 1000,
            shipping_flat: Money::zero(),
            free_shipping_threshold: None,
            order_number_attempts: 5,
            asset_base_url: "http://localhost:3000/assets".to_string(),
        }
    }
}
