//! Tunables shared by the workflow services.

use std::time::Duration;

use domain::PricingPolicy;

/// Checkout and payment settings.
#[derive(Debug, Clone)]
pub struct WorkflowSettings {
    /// Tax and shipping rules.
    pub pricing: PricingPolicy,
    /// ISO currency code used for orders and payment intents.
    pub currency: String,
    /// How many fresh order numbers to try before giving up.
    pub order_number_attempts: u32,
    /// Upper bound on every payment collaborator call.
    pub payment_timeout: Duration,
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            pricing: PricingPolicy::default(),
            currency: "usd".to_string(),
            order_number_attempts: 5,
            payment_timeout: Duration::from_secs(10),
        }
    }
}
