//! Server-side order pricing.

use std::fmt::Debug;
use std::sync::Arc;

use common::Money;
use serde::{Deserialize, Serialize};

use super::OrderLine;

/// Decides the shipping charge for an order.
pub trait ShippingPolicy: Debug + Send + Sync {
    fn shipping_cost(&self, subtotal: Money, total_items: u32) -> Money;
}

/// Flat shipping charge, waived at or above an optional threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FlatRateShipping {
    pub flat: Money,
    pub free_threshold: Option<Money>,
}

impl FlatRateShipping {
    /// Free shipping on every order.
    pub fn free() -> Self {
        Self::default()
    }
}

impl ShippingPolicy for FlatRateShipping {
    fn shipping_cost(&self, subtotal: Money, _total_items: u32) -> Money {
        match self.free_threshold {
            Some(threshold) if subtotal >= threshold => Money::zero(),
            _ => self.flat,
        }
    }
}

/// Monetary breakdown of an order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Totals {
    pub subtotal: Money,
    pub shipping_cost: Money,
    pub tax: Money,
    pub discount: Money,
    pub total: Money,
}

/// Tax and shipping rules applied at checkout.
#[derive(Debug, Clone)]
pub struct PricingPolicy {
    /// Tax rate in basis points; 1000 = 10%.
    pub tax_rate_bps: u32,
    pub shipping: Arc<dyn ShippingPolicy>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            tax_rate_bps: 1000,
            shipping: Arc::new(FlatRateShipping::free()),
        }
    }
}

impl PricingPolicy {
    pub fn new(tax_rate_bps: u32, shipping: Arc<dyn ShippingPolicy>) -> Self {
        Self {
            tax_rate_bps,
            shipping,
        }
    }

    /// `total = subtotal + shipping + tax - discount`, with the discount
    /// clamped to the subtotal.
    pub fn totals(&self, lines: &[OrderLine], discount: Money) -> Totals {
        let subtotal: Money = lines.iter().map(|l| l.line_total).sum();
        let total_items = lines.iter().map(|l| l.quantity).sum();
        let shipping_cost = self.shipping.shipping_cost(subtotal, total_items);
        let tax = subtotal.apply_basis_points(self.tax_rate_bps);
        let discount = discount.clamp_to(subtotal);

        Totals {
            subtotal,
            shipping_cost,
            tax,
            discount,
            total: subtotal + shipping_cost + tax - discount,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ProductId;

    fn lines() -> Vec<OrderLine> {
        vec![OrderLine::new(
            ProductId::new(),
            None,
            "Lamp",
            None,
            2,
            Money::from_cents(2500),
        )]
    }

    #[test]
    fn default_policy_charges_ten_percent_tax_and_free_shipping() {
        let totals = PricingPolicy::default().totals(&lines(), Money::zero());
        assert_eq!(totals.subtotal, Money::from_cents(5000));
        assert_eq!(totals.tax, Money::from_cents(500));
        assert_eq!(totals.shipping_cost, Money::zero());
        assert_eq!(totals.total, Money::from_cents(5500));
    }

    #[test]
    fn discount_is_clamped_to_subtotal() {
        let totals = PricingPolicy::default().totals(&lines(), Money::from_cents(9000));
        assert_eq!(totals.discount, Money::from_cents(5000));
        assert_eq!(totals.total, Money::from_cents(500));
    }

    #[test]
    fn flat_rate_waived_above_threshold() {
        let shipping = FlatRateShipping {
            flat: Money::from_cents(799),
            free_threshold: Some(Money::from_cents(5000)),
        };
        assert_eq!(shipping.shipping_cost(Money::from_cents(4999), 1), Money::from_cents(799));
        assert_eq!(shipping.shipping_cost(Money::from_cents(5000), 1), Money::zero());

        let policy = PricingPolicy::new(0, Arc::new(shipping));
        let totals = policy.totals(&lines()[..], Money::zero());
        assert_eq!(totals.total, Money::from_cents(5000));
    }
}
