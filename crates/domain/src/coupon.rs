//! Coupons and discount calculation.

use chrono::{DateTime, Utc};
use common::{CouponId, Money};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::{DomainError, Validator};

/// Reasons a coupon cannot be applied, checked in this order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CouponError {
    #[error("Invalid coupon code")]
    InvalidCode,

    #[error("Coupon is not active")]
    NotActive,

    #[error("Coupon has expired")]
    Expired,

    #[error("Coupon usage limit has been reached")]
    UsageLimitReached,

    #[error("Minimum order amount of {minimum} required")]
    MinimumNotMet { minimum: Money },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscountType {
    /// `value` is in basis points of the cart total: 1250 is 12.5%.
    Percentage,
    /// `value` is an amount in cents.
    Fixed,
}

impl DiscountType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DiscountType::Percentage => "percentage",
            DiscountType::Fixed => "fixed",
        }
    }
}

impl std::str::FromStr for DiscountType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "percentage" => Ok(DiscountType::Percentage),
            "fixed" => Ok(DiscountType::Fixed),
            other => Err(format!("unknown discount type: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Coupon {
    pub id: CouponId,
    /// Always upper-case.
    pub code: String,
    pub description: String,
    pub discount_type: DiscountType,
    /// Basis points for percentage coupons, cents for fixed ones.
    pub value: i64,
    pub min_order_amount: Money,
    pub max_discount_amount: Option<Money>,
    pub usage_limit: Option<u32>,
    pub used_count: u32,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A 100% percentage coupon.
pub const FULL_DISCOUNT_BPS: i64 = 10_000;

/// Canonical form used for storage and lookups.
pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

impl Coupon {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now < self.valid_from || now > self.valid_until
    }

    pub fn is_usage_limit_reached(&self) -> bool {
        self.usage_limit
            .is_some_and(|limit| self.used_count >= limit)
    }

    pub fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.is_active && !self.is_expired(now) && !self.is_usage_limit_reached()
    }

    /// Discount for `cart_total`, ignoring eligibility.
    ///
    /// A fixed discount is returned as-is even when it exceeds the cart
    /// total; callers that build totals clamp it.
    pub fn discount_for(&self, cart_total: Money) -> Money {
        match self.discount_type {
            DiscountType::Fixed => Money::from_cents(self.value),
            DiscountType::Percentage => {
                let bps = u32::try_from(self.value.clamp(0, FULL_DISCOUNT_BPS)).unwrap_or(0);
                let discount = cart_total.apply_basis_points(bps);
                match self.max_discount_amount {
                    Some(cap) if discount > cap => cap,
                    _ => discount,
                }
            }
        }
    }

    /// Checks eligibility and computes the discount. Read-only: usage is
    /// counted only when an order is placed.
    pub fn validate(&self, cart_total: Money, now: DateTime<Utc>) -> Result<Money, CouponError> {
        if !self.is_active {
            return Err(CouponError::NotActive);
        }
        if self.is_expired(now) {
            return Err(CouponError::Expired);
        }
        if self.is_usage_limit_reached() {
            return Err(CouponError::UsageLimitReached);
        }
        if cart_total < self.min_order_amount {
            return Err(CouponError::MinimumNotMet {
                minimum: self.min_order_amount,
            });
        }
        Ok(self.discount_for(cart_total))
    }
}

/// Input for creating a coupon, and for full updates.
#[derive(Debug, Clone, Deserialize)]
pub struct CouponDraft {
    pub code: String,
    #[serde(default)]
    pub description: String,
    pub discount_type: DiscountType,
    pub value: i64,
    #[serde(default)]
    pub min_order_amount: Money,
    #[serde(default)]
    pub max_discount_amount: Option<Money>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
    #[serde(default)]
    pub is_active: Option<bool>,
}

impl CouponDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        let code_len = self.code.trim().chars().count();
        Validator::default()
            .check(
                (3..=50).contains(&code_len),
                "code",
                "must be between 3 and 50 characters",
            )
            .check(self.value >= 0, "value", "cannot be negative")
            .check(
                self.discount_type != DiscountType::Percentage || self.value <= FULL_DISCOUNT_BPS,
                "value",
                "percentage cannot exceed 10000 basis points",
            )
            .check(
                !self.min_order_amount.is_negative(),
                "min_order_amount",
                "cannot be negative",
            )
            .check(
                self.max_discount_amount.is_none_or(|m| !m.is_negative()),
                "max_discount_amount",
                "cannot be negative",
            )
            .check(
                self.usage_limit.is_none_or(|l| l >= 1),
                "usage_limit",
                "must be at least 1",
            )
            .check(
                self.valid_until > self.valid_from,
                "valid_until",
                "must be after valid_from",
            )
            .check(
                self.description.chars().count() <= 500,
                "description",
                "cannot exceed 500 characters",
            )
            .finish()
    }

    pub fn into_coupon(self, now: DateTime<Utc>) -> Coupon {
        Coupon {
            id: CouponId::new(),
            code: normalize_code(&self.code),
            description: self.description,
            discount_type: self.discount_type,
            value: self.value,
            min_order_amount: self.min_order_amount,
            max_discount_amount: self.max_discount_amount,
            usage_limit: self.usage_limit,
            used_count: 0,
            valid_from: self.valid_from,
            valid_until: self.valid_until,
            is_active: self.is_active.unwrap_or(true),
            created_at: now,
            updated_at: now,
        }
    }

    /// Replaces the editable fields of `coupon`, keeping its id and usage.
    pub fn apply_to(self, coupon: &mut Coupon, now: DateTime<Utc>) {
        coupon.code = normalize_code(&self.code);
        coupon.description = self.description;
        coupon.discount_type = self.discount_type;
        coupon.value = self.value;
        coupon.min_order_amount = self.min_order_amount;
        coupon.max_discount_amount = self.max_discount_amount;
        coupon.usage_limit = self.usage_limit;
        coupon.valid_from = self.valid_from;
        coupon.valid_until = self.valid_until;
        coupon.is_active = self.is_active.unwrap_or(coupon.is_active);
        coupon.updated_at = now;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn coupon(discount_type: DiscountType, value: i64) -> Coupon {
        let now = Utc::now();
        CouponDraft {
            code: "save20".to_string(),
            description: String::new(),
            discount_type,
            value,
            min_order_amount: Money::zero(),
            max_discount_amount: None,
            usage_limit: None,
            valid_from: now - Duration::days(1),
            valid_until: now + Duration::days(1),
            is_active: None,
        }
        .into_coupon(now)
    }

    #[test]
    fn code_is_upper_cased() {
        assert_eq!(coupon(DiscountType::Fixed, 100).code, "SAVE20");
    }

    #[test]
    fn percentage_capped_by_max_discount() {
        let mut c = coupon(DiscountType::Percentage, 2000);
        c.max_discount_amount = Some(Money::from_dollars(15));

        let now = Utc::now();
        assert_eq!(
            c.validate(Money::from_dollars(100), now),
            Ok(Money::from_dollars(15))
        );
        assert_eq!(
            c.validate(Money::from_dollars(50), now),
            Ok(Money::from_dollars(10))
        );
    }

    #[test]
    fn percentage_rounds_to_cents() {
        let c = coupon(DiscountType::Percentage, 1500);
        // 15% of $3.33 = 49.95 cents
        assert_eq!(c.discount_for(Money::from_cents(333)), Money::from_cents(50));
    }

    #[test]
    fn fractional_percentage() {
        let c = coupon(DiscountType::Percentage, 1250);
        assert_eq!(c.discount_for(Money::from_dollars(80)), Money::from_dollars(10));
        // 12.5% of $0.99 = 12.375 cents
        assert_eq!(c.discount_for(Money::from_cents(99)), Money::from_cents(12));
    }

    #[test]
    fn fixed_discount_can_exceed_cart_total() {
        let c = coupon(DiscountType::Fixed, 1000);
        assert_eq!(
            c.validate(Money::from_dollars(5), Utc::now()),
            Ok(Money::from_dollars(10))
        );
    }

    #[test]
    fn checks_run_in_order() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Fixed, 100);
        c.is_active = false;
        c.valid_until = now - Duration::hours(1);
        assert_eq!(c.validate(Money::zero(), now), Err(CouponError::NotActive));

        c.is_active = true;
        c.usage_limit = Some(1);
        c.used_count = 1;
        assert_eq!(c.validate(Money::zero(), now), Err(CouponError::Expired));

        c.valid_until = now + Duration::hours(1);
        assert_eq!(
            c.validate(Money::zero(), now),
            Err(CouponError::UsageLimitReached)
        );

        c.used_count = 0;
        c.min_order_amount = Money::from_dollars(20);
        assert_eq!(
            c.validate(Money::from_dollars(19), now),
            Err(CouponError::MinimumNotMet {
                minimum: Money::from_dollars(20)
            })
        );
        assert!(c.validate(Money::from_dollars(20), now).is_ok());
    }

    #[test]
    fn not_yet_started_counts_as_expired() {
        let now = Utc::now();
        let mut c = coupon(DiscountType::Fixed, 100);
        c.valid_from = now + Duration::days(1);
        c.valid_until = now + Duration::days(2);
        assert!(c.is_expired(now));
        assert!(!c.is_valid(now));
    }

    #[test]
    fn draft_validation() {
        let now = Utc::now();
        let draft = CouponDraft {
            code: "ab".to_string(),
            description: String::new(),
            discount_type: DiscountType::Percentage,
            value: 15_000,
            min_order_amount: Money::zero(),
            max_discount_amount: None,
            usage_limit: Some(0),
            valid_from: now,
            valid_until: now,
            is_active: None,
        };
        match draft.validate() {
            Err(DomainError::Validation(fields)) => assert_eq!(fields.len(), 4),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
