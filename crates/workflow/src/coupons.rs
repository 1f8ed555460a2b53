//! Coupon validation and administration.

use std::sync::Arc;

use chrono::Utc;
use common::{CouponId, Money};
use domain::{Coupon, CouponDraft, CouponError, DiscountType};
use serde::Serialize;
use store::Store;

use crate::error::{Result, WorkflowError};

/// Outcome of validating a coupon against a cart total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CouponQuote {
    pub code: String,
    pub discount_type: DiscountType,
    pub value: i64,
    pub discount: Money,
    /// Cart total after the discount, never below zero.
    pub final_total: Money,
}

/// Coupon operations.
#[derive(Clone)]
pub struct CouponService {
    store: Arc<dyn Store>,
}

impl CouponService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Checks a code against `cart_total`. Never redeems the coupon.
    #[tracing::instrument(skip(self))]
    pub async fn validate_coupon(&self, code: &str, cart_total: Money) -> Result<CouponQuote> {
        if cart_total.is_negative() {
            return Err(WorkflowError::invalid("cart_total", "cannot be negative"));
        }
        let coupon = self
            .store
            .find_coupon_by_code(code)
            .await?
            .ok_or(CouponError::InvalidCode)?;
        let discount = coupon.validate(cart_total, Utc::now())?;

        Ok(CouponQuote {
            final_total: cart_total - discount.clamp_to(cart_total),
            code: coupon.code,
            discount_type: coupon.discount_type,
            value: coupon.value,
            discount,
        })
    }

    pub async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        Ok(self.store.list_coupons().await?)
    }

    pub async fn get_coupon(&self, id: CouponId) -> Result<Coupon> {
        self.store
            .get_coupon(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("coupon", id))
    }

    #[tracing::instrument(skip(self, draft), fields(code = %draft.code))]
    pub async fn create_coupon(&self, draft: CouponDraft) -> Result<Coupon> {
        draft.validate()?;
        let coupon = self.store.insert_coupon(draft.into_coupon(Utc::now())).await?;
        tracing::info!(coupon_id = %coupon.id, code = %coupon.code, "coupon created");
        Ok(coupon)
    }

    /// Replaces the editable fields. Usage counts are kept.
    #[tracing::instrument(skip(self, draft))]
    pub async fn update_coupon(&self, id: CouponId, draft: CouponDraft) -> Result<Coupon> {
        draft.validate()?;
        let mut coupon = self.get_coupon(id).await?;
        draft.apply_to(&mut coupon, Utc::now());
        Ok(self.store.update_coupon(coupon).await?)
    }

    #[tracing::instrument(skip(self))]
    pub async fn delete_coupon(&self, id: CouponId) -> Result<()> {
        self.store.delete_coupon(id).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{DateTime, Duration};
    use store::InMemoryStore;

    fn draft(code: &str, discount_type: DiscountType, value: i64) -> CouponDraft {
        let now = Utc::now();
        CouponDraft {
            code: code.into(),
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
    }

    fn service() -> CouponService {
        CouponService::new(Arc::new(InMemoryStore::new()))
    }

    #[tokio::test]
    async fn percentage_is_capped() {
        let coupons = service();
        let mut d = draft("save20", DiscountType::Percentage, 2000);
        d.max_discount_amount = Some(Money::from_dollars(15));
        coupons.create_coupon(d).await.unwrap();

        let quote = coupons
            .validate_coupon("SAVE20", Money::from_dollars(100))
            .await
            .unwrap();
        assert_eq!(quote.discount, Money::from_dollars(15));
        assert_eq!(quote.final_total, Money::from_dollars(85));

        let quote = coupons
            .validate_coupon("save20", Money::from_dollars(50))
            .await
            .unwrap();
        assert_eq!(quote.discount, Money::from_dollars(10));
    }

    #[tokio::test]
    async fn fixed_discount_above_total_is_reported_raw() {
        let coupons = service();
        coupons
            .create_coupon(draft("TENOFF", DiscountType::Fixed, 1000))
            .await
            .unwrap();

        let quote = coupons
            .validate_coupon("TENOFF", Money::from_dollars(5))
            .await
            .unwrap();
        assert_eq!(quote.discount, Money::from_dollars(10));
        assert_eq!(quote.final_total, Money::zero());
    }

    #[tokio::test]
    async fn rejections_follow_validation_order() {
        let coupons = service();
        assert!(matches!(
            coupons.validate_coupon("NOPE", Money::from_dollars(10)).await,
            Err(WorkflowError::Coupon(CouponError::InvalidCode))
        ));

        let mut d = draft("OLD", DiscountType::Fixed, 100);
        d.valid_from = DateTime::<Utc>::UNIX_EPOCH;
        d.valid_until = DateTime::<Utc>::UNIX_EPOCH + Duration::days(1);
        coupons.create_coupon(d).await.unwrap();
        assert!(matches!(
            coupons.validate_coupon("OLD", Money::from_dollars(10)).await,
            Err(WorkflowError::Coupon(CouponError::Expired))
        ));

        let mut d = draft("BIG", DiscountType::Fixed, 100);
        d.min_order_amount = Money::from_dollars(50);
        coupons.create_coupon(d).await.unwrap();
        assert!(matches!(
            coupons.validate_coupon("BIG", Money::from_dollars(10)).await,
            Err(WorkflowError::Coupon(CouponError::MinimumNotMet { .. }))
        ));
    }

    #[tokio::test]
    async fn duplicate_code_is_conflict() {
        let coupons = service();
        coupons
            .create_coupon(draft("SAVE", DiscountType::Fixed, 100))
            .await
            .unwrap();
        let err = coupons
            .create_coupon(draft("save", DiscountType::Fixed, 200))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_keeps_identity() {
        let coupons = service();
        let coupon = coupons
            .create_coupon(draft("SAVE", DiscountType::Fixed, 100))
            .await
            .unwrap();

        let updated = coupons
            .update_coupon(coupon.id, draft("SAVE", DiscountType::Percentage, 1500))
            .await
            .unwrap();
        assert_eq!(updated.id, coupon.id);
        assert_eq!(updated.discount_type, DiscountType::Percentage);

        coupons.delete_coupon(coupon.id).await.unwrap();
        assert!(matches!(
            coupons.get_coupon(coupon.id).await,
            Err(WorkflowError::NotFound { .. })
        ));
    }
}
