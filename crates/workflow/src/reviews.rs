//! Product reviews and their moderation.

use std::sync::Arc;

use chrono::Utc;
use common::{Page, PageRequest, ProductId, ReviewId, UserId};
use domain::{RatingSummary, Review, ReviewDraft, ReviewPatch};
use serde::Serialize;
use store::{ReviewQuery, Store, StoreError};

use crate::error::{Result, WorkflowError};

/// The public reviews of a product with its current rating.
#[derive(Debug, Clone, Serialize)]
pub struct ProductReviews {
    pub product_id: ProductId,
    pub rating: RatingSummary,
    pub reviews: Page<Review>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HelpfulVote {
    pub review_id: ReviewId,
    pub helpful_count: u32,
}

/// Review operations.
#[derive(Clone)]
pub struct ReviewService {
    store: Arc<dyn Store>,
}

impl ReviewService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Approved reviews, newest first.
    pub async fn product_reviews(
        &self,
        product_id: ProductId,
        page: PageRequest,
    ) -> Result<ProductReviews> {
        self.require_product(product_id).await?;
        let (items, total) = self
            .store
            .list_reviews(&ReviewQuery::published(product_id).page(page))
            .await?;
        let rating = self.rating(product_id).await?;
        Ok(ProductReviews {
            product_id,
            rating,
            reviews: Page::new(items, page, total),
        })
    }

    pub async fn rating(&self, product_id: ProductId) -> Result<RatingSummary> {
        let mut ratings = self.store.rating_summaries(&[product_id]).await?;
        Ok(ratings.remove(&product_id).unwrap_or_default())
    }

    /// Reviews backed by a delivered order are published immediately.
    #[tracing::instrument(skip(self, draft))]
    pub async fn create_review(
        &self,
        user_id: UserId,
        product_id: ProductId,
        draft: ReviewDraft,
    ) -> Result<Review> {
        draft.validate()?;
        self.require_product(product_id).await?;

        let purchase = self
            .store
            .find_delivered_purchase(user_id, product_id)
            .await?;
        let review = draft.into_review(user_id, product_id, purchase, Utc::now());

        let review = match self.store.insert_review(review).await {
            Ok(review) => review,
            Err(StoreError::Duplicate { .. }) => {
                return Err(WorkflowError::Conflict(
                    "you have already reviewed this product".to_string(),
                ));
            }
            Err(e) => return Err(e.into()),
        };

        let verified = review.is_verified_purchase.to_string();
        metrics::counter!("reviews_created_total", "verified" => verified).increment(1);
        tracing::info!(
            review_id = %review.id,
            %product_id,
            verified = review.is_verified_purchase,
            "review created"
        );
        Ok(review)
    }

    /// Edits by the author. An unverified review goes back to moderation.
    #[tracing::instrument(skip(self, patch))]
    pub async fn update_review(
        &self,
        user_id: UserId,
        id: ReviewId,
        patch: ReviewPatch,
    ) -> Result<Review> {
        patch.validate()?;
        let mut review = self.get_review(id).await?;
        if review.user_id != user_id {
            return Err(WorkflowError::BadRequest(
                "you can only update your own reviews".to_string(),
            ));
        }

        patch.apply(&mut review, Utc::now());
        if !review.is_verified_purchase {
            review.is_approved = false;
        }
        Ok(self.store.update_review(review).await?)
    }

    /// Authors delete their own reviews; admins delete any.
    #[tracing::instrument(skip(self))]
    pub async fn delete_review(
        &self,
        user_id: UserId,
        is_admin: bool,
        id: ReviewId,
    ) -> Result<()> {
        let review = self.get_review(id).await?;
        if review.user_id != user_id && !is_admin {
            return Err(WorkflowError::BadRequest(
                "you can only delete your own reviews".to_string(),
            ));
        }
        self.store.delete_review(id).await?;
        tracing::info!(review_id = %id, product_id = %review.product_id, "review deleted");
        Ok(())
    }

    /// Only published reviews can be voted on.
    pub async fn mark_helpful(&self, id: ReviewId) -> Result<HelpfulVote> {
        let review = self.get_review(id).await?;
        if !review.is_approved {
            return Err(WorkflowError::not_found("review", id));
        }
        let review = self.store.increment_review_helpful(id).await?;
        Ok(HelpfulVote {
            review_id: review.id,
            helpful_count: review.helpful_count,
        })
    }

    // -- Admin --

    /// Every review, optionally narrowed by approval.
    pub async fn list_all(
        &self,
        approved: Option<bool>,
        page: PageRequest,
    ) -> Result<Page<Review>> {
        let query = ReviewQuery::new().approved(approved).page(page);
        let (items, total) = self.store.list_reviews(&query).await?;
        Ok(Page::new(items, page, total))
    }

    #[tracing::instrument(skip(self))]
    pub async fn approve(&self, id: ReviewId) -> Result<Review> {
        let mut review = self.get_review(id).await?;
        if review.is_approved {
            return Ok(review);
        }
        review.is_approved = true;
        review.updated_at = Utc::now();
        let review = self.store.update_review(review).await?;
        tracing::info!(review_id = %id, "review approved");
        Ok(review)
    }

    async fn get_review(&self, id: ReviewId) -> Result<Review> {
        self.store
            .get_review(id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("review", id))
    }

    async fn require_product(&self, product_id: ProductId) -> Result<()> {
        match self.store.get_product(product_id).await? {
            Some(_) => Ok(()),
            None => Err(WorkflowError::not_found("product", product_id)),
        }
    }
}
