//! Product reviews and the ratings derived from them.

use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, ReviewId, UserId};
use serde::{Deserialize, Serialize};

use crate::error::{DomainError, Validator};

const MAX_TITLE_LEN: usize = 100;
const MAX_COMMENT_LEN: usize = 1000;

/// A customer's review of a product. One per product and user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub user_id: UserId,
    pub product_id: ProductId,
    /// The delivered order that makes this a verified purchase.
    pub order_id: Option<OrderId>,
    /// 1 to 5.
    pub rating: u8,
    pub title: String,
    pub comment: String,
    pub images: Vec<String>,
    pub is_verified_purchase: bool,
    /// Only approved reviews are public and count towards the rating.
    pub is_approved: bool,
    pub helpful_count: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn check_rating(v: &mut Validator, rating: u8) {
    v.check(
        (1..=5).contains(&rating),
        "rating",
        "must be between 1 and 5",
    );
}

fn check_title(v: &mut Validator, title: &str) {
    v.check(!title.trim().is_empty(), "title", "is required")
        .check(
            title.trim().chars().count() <= MAX_TITLE_LEN,
            "title",
            "cannot exceed 100 characters",
        );
}

fn check_comment(v: &mut Validator, comment: &str) {
    v.check(!comment.trim().is_empty(), "comment", "is required")
        .check(
            comment.chars().count() <= MAX_COMMENT_LEN,
            "comment",
            "cannot exceed 1000 characters",
        );
}

/// Input for writing a review.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDraft {
    pub rating: u8,
    pub title: String,
    pub comment: String,
    #[serde(default)]
    pub images: Vec<String>,
}

impl ReviewDraft {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut v = Validator::default();
        check_rating(&mut v, self.rating);
        check_title(&mut v, &self.title);
        check_comment(&mut v, &self.comment);
        v.finish()
    }

    /// Builds the review. A verified purchase is published at once; any
    /// other review waits for an admin.
    pub fn into_review(
        self,
        user_id: UserId,
        product_id: ProductId,
        verified_by: Option<OrderId>,
        now: DateTime<Utc>,
    ) -> Review {
        Review {
            id: ReviewId::new(),
            user_id,
            product_id,
            order_id: verified_by,
            rating: self.rating,
            title: self.title.trim().to_string(),
            comment: self.comment,
            images: self.images,
            is_verified_purchase: verified_by.is_some(),
            is_approved: verified_by.is_some(),
            helpful_count: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Partial update by the author.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewPatch {
    pub rating: Option<u8>,
    pub title: Option<String>,
    pub comment: Option<String>,
    pub images: Option<Vec<String>>,
}

impl ReviewPatch {
    pub fn validate(&self) -> Result<(), DomainError> {
        let mut v = Validator::default();
        if let Some(rating) = self.rating {
            check_rating(&mut v, rating);
        }
        if let Some(title) = &self.title {
            check_title(&mut v, title);
        }
        if let Some(comment) = &self.comment {
            check_comment(&mut v, comment);
        }
        v.finish()
    }

    pub fn apply(self, review: &mut Review, now: DateTime<Utc>) {
        if let Some(rating) = self.rating {
            review.rating = rating;
        }
        if let Some(title) = self.title {
            review.title = title.trim().to_string();
        }
        if let Some(comment) = self.comment {
            review.comment = comment;
        }
        if let Some(images) = self.images {
            review.images = images;
        }
        review.updated_at = now;
    }
}

/// Average of a product's approved reviews.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct RatingSummary {
    /// Rounded to one decimal; zero without reviews.
    pub average_rating: f64,
    pub review_count: u32,
}

impl RatingSummary {
    pub fn from_ratings(ratings: impl IntoIterator<Item = u8>) -> Self {
        let (sum, count) = ratings
            .into_iter()
            .fold((0u64, 0u32), |(sum, count), r| (sum + u64::from(r), count + 1));
        Self::from_totals(sum, count)
    }

    /// From a rating sum and count, as aggregated by a database.
    pub fn from_totals(sum: u64, count: u32) -> Self {
        if count == 0 {
            return Self::default();
        }
        let average = sum as f64 / f64::from(count);
        Self {
            average_rating: (average * 10.0).round() / 10.0,
            review_count: count,
        }
    }
}
