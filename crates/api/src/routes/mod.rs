//! HTTP handlers, one module per resource.

pub mod analytics;
pub mod cart;
pub mod categories;
pub mod coupons;
pub mod health;
pub mod inventory;
pub mod metrics;
pub mod orders;
pub mod payments;
pub mod products;
pub mod reviews;

use common::PageRequest;
use serde::Deserialize;

use crate::error::ApiError;

/// `?page=&limit=` query parameters.
#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageParams {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageParams {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Self {
        Self { page, limit }
    }
}

impl From<PageParams> for PageRequest {
    fn from(params: PageParams) -> Self {
        let default = PageRequest::default();
        PageRequest::new(
            params.page.unwrap_or(default.page),
            params.limit.unwrap_or(default.limit),
        )
    }
}

/// Parses an identifier taken from the path.
pub(crate) fn parse_id<T: std::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("Invalid {what} id: {raw}")))
}
