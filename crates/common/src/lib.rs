//! Shared types for the storefront backend.
//!
//! Identifiers, money in minor units and pagination live here so every
//! crate in the workspace agrees on their representation.

mod ids;
mod money;
mod page;

pub use ids::{CategoryId, CouponId, LogEntryId, OrderId, ProductId, ReviewId, UserId};
pub use money::Money;
pub use page::{MAX_PAGE_SIZE, Page, PageRequest};
