use chrono::{DateTime, Utc};
use common::{PageRequest, ProductId, UserId};
use domain::{LedgerEntryType, OrderStatus, Product, Review};

/// Sort order for product listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProductSort {
    #[default]
    Newest,
    PriceAsc,
    PriceDesc,
    Name,
    /// Lowest stock first, used by the inventory overview.
    StockAsc,
}

impl std::str::FromStr for ProductSort {
    type Err = String;

    /// Accepts the names shoppers sort by: `newest`, `price_asc`,
    /// `price_desc` and `name`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "newest" => Ok(ProductSort::Newest),
            "price_asc" => Ok(ProductSort::PriceAsc),
            "price_desc" => Ok(ProductSort::PriceDesc),
            "name" => Ok(ProductSort::Name),
            other => Err(format!(
                "unknown sort: {other} (expected newest, price_asc, price_desc or name)"
            )),
        }
    }
}

/// Builder for product listings.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// Filter by category.
    pub category: Option<String>,

    /// Only active products.
    pub active_only: bool,

    /// Only products at or below their low-stock threshold.
    pub low_stock_only: bool,

    pub featured_only: bool,

    pub sort: ProductSort,

    /// Maximum number of products to return.
    pub limit: Option<usize>,

    /// Number of products to skip.
    pub offset: Option<usize>,
}

impl ProductQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storefront listing: active products only.
    pub fn storefront() -> Self {
        Self {
            active_only: true,
            ..Default::default()
        }
    }

    pub fn category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn low_stock_only(mut self, low_stock_only: bool) -> Self {
        self.low_stock_only = low_stock_only;
        self
    }

    pub fn featured_only(mut self, featured_only: bool) -> Self {
        self.featured_only = featured_only;
        self
    }

    pub fn sort(mut self, sort: ProductSort) -> Self {
        self.sort = sort;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.limit = Some(page.limit());
        self.offset = Some(page.offset());
        self
    }

    /// Returns true if a product matches the filters.
    pub fn matches(&self, product: &Product) -> bool {
        if self.active_only && !product.is_active {
            return false;
        }
        if let Some(ref category) = self.category
            && &product.category != category
        {
            return false;
        }
        if self.low_stock_only && !product.needs_restock() {
            return false;
        }
        if self.featured_only && !product.is_featured {
            return false;
        }
        true
    }
}

/// Builder for order listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct OrderQuery {
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    /// Created at or after (inclusive).
    pub from_timestamp: Option<DateTime<Utc>>,
    /// Created at or before (inclusive).
    pub to_timestamp: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl OrderQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_user(user_id: UserId) -> Self {
        Self {
            user_id: Some(user_id),
            ..Default::default()
        }
    }

    pub fn status(mut self, status: OrderStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn from_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.from_timestamp = Some(timestamp);
        self
    }

    pub fn to_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.to_timestamp = Some(timestamp);
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.limit = Some(page.limit());
        self.offset = Some(page.offset());
        self
    }

    pub fn matches(&self, order: &domain::Order) -> bool {
        self.user_id.is_none_or(|u| order.user_id == u)
            && self.status.is_none_or(|s| order.status == s)
            && self.from_timestamp.is_none_or(|t| order.created_at >= t)
            && self.to_timestamp.is_none_or(|t| order.created_at <= t)
    }
}

/// Builder for ledger listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct InventoryLogQuery {
    pub product_id: Option<ProductId>,
    pub entry_type: Option<LedgerEntryType>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl InventoryLogQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn for_product(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            ..Default::default()
        }
    }

    pub fn entry_type(mut self, entry_type: LedgerEntryType) -> Self {
        self.entry_type = Some(entry_type);
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.limit = Some(page.limit());
        self.offset = Some(page.offset());
        self
    }

    pub fn matches(&self, entry: &domain::InventoryLogEntry) -> bool {
        self.product_id.is_none_or(|p| entry.product_id == p)
            && self.entry_type.is_none_or(|t| entry.entry_type == t)
    }
}

/// Builder for review listings. Results are newest first.
#[derive(Debug, Clone, Default)]
pub struct ReviewQuery {
    pub product_id: Option<ProductId>,
    /// `Some(true)` for the public listing.
    pub approved: Option<bool>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

impl ReviewQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Approved reviews of one product.
    pub fn published(product_id: ProductId) -> Self {
        Self {
            product_id: Some(product_id),
            approved: Some(true),
            ..Default::default()
        }
    }

    pub fn approved(mut self, approved: Option<bool>) -> Self {
        self.approved = approved;
        self
    }

    pub fn page(mut self, page: PageRequest) -> Self {
        self.limit = Some(page.limit());
        self.offset = Some(page.offset());
        self
    }

    pub fn matches(&self, review: &Review) -> bool {
        self.product_id.is_none_or(|p| review.product_id == p)
            && self.approved.is_none_or(|a| review.is_approved == a)
    }
}

/// Applies offset/limit to an already filtered and sorted vector.
pub(crate) fn paginate<T>(items: Vec<T>, offset: Option<usize>, limit: Option<usize>) -> Vec<T> {
    let iter = items.into_iter().skip(offset.unwrap_or(0));
    match limit {
        Some(limit) => iter.take(limit).collect(),
        None => iter.collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shopper_sorts_parse() {
        assert_eq!("price_desc".parse(), Ok(ProductSort::PriceDesc));
        assert_eq!("newest".parse(), Ok(ProductSort::Newest));
        assert!("stock".parse::<ProductSort>().is_err());
    }

    #[test]
    fn page_sets_limit_and_offset() {
        let query = OrderQuery::new().page(PageRequest::new(3, 25));
        assert_eq!(query.limit, Some(25));
        assert_eq!(query.offset, Some(50));
    }

    #[test]
    fn paginate_skips_and_takes() {
        let items: Vec<u32> = (1..=10).collect();
        assert_eq!(paginate(items.clone(), Some(8), Some(5)), vec![9, 10]);
        assert_eq!(paginate(items, None, None).len(), 10);
    }
}
