//! Sales, product and customer reports over arbitrary date ranges.
//!
//! Cancelled orders never count. Customers are the users who placed at
//! least one order that still counts.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Datelike, Utc};
use common::{Money, ProductId, UserId};
use domain::{Order, OrderStatus};
use serde::{Deserialize, Serialize};
use store::{OrderQuery, Store};

use crate::dashboard::average;
use crate::{AnalyticsError, Result, SalesAccumulator};

/// Default and largest size of the product ranking.
pub const DEFAULT_RANKING_LIMIT: usize = 10;
pub const MAX_RANKING_LIMIT: usize = 50;

/// Bucket size of a sales series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Grouping {
    #[default]
    Day,
    /// ISO weeks, Monday first.
    Week,
    Month,
}

impl Grouping {
    pub fn as_str(&self) -> &'static str {
        match self {
            Grouping::Day => "day",
            Grouping::Week => "week",
            Grouping::Month => "month",
        }
    }

    /// Sortable label of the bucket holding `at`: `2024-03-09`, `2024-W10`
    /// or `2024-03`.
    pub fn label(&self, at: DateTime<Utc>) -> String {
        match self {
            Grouping::Day => at.format("%Y-%m-%d").to_string(),
            Grouping::Week => {
                let week = at.iso_week();
                format!("{:04}-W{:02}", week.year(), week.week())
            }
            Grouping::Month => at.format("%Y-%m").to_string(),
        }
    }
}

impl std::str::FromStr for Grouping {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(Grouping::Day),
            "week" => Ok(Grouping::Week),
            "month" => Ok(Grouping::Month),
            _ => Err(AnalyticsError::InvalidGrouping(s.to_string())),
        }
    }
}

/// What the product ranking is sorted by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Ranking {
    #[default]
    Revenue,
    /// Units sold.
    Sales,
}

impl std::str::FromStr for Ranking {
    type Err = AnalyticsError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "revenue" => Ok(Ranking::Revenue),
            "sales" => Ok(Ranking::Sales),
            _ => Err(AnalyticsError::InvalidRanking(s.to_string())),
        }
    }
}

/// Optional, inclusive bounds on order creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct DateRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl DateRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Result<Self> {
        match (start, end) {
            (Some(start), Some(end)) if start > end => {
                Err(AnalyticsError::InvalidRange { start, end })
            }
            _ => Ok(Self { start, end }),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        self.start.is_none_or(|s| at >= s) && self.end.is_none_or(|e| at <= e)
    }

    fn query(&self) -> OrderQuery {
        let mut query = OrderQuery::new();
        if let Some(start) = self.start {
            query = query.from_timestamp(start);
        }
        if let Some(end) = self.end {
            query = query.to_timestamp(end);
        }
        query
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesBucket {
    pub period: String,
    pub total_orders: u64,
    pub total_revenue: Money,
    pub average_order_value: Money,
}

/// Sales over time, oldest bucket first. Empty buckets are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SalesReport {
    pub group_by: Grouping,
    pub range: DateRange,
    pub buckets: Vec<SalesBucket>,
}

/// Sales of one product with its rating.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductPerformance {
    pub product_id: ProductId,
    pub name: String,
    pub sales_count: u64,
    pub revenue: Money,
    pub order_count: u64,
    pub average_rating: f64,
    pub review_count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct CustomerReport {
    pub total_customers: u64,
    /// Customers whose first order falls in the range.
    pub new_customers: u64,
    /// Customers with more than one order in the range.
    pub repeat_customers: u64,
    /// Mean spend per customer in the range.
    pub average_lifetime_value: Money,
}

#[derive(Default)]
struct Bucket {
    orders: u64,
    revenue: Money,
}

/// Folds orders into a sales series.
fn sales_series<'a>(
    orders: impl IntoIterator<Item = &'a Order>,
    group_by: Grouping,
) -> Vec<SalesBucket> {
    let mut buckets: BTreeMap<String, Bucket> = BTreeMap::new();
    for order in orders {
        if order.status == OrderStatus::Cancelled {
            continue;
        }
        let bucket = buckets.entry(group_by.label(order.created_at)).or_default();
        bucket.orders += 1;
        bucket.revenue += order.total;
    }
    buckets
        .into_iter()
        .map(|(period, b)| SalesBucket {
            period,
            total_orders: b.orders,
            total_revenue: b.revenue,
            average_order_value: average(b.revenue, b.orders),
        })
        .collect()
}

#[derive(Default)]
struct Customer {
    first_order: Option<DateTime<Utc>>,
    orders_in_range: u64,
    spent_in_range: Money,
}

/// `orders` must cover all time so first orders are known.
fn customer_report<'a>(
    orders: impl IntoIterator<Item = &'a Order>,
    range: DateRange,
) -> CustomerReport {
    let mut customers: HashMap<UserId, Customer> = HashMap::new();
    for order in orders {
        if order.status == OrderStatus::Cancelled {
            continue;
        }
        let customer = customers.entry(order.user_id).or_default();
        customer.first_order = Some(
            customer
                .first_order
                .map_or(order.created_at, |first| first.min(order.created_at)),
        );
        if range.contains(order.created_at) {
            customer.orders_in_range += 1;
            customer.spent_in_range += order.total;
        }
    }

    let mut report = CustomerReport {
        total_customers: customers.len() as u64,
        ..Default::default()
    };
    let mut active = 0u64;
    let mut spent = Money::zero();
    for customer in customers.values() {
        if customer.first_order.is_some_and(|first| range.contains(first)) {
            report.new_customers += 1;
        }
        if customer.orders_in_range > 1 {
            report.repeat_customers += 1;
        }
        if customer.orders_in_range > 0 {
            active += 1;
            spent += customer.spent_in_range;
        }
    }
    report.average_lifetime_value = average(spent, active);
    report
}

/// Builds reports from the store.
#[derive(Clone)]
pub struct ReportService {
    store: Arc<dyn Store>,
}

impl ReportService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn sales(&self, range: DateRange, group_by: Grouping) -> Result<SalesReport> {
        let (orders, _) = self.store.list_orders(&range.query()).await?;
        let buckets = sales_series(&orders, group_by);

        metrics::counter!("analytics_reports_total", "report" => "sales").increment(1);
        tracing::debug!(group_by = group_by.as_str(), buckets = buckets.len(), "sales report");
        Ok(SalesReport {
            group_by,
            range,
            buckets,
        })
    }

    /// Best sellers of all time, with their ratings.
    #[tracing::instrument(skip(self))]
    pub async fn products(
        &self,
        ranking: Ranking,
        limit: usize,
    ) -> Result<Vec<ProductPerformance>> {
        let limit = limit.clamp(1, MAX_RANKING_LIMIT);
        let (orders, _) = self.store.list_orders(&OrderQuery::new()).await?;

        let mut acc = SalesAccumulator::new();
        for order in &orders {
            acc.add(order);
        }
        let top = match ranking {
            Ranking::Revenue => acc.top_by_revenue(limit),
            Ranking::Sales => acc.top_by_quantity(limit),
        };

        let ids: Vec<ProductId> = top.iter().map(|p| p.product_id).collect();
        let ratings = self.store.rating_summaries(&ids).await?;

        metrics::counter!("analytics_reports_total", "report" => "products").increment(1);
        Ok(top
            .into_iter()
            .map(|sales| {
                let rating = ratings.get(&sales.product_id).copied().unwrap_or_default();
                ProductPerformance {
                    product_id: sales.product_id,
                    name: sales.name,
                    sales_count: sales.quantity,
                    revenue: sales.revenue,
                    order_count: sales.order_count,
                    average_rating: rating.average_rating,
                    review_count: rating.review_count,
                }
            })
            .collect())
    }

    #[tracing::instrument(skip(self))]
    pub async fn customers(&self, range: DateRange) -> Result<CustomerReport> {
        let (orders, _) = self.store.list_orders(&OrderQuery::new()).await?;
        let report = customer_report(&orders, range);

        metrics::counter!("analytics_reports_total", "report" => "customers").increment(1);
        tracing::debug!(customers = report.total_customers, "customer report");
        Ok(report)
    }
}
