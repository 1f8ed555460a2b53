//! Sales dashboard aggregated from orders in a period.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use common::{Money, PageRequest, ProductId};
use domain::{Order, OrderStatus, Product};
use serde::Serialize;
use store::{OrderQuery, ProductQuery, ProductSort, Store};

use crate::{Period, Result};

/// How many products the top lists and the low-stock list hold.
pub const TOP_PRODUCTS: usize = 10;

/// Units and revenue of one product across the period's orders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProductSales {
    pub product_id: ProductId,
    pub name: String,
    pub quantity: u64,
    pub revenue: Money,
    pub order_count: u64,
}

/// Headline figures. Cancelled orders are excluded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct SalesMetrics {
    pub total_orders: u64,
    pub total_revenue: Money,
    pub average_order_value: Money,
}

/// Admin dashboard for one period.
#[derive(Debug, Clone, Serialize)]
pub struct SalesDashboard {
    pub period: Period,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub metrics: SalesMetrics,
    /// Every order in the period, cancelled ones included.
    pub orders_by_status: HashMap<OrderStatus, u64>,
    pub top_products_by_revenue: Vec<ProductSales>,
    pub top_products_by_quantity: Vec<ProductSales>,
    pub low_stock_products: Vec<Product>,
}

/// Folds orders into dashboard figures.
#[derive(Debug, Default)]
pub struct SalesAccumulator {
    metrics: SalesMetrics,
    by_status: HashMap<OrderStatus, u64>,
    products: HashMap<ProductId, ProductSales>,
}

impl SalesAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, order: &Order) {
        *self.by_status.entry(order.status).or_default() += 1;
        if order.status == OrderStatus::Cancelled {
            return;
        }

        self.metrics.total_orders += 1;
        self.metrics.total_revenue += order.total;

        for line in &order.items {
            let sales = self
                .products
                .entry(line.product_id)
                .or_insert_with(|| ProductSales {
                    product_id: line.product_id,
                    name: line.name.clone(),
                    quantity: 0,
                    revenue: Money::zero(),
                    order_count: 0,
                });
            sales.quantity += u64::from(line.quantity);
            sales.revenue += line.line_total;
            sales.order_count += 1;
        }
    }

    pub fn metrics(&self) -> SalesMetrics {
        let mut metrics = self.metrics;
        metrics.average_order_value = average(metrics.total_revenue, metrics.total_orders);
        metrics
    }

    pub fn orders_by_status(&self) -> &HashMap<OrderStatus, u64> {
        &self.by_status
    }

    /// Highest revenue first; ties broken by name.
    pub fn top_by_revenue(&self, limit: usize) -> Vec<ProductSales> {
        self.top(limit, |a, b| b.revenue.cmp(&a.revenue))
    }

    /// Most units first; ties broken by name.
    pub fn top_by_quantity(&self, limit: usize) -> Vec<ProductSales> {
        self.top(limit, |a, b| b.quantity.cmp(&a.quantity))
    }

    fn top(
        &self,
        limit: usize,
        order: impl Fn(&ProductSales, &ProductSales) -> std::cmp::Ordering,
    ) -> Vec<ProductSales> {
        let mut products: Vec<_> = self.products.values().cloned().collect();
        products.sort_by(|a, b| order(a, b).then_with(|| a.name.cmp(&b.name)));
        products.truncate(limit);
        products
    }
}

/// Mean rounded half away from zero to the nearest cent.
pub(crate) fn average(total: Money, count: u64) -> Money {
    if count == 0 {
        return Money::zero();
    }
    let count = i128::from(count);
    let cents = i128::from(total.cents());
    let rounded = (2 * cents + count) / (2 * count);
    Money::from_cents(i64::try_from(rounded).unwrap_or(i64::MAX))
}

/// Builds dashboards from the store.
#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn Store>,
}

impl DashboardService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn dashboard(&self, period: Period, now: DateTime<Utc>) -> Result<SalesDashboard> {
        let start = period.start(now);
        let query = OrderQuery::new().from_timestamp(start).to_timestamp(now);
        let (orders, total) = self.store.list_orders(&query).await?;

        let mut acc = SalesAccumulator::new();
        for order in &orders {
            acc.add(order);
        }

        let low_stock = ProductQuery::new()
            .low_stock_only(true)
            .sort(ProductSort::StockAsc)
            .page(PageRequest::new(1, TOP_PRODUCTS as u32));
        let (low_stock_products, _) = self.store.list_products(&low_stock).await?;

        metrics::counter!("analytics_dashboards_total", "period" => period.as_str()).increment(1);
        tracing::debug!(%period, orders = total, "dashboard computed");

        Ok(SalesDashboard {
            period,
            start,
            end: now,
            metrics: acc.metrics(),
            orders_by_status: acc.orders_by_status().clone(),
            top_products_by_revenue: acc.top_by_revenue(TOP_PRODUCTS),
            top_products_by_quantity: acc.top_by_quantity(TOP_PRODUCTS),
            low_stock_products,
        })
    }
}
