//! Integration tests for dashboards, reports and the stock audit over the in-memory store.

use std::sync::Arc;

use analytics::{
    DashboardService, DateRange, DiscrepancyKind, Grouping, Period, Ranking, ReportService,
    StockAudit,
};
use chrono::{Duration, Utc};
use common::{Money, OrderId, ProductId, UserId};
use domain::{
    Address, CartOwner, CheckoutDraft, OrderLine, OrderNumber, OrderStatus, PaymentStatus,
    PricingPolicy, ProductDraft, ReferenceType, ReviewDraft, StockAdjustment, StockChange,
};
use store::{InMemoryStore, Store};

struct TestHarness {
    store: InMemoryStore,
    dashboards: DashboardService,
    reports: ReportService,
    audit: StockAudit,
}

impl TestHarness {
    fn new() -> Self {
        let store = InMemoryStore::new();
        Self {
            dashboards: DashboardService::new(Arc::new(store.clone())),
            reports: ReportService::new(Arc::new(store.clone())),
            audit: StockAudit::new(Arc::new(store.clone())),
            store,
        }
    }

    async fn product(&self, sku: &str, price_cents: i64, stock: u32) -> ProductId {
        let product = draft(sku, price_cents).into_product(Utc::now());
        let opening = (stock > 0).then(|| {
            StockChange::new(StockAdjustment::In(stock), "Initial stock")
                .reference_type(ReferenceType::Restock)
        });
        self.store.insert_product(product, opening).await.unwrap().id
    }

    async fn order(&self, product_id: ProductId, quantity: u32, price_cents: i64) -> OrderId {
        let user = UserId::new();
        let draft = CheckoutDraft {
            user_id: user,
            lines: vec![OrderLine::new(
                product_id,
                None,
                "Widget",
                None,
                quantity,
                Money::from_cents(price_cents),
            )],
            shipping_address: address(),
            billing_address: None,
            notes: None,
            coupon_code: None,
            coupon_discount: Money::zero(),
            currency: "usd".into(),
        };
        let now = Utc::now();
        let order = domain::Order::place(
            draft,
            &PricingPolicy::default(),
            OrderNumber::generate(now),
            now,
        )
        .unwrap();
        self.store
            .commit_checkout(order, &CartOwner::User(user))
            .await
            .unwrap()
            .id
    }

    async fn move_to(&self, order_id: OrderId, target: OrderStatus) {
        let order = self.store.get_order(order_id).await.unwrap().unwrap();
        let mut transition = order.plan(target).unwrap();
        if target == OrderStatus::Confirmed {
            transition = transition.with_payment_status(PaymentStatus::Paid);
        }
        self.store.apply_transition(&transition).await.unwrap();
    }
}

fn draft(sku: &str, price_cents: i64) -> ProductDraft {
    ProductDraft {
        name: format!("Product {sku}"),
        sku: sku.into(),
        description: String::new(),
        category: "general".into(),
        tags: vec![],
        price: Money::from_cents(price_cents),
        compare_at_price: None,
        stock: 0,
        low_stock_threshold: Some(5),
        is_active: None,
        is_featured: false,
    }
}

fn address() -> Address {
    Address {
        street: "1 Main St".into(),
        city: "Springfield".into(),
        state: "IL".into(),
        zip_code: "62701".into(),
        country: "US".into(),
        phone: "555-0100".into(),
    }
}

#[tokio::test]
async fn dashboard_excludes_cancelled_orders_from_revenue() {
    let h = TestHarness::new();
    let lamp = h.product("LAMP", 1000, 50).await;
    let desk = h.product("DESK", 20000, 3).await;

    let kept = h.order(lamp, 4, 1000).await;
    h.move_to(kept, OrderStatus::Confirmed).await;
    let _pending = h.order(desk, 1, 20000).await;
    let dropped = h.order(lamp, 10, 1000).await;
    h.move_to(dropped, OrderStatus::Cancelled).await;

    let dashboard = h
        .dashboards
        .dashboard(Period::Today, Utc::now())
        .await
        .unwrap();

    // 4000 + 10% tax, and 20000 + 10% tax; shipping is free by default.
    assert_eq!(dashboard.metrics.total_orders, 2);
    assert_eq!(dashboard.metrics.total_revenue, Money::from_cents(26400));
    assert_eq!(dashboard.metrics.average_order_value, Money::from_cents(13200));
    assert_eq!(dashboard.orders_by_status[&OrderStatus::Confirmed], 1);
    assert_eq!(dashboard.orders_by_status[&OrderStatus::Pending], 1);
    assert_eq!(dashboard.orders_by_status[&OrderStatus::Cancelled], 1);

    assert_eq!(dashboard.top_products_by_revenue[0].product_id, desk);
    assert_eq!(dashboard.top_products_by_quantity[0].product_id, lamp);
    assert_eq!(dashboard.top_products_by_quantity[0].quantity, 4);

    // Only the desk is at or below its threshold.
    assert_eq!(dashboard.low_stock_products.len(), 1);
    assert_eq!(dashboard.low_stock_products[0].id, desk);
}

#[tokio::test]
async fn dashboard_window_ends_at_now() {
    let h = TestHarness::new();
    let lamp = h.product("LAMP", 1000, 10).await;
    h.order(lamp, 1, 1000).await;

    let earlier = Utc::now() - Duration::days(30);
    let dashboard = h.dashboards.dashboard(Period::All, earlier).await.unwrap();

    assert_eq!(dashboard.metrics.total_orders, 0);
    assert_eq!(dashboard.metrics.average_order_value, Money::zero());
    assert!(dashboard.top_products_by_revenue.is_empty());
}

#[tokio::test]
async fn dashboard_serializes_statuses_as_keys() {
    let h = TestHarness::new();
    let lamp = h.product("LAMP", 1000, 10).await;
    h.order(lamp, 1, 1000).await;

    let dashboard = h.dashboards.dashboard(Period::Week, Utc::now()).await.unwrap();
    let json = serde_json::to_value(&dashboard).unwrap();

    assert_eq!(json["period"], "week");
    assert_eq!(json["orders_by_status"]["pending"], 1);
    assert_eq!(json["metrics"]["total_revenue"], 1100);
}

#[tokio::test]
async fn audit_passes_after_order_lifecycle() {
    let h = TestHarness::new();
    let lamp = h.product("LAMP", 1000, 10).await;

    let order = h.order(lamp, 3, 1000).await;
    h.move_to(order, OrderStatus::Confirmed).await;
    h.move_to(order, OrderStatus::Cancelled).await;
    h.store
        .adjust_stock(lamp, StockChange::new(StockAdjustment::Out(2), "Damaged"))
        .await
        .unwrap();

    let report = h.audit.run(None).await.unwrap();

    assert!(report.is_consistent(), "{:?}", report.discrepancies);
    assert_eq!(report.entries_replayed, 4);
    assert_eq!(report.products_checked, 1);
    assert_eq!(report.orphaned_products, 0);
}

#[tokio::test]
async fn audit_flags_stock_without_ledger() {
    let h = TestHarness::new();
    let good = h.product("GOOD", 1000, 5).await;

    let mut unledgered = draft("ROGUE", 1000).into_product(Utc::now());
    unledgered.stock = 7;
    let rogue = h.store.insert_product(unledgered, None).await.unwrap().id;

    let report = h.audit.run(None).await.unwrap();

    assert_eq!(report.discrepancies.len(), 1);
    assert_eq!(report.discrepancies[0].product_id, rogue);
    assert_eq!(
        report.discrepancies[0].kind,
        DiscrepancyKind::StockMismatch {
            ledger_stock: 0,
            product_stock: 7,
        }
    );

    let single = h.audit.run(Some(good)).await.unwrap();
    assert!(single.is_consistent());
    assert_eq!(single.products_checked, 1);
}

#[tokio::test]
async fn audit_counts_deleted_products() {
    let h = TestHarness::new();
    let gone = h.product("GONE", 1000, 5).await;
    h.store.delete_product(gone).await.unwrap();

    let report = h.audit.run(None).await.unwrap();

    assert!(report.is_consistent());
    assert_eq!(report.products_checked, 0);
    assert_eq!(report.orphaned_products, 1);
}

#[tokio::test]
async fn product_ranking_carries_ratings() {
    let h = TestHarness::new();
    let lamp = h.product("LAMP", 1000, 50).await;
    let desk = h.product("DESK", 20000, 5).await;

    h.order(lamp, 5, 1000).await;
    h.order(lamp, 3, 1000).await;
    h.order(desk, 1, 20000).await;
    let dropped = h.order(desk, 2, 20000).await;
    h.move_to(dropped, OrderStatus::Cancelled).await;

    for (rating, approved) in [(5, true), (4, true), (1, false)] {
        let mut review = ReviewDraft {
            rating,
            title: "Lamp".into(),
            comment: "Review".into(),
            images: vec![],
        }
        .into_review(UserId::new(), lamp, None, Utc::now());
        review.is_approved = approved;
        h.store.insert_review(review).await.unwrap();
    }

    let by_sales = h.reports.products(Ranking::Sales, 10).await.unwrap();
    assert_eq!(by_sales[0].product_id, lamp);
    assert_eq!(by_sales[0].sales_count, 8);
    assert_eq!(by_sales[0].order_count, 2);
    assert_eq!(by_sales[0].review_count, 2);
    assert_eq!(by_sales[0].average_rating, 4.5);
    assert_eq!(by_sales[1].sales_count, 1);
    assert_eq!(by_sales[1].review_count, 0);

    let by_revenue = h.reports.products(Ranking::Revenue, 1).await.unwrap();
    assert_eq!(by_revenue.len(), 1);
    assert_eq!(by_revenue[0].product_id, desk);
    assert_eq!(by_revenue[0].revenue, Money::from_cents(20000));
}

#[tokio::test]
async fn daily_sales_and_customers_over_a_range() {
    let h = TestHarness::new();
    let lamp = h.product("LAMP", 1000, 50).await;
    h.order(lamp, 1, 1000).await;
    h.order(lamp, 2, 1000).await;
    let dropped = h.order(lamp, 4, 1000).await;
    h.move_to(dropped, OrderStatus::Cancelled).await;

    let now = Utc::now();
    let range = DateRange::new(Some(now - Duration::hours(1)), Some(now + Duration::hours(1)))
        .unwrap();
    let sales = h.reports.sales(range, Grouping::Day).await.unwrap();
    let orders: u64 = sales.buckets.iter().map(|b| b.total_orders).sum();
    assert_eq!(orders, 2);
    // 1000 + 2000 plus 10% tax.
    let revenue: i64 = sales.buckets.iter().map(|b| b.total_revenue.cents()).sum();
    assert_eq!(revenue, 3300);

    let customers = h.reports.customers(range).await.unwrap();
    assert_eq!(customers.total_customers, 2);
    assert_eq!(customers.new_customers, 2);
    assert_eq!(customers.repeat_customers, 0);
    assert_eq!(customers.average_lifetime_value, Money::from_cents(1650));

    let past = DateRange::new(None, Some(now - Duration::days(1))).unwrap();
    assert!(h.reports.sales(past, Grouping::Week).await.unwrap().buckets.is_empty());
    assert_eq!(h.reports.customers(past).await.unwrap().new_customers, 0);
}
