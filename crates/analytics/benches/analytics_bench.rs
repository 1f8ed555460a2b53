use analytics::{DashboardService, Period, StockAudit};
use chrono::Utc;
use common::{Money, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Address, CartOwner, CheckoutDraft, OrderLine, OrderNumber, PricingPolicy, ProductDraft,
    ReferenceType, StockAdjustment, StockChange,
};
use store::{InMemoryStore, Store};

use std::sync::Arc;

/// Populate a store with N products, each with an opening restock, two
/// adjustments and one pending order.
async fn populate_store(store: &InMemoryStore, n: usize) {
    for i in 0..n {
        let product = ProductDraft {
            name: format!("Widget {i}"),
            sku: format!("SKU-{i:05}"),
            description: String::new(),
            category: "widgets".into(),
            tags: vec![],
            price: Money::from_cents(1000),
            compare_at_price: None,
            stock: 0,
            low_stock_threshold: None,
            is_active: None,
            is_featured: false,
        }
        .into_product(Utc::now());
        let opening = StockChange::new(StockAdjustment::In(100), "Initial stock")
            .reference_type(ReferenceType::Restock);
        let product = store.insert_product(product, Some(opening)).await.unwrap();

        store
            .adjust_stock(product.id, StockChange::new(StockAdjustment::Out(3), "Damaged"))
            .await
            .unwrap();
        store
            .adjust_stock(product.id, StockChange::new(StockAdjustment::Adjustment(90), "Count"))
            .await
            .unwrap();

        let user = UserId::new();
        let draft = CheckoutDraft {
            user_id: user,
            lines: vec![OrderLine::new(
                product.id,
                None,
                product.name.clone(),
                None,
                2,
                product.price,
            )],
            shipping_address: Address {
                street: "1 Main St".into(),
                city: "Springfield".into(),
                state: "IL".into(),
                zip_code: "62701".into(),
                country: "US".into(),
                phone: "555-0100".into(),
            },
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
        store
            .commit_checkout(order, &CartOwner::User(user))
            .await
            .unwrap();
    }
}

fn bench_audit(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();

    rt.block_on(populate_store(&store, 100));
    let audit = StockAudit::new(Arc::new(store));

    c.bench_function("analytics/audit_300_entries", |b| {
        b.iter(|| {
            rt.block_on(async {
                let report = audit.run(None).await.unwrap();
                assert!(report.is_consistent());
            });
        });
    });
}

fn bench_dashboard(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let store = InMemoryStore::new();

    rt.block_on(populate_store(&store, 1000));
    let dashboards = DashboardService::new(Arc::new(store));

    c.bench_function("analytics/dashboard_1000_orders", |b| {
        b.iter(|| {
            rt.block_on(async {
                dashboards.dashboard(Period::All, Utc::now()).await.unwrap();
            });
        });
    });
}

criterion_group!(benches, bench_audit, bench_dashboard);
criterion_main!(benches);
