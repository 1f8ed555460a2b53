use chrono::Utc;
use common::{Money, UserId};
use criterion::{BatchSize, Criterion, criterion_group, criterion_main};
use domain::{
    Address, CartOwner, CheckoutDraft, Order, OrderLine, OrderNumber, OrderStatus, PaymentStatus,
    PricingPolicy, Product, ProductDraft, StockAdjustment, StockChange,
};
use store::{InMemoryStore, ProductQuery, ProductSort, Store};

fn product(sku: String) -> Product {
    ProductDraft {
        name: format!("Product {sku}"),
        sku,
        description: String::new(),
        category: "bench".to_string(),
        tags: vec![],
        price: Money::from_cents(1999),
        compare_at_price: None,
        stock: 0,
        low_stock_threshold: None,
        is_active: None,
        is_featured: false,
    }
    .into_product(Utc::now())
}

async fn seeded(count: u32, stock: u32) -> (InMemoryStore, Vec<Product>) {
    let store = InMemoryStore::new();
    let mut products = Vec::new();
    for i in 0..count {
        let p = store
            .insert_product(
                product(format!("BENCH-{i}")),
                Some(StockChange::new(StockAdjustment::In(stock), "opening stock")),
            )
            .await
            .unwrap();
        products.push(p);
    }
    (store, products)
}

fn order_for(products: &[Product]) -> Order {
    let lines = products
        .iter()
        .map(|p| OrderLine::new(p.id, None, p.name.clone(), None, 1, p.price))
        .collect();
    Order::place(
        CheckoutDraft {
            user_id: UserId::new(),
            lines,
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
        },
        &PricingPolicy::default(),
        OrderNumber::generate(Utc::now()),
        Utc::now(),
    )
    .unwrap()
}

fn bench_adjust_stock(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, products) = rt.block_on(seeded(1, u32::MAX / 2));
    let id = products[0].id;

    c.bench_function("store/adjust_stock_out_1", |b| {
        b.iter(|| {
            rt.block_on(async {
                store
                    .adjust_stock(id, StockChange::new(StockAdjustment::Out(1), "bench"))
                    .await
                    .unwrap();
            });
        });
    });
}

fn bench_checkout_and_confirm(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();

    c.bench_function("store/checkout_and_confirm_5_lines", |b| {
        b.iter_batched(
            || rt.block_on(seeded(5, 100)),
            |(store, products)| {
                rt.block_on(async {
                    let order = order_for(&products);
                    let owner = CartOwner::User(order.user_id);
                    let order = store.commit_checkout(order, &owner).await.unwrap();
                    let transition = order
                        .plan(OrderStatus::Confirmed)
                        .unwrap()
                        .with_payment_status(PaymentStatus::Paid);
                    store.apply_transition(&transition).await.unwrap();
                });
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_list_products(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, _) = rt.block_on(seeded(500, 20));
    let query = ProductQuery::storefront().sort(ProductSort::PriceAsc);

    c.bench_function("store/list_products_500", |b| {
        b.iter(|| {
            rt.block_on(async {
                store.list_products(&query).await.unwrap();
            });
        });
    });
}

criterion_group!(
    benches,
    bench_adjust_stock,
    bench_checkout_and_confirm,
    bench_list_products
);
criterion_main!(benches);
