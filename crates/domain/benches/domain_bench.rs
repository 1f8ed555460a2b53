use chrono::{Duration, Utc};
use common::{Money, ProductId, UserId};
use criterion::{Criterion, criterion_group, criterion_main};
use domain::{
    Address, Cart, CartOwner, CheckoutDraft, CouponDraft, DiscountType, InventoryLogEntry, Order,
    OrderLine, OrderNumber, OrderStatus, PaymentStatus, PricingPolicy, StockAdjustment,
    StockChange, replay_ledger,
};

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

fn lines(n: usize) -> Vec<OrderLine> {
    (0..n)
        .map(|i| {
            OrderLine::new(
                ProductId::new(),
                None,
                format!("Product {i}"),
                None,
                (i % 5 + 1) as u32,
                Money::from_cents(1999),
            )
        })
        .collect()
}

fn bench_pricing(c: &mut Criterion) {
    let policy = PricingPolicy::default();
    let lines = lines(20);

    c.bench_function("domain/price_20_lines", |b| {
        b.iter(|| policy.totals(&lines, Money::from_cents(500)));
    });
}

fn bench_place_order(c: &mut Criterion) {
    let policy = PricingPolicy::default();
    let lines = lines(5);

    c.bench_function("domain/place_order", |b| {
        b.iter(|| {
            let draft = CheckoutDraft {
                user_id: UserId::new(),
                lines: lines.clone(),
                shipping_address: address(),
                billing_address: None,
                notes: None,
                coupon_code: None,
                coupon_discount: Money::zero(),
                currency: "usd".into(),
            };
            Order::place(draft, &policy, OrderNumber::generate(Utc::now()), Utc::now()).unwrap()
        });
    });
}

fn bench_state_machine(c: &mut Criterion) {
    c.bench_function("domain/plan_all_transitions", |b| {
        b.iter(|| {
            let mut allowed = 0;
            for from in OrderStatus::ALL {
                for to in OrderStatus::ALL {
                    if from.plan_transition(to, PaymentStatus::Paid).is_ok() {
                        allowed += 1;
                    }
                }
            }
            allowed
        });
    });
}

fn bench_coupon_and_cart(c: &mut Criterion) {
    let now = Utc::now();
    let coupon = CouponDraft {
        code: "BENCH20".into(),
        description: String::new(),
        discount_type: DiscountType::Percentage,
        value: 2000,
        min_order_amount: Money::zero(),
        max_discount_amount: Some(Money::from_dollars(15)),
        usage_limit: None,
        valid_from: now - Duration::days(1),
        valid_until: now + Duration::days(1),
        is_active: None,
    }
    .into_coupon(now);

    c.bench_function("domain/cart_add_and_validate_coupon", |b| {
        b.iter(|| {
            let mut cart = Cart::new(CartOwner::Session("bench".into()), now);
            let product = ProductId::new();
            for _ in 0..10 {
                cart.add_item(product, None, 1, Money::from_cents(1000), now)
                    .unwrap();
            }
            coupon.validate(cart.subtotal(), now).unwrap()
        });
    });
}

fn bench_ledger_replay(c: &mut Criterion) {
    let product = ProductId::new();
    let now = Utc::now();
    let mut stock = 0;
    let mut ledger = Vec::with_capacity(1000);
    for i in 0..1000 {
        let adjustment = if i % 3 == 0 {
            StockAdjustment::Out(1)
        } else {
            StockAdjustment::In(2)
        };
        let entry = InventoryLogEntry::from_change(
            product,
            stock,
            &StockChange::new(adjustment, "bench"),
            now,
        )
        .unwrap();
        stock = entry.new_stock;
        ledger.push(entry);
    }

    c.bench_function("domain/replay_1000_entries", |b| {
        b.iter(|| replay_ledger(0, &ledger));
    });
}

criterion_group!(
    benches,
    bench_pricing,
    bench_place_order,
    bench_state_machine,
    bench_coupon_and_cart,
    bench_ledger_replay
);
criterion_main!(benches);
