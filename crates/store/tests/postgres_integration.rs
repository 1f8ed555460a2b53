//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::{Duration, Utc};
use common::{Money, PageRequest, ProductId, UserId};
use domain::{
    Address, Cart, CartOwner, CategoryDraft, CategoryPatch, CheckoutDraft, CouponDraft,
    DiscountType, LedgerEntryType, Order, OrderLine, OrderNumber, OrderStatus, PaymentStatus,
    PricingPolicy, Product, ProductDraft, ReferenceType, Review, ReviewDraft, StockAdjustment,
    StockChange, Wishlist,
};
use futures_util::StreamExt;
use serial_test::serial;
use sqlx::PgPool;
use store::{
    InventoryLogQuery, OrderQuery, PostgresStore, ProductQuery, ProductSort, ReviewQuery, Store,
    StoreError,
};
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            for migration in [
                include_str!("../../../migrations/001_create_storefront_tables.sql"),
                include_str!("../../../migrations/002_payment_intent_history.sql"),
                include_str!("../../../migrations/003_categories_reviews.sql"),
            ] {
                sqlx::raw_sql(migration).execute(&temp_pool).await.unwrap();
            }
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query(
        "TRUNCATE TABLE products, inventory_logs, carts, wishlists, coupons, orders, \
         order_payment_intents, categories, reviews",
    )
    .execute(&pool)
    .await
    .unwrap();

    PostgresStore::new(pool)
}

fn product(sku: &str, price_cents: i64) -> Product {
    ProductDraft {
        name: format!("Product {sku}"),
        sku: sku.to_string(),
        description: "test product".to_string(),
        category: "general".to_string(),
        tags: vec!["test".to_string()],
        price: Money::from_cents(price_cents),
        compare_at_price: None,
        stock: 0,
        low_stock_threshold: Some(3),
        is_active: None,
        is_featured: false,
    }
    .into_product(Utc::now())
}

async fn stocked(store: &PostgresStore, sku: &str, stock: u32) -> Product {
    store
        .insert_product(
            product(sku, 2500),
            (stock > 0).then(|| {
                StockChange::new(StockAdjustment::In(stock), "opening stock")
                    .reference_type(ReferenceType::Restock)
            }),
        )
        .await
        .unwrap()
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

fn order_for(lines: Vec<(&Product, u32)>, coupon_code: Option<&str>) -> Order {
    let lines = lines
        .into_iter()
        .map(|(p, q)| OrderLine::new(p.id, None, p.name.clone(), None, q, p.price))
        .collect();
    Order::place(
        CheckoutDraft {
            user_id: UserId::new(),
            lines,
            shipping_address: address(),
            billing_address: None,
            notes: Some("leave at the door".into()),
            coupon_code: coupon_code.map(String::from),
            coupon_discount: Money::zero(),
            currency: "usd".into(),
        },
        &PricingPolicy::default(),
        OrderNumber::generate(Utc::now()),
        Utc::now(),
    )
    .unwrap()
}

async fn placed(store: &PostgresStore, lines: Vec<(&Product, u32)>) -> Order {
    let order = order_for(lines, None);
    store
        .commit_checkout(order.clone(), &CartOwner::User(order.user_id))
        .await
        .unwrap()
}

mod catalog {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn insert_and_fetch_product() {
        let store = get_test_store().await;
        let p = stocked(&store, "SKU-1", 5).await;

        let fetched = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(fetched.sku, "SKU-1");
        assert_eq!(fetched.stock, 5);
        assert_eq!(fetched.tags, vec!["test".to_string()]);
        assert_eq!(fetched.price, Money::from_cents(2500));
    }

    #[tokio::test]
    #[serial]
    async fn duplicate_sku_maps_to_duplicate() {
        let store = get_test_store().await;
        store.insert_product(product("DUP", 100), None).await.unwrap();

        let err = store
            .insert_product(product("DUP", 200), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "product", .. }));
    }

    #[tokio::test]
    #[serial]
    async fn update_keeps_stock() {
        let store = get_test_store().await;
        let mut p = stocked(&store, "SKU-1", 5).await;
        p.stock = 500;
        p.price = Money::from_cents(1999);

        let updated = store.update_product(p).await.unwrap();
        assert_eq!(updated.stock, 5);
        assert_eq!(updated.price, Money::from_cents(1999));
    }

    #[tokio::test]
    #[serial]
    async fn list_with_filters_and_paging() {
        let store = get_test_store().await;
        stocked(&store, "A", 10).await;
        stocked(&store, "B", 2).await;
        stocked(&store, "C", 0).await;

        let (low, total) = store
            .list_products(
                &ProductQuery::new()
                    .low_stock_only(true)
                    .sort(ProductSort::StockAsc)
                    .page(PageRequest::new(1, 1)),
            )
            .await
            .unwrap();
        assert_eq!(total, 2);
        assert_eq!(low.len(), 1);
        assert_eq!(low[0].sku, "C");

        let stats = store.inventory_stats().await.unwrap();
        assert_eq!(stats.total_products, 3);
        assert_eq!(stats.total_stock, 12);
        assert_eq!(stats.low_stock_count, 2);
        assert_eq!(stats.out_of_stock_count, 1);
    }

    #[tokio::test]
    #[serial]
    async fn delete_missing_product_is_not_found() {
        let store = get_test_store().await;
        let err = store.delete_product(ProductId::new()).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { entity: "product", .. }));
    }
}

mod inventory {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn out_below_zero_is_rejected() {
        let store = get_test_store().await;
        let p = stocked(&store, "SKU-1", 3).await;

        let err = store
            .adjust_stock(p.id, StockChange::new(StockAdjustment::Out(4), "damaged"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InsufficientStock {
                requested: 4,
                available: 3,
                ..
            }
        ));
        assert_eq!(store.get_product(p.id).await.unwrap().unwrap().stock, 3);
    }

    #[tokio::test]
    #[serial]
    async fn ledger_matches_stock() {
        let store = get_test_store().await;
        let p = stocked(&store, "SKU-1", 8).await;
        store
            .adjust_stock(p.id, StockChange::new(StockAdjustment::Out(5), "sale"))
            .await
            .unwrap();
        let recount = store
            .adjust_stock(
                p.id,
                StockChange::new(StockAdjustment::Adjustment(10), "recount"),
            )
            .await
            .unwrap();
        assert_eq!(recount.quantity_delta, 7);
        assert_eq!(recount.entry_type, LedgerEntryType::Adjustment);

        let entries: Vec<_> = store
            .stream_inventory_logs(Some(p.id))
            .await
            .unwrap()
            .map(|r| r.unwrap())
            .collect()
            .await;
        assert_eq!(entries.len(), 3);
        assert_eq!(domain::replay_ledger(0, &entries), Some(10));

        let (newest_first, total) = store
            .list_inventory_logs(&InventoryLogQuery::for_product(p.id))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(newest_first[0].id, recount.id);
    }

    #[tokio::test]
    #[serial]
    async fn concurrent_decrements_never_oversell() {
        let store = get_test_store().await;
        let id = stocked(&store, "HOT", 5).await.id;

        let mut handles = Vec::new();
        for _ in 0..10 {
            let store = store.clone();
            handles.push(tokio::spawn(async move {
                store
                    .adjust_stock(id, StockChange::new(StockAdjustment::Out(1), "sale"))
                    .await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                succeeded += 1;
            }
        }
        assert_eq!(succeeded, 5);
        assert_eq!(store.get_product(id).await.unwrap().unwrap().stock, 0);
    }
}

mod carts {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn cart_and_wishlist_round_trip() {
        let store = get_test_store().await;
        let p = stocked(&store, "SKU-1", 5).await;
        let now = Utc::now();

        let owner = CartOwner::Session("sess-1".into());
        let mut cart = Cart::new(owner.clone(), now);
        cart.add_item(p.id, Some("red".into()), 2, p.price, now)
            .unwrap();
        store.save_cart(&cart).await.unwrap();

        let loaded = store.get_cart(&owner).await.unwrap().unwrap();
        assert_eq!(loaded.total_items(), 2);

        store.delete_cart(&owner).await.unwrap();
        assert!(store.get_cart(&owner).await.unwrap().is_none());

        let user = UserId::new();
        let mut wishlist = Wishlist::new(user);
        wishlist.add(p.id, now);
        store.save_wishlist(&wishlist).await.unwrap();
        let loaded = store.get_wishlist(user).await.unwrap().unwrap();
        assert!(loaded.contains(p.id));
    }
}

mod orders {
    use super::*;

    #[tokio::test]
    #[serial]
    async fn checkout_redeems_coupon_once() {
        let store = get_test_store().await;
        let p = stocked(&store, "SKU-1", 5).await;
        let now = Utc::now();
        store
            .insert_coupon(
                CouponDraft {
                    code: "ONCE".into(),
                    description: String::new(),
                    discount_type: DiscountType::Fixed,
                    value: 100,
                    min_order_amount: Money::zero(),
                    max_discount_amount: None,
                    usage_limit: Some(1),
                    valid_from: now - Duration::days(1),
                    valid_until: now + Duration::days(1),
                    is_active: None,
                }
                .into_coupon(now),
            )
            .await
            .unwrap();

        let first = order_for(vec![(&p, 1)], Some("once"));
        store
            .commit_checkout(first.clone(), &CartOwner::User(first.user_id))
            .await
            .unwrap();
        let coupon = store.find_coupon_by_code("once").await.unwrap().unwrap();
        assert_eq!(coupon.used_count, 1);

        let second = order_for(vec![(&p, 1)], Some("ONCE"));
        let err = store
            .commit_checkout(second.clone(), &CartOwner::User(second.user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::CouponUnavailable { .. }));
        assert!(store.get_order(second.id).await.unwrap().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn order_round_trips() {
        let store = get_test_store().await;
        let p = stocked(&store, "SKU-1", 5).await;
        let order = placed(&store, vec![(&p, 2)]).await;

        let fetched = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(fetched.order_number, order.order_number);
        assert_eq!(fetched.items, order.items);
        assert_eq!(fetched.total, order.total);
        assert_eq!(fetched.shipping_address, address());
        assert_eq!(fetched.status, OrderStatus::Pending);
    }

    #[tokio::test]
    #[serial]
    async fn duplicate_order_number_maps_to_duplicate() {
        let store = get_test_store().await;
        let p = stocked(&store, "SKU-1", 5).await;
        let first = placed(&store, vec![(&p, 1)]).await;

        let mut second = order_for(vec![(&p, 1)], None);
        second.order_number = first.order_number.clone();
        let err = store
            .commit_checkout(second.clone(), &CartOwner::User(second.user_id))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "order", .. }));
    }

    #[tokio::test]
    #[serial]
    async fn confirm_rolls_back_on_shortage() {
        let store = get_test_store().await;
        let plenty = stocked(&store, "A", 10).await;
        let scarce = stocked(&store, "B", 1).await;
        let order = placed(&store, vec![(&plenty, 2), (&scarce, 2)]).await;

        let transition = order
            .plan(OrderStatus::Confirmed)
            .unwrap()
            .with_payment_status(PaymentStatus::Paid);
        let err = store.apply_transition(&transition).await.unwrap_err();
        assert!(matches!(err, StoreError::InsufficientStock { .. }));

        let stored = store.get_order(order.id).await.unwrap().unwrap();
        assert_eq!(stored.status, OrderStatus::Pending);
        assert_eq!(stored.payment_status, PaymentStatus::Pending);
        assert_eq!(store.get_product(plenty.id).await.unwrap().unwrap().stock, 10);
    }

    #[tokio::test]
    #[serial]
    async fn confirm_then_cancel_restores_stock() {
        let store = get_test_store().await;
        let p = stocked(&store, "A", 5).await;
        let order = placed(&store, vec![(&p, 2)]).await;

        let confirmed = store
            .apply_transition(
                &order
                    .plan(OrderStatus::Confirmed)
                    .unwrap()
                    .with_payment_status(PaymentStatus::Paid),
            )
            .await
            .unwrap();
        assert_eq!(confirmed.order.payment_status, PaymentStatus::Paid);
        assert_eq!(confirmed.ledger_entries[0].quantity_delta, -2);
        assert_eq!(store.get_product(p.id).await.unwrap().unwrap().stock, 3);

        let stale = order.plan(OrderStatus::Cancelled).unwrap();
        let err = store.apply_transition(&stale).await.unwrap_err();
        assert!(matches!(err, StoreError::StatusConflict { .. }));

        let cancelled = store
            .apply_transition(&confirmed.order.plan(OrderStatus::Cancelled).unwrap())
            .await
            .unwrap();
        assert_eq!(cancelled.ledger_entries[0].quantity_delta, 2);
        assert_eq!(store.get_product(p.id).await.unwrap().unwrap().stock, 5);
    }

    #[tokio::test]
    #[serial]
    async fn payment_fields_use_compare_and_set() {
        let store = get_test_store().await;
        let p = stocked(&store, "A", 5).await;
        let order = placed(&store, vec![(&p, 1)]).await;

        store
            .attach_payment_intent(order.id, None, "pi_41")
            .await
            .unwrap();
        assert!(
            store
                .attach_payment_intent(order.id, None, "pi_42")
                .await
                .is_err()
        );
        store
            .attach_payment_intent(order.id, Some("pi_41"), "pi_42")
            .await
            .unwrap();
        for intent in ["pi_41", "pi_42"] {
            let found = store
                .find_order_by_payment_intent(intent)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(found.id, order.id);
            assert_eq!(found.payment_intent_id.as_deref(), Some("pi_42"));
        }

        store
            .update_payment_status(order.id, &[PaymentStatus::Pending], PaymentStatus::Failed)
            .await
            .unwrap();
        let err = store
            .update_payment_status(order.id, &[PaymentStatus::Pending], PaymentStatus::Paid)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::StatusConflict { .. }));

        let tracked = store.set_tracking_number(order.id, "1Z999").await.unwrap();
        assert_eq!(tracked.tracking_number.as_deref(), Some("1Z999"));
    }

    #[tokio::test]
    #[serial]
    async fn list_orders_filters_by_user() {
        let store = get_test_store().await;
        let p = stocked(&store, "A", 5).await;
        let a = placed(&store, vec![(&p, 1)]).await;
        placed(&store, vec![(&p, 1)]).await;

        let (mine, total) = store
            .list_orders(&OrderQuery::for_user(a.user_id))
            .await
            .unwrap();
        assert_eq!(total, 1);
        assert_eq!(mine[0].id, a.id);

        let (all, total) = store.list_orders(&OrderQuery::new()).await.unwrap();
        assert_eq!(total, 2);
        assert_eq!(all.len(), 2);
    }
}

mod categories {
    use super::*;

    fn category(name: &str, sort_order: i32) -> CategoryDraft {
        CategoryDraft {
            name: name.to_string(),
            description: String::new(),
            image: None,
            parent_id: None,
            is_active: None,
            sort_order,
        }
    }

    #[tokio::test]
    #[serial]
    async fn rename_moves_products() {
        let store = get_test_store().await;
        let p = stocked(&store, "A", 1).await;
        let general = store
            .insert_category(category("General", 0).into_category(Utc::now()))
            .await
            .unwrap();

        let mut renamed = general.clone();
        CategoryPatch {
            name: Some("Home Goods".into()),
            ..Default::default()
        }
        .apply(&mut renamed, Utc::now());
        let renamed = store.update_category(renamed).await.unwrap();
        assert_eq!(renamed.slug, "home-goods");

        let product = store.get_product(p.id).await.unwrap().unwrap();
        assert_eq!(product.category, "home-goods");
        assert!(store.find_category_by_slug("general").await.unwrap().is_none());
    }

    #[tokio::test]
    #[serial]
    async fn slug_is_unique_and_listing_is_ordered() {
        let store = get_test_store().await;
        store
            .insert_category(category("Lamps", 2).into_category(Utc::now()))
            .await
            .unwrap();
        store
            .insert_category(category("Desks", 1).into_category(Utc::now()))
            .await
            .unwrap();
        let err = store
            .insert_category(category("lamps", 0).into_category(Utc::now()))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "category", .. }));

        let names: Vec<_> = store
            .list_categories(true)
            .await
            .unwrap()
            .into_iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["Desks", "Lamps"]);
    }

    #[tokio::test]
    #[serial]
    async fn delete_orphans_children_and_refuses_while_in_use() {
        let store = get_test_store().await;
        stocked(&store, "A", 1).await;
        let general = store
            .insert_category(category("General", 0).into_category(Utc::now()))
            .await
            .unwrap();
        let parent = store
            .insert_category(category("Furniture", 0).into_category(Utc::now()))
            .await
            .unwrap();
        let mut child = category("Chairs", 0);
        child.parent_id = Some(parent.id);
        let child = store
            .insert_category(child.into_category(Utc::now()))
            .await
            .unwrap();

        let err = store.delete_category(general.id).await.unwrap_err();
        assert!(matches!(err, StoreError::InUse { count: 1, .. }));

        store.delete_category(parent.id).await.unwrap();
        let child = store.get_category(child.id).await.unwrap().unwrap();
        assert_eq!(child.parent_id, None);
    }
}

mod reviews {
    use super::*;

    fn review(product: &Product, user_id: UserId, rating: u8) -> Review {
        ReviewDraft {
            rating,
            title: "Nice".into(),
            comment: "Works well.".into(),
            images: vec!["https://img.example/1.jpg".into()],
        }
        .into_review(user_id, product.id, None, Utc::now())
    }

    #[tokio::test]
    #[serial]
    async fn one_review_per_user_and_product() {
        let store = get_test_store().await;
        let p = stocked(&store, "A", 1).await;
        let user = UserId::new();
        let stored = store.insert_review(review(&p, user, 5)).await.unwrap();
        assert_eq!(stored.images.len(), 1);

        let err = store
            .insert_review(review(&p, user, 2))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { entity: "review", .. }));
    }

    #[tokio::test]
    #[serial]
    async fn ratings_and_listing_see_approved_reviews_only() {
        let store = get_test_store().await;
        let p = stocked(&store, "A", 1).await;
        for rating in [5, 4, 4] {
            let mut r = review(&p, UserId::new(), rating);
            r.is_approved = true;
            store.insert_review(r).await.unwrap();
        }
        store
            .insert_review(review(&p, UserId::new(), 1))
            .await
            .unwrap();

        let ratings = store
            .rating_summaries(&[p.id, ProductId::new()])
            .await
            .unwrap();
        assert_eq!(ratings.len(), 1);
        assert_eq!(ratings[&p.id].review_count, 3);
        assert_eq!(ratings[&p.id].average_rating, 4.3);

        let (page, total) = store
            .list_reviews(&ReviewQuery::published(p.id).page(PageRequest::new(1, 2)))
            .await
            .unwrap();
        assert_eq!(total, 3);
        assert_eq!(page.len(), 2);

        let (pending, _) = store
            .list_reviews(&ReviewQuery::new().approved(Some(false)))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].rating, 1);
    }

    #[tokio::test]
    #[serial]
    async fn helpful_count_is_not_overwritten_by_edits() {
        let store = get_test_store().await;
        let p = stocked(&store, "A", 1).await;
        let stored = store
            .insert_review(review(&p, UserId::new(), 4))
            .await
            .unwrap();

        store.increment_review_helpful(stored.id).await.unwrap();
        let mut edited = store.increment_review_helpful(stored.id).await.unwrap();
        edited.helpful_count = 0;
        edited.title = "Still nice".into();
        let updated = store.update_review(edited).await.unwrap();
        assert_eq!(updated.title, "Still nice");
        assert_eq!(updated.helpful_count, 2);

        store.delete_review(stored.id).await.unwrap();
        assert!(store.get_review(stored.id).await.unwrap().is_none());
        let err = store.delete_review(stored.id).await.unwrap_err();
        assert!(matches!(err, StoreError::NotFound { .. }));
    }

    #[tokio::test]
    #[serial]
    async fn delivered_purchase_matches_order_lines() {
        let store = get_test_store().await;
        let p = stocked(&store, "A", 5).await;
        let other = stocked(&store, "B", 5).await;
        let mut current = placed(&store, vec![(&p, 1)]).await;
        assert_eq!(
            store
                .find_delivered_purchase(current.user_id, p.id)
                .await
                .unwrap(),
            None
        );

        for status in [
            OrderStatus::Confirmed,
            OrderStatus::Processing,
            OrderStatus::Shipped,
            OrderStatus::Delivered,
        ] {
            current = store
                .apply_transition(&current.plan(status).unwrap())
                .await
                .unwrap()
                .order;
        }

        assert_eq!(
            store
                .find_delivered_purchase(current.user_id, p.id)
                .await
                .unwrap(),
            Some(current.id)
        );
        assert_eq!(
            store
                .find_delivered_purchase(current.user_id, other.id)
                .await
                .unwrap(),
            None
        );
    }
}
