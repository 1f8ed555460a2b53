use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use common::{CategoryId, CouponId, LogEntryId, Money, OrderId, ProductId, ReviewId, UserId};
use domain::{
    Cart, CartOwner, Category, Coupon, InventoryError, InventoryLogEntry, Order, OrderNumber,
    PaymentStatus, Product, RatingSummary, Review, StockAdjustment, StockChange, Transition,
    Wishlist, normalize_code,
};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row, Transaction, postgres::PgRow};
use uuid::Uuid;

use crate::store::{InventoryStats, LedgerStream, Store, TransitionOutcome};
use crate::{
    InventoryLogQuery, OrderQuery, ProductQuery, ProductSort, Result, ReviewQuery, StoreError,
};

macro_rules! product_columns {
    () => {
        "id, name, sku, description, category, tags, price_cents, compare_at_price_cents, \
         images, stock, low_stock_threshold, is_active, is_featured, created_at, updated_at"
    };
}

macro_rules! order_columns {
    () => {
        "id, order_number, user_id, items, subtotal_cents, shipping_cost_cents, tax_cents, \
         discount_cents, total_cents, currency, status, payment_status, payment_intent_id, \
         shipping_address, billing_address, tracking_number, notes, coupon_code, created_at, \
         updated_at"
    };
}

macro_rules! coupon_columns {
    () => {
        "id, code, description, discount_type, value, min_order_amount_cents, \
         max_discount_amount_cents, usage_limit, used_count, valid_from, valid_until, is_active, \
         created_at, updated_at"
    };
}

macro_rules! category_columns {
    () => {
        "id, name, slug, description, image, parent_id, is_active, sort_order, created_at, \
         updated_at"
    };
}

macro_rules! review_columns {
    () => {
        "id, user_id, product_id, order_id, rating, title, comment, images, \
         is_verified_purchase, is_approved, helpful_count, created_at, updated_at"
    };
}

macro_rules! log_columns {
    () => {
        "id, product_id, entry_type, quantity_delta, previous_stock, new_stock, reason, \
         reference_type, reference_id, performed_by, created_at"
    };
}

/// PostgreSQL-backed store implementation.
#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

fn to_u32(value: i64, column: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("{column} out of range: {value}")))
}

fn parse_column<T>(value: String) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e: T::Err| StoreError::Corrupt(e.to_string()))
}

/// Maps a unique violation on `constraint` to `Duplicate`.
fn map_unique(err: sqlx::Error, constraint: &str, entity: &'static str, key: &str) -> StoreError {
    if let sqlx::Error::Database(ref db_err) = err
        && db_err.constraint() == Some(constraint)
    {
        return StoreError::Duplicate {
            entity,
            key: key.to_string(),
        };
    }
    StoreError::Database(err)
}

impl PostgresStore {
    /// Creates a new PostgreSQL store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> Result<()> {
        sqlx::migrate!("../../migrations").run(&self.pool).await?;
        Ok(())
    }

    fn row_to_product(row: PgRow) -> Result<Product> {
        let tags: Json<Vec<String>> = row.try_get("tags")?;
        let images: Json<Vec<domain::ProductImage>> = row.try_get("images")?;
        let compare_at: Option<i64> = row.try_get("compare_at_price_cents")?;

        Ok(Product {
            id: ProductId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            sku: row.try_get("sku")?,
            description: row.try_get("description")?,
            category: row.try_get("category")?,
            tags: tags.0,
            price: Money::from_cents(row.try_get("price_cents")?),
            compare_at_price: compare_at.map(Money::from_cents),
            images: images.0,
            stock: to_u32(row.try_get("stock")?, "stock")?,
            low_stock_threshold: to_u32(
                row.try_get("low_stock_threshold")?,
                "low_stock_threshold",
            )?,
            is_active: row.try_get("is_active")?,
            is_featured: row.try_get("is_featured")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_order(row: PgRow) -> Result<Order> {
        let items: Json<Vec<domain::OrderLine>> = row.try_get("items")?;
        let shipping: Json<domain::Address> = row.try_get("shipping_address")?;
        let billing: Json<domain::Address> = row.try_get("billing_address")?;
        let order_number: String = row.try_get("order_number")?;

        Ok(Order {
            id: OrderId::from_uuid(row.try_get::<Uuid, _>("id")?),
            order_number: OrderNumber::parse(&order_number)
                .map_err(|e| StoreError::Corrupt(e.to_string()))?,
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            items: items.0,
            subtotal: Money::from_cents(row.try_get("subtotal_cents")?),
            shipping_cost: Money::from_cents(row.try_get("shipping_cost_cents")?),
            tax: Money::from_cents(row.try_get("tax_cents")?),
            discount: Money::from_cents(row.try_get("discount_cents")?),
            total: Money::from_cents(row.try_get("total_cents")?),
            currency: row.try_get("currency")?,
            status: parse_column(row.try_get("status")?)?,
            payment_status: parse_column(row.try_get("payment_status")?)?,
            payment_intent_id: row.try_get("payment_intent_id")?,
            shipping_address: shipping.0,
            billing_address: billing.0,
            tracking_number: row.try_get("tracking_number")?,
            notes: row.try_get("notes")?,
            coupon_code: row.try_get("coupon_code")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_coupon(row: PgRow) -> Result<Coupon> {
        let max_discount: Option<i64> = row.try_get("max_discount_amount_cents")?;
        let usage_limit: Option<i64> = row.try_get("usage_limit")?;

        Ok(Coupon {
            id: CouponId::from_uuid(row.try_get::<Uuid, _>("id")?),
            code: row.try_get("code")?,
            description: row.try_get("description")?,
            discount_type: parse_column(row.try_get("discount_type")?)?,
            value: row.try_get("value")?,
            min_order_amount: Money::from_cents(row.try_get("min_order_amount_cents")?),
            max_discount_amount: max_discount.map(Money::from_cents),
            usage_limit: usage_limit.map(|l| to_u32(l, "usage_limit")).transpose()?,
            used_count: to_u32(row.try_get("used_count")?, "used_count")?,
            valid_from: row.try_get("valid_from")?,
            valid_until: row.try_get("valid_until")?,
            is_active: row.try_get("is_active")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_category(row: PgRow) -> Result<Category> {
        let parent_id: Option<Uuid> = row.try_get("parent_id")?;

        Ok(Category {
            id: CategoryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            name: row.try_get("name")?,
            slug: row.try_get("slug")?,
            description: row.try_get("description")?,
            image: row.try_get("image")?,
            parent_id: parent_id.map(CategoryId::from_uuid),
            is_active: row.try_get("is_active")?,
            sort_order: row.try_get("sort_order")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_review(row: PgRow) -> Result<Review> {
        let order_id: Option<Uuid> = row.try_get("order_id")?;
        let images: Json<Vec<String>> = row.try_get("images")?;
        let rating: i16 = row.try_get("rating")?;

        Ok(Review {
            id: ReviewId::from_uuid(row.try_get::<Uuid, _>("id")?),
            user_id: UserId::from_uuid(row.try_get::<Uuid, _>("user_id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            order_id: order_id.map(OrderId::from_uuid),
            rating: u8::try_from(rating)
                .map_err(|_| StoreError::Corrupt(format!("rating out of range: {rating}")))?,
            title: row.try_get("title")?,
            comment: row.try_get("comment")?,
            images: images.0,
            is_verified_purchase: row.try_get("is_verified_purchase")?,
            is_approved: row.try_get("is_approved")?,
            helpful_count: to_u32(row.try_get("helpful_count")?, "helpful_count")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn row_to_log(row: PgRow) -> Result<InventoryLogEntry> {
        let performed_by: Option<Uuid> = row.try_get("performed_by")?;

        Ok(InventoryLogEntry {
            id: LogEntryId::from_uuid(row.try_get::<Uuid, _>("id")?),
            product_id: ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?),
            entry_type: parse_column(row.try_get("entry_type")?)?,
            quantity_delta: row.try_get("quantity_delta")?,
            previous_stock: to_u32(row.try_get("previous_stock")?, "previous_stock")?,
            new_stock: to_u32(row.try_get("new_stock")?, "new_stock")?,
            reason: row.try_get("reason")?,
            reference_type: parse_column(row.try_get("reference_type")?)?,
            reference_id: row.try_get("reference_id")?,
            performed_by: performed_by.map(UserId::from_uuid),
            created_at: row.try_get("created_at")?,
        })
    }

    async fn insert_log(
        tx: &mut Transaction<'_, Postgres>,
        entry: &InventoryLogEntry,
    ) -> Result<()> {
        sqlx::query(concat!(
            "INSERT INTO inventory_logs (",
            log_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)"
        ))
        .bind(entry.id.as_uuid())
        .bind(entry.product_id.as_uuid())
        .bind(entry.entry_type.as_str())
        .bind(entry.quantity_delta)
        .bind(i64::from(entry.previous_stock))
        .bind(i64::from(entry.new_stock))
        .bind(&entry.reason)
        .bind(entry.reference_type.as_str())
        .bind(&entry.reference_id)
        .bind(entry.performed_by.map(|u| u.as_uuid()))
        .bind(entry.created_at)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Applies one stock change inside `tx` and appends its ledger entry.
    ///
    /// Relative changes use a conditional update so concurrent writers can
    /// never drive stock below zero. With `for_order` set, a restore for a
    /// deleted product is skipped (`Ok(None)`).
    async fn apply_change(
        tx: &mut Transaction<'_, Postgres>,
        product_id: ProductId,
        change: &StockChange,
        for_order: bool,
    ) -> Result<Option<InventoryLogEntry>> {
        let now = Utc::now();

        let (previous, new) = match change.adjustment {
            StockAdjustment::In(0) | StockAdjustment::Out(0) => {
                return Err(InventoryError::ZeroQuantity.into());
            }
            StockAdjustment::Adjustment(level) => {
                let current: Option<i64> =
                    sqlx::query_scalar("SELECT stock FROM products WHERE id = $1 FOR UPDATE")
                        .bind(product_id.as_uuid())
                        .fetch_optional(&mut **tx)
                        .await?;
                let current = current.ok_or_else(|| StoreError::not_found("product", product_id))?;

                sqlx::query("UPDATE products SET stock = $2, updated_at = $3 WHERE id = $1")
                    .bind(product_id.as_uuid())
                    .bind(i64::from(level))
                    .bind(now)
                    .execute(&mut **tx)
                    .await?;
                (to_u32(current, "stock")?, level)
            }
            adjustment => {
                let delta = adjustment.relative_delta().unwrap_or_default();
                let updated: Option<i64> = sqlx::query_scalar(
                    r#"
                    UPDATE products SET stock = stock + $2, updated_at = $3
                    WHERE id = $1 AND stock + $2 >= 0
                    RETURNING stock
                    "#,
                )
                .bind(product_id.as_uuid())
                .bind(delta)
                .bind(now)
                .fetch_optional(&mut **tx)
                .await?;

                match updated {
                    Some(new) => (to_u32(new - delta, "stock")?, to_u32(new, "stock")?),
                    None => {
                        let current: Option<i64> =
                            sqlx::query_scalar("SELECT stock FROM products WHERE id = $1")
                                .bind(product_id.as_uuid())
                                .fetch_optional(&mut **tx)
                                .await?;
                        return match (current, adjustment) {
                            (Some(available), StockAdjustment::Out(requested)) => {
                                Err(StoreError::InsufficientStock {
                                    product_id,
                                    requested,
                                    available: to_u32(available, "stock")?,
                                })
                            }
                            (None, StockAdjustment::In(_)) if for_order => {
                                tracing::warn!(
                                    %product_id,
                                    "product no longer exists, skipping restore"
                                );
                                Ok(None)
                            }
                            (None, StockAdjustment::Out(requested)) if for_order => {
                                Err(StoreError::InsufficientStock {
                                    product_id,
                                    requested,
                                    available: 0,
                                })
                            }
                            _ => Err(StoreError::not_found("product", product_id)),
                        };
                    }
                }
            }
        };

        let entry = InventoryLogEntry::record(
            product_id,
            change.adjustment.entry_type(),
            previous,
            new,
            change,
            now,
        );
        Self::insert_log(tx, &entry).await?;
        Ok(Some(entry))
    }

    async fn fetch_order(&self, id: OrderId) -> Result<Order> {
        self.get_order(id)
            .await?
            .ok_or_else(|| StoreError::not_found("order", id))
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn insert_product(
        &self,
        product: Product,
        opening_stock: Option<StockChange>,
    ) -> Result<Product> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(concat!(
            "INSERT INTO products (",
            product_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, 0, $10, $11, $12, $13, $14)"
        ))
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(&product.category)
        .bind(Json(&product.tags))
        .bind(product.price.cents())
        .bind(product.compare_at_price.map(|m| m.cents()))
        .bind(Json(&product.images))
        .bind(i64::from(product.low_stock_threshold))
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.created_at)
        .bind(product.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "products_sku_key", "product", &product.sku))?;

        if let Some(change) = opening_stock {
            Self::apply_change(&mut tx, product.id, &change, false).await?;
        }

        let row = sqlx::query(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE id = $1"
        ))
        .bind(product.id.as_uuid())
        .fetch_one(&mut *tx)
        .await?;
        tx.commit().await?;
        Self::row_to_product(row)
    }

    async fn update_product(&self, product: Product) -> Result<Product> {
        let row = sqlx::query(concat!(
            r#"
            UPDATE products SET
                name = $2, sku = $3, description = $4, category = $5, tags = $6,
                price_cents = $7, compare_at_price_cents = $8, images = $9,
                low_stock_threshold = $10, is_active = $11, is_featured = $12, updated_at = $13
            WHERE id = $1
            RETURNING "#,
            product_columns!()
        ))
        .bind(product.id.as_uuid())
        .bind(&product.name)
        .bind(&product.sku)
        .bind(&product.description)
        .bind(&product.category)
        .bind(Json(&product.tags))
        .bind(product.price.cents())
        .bind(product.compare_at_price.map(|m| m.cents()))
        .bind(Json(&product.images))
        .bind(i64::from(product.low_stock_threshold))
        .bind(product.is_active)
        .bind(product.is_featured)
        .bind(product.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique(e, "products_sku_key", "product", &product.sku))?
        .ok_or_else(|| StoreError::not_found("product", product.id))?;

        Self::row_to_product(row)
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>> {
        sqlx::query(concat!("SELECT ", product_columns!(), " FROM products WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_product)
            .transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>> {
        let uuids: Vec<Uuid> = ids.iter().map(|id| id.as_uuid()).collect();
        let rows = sqlx::query(concat!(
            "SELECT ",
            product_columns!(),
            " FROM products WHERE id = ANY($1)"
        ))
        .bind(uuids)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_product).collect()
    }

    async fn list_products(&self, query: &ProductQuery) -> Result<(Vec<Product>, u64)> {
        const FILTER: &str = r#"
            WHERE ($1::text IS NULL OR category = $1)
              AND (NOT $2 OR is_active)
              AND (NOT $3 OR stock <= low_stock_threshold)
              AND (NOT $4 OR is_featured)
        "#;
        let order_by = match query.sort {
            ProductSort::Newest => "created_at DESC, id",
            ProductSort::PriceAsc => "price_cents ASC, id",
            ProductSort::PriceDesc => "price_cents DESC, id",
            ProductSort::Name => "name ASC, id",
            ProductSort::StockAsc => "stock ASC, id",
        };

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM products {FILTER}"))
            .bind(&query.category)
            .bind(query.active_only)
            .bind(query.low_stock_only)
            .bind(query.featured_only)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM products {FILTER} ORDER BY {order_by} LIMIT $5 OFFSET $6",
            product_columns!()
        );
        let rows = sqlx::query(&sql)
            .bind(&query.category)
            .bind(query.active_only)
            .bind(query.low_stock_only)
            .bind(query.featured_only)
            .bind(query.limit.map(|l| l as i64))
            .bind(query.offset.unwrap_or(0) as i64)
            .fetch_all(&self.pool)
            .await?;

        let products = rows
            .into_iter()
            .map(Self::row_to_product)
            .collect::<Result<Vec<_>>>()?;
        Ok((products, total as u64))
    }

    async fn delete_product(&self, id: ProductId) -> Result<()> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("product", id));
        }
        Ok(())
    }

    async fn insert_category(&self, category: Category) -> Result<Category> {
        sqlx::query(concat!(
            "INSERT INTO categories (",
            category_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
        ))
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(&category.image)
        .bind(category.parent_id.map(|p| p.as_uuid()))
        .bind(category.is_active)
        .bind(category.sort_order)
        .bind(category.created_at)
        .bind(category.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "categories_slug_key", "category", &category.slug))?;
        Ok(category)
    }

    async fn update_category(&self, category: Category) -> Result<Category> {
        let mut tx = self.pool.begin().await?;

        let previous: Option<String> =
            sqlx::query_scalar("SELECT slug FROM categories WHERE id = $1 FOR UPDATE")
                .bind(category.id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let previous = previous.ok_or_else(|| StoreError::not_found("category", category.id))?;

        let row = sqlx::query(concat!(
            r#"
            UPDATE categories SET
                name = $2, slug = $3, description = $4, image = $5, parent_id = $6,
                is_active = $7, sort_order = $8, updated_at = $9
            WHERE id = $1
            RETURNING "#,
            category_columns!()
        ))
        .bind(category.id.as_uuid())
        .bind(&category.name)
        .bind(&category.slug)
        .bind(&category.description)
        .bind(&category.image)
        .bind(category.parent_id.map(|p| p.as_uuid()))
        .bind(category.is_active)
        .bind(category.sort_order)
        .bind(category.updated_at)
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "categories_slug_key", "category", &category.slug))?;

        if previous != category.slug {
            sqlx::query("UPDATE products SET category = $2, updated_at = $3 WHERE category = $1")
                .bind(&previous)
                .bind(&category.slug)
                .bind(category.updated_at)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Self::row_to_category(row)
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>> {
        sqlx::query(concat!("SELECT ", category_columns!(), " FROM categories WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_category)
            .transpose()
    }

    async fn find_category_by_slug(&self, slug: &str) -> Result<Option<Category>> {
        sqlx::query(concat!("SELECT ", category_columns!(), " FROM categories WHERE slug = $1"))
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_category)
            .transpose()
    }

    async fn list_categories(&self, active_only: bool) -> Result<Vec<Category>> {
        sqlx::query(concat!(
            "SELECT ",
            category_columns!(),
            " FROM categories WHERE (NOT $1 OR is_active) ORDER BY sort_order, name, id"
        ))
        .bind(active_only)
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(Self::row_to_category)
        .collect()
    }

    async fn delete_category(&self, id: CategoryId) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        let slug: Option<String> =
            sqlx::query_scalar("SELECT slug FROM categories WHERE id = $1 FOR UPDATE")
                .bind(id.as_uuid())
                .fetch_optional(&mut *tx)
                .await?;
        let slug = slug.ok_or_else(|| StoreError::not_found("category", id))?;

        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM products WHERE category = $1")
            .bind(&slug)
            .fetch_one(&mut *tx)
            .await?;
        if count > 0 {
            return Err(StoreError::InUse {
                entity: "category",
                key: slug,
                count: count as u64,
            });
        }

        sqlx::query("UPDATE categories SET parent_id = NULL WHERE parent_id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn insert_review(&self, review: Review) -> Result<Review> {
        let key = format!("{}/{}", review.product_id, review.user_id);
        sqlx::query(concat!(
            "INSERT INTO reviews (",
            review_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)"
        ))
        .bind(review.id.as_uuid())
        .bind(review.user_id.as_uuid())
        .bind(review.product_id.as_uuid())
        .bind(review.order_id.map(|o| o.as_uuid()))
        .bind(i16::from(review.rating))
        .bind(&review.title)
        .bind(&review.comment)
        .bind(Json(&review.images))
        .bind(review.is_verified_purchase)
        .bind(review.is_approved)
        .bind(i64::from(review.helpful_count))
        .bind(review.created_at)
        .bind(review.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "reviews_product_user_key", "review", &key))?;
        Ok(review)
    }

    async fn update_review(&self, review: Review) -> Result<Review> {
        sqlx::query(concat!(
            r#"
            UPDATE reviews SET
                rating = $2, title = $3, comment = $4, images = $5, is_approved = $6,
                updated_at = $7
            WHERE id = $1
            RETURNING "#,
            review_columns!()
        ))
        .bind(review.id.as_uuid())
        .bind(i16::from(review.rating))
        .bind(&review.title)
        .bind(&review.comment)
        .bind(Json(&review.images))
        .bind(review.is_approved)
        .bind(review.updated_at)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_review)
        .transpose()?
        .ok_or_else(|| StoreError::not_found("review", review.id))
    }

    async fn get_review(&self, id: ReviewId) -> Result<Option<Review>> {
        sqlx::query(concat!("SELECT ", review_columns!(), " FROM reviews WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_review)
            .transpose()
    }

    async fn list_reviews(&self, query: &ReviewQuery) -> Result<(Vec<Review>, u64)> {
        const FILTER: &str = r#"
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::boolean IS NULL OR is_approved = $2)
        "#;
        let product_id = query.product_id.map(|p| p.as_uuid());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM reviews {FILTER}"))
            .bind(product_id)
            .bind(query.approved)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM reviews {FILTER} ORDER BY created_at DESC, id LIMIT $3 OFFSET $4",
            review_columns!()
        );
        let reviews = sqlx::query(&sql)
            .bind(product_id)
            .bind(query.approved)
            .bind(query.limit.map(|l| l as i64))
            .bind(query.offset.unwrap_or(0) as i64)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Self::row_to_review)
            .collect::<Result<Vec<_>>>()?;
        Ok((reviews, total as u64))
    }

    async fn delete_review(&self, id: ReviewId) -> Result<()> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("review", id));
        }
        Ok(())
    }

    async fn increment_review_helpful(&self, id: ReviewId) -> Result<Review> {
        sqlx::query(concat!(
            "UPDATE reviews SET helpful_count = helpful_count + 1 WHERE id = $1 RETURNING ",
            review_columns!()
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_review)
        .transpose()?
        .ok_or_else(|| StoreError::not_found("review", id))
    }

    async fn rating_summaries(
        &self,
        product_ids: &[ProductId],
    ) -> Result<HashMap<ProductId, RatingSummary>> {
        let ids: Vec<Uuid> = product_ids.iter().map(|p| p.as_uuid()).collect();
        let rows = sqlx::query(
            r#"
            SELECT product_id, SUM(rating)::bigint AS rating_sum, COUNT(*) AS review_count
            FROM reviews
            WHERE is_approved AND product_id = ANY($1)
            GROUP BY product_id
            "#,
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| -> Result<(ProductId, RatingSummary)> {
                let sum: i64 = row.try_get("rating_sum")?;
                let count: i64 = row.try_get("review_count")?;
                let summary = RatingSummary::from_totals(
                    u64::try_from(sum)
                        .map_err(|_| StoreError::Corrupt(format!("rating sum: {sum}")))?,
                    to_u32(count, "review_count")?,
                );
                let id = ProductId::from_uuid(row.try_get::<Uuid, _>("product_id")?);
                Ok((id, summary))
            })
            .collect()
    }

    async fn find_delivered_purchase(
        &self,
        user_id: UserId,
        product_id: ProductId,
    ) -> Result<Option<OrderId>> {
        let id: Option<Uuid> = sqlx::query_scalar(
            r#"
            SELECT id FROM orders
            WHERE user_id = $1 AND status = 'delivered'
              AND items @> jsonb_build_array(jsonb_build_object('product_id', $2::text))
            ORDER BY created_at
            LIMIT 1
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(product_id.as_uuid().to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(id.map(OrderId::from_uuid))
    }

    async fn adjust_stock(
        &self,
        product_id: ProductId,
        change: StockChange,
    ) -> Result<InventoryLogEntry> {
        let mut tx = self.pool.begin().await?;
        let entry = Self::apply_change(&mut tx, product_id, &change, false)
            .await?
            .ok_or_else(|| StoreError::not_found("product", product_id))?;
        tx.commit().await?;
        Ok(entry)
    }

    async fn list_inventory_logs(
        &self,
        query: &InventoryLogQuery,
    ) -> Result<(Vec<InventoryLogEntry>, u64)> {
        const FILTER: &str = r#"
            WHERE ($1::uuid IS NULL OR product_id = $1)
              AND ($2::text IS NULL OR entry_type = $2)
        "#;
        let product_id = query.product_id.map(|p| p.as_uuid());
        let entry_type = query.entry_type.map(|t| t.as_str());

        let total: i64 =
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM inventory_logs {FILTER}"))
                .bind(product_id)
                .bind(entry_type)
                .fetch_one(&self.pool)
                .await?;

        let sql = format!(
            "SELECT {} FROM inventory_logs {FILTER} ORDER BY seq DESC LIMIT $3 OFFSET $4",
            log_columns!()
        );
        let rows = sqlx::query(&sql)
            .bind(product_id)
            .bind(entry_type)
            .bind(query.limit.map(|l| l as i64))
            .bind(query.offset.unwrap_or(0) as i64)
            .fetch_all(&self.pool)
            .await?;

        let entries = rows
            .into_iter()
            .map(Self::row_to_log)
            .collect::<Result<Vec<_>>>()?;
        Ok((entries, total as u64))
    }

    async fn stream_inventory_logs(&self, product_id: Option<ProductId>) -> Result<LedgerStream> {
        use futures_util::StreamExt;

        let stream = sqlx::query(concat!(
            "SELECT ",
            log_columns!(),
            " FROM inventory_logs WHERE ($1::uuid IS NULL OR product_id = $1) ORDER BY seq ASC"
        ))
        .bind(product_id.map(|p| p.as_uuid()))
        .fetch(&self.pool)
        .map(|result| match result {
            Ok(row) => Self::row_to_log(row),
            Err(e) => Err(StoreError::Database(e)),
        });

        Ok(Box::pin(stream))
    }

    async fn inventory_stats(&self) -> Result<InventoryStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total_products,
                COALESCE(SUM(stock), 0)::BIGINT AS total_stock,
                COUNT(*) FILTER (WHERE stock <= low_stock_threshold) AS low_stock_count,
                COUNT(*) FILTER (WHERE stock = 0) AS out_of_stock_count
            FROM products
            "#,
        )
        .fetch_one(&self.pool)
        .await?;

        let count = |column: &str| -> Result<u64> {
            let value: i64 = row.try_get(column)?;
            Ok(value.max(0) as u64)
        };
        Ok(InventoryStats {
            total_products: count("total_products")?,
            total_stock: count("total_stock")?,
            low_stock_count: count("low_stock_count")?,
            out_of_stock_count: count("out_of_stock_count")?,
        })
    }

    async fn get_cart(&self, owner: &CartOwner) -> Result<Option<Cart>> {
        let cart: Option<Json<Cart>> =
            sqlx::query_scalar("SELECT cart FROM carts WHERE owner_key = $1")
                .bind(owner.key())
                .fetch_optional(&self.pool)
                .await?;
        Ok(cart.map(|c| c.0))
    }

    async fn save_cart(&self, cart: &Cart) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO carts (owner_key, cart, updated_at)
            VALUES ($1, $2, $3)
            ON CONFLICT (owner_key) DO UPDATE SET
                cart = EXCLUDED.cart,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(cart.owner.key())
        .bind(Json(cart))
        .bind(cart.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_cart(&self, owner: &CartOwner) -> Result<()> {
        sqlx::query("DELETE FROM carts WHERE owner_key = $1")
            .bind(owner.key())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_wishlist(&self, user_id: UserId) -> Result<Option<Wishlist>> {
        let wishlist: Option<Json<Wishlist>> =
            sqlx::query_scalar("SELECT wishlist FROM wishlists WHERE user_id = $1")
                .bind(user_id.as_uuid())
                .fetch_optional(&self.pool)
                .await?;
        Ok(wishlist.map(|w| w.0))
    }

    async fn save_wishlist(&self, wishlist: &Wishlist) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO wishlists (user_id, wishlist)
            VALUES ($1, $2)
            ON CONFLICT (user_id) DO UPDATE SET wishlist = EXCLUDED.wishlist
            "#,
        )
        .bind(wishlist.user_id.as_uuid())
        .bind(Json(wishlist))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        sqlx::query(concat!(
            "INSERT INTO coupons (",
            coupon_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)"
        ))
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(&coupon.description)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.value)
        .bind(coupon.min_order_amount.cents())
        .bind(coupon.max_discount_amount.map(|m| m.cents()))
        .bind(coupon.usage_limit.map(i64::from))
        .bind(i64::from(coupon.used_count))
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.is_active)
        .bind(coupon.created_at)
        .bind(coupon.updated_at)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique(e, "coupons_code_key", "coupon", &coupon.code))?;
        Ok(coupon)
    }

    async fn update_coupon(&self, coupon: Coupon) -> Result<Coupon> {
        // used_count is owned by checkout and never written here.
        let row = sqlx::query(concat!(
            r#"
            UPDATE coupons SET
                code = $2, description = $3, discount_type = $4, value = $5,
                min_order_amount_cents = $6, max_discount_amount_cents = $7, usage_limit = $8,
                valid_from = $9, valid_until = $10, is_active = $11, updated_at = $12
            WHERE id = $1
            RETURNING "#,
            coupon_columns!()
        ))
        .bind(coupon.id.as_uuid())
        .bind(&coupon.code)
        .bind(&coupon.description)
        .bind(coupon.discount_type.as_str())
        .bind(coupon.value)
        .bind(coupon.min_order_amount.cents())
        .bind(coupon.max_discount_amount.map(|m| m.cents()))
        .bind(coupon.usage_limit.map(i64::from))
        .bind(coupon.valid_from)
        .bind(coupon.valid_until)
        .bind(coupon.is_active)
        .bind(coupon.updated_at)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_unique(e, "coupons_code_key", "coupon", &coupon.code))?
        .ok_or_else(|| StoreError::not_found("coupon", coupon.id))?;

        Self::row_to_coupon(row)
    }

    async fn get_coupon(&self, id: CouponId) -> Result<Option<Coupon>> {
        sqlx::query(concat!("SELECT ", coupon_columns!(), " FROM coupons WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_coupon)
            .transpose()
    }

    async fn find_coupon_by_code(&self, code: &str) -> Result<Option<Coupon>> {
        sqlx::query(concat!("SELECT ", coupon_columns!(), " FROM coupons WHERE code = $1"))
            .bind(normalize_code(code))
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_coupon)
            .transpose()
    }

    async fn list_coupons(&self) -> Result<Vec<Coupon>> {
        let rows = sqlx::query(concat!(
            "SELECT ",
            coupon_columns!(),
            " FROM coupons ORDER BY created_at DESC, code"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_coupon).collect()
    }

    async fn delete_coupon(&self, id: CouponId) -> Result<()> {
        let result = sqlx::query("DELETE FROM coupons WHERE id = $1")
            .bind(id.as_uuid())
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(StoreError::not_found("coupon", id));
        }
        Ok(())
    }

    async fn commit_checkout(&self, order: Order, cart_owner: &CartOwner) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        if let Some(code) = &order.coupon_code {
            let code = normalize_code(code);
            let redeemed = sqlx::query(
                r#"
                UPDATE coupons SET used_count = used_count + 1, updated_at = $2
                WHERE code = $1 AND (usage_limit IS NULL OR used_count < usage_limit)
                "#,
            )
            .bind(&code)
            .bind(order.created_at)
            .execute(&mut *tx)
            .await?;
            if redeemed.rows_affected() == 0 {
                return Err(StoreError::CouponUnavailable { code });
            }
        }

        sqlx::query(concat!(
            "INSERT INTO orders (",
            order_columns!(),
            ") VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, \
             $17, $18, $19, $20)"
        ))
        .bind(order.id.as_uuid())
        .bind(order.order_number.as_str())
        .bind(order.user_id.as_uuid())
        .bind(Json(&order.items))
        .bind(order.subtotal.cents())
        .bind(order.shipping_cost.cents())
        .bind(order.tax.cents())
        .bind(order.discount.cents())
        .bind(order.total.cents())
        .bind(&order.currency)
        .bind(order.status.as_str())
        .bind(order.payment_status.as_str())
        .bind(&order.payment_intent_id)
        .bind(Json(&order.shipping_address))
        .bind(Json(&order.billing_address))
        .bind(&order.tracking_number)
        .bind(&order.notes)
        .bind(&order.coupon_code)
        .bind(order.created_at)
        .bind(order.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            map_unique(
                e,
                "orders_order_number_key",
                "order",
                order.order_number.as_str(),
            )
        })?;

        sqlx::query("DELETE FROM carts WHERE owner_key = $1")
            .bind(cart_owner.key())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(order)
    }

    async fn get_order(&self, id: OrderId) -> Result<Option<Order>> {
        sqlx::query(concat!("SELECT ", order_columns!(), " FROM orders WHERE id = $1"))
            .bind(id.as_uuid())
            .fetch_optional(&self.pool)
            .await?
            .map(Self::row_to_order)
            .transpose()
    }

    async fn find_order_by_payment_intent(&self, intent_id: &str) -> Result<Option<Order>> {
        sqlx::query(concat!(
            "SELECT ",
            order_columns!(),
            " FROM orders WHERE id = \
             (SELECT order_id FROM order_payment_intents WHERE intent_id = $1)"
        ))
        .bind(intent_id)
        .fetch_optional(&self.pool)
        .await?
        .map(Self::row_to_order)
        .transpose()
    }

    async fn list_orders(&self, query: &OrderQuery) -> Result<(Vec<Order>, u64)> {
        const FILTER: &str = r#"
            WHERE ($1::uuid IS NULL OR user_id = $1)
              AND ($2::text IS NULL OR status = $2)
              AND ($3::timestamptz IS NULL OR created_at >= $3)
              AND ($4::timestamptz IS NULL OR created_at <= $4)
        "#;
        let user_id = query.user_id.map(|u| u.as_uuid());
        let status = query.status.map(|s| s.as_str());

        let total: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM orders {FILTER}"))
            .bind(user_id)
            .bind(status)
            .bind(query.from_timestamp)
            .bind(query.to_timestamp)
            .fetch_one(&self.pool)
            .await?;

        let sql = format!(
            "SELECT {} FROM orders {FILTER} ORDER BY created_at DESC, order_number DESC \
             LIMIT $5 OFFSET $6",
            order_columns!()
        );
        let rows = sqlx::query(&sql)
            .bind(user_id)
            .bind(status)
            .bind(query.from_timestamp)
            .bind(query.to_timestamp)
            .bind(query.limit.map(|l| l as i64))
            .bind(query.offset.unwrap_or(0) as i64)
            .fetch_all(&self.pool)
            .await?;

        let orders = rows
            .into_iter()
            .map(Self::row_to_order)
            .collect::<Result<Vec<_>>>()?;
        Ok((orders, total as u64))
    }

    async fn apply_transition(&self, transition: &Transition) -> Result<TransitionOutcome> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(concat!(
            r#"
            UPDATE orders SET
                status = $2,
                payment_status = COALESCE($3, payment_status),
                updated_at = $4
            WHERE id = $1 AND status = $5
            RETURNING "#,
            order_columns!()
        ))
        .bind(transition.order_id.as_uuid())
        .bind(transition.to.as_str())
        .bind(transition.payment_status.map(|s| s.as_str()))
        .bind(Utc::now())
        .bind(transition.from.as_str())
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            let actual: Option<String> =
                sqlx::query_scalar("SELECT status FROM orders WHERE id = $1")
                    .bind(transition.order_id.as_uuid())
                    .fetch_optional(&mut *tx)
                    .await?;
            return Err(match actual {
                Some(actual) => StoreError::StatusConflict {
                    order_id: transition.order_id,
                    expected: transition.from.to_string(),
                    actual,
                },
                None => StoreError::not_found("order", transition.order_id),
            });
        };
        let order = Self::row_to_order(row)?;

        let mut ledger_entries = Vec::new();
        for (product_id, change) in order.stock_changes(transition) {
            if let Some(entry) = Self::apply_change(&mut tx, product_id, &change, true).await? {
                ledger_entries.push(entry);
            }
        }

        tx.commit().await?;
        Ok(TransitionOutcome {
            order,
            ledger_entries,
        })
    }

    async fn attach_payment_intent(
        &self,
        order_id: OrderId,
        current: Option<&str>,
        intent_id: &str,
    ) -> Result<Order> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(concat!(
            r#"
            UPDATE orders SET payment_intent_id = $2, updated_at = $3
            WHERE id = $1 AND status = 'pending' AND payment_status <> 'paid'
              AND payment_intent_id IS NOT DISTINCT FROM $4
            RETURNING "#,
            order_columns!()
        ))
        .bind(order_id.as_uuid())
        .bind(intent_id)
        .bind(Utc::now())
        .bind(current)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(row) = row else {
            drop(tx);
            let order = self.fetch_order(order_id).await?;
            let (expected, actual) = if order.payment_intent_id.as_deref() != current {
                (
                    format!("intent {}", current.unwrap_or("none")),
                    format!(
                        "intent {}",
                        order.payment_intent_id.as_deref().unwrap_or("none")
                    ),
                )
            } else {
                (
                    "pending/unpaid".to_string(),
                    format!("{}/{}", order.status, order.payment_status),
                )
            };
            return Err(StoreError::StatusConflict {
                order_id,
                expected,
                actual,
            });
        };

        sqlx::query(
            "INSERT INTO order_payment_intents (intent_id, order_id, created_at) \
             VALUES ($1, $2, $3)",
        )
        .bind(intent_id)
        .bind(order_id.as_uuid())
        .bind(Utc::now())
        .execute(&mut *tx)
        .await
        .map_err(|e| map_unique(e, "order_payment_intents_pkey", "payment intent", intent_id))?;

        tx.commit().await?;
        Self::row_to_order(row)
    }

    async fn update_payment_status(
        &self,
        order_id: OrderId,
        expected: &[PaymentStatus],
        status: PaymentStatus,
    ) -> Result<Order> {
        let expected_names: Vec<&str> = expected.iter().map(|s| s.as_str()).collect();
        let row = sqlx::query(concat!(
            r#"
            UPDATE orders SET payment_status = $2, updated_at = $3
            WHERE id = $1 AND payment_status = ANY($4)
            RETURNING "#,
            order_columns!()
        ))
        .bind(order_id.as_uuid())
        .bind(status.as_str())
        .bind(Utc::now())
        .bind(&expected_names)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Self::row_to_order(row),
            None => {
                let order = self.fetch_order(order_id).await?;
                Err(StoreError::StatusConflict {
                    order_id,
                    expected: expected_names.join("|"),
                    actual: order.payment_status.to_string(),
                })
            }
        }
    }

    async fn set_tracking_number(
        &self,
        order_id: OrderId,
        tracking_number: &str,
    ) -> Result<Order> {
        let row = sqlx::query(concat!(
            "UPDATE orders SET tracking_number = $2, updated_at = $3 WHERE id = $1 RETURNING ",
            order_columns!()
        ))
        .bind(order_id.as_uuid())
        .bind(tracking_number)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| StoreError::not_found("order", order_id))?;

        Self::row_to_order(row)
    }
}
