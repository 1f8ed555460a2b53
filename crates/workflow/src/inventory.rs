//! Inventory administration: manual adjustments, bulk updates, overview
//! and ledger listing.

use std::sync::Arc;

use common::{Page, PageRequest, ProductId, UserId};
use domain::{
    InventoryLogEntry, LedgerEntryType, Product, ReferenceType, StockAdjustment, StockChange,
};
use serde::{Deserialize, Serialize};
use store::{InventoryLogQuery, InventoryStats, ProductQuery, ProductSort, Store};

use crate::error::{Result, WorkflowError};

/// A manual stock adjustment as submitted by an admin.
#[derive(Debug, Clone, Deserialize)]
pub struct AdjustmentRequest {
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub entry_type: LedgerEntryType,
    pub quantity: u32,
    #[serde(default)]
    pub reason: Option<String>,
}

impl AdjustmentRequest {
    fn adjustment(&self) -> StockAdjustment {
        match self.entry_type {
            LedgerEntryType::In => StockAdjustment::In(self.quantity),
            LedgerEntryType::Out => StockAdjustment::Out(self.quantity),
            LedgerEntryType::Adjustment => StockAdjustment::Adjustment(self.quantity),
        }
    }
}

/// Result of a manual adjustment.
#[derive(Debug, Clone, Serialize)]
pub struct AdjustmentOutcome {
    pub product: Product,
    pub entry: InventoryLogEntry,
}

/// One line of a bulk update: the absolute stock to set.
#[derive(Debug, Clone, Deserialize)]
pub struct StockLevel {
    pub product_id: ProductId,
    pub stock: u32,
}

/// Per-product outcome of a bulk update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkUpdateResult {
    pub product_id: ProductId,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_stock: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Stock overview for the admin dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct InventoryOverview {
    pub products: Page<Product>,
    pub stats: InventoryStats,
}

/// Inventory operations.
#[derive(Clone)]
pub struct InventoryService {
    store: Arc<dyn Store>,
}

impl InventoryService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Applies one adjustment with its ledger entry.
    #[tracing::instrument(skip(self, request), fields(product_id = %request.product_id))]
    pub async fn adjust(
        &self,
        request: AdjustmentRequest,
        performed_by: UserId,
    ) -> Result<AdjustmentOutcome> {
        let adjustment = request.adjustment();
        if matches!(adjustment, StockAdjustment::In(0) | StockAdjustment::Out(0)) {
            return Err(WorkflowError::invalid("quantity", "must be greater than 0"));
        }

        let change = StockChange::new(
            adjustment,
            request
                .reason
                .unwrap_or_else(|| "Manual adjustment".to_string()),
        )
        .reference(ReferenceType::Manual, performed_by.to_string())
        .performed_by(Some(performed_by));

        let entry = self.store.adjust_stock(request.product_id, change).await?;
        let product = self
            .store
            .get_product(request.product_id)
            .await?
            .ok_or_else(|| WorkflowError::not_found("product", request.product_id))?;

        metrics::counter!("stock_adjustments_total", "type" => entry.entry_type.as_str())
            .increment(1);
        tracing::info!(
            entry_type = %entry.entry_type,
            previous = entry.previous_stock,
            new = entry.new_stock,
            "stock adjusted"
        );
        Ok(AdjustmentOutcome { product, entry })
    }

    /// Sets absolute stock levels. A failing line is reported and the rest
    /// of the batch still runs.
    #[tracing::instrument(skip(self, levels), fields(count = levels.len()))]
    pub async fn bulk_update(
        &self,
        levels: Vec<StockLevel>,
        performed_by: UserId,
    ) -> Result<Vec<BulkUpdateResult>> {
        if levels.is_empty() {
            return Err(WorkflowError::invalid("updates", "must not be empty"));
        }

        let mut results = Vec::with_capacity(levels.len());
        for level in levels {
            let change = StockChange::new(StockAdjustment::Adjustment(level.stock), "Bulk update")
                .reference(ReferenceType::Manual, performed_by.to_string())
                .performed_by(Some(performed_by));

            let result = match self.store.adjust_stock(level.product_id, change).await {
                Ok(entry) => BulkUpdateResult {
                    product_id: level.product_id,
                    success: true,
                    previous_stock: Some(entry.previous_stock),
                    new_stock: Some(entry.new_stock),
                    message: None,
                },
                Err(e) => {
                    let e = WorkflowError::from(e);
                    let message = match e {
                        WorkflowError::NotFound { .. } => "Product not found".to_string(),
                        other => {
                            tracing::warn!(
                                product_id = %level.product_id,
                                error = %other,
                                "bulk update line failed"
                            );
                            other.to_string()
                        }
                    };
                    BulkUpdateResult {
                        product_id: level.product_id,
                        success: false,
                        previous_stock: None,
                        new_stock: None,
                        message: Some(message),
                    }
                }
            };
            results.push(result);
        }

        let updated = results.iter().filter(|r| r.success).count();
        metrics::counter!("stock_adjustments_total", "type" => "bulk").increment(updated as u64);
        tracing::info!(updated, failed = results.len() - updated, "bulk stock update");
        Ok(results)
    }

    /// Products sorted by stock, lowest first, with catalog-wide stats.
    pub async fn overview(
        &self,
        low_stock_only: bool,
        page: PageRequest,
    ) -> Result<InventoryOverview> {
        let query = ProductQuery::new()
            .low_stock_only(low_stock_only)
            .sort(ProductSort::StockAsc)
            .page(page);
        let (items, total) = self.store.list_products(&query).await?;
        let stats = self.store.inventory_stats().await?;
        Ok(InventoryOverview {
            products: Page::new(items, page, total),
            stats,
        })
    }

    /// Ledger entries, newest first.
    pub async fn logs(
        &self,
        product_id: Option<ProductId>,
        entry_type: Option<LedgerEntryType>,
        page: PageRequest,
    ) -> Result<Page<InventoryLogEntry>> {
        let query = InventoryLogQuery {
            product_id,
            entry_type,
            ..Default::default()
        }
        .page(page);
        let (items, total) = self.store.list_inventory_logs(&query).await?;
        Ok(Page::new(items, page, total))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use common::Money;
    use domain::ProductDraft;
    use store::InMemoryStore;

    async fn setup() -> (InventoryService, InMemoryStore) {
        let store = InMemoryStore::new();
        (InventoryService::new(Arc::new(store.clone())), store)
    }

    async fn product(store: &InMemoryStore, sku: &str, stock: u32) -> Product {
        let product = ProductDraft {
            name: sku.into(),
            sku: sku.into(),
            description: String::new(),
            category: String::new(),
            tags: vec![],
            price: Money::from_cents(1000),
            compare_at_price: None,
            stock: 0,
            low_stock_threshold: Some(3),
            is_active: None,
            is_featured: false,
        }
        .into_product(Utc::now());
        store
            .insert_product(
                product,
                (stock > 0).then(|| StockChange::new(StockAdjustment::In(stock), "opening")),
            )
            .await
            .unwrap()
    }

    fn request(
        product_id: ProductId,
        entry_type: LedgerEntryType,
        quantity: u32,
    ) -> AdjustmentRequest {
        AdjustmentRequest {
            product_id,
            entry_type,
            quantity,
            reason: Some("cycle count".into()),
        }
    }

    #[tokio::test]
    async fn adjustment_kinds_update_stock_and_ledger() {
        let (inventory, store) = setup().await;
        let admin = UserId::new();
        let p = product(&store, "A-1", 10).await;

        let out = inventory
            .adjust(request(p.id, LedgerEntryType::Out, 4), admin)
            .await
            .unwrap();
        assert_eq!(out.product.stock, 6);
        assert_eq!(out.entry.quantity_delta, -4);
        assert_eq!(out.entry.reference_type, ReferenceType::Manual);
        assert_eq!(out.entry.reference_id, Some(admin.to_string()));
        assert_eq!(out.entry.performed_by, Some(admin));

        let set = inventory
            .adjust(request(p.id, LedgerEntryType::Adjustment, 2), admin)
            .await
            .unwrap();
        assert_eq!(set.entry.previous_stock, 6);
        assert_eq!(set.entry.new_stock, 2);
        assert_eq!(set.entry.quantity_delta, -4);
    }

    #[tokio::test]
    async fn out_below_zero_is_insufficient_stock() {
        let (inventory, store) = setup().await;
        let p = product(&store, "A-1", 2).await;
        let err = inventory
            .adjust(request(p.id, LedgerEntryType::Out, 3), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InsufficientStock {
                requested: 3,
                available: 2,
                ..
            }
        ));
        assert_eq!(store.get_product(p.id).await.unwrap().unwrap().stock, 2);
    }

    #[tokio::test]
    async fn zero_quantity_is_rejected() {
        let (inventory, store) = setup().await;
        let p = product(&store, "A-1", 2).await;
        let err = inventory
            .adjust(request(p.id, LedgerEntryType::In, 0), UserId::new())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ValidationFailed(_)));
    }

    #[tokio::test]
    async fn bulk_update_reports_missing_products() {
        let (inventory, store) = setup().await;
        let p = product(&store, "A-1", 5).await;
        let missing = ProductId::new();

        let results = inventory
            .bulk_update(
                vec![
                    StockLevel {
                        product_id: p.id,
                        stock: 12,
                    },
                    StockLevel {
                        product_id: missing,
                        stock: 1,
                    },
                ],
                UserId::new(),
            )
            .await
            .unwrap();

        assert!(results[0].success);
        assert_eq!(results[0].previous_stock, Some(5));
        assert_eq!(results[0].new_stock, Some(12));
        assert!(!results[1].success);
        assert_eq!(results[1].message.as_deref(), Some("Product not found"));

        let logs = inventory
            .logs(Some(p.id), Some(LedgerEntryType::Adjustment), PageRequest::default())
            .await
            .unwrap();
        assert_eq!(logs.total, 1);
        assert_eq!(logs.items[0].reason, "Bulk update");
    }

    #[tokio::test]
    async fn overview_sorts_by_stock_and_filters_low() {
        let (inventory, store) = setup().await;
        product(&store, "A-1", 10).await;
        product(&store, "B-2", 0).await;
        product(&store, "C-3", 2).await;

        let overview = inventory
            .overview(false, PageRequest::default())
            .await
            .unwrap();
        let stocks: Vec<_> = overview.products.items.iter().map(|p| p.stock).collect();
        assert_eq!(stocks, vec![0, 2, 10]);
        assert_eq!(overview.stats.total_products, 3);
        assert_eq!(overview.stats.total_stock, 12);
        assert_eq!(overview.stats.low_stock_count, 2);
        assert_eq!(overview.stats.out_of_stock_count, 1);

        let low = inventory.overview(true, PageRequest::default()).await.unwrap();
        assert_eq!(low.products.total, 2);
    }
}
