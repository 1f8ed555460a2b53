//! Stock ledger audit.
//!
//! Replays the inventory ledger oldest first and checks that every product's
//! current stock equals the sum of its ledger deltas, and that each entry
//! starts where the previous one ended.

use std::collections::HashMap;
use std::sync::Arc;

use common::{LogEntryId, ProductId};
use futures_util::StreamExt;
use serde::Serialize;
use store::Store;

use crate::Result;

/// Why a product failed the audit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DiscrepancyKind {
    /// An entry's `previous_stock` differs from the running total.
    BrokenChain {
        entry_id: LogEntryId,
        expected_previous: u32,
        recorded_previous: u32,
    },
    /// The deltas would take stock below zero.
    NegativeStock { entry_id: LogEntryId },
    /// Replayed stock differs from the product's stock.
    StockMismatch { ledger_stock: u32, product_stock: u32 },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockDiscrepancy {
    pub product_id: ProductId,
    pub kind: DiscrepancyKind,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AuditReport {
    pub entries_replayed: u64,
    pub products_checked: u64,
    /// Products with ledger entries that no longer exist.
    pub orphaned_products: u64,
    pub discrepancies: Vec<StockDiscrepancy>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

#[derive(Debug, Default)]
struct Replay {
    stock: u32,
    broken: Option<DiscrepancyKind>,
}

impl Replay {
    fn apply(&mut self, entry: &domain::InventoryLogEntry) {
        if self.broken.is_some() {
            return;
        }
        if entry.previous_stock != self.stock {
            self.broken = Some(DiscrepancyKind::BrokenChain {
                entry_id: entry.id,
                expected_previous: self.stock,
                recorded_previous: entry.previous_stock,
            });
            return;
        }
        match domain::replay_ledger(self.stock, [entry]) {
            Some(stock) => self.stock = stock,
            None => self.broken = Some(DiscrepancyKind::NegativeStock { entry_id: entry.id }),
        }
    }
}

/// Checks the ledger against current product stock.
#[derive(Clone)]
pub struct StockAudit {
    store: Arc<dyn Store>,
}

impl StockAudit {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// Audits every product, or one when `product_id` is given.
    ///
    /// Products with no ledger entries must have zero stock.
    #[tracing::instrument(skip(self))]
    pub async fn run(&self, product_id: Option<ProductId>) -> Result<AuditReport> {
        let mut stream = self.store.stream_inventory_logs(product_id).await?;
        let mut replays: HashMap<ProductId, Replay> = HashMap::new();
        let mut report = AuditReport::default();

        while let Some(entry) = stream.next().await {
            let entry = entry?;
            report.entries_replayed += 1;
            replays.entry(entry.product_id).or_default().apply(&entry);
        }

        let products = match product_id {
            Some(id) => self.store.get_product(id).await?.into_iter().collect(),
            None => self.store.list_products(&store::ProductQuery::new()).await?.0,
        };

        for product in &products {
            report.products_checked += 1;
            let replay = replays.remove(&product.id).unwrap_or_default();
            let kind = match replay.broken {
                Some(kind) => Some(kind),
                None if replay.stock != product.stock => Some(DiscrepancyKind::StockMismatch {
                    ledger_stock: replay.stock,
                    product_stock: product.stock,
                }),
                None => None,
            };
            if let Some(kind) = kind {
                tracing::warn!(product_id = %product.id, ?kind, "stock ledger discrepancy");
                report.discrepancies.push(StockDiscrepancy {
                    product_id: product.id,
                    kind,
                });
            }
        }

        // What is left belongs to deleted products.
        report.orphaned_products = replays.len() as u64;

        metrics::counter!("stock_audits_total").increment(1);
        metrics::gauge!("stock_audit_discrepancies").set(report.discrepancies.len() as f64);
        tracing::info!(
            entries = report.entries_replayed,
            products = report.products_checked,
            discrepancies = report.discrepancies.len(),
            "stock audit complete"
        );

        Ok(report)
    }
}
