//! Inventory ledger entries and stock adjustment arithmetic.

use chrono::{DateTime, Utc};
use common::{LogEntryId, ProductId, UserId};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Direction of a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LedgerEntryType {
    In,
    Out,
    Adjustment,
}

impl LedgerEntryType {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryType::In => "in",
            LedgerEntryType::Out => "out",
            LedgerEntryType::Adjustment => "adjustment",
        }
    }
}

impl std::fmt::Display for LedgerEntryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LedgerEntryType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "in" => Ok(LedgerEntryType::In),
            "out" => Ok(LedgerEntryType::Out),
            "adjustment" => Ok(LedgerEntryType::Adjustment),
            other => Err(InventoryError::UnknownEntryType(other.to_string())),
        }
    }
}

/// What caused a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceType {
    Order,
    Restock,
    Return,
    #[default]
    Manual,
    System,
}

impl ReferenceType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReferenceType::Order => "order",
            ReferenceType::Restock => "restock",
            ReferenceType::Return => "return",
            ReferenceType::Manual => "manual",
            ReferenceType::System => "system",
        }
    }
}

impl std::fmt::Display for ReferenceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ReferenceType {
    type Err = InventoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order" => Ok(ReferenceType::Order),
            "restock" => Ok(ReferenceType::Restock),
            "return" => Ok(ReferenceType::Return),
            "manual" => Ok(ReferenceType::Manual),
            "system" => Ok(ReferenceType::System),
            other => Err(InventoryError::UnknownReferenceType(other.to_string())),
        }
    }
}

/// Errors from stock arithmetic.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum InventoryError {
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: ProductId,
        requested: u32,
        available: u32,
    },

    #[error("Adjustment quantity must be greater than 0")]
    ZeroQuantity,

    #[error("Unknown ledger entry type: {0}")]
    UnknownEntryType(String),

    #[error("Unknown reference type: {0}")]
    UnknownReferenceType(String),
}

/// A requested change to a product's on-hand stock.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "quantity", rename_all = "lowercase")]
pub enum StockAdjustment {
    /// Add units.
    In(u32),
    /// Remove units; never below zero.
    Out(u32),
    /// Set an absolute stock level.
    Adjustment(u32),
}

impl StockAdjustment {
    pub fn entry_type(&self) -> LedgerEntryType {
        match self {
            StockAdjustment::In(_) => LedgerEntryType::In,
            StockAdjustment::Out(_) => LedgerEntryType::Out,
            StockAdjustment::Adjustment(_) => LedgerEntryType::Adjustment,
        }
    }

    /// Computes the new stock level from `previous`.
    pub fn apply(&self, product_id: ProductId, previous: u32) -> Result<u32, InventoryError> {
        match *self {
            StockAdjustment::In(0) | StockAdjustment::Out(0) => Err(InventoryError::ZeroQuantity),
            StockAdjustment::In(quantity) => Ok(previous.saturating_add(quantity)),
            StockAdjustment::Out(quantity) => {
                previous
                    .checked_sub(quantity)
                    .ok_or(InventoryError::InsufficientStock {
                        product_id,
                        requested: quantity,
                        available: previous,
                    })
            }
            StockAdjustment::Adjustment(level) => Ok(level),
        }
    }

    /// Signed delta for the `In`/`Out` kinds. `None` for an absolute set,
    /// whose delta depends on the stock it is applied to.
    pub fn relative_delta(&self) -> Option<i64> {
        match *self {
            StockAdjustment::In(q) => Some(i64::from(q)),
            StockAdjustment::Out(q) => Some(-i64::from(q)),
            StockAdjustment::Adjustment(_) => None,
        }
    }
}

/// Metadata attached to every stock change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockChange {
    pub adjustment: StockAdjustment,
    pub reason: String,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    pub performed_by: Option<UserId>,
}

impl StockChange {
    pub fn new(adjustment: StockAdjustment, reason: impl Into<String>) -> Self {
        Self {
            adjustment,
            reason: reason.into(),
            reference_type: ReferenceType::Manual,
            reference_id: None,
            performed_by: None,
        }
    }

    pub fn reference(mut self, reference_type: ReferenceType, id: impl Into<String>) -> Self {
        self.reference_type = reference_type;
        self.reference_id = Some(id.into());
        self
    }

    pub fn reference_type(mut self, reference_type: ReferenceType) -> Self {
        self.reference_type = reference_type;
        self
    }

    pub fn performed_by(mut self, user: Option<UserId>) -> Self {
        self.performed_by = user;
        self
    }
}

/// Append-only audit record of a single stock change.
///
/// `new_stock == previous_stock + quantity_delta` always holds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryLogEntry {
    pub id: LogEntryId,
    pub product_id: ProductId,
    #[serde(rename = "type")]
    pub entry_type: LedgerEntryType,
    pub quantity_delta: i64,
    pub previous_stock: u32,
    pub new_stock: u32,
    pub reason: String,
    pub reference_type: ReferenceType,
    pub reference_id: Option<String>,
    pub performed_by: Option<UserId>,
    pub created_at: DateTime<Utc>,
}

impl InventoryLogEntry {
    /// Records a change from `previous` to `new` stock.
    pub fn record(
        product_id: ProductId,
        entry_type: LedgerEntryType,
        previous: u32,
        new: u32,
        change: &StockChange,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: LogEntryId::new(),
            product_id,
            entry_type,
            quantity_delta: i64::from(new) - i64::from(previous),
            previous_stock: previous,
            new_stock: new,
            reason: change.reason.clone(),
            reference_type: change.reference_type,
            reference_id: change.reference_id.clone(),
            performed_by: change.performed_by,
            created_at: now,
        }
    }

    /// Applies the adjustment in `change` to `previous` and records it.
    pub fn from_change(
        product_id: ProductId,
        previous: u32,
        change: &StockChange,
        now: DateTime<Utc>,
    ) -> Result<Self, InventoryError> {
        let new = change.adjustment.apply(product_id, previous)?;
        Ok(Self::record(
            product_id,
            change.adjustment.entry_type(),
            previous,
            new,
            change,
            now,
        ))
    }
}

/// Replays ledger entries from an initial stock level.
///
/// Entries must be in creation order. Returns `None` if the running stock
/// would go negative, which means the ledger is inconsistent.
pub fn replay_ledger<'a>(
    initial: u32,
    entries: impl IntoIterator<Item = &'a InventoryLogEntry>,
) -> Option<u32> {
    entries.into_iter().try_fold(initial, |stock, entry| {
        let next = i64::from(stock) + entry.quantity_delta;
        u32::try_from(next).ok()
    })
}
