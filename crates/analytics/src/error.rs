//! Analytics error types.

use thiserror::Error;

/// Errors that can occur while computing analytics.
#[derive(Debug, Error)]
pub enum AnalyticsError {
    /// The requested reporting period is not one of the known ones.
    #[error("Invalid period: {0} (expected today, week, month, year or all)")]
    InvalidPeriod(String),

    /// Sales can only be grouped by day, week or month.
    #[error("Invalid grouping: {0} (expected day, week or month)")]
    InvalidGrouping(String),

    /// Products can only be ranked by revenue or units sold.
    #[error("Invalid sort: {0} (expected revenue or sales)")]
    InvalidRanking(String),

    /// The start of a date range falls after its end.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidRange {
        start: chrono::DateTime<chrono::Utc>,
        end: chrono::DateTime<chrono::Utc>,
    },

    /// An error occurred in the store.
    #[error("Store error: {0}")]
    Store(#[from] store::StoreError),
}

/// Result type for analytics operations.
pub type Result<T> = std::result::Result<T, AnalyticsError>;
