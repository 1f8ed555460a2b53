//! Admin reporting for the storefront.
//!
//! - [`DashboardService`]: sales figures for a [`Period`]
//! - [`ReportService`]: sales series, product rankings and customer figures
//!   over a [`DateRange`]
//! - [`StockAudit`]: replays the inventory ledger and reports products whose
//!   stock disagrees with it

pub mod audit;
pub mod dashboard;
pub mod error;
pub mod period;
pub mod reports;

pub use audit::{AuditReport, DiscrepancyKind, StockAudit, StockDiscrepancy};
pub use dashboard::{
    DashboardService, ProductSales, SalesAccumulator, SalesDashboard, SalesMetrics, TOP_PRODUCTS,
};
pub use error::{AnalyticsError, Result};
pub use period::Period;
pub use reports::{
    CustomerReport, DEFAULT_RANKING_LIMIT, DateRange, Grouping, MAX_RANKING_LIMIT,
    ProductPerformance, Ranking, ReportService, SalesBucket, SalesReport,
};
