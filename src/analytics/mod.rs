//! Analytics module - dataset loading and markdown reports.
//!
//! Provides:
//! - `Dataset`: Typed cells under named columns, from CSV or JSON records
//! - `comprehensive_analysis`: Overview, column stats, correlations, data quality
//! - `insights`: Quality alert, strong correlations, outliers, recommendations

mod dataset;
mod report;
pub mod stats;

pub use dataset::*;
pub use report::*;
