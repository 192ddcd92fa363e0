//! Wastewater qPCR trend dashboard backend.
//!
//! Reads wide, date-indexed TSV exports, reshapes them into tidy
//! (date, fraction, value) tables, classifies trailing-window trends with the
//! Mann-Kendall test, and serves chart and badge view models as JSON.

pub mod chart;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod panel;
pub mod server;
pub mod trend;

pub use data::{normalize, MeasurementRecord, MeasurementSeries};
pub use panel::{build_panels, PanelPipeline, PanelSet};
pub use trend::{classify_trend, TrendClass, TrendResult};
