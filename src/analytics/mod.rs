//! Schema usage analytics.
//!
//! # Data Flow
//! ```text
//! finished operation
//!     → schema_usage.rs (SchemaUsageInfo record)
//!     → exporter.rs (bounded queue → batched delivery to the collector)
//! ```

pub mod exporter;
pub mod schema_usage;

pub use exporter::{ExportWorker, ExporterSettings, UsageExporter, UsageSink};
pub use schema_usage::SchemaUsageInfo;
