pub mod chart;
pub mod collector;
pub mod extractor;
pub mod schema;
pub mod types;

pub use chart::ChartPoint;
pub use extractor::{extract, Extraction};
pub use schema::{MetricDefinition, MetricKind, MetricSchema, SchemaCatalog, SchemaVersion};
pub use types::{ExtractedRow, Qualifiers, Report, RoundReports, Stat};
