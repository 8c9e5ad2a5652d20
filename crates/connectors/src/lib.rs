pub mod sources;

pub use sources::bigquery::{BigQueryError, BigQueryWarehouse};
pub use sources::{MetadataSource, QueryExecutor};
