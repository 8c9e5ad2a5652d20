//! QueryDeck runtime: the query catalog, caches, and the execution
//! orchestrator.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐    ┌──────────────┐
//! │ QueryCatalog │───▶│ QueryEngine  │◀── ResultCache (fingerprint → JSON)
//! └──────────────┘    └──────┬───────┘
//!                            │
//!              ┌─────────────┴──────────────┐
//!              │ SchemaResolver (moka)      │
//!              │ QueryExecutor / Metadata   │ (BigQuery REST)
//!              └────────────────────────────┘
//! ```

pub mod cache;
pub mod catalog;
pub mod engine;
pub mod fingerprint;
pub mod request;
pub mod schema;

pub use cache::{Clock, ManualClock, ResultCache, SystemClock};
pub use catalog::{CompositeQuery, FixedQuery, QueryCatalog, QueryDefinition, QueryKind, QuerySummary};
pub use engine::{
    CompiledQuery, ExecutionOutcome, QueryEngine, QueryEngineOptions, TableDescription,
    SCOPE_CLAUSE,
};
pub use request::{EffectiveRequest, RawParams};
pub use schema::{SchemaCacheStats, SchemaResolver};
