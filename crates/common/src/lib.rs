//! Common building blocks shared across QueryDeck crates.
//!
//! - **Configuration**: strongly typed application configuration (`config`).
//! - **Models**: schema fields, bound parameters, result rows, API envelopes (`models`).
//! - **Resilience**: exponential backoff for warehouse calls (`retry`).
//! - **Logging**: PII masking for logged parameters (`scrubber`).
//! - **Telemetry**: optional OTLP export (`telemetry`).
pub mod config;
pub mod models;
pub mod retry;
pub mod scrubber;
pub mod telemetry;
