//! SQL composition for QueryDeck.
//!
//! Catalog templates are parsed into an explicit IR (`template`), caller
//! input is compiled into bound predicates (`clause`), and the two are
//! combined by `render`. Bundled queries are built and decoded by
//! `composite`.
pub mod clause;
pub mod composite;
pub mod error;
pub mod render;
pub mod sanitize;
pub mod template;

pub use clause::{compile, ClauseRequest, CompiledClauses, FilterValue, Paging, SortDirection};
pub use composite::{build_composite, decode_composite, validate_member_name};
pub use error::TemplateError;
pub use render::{render, SlotValues, TailOverrides};
pub use template::{Segment, Slot, TableRef, Template};
