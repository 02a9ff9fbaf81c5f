//! # FourEyes Typed Value Store
//!
//! User-defined fields (UDFs) attached to arbitrary entities.
//!
//! ```text
//! raw JSON ──► FieldValue::parse ──► constraint checks ──► uniqueness ──► atomic batch
//!                 (per FieldType)      (length, range,       (store         (values +
//!                                       options)              query)         history)
//! ```
//!
//! A `set_values` call is all-or-nothing: every field is validated before
//! any is written, and the batch is applied by a single store call.

mod config;
mod definition;
mod engine;
mod history;
mod sqlite;
mod store;
mod validation;
mod value;

pub use config::UdfConfig;
pub use definition::{FieldDefinition, FieldType, NumericBounds};
pub use engine::UdfEngine;
pub use history::ValueHistoryRecord;
pub use sqlite::SqliteUdfStore;
pub use store::{MemoryUdfStore, StoreError, UdfStore};
pub use validation::{check_constraints, check_definition};
pub use value::FieldValue;
