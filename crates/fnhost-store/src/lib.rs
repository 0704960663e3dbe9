//! fnhost Store
//!
//! This crate owns the on-disk layout of a fnhost data directory and the
//! loading/saving of function specifications. A data directory looks like:
//!
//! ```text
//! {data_dir}/
//! ├── functions/
//! │   └── hello/
//! │       ├── fn.json      (the FunctionSpec)
//! │       └── handler.lua  (or whatever the spec points at)
//! └── logs/
//!     └── hello.log        (one JSON audit record per line)
//! ```
//!
//! Specs are read fresh from disk on every load so configuration edits take
//! effect on the next request without a restart.

mod spec;
mod store;

pub use spec::{Command, FunctionSpec, Language};
pub use store::FunctionStore;

/// Error type for storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
  /// No configuration exists for the requested function.
  #[error("no function named '{0}'")]
  NotFound(String),

  /// The configuration exists but is missing or mismatching required fields.
  #[error("invalid spec for '{name}': {message}")]
  InvalidSpec { name: String, message: String },

  /// A filesystem error occurred.
  #[error("storage io error: {0}")]
  Io(#[from] std::io::Error),

  /// The configuration file is not valid JSON.
  #[error("invalid spec json: {0}")]
  Json(#[from] serde_json::Error),
}
