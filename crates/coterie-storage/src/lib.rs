//! Storage abstraction for coterie.
//!
//! Backend crates (e.g., coterie-store-sqlite) implement the [`Store`] trait
//! so `coterie-core` doesn't depend on any specific database engine or schema
//! details.

use thiserror::Error;

mod store;
mod types;

pub use store::Store;
#[cfg(feature = "test-support")]
pub use store::MockStore;
pub use types::*;

/// Uniform error type for all storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("already exists")]
    AlreadyExists,
    #[error("conflict")]
    Conflict,
    #[error("backend error: {0}")]
    Backend(String),
}
