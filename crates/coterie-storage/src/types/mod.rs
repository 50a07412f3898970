//! Type definitions for coterie storage.

mod group_types;
mod groups;
mod ids;
mod relationship_types;
mod relationships;
mod roles;

// Re-export all types from submodules
pub use group_types::*;
pub use groups::*;
pub use ids::*;
pub use relationship_types::*;
pub use relationships::*;
pub use roles::*;
