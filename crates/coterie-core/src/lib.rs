//! Group membership and relation authorization core.
//!
//! Groups are instances of administrator-defined group types; relation types
//! describe how external entities attach to groups. This crate provides the
//! static relation registry, per-group-type relation configuration, the
//! derived content-type catalog, the cached relationship store, two-axis
//! cardinality validation and group access decisions. Persistence is behind
//! the `coterie-storage` Store trait; change notifications go through the
//! `coterie-events` bus.

pub mod access;
pub mod cardinality;
pub mod catalog;
pub mod entity;
pub mod group_types;
pub mod registry;
pub mod relation;
pub mod relationships;

pub use access::{
    AccessDecision, AccessDecorator, AccessError, AccessVerdict, Actor, CacheDependencies,
    GroupAccessEngine,
};
pub use cardinality::{
    CardinalityAxis, CardinalityError, CardinalityValidator, CardinalityViolation,
};
pub use catalog::{CatalogError, ContentTypeCatalog};
pub use entity::{EntityIdentity, EntityRef, EntityResolver, GroupRef, ResolveError};
pub use group_types::{GroupTypeError, GroupTypeManager};
pub use registry::{RegistryError, RelationTypeDef, RelationTypeRegistry};
pub use relation::{derive_content_type_id, RelationTypeInstance, CONTENT_TYPE_ID_MAX_LEN};
pub use relationships::{RelationshipError, RelationshipStore};
