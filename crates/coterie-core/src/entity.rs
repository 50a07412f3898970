//! References to the host system's entities.
//!
//! Target entities live outside this crate; relationships hold non-owning
//! references (IDs) and callers hand in lightweight [`EntityRef`] values.
//! Re-resolving a relationship's target goes through the [`EntityResolver`]
//! collaborator on each read.

use async_trait::async_trait;
use thiserror::Error;
use coterie_storage::{EntityId, Group, GroupId, GroupTypeId};

/// How a target entity identifies itself.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EntityIdentity {
    /// The entity has not been persisted yet and cannot be attached anywhere.
    Unsaved,
    /// A content entity with a storable integer identity.
    Content(EntityId),
    /// A configuration entity, identified by its config key. It receives an
    /// integer surrogate identity through the wrapper collaborator when a
    /// relationship needs one.
    Config(String),
}

/// Reference to an external target entity, as handed in by the host system.
#[derive(Clone, Debug)]
pub struct EntityRef {
    pub entity_type_id: String,
    pub bundle: String,
    pub label: String,
    pub identity: EntityIdentity,
}

impl EntityRef {
    pub fn content(entity_type_id: &str, bundle: &str, label: &str, id: EntityId) -> Self {
        Self {
            entity_type_id: entity_type_id.to_string(),
            bundle: bundle.to_string(),
            label: label.to_string(),
            identity: EntityIdentity::Content(id),
        }
    }

    pub fn unsaved(entity_type_id: &str, bundle: &str, label: &str) -> Self {
        Self {
            entity_type_id: entity_type_id.to_string(),
            bundle: bundle.to_string(),
            label: label.to_string(),
            identity: EntityIdentity::Unsaved,
        }
    }

    pub fn config(entity_type_id: &str, config_key: &str, label: &str) -> Self {
        Self {
            entity_type_id: entity_type_id.to_string(),
            bundle: entity_type_id.to_string(),
            label: label.to_string(),
            identity: EntityIdentity::Config(config_key.to_string()),
        }
    }

    /// Whether the entity lacks a persisted identity.
    pub fn is_new(&self) -> bool {
        matches!(self.identity, EntityIdentity::Unsaved)
    }
}

/// A group as seen by callers: persisted groups have an ID, new ones don't.
#[derive(Clone, Debug)]
pub struct GroupRef {
    pub id: Option<GroupId>,
    pub group_type_id: GroupTypeId,
    pub label: String,
}

impl GroupRef {
    /// A group that has not been saved yet.
    pub fn unsaved(group_type_id: GroupTypeId, label: &str) -> Self {
        Self {
            id: None,
            group_type_id,
            label: label.to_string(),
        }
    }
}

impl From<&Group> for GroupRef {
    fn from(group: &Group) -> Self {
        Self {
            id: Some(group.id),
            group_type_id: group.group_type_id.clone(),
            label: group.label.clone(),
        }
    }
}

/// Error type for entity resolution
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("entity not found: {entity_type_id} {entity_id}")]
    NotFound {
        entity_type_id: String,
        entity_id: EntityId,
    },
    #[error("resolver error: {0}")]
    Backend(String),
}

/// Collaborator resolving entity references back to entities.
///
/// The host system implements this; relationships never own their targets.
#[async_trait]
pub trait EntityResolver: Send + Sync {
    async fn resolve(
        &self,
        entity_type_id: &str,
        entity_id: EntityId,
    ) -> Result<EntityRef, ResolveError>;
}
