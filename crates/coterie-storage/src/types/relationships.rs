//! Relationship records: one attachment of a target entity to a group.

use super::{ContentTypeId, EntityId, GroupId, RelationTypeId, RelationshipId};

/// Relation-type-defined extra field values carried on a relationship.
pub type ExtraValues = serde_json::Map<String, serde_json::Value>;

/// One attachment of a target entity to a group under one relation type.
///
/// `id` is `None` until the record is persisted; cardinality validation runs
/// on the fully-populated, still-unsaved record before commit. Uniqueness of
/// (group, entity, relation type) is a business rule enforced by validation,
/// not a storage constraint.
#[derive(Clone, Debug)]
pub struct Relationship {
    pub id: Option<RelationshipId>,
    /// Denormalized relationship-type ID (group type + relation type).
    pub content_type_id: ContentTypeId,
    pub group_id: GroupId,
    pub entity_id: EntityId,
    pub relation_type_id: RelationTypeId,
    pub extra: ExtraValues,
}

impl Relationship {
    /// Whether this record has a persisted identity.
    pub fn is_new(&self) -> bool {
        self.id.is_none()
    }
}
