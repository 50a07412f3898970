//! Relationship type records: the derived binding of a group type to a
//! relation type.

use super::{ContentTypeId, GroupTypeId, RelationTypeId};

/// Persisted relationship-type record.
///
/// Created when a relation type is enabled on a group type, destroyed when it
/// is disabled. The ID is derived deterministically from the pair and is the
/// `type` column of every relationship row of this shape.
#[derive(Clone, Debug)]
pub struct RelationshipType {
    pub id: ContentTypeId,
    pub group_type_id: GroupTypeId,
    pub relation_type_id: RelationTypeId,
    pub label: String,
    pub description: Option<String>,
}
