//! Group type records and per-relation configuration.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{GroupTypeId, RelationTypeId};

/// Group type record: a named template for groups.
///
/// The machine name is immutable after creation. Which relation types a group
/// type enables, and with what cardinalities, lives in [`RelationConfig`]
/// rows keyed by (group type, relation type).
#[derive(Clone, Debug)]
pub struct GroupType {
    pub id: GroupTypeId,
    pub label: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a group type
#[derive(Clone, Debug)]
pub struct CreateGroupTypeParams {
    pub id: GroupTypeId,
    pub label: String,
    pub description: Option<String>,
}

/// Configuration of one relation type as enabled on one group type.
///
/// A cardinality of 0 means unlimited, never "zero allowed".
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationConfig {
    /// How many distinct groups the same target entity may be attached to
    /// under this relation type.
    #[serde(default)]
    pub group_cardinality: u32,
    /// How many times the same target entity may be attached to the same
    /// group under this relation type.
    #[serde(default)]
    pub entity_cardinality: u32,
    #[serde(default)]
    pub use_creation_wizard: bool,
}

impl Default for RelationConfig {
    fn default() -> Self {
        Self {
            group_cardinality: 0,
            entity_cardinality: 0,
            use_creation_wizard: false,
        }
    }
}

/// Partial update for a [`RelationConfig`]; `None` keys reset to defaults.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RelationConfigPatch {
    #[serde(default)]
    pub group_cardinality: Option<u32>,
    #[serde(default)]
    pub entity_cardinality: Option<u32>,
    #[serde(default)]
    pub use_creation_wizard: Option<bool>,
}

/// One enabled relation on a group type, as stored.
#[derive(Clone, Debug)]
pub struct EnabledRelation {
    pub group_type_id: GroupTypeId,
    pub relation_type_id: RelationTypeId,
    pub config: RelationConfig,
}
