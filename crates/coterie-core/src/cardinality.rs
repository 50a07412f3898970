//! Two-axis cardinality validation for relationships.
//!
//! Runs on the fully-populated, still-unsaved relationship before commit.
//! Violations are structured, recoverable feedback for presentation layers,
//! never hard errors; one pass reports every violated axis.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use coterie_storage::{Relationship, StoreError};

use crate::entity::{EntityRef, GroupRef};
use crate::relation::RelationTypeInstance;
use crate::relationships::{RelationshipError, RelationshipStore};

/// Which cardinality axis was violated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CardinalityAxis {
    /// Too many distinct groups hold this entity under the relation type.
    Group,
    /// This entity is attached to this group too many times already.
    Entity,
}

const GROUP_MESSAGE: &str =
    "%content has already been added to the maximum number of allowed groups.";
const ENTITY_MESSAGE: &str =
    "%content has already been added to %group the maximum number of allowed times.";

/// The field the violation anchors to, for form-level highlighting.
const ENTITY_FIELD_PATH: &str = "entity_id.0";

/// Structured cardinality violation.
///
/// Carries a message template, a field path and substitution parameters
/// rather than a rendered string, so presentation layers can localize and
/// attach the message to a specific field.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CardinalityViolation {
    pub axis: CardinalityAxis,
    pub message_template: &'static str,
    pub field_path: &'static str,
    pub params: BTreeMap<String, String>,
}

impl CardinalityViolation {
    fn group(entity: &EntityRef) -> Self {
        let mut params = BTreeMap::new();
        params.insert("%content".to_string(), entity.label.clone());
        Self {
            axis: CardinalityAxis::Group,
            message_template: GROUP_MESSAGE,
            field_path: ENTITY_FIELD_PATH,
            params,
        }
    }

    fn entity(entity: &EntityRef, group: &GroupRef) -> Self {
        let mut params = BTreeMap::new();
        params.insert("%content".to_string(), entity.label.clone());
        params.insert("%group".to_string(), group.label.clone());
        Self {
            axis: CardinalityAxis::Entity,
            message_template: ENTITY_MESSAGE,
            field_path: ENTITY_FIELD_PATH,
            params,
        }
    }

    /// Render the message with its parameters substituted.
    pub fn message(&self) -> String {
        let mut message = self.message_template.to_string();
        for (key, value) in &self.params {
            message = message.replace(key, value);
        }
        message
    }
}

/// Errors that abort validation before a verdict is reached.
#[derive(Debug, thiserror::Error)]
pub enum CardinalityError {
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Relationships(Box<RelationshipError>),
}

impl From<RelationshipError> for CardinalityError {
    fn from(e: RelationshipError) -> Self {
        CardinalityError::Relationships(Box::new(e))
    }
}

/// Validates relationship cardinality before commit.
pub struct CardinalityValidator {
    relationships: Arc<RelationshipStore>,
}

impl CardinalityValidator {
    pub fn new(relationships: Arc<RelationshipStore>) -> Self {
        Self { relationships }
    }

    /// Check both cardinality axes for a candidate relationship.
    ///
    /// An empty result means the relationship may be committed. When both
    /// cardinalities are unlimited no lookups are performed at all. A count
    /// equal to the limit is already a violation; a limit of 0 always means
    /// unlimited.
    pub async fn validate(
        &self,
        candidate: &Relationship,
        instance: &RelationTypeInstance,
        group: &GroupRef,
        entity: &EntityRef,
    ) -> Result<Vec<CardinalityViolation>, CardinalityError> {
        let group_cardinality = instance.group_cardinality();
        let entity_cardinality = instance.entity_cardinality();

        // Exit early if both cardinalities are set to unlimited.
        if group_cardinality == 0 && entity_cardinality == 0 {
            return Ok(vec![]);
        }

        let mut violations = Vec::new();

        // Enforce the group cardinality if it's not set to unlimited.
        if group_cardinality > 0 {
            let content_type_id = instance.content_type_id();
            let existing = self
                .relationships
                .load_by_content_type_and_entity(&content_type_id, candidate.entity_id)
                .await?;

            // The groups this entity already belongs to, not counting the
            // candidate's own group towards the limit.
            let other_groups: BTreeSet<_> = existing
                .iter()
                .map(|r| r.group_id)
                .filter(|g| *g != candidate.group_id)
                .collect();

            if other_groups.len() >= group_cardinality as usize {
                violations.push(CardinalityViolation::group(entity));
            }
        }

        // Enforce the entity cardinality if it's not set to unlimited.
        if entity_cardinality > 0 {
            let existing = self
                .relationships
                .load_attachments(
                    candidate.group_id,
                    candidate.entity_id,
                    &candidate.relation_type_id,
                )
                .await?;
            let mut count = existing.len();

            // A persisted candidate is an update of itself, not a new
            // attachment.
            if let Some(candidate_id) = candidate.id {
                if existing.iter().any(|r| r.id == Some(candidate_id)) {
                    count -= 1;
                }
            }

            if count >= entity_cardinality as usize {
                violations.push(CardinalityViolation::entity(entity, group));
            }
        }

        Ok(violations)
    }
}
