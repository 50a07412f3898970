//! Relationship persistence and cached lookup.
//!
//! The store wraps the row backend with three request-scoped lookup caches
//! and the precondition checks that keep invalid attachments out of storage.
//! Construct one instance per logical unit of work; reusing an instance
//! across units of work leaks stale cache entries.

use chrono::Utc;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};
use coterie_events::{EventBus, EventId, EventType, RelationshipChangeEvent};
use coterie_storage::{
    EntityId, ExtraValues, GroupId, RelationTypeId, Relationship, RelationshipId, Store,
    StoreError,
};

use crate::entity::{EntityIdentity, EntityRef, EntityResolver, GroupRef, ResolveError};
use crate::registry::{RegistryError, RelationTypeRegistry};
use crate::relation::derive_content_type_id;

#[derive(Debug, Error)]
pub enum RelationshipError {
    #[error("cannot add an unsaved entity to a group")]
    UnsavedEntity,
    #[error("cannot add an entity to an unsaved group")]
    UnsavedGroup,
    #[error("cannot delete an unsaved relationship")]
    UnsavedRelationship,
    #[error("relation type {relation_type} serves {expected} entities, got {actual}")]
    EntityTypeMismatch {
        relation_type: RelationTypeId,
        expected: String,
        actual: String,
    },
    #[error("relation type {relation_type} does not accept bundle {actual} (expected {expected})")]
    BundleMismatch {
        relation_type: RelationTypeId,
        expected: String,
        actual: String,
    },
    #[error("relation type {0} cannot reference configuration entities")]
    ConfigEntityNotSupported(RelationTypeId),
    #[error("relation type {0} is not enabled on group type {1}")]
    RelationNotEnabled(RelationTypeId, coterie_storage::GroupTypeId),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Resolve(#[from] ResolveError),
    #[error("storage: {0}")]
    Store(#[from] StoreError),
}

type GroupCacheKey = (GroupId, Option<RelationTypeId>);
type EntityCacheKey = (String, EntityId, Option<RelationTypeId>);

/// Cached relationship store.
pub struct RelationshipStore {
    store: Arc<dyn Store>,
    registry: Arc<RelationTypeRegistry>,
    events: Arc<dyn EventBus>,
    by_group: DashMap<GroupCacheKey, Vec<RelationshipId>>,
    by_entity: DashMap<EntityCacheKey, Vec<RelationshipId>>,
    by_relation_type: DashMap<RelationTypeId, Vec<RelationshipId>>,
}

impl RelationshipStore {
    pub fn new(
        store: Arc<dyn Store>,
        registry: Arc<RelationTypeRegistry>,
        events: Arc<dyn EventBus>,
    ) -> Self {
        Self {
            store,
            registry,
            events,
            by_group: DashMap::new(),
            by_entity: DashMap::new(),
            by_relation_type: DashMap::new(),
        }
    }

    /// Build an unsaved relationship attaching an entity to a group.
    ///
    /// Preconditions are checked in order and each failure is a distinct
    /// error: the entity and the group must be persisted, the relation type
    /// (resolved from the group's type) must serve the entity's type, and a
    /// bundle restriction must match. Configuration entities are given a
    /// surrogate identity through the wrapper before the record is built.
    ///
    /// The returned relationship is not yet persisted; run cardinality
    /// validation on it, then [`save`](Self::save) it.
    pub async fn create_for_entity_in_group(
        &self,
        entity: &EntityRef,
        group: &GroupRef,
        relation_type_id: &RelationTypeId,
        extra: ExtraValues,
    ) -> Result<Relationship, RelationshipError> {
        // An unsaved entity cannot have any relationships.
        if entity.is_new() {
            return Err(RelationshipError::UnsavedEntity);
        }

        // An unsaved group cannot have any content.
        let group_id = group.id.ok_or(RelationshipError::UnsavedGroup)?;

        // The relation type must be enabled on the group's type and must
        // serve the entity's concrete type.
        match self
            .store
            .get_relation_config(&group.group_type_id, relation_type_id)
            .await
        {
            Ok(_) => {}
            Err(StoreError::NotFound) => {
                return Err(RelationshipError::RelationNotEnabled(
                    relation_type_id.clone(),
                    group.group_type_id.clone(),
                ))
            }
            Err(e) => return Err(e.into()),
        }
        let def = self.registry.get(relation_type_id)?;
        if entity.entity_type_id != def.entity_type_id {
            return Err(RelationshipError::EntityTypeMismatch {
                relation_type: relation_type_id.clone(),
                expected: def.entity_type_id.clone(),
                actual: entity.entity_type_id.clone(),
            });
        }

        // Verify the bundle as well if the relation is specific about it.
        if let Some(expected) = &def.entity_bundle {
            if &entity.bundle != expected {
                return Err(RelationshipError::BundleMismatch {
                    relation_type: relation_type_id.clone(),
                    expected: expected.clone(),
                    actual: entity.bundle.clone(),
                });
            }
        }

        let entity_id = match &entity.identity {
            EntityIdentity::Content(id) => *id,
            EntityIdentity::Config(config_key) => {
                if !def.handles_config_entities {
                    return Err(RelationshipError::ConfigEntityNotSupported(
                        relation_type_id.clone(),
                    ));
                }
                self.store
                    .wrap_config_entity(&entity.entity_type_id, config_key)
                    .await?
            }
            EntityIdentity::Unsaved => unreachable!("rejected above"),
        };

        Ok(Relationship {
            id: None,
            content_type_id: derive_content_type_id(&group.group_type_id, relation_type_id),
            group_id,
            entity_id,
            relation_type_id: relation_type_id.clone(),
            extra,
        })
    }

    /// Persist a relationship (insert when new, update otherwise).
    ///
    /// Every write invalidates all lookup caches and publishes a change
    /// event for the group.
    pub async fn save(&self, relationship: &mut Relationship) -> Result<RelationshipId, RelationshipError> {
        let (id, event_type) = match relationship.id {
            None => {
                let id = self.store.insert_relationship(relationship).await?;
                relationship.id = Some(id);
                (id, EventType::Created)
            }
            Some(id) => {
                self.store.update_relationship(relationship).await?;
                (id, EventType::Updated)
            }
        };

        self.reset_cache();
        self.publish(relationship, id, event_type).await;
        Ok(id)
    }

    /// Delete a relationship.
    pub async fn delete(&self, relationship: &Relationship) -> Result<(), RelationshipError> {
        let id = relationship
            .id
            .ok_or(RelationshipError::UnsavedRelationship)?;
        self.store.delete_relationship(id).await?;
        self.reset_cache();
        self.publish(relationship, id, EventType::Deleted).await;
        Ok(())
    }

    /// All relationships in a group, optionally narrowed to one relation
    /// type. An unsaved group has no content.
    pub async fn load_by_group(
        &self,
        group: &GroupRef,
        relation_type_id: Option<&RelationTypeId>,
    ) -> Result<Vec<Relationship>, RelationshipError> {
        let Some(group_id) = group.id else {
            return Ok(vec![]);
        };

        let key = (group_id, relation_type_id.cloned());
        let ids = match self.by_group.get(&key) {
            Some(ids) => {
                debug!(group = %group_id, "load_by_group cache hit");
                ids.clone()
            }
            None => {
                let ids = self
                    .store
                    .relationship_ids_by_group(group_id, relation_type_id.cloned())
                    .await?;
                self.by_group.insert(key, ids.clone());
                ids
            }
        };

        self.load_ids(&ids).await
    }

    /// All relationships referencing a target entity, optionally narrowed to
    /// one relation type. An unsaved entity has no relationships. When no
    /// relation type is given, candidates come from the registry lookup by
    /// the entity's type rather than an exhaustive scan.
    pub async fn load_by_entity(
        &self,
        entity: &EntityRef,
        relation_type_id: Option<&RelationTypeId>,
    ) -> Result<Vec<Relationship>, RelationshipError> {
        let entity_id = match &entity.identity {
            EntityIdentity::Unsaved => return Ok(vec![]),
            EntityIdentity::Content(id) => *id,
            EntityIdentity::Config(config_key) => {
                self.store
                    .wrap_config_entity(&entity.entity_type_id, config_key)
                    .await?
            }
        };

        let key = (
            entity.entity_type_id.clone(),
            entity_id,
            relation_type_id.cloned(),
        );
        let ids = match self.by_entity.get(&key) {
            Some(ids) => {
                debug!(entity = %entity_id, "load_by_entity cache hit");
                ids.clone()
            }
            None => {
                let candidates = match relation_type_id {
                    Some(id) => vec![id.clone()],
                    None => self.registry.ids_for_entity_type(&entity.entity_type_id),
                };
                let ids = if candidates.is_empty() {
                    vec![]
                } else {
                    self.store
                        .relationship_ids_by_entity(entity_id, &candidates)
                        .await?
                };
                self.by_entity.insert(key, ids.clone());
                ids
            }
        };

        self.load_ids(&ids).await
    }

    /// All relationships under one relation type.
    pub async fn load_by_relation_type(
        &self,
        relation_type_id: &RelationTypeId,
    ) -> Result<Vec<Relationship>, RelationshipError> {
        let ids = match self.by_relation_type.get(relation_type_id) {
            Some(ids) => {
                debug!(relation_type = %relation_type_id, "load_by_relation_type cache hit");
                ids.clone()
            }
            None => {
                let ids = self
                    .store
                    .relationship_ids_by_relation_type(relation_type_id)
                    .await?;
                self.by_relation_type
                    .insert(relation_type_id.clone(), ids.clone());
                ids
            }
        };

        self.load_ids(&ids).await
    }

    /// All relationships of one relationship type referencing an entity,
    /// across groups. Uncached read path for cardinality checks.
    pub async fn load_by_content_type_and_entity(
        &self,
        content_type_id: &coterie_storage::ContentTypeId,
        entity_id: EntityId,
    ) -> Result<Vec<Relationship>, RelationshipError> {
        Ok(self
            .store
            .list_by_content_type_and_entity(content_type_id, entity_id)
            .await?)
    }

    /// All attachments of one entity to one group under one relation type.
    /// Uncached read path for cardinality checks and membership lookups.
    pub async fn load_attachments(
        &self,
        group_id: GroupId,
        entity_id: EntityId,
        relation_type_id: &RelationTypeId,
    ) -> Result<Vec<Relationship>, RelationshipError> {
        Ok(self
            .store
            .list_by_group_entity_relation(group_id, entity_id, relation_type_id)
            .await?)
    }

    /// Re-resolve a relationship's target through the entity collaborator.
    pub async fn resolve_target(
        &self,
        relationship: &Relationship,
        resolver: &dyn EntityResolver,
    ) -> Result<EntityRef, RelationshipError> {
        let def = self.registry.get(&relationship.relation_type_id)?;
        Ok(resolver
            .resolve(&def.entity_type_id, relationship.entity_id)
            .await?)
    }

    /// Drop every cached lookup.
    ///
    /// Always wholesale: the group/entity/relation-type keyed caches are not
    /// indexed by relationship ID, so per-ID invalidation cannot be correct.
    pub fn reset_cache(&self) {
        self.by_group.clear();
        self.by_entity.clear();
        self.by_relation_type.clear();
    }

    async fn load_ids(&self, ids: &[RelationshipId]) -> Result<Vec<Relationship>, RelationshipError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        Ok(self.store.get_relationships(ids).await?)
    }

    async fn publish(&self, relationship: &Relationship, id: RelationshipId, event_type: EventType) {
        let event = RelationshipChangeEvent {
            id: EventId::new(),
            event_type,
            relationship_id: id.0,
            content_type: relationship.content_type_id.0.clone(),
            timestamp: Utc::now().timestamp(),
        };
        // Event delivery is best-effort; a failed publish never fails the write.
        if let Err(e) = self.events.publish(&relationship.group_id, event).await {
            warn!(group = %relationship.group_id, "failed to publish relationship event: {e}");
        }
    }
}
