//! The Store trait that backends implement.

use crate::types::*;
use crate::StoreError;

/// The row-store trait `coterie-core` depends on.
///
/// Backends only provide plain CRUD and the listed query shapes; caching,
/// cardinality enforcement and access decisions all live above this trait.
#[cfg_attr(feature = "test-support", mockall::automock)]
#[async_trait::async_trait]
pub trait Store: Send + Sync {
    // ───────────────────────────────── Group types ─────────────────────────────────

    /// Create a new group type. The machine name is caller-chosen and unique.
    async fn create_group_type(
        &self,
        params: &CreateGroupTypeParams,
    ) -> Result<GroupType, StoreError>;

    /// Get a group type by machine name.
    async fn get_group_type(&self, id: &GroupTypeId) -> Result<GroupType, StoreError>;

    /// List all group types, ordered by machine name.
    async fn list_group_types(&self) -> Result<Vec<GroupType>, StoreError>;

    /// Delete a group type. Fails with `Conflict` while groups of this type
    /// exist (no orphaned groups may reference a missing type).
    async fn delete_group_type(&self, id: &GroupTypeId) -> Result<(), StoreError>;

    // ─────────────────────────── Enabled relation configs ──────────────────────────

    /// Upsert the configuration of a relation type on a group type.
    async fn set_relation_config(
        &self,
        group_type_id: &GroupTypeId,
        relation_type_id: &RelationTypeId,
        config: &RelationConfig,
    ) -> Result<(), StoreError>;

    /// Get the configuration of a relation type on a group type.
    async fn get_relation_config(
        &self,
        group_type_id: &GroupTypeId,
        relation_type_id: &RelationTypeId,
    ) -> Result<RelationConfig, StoreError>;

    /// List all relation configurations enabled on a group type, in a stable
    /// order.
    async fn list_relation_configs(
        &self,
        group_type_id: &GroupTypeId,
    ) -> Result<Vec<EnabledRelation>, StoreError>;

    /// Remove a relation configuration from a group type.
    async fn remove_relation_config(
        &self,
        group_type_id: &GroupTypeId,
        relation_type_id: &RelationTypeId,
    ) -> Result<(), StoreError>;

    // ──────────────────────────────────── Roles ────────────────────────────────────

    /// Create a role for a group type.
    async fn create_role(&self, role: &Role) -> Result<(), StoreError>;

    /// Get a role by ID.
    async fn get_role(&self, id: &RoleId) -> Result<Role, StoreError>;

    /// List all roles of a group type, ordered by weight.
    async fn list_roles(&self, group_type_id: &GroupTypeId) -> Result<Vec<Role>, StoreError>;

    /// Replace the permission set of a role.
    async fn set_role_permissions(
        &self,
        id: &RoleId,
        permissions: &[String],
    ) -> Result<(), StoreError>;

    // ─────────────────────────────────── Groups ────────────────────────────────────

    /// Create a group of an existing group type (returns the persisted record).
    async fn create_group(&self, params: &CreateGroupParams) -> Result<Group, StoreError>;

    /// Get a group by ID.
    async fn get_group(&self, id: GroupId) -> Result<Group, StoreError>;

    // ──────────────────────────── Relationship types ───────────────────────────────

    /// Persist a relationship-type record. Fails with `AlreadyExists` when
    /// the derived ID is taken.
    async fn create_relationship_type(
        &self,
        relationship_type: &RelationshipType,
    ) -> Result<(), StoreError>;

    /// Get a relationship-type record by its derived ID.
    async fn get_relationship_type(
        &self,
        id: &ContentTypeId,
    ) -> Result<RelationshipType, StoreError>;

    /// Delete a relationship-type record.
    async fn delete_relationship_type(&self, id: &ContentTypeId) -> Result<(), StoreError>;

    /// List relationship-type records using a given relation type.
    async fn list_relationship_types_by_relation_type(
        &self,
        relation_type_id: &RelationTypeId,
    ) -> Result<Vec<RelationshipType>, StoreError>;

    // ───────────────────────────────  Relationships ────────────────────────────────

    /// Insert a relationship row, returning its allocated ID.
    async fn insert_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<RelationshipId, StoreError>;

    /// Update an existing relationship row (extra values only; the keys are
    /// immutable once written).
    async fn update_relationship(&self, relationship: &Relationship) -> Result<(), StoreError>;

    /// Delete a relationship row.
    async fn delete_relationship(&self, id: RelationshipId) -> Result<(), StoreError>;

    /// Get a relationship row by ID.
    async fn get_relationship(&self, id: RelationshipId) -> Result<Relationship, StoreError>;

    /// Load multiple relationship rows by ID, ordered by ID.
    async fn get_relationships(
        &self,
        ids: &[RelationshipId],
    ) -> Result<Vec<Relationship>, StoreError>;

    /// IDs of relationships in a group, optionally narrowed to one relation
    /// type.
    async fn relationship_ids_by_group(
        &self,
        group_id: GroupId,
        relation_type_id: Option<RelationTypeId>,
    ) -> Result<Vec<RelationshipId>, StoreError>;

    /// IDs of relationships referencing a target entity under any of the
    /// given relation types. An empty relation-type list yields no rows.
    async fn relationship_ids_by_entity(
        &self,
        entity_id: EntityId,
        relation_type_ids: &[RelationTypeId],
    ) -> Result<Vec<RelationshipId>, StoreError>;

    /// IDs of all relationships under one relation type.
    async fn relationship_ids_by_relation_type(
        &self,
        relation_type_id: &RelationTypeId,
    ) -> Result<Vec<RelationshipId>, StoreError>;

    /// All relationships of one relationship type referencing a target
    /// entity, across groups. Backs the group-cardinality check.
    async fn list_by_content_type_and_entity(
        &self,
        content_type_id: &ContentTypeId,
        entity_id: EntityId,
    ) -> Result<Vec<Relationship>, StoreError>;

    /// All relationships attaching one entity to one group under one relation
    /// type. Backs the entity-cardinality check and membership lookups.
    async fn list_by_group_entity_relation(
        &self,
        group_id: GroupId,
        entity_id: EntityId,
        relation_type_id: &RelationTypeId,
    ) -> Result<Vec<Relationship>, StoreError>;

    // ─────────────────────────── Config-entity wrappers ────────────────────────────

    /// Return the stable surrogate entity ID for a configuration entity,
    /// minting one on first use. The same (entity type, config key) pair
    /// always resolves to the same ID.
    async fn wrap_config_entity(
        &self,
        entity_type_id: &str,
        config_key: &str,
    ) -> Result<EntityId, StoreError>;
}
