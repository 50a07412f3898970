//! Group type lifecycle: creation, built-in roles and relation enablement.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use coterie_storage::{
    BuiltinRole, CreateGroupParams, CreateGroupTypeParams, Group, GroupType, GroupTypeId,
    RelationConfigPatch, RelationTypeId, Role, Store, StoreError,
};

use crate::catalog::{CatalogError, ContentTypeCatalog};
use crate::registry::{RegistryError, RelationTypeRegistry};
use crate::relation::RelationTypeInstance;

#[derive(Debug, Error)]
pub enum GroupTypeError {
    #[error("relation type {0} is not enabled on group type {1}")]
    RelationNotEnabled(RelationTypeId, GroupTypeId),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error("storage: {0}")]
    Store(#[from] StoreError),
}

/// Manages group types and their enabled relation types.
///
/// Creating a group type provisions the anonymous/outsider/member role triad
/// and installs every relation type the registry flags as enforced.
pub struct GroupTypeManager {
    store: Arc<dyn Store>,
    registry: Arc<RelationTypeRegistry>,
    catalog: ContentTypeCatalog,
}

impl GroupTypeManager {
    pub fn new(store: Arc<dyn Store>, registry: Arc<RelationTypeRegistry>) -> Self {
        let catalog = ContentTypeCatalog::new(Arc::clone(&store));
        Self {
            store,
            registry,
            catalog,
        }
    }

    pub fn catalog(&self) -> &ContentTypeCatalog {
        &self.catalog
    }

    /// Create a group type with its built-in roles and enforced relations.
    pub async fn create(&self, params: &CreateGroupTypeParams) -> Result<GroupType, GroupTypeError> {
        let group_type = self.store.create_group_type(params).await?;

        for builtin in BuiltinRole::ALL {
            self.store
                .create_role(&Role::builtin(builtin, &group_type.id))
                .await?;
        }

        let enforced: Vec<_> = self
            .registry
            .list()
            .filter(|def| def.enforced)
            .map(|def| def.id.clone())
            .collect();
        for relation_type_id in enforced {
            self.enable_relation(&group_type, &relation_type_id, None)
                .await?;
        }

        info!(group_type = %group_type.id, "created group type");
        Ok(group_type)
    }

    /// Enable a relation type on a group type, persisting its configuration
    /// and installing the derived relationship type.
    pub async fn enable_relation(
        &self,
        group_type: &GroupType,
        relation_type_id: &RelationTypeId,
        config: Option<&RelationConfigPatch>,
    ) -> Result<RelationTypeInstance, GroupTypeError> {
        let def = self.registry.get(relation_type_id)?;
        let mut instance = RelationTypeInstance::new(def, group_type.id.clone());
        if let Some(patch) = config {
            instance.set_configuration(patch);
        }

        self.store
            .set_relation_config(&group_type.id, relation_type_id, instance.configuration())
            .await?;
        self.catalog.install(group_type, &instance).await?;

        Ok(instance)
    }

    /// Update the configuration of an already-enabled relation type.
    pub async fn configure_relation(
        &self,
        group_type_id: &GroupTypeId,
        relation_type_id: &RelationTypeId,
        patch: &RelationConfigPatch,
    ) -> Result<RelationTypeInstance, GroupTypeError> {
        let mut instance = self.instance(group_type_id, relation_type_id).await?;
        instance.set_configuration(patch);
        self.store
            .set_relation_config(group_type_id, relation_type_id, instance.configuration())
            .await?;
        Ok(instance)
    }

    /// Disable a relation type on a group type and uninstall its derived
    /// relationship type.
    pub async fn disable_relation(
        &self,
        group_type: &GroupType,
        relation_type_id: &RelationTypeId,
    ) -> Result<(), GroupTypeError> {
        match self
            .store
            .remove_relation_config(&group_type.id, relation_type_id)
            .await
        {
            Ok(()) => {}
            Err(StoreError::NotFound) => {
                return Err(GroupTypeError::RelationNotEnabled(
                    relation_type_id.clone(),
                    group_type.id.clone(),
                ))
            }
            Err(e) => return Err(e.into()),
        }

        let content_type_id = ContentTypeCatalog::resolve(&group_type.id, relation_type_id);
        self.catalog.uninstall(&content_type_id).await?;
        Ok(())
    }

    /// The configured instance of a relation type on a group type.
    pub async fn instance(
        &self,
        group_type_id: &GroupTypeId,
        relation_type_id: &RelationTypeId,
    ) -> Result<RelationTypeInstance, GroupTypeError> {
        let def = self.registry.get(relation_type_id)?;
        let config = match self
            .store
            .get_relation_config(group_type_id, relation_type_id)
            .await
        {
            Ok(config) => config,
            Err(StoreError::NotFound) => {
                return Err(GroupTypeError::RelationNotEnabled(
                    relation_type_id.clone(),
                    group_type_id.clone(),
                ))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(RelationTypeInstance::with_config(
            def,
            group_type_id.clone(),
            config,
        ))
    }

    /// All relation type instances enabled on a group type, in stable order.
    pub async fn enabled_relations(
        &self,
        group_type_id: &GroupTypeId,
    ) -> Result<Vec<RelationTypeInstance>, GroupTypeError> {
        let rows = self.store.list_relation_configs(group_type_id).await?;
        let mut instances = Vec::with_capacity(rows.len());
        for row in rows {
            let def = self.registry.get(&row.relation_type_id)?;
            instances.push(RelationTypeInstance::with_config(
                def,
                group_type_id.clone(),
                row.config,
            ));
        }
        Ok(instances)
    }

    /// Create a group of an existing type.
    pub async fn create_group(&self, params: &CreateGroupParams) -> Result<Group, GroupTypeError> {
        Ok(self.store.create_group(params).await?)
    }
}
