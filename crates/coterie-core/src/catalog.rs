//! Catalog of derived relationship types.
//!
//! The catalog persists the binding between a group type and a relation type
//! under the derived content-type ID. Callers look IDs up here instead of
//! recomputing them ad hoc.

use std::sync::Arc;
use thiserror::Error;
use tracing::info;
use coterie_storage::{
    ContentTypeId, GroupType, GroupTypeId, RelationTypeId, RelationshipType, Store, StoreError,
};

use crate::relation::{derive_content_type_id, RelationTypeInstance};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("unknown content type: {0}")]
    NotFound(ContentTypeId),
    #[error("storage: {0}")]
    Store(StoreError),
}

impl From<StoreError> for CatalogError {
    fn from(e: StoreError) -> Self {
        CatalogError::Store(e)
    }
}

/// Store-backed catalog of relationship-type records.
pub struct ContentTypeCatalog {
    store: Arc<dyn Store>,
}

impl ContentTypeCatalog {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    /// The content-type ID for a (group type, relation type) pair. Pure
    /// derivation, no storage involved.
    pub fn resolve(
        group_type_id: &GroupTypeId,
        relation_type_id: &RelationTypeId,
    ) -> ContentTypeId {
        derive_content_type_id(group_type_id, relation_type_id)
    }

    /// Persist the relationship-type record for an enabled relation.
    ///
    /// Installing twice for the same pair is a no-op returning the existing
    /// record.
    pub async fn install(
        &self,
        group_type: &GroupType,
        instance: &RelationTypeInstance,
    ) -> Result<RelationshipType, CatalogError> {
        let record = RelationshipType {
            id: instance.content_type_id(),
            group_type_id: group_type.id.clone(),
            relation_type_id: instance.relation_type_id().clone(),
            label: instance.content_type_label(&group_type.label),
            description: instance.content_type_description(),
        };

        match self.store.create_relationship_type(&record).await {
            Ok(()) => {
                info!(
                    content_type = %record.id,
                    group_type = %group_type.id,
                    relation_type = %record.relation_type_id,
                    "installed relationship type"
                );
                Ok(record)
            }
            Err(StoreError::AlreadyExists) => Ok(self.store.get_relationship_type(&record.id).await?),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove a relationship-type record.
    pub async fn uninstall(&self, id: &ContentTypeId) -> Result<(), CatalogError> {
        match self.store.delete_relationship_type(id).await {
            Ok(()) => {
                info!(content_type = %id, "uninstalled relationship type");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(CatalogError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }

    /// Look up a relationship-type record by its derived ID.
    pub async fn get(&self, id: &ContentTypeId) -> Result<RelationshipType, CatalogError> {
        match self.store.get_relationship_type(id).await {
            Ok(record) => Ok(record),
            Err(StoreError::NotFound) => Err(CatalogError::NotFound(id.clone())),
            Err(e) => Err(e.into()),
        }
    }
}
