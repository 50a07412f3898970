//! Static registry of relation type definitions.
//!
//! Definitions are loaded once at startup, either from code via the builder
//! or from a JSON definitions file, and never mutated afterwards. There is no
//! runtime discovery: what can attach to groups is an explicit, compiled
//! table.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;
use coterie_storage::{RelationConfig, RelationTypeId};

/// Immutable descriptor of one relation type.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RelationTypeDef {
    pub id: RelationTypeId,
    pub label: String,
    #[serde(default)]
    pub description: Option<String>,
    /// The entity type this relation serves.
    pub entity_type_id: String,
    /// When set, only entities of this bundle may attach.
    #[serde(default)]
    pub entity_bundle: Option<String>,
    /// Whether targets are configuration entities that need a surrogate
    /// identity before they can be referenced.
    #[serde(default)]
    pub handles_config_entities: bool,
    /// Enforced relation types are installed on every new group type.
    #[serde(default)]
    pub enforced: bool,
    /// Whether this relation type provides its own access decorators.
    #[serde(default)]
    pub defines_entity_access: bool,
    #[serde(default)]
    pub default_group_cardinality: u32,
    #[serde(default)]
    pub default_entity_cardinality: u32,
}

impl RelationTypeDef {
    /// The compiled default configuration for instances of this relation.
    pub fn default_config(&self) -> RelationConfig {
        RelationConfig {
            group_cardinality: self.default_group_cardinality,
            entity_cardinality: self.default_entity_cardinality,
            use_creation_wizard: false,
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown relation type: {0}")]
    UnknownRelationType(RelationTypeId),
    #[error("duplicate relation type definition: {0}")]
    DuplicateRelationType(RelationTypeId),
    #[error("definitions file not found")]
    NotFound,
    #[error("failed to read definitions: {0}")]
    Read(#[from] std::io::Error),
    #[error("failed to parse definitions: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Read-only lookup table of relation type definitions.
#[derive(Debug)]
pub struct RelationTypeRegistry {
    defs: Vec<Arc<RelationTypeDef>>,
    by_id: HashMap<RelationTypeId, usize>,
    by_entity_type: HashMap<String, Vec<RelationTypeId>>,
}

impl RelationTypeRegistry {
    pub fn builder() -> RelationTypeRegistryBuilder {
        RelationTypeRegistryBuilder { defs: Vec::new() }
    }

    /// Build a registry from a JSON array of definitions.
    pub fn from_json_str(json: &str) -> Result<Self, RegistryError> {
        let defs: Vec<RelationTypeDef> = serde_json::from_str(json)?;
        let mut builder = Self::builder();
        for def in defs {
            builder = builder.define(def);
        }
        builder.build()
    }

    /// Load definitions from a JSON file.
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self, RegistryError> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                RegistryError::NotFound
            } else {
                RegistryError::Read(e)
            }
        })?;
        Self::from_json_str(&contents)
    }

    /// Look up a definition; unknown IDs are a caller error.
    pub fn get(&self, id: &RelationTypeId) -> Result<Arc<RelationTypeDef>, RegistryError> {
        self.by_id
            .get(id)
            .map(|&index| Arc::clone(&self.defs[index]))
            .ok_or_else(|| RegistryError::UnknownRelationType(id.clone()))
    }

    /// All definitions, in stable registration order.
    pub fn list(&self) -> impl Iterator<Item = &Arc<RelationTypeDef>> {
        self.defs.iter()
    }

    /// IDs of relation types serving a given entity type, in registration
    /// order. Backs candidate derivation for entity-keyed lookups.
    pub fn ids_for_entity_type(&self, entity_type_id: &str) -> Vec<RelationTypeId> {
        self.by_entity_type
            .get(entity_type_id)
            .cloned()
            .unwrap_or_default()
    }
}

pub struct RelationTypeRegistryBuilder {
    defs: Vec<RelationTypeDef>,
}

impl RelationTypeRegistryBuilder {
    pub fn define(mut self, def: RelationTypeDef) -> Self {
        self.defs.push(def);
        self
    }

    pub fn build(self) -> Result<RelationTypeRegistry, RegistryError> {
        let mut defs = Vec::with_capacity(self.defs.len());
        let mut by_id = HashMap::new();
        let mut by_entity_type: HashMap<String, Vec<RelationTypeId>> = HashMap::new();

        for def in self.defs {
            if by_id.contains_key(&def.id) {
                return Err(RegistryError::DuplicateRelationType(def.id));
            }
            by_id.insert(def.id.clone(), defs.len());
            by_entity_type
                .entry(def.entity_type_id.clone())
                .or_default()
                .push(def.id.clone());
            defs.push(Arc::new(def));
        }

        Ok(RelationTypeRegistry {
            defs,
            by_id,
            by_entity_type,
        })
    }
}
