//! Configured relation type instances and content-type ID derivation.

use sha2::{Digest, Sha256};
use std::sync::Arc;
use coterie_storage::{ContentTypeId, GroupTypeId, RelationConfig, RelationConfigPatch, RelationTypeId};

use crate::registry::RelationTypeDef;

/// Upper bound for derived content-type IDs.
pub const CONTENT_TYPE_ID_MAX_LEN: usize = 32;

/// Derive the content-type ID binding a group type to a relation type.
///
/// The natural form is `{group_type}-{relation_type}` with `:` replaced by
/// `-`. When that exceeds the length bound, the ID becomes a fixed-prefix
/// SHA-256 of the natural form truncated to exactly the bound, so the result
/// is stable across processes either way.
pub fn derive_content_type_id(
    group_type_id: &GroupTypeId,
    relation_type_id: &RelationTypeId,
) -> ContentTypeId {
    let natural = format!("{}-{}", group_type_id.0, relation_type_id.0.replace(':', "-"));
    if natural.len() <= CONTENT_TYPE_ID_MAX_LEN {
        return ContentTypeId(natural);
    }

    let digest = Sha256::digest(natural.as_bytes());
    let mut hashed = format!("grp_rel_{}", hex::encode(digest));
    hashed.truncate(CONTENT_TYPE_ID_MAX_LEN);
    ContentTypeId(hashed)
}

/// One relation type as configured for one group type.
///
/// The group type ID is fixed at construction; configuration updates can
/// never move an instance to another group type.
#[derive(Clone, Debug)]
pub struct RelationTypeInstance {
    def: Arc<RelationTypeDef>,
    group_type_id: GroupTypeId,
    config: RelationConfig,
}

impl RelationTypeInstance {
    /// A fresh instance carrying the definition's default configuration.
    pub fn new(def: Arc<RelationTypeDef>, group_type_id: GroupTypeId) -> Self {
        let config = def.default_config();
        Self {
            def,
            group_type_id,
            config,
        }
    }

    /// Rehydrate an instance from stored configuration.
    pub fn with_config(
        def: Arc<RelationTypeDef>,
        group_type_id: GroupTypeId,
        config: RelationConfig,
    ) -> Self {
        Self {
            def,
            group_type_id,
            config,
        }
    }

    pub fn relation_type_id(&self) -> &RelationTypeId {
        &self.def.id
    }

    pub fn definition(&self) -> &Arc<RelationTypeDef> {
        &self.def
    }

    pub fn group_type_id(&self) -> &GroupTypeId {
        &self.group_type_id
    }

    pub fn configuration(&self) -> &RelationConfig {
        &self.config
    }

    /// Max number of distinct groups one entity may attach to; 0 = unlimited.
    pub fn group_cardinality(&self) -> u32 {
        self.config.group_cardinality
    }

    /// Max number of attachments of one entity to one group; 0 = unlimited.
    pub fn entity_cardinality(&self) -> u32 {
        self.config.entity_cardinality
    }

    pub fn use_creation_wizard(&self) -> bool {
        self.config.use_creation_wizard
    }

    /// Apply a configuration patch. Keys omitted from the patch reset to the
    /// definition defaults, not the previous values; the owning group type
    /// can never change through this path.
    pub fn set_configuration(&mut self, patch: &RelationConfigPatch) -> &mut Self {
        let defaults = self.def.default_config();
        self.config = RelationConfig {
            group_cardinality: patch.group_cardinality.unwrap_or(defaults.group_cardinality),
            entity_cardinality: patch
                .entity_cardinality
                .unwrap_or(defaults.entity_cardinality),
            use_creation_wizard: patch
                .use_creation_wizard
                .unwrap_or(defaults.use_creation_wizard),
        };
        self
    }

    /// The derived content-type ID for this instance.
    pub fn content_type_id(&self) -> ContentTypeId {
        derive_content_type_id(&self.group_type_id, &self.def.id)
    }

    /// Administrative label for the derived relationship type.
    pub fn content_type_label(&self, group_type_label: &str) -> String {
        format!("{}: {}", group_type_label, self.def.label)
    }

    /// Administrative description for the derived relationship type.
    pub fn content_type_description(&self) -> Option<String> {
        self.def.description.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::RelationTypeDef;

    fn def(id: &str) -> Arc<RelationTypeDef> {
        Arc::new(RelationTypeDef {
            id: RelationTypeId::from(id),
            label: "Article content".to_string(),
            description: Some("Articles attached to a group".to_string()),
            entity_type_id: "node".to_string(),
            entity_bundle: Some("article".to_string()),
            handles_config_entities: false,
            enforced: false,
            defines_entity_access: false,
            default_group_cardinality: 2,
            default_entity_cardinality: 1,
        })
    }

    #[test]
    fn derivation_replaces_colons() {
        let id = derive_content_type_id(
            &GroupTypeId::from("club"),
            &RelationTypeId::from("node_content:article"),
        );
        assert_eq!(id, ContentTypeId::from("club-node_content-article"));
    }

    #[test]
    fn derivation_is_pure_and_stable() {
        let a = derive_content_type_id(
            &GroupTypeId::from("club"),
            &RelationTypeId::from("membership"),
        );
        let b = derive_content_type_id(
            &GroupTypeId::from("club"),
            &RelationTypeId::from("membership"),
        );
        assert_eq!(a, b);
    }

    #[test]
    fn long_ids_hash_to_exactly_the_bound() {
        let group_type = GroupTypeId::from("a_rather_long_group_type_name");
        let relation_type = RelationTypeId::from("node_content:article_with_long_name");
        let id = derive_content_type_id(&group_type, &relation_type);

        assert_eq!(id.0.len(), CONTENT_TYPE_ID_MAX_LEN);
        assert!(id.0.starts_with("grp_rel_"));

        // Stable under repetition.
        assert_eq!(id, derive_content_type_id(&group_type, &relation_type));

        // Different inputs land on different hashes.
        let other = derive_content_type_id(
            &GroupTypeId::from("another_rather_long_group_type"),
            &relation_type,
        );
        assert_ne!(id, other);
        assert_eq!(other.0.len(), CONTENT_TYPE_ID_MAX_LEN);
    }

    #[test]
    fn boundary_length_id_stays_natural() {
        // Exactly 32 characters: no hashing.
        let group_type = GroupTypeId::from("group_type_name_x");
        let relation_type = RelationTypeId::from("relation_ty_yy");
        let id = derive_content_type_id(&group_type, &relation_type);
        assert_eq!(id.0.len(), 32);
        assert_eq!(id.0, "group_type_name_x-relation_ty_yy");
    }

    #[test]
    fn new_instance_starts_with_definition_defaults() {
        let instance = RelationTypeInstance::new(def("node_content:article"), GroupTypeId::from("club"));
        assert_eq!(instance.group_cardinality(), 2);
        assert_eq!(instance.entity_cardinality(), 1);
        assert!(!instance.use_creation_wizard());
    }

    #[test]
    fn set_configuration_resets_omitted_keys_to_defaults() {
        let mut instance =
            RelationTypeInstance::new(def("node_content:article"), GroupTypeId::from("club"));

        instance.set_configuration(&RelationConfigPatch {
            group_cardinality: Some(5),
            entity_cardinality: Some(3),
            use_creation_wizard: Some(true),
        });
        assert_eq!(instance.group_cardinality(), 5);
        assert_eq!(instance.entity_cardinality(), 3);
        assert!(instance.use_creation_wizard());

        // A later patch that only sets one key resets the rest to defaults,
        // not to the previous values.
        instance.set_configuration(&RelationConfigPatch {
            entity_cardinality: Some(9),
            ..Default::default()
        });
        assert_eq!(instance.group_cardinality(), 2);
        assert_eq!(instance.entity_cardinality(), 9);
        assert!(!instance.use_creation_wizard());
    }

    #[test]
    fn group_type_is_fixed_at_construction() {
        let mut instance =
            RelationTypeInstance::new(def("node_content:article"), GroupTypeId::from("club"));
        instance.set_configuration(&RelationConfigPatch::default());
        assert_eq!(instance.group_type_id(), &GroupTypeId::from("club"));
        assert_eq!(
            instance.content_type_id(),
            ContentTypeId::from("club-node_content-article")
        );
    }

    #[test]
    fn content_type_label_combines_both_labels() {
        let instance =
            RelationTypeInstance::new(def("node_content:article"), GroupTypeId::from("club"));
        assert_eq!(
            instance.content_type_label("Club"),
            "Club: Article content"
        );
        assert_eq!(
            instance.content_type_description().as_deref(),
            Some("Articles attached to a group")
        );
    }
}
