//! Smoke test exercising the backend through the Store trait object.

use coterie_storage::{
    ContentTypeId, CreateGroupParams, CreateGroupTypeParams, EntityId, ExtraValues, GroupTypeId,
    RelationTypeId, Relationship, Store,
};
use coterie_store_sqlite::SqliteStore;

#[tokio::test]
async fn full_row_lifecycle_through_trait_object() {
    let store: Box<dyn Store> = Box::new(SqliteStore::open_in_memory().await.unwrap());

    let group_type = store
        .create_group_type(&CreateGroupTypeParams {
            id: GroupTypeId::from("team"),
            label: "Team".to_string(),
            description: Some("A team of people".to_string()),
        })
        .await
        .unwrap();

    let group = store
        .create_group(&CreateGroupParams {
            group_type_id: group_type.id.clone(),
            label: "Backend".to_string(),
        })
        .await
        .unwrap();

    let mut rel = Relationship {
        id: None,
        content_type_id: ContentTypeId::from("team-membership"),
        group_id: group.id,
        entity_id: EntityId(1),
        relation_type_id: RelationTypeId::from("membership"),
        extra: ExtraValues::new(),
    };
    let id = store.insert_relationship(&rel).await.unwrap();
    rel.id = Some(id);

    let loaded = store.get_relationship(id).await.unwrap();
    assert_eq!(loaded.group_id, group.id);
    assert_eq!(loaded.entity_id, EntityId(1));

    store.delete_relationship(id).await.unwrap();
    assert!(store
        .relationship_ids_by_group(group.id, None)
        .await
        .unwrap()
        .is_empty());
}
