//! End-to-end flow: a group type with a strict relation, two groups, one
//! entity, and both cardinality axes enforced.

use std::sync::Arc;

use coterie_core::{
    Actor, CardinalityAxis, CardinalityValidator, EntityRef, GroupAccessEngine, GroupRef,
    GroupTypeManager, RelationTypeDef, RelationTypeRegistry, RelationshipStore,
};
use coterie_events_memory::MemoryEventBus;
use coterie_storage::{
    CreateGroupParams, CreateGroupTypeParams, EntityId, ExtraValues, GroupTypeId,
    RelationConfigPatch, RelationTypeId, RoleId, Store,
};
use coterie_store_sqlite::SqliteStore;

fn registry() -> Arc<RelationTypeRegistry> {
    Arc::new(
        RelationTypeRegistry::builder()
            .define(RelationTypeDef {
                id: RelationTypeId::from("membership"),
                label: "Group membership".to_string(),
                description: Some("Members of the group".to_string()),
                entity_type_id: "user".to_string(),
                entity_bundle: None,
                handles_config_entities: false,
                enforced: true,
                defines_entity_access: false,
                default_group_cardinality: 0,
                default_entity_cardinality: 1,
            })
            .build()
            .unwrap(),
    )
}

struct World {
    store: Arc<SqliteStore>,
    manager: GroupTypeManager,
    relationships: Arc<RelationshipStore>,
    validator: CardinalityValidator,
}

async fn world() -> World {
    let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
    let registry = registry();
    let manager = GroupTypeManager::new(Arc::clone(&store) as Arc<dyn Store>, Arc::clone(&registry));
    let relationships = Arc::new(RelationshipStore::new(
        Arc::clone(&store) as Arc<dyn Store>,
        registry,
        Arc::new(MemoryEventBus::new()),
    ));
    let validator = CardinalityValidator::new(Arc::clone(&relationships));
    World {
        store,
        manager,
        relationships,
        validator,
    }
}

#[tokio::test]
async fn strict_membership_cardinality_end_to_end() {
    let world = world().await;
    let membership = RelationTypeId::from("membership");

    // Group type T with membership restricted to one group, one attachment.
    let group_type = world
        .manager
        .create(&CreateGroupTypeParams {
            id: GroupTypeId::from("team"),
            label: "Team".to_string(),
            description: None,
        })
        .await
        .unwrap();
    world
        .manager
        .configure_relation(
            &group_type.id,
            &membership,
            &RelationConfigPatch {
                group_cardinality: Some(1),
                entity_cardinality: Some(1),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    let instance = world
        .manager
        .instance(&group_type.id, &membership)
        .await
        .unwrap();

    let g1 = world
        .manager
        .create_group(&CreateGroupParams {
            group_type_id: group_type.id.clone(),
            label: "Backend".to_string(),
        })
        .await
        .unwrap();
    let g2 = world
        .manager
        .create_group(&CreateGroupParams {
            group_type_id: group_type.id.clone(),
            label: "Frontend".to_string(),
        })
        .await
        .unwrap();
    let g1_ref = GroupRef::from(&g1);
    let g2_ref = GroupRef::from(&g2);

    let alice = EntityRef::content("user", "user", "Alice", EntityId(1));

    // Attach E to G1: validation passes, save commits.
    let mut first = world
        .relationships
        .create_for_entity_in_group(&alice, &g1_ref, &membership, ExtraValues::new())
        .await
        .unwrap();
    let violations = world
        .validator
        .validate(&first, &instance, &g1_ref, &alice)
        .await
        .unwrap();
    assert!(violations.is_empty());
    world.relationships.save(&mut first).await.unwrap();

    // Attaching E to a second group trips the group axis.
    let second = world
        .relationships
        .create_for_entity_in_group(&alice, &g2_ref, &membership, ExtraValues::new())
        .await
        .unwrap();
    let violations = world
        .validator
        .validate(&second, &instance, &g2_ref, &alice)
        .await
        .unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].axis, CardinalityAxis::Group);

    // Attaching E to G1 a second time trips the entity axis.
    let again = world
        .relationships
        .create_for_entity_in_group(&alice, &g1_ref, &membership, ExtraValues::new())
        .await
        .unwrap();
    let violations = world
        .validator
        .validate(&again, &instance, &g1_ref, &alice)
        .await
        .unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].axis, CardinalityAxis::Entity);

    // Re-validating the persisted relationship as an update of itself passes.
    let violations = world
        .validator
        .validate(&first, &instance, &g1_ref, &alice)
        .await
        .unwrap();
    assert!(violations.is_empty());

    // The committed membership is visible through every lookup shape.
    assert_eq!(
        world
            .relationships
            .load_by_group(&g1_ref, Some(&membership))
            .await
            .unwrap()
            .len(),
        1
    );
    assert_eq!(
        world
            .relationships
            .load_by_entity(&alice, None)
            .await
            .unwrap()
            .len(),
        1
    );
    assert!(world
        .relationships
        .load_by_group(&g2_ref, None)
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn membership_drives_access_decisions() {
    let world = world().await;
    let membership = RelationTypeId::from("membership");

    let group_type = world
        .manager
        .create(&CreateGroupTypeParams {
            id: GroupTypeId::from("team"),
            label: "Team".to_string(),
            description: None,
        })
        .await
        .unwrap();
    let group = world
        .manager
        .create_group(&CreateGroupParams {
            group_type_id: group_type.id.clone(),
            label: "Backend".to_string(),
        })
        .await
        .unwrap();
    let group_ref = GroupRef::from(&group);

    world
        .store
        .set_role_permissions(
            &RoleId::from("team.member"),
            &["view relationships".to_string()],
        )
        .await
        .unwrap();

    let engine = GroupAccessEngine::new(
        Arc::clone(&world.store) as Arc<dyn Store>,
        Arc::clone(&world.relationships),
        membership.clone(),
    );

    // Before joining, Alice is an outsider with no access.
    let decision = engine
        .check(
            &Actor::Authenticated(EntityId(1)),
            &group_ref,
            "view relationships",
            None,
        )
        .await
        .unwrap();
    assert!(!decision.is_allowed());

    let alice = EntityRef::content("user", "user", "Alice", EntityId(1));
    let mut joined = world
        .relationships
        .create_for_entity_in_group(&alice, &group_ref, &membership, ExtraValues::new())
        .await
        .unwrap();
    world.relationships.save(&mut joined).await.unwrap();

    // After joining, the member role carries the permission.
    let decision = engine
        .check(
            &Actor::Authenticated(EntityId(1)),
            &group_ref,
            "view relationships",
            None,
        )
        .await
        .unwrap();
    assert!(decision.is_allowed());

    // Anonymous actors stay out.
    let decision = engine
        .check(&Actor::Anonymous, &group_ref, "view relationships", None)
        .await
        .unwrap();
    assert!(!decision.is_allowed());
}
