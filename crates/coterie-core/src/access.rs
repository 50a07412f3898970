//! Group access decisions.
//!
//! An actor's roles for a group derive from membership relationships: no
//! membership means the anonymous or outsider role, a membership grants the
//! member role plus whatever roles the membership record carries. The base
//! check unions the permissions of those roles; relation types may wrap it
//! with access decorators that short-circuit with an explicit allow/deny or
//! defer inward. Every decision reports what it depended on so callers can
//! cache results safely.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;
use coterie_storage::{
    BuiltinRole, ContentTypeId, EntityId, RelationTypeId, RoleId, Store, StoreError,
};

use crate::entity::GroupRef;
use crate::relationships::{RelationshipError, RelationshipStore};

/// The actor asking for access.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Actor {
    /// No authenticated identity.
    Anonymous,
    /// An authenticated identity, by its membership target entity ID.
    Authenticated(EntityId),
}

/// Verdict of one access decorator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccessVerdict {
    Allow,
    Forbid,
    /// Defer to the wrapped check.
    Neutral,
}

/// Relation-type-specific access override.
///
/// Decorators are composed into an ordered chain per content type at
/// configuration-load time; the role-permission check sits innermost.
pub trait AccessDecorator: Send + Sync {
    fn check(&self, operation: &str, actor: &Actor, group: &GroupRef) -> AccessVerdict {
        let _ = (operation, actor, group);
        AccessVerdict::Neutral
    }
}

/// What an access decision depended on, for upstream result caching.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CacheDependencies {
    /// Context the decision varies by (e.g. the actor's group roles).
    pub contexts: Vec<String>,
    /// Invalidation tags (e.g. the group, the permission set).
    pub tags: Vec<String>,
}

impl CacheDependencies {
    pub fn add_context(&mut self, context: impl Into<String>) {
        self.contexts.push(context.into());
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) {
        self.tags.push(tag.into());
    }

    pub fn merge(&mut self, other: CacheDependencies) {
        self.contexts.extend(other.contexts);
        self.tags.extend(other.tags);
    }
}

/// An allow/deny decision plus its cache dependencies.
#[derive(Clone, Debug)]
pub struct AccessDecision {
    pub allowed: bool,
    pub dependencies: CacheDependencies,
}

impl AccessDecision {
    fn new(allowed: bool, dependencies: CacheDependencies) -> Self {
        Self {
            allowed,
            dependencies,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.allowed
    }
}

#[derive(Debug, Error)]
pub enum AccessError {
    #[error("storage: {0}")]
    Store(#[from] StoreError),
    #[error(transparent)]
    Relationships(Box<RelationshipError>),
}

impl From<RelationshipError> for AccessError {
    fn from(e: RelationshipError) -> Self {
        AccessError::Relationships(Box::new(e))
    }
}

/// Computes access decisions for groups and their content.
pub struct GroupAccessEngine {
    store: Arc<dyn Store>,
    relationships: Arc<RelationshipStore>,
    /// Relation type whose relationships represent group membership.
    membership_relation: RelationTypeId,
    decorators: HashMap<ContentTypeId, Vec<Arc<dyn AccessDecorator>>>,
}

impl GroupAccessEngine {
    pub fn new(
        store: Arc<dyn Store>,
        relationships: Arc<RelationshipStore>,
        membership_relation: RelationTypeId,
    ) -> Self {
        Self {
            store,
            relationships,
            membership_relation,
            decorators: HashMap::new(),
        }
    }

    /// Register an access decorator for a content type. Decorators run in
    /// registration order, outermost first.
    pub fn add_decorator(
        &mut self,
        content_type_id: ContentTypeId,
        decorator: Arc<dyn AccessDecorator>,
    ) -> &mut Self {
        self.decorators
            .entry(content_type_id)
            .or_default()
            .push(decorator);
        self
    }

    /// Decide whether the actor may perform an operation against a group,
    /// optionally scoped to one content type.
    pub async fn check(
        &self,
        actor: &Actor,
        group: &GroupRef,
        operation: &str,
        content_type: Option<&ContentTypeId>,
    ) -> Result<AccessDecision, AccessError> {
        let mut dependencies = CacheDependencies::default();
        if let Some(group_id) = group.id {
            dependencies.add_tag(format!("group:{group_id}"));
        }
        dependencies.add_tag(format!(
            "group_type_permissions:{}",
            group.group_type_id
        ));

        // Relation-type decorators may settle the question outright.
        if let Some(content_type_id) = content_type {
            if let Some(chain) = self.decorators.get(content_type_id) {
                dependencies.add_tag(format!("relation_access:{content_type_id}"));
                for decorator in chain {
                    match decorator.check(operation, actor, group) {
                        AccessVerdict::Allow => {
                            debug!(%content_type_id, operation, "decorator allowed access");
                            return Ok(AccessDecision::new(true, dependencies));
                        }
                        AccessVerdict::Forbid => {
                            debug!(%content_type_id, operation, "decorator forbade access");
                            return Ok(AccessDecision::new(false, dependencies));
                        }
                        AccessVerdict::Neutral => continue,
                    }
                }
            }
        }

        // Base check: union the permissions of the actor's group roles.
        let roles = self.actor_roles(actor, group).await?;
        for role_id in &roles {
            dependencies.add_context(format!("group_role:{role_id}"));
        }

        let mut allowed = false;
        for role_id in &roles {
            match self.store.get_role(role_id).await {
                Ok(role) => {
                    if role.permissions.iter().any(|p| p == operation) {
                        allowed = true;
                        break;
                    }
                }
                // A role referenced by a membership record but since deleted
                // grants nothing.
                Err(StoreError::NotFound) => continue,
                Err(e) => return Err(e.into()),
            }
        }

        Ok(AccessDecision::new(allowed, dependencies))
    }

    /// The actor's roles for a group.
    ///
    /// Membership is a relationship under the configured membership relation
    /// type; its extra values may carry additional role IDs under `roles`.
    pub async fn actor_roles(
        &self,
        actor: &Actor,
        group: &GroupRef,
    ) -> Result<Vec<RoleId>, AccessError> {
        let entity_id = match actor {
            Actor::Anonymous => {
                return Ok(vec![BuiltinRole::Anonymous.role_id(&group.group_type_id)])
            }
            Actor::Authenticated(entity_id) => *entity_id,
        };

        let Some(group_id) = group.id else {
            // An unsaved group has no members.
            return Ok(vec![BuiltinRole::Outsider.role_id(&group.group_type_id)]);
        };

        let memberships = self
            .relationships
            .load_attachments(group_id, entity_id, &self.membership_relation)
            .await?;
        if memberships.is_empty() {
            return Ok(vec![BuiltinRole::Outsider.role_id(&group.group_type_id)]);
        }

        let mut roles = vec![BuiltinRole::Member.role_id(&group.group_type_id)];
        for membership in &memberships {
            if let Some(value) = membership.extra.get("roles") {
                if let Some(extra_roles) = value.as_array() {
                    for role in extra_roles {
                        if let Some(role_id) = role.as_str() {
                            let role_id = RoleId::from(role_id);
                            if !roles.contains(&role_id) {
                                roles.push(role_id);
                            }
                        }
                    }
                }
            }
        }
        Ok(roles)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use coterie_events_memory::MemoryEventBus;
    use coterie_store_sqlite::SqliteStore;
    use coterie_storage::{
        CreateGroupParams, CreateGroupTypeParams, ExtraValues, Group, GroupTypeId, RelationConfig,
        Role,
    };

    use crate::entity::EntityRef;
    use crate::registry::{RelationTypeDef, RelationTypeRegistry};

    fn registry() -> Arc<RelationTypeRegistry> {
        Arc::new(
            RelationTypeRegistry::builder()
                .define(RelationTypeDef {
                    id: RelationTypeId::from("membership"),
                    label: "Group membership".to_string(),
                    description: None,
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

    struct Fixture {
        store: Arc<SqliteStore>,
        relationships: Arc<RelationshipStore>,
        engine: GroupAccessEngine,
        group: Group,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(SqliteStore::open_in_memory().await.unwrap());
        let group_type = store
            .create_group_type(&CreateGroupTypeParams {
                id: GroupTypeId::from("club"),
                label: "Club".to_string(),
                description: None,
            })
            .await
            .unwrap();
        for builtin in BuiltinRole::ALL {
            store
                .create_role(&Role::builtin(builtin, &group_type.id))
                .await
                .unwrap();
        }
        store
            .set_relation_config(
                &group_type.id,
                &RelationTypeId::from("membership"),
                &RelationConfig::default(),
            )
            .await
            .unwrap();
        let group = store
            .create_group(&CreateGroupParams {
                group_type_id: group_type.id.clone(),
                label: "Chess club".to_string(),
            })
            .await
            .unwrap();

        let relationships = Arc::new(RelationshipStore::new(
            Arc::clone(&store) as Arc<dyn Store>,
            registry(),
            Arc::new(MemoryEventBus::new()),
        ));
        let engine = GroupAccessEngine::new(
            Arc::clone(&store) as Arc<dyn Store>,
            Arc::clone(&relationships),
            RelationTypeId::from("membership"),
        );
        Fixture {
            store,
            relationships,
            engine,
            group,
        }
    }

    async fn join(fixture: &Fixture, entity_id: i64, extra: ExtraValues) {
        let user = EntityRef::content("user", "user", &format!("user-{entity_id}"), EntityId(entity_id));
        let mut rel = fixture
            .relationships
            .create_for_entity_in_group(
                &user,
                &GroupRef::from(&fixture.group),
                &RelationTypeId::from("membership"),
                extra,
            )
            .await
            .unwrap();
        fixture.relationships.save(&mut rel).await.unwrap();
    }

    #[tokio::test]
    async fn anonymous_actor_gets_anonymous_role() {
        let fixture = fixture().await;
        let roles = fixture
            .engine
            .actor_roles(&Actor::Anonymous, &GroupRef::from(&fixture.group))
            .await
            .unwrap();
        assert_eq!(roles, vec![RoleId::from("club.anonymous")]);
    }

    #[tokio::test]
    async fn non_member_gets_outsider_role() {
        let fixture = fixture().await;
        let roles = fixture
            .engine
            .actor_roles(
                &Actor::Authenticated(EntityId(9)),
                &GroupRef::from(&fixture.group),
            )
            .await
            .unwrap();
        assert_eq!(roles, vec![RoleId::from("club.outsider")]);
    }

    #[tokio::test]
    async fn member_gets_member_role_plus_membership_roles() {
        let fixture = fixture().await;
        let mut extra = ExtraValues::new();
        extra.insert("roles".to_string(), serde_json::json!(["club.admin"]));
        join(&fixture, 9, extra).await;

        let roles = fixture
            .engine
            .actor_roles(
                &Actor::Authenticated(EntityId(9)),
                &GroupRef::from(&fixture.group),
            )
            .await
            .unwrap();
        assert_eq!(
            roles,
            vec![RoleId::from("club.member"), RoleId::from("club.admin")]
        );
    }

    #[tokio::test]
    async fn permission_on_member_role_grants_access() {
        let fixture = fixture().await;
        join(&fixture, 9, ExtraValues::new()).await;
        fixture
            .store
            .set_role_permissions(
                &RoleId::from("club.member"),
                &["view relationships".to_string()],
            )
            .await
            .unwrap();

        let decision = fixture
            .engine
            .check(
                &Actor::Authenticated(EntityId(9)),
                &GroupRef::from(&fixture.group),
                "view relationships",
                None,
            )
            .await
            .unwrap();
        assert!(decision.is_allowed());

        // An outsider lacks the permission.
        let decision = fixture
            .engine
            .check(
                &Actor::Authenticated(EntityId(10)),
                &GroupRef::from(&fixture.group),
                "view relationships",
                None,
            )
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn missing_role_grants_nothing() {
        let fixture = fixture().await;
        let mut extra = ExtraValues::new();
        extra.insert("roles".to_string(), serde_json::json!(["club.gone"]));
        join(&fixture, 9, extra).await;

        let decision = fixture
            .engine
            .check(
                &Actor::Authenticated(EntityId(9)),
                &GroupRef::from(&fixture.group),
                "administer group",
                None,
            )
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn decision_reports_cache_dependencies() {
        let fixture = fixture().await;
        join(&fixture, 9, ExtraValues::new()).await;

        let decision = fixture
            .engine
            .check(
                &Actor::Authenticated(EntityId(9)),
                &GroupRef::from(&fixture.group),
                "view relationships",
                None,
            )
            .await
            .unwrap();

        let deps = &decision.dependencies;
        assert!(deps
            .tags
            .iter()
            .any(|t| t == &format!("group:{}", fixture.group.id)));
        assert!(deps
            .tags
            .iter()
            .any(|t| t == "group_type_permissions:club"));
        assert!(deps
            .contexts
            .iter()
            .any(|c| c == "group_role:club.member"));
    }

    struct Always(AccessVerdict);
    impl AccessDecorator for Always {
        fn check(&self, _operation: &str, _actor: &Actor, _group: &GroupRef) -> AccessVerdict {
            self.0
        }
    }

    struct Veto {
        operation: &'static str,
    }
    impl AccessDecorator for Veto {
        fn check(&self, operation: &str, _actor: &Actor, _group: &GroupRef) -> AccessVerdict {
            if operation == self.operation {
                AccessVerdict::Forbid
            } else {
                AccessVerdict::Neutral
            }
        }
    }

    #[tokio::test]
    async fn decorator_can_veto_despite_role_permission() {
        let mut fixture = fixture().await;
        join(&fixture, 9, ExtraValues::new()).await;
        fixture
            .store
            .set_role_permissions(
                &RoleId::from("club.member"),
                &["delete relationships".to_string()],
            )
            .await
            .unwrap();

        let content_type = ContentTypeId::from("club-membership");
        fixture.engine.add_decorator(
            content_type.clone(),
            Arc::new(Veto {
                operation: "delete relationships",
            }),
        );

        let decision = fixture
            .engine
            .check(
                &Actor::Authenticated(EntityId(9)),
                &GroupRef::from(&fixture.group),
                "delete relationships",
                Some(&content_type),
            )
            .await
            .unwrap();
        assert!(!decision.is_allowed());

        // Another operation defers to the base check.
        let decision = fixture
            .engine
            .check(
                &Actor::Authenticated(EntityId(9)),
                &GroupRef::from(&fixture.group),
                "other operation",
                Some(&content_type),
            )
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }

    #[tokio::test]
    async fn decorator_can_grant_regardless_of_roles() {
        let mut fixture = fixture().await;
        let content_type = ContentTypeId::from("club-membership");
        fixture
            .engine
            .add_decorator(content_type.clone(), Arc::new(Always(AccessVerdict::Allow)));

        // Even an anonymous actor with no permissions gets through.
        let decision = fixture
            .engine
            .check(
                &Actor::Anonymous,
                &GroupRef::from(&fixture.group),
                "view relationships",
                Some(&content_type),
            )
            .await
            .unwrap();
        assert!(decision.is_allowed());
    }

    #[tokio::test]
    async fn outermost_decorator_wins() {
        let mut fixture = fixture().await;
        let content_type = ContentTypeId::from("club-membership");
        fixture
            .engine
            .add_decorator(content_type.clone(), Arc::new(Always(AccessVerdict::Forbid)));
        fixture
            .engine
            .add_decorator(content_type.clone(), Arc::new(Always(AccessVerdict::Allow)));

        let decision = fixture
            .engine
            .check(
                &Actor::Anonymous,
                &GroupRef::from(&fixture.group),
                "view relationships",
                Some(&content_type),
            )
            .await
            .unwrap();
        assert!(!decision.is_allowed());
    }
}
