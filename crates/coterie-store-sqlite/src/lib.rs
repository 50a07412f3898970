//! SQLite implementation of the coterie [`Store`] trait.

use chrono::{DateTime, Utc};
use sqlx::{sqlite::SqlitePoolOptions, QueryBuilder, Sqlite, SqlitePool};
use coterie_storage::{
    ContentTypeId, CreateGroupParams, CreateGroupTypeParams, EnabledRelation, EntityId, Group,
    GroupId, GroupType, GroupTypeId, RelationConfig, RelationTypeId, Relationship,
    RelationshipId, RelationshipType, Role, RoleId, Store, StoreError,
};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        Self::open("sqlite::memory:").await
    }

    pub async fn open(url: &str) -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect(url)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        MIGRATOR
            .run(&pool)
            .await
            .map_err(|e| StoreError::Backend(e.to_string()))?;

        Ok(Self { pool })
    }
}

fn backend(e: impl std::fmt::Display) -> StoreError {
    StoreError::Backend(e.to_string())
}

fn unique_or_backend(e: sqlx::Error) -> StoreError {
    let s = e.to_string();
    if s.contains("UNIQUE") {
        StoreError::AlreadyExists
    } else {
        StoreError::Backend(s)
    }
}

fn timestamp(secs: i64) -> Result<DateTime<Utc>, StoreError> {
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| StoreError::Backend(format!("invalid timestamp: {secs}")))
}

type RelationshipRow = (i64, String, i64, i64, String, String);

fn relationship_from_row(row: RelationshipRow) -> Result<Relationship, StoreError> {
    let (id, content_type, gid, entity_id, relation_type_id, extra) = row;
    Ok(Relationship {
        id: Some(RelationshipId(id)),
        content_type_id: ContentTypeId(content_type),
        group_id: GroupId(gid),
        entity_id: EntityId(entity_id),
        relation_type_id: RelationTypeId(relation_type_id),
        extra: serde_json::from_str(&extra).map_err(backend)?,
    })
}

#[async_trait::async_trait]
impl Store for SqliteStore {
    // ───────────────────────────────── Group types ─────────────────────────────────

    async fn create_group_type(
        &self,
        params: &CreateGroupTypeParams,
    ) -> Result<GroupType, StoreError> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO group_types(id,label,description,created_at,updated_at)
             VALUES(?,?,?,?,?)",
        )
        .bind(&params.id.0)
        .bind(&params.label)
        .bind(&params.description)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(unique_or_backend)?;

        Ok(GroupType {
            id: params.id.clone(),
            label: params.label.clone(),
            description: params.description.clone(),
            created_at: timestamp(now.timestamp())?,
            updated_at: timestamp(now.timestamp())?,
        })
    }

    async fn get_group_type(&self, id: &GroupTypeId) -> Result<GroupType, StoreError> {
        let row = sqlx::query_as::<_, (String, Option<String>, i64, i64)>(
            "SELECT label,description,created_at,updated_at FROM group_types WHERE id=?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((label, description, created, updated)) => Ok(GroupType {
                id: id.clone(),
                label,
                description,
                created_at: timestamp(created)?,
                updated_at: timestamp(updated)?,
            }),
        }
    }

    async fn list_group_types(&self) -> Result<Vec<GroupType>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, Option<String>, i64, i64)>(
            "SELECT id,label,description,created_at,updated_at FROM group_types ORDER BY id",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, label, description, created, updated) in rows {
            out.push(GroupType {
                id: GroupTypeId(id),
                label,
                description,
                created_at: timestamp(created)?,
                updated_at: timestamp(updated)?,
            });
        }
        Ok(out)
    }

    async fn delete_group_type(&self, id: &GroupTypeId) -> Result<(), StoreError> {
        self.get_group_type(id).await?;

        // Refuse to orphan groups of this type.
        let (group_count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM groups WHERE group_type_id=?")
                .bind(&id.0)
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;
        if group_count > 0 {
            return Err(StoreError::Conflict);
        }

        sqlx::query("DELETE FROM group_roles WHERE group_type_id=?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        sqlx::query("DELETE FROM group_type_relations WHERE group_type_id=?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        sqlx::query("DELETE FROM relationship_types WHERE group_type_id=?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        sqlx::query("DELETE FROM group_types WHERE id=?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;
        Ok(())
    }

    // ─────────────────────────── Enabled relation configs ──────────────────────────

    async fn set_relation_config(
        &self,
        group_type_id: &GroupTypeId,
        relation_type_id: &RelationTypeId,
        config: &RelationConfig,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO group_type_relations
                 (group_type_id,relation_type_id,group_cardinality,entity_cardinality,use_creation_wizard)
             VALUES(?,?,?,?,?)
             ON CONFLICT(group_type_id,relation_type_id)
             DO UPDATE SET group_cardinality=excluded.group_cardinality,
                           entity_cardinality=excluded.entity_cardinality,
                           use_creation_wizard=excluded.use_creation_wizard",
        )
        .bind(&group_type_id.0)
        .bind(&relation_type_id.0)
        .bind(config.group_cardinality as i64)
        .bind(config.entity_cardinality as i64)
        .bind(config.use_creation_wizard as i64)
        .execute(&self.pool)
        .await
        .map_err(backend)?;
        Ok(())
    }

    async fn get_relation_config(
        &self,
        group_type_id: &GroupTypeId,
        relation_type_id: &RelationTypeId,
    ) -> Result<RelationConfig, StoreError> {
        let row = sqlx::query_as::<_, (i64, i64, i64)>(
            "SELECT group_cardinality,entity_cardinality,use_creation_wizard
             FROM group_type_relations WHERE group_type_id=? AND relation_type_id=?",
        )
        .bind(&group_type_id.0)
        .bind(&relation_type_id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((group, entity, wizard)) => Ok(RelationConfig {
                group_cardinality: group as u32,
                entity_cardinality: entity as u32,
                use_creation_wizard: wizard != 0,
            }),
        }
    }

    async fn list_relation_configs(
        &self,
        group_type_id: &GroupTypeId,
    ) -> Result<Vec<EnabledRelation>, StoreError> {
        let rows = sqlx::query_as::<_, (String, i64, i64, i64)>(
            "SELECT relation_type_id,group_cardinality,entity_cardinality,use_creation_wizard
             FROM group_type_relations WHERE group_type_id=? ORDER BY relation_type_id",
        )
        .bind(&group_type_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|(relation_type_id, group, entity, wizard)| EnabledRelation {
                group_type_id: group_type_id.clone(),
                relation_type_id: RelationTypeId(relation_type_id),
                config: RelationConfig {
                    group_cardinality: group as u32,
                    entity_cardinality: entity as u32,
                    use_creation_wizard: wizard != 0,
                },
            })
            .collect())
    }

    async fn remove_relation_config(
        &self,
        group_type_id: &GroupTypeId,
        relation_type_id: &RelationTypeId,
    ) -> Result<(), StoreError> {
        let result = sqlx::query(
            "DELETE FROM group_type_relations WHERE group_type_id=? AND relation_type_id=?",
        )
        .bind(&group_type_id.0)
        .bind(&relation_type_id.0)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ──────────────────────────────────── Roles ────────────────────────────────────

    async fn create_role(&self, role: &Role) -> Result<(), StoreError> {
        let permissions = serde_json::to_string(&role.permissions).map_err(backend)?;
        sqlx::query(
            "INSERT INTO group_roles(id,group_type_id,label,weight,internal,permissions)
             VALUES(?,?,?,?,?,?)",
        )
        .bind(&role.id.0)
        .bind(&role.group_type_id.0)
        .bind(&role.label)
        .bind(role.weight as i64)
        .bind(role.internal as i64)
        .bind(permissions)
        .execute(&self.pool)
        .await
        .map_err(unique_or_backend)?;
        Ok(())
    }

    async fn get_role(&self, id: &RoleId) -> Result<Role, StoreError> {
        let row = sqlx::query_as::<_, (String, String, i64, i64, String)>(
            "SELECT group_type_id,label,weight,internal,permissions FROM group_roles WHERE id=?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((group_type_id, label, weight, internal, permissions)) => Ok(Role {
                id: id.clone(),
                group_type_id: GroupTypeId(group_type_id),
                label,
                weight: weight as i32,
                internal: internal != 0,
                permissions: serde_json::from_str(&permissions).map_err(backend)?,
            }),
        }
    }

    async fn list_roles(&self, group_type_id: &GroupTypeId) -> Result<Vec<Role>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, i64, i64, String)>(
            "SELECT id,label,weight,internal,permissions FROM group_roles
             WHERE group_type_id=? ORDER BY weight,id",
        )
        .bind(&group_type_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        let mut out = Vec::with_capacity(rows.len());
        for (id, label, weight, internal, permissions) in rows {
            out.push(Role {
                id: RoleId(id),
                group_type_id: group_type_id.clone(),
                label,
                weight: weight as i32,
                internal: internal != 0,
                permissions: serde_json::from_str(&permissions).map_err(backend)?,
            });
        }
        Ok(out)
    }

    async fn set_role_permissions(
        &self,
        id: &RoleId,
        permissions: &[String],
    ) -> Result<(), StoreError> {
        let json = serde_json::to_string(permissions).map_err(backend)?;
        let result = sqlx::query("UPDATE group_roles SET permissions=? WHERE id=?")
            .bind(json)
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    // ─────────────────────────────────── Groups ────────────────────────────────────

    async fn create_group(&self, params: &CreateGroupParams) -> Result<Group, StoreError> {
        // A group may only reference an existing type.
        self.get_group_type(&params.group_type_id).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "INSERT INTO groups(group_type_id,label,created_at,updated_at) VALUES(?,?,?,?)",
        )
        .bind(&params.group_type_id.0)
        .bind(&params.label)
        .bind(now.timestamp())
        .bind(now.timestamp())
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(Group {
            id: GroupId(result.last_insert_rowid()),
            group_type_id: params.group_type_id.clone(),
            label: params.label.clone(),
            created_at: timestamp(now.timestamp())?,
            updated_at: timestamp(now.timestamp())?,
        })
    }

    async fn get_group(&self, id: GroupId) -> Result<Group, StoreError> {
        let row = sqlx::query_as::<_, (String, String, i64, i64)>(
            "SELECT group_type_id,label,created_at,updated_at FROM groups WHERE id=?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((group_type_id, label, created, updated)) => Ok(Group {
                id,
                group_type_id: GroupTypeId(group_type_id),
                label,
                created_at: timestamp(created)?,
                updated_at: timestamp(updated)?,
            }),
        }
    }

    // ──────────────────────────── Relationship types ───────────────────────────────

    async fn create_relationship_type(
        &self,
        relationship_type: &RelationshipType,
    ) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO relationship_types(id,group_type_id,relation_type_id,label,description)
             VALUES(?,?,?,?,?)",
        )
        .bind(&relationship_type.id.0)
        .bind(&relationship_type.group_type_id.0)
        .bind(&relationship_type.relation_type_id.0)
        .bind(&relationship_type.label)
        .bind(&relationship_type.description)
        .execute(&self.pool)
        .await
        .map_err(unique_or_backend)?;
        Ok(())
    }

    async fn get_relationship_type(
        &self,
        id: &ContentTypeId,
    ) -> Result<RelationshipType, StoreError> {
        let row = sqlx::query_as::<_, (String, String, String, Option<String>)>(
            "SELECT group_type_id,relation_type_id,label,description
             FROM relationship_types WHERE id=?",
        )
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            None => Err(StoreError::NotFound),
            Some((group_type_id, relation_type_id, label, description)) => Ok(RelationshipType {
                id: id.clone(),
                group_type_id: GroupTypeId(group_type_id),
                relation_type_id: RelationTypeId(relation_type_id),
                label,
                description,
            }),
        }
    }

    async fn delete_relationship_type(&self, id: &ContentTypeId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM relationship_types WHERE id=?")
            .bind(&id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn list_relationship_types_by_relation_type(
        &self,
        relation_type_id: &RelationTypeId,
    ) -> Result<Vec<RelationshipType>, StoreError> {
        let rows = sqlx::query_as::<_, (String, String, String, Option<String>)>(
            "SELECT id,group_type_id,label,description FROM relationship_types
             WHERE relation_type_id=? ORDER BY id",
        )
        .bind(&relation_type_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        Ok(rows
            .into_iter()
            .map(|(id, group_type_id, label, description)| RelationshipType {
                id: ContentTypeId(id),
                group_type_id: GroupTypeId(group_type_id),
                relation_type_id: relation_type_id.clone(),
                label,
                description,
            })
            .collect())
    }

    // ───────────────────────────────  Relationships ────────────────────────────────

    async fn insert_relationship(
        &self,
        relationship: &Relationship,
    ) -> Result<RelationshipId, StoreError> {
        if relationship.id.is_some() {
            return Err(StoreError::Backend(
                "cannot insert an already-saved relationship".into(),
            ));
        }

        let extra = serde_json::to_string(&relationship.extra).map_err(backend)?;
        let result = sqlx::query(
            "INSERT INTO relationships(type,gid,entity_id,relation_type_id,extra)
             VALUES(?,?,?,?,?)",
        )
        .bind(&relationship.content_type_id.0)
        .bind(relationship.group_id.0)
        .bind(relationship.entity_id.0)
        .bind(&relationship.relation_type_id.0)
        .bind(extra)
        .execute(&self.pool)
        .await
        .map_err(backend)?;

        Ok(RelationshipId(result.last_insert_rowid()))
    }

    async fn update_relationship(&self, relationship: &Relationship) -> Result<(), StoreError> {
        let id = relationship
            .id
            .ok_or_else(|| StoreError::Backend("cannot update an unsaved relationship".into()))?;

        let extra = serde_json::to_string(&relationship.extra).map_err(backend)?;
        let result = sqlx::query("UPDATE relationships SET extra=? WHERE id=?")
            .bind(extra)
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn delete_relationship(&self, id: RelationshipId) -> Result<(), StoreError> {
        let result = sqlx::query("DELETE FROM relationships WHERE id=?")
            .bind(id.0)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        if result.rows_affected() == 0 {
            return Err(StoreError::NotFound);
        }
        Ok(())
    }

    async fn get_relationship(&self, id: RelationshipId) -> Result<Relationship, StoreError> {
        let row = sqlx::query_as::<_, RelationshipRow>(
            "SELECT id,type,gid,entity_id,relation_type_id,extra FROM relationships WHERE id=?",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await
        .map_err(backend)?;

        match row {
            None => Err(StoreError::NotFound),
            Some(row) => relationship_from_row(row),
        }
    }

    async fn get_relationships(
        &self,
        ids: &[RelationshipId],
    ) -> Result<Vec<Relationship>, StoreError> {
        if ids.is_empty() {
            return Ok(vec![]);
        }

        let mut builder: QueryBuilder<Sqlite> = QueryBuilder::new(
            "SELECT id,type,gid,entity_id,relation_type_id,extra FROM relationships WHERE id IN (",
        );
        let mut separated = builder.separated(",");
        for id in ids {
            separated.push_bind(id.0);
        }
        builder.push(") ORDER BY id");

        let rows = builder
            .build_query_as::<RelationshipRow>()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        rows.into_iter().map(relationship_from_row).collect()
    }

    async fn relationship_ids_by_group(
        &self,
        group_id: GroupId,
        relation_type_id: Option<RelationTypeId>,
    ) -> Result<Vec<RelationshipId>, StoreError> {
        let rows: Vec<(i64,)> = match relation_type_id {
            Some(relation_type_id) => sqlx::query_as(
                "SELECT id FROM relationships WHERE gid=? AND relation_type_id=? ORDER BY id",
            )
            .bind(group_id.0)
            .bind(&relation_type_id.0)
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?,
            None => sqlx::query_as("SELECT id FROM relationships WHERE gid=? ORDER BY id")
                .bind(group_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?,
        };

        Ok(rows.into_iter().map(|(id,)| RelationshipId(id)).collect())
    }

    async fn relationship_ids_by_entity(
        &self,
        entity_id: EntityId,
        relation_type_ids: &[RelationTypeId],
    ) -> Result<Vec<RelationshipId>, StoreError> {
        if relation_type_ids.is_empty() {
            return Ok(vec![]);
        }

        let mut builder: QueryBuilder<Sqlite> =
            QueryBuilder::new("SELECT id FROM relationships WHERE entity_id=");
        builder.push_bind(entity_id.0);
        builder.push(" AND relation_type_id IN (");
        let mut separated = builder.separated(",");
        for relation_type_id in relation_type_ids {
            separated.push_bind(&relation_type_id.0);
        }
        builder.push(") ORDER BY id");

        let rows: Vec<(i64,)> = builder
            .build_query_as()
            .fetch_all(&self.pool)
            .await
            .map_err(backend)?;

        Ok(rows.into_iter().map(|(id,)| RelationshipId(id)).collect())
    }

    async fn relationship_ids_by_relation_type(
        &self,
        relation_type_id: &RelationTypeId,
    ) -> Result<Vec<RelationshipId>, StoreError> {
        let rows: Vec<(i64,)> =
            sqlx::query_as("SELECT id FROM relationships WHERE relation_type_id=? ORDER BY id")
                .bind(&relation_type_id.0)
                .fetch_all(&self.pool)
                .await
                .map_err(backend)?;

        Ok(rows.into_iter().map(|(id,)| RelationshipId(id)).collect())
    }

    async fn list_by_content_type_and_entity(
        &self,
        content_type_id: &ContentTypeId,
        entity_id: EntityId,
    ) -> Result<Vec<Relationship>, StoreError> {
        let rows = sqlx::query_as::<_, RelationshipRow>(
            "SELECT id,type,gid,entity_id,relation_type_id,extra FROM relationships
             WHERE type=? AND entity_id=? ORDER BY id",
        )
        .bind(&content_type_id.0)
        .bind(entity_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(relationship_from_row).collect()
    }

    async fn list_by_group_entity_relation(
        &self,
        group_id: GroupId,
        entity_id: EntityId,
        relation_type_id: &RelationTypeId,
    ) -> Result<Vec<Relationship>, StoreError> {
        let rows = sqlx::query_as::<_, RelationshipRow>(
            "SELECT id,type,gid,entity_id,relation_type_id,extra FROM relationships
             WHERE gid=? AND entity_id=? AND relation_type_id=? ORDER BY id",
        )
        .bind(group_id.0)
        .bind(entity_id.0)
        .bind(&relation_type_id.0)
        .fetch_all(&self.pool)
        .await
        .map_err(backend)?;

        rows.into_iter().map(relationship_from_row).collect()
    }

    // ─────────────────────────── Config-entity wrappers ────────────────────────────

    async fn wrap_config_entity(
        &self,
        entity_type_id: &str,
        config_key: &str,
    ) -> Result<EntityId, StoreError> {
        sqlx::query("INSERT OR IGNORE INTO config_wrappers(entity_type_id,config_key) VALUES(?,?)")
            .bind(entity_type_id)
            .bind(config_key)
            .execute(&self.pool)
            .await
            .map_err(backend)?;

        let (id,): (i64,) =
            sqlx::query_as("SELECT id FROM config_wrappers WHERE entity_type_id=? AND config_key=?")
                .bind(entity_type_id)
                .bind(config_key)
                .fetch_one(&self.pool)
                .await
                .map_err(backend)?;

        Ok(EntityId(id))
    }
}
