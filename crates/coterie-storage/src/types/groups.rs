//! Group records.

use chrono::{DateTime, Utc};

use super::{GroupId, GroupTypeId};

/// Persisted group record.
#[derive(Clone, Debug)]
pub struct Group {
    pub id: GroupId,
    pub group_type_id: GroupTypeId,
    pub label: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Parameters for creating a group
#[derive(Clone, Debug)]
pub struct CreateGroupParams {
    pub group_type_id: GroupTypeId,
    pub label: String,
}
