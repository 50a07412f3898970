//! Group roles: the built-in triad plus the persisted role records.

use std::str::FromStr;

use super::{GroupTypeId, RoleId};

/// The three roles provisioned for every group type on creation.
///
/// `Anonymous` applies to unauthenticated actors, `Outsider` to authenticated
/// actors without a membership in the group, and `Member` to actors holding a
/// membership relationship.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuiltinRole {
    Anonymous,
    Outsider,
    Member,
}

/// Error type for parsing a BuiltinRole from string
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseBuiltinRoleError(pub String);

impl std::fmt::Display for ParseBuiltinRoleError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid built-in role: {}", self.0)
    }
}

impl std::error::Error for ParseBuiltinRoleError {}

impl FromStr for BuiltinRole {
    type Err = ParseBuiltinRoleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "anonymous" => Ok(BuiltinRole::Anonymous),
            "outsider" => Ok(BuiltinRole::Outsider),
            "member" => Ok(BuiltinRole::Member),
            _ => Err(ParseBuiltinRoleError(s.to_string())),
        }
    }
}

impl BuiltinRole {
    pub const ALL: [BuiltinRole; 3] = [
        BuiltinRole::Anonymous,
        BuiltinRole::Outsider,
        BuiltinRole::Member,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            BuiltinRole::Anonymous => "anonymous",
            BuiltinRole::Outsider => "outsider",
            BuiltinRole::Member => "member",
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            BuiltinRole::Anonymous => "Anonymous",
            BuiltinRole::Outsider => "Outsider",
            BuiltinRole::Member => "Member",
        }
    }

    /// Sort weight relative to administrator-defined roles.
    pub fn weight(&self) -> i32 {
        match self {
            BuiltinRole::Anonymous => -102,
            BuiltinRole::Outsider => -101,
            BuiltinRole::Member => -100,
        }
    }

    /// The role ID this built-in gets within a group type, e.g. `editors.member`.
    pub fn role_id(&self, group_type_id: &GroupTypeId) -> RoleId {
        RoleId(format!("{}.{}", group_type_id.0, self.as_str()))
    }
}

/// Persisted role record scoped to one group type.
#[derive(Clone, Debug)]
pub struct Role {
    pub id: RoleId,
    pub group_type_id: GroupTypeId,
    pub label: String,
    pub weight: i32,
    /// Built-in roles are internal; they cannot be deleted by administrators.
    pub internal: bool,
    /// Operation names this role grants, e.g. `view relationships`.
    pub permissions: Vec<String>,
}

impl Role {
    /// A built-in role record for a group type, starting with no permissions.
    pub fn builtin(builtin: BuiltinRole, group_type_id: &GroupTypeId) -> Self {
        Self {
            id: builtin.role_id(group_type_id),
            group_type_id: group_type_id.clone(),
            label: builtin.label().to_string(),
            weight: builtin.weight(),
            internal: true,
            permissions: Vec::new(),
        }
    }
}
