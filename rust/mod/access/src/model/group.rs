use serde::{Deserialize, Serialize};

use super::operation::Operations;
use super::screen::default_true;

/// An administrator-defined collection of users sharing per-screen grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Group {
    /// Unique identifier (UUIDv4, no dashes).
    pub id: String,

    /// Unique group name.
    pub name: String,

    /// Inactive groups no longer contribute grants.
    #[serde(default = "default_true")]
    pub active: bool,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

/// Input for creating a new group.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateGroup {
    pub name: String,
}

/// A membership record linking a user to a group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupMember {
    pub group_id: String,
    pub user_id: String,
    /// RFC 3339 timestamp when the membership was added.
    pub added_at: String,
}

/// Input for adding a member to a group.
#[derive(Debug, Clone, Deserialize)]
pub struct AddGroupMember {
    pub user_id: String,
}

/// Operations a group holds on one screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupGrant {
    pub group_id: String,
    pub screen_id: String,
    pub operations: Operations,
    pub created_at: String,
    pub updated_at: String,
}

/// Input for setting a group's operations on a screen.
#[derive(Debug, Clone, Deserialize)]
pub struct PutGroupGrant {
    pub screen_id: String,
    pub operations: Operations,
}
