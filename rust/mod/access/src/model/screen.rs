use serde::{Deserialize, Serialize};

/// A path-addressable application surface subject to permission checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Screen {
    /// Unique identifier (UUIDv4, no dashes).
    pub id: String,

    /// Unique display name.
    pub name: String,

    /// Unique frontend route, e.g. "/cadastro/turmas".
    pub path: String,

    /// Secretariat may never reach this screen.
    #[serde(default)]
    pub teacher_only: bool,

    /// Inactive screens are invisible to the resolver but keep their grants.
    #[serde(default = "default_true")]
    pub active: bool,

    /// RFC 3339 creation timestamp.
    pub created_at: String,

    /// RFC 3339 last update timestamp.
    pub updated_at: String,
}

pub(crate) fn default_true() -> bool {
    true
}

/// Input for registering a screen.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateScreen {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub teacher_only: bool,
}

/// Query for listing screens.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScreenQuery {
    /// Include deactivated screens.
    #[serde(default)]
    pub include_inactive: bool,
}
