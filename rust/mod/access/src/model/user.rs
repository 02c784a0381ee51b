use serde::{Deserialize, Serialize};

use super::profile::Profile;

/// Profile directory entry mirrored from the authentication layer.
///
/// Only the canonical profile matters here; it decides who may receive
/// overrides and who may sit in groups holding teacher-only grants.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,

    pub profile: Profile,

    pub created_at: String,
    pub updated_at: String,
}

/// Input for registering (or re-profiling) a user.
#[derive(Debug, Clone, Deserialize)]
pub struct RegisterUser {
    #[serde(default)]
    pub name: Option<String>,
    pub profile: Profile,
}
