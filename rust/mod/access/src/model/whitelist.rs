use serde::{Deserialize, Serialize};

use super::operation::Operations;
use super::profile::Profile;

/// Screen operations open to every user of a whitelist-only profile.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WhitelistEntry {
    pub profile: Profile,
    pub screen_id: String,
    pub operations: Operations,
    pub updated_at: String,
}

/// Input for setting a whitelist entry.
#[derive(Debug, Clone, Deserialize)]
pub struct PutWhitelistEntry {
    pub operations: Operations,
}
