use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use super::operation::Operation;

/// Which precedence tier produced a decision. Diagnostic only: it goes to
/// logs and service callers, never into an end-user message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DecisionSource {
    Master,
    Whitelist,
    WhitelistDeny,
    Override,
    Group,
    ProfileDefault,
    RestrictedScreen,
    Default,
}

impl DecisionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            DecisionSource::Master => "master",
            DecisionSource::Whitelist => "whitelist",
            DecisionSource::WhitelistDeny => "whitelistDeny",
            DecisionSource::Override => "override",
            DecisionSource::Group => "group",
            DecisionSource::ProfileDefault => "profileDefault",
            DecisionSource::RestrictedScreen => "restrictedScreen",
            DecisionSource::Default => "default",
        }
    }
}

impl fmt::Display for DecisionSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of a permission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Decision {
    pub allowed: bool,
    pub source: DecisionSource,
}

impl Decision {
    pub fn allow(source: DecisionSource) -> Self {
        Self { allowed: true, source }
    }

    pub fn deny(source: DecisionSource) -> Self {
        Self { allowed: false, source }
    }
}

/// Query parameters for `/access/check`.
#[derive(Debug, Clone, Deserialize)]
pub struct CheckParams {
    pub screen: String,
    pub operation: Operation,
}

/// Screen path → operation → allowed.
pub type PermissionMatrix = BTreeMap<String, BTreeMap<Operation, bool>>;

/// Everything a user may do, for driving UI visibility.
///
/// Master gets the `All` sentinel instead of a materialized matrix.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "scope", content = "screens", rename_all = "lowercase")]
pub enum EffectivePermissions {
    All,
    Screens(PermissionMatrix),
}

impl EffectivePermissions {
    pub fn allows(&self, path: &str, op: Operation) -> bool {
        match self {
            EffectivePermissions::All => true,
            EffectivePermissions::Screens(matrix) => matrix
                .get(path)
                .and_then(|ops| ops.get(&op))
                .copied()
                .unwrap_or(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_tags() {
        assert_eq!(
            serde_json::to_value(Decision::deny(DecisionSource::WhitelistDeny)).unwrap(),
            serde_json::json!({"allowed": false, "source": "whitelistDeny"})
        );
        assert_eq!(DecisionSource::ProfileDefault.to_string(), "profileDefault");
    }

    #[test]
    fn test_effective_serialization() {
        assert_eq!(
            serde_json::to_value(EffectivePermissions::All).unwrap(),
            serde_json::json!({"scope": "all"})
        );

        let mut matrix = PermissionMatrix::new();
        matrix.insert(
            "/grades".to_string(),
            [(Operation::View, true), (Operation::Delete, false)].into_iter().collect(),
        );
        let eff = EffectivePermissions::Screens(matrix);
        assert_eq!(
            serde_json::to_value(&eff).unwrap(),
            serde_json::json!({"scope": "screens", "screens": {"/grades": {"view": true, "delete": false}}})
        );
        assert!(eff.allows("/grades", Operation::View));
        assert!(!eff.allows("/grades", Operation::Delete));
        assert!(!eff.allows("/missing", Operation::View));
    }
}
