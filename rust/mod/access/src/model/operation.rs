use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};

/// An action checked independently on every screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum Operation {
    View,
    Create,
    Update,
    Delete,
    Export,
}

impl Operation {
    /// Every operation, in matrix column order.
    pub const ALL: [Operation; 5] = [
        Operation::View,
        Operation::Create,
        Operation::Update,
        Operation::Delete,
        Operation::Export,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::View => "view",
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::Delete => "delete",
            Operation::Export => "export",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "view" => Ok(Operation::View),
            "create" => Ok(Operation::Create),
            "update" => Ok(Operation::Update),
            "delete" => Ok(Operation::Delete),
            "export" => Ok(Operation::Export),
            other => Err(format!("unknown operation '{}'", other)),
        }
    }
}

/// Per-operation flags attached to a grant, whitelist entry or override.
///
/// A missing key means "not granted" for grants and whitelist entries, and
/// "no opinion" for overrides. Stored JSON may carry keys this build does not
/// know; they are dropped on load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Operations(BTreeMap<Operation, bool>);

impl Operations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, op: Operation, value: bool) -> Self {
        self.0.insert(op, value);
        self
    }

    pub fn set(&mut self, op: Operation, value: bool) {
        self.0.insert(op, value);
    }

    /// The explicit value for `op`, if the map carries one.
    pub fn get(&self, op: Operation) -> Option<bool> {
        self.0.get(&op).copied()
    }

    /// True only when `op` is present and set.
    pub fn allows(&self, op: Operation) -> bool {
        self.get(op).unwrap_or(false)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Operation, bool)> + '_ {
        self.0.iter().map(|(op, v)| (*op, *v))
    }

    /// Render as `view=true;update=false` for delimited exports.
    pub fn to_compact(&self) -> String {
        self.iter()
            .map(|(op, v)| format!("{}={}", op, v))
            .collect::<Vec<_>>()
            .join(";")
    }
}

impl FromIterator<(Operation, bool)> for Operations {
    fn from_iter<I: IntoIterator<Item = (Operation, bool)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for Operations {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, bool>::deserialize(deserializer)?;
        Ok(raw
            .into_iter()
            .filter_map(|(key, value)| key.parse::<Operation>().ok().map(|op| (op, value)))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_key_is_not_granted() {
        let ops = Operations::new().with(Operation::View, true);
        assert!(ops.allows(Operation::View));
        assert!(!ops.allows(Operation::Delete));
        assert_eq!(ops.get(Operation::Delete), None);
    }

    #[test]
    fn test_explicit_false_is_present() {
        let ops = Operations::new().with(Operation::Update, false);
        assert_eq!(ops.get(Operation::Update), Some(false));
        assert!(!ops.allows(Operation::Update));
    }

    #[test]
    fn test_unknown_keys_are_dropped() {
        let ops: Operations =
            serde_json::from_str(r#"{"view": true, "approve": true, "EXPORT": false}"#).unwrap();
        assert_eq!(ops.get(Operation::View), Some(true));
        assert_eq!(ops.get(Operation::Export), Some(false));
        assert_eq!(ops.iter().count(), 2);
    }

    #[test]
    fn test_serializes_as_plain_map() {
        let ops = Operations::new()
            .with(Operation::View, true)
            .with(Operation::Delete, false);
        let json = serde_json::to_value(&ops).unwrap();
        assert_eq!(json, serde_json::json!({"view": true, "delete": false}));
    }

    #[test]
    fn test_compact_rendering() {
        let ops = Operations::new()
            .with(Operation::Update, false)
            .with(Operation::View, true);
        assert_eq!(ops.to_compact(), "view=true;update=false");
    }

    #[test]
    fn test_parse_operation() {
        assert_eq!(" View ".parse::<Operation>().unwrap(), Operation::View);
        assert!("approve".parse::<Operation>().is_err());
    }
}
