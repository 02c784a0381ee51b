use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Coarse role classification, fixed at the authentication boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Master,
    Director,
    Coordinator,
    Secretariat,
    Teacher,
    Student,
    Guardian,
}

impl Profile {
    pub fn as_str(&self) -> &'static str {
        match self {
            Profile::Master => "master",
            Profile::Director => "director",
            Profile::Coordinator => "coordinator",
            Profile::Secretariat => "secretariat",
            Profile::Teacher => "teacher",
            Profile::Student => "student",
            Profile::Guardian => "guardian",
        }
    }

    /// Student and guardian only ever see whitelisted screens.
    pub fn is_whitelist_only(&self) -> bool {
        matches!(self, Profile::Student | Profile::Guardian)
    }

    /// Canonicalize the raw profile string carried by an authenticated identity.
    ///
    /// Director, coordinator and teacher match by prefix so gendered or
    /// suffixed spellings ("Diretor(a)", "Professor(a)") collapse together;
    /// the remaining profiles match a small set of exact spellings.
    pub fn canonicalize(raw: &str, is_master: bool) -> Option<Profile> {
        if is_master {
            return Some(Profile::Master);
        }
        let p = raw.trim().to_lowercase();
        if p == "master" {
            return Some(Profile::Master);
        }
        if p.starts_with("director") || p.starts_with("diretor") {
            return Some(Profile::Director);
        }
        if p.starts_with("coordinator") || p.starts_with("coordenador") {
            return Some(Profile::Coordinator);
        }
        if p.starts_with("teacher") || p.starts_with("professor") {
            return Some(Profile::Teacher);
        }
        match p.as_str() {
            "student" | "aluno" | "aluna" | "aluno(a)" => Some(Profile::Student),
            "guardian" | "responsavel" | "responsável" => Some(Profile::Guardian),
            "secretariat" | "secretary" | "secretaria" => Some(Profile::Secretariat),
            _ => None,
        }
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Profile {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Profile::canonicalize(s, false).ok_or_else(|| format!("unrecognized profile '{}'", s))
    }
}

/// An authenticated caller with its profile already canonicalized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub profile: Profile,
}

impl Identity {
    /// Build from the raw `{user_id, profile string, master flag}` triple.
    pub fn from_raw(user_id: &str, raw_profile: &str, is_master: bool) -> Option<Self> {
        Profile::canonicalize(raw_profile, is_master).map(|profile| Self {
            user_id: user_id.to_string(),
            profile,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_variants() {
        assert_eq!(Profile::canonicalize("Diretor(a)", false), Some(Profile::Director));
        assert_eq!(Profile::canonicalize("director", false), Some(Profile::Director));
        assert_eq!(Profile::canonicalize("Coordenador(a)", false), Some(Profile::Coordinator));
        assert_eq!(Profile::canonicalize("  Professor(a) ", false), Some(Profile::Teacher));
        assert_eq!(Profile::canonicalize("teacher-assistant", false), Some(Profile::Teacher));
    }

    #[test]
    fn test_exact_variants() {
        assert_eq!(Profile::canonicalize("Aluna", false), Some(Profile::Student));
        assert_eq!(Profile::canonicalize("Aluno(a)", false), Some(Profile::Student));
        assert_eq!(Profile::canonicalize("Responsável", false), Some(Profile::Guardian));
        assert_eq!(Profile::canonicalize("Secretaria", false), Some(Profile::Secretariat));
        assert_eq!(Profile::canonicalize("students", false), None);
    }

    #[test]
    fn test_master_flag_wins() {
        assert_eq!(Profile::canonicalize("Aluno", true), Some(Profile::Master));
        assert_eq!(Profile::canonicalize("MASTER", false), Some(Profile::Master));
    }

    #[test]
    fn test_unknown_profile_rejected() {
        assert_eq!(Profile::canonicalize("janitor", false), None);
        assert!("".parse::<Profile>().is_err());
        assert!(Identity::from_raw("u1", "janitor", false).is_none());
    }

    #[test]
    fn test_serde_lowercase() {
        let json = serde_json::to_string(&Profile::Secretariat).unwrap();
        assert_eq!(json, "\"secretariat\"");
        let back: Profile = serde_json::from_str("\"guardian\"").unwrap();
        assert_eq!(back, Profile::Guardian);
    }
}
