//! Server-side configuration, loaded from a TOML file.
//!
//! ```toml
//! [storage]
//! data_dir = "/var/lib/gatehouse"
//!
//! [access]
//! admin_screen = "/config/acessos"
//! whole_day_end = true
//! timezone = "America/Sao_Paulo"
//!
//! [[screens]]
//! name = "Home"
//! path = "/home"
//!
//! [[whitelist]]
//! profile = "student"
//! path = "/home"
//! operations = ["view"]
//! ```

use std::path::{Path, PathBuf};

use chrono_tz::Tz;
use serde::Deserialize;

use access::model::Operation;

/// Full server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub storage: StorageConfig,

    #[serde(default)]
    pub access: AccessSection,

    /// Screens registered at start-up when missing.
    #[serde(default)]
    pub screens: Vec<ScreenSeed>,

    /// Whitelist entries written at start-up when missing.
    #[serde(default)]
    pub whitelist: Vec<WhitelistSeed>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub data_dir: String,

    /// Overrides `{data_dir}/gatehouse.sqlite`.
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccessSection {
    #[serde(default = "default_admin_screen")]
    pub admin_screen: String,

    #[serde(default = "default_true")]
    pub whole_day_end: bool,

    /// IANA zone for wall-clock override bounds and the whole-day rule.
    #[serde(default = "default_timezone")]
    pub timezone: Tz,
}

impl Default for AccessSection {
    fn default() -> Self {
        Self {
            admin_screen: default_admin_screen(),
            whole_day_end: true,
            timezone: default_timezone(),
        }
    }
}

fn default_admin_screen() -> String {
    "/config/acessos".to_string()
}

fn default_timezone() -> Tz {
    chrono_tz::America::Sao_Paulo
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScreenSeed {
    pub name: String,
    pub path: String,
    #[serde(default)]
    pub teacher_only: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct WhitelistSeed {
    /// Raw profile string; canonicalized at bootstrap.
    pub profile: String,
    pub path: String,
    pub operations: Vec<Operation>,
}

impl ServerConfig {
    /// Resolve a context name or file path to a config file path.
    ///
    /// A bare name maps to `/etc/gatehouse/<name>.toml`; anything with a
    /// `/` or `.` is used as given.
    pub fn resolve_path(name_or_path: &str) -> PathBuf {
        if name_or_path.contains('/') || name_or_path.contains('.') {
            PathBuf::from(name_or_path)
        } else {
            PathBuf::from(format!("/etc/gatehouse/{}.toml", name_or_path))
        }
    }

    /// Load and parse a config file.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {}", path.display(), e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Access service settings taken from the `[access]` section.
    pub fn access_config(&self) -> access::service::AccessConfig {
        access::service::AccessConfig {
            admin_screen: self.access.admin_screen.clone(),
            whole_day_end: self.access.whole_day_end,
            timezone: self.access.timezone,
        }
    }
}
