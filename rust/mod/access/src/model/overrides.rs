use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use chrono_tz::Tz;
use serde::{Deserialize, Deserializer, Serialize};

use super::operation::Operations;

/// Lifecycle state of an override. EXPIRED and REVOKED are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OverrideStatus {
    Active,
    Expired,
    Revoked,
}

impl OverrideStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OverrideStatus::Active => "ACTIVE",
            OverrideStatus::Expired => "EXPIRED",
            OverrideStatus::Revoked => "REVOKED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, OverrideStatus::Active)
    }
}

impl fmt::Display for OverrideStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OverrideStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ACTIVE" => Ok(OverrideStatus::Active),
            "EXPIRED" => Ok(OverrideStatus::Expired),
            "REVOKED" => Ok(OverrideStatus::Revoked),
            other => Err(format!("unknown override status '{}'", other)),
        }
    }
}

/// A user- and screen-scoped, time-bounded exception that outranks group
/// grants and profile defaults.
///
/// Keys present in `operations` are authoritative in both directions while
/// the override is in effect; absent keys fall through to the next tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Override {
    pub id: String,
    pub user_id: String,
    pub screen_id: String,
    pub operations: Operations,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: OverrideStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl Override {
    /// ACTIVE and `now` inside the closed window.
    pub fn is_in_effect(&self, now: DateTime<Utc>) -> bool {
        self.status == OverrideStatus::Active && self.starts_at <= now && now <= self.ends_at
    }

    /// ACTIVE but the window has already closed; due for expiry.
    pub fn is_elapsed(&self, now: DateTime<Utc>) -> bool {
        self.status == OverrideStatus::Active && now > self.ends_at
    }

    /// Closed-interval intersection with `[starts_at, ends_at]`.
    pub fn overlaps(&self, starts_at: DateTime<Utc>, ends_at: DateTime<Utc>) -> bool {
        self.ends_at >= starts_at && self.starts_at <= ends_at
    }
}

/// One bound of a requested override window.
///
/// Either an RFC 3339 instant, or a wall-clock time without offset (what an
/// HTML `datetime-local` input sends) that is read in the service's zone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowTime {
    Instant(DateTime<FixedOffset>),
    Local(NaiveDateTime),
}

const LOCAL_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

impl WindowTime {
    /// Pin the bound to an instant, reading wall-clock times in `tz`.
    ///
    /// `None` for a wall-clock time skipped by a daylight-saving jump.
    pub fn resolve(&self, tz: Tz) -> Option<DateTime<Utc>> {
        match self {
            WindowTime::Instant(t) => Some(t.with_timezone(&Utc)),
            WindowTime::Local(naive) => tz
                .from_local_datetime(naive)
                .earliest()
                .map(|t| t.with_timezone(&Utc)),
        }
    }
}

impl From<DateTime<Utc>> for WindowTime {
    fn from(t: DateTime<Utc>) -> Self {
        WindowTime::Instant(t.into())
    }
}

impl fmt::Display for WindowTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WindowTime::Instant(t) => write!(f, "{}", t.to_rfc3339()),
            WindowTime::Local(naive) => write!(f, "{}", naive.format("%Y-%m-%dT%H:%M:%S")),
        }
    }
}

impl FromStr for WindowTime {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Ok(t) = DateTime::parse_from_rfc3339(s) {
            return Ok(WindowTime::Instant(t));
        }
        LOCAL_FORMATS
            .iter()
            .find_map(|layout| NaiveDateTime::parse_from_str(s, layout).ok())
            .map(WindowTime::Local)
            .ok_or_else(|| format!("invalid date-time '{}'", s))
    }
}

impl<'de> Deserialize<'de> for WindowTime {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Input for granting an override to a user.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateOverride {
    pub screen_id: String,
    pub operations: Operations,
    pub starts_at: WindowTime,
    pub ends_at: WindowTime,
}

/// Filters for listing a user's overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct OverrideQuery {
    /// Only ACTIVE rows whose window contains now.
    #[serde(default)]
    pub active: bool,

    #[serde(default)]
    pub screen_id: Option<String>,
}

/// An override joined with the path of its screen.
#[derive(Debug, Clone, Serialize)]
pub struct OverrideListing {
    #[serde(flatten)]
    pub entry: Override,
    pub screen_path: String,
}

/// Delimited text layouts for override history exports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExportFormat {
    #[default]
    Csv,
    Tsv,
}

impl ExportFormat {
    pub fn delimiter(&self) -> char {
        match self {
            ExportFormat::Csv => ',',
            ExportFormat::Tsv => '\t',
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "text/csv; charset=utf-8",
            ExportFormat::Tsv => "text/tab-separated-values; charset=utf-8",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Csv => "csv",
            ExportFormat::Tsv => "tsv",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(ExportFormat::Csv),
            "tsv" => Ok(ExportFormat::Tsv),
            other => Err(format!("unsupported export format '{}'", other)),
        }
    }
}
