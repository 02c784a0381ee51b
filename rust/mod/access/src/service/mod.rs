pub mod schema;
pub mod screen;
pub mod group;
pub mod whitelist;
pub mod user;
pub mod overrides;
pub mod resolve;
pub mod export;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use gatehouse_sql::{SQLError, SQLExec, SQLStore, Value};

use crate::model::{DecisionSource, Profile};

/// Access service error type.
#[derive(Debug, Error)]
pub enum AccessError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("validation: {0}")]
    Validation(String),

    #[error("invalid period: starts_at {starts_at} is after ends_at {ends_at}")]
    InvalidPeriod {
        starts_at: DateTime<Utc>,
        ends_at: DateTime<Utc>,
    },

    #[error("overlapping period: {0}")]
    OverlappingPeriod(String),

    #[error("restricted screen: {0}")]
    RestrictedScreen(String),

    #[error("profile '{0}' only receives whitelist access, not overrides")]
    IneligibleProfile(Profile),

    /// The resolver refused. The source is kept for audit logs only.
    #[error("permission denied")]
    Denied(DecisionSource),

    #[error("storage: {0}")]
    Storage(String),

    #[error("internal: {0}")]
    Internal(String),
}

/// Message raised by the overrides insert trigger; see `schema`.
pub(crate) const OVERLAP_TRIGGER_MESSAGE: &str = "overlapping active override";

impl From<SQLError> for AccessError {
    fn from(e: SQLError) -> Self {
        let msg = e.to_string();
        if msg.contains(OVERLAP_TRIGGER_MESSAGE) {
            AccessError::OverlappingPeriod(OVERLAP_TRIGGER_MESSAGE.to_string())
        } else if msg.contains("UNIQUE constraint") {
            AccessError::Conflict(msg)
        } else {
            AccessError::Storage(msg)
        }
    }
}

impl From<AccessError> for gatehouse_core::ServiceError {
    fn from(e: AccessError) -> Self {
        use gatehouse_core::ServiceError;
        match e {
            AccessError::NotFound(m) => ServiceError::NotFound(m),
            AccessError::Conflict(m) => ServiceError::Conflict(m),
            AccessError::Validation(m) => ServiceError::Validation(m),
            e @ AccessError::InvalidPeriod { .. } => ServiceError::InvalidPeriod(e.to_string()),
            AccessError::OverlappingPeriod(m) => ServiceError::OverlappingPeriod(m),
            AccessError::RestrictedScreen(m) => ServiceError::RestrictedScreen(m),
            e @ AccessError::IneligibleProfile(_) => ServiceError::Validation(e.to_string()),
            AccessError::Denied(_) => ServiceError::PermissionDenied("permission denied".into()),
            AccessError::Storage(m) => ServiceError::Storage(m),
            AccessError::Internal(m) => ServiceError::Internal(m),
        }
    }
}

/// Configuration for the access service.
#[derive(Debug, Clone)]
pub struct AccessConfig {
    /// Screen path guarding the administrative API itself.
    pub admin_screen: String,
    /// Widen an override `ends_at` of exactly 00:00:00 to 23:59:59 that day.
    pub whole_day_end: bool,
    /// Zone that offset-less override bounds are read in, and in which the
    /// whole-day rule looks for midnight.
    pub timezone: Tz,
}

impl Default for AccessConfig {
    fn default() -> Self {
        Self {
            admin_screen: "/config/acessos".to_string(),
            whole_day_end: true,
            timezone: chrono_tz::America::Sao_Paulo,
        }
    }
}

/// The access service. Holds the permission store and configuration.
pub struct AccessService {
    pub(crate) sql: Arc<dyn SQLStore>,
    pub(crate) config: AccessConfig,
}

impl AccessService {
    /// Create a new AccessService, initializing the DB schema.
    pub fn new(sql: Arc<dyn SQLStore>, config: AccessConfig) -> Result<Arc<Self>, AccessError> {
        schema::init_schema(sql.as_ref())?;
        Ok(Arc::new(Self { sql, config }))
    }

    pub fn config(&self) -> &AccessConfig {
        &self.config
    }

    // ── Generic record helpers (id + JSON data + indexed columns) ──

    /// Insert a record as JSON into a table with indexed columns.
    pub(crate) fn insert_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), AccessError> {
        let json = serde_json::to_string(record)
            .map_err(|e| AccessError::Internal(e.to_string()))?;

        let mut cols = vec!["id", "data"];
        let mut placeholders = vec!["?1".to_string(), "?2".to_string()];
        let mut params = vec![Value::Text(id.to_string()), Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            cols.push(col);
            placeholders.push(format!("?{}", i + 3));
            params.push(val.clone());
        }

        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            cols.join(", "),
            placeholders.join(", "),
        );
        self.sql.exec(&sql, &params)?;
        Ok(())
    }

    /// Get a record by id, deserializing the JSON `data` column.
    pub(crate) fn get_record<T: DeserializeOwned>(
        &self,
        table: &str,
        id: &str,
    ) -> Result<T, AccessError> {
        self.find_record(table, "id", Value::Text(id.to_string()))?
            .ok_or_else(|| AccessError::NotFound(format!("{}/{}", table, id)))
    }

    /// Find the first record whose `column` equals `value`.
    pub(crate) fn find_record<T: DeserializeOwned>(
        &self,
        table: &str,
        column: &str,
        value: Value,
    ) -> Result<Option<T>, AccessError> {
        let sql = format!("SELECT data FROM {} WHERE {} = ?1 LIMIT 1", table, column);
        let rows = self.sql.query(&sql, &[value])?;
        match rows.first() {
            Some(row) => decode_data(row).map(Some),
            None => Ok(None),
        }
    }

    /// Update a record's JSON data and indexed columns.
    pub(crate) fn update_record<T: Serialize>(
        &self,
        table: &str,
        id: &str,
        record: &T,
        indexes: &[(&str, Value)],
    ) -> Result<(), AccessError> {
        let json = serde_json::to_string(record)
            .map_err(|e| AccessError::Internal(e.to_string()))?;

        let mut sets = vec!["data = ?1".to_string()];
        let mut params: Vec<Value> = vec![Value::Text(json)];

        for (i, (col, val)) in indexes.iter().enumerate() {
            sets.push(format!("{} = ?{}", col, i + 2));
            params.push(val.clone());
        }

        let id_idx = params.len() + 1;
        params.push(Value::Text(id.to_string()));

        let sql = format!(
            "UPDATE {} SET {} WHERE id = ?{}",
            table,
            sets.join(", "),
            id_idx,
        );

        if self.sql.exec(&sql, &params)? == 0 {
            return Err(AccessError::NotFound(format!("{}/{}", table, id)));
        }
        Ok(())
    }

    /// List records with optional equality filters and pagination.
    pub(crate) fn list_records<T: DeserializeOwned>(
        &self,
        table: &str,
        filters: &[(&str, Value)],
        order_by: &str,
        limit: usize,
        offset: usize,
    ) -> Result<(Vec<T>, usize), AccessError> {
        let mut where_clauses = Vec::new();
        let mut params = Vec::new();

        for (i, (col, val)) in filters.iter().enumerate() {
            where_clauses.push(format!("{} = ?{}", col, i + 1));
            params.push(val.clone());
        }

        let where_sql = if where_clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", where_clauses.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) AS cnt FROM {}{}", table, where_sql);
        let total = self
            .sql
            .query(&count_sql, &params)?
            .first()
            .and_then(|r| r.get_i64("cnt"))
            .unwrap_or(0) as usize;

        let limit_idx = params.len() + 1;
        let offset_idx = params.len() + 2;
        params.push(Value::Integer(limit as i64));
        params.push(Value::Integer(offset as i64));

        let sql = format!(
            "SELECT data FROM {}{} ORDER BY {} LIMIT ?{} OFFSET ?{}",
            table, where_sql, order_by, limit_idx, offset_idx,
        );

        let items = self
            .sql
            .query(&sql, &params)?
            .iter()
            .map(decode_data)
            .collect::<Result<Vec<T>, _>>()?;

        Ok((items, total))
    }
}

/// Deserialize the JSON `data` column of a row.
pub(crate) fn decode_data<T: DeserializeOwned>(row: &gatehouse_sql::Row) -> Result<T, AccessError> {
    let data = row
        .get_str("data")
        .ok_or_else(|| AccessError::Internal("missing data column".into()))?;
    serde_json::from_str(data).map_err(|e| AccessError::Internal(e.to_string()))
}

/// Deserialize a JSON operations column.
pub(crate) fn decode_operations(
    row: &gatehouse_sql::Row,
    column: &str,
) -> Result<crate::model::Operations, AccessError> {
    let raw = row.get_str(column).unwrap_or("{}");
    serde_json::from_str(raw).map_err(|e| AccessError::Internal(e.to_string()))
}

pub(crate) fn encode_operations(ops: &crate::model::Operations) -> Result<Value, AccessError> {
    serde_json::to_string(ops)
        .map(Value::Text)
        .map_err(|e| AccessError::Internal(e.to_string()))
}

pub(crate) fn flag(b: bool) -> Value {
    Value::Integer(b as i64)
}

/// Run `body` in one transaction, carrying its typed outcome out.
pub(crate) fn atomically<T>(
    sql: &dyn SQLStore,
    mut body: impl FnMut(&dyn SQLExec) -> Result<T, AccessError>,
) -> Result<T, AccessError> {
    let mut outcome: Option<Result<T, AccessError>> = None;
    let result = sql.atomic(&mut |tx: &dyn SQLExec| match body(tx) {
        Ok(value) => {
            outcome = Some(Ok(value));
            Ok(())
        }
        Err(e) => {
            outcome = Some(Err(e));
            Err(SQLError::Rollback)
        }
    });

    match (result, outcome) {
        (Ok(()), Some(outcome)) => outcome,
        (Err(SQLError::Rollback), Some(Err(e))) => Err(e),
        (Err(e), _) => Err(e.into()),
        (Ok(()), None) => Err(AccessError::Internal("transaction body did not run".into())),
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use std::sync::Arc;

    use gatehouse_sql::SqliteStore;

    use super::{AccessConfig, AccessService};

    pub fn test_service() -> Arc<AccessService> {
        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        AccessService::new(sql, AccessConfig::default()).unwrap()
    }
}
