use chrono::{DateTime, TimeZone, Timelike, Utc};
use chrono_tz::Tz;
use tracing::{debug, info};

use gatehouse_core::new_id;
use gatehouse_sql::{Row, SQLExec, Value};

use crate::model::{
    CreateOverride, Operations, Override, OverrideListing, OverrideQuery, OverrideStatus, Profile,
    Screen, UserProfile, WindowTime,
};
use crate::service::{AccessError, AccessService, atomically, decode_operations, encode_operations};

/// A validated override request, ready to insert.
struct PlannedOverride {
    screen: Screen,
    operations: Operations,
    starts_at: DateTime<Utc>,
    ends_at: DateTime<Utc>,
}

const OVERRIDE_COLUMNS: &str =
    "o.id, o.user_id, o.screen_id, o.operations, o.starts_at, o.ends_at, o.status, o.created_at, o.updated_at";

impl AccessService {
    /// Grant (or deny) operations to one user on one screen for a window.
    pub fn create_override(
        &self,
        user_id: &str,
        input: CreateOverride,
    ) -> Result<Override, AccessError> {
        self.create_overrides(user_id, vec![input])?
            .pop()
            .ok_or_else(|| AccessError::Internal("override batch came back empty".into()))
    }

    /// Create several overrides for one user, all or none.
    ///
    /// Every entry is validated before anything is written. The overlap
    /// checks and the inserts share one write transaction; the insert trigger
    /// in `schema` rejects anything that still slips through. Two entries of
    /// the same batch may not overlap on the same screen either.
    pub fn create_overrides(
        &self,
        user_id: &str,
        inputs: Vec<CreateOverride>,
    ) -> Result<Vec<Override>, AccessError> {
        if inputs.is_empty() {
            return Err(AccessError::Validation("no overrides to create".into()));
        }
        if inputs.iter().any(|i| i.operations.is_empty()) {
            return Err(AccessError::Validation("override needs at least one operation".into()));
        }

        let user = self.get_user(user_id)?;
        let planned = inputs
            .into_iter()
            .map(|input| self.plan_override(&user, input))
            .collect::<Result<Vec<_>, _>>()?;

        for (i, a) in planned.iter().enumerate() {
            if let Some(b) = planned[i + 1..]
                .iter()
                .find(|b| b.screen.id == a.screen.id && a.ends_at >= b.starts_at && a.starts_at <= b.ends_at)
            {
                return Err(AccessError::OverlappingPeriod(format!(
                    "windows {} to {} and {} to {} on {} overlap within the request",
                    a.starts_at, a.ends_at, b.starts_at, b.ends_at, a.screen.path
                )));
            }
        }

        let now = Utc::now();
        let created = atomically(self.sql.as_ref(), |tx| {
            let stamp = now.to_rfc3339();
            let mut created = Vec::with_capacity(planned.len());
            for plan in &planned {
                reconcile_on(tx, user_id, Some(&plan.screen.id), now)?;

                let active = load_overrides(
                    tx,
                    "WHERE o.user_id = ?1 AND o.screen_id = ?2 AND o.status = 'ACTIVE'",
                    &[Value::Text(user_id.to_string()), Value::Text(plan.screen.id.clone())],
                )?;
                if let Some(clash) = active.iter().find(|o| o.overlaps(plan.starts_at, plan.ends_at)) {
                    return Err(AccessError::OverlappingPeriod(format!(
                        "override {} already covers {} to {}",
                        clash.id, clash.starts_at, clash.ends_at
                    )));
                }

                let entry = Override {
                    id: new_id(),
                    user_id: user_id.to_string(),
                    screen_id: plan.screen.id.clone(),
                    operations: plan.operations.clone(),
                    starts_at: plan.starts_at,
                    ends_at: plan.ends_at,
                    status: OverrideStatus::Active,
                    created_at: stamp.clone(),
                    updated_at: stamp.clone(),
                };
                insert_override(tx, &entry)?;
                created.push(entry);
            }
            Ok(created)
        })?;

        for (entry, plan) in created.iter().zip(&planned) {
            info!(
                id = %entry.id,
                user = %user_id,
                screen = %plan.screen.path,
                ops = %entry.operations.to_compact(),
                starts_at = %entry.starts_at,
                ends_at = %entry.ends_at,
                "override created"
            );
        }
        Ok(created)
    }

    /// Check one requested override against the target user and screen and
    /// pin its window to instants.
    fn plan_override(&self, user: &UserProfile, input: CreateOverride) -> Result<PlannedOverride, AccessError> {
        let screen: Screen = self.get_record("screens", &input.screen_id)?;
        if !screen.active {
            return Err(AccessError::Validation(format!("screen {} is inactive", screen.path)));
        }

        if user.profile.is_whitelist_only() {
            return Err(AccessError::IneligibleProfile(user.profile));
        }
        if user.profile == Profile::Secretariat && screen.teacher_only {
            return Err(AccessError::RestrictedScreen(format!(
                "screen {} is teacher-only",
                screen.path
            )));
        }

        let tz = self.config.timezone;
        let starts_at = pin(&input.starts_at, tz)?;
        let mut ends_at = pin(&input.ends_at, tz)?;
        if self.config.whole_day_end {
            ends_at = widen_whole_day(ends_at, tz);
        }
        if starts_at > ends_at {
            return Err(AccessError::InvalidPeriod { starts_at, ends_at });
        }

        Ok(PlannedOverride {
            screen,
            operations: input.operations,
            starts_at,
            ends_at,
        })
    }

    /// Get an override by id, expiring it first when its window has closed.
    pub fn get_override(&self, id: &str) -> Result<Override, AccessError> {
        let current = load_one(self.sql.as_ref(), id)?;
        if current.is_elapsed(Utc::now()) {
            self.reconcile_overrides(&current.user_id, Some(&current.screen_id))?;
            return load_one(self.sql.as_ref(), id);
        }
        Ok(current)
    }

    /// Revoke an override immediately: status REVOKED, `ends_at` clamped to now.
    ///
    /// A window that had not started yet collapses to `[now, now]`, so the
    /// row no longer records the window originally granted; the `info!` line
    /// logged here keeps both bounds. Revoking an EXPIRED or REVOKED row
    /// changes nothing and returns it as is.
    pub fn revoke_override(&self, id: &str) -> Result<Override, AccessError> {
        let now = Utc::now();
        let (entry, granted) = atomically(self.sql.as_ref(), |tx| {
            let current = load_one(tx, id)?;
            reconcile_on(tx, &current.user_id, Some(&current.screen_id), now)?;

            let current = load_one(tx, id)?;
            if current.status.is_terminal() {
                return Ok((current, None));
            }
            let granted = (current.starts_at, current.ends_at);

            let now_ms = now.timestamp_millis();
            tx.exec(
                "UPDATE overrides
                 SET status = 'REVOKED', ends_at = ?1, starts_at = MIN(starts_at, ?1), updated_at = ?2
                 WHERE id = ?3 AND status = 'ACTIVE'",
                &[
                    Value::Integer(now_ms),
                    Value::Text(now.to_rfc3339()),
                    Value::Text(id.to_string()),
                ],
            )?;
            Ok((load_one(tx, id)?, Some(granted)))
        })?;

        if let Some((granted_from, granted_until)) = granted {
            info!(
                id = %id,
                user = %entry.user_id,
                screen = %entry.screen_id,
                granted_from = %granted_from,
                granted_until = %granted_until,
                "override revoked"
            );
        } else {
            debug!(id = %id, status = %entry.status, "revoke on terminal override ignored");
        }
        Ok(entry)
    }

    /// List a user's overrides joined with their screen path, newest window first.
    pub fn list_overrides(
        &self,
        user_id: &str,
        query: &OverrideQuery,
    ) -> Result<Vec<OverrideListing>, AccessError> {
        let now = Utc::now();
        self.reconcile_overrides(user_id, query.screen_id.as_deref())?;

        let mut params = vec![Value::Text(user_id.to_string())];
        let mut where_sql = "WHERE o.user_id = ?1".to_string();
        if let Some(screen_id) = &query.screen_id {
            where_sql.push_str(" AND o.screen_id = ?2");
            params.push(Value::Text(screen_id.clone()));
        }

        let sql = format!(
            "SELECT {}, s.path AS screen_path FROM overrides o
             JOIN screens s ON s.id = o.screen_id
             {} ORDER BY o.starts_at DESC",
            OVERRIDE_COLUMNS, where_sql
        );
        let rows = self.sql.query(&sql, &params)?;

        let mut listings = Vec::with_capacity(rows.len());
        for row in &rows {
            let entry = override_from_row(row)?;
            if query.active && !entry.is_in_effect(now) {
                continue;
            }
            listings.push(OverrideListing {
                entry,
                screen_path: row.get_str("screen_path").unwrap_or_default().to_string(),
            });
        }
        Ok(listings)
    }

    /// Expire every ACTIVE override of the user (optionally on one screen)
    /// whose window has closed. Returns how many rows changed.
    pub fn reconcile_overrides(
        &self,
        user_id: &str,
        screen_id: Option<&str>,
    ) -> Result<u64, AccessError> {
        reconcile_on(self.sql.as_ref(), user_id, screen_id, Utc::now())
    }

    /// The override in effect for (user, screen) at `now`, after expiry.
    pub(crate) fn in_effect_override(
        &self,
        user_id: &str,
        screen_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Override>, AccessError> {
        reconcile_on(self.sql.as_ref(), user_id, Some(screen_id), now)?;
        let now_ms = now.timestamp_millis();
        let mut found = load_overrides(
            self.sql.as_ref(),
            "WHERE o.user_id = ?1 AND o.screen_id = ?2 AND o.status = 'ACTIVE'
               AND o.starts_at <= ?3 AND o.ends_at >= ?3",
            &[
                Value::Text(user_id.to_string()),
                Value::Text(screen_id.to_string()),
                Value::Integer(now_ms),
            ],
        )?;
        Ok(found.pop())
    }
}

/// Compare-and-set expiry. Safe to run concurrently and repeatedly.
fn reconcile_on<E: SQLExec + ?Sized>(
    db: &E,
    user_id: &str,
    screen_id: Option<&str>,
    now: DateTime<Utc>,
) -> Result<u64, AccessError> {
    let mut sql = "UPDATE overrides SET status = 'EXPIRED', updated_at = ?1
         WHERE user_id = ?2 AND status = 'ACTIVE' AND ends_at < ?3"
        .to_string();
    let mut params = vec![
        Value::Text(now.to_rfc3339()),
        Value::Text(user_id.to_string()),
        Value::Integer(now.timestamp_millis()),
    ];
    if let Some(screen_id) = screen_id {
        sql.push_str(" AND screen_id = ?4");
        params.push(Value::Text(screen_id.to_string()));
    }

    let expired = db.exec(&sql, &params)?;
    if expired > 0 {
        debug!(user = %user_id, screen = ?screen_id, expired, "overrides expired");
    }
    Ok(expired)
}

fn load_overrides<E: SQLExec + ?Sized>(
    db: &E,
    where_sql: &str,
    params: &[Value],
) -> Result<Vec<Override>, AccessError> {
    let sql = format!(
        "SELECT {} FROM overrides o {} ORDER BY o.starts_at DESC",
        OVERRIDE_COLUMNS, where_sql
    );
    db.query(&sql, params)?.iter().map(override_from_row).collect()
}

fn load_one<E: SQLExec + ?Sized>(db: &E, id: &str) -> Result<Override, AccessError> {
    load_overrides(db, "WHERE o.id = ?1", &[Value::Text(id.to_string())])?
        .pop()
        .ok_or_else(|| AccessError::NotFound(format!("overrides/{}", id)))
}

pub(crate) fn insert_override<E: SQLExec + ?Sized>(
    db: &E,
    entry: &Override,
) -> Result<(), AccessError> {
    db.exec(
        "INSERT INTO overrides
         (id, user_id, screen_id, operations, starts_at, ends_at, status, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        &[
            Value::Text(entry.id.clone()),
            Value::Text(entry.user_id.clone()),
            Value::Text(entry.screen_id.clone()),
            encode_operations(&entry.operations)?,
            Value::Integer(entry.starts_at.timestamp_millis()),
            Value::Integer(entry.ends_at.timestamp_millis()),
            Value::Text(entry.status.as_str().to_string()),
            Value::Text(entry.created_at.clone()),
            Value::Text(entry.updated_at.clone()),
        ],
    )?;
    Ok(())
}

fn override_from_row(row: &Row) -> Result<Override, AccessError> {
    let text = |col: &str| row.get_str(col).unwrap_or_default().to_string();
    let instant = |col: &str| {
        row.get_i64(col)
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| AccessError::Internal(format!("override column {} is not a timestamp", col)))
    };

    Ok(Override {
        id: text("id"),
        user_id: text("user_id"),
        screen_id: text("screen_id"),
        operations: decode_operations(row, "operations")?,
        starts_at: instant("starts_at")?,
        ends_at: instant("ends_at")?,
        status: text("status").parse().map_err(AccessError::Internal)?,
        created_at: text("created_at"),
        updated_at: text("updated_at"),
    })
}

fn truncate_millis(t: DateTime<Utc>) -> DateTime<Utc> {
    DateTime::from_timestamp_millis(t.timestamp_millis()).unwrap_or(t)
}

fn pin(bound: &WindowTime, tz: Tz) -> Result<DateTime<Utc>, AccessError> {
    bound
        .resolve(tz)
        .map(truncate_millis)
        .ok_or_else(|| AccessError::Validation(format!("{} does not exist in {}", bound, tz.name())))
}

/// An end of exactly midnight in `tz` means "through the whole of that day".
pub(crate) fn widen_whole_day(end: DateTime<Utc>, tz: Tz) -> DateTime<Utc> {
    let local = end.with_timezone(&tz);
    if local.hour() != 0 || local.minute() != 0 || local.second() != 0 || local.nanosecond() != 0 {
        return end;
    }
    local
        .date_naive()
        .and_hms_opt(23, 59, 59)
        .and_then(|last| tz.from_local_datetime(&last).latest())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or(end)
}
