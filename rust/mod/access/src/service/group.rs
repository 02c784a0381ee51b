use tracing::info;

use gatehouse_core::{ListParams, ListResult, merge_patch, new_id, now_rfc3339};
use gatehouse_sql::{SQLExec, Value};

use crate::model::{
    AddGroupMember, CreateGroup, Group, GroupGrant, GroupMember, Profile, PutGroupGrant, Screen,
};
use crate::service::{
    AccessError, AccessService, atomically, decode_operations, encode_operations, flag,
};

impl AccessService {
    /// Create a new group.
    pub fn create_group(&self, input: CreateGroup) -> Result<Group, AccessError> {
        let name = input.name.trim().to_string();
        if name.is_empty() {
            return Err(AccessError::Validation("group name is required".into()));
        }

        let now = now_rfc3339();
        let group = Group {
            id: new_id(),
            name,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        };

        self.insert_record("groups", &group.id, &group, &group_indexes(&group))?;
        info!(id = %group.id, name = %group.name, "group created");
        Ok(group)
    }

    /// Get a group by id.
    pub fn get_group(&self, id: &str) -> Result<Group, AccessError> {
        self.get_record("groups", id)
    }

    /// List groups with pagination, ordered by name.
    pub fn list_groups(&self, params: &ListParams) -> Result<ListResult<Group>, AccessError> {
        let (items, total) =
            self.list_records("groups", &[], "name ASC", params.limit, params.offset)?;
        Ok(ListResult { items, total })
    }

    /// Update a group with JSON merge-patch.
    pub fn update_group(&self, id: &str, patch: serde_json::Value) -> Result<Group, AccessError> {
        let current: Group = self.get_record("groups", id)?;
        let now = now_rfc3339();

        let mut base = serde_json::to_value(&current)
            .map_err(|e| AccessError::Internal(e.to_string()))?;
        merge_patch(&mut base, &patch);
        base["updated_at"] = serde_json::json!(now);
        base["id"] = serde_json::json!(current.id);
        base["created_at"] = serde_json::json!(current.created_at);

        let mut updated: Group = serde_json::from_value(base)
            .map_err(|e| AccessError::Validation(e.to_string()))?;
        updated.name = updated.name.trim().to_string();
        if updated.name.is_empty() {
            return Err(AccessError::Validation("group name is required".into()));
        }

        self.update_record("groups", id, &updated, &group_indexes(&updated))?;
        info!(id = %id, name = %updated.name, active = updated.active, "group updated");
        Ok(updated)
    }

    /// Soft-delete a group. Its grants stop counting immediately.
    pub fn deactivate_group(&self, id: &str) -> Result<Group, AccessError> {
        self.update_group(id, serde_json::json!({"active": false}))
    }

    // ── Members ──

    /// Add a registered user to a group.
    pub fn add_group_member(
        &self,
        group_id: &str,
        input: AddGroupMember,
    ) -> Result<GroupMember, AccessError> {
        let _group: Group = self.get_record("groups", group_id)?;
        let user = self.get_user(&input.user_id)?;

        if user.profile == Profile::Secretariat && self.group_holds_teacher_only(group_id)? {
            return Err(AccessError::RestrictedScreen(format!(
                "group {} holds a teacher-only screen; secretariat members are not allowed",
                group_id
            )));
        }

        let member = GroupMember {
            group_id: group_id.to_string(),
            user_id: input.user_id,
            added_at: now_rfc3339(),
        };

        self.sql.exec(
            "INSERT OR IGNORE INTO group_members (group_id, user_id, added_at) VALUES (?1, ?2, ?3)",
            &[
                Value::Text(member.group_id.clone()),
                Value::Text(member.user_id.clone()),
                Value::Text(member.added_at.clone()),
            ],
        )?;

        info!(group = %group_id, user = %member.user_id, "group member added");
        Ok(member)
    }

    /// Remove a user from a group.
    pub fn remove_group_member(&self, group_id: &str, user_id: &str) -> Result<(), AccessError> {
        let affected = self.sql.exec(
            "DELETE FROM group_members WHERE group_id = ?1 AND user_id = ?2",
            &[Value::Text(group_id.to_string()), Value::Text(user_id.to_string())],
        )?;
        if affected == 0 {
            return Err(AccessError::NotFound(format!(
                "member {} in group {}",
                user_id, group_id
            )));
        }
        info!(group = %group_id, user = %user_id, "group member removed");
        Ok(())
    }

    /// List the members of a group.
    pub fn list_group_members(&self, group_id: &str) -> Result<Vec<GroupMember>, AccessError> {
        let _group: Group = self.get_record("groups", group_id)?;
        let rows = self.sql.query(
            "SELECT group_id, user_id, added_at FROM group_members
             WHERE group_id = ?1 ORDER BY added_at ASC, user_id ASC",
            &[Value::Text(group_id.to_string())],
        )?;
        Ok(rows
            .iter()
            .map(|r| GroupMember {
                group_id: r.get_str("group_id").unwrap_or_default().to_string(),
                user_id: r.get_str("user_id").unwrap_or_default().to_string(),
                added_at: r.get_str("added_at").unwrap_or_default().to_string(),
            })
            .collect())
    }

    // ── Grants ──

    /// Set the operations a group holds on one screen.
    pub fn put_group_grant(
        &self,
        group_id: &str,
        input: PutGroupGrant,
    ) -> Result<GroupGrant, AccessError> {
        let _group: Group = self.get_record("groups", group_id)?;
        let screen: Screen = self.get_record("screens", &input.screen_id)?;
        self.check_grant_target(group_id, &screen)?;

        let grant = atomically(self.sql.as_ref(), |tx| {
            upsert_grant(tx, group_id, &input.screen_id, &input.operations)
        })?;

        info!(group = %group_id, screen = %screen.path, ops = %grant.operations.to_compact(), "group grant set");
        Ok(grant)
    }

    /// Replace every grant of a group in one transaction.
    pub fn replace_group_grants(
        &self,
        group_id: &str,
        grants: Vec<PutGroupGrant>,
    ) -> Result<Vec<GroupGrant>, AccessError> {
        let _group: Group = self.get_record("groups", group_id)?;
        for grant in &grants {
            let screen: Screen = self.get_record("screens", &grant.screen_id)?;
            self.check_grant_target(group_id, &screen)?;
        }

        let stored = atomically(self.sql.as_ref(), |tx| {
            tx.exec(
                "DELETE FROM group_grants WHERE group_id = ?1",
                &[Value::Text(group_id.to_string())],
            )?;
            grants
                .iter()
                .map(|g| upsert_grant(tx, group_id, &g.screen_id, &g.operations))
                .collect::<Result<Vec<_>, _>>()
        })?;

        info!(group = %group_id, count = stored.len(), "group grants replaced");
        Ok(stored)
    }

    /// Remove a group's grant on a screen.
    pub fn remove_group_grant(&self, group_id: &str, screen_id: &str) -> Result<(), AccessError> {
        let affected = self.sql.exec(
            "DELETE FROM group_grants WHERE group_id = ?1 AND screen_id = ?2",
            &[Value::Text(group_id.to_string()), Value::Text(screen_id.to_string())],
        )?;
        if affected == 0 {
            return Err(AccessError::NotFound(format!(
                "grant on {} for group {}",
                screen_id, group_id
            )));
        }
        info!(group = %group_id, screen = %screen_id, "group grant removed");
        Ok(())
    }

    /// List every grant a group holds.
    pub fn list_group_grants(&self, group_id: &str) -> Result<Vec<GroupGrant>, AccessError> {
        let _group: Group = self.get_record("groups", group_id)?;
        let rows = self.sql.query(
            "SELECT group_id, screen_id, operations, created_at, updated_at
             FROM group_grants WHERE group_id = ?1 ORDER BY screen_id ASC",
            &[Value::Text(group_id.to_string())],
        )?;
        rows.iter().map(grant_from_row).collect()
    }

    /// Secretariat members and teacher-only screens never meet in one group.
    fn check_grant_target(&self, group_id: &str, screen: &Screen) -> Result<(), AccessError> {
        if !screen.teacher_only {
            return Ok(());
        }
        let rows = self.sql.query(
            "SELECT COUNT(*) AS cnt FROM group_members gm
             JOIN users u ON u.id = gm.user_id
             WHERE gm.group_id = ?1 AND u.profile = 'secretariat'",
            &[Value::Text(group_id.to_string())],
        )?;
        if rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) > 0 {
            return Err(AccessError::RestrictedScreen(format!(
                "screen {} is teacher-only and group {} has secretariat members",
                screen.path, group_id
            )));
        }
        Ok(())
    }

    fn group_holds_teacher_only(&self, group_id: &str) -> Result<bool, AccessError> {
        let rows = self.sql.query(
            "SELECT COUNT(*) AS cnt FROM group_grants gg
             JOIN screens s ON s.id = gg.screen_id
             WHERE gg.group_id = ?1 AND s.teacher_only = 1",
            &[Value::Text(group_id.to_string())],
        )?;
        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) > 0)
    }
}

fn upsert_grant(
    tx: &dyn SQLExec,
    group_id: &str,
    screen_id: &str,
    operations: &crate::model::Operations,
) -> Result<GroupGrant, AccessError> {
    let now = now_rfc3339();
    tx.exec(
        "INSERT INTO group_grants (group_id, screen_id, operations, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?4)
         ON CONFLICT (group_id, screen_id)
         DO UPDATE SET operations = excluded.operations, updated_at = excluded.updated_at",
        &[
            Value::Text(group_id.to_string()),
            Value::Text(screen_id.to_string()),
            encode_operations(operations)?,
            Value::Text(now),
        ],
    )?;
    let rows = tx.query(
        "SELECT group_id, screen_id, operations, created_at, updated_at
         FROM group_grants WHERE group_id = ?1 AND screen_id = ?2",
        &[Value::Text(group_id.to_string()), Value::Text(screen_id.to_string())],
    )?;
    rows.first()
        .ok_or_else(|| AccessError::Internal("grant vanished after write".into()))
        .and_then(grant_from_row)
}

fn grant_from_row(row: &gatehouse_sql::Row) -> Result<GroupGrant, AccessError> {
    Ok(GroupGrant {
        group_id: row.get_str("group_id").unwrap_or_default().to_string(),
        screen_id: row.get_str("screen_id").unwrap_or_default().to_string(),
        operations: decode_operations(row, "operations")?,
        created_at: row.get_str("created_at").unwrap_or_default().to_string(),
        updated_at: row.get_str("updated_at").unwrap_or_default().to_string(),
    })
}

fn group_indexes(group: &Group) -> Vec<(&'static str, Value)> {
    vec![
        ("name", Value::Text(group.name.clone())),
        ("active", flag(group.active)),
        ("created_at", Value::Text(group.created_at.clone())),
        ("updated_at", Value::Text(group.updated_at.clone())),
    ]
}
