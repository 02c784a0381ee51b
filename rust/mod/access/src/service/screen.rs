use tracing::info;

use gatehouse_core::{ListParams, ListResult, merge_patch, new_id, now_rfc3339};
use gatehouse_sql::Value;

use crate::model::{CreateScreen, Screen, ScreenQuery};
use crate::service::{AccessError, AccessService, decode_data, flag};

impl AccessService {
    /// Register a new screen.
    pub fn create_screen(&self, input: CreateScreen) -> Result<Screen, AccessError> {
        validate_screen(&input.name, &input.path)?;

        let now = now_rfc3339();
        let screen = Screen {
            id: new_id(),
            name: input.name.trim().to_string(),
            path: input.path.trim().to_string(),
            teacher_only: input.teacher_only,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        };

        self.insert_record("screens", &screen.id, &screen, &screen_indexes(&screen))?;
        info!(id = %screen.id, path = %screen.path, "screen registered");
        Ok(screen)
    }

    /// Register a screen unless its path already exists. Returns the stored
    /// screen and whether it was created.
    pub fn ensure_screen(&self, input: CreateScreen) -> Result<(Screen, bool), AccessError> {
        match self.find_screen_by_path(input.path.trim())? {
            Some(existing) => Ok((existing, false)),
            None => self.create_screen(input).map(|s| (s, true)),
        }
    }

    /// Get a screen by id.
    pub fn get_screen(&self, id: &str) -> Result<Screen, AccessError> {
        self.get_record("screens", id)
    }

    /// Look up a screen by path, active or not.
    pub fn find_screen_by_path(&self, path: &str) -> Result<Option<Screen>, AccessError> {
        self.find_record("screens", "path", Value::Text(path.to_string()))
    }

    /// List screens ordered by path.
    pub fn list_screens(
        &self,
        query: &ScreenQuery,
        params: &ListParams,
    ) -> Result<ListResult<Screen>, AccessError> {
        let filters: Vec<(&str, Value)> = if query.include_inactive {
            vec![]
        } else {
            vec![("active", flag(true))]
        };
        let (items, total) =
            self.list_records("screens", &filters, "path ASC", params.limit, params.offset)?;
        Ok(ListResult { items, total })
    }

    /// Every active screen, unpaginated.
    pub(crate) fn active_screens(&self) -> Result<Vec<Screen>, AccessError> {
        self.sql
            .query("SELECT data FROM screens WHERE active = 1 ORDER BY path ASC", &[])?
            .iter()
            .map(decode_data)
            .collect()
    }

    /// Update a screen with JSON merge-patch.
    pub fn update_screen(&self, id: &str, patch: serde_json::Value) -> Result<Screen, AccessError> {
        let current: Screen = self.get_record("screens", id)?;
        let now = now_rfc3339();

        let mut base = serde_json::to_value(&current)
            .map_err(|e| AccessError::Internal(e.to_string()))?;
        merge_patch(&mut base, &patch);
        base["updated_at"] = serde_json::json!(now);
        base["id"] = serde_json::json!(current.id);
        base["created_at"] = serde_json::json!(current.created_at);

        let mut updated: Screen = serde_json::from_value(base)
            .map_err(|e| AccessError::Validation(e.to_string()))?;
        updated.name = updated.name.trim().to_string();
        updated.path = updated.path.trim().to_string();
        validate_screen(&updated.name, &updated.path)?;

        if updated.teacher_only && !current.teacher_only {
            self.ensure_no_secretariat_holders(id)?;
        }

        self.update_record("screens", id, &updated, &screen_indexes(&updated))?;
        info!(id = %id, path = %updated.path, "screen updated");
        Ok(updated)
    }

    /// Soft-delete a screen. Grants, whitelist entries and overrides stay
    /// stored but the resolver no longer sees the screen.
    pub fn deactivate_screen(&self, id: &str) -> Result<Screen, AccessError> {
        self.update_screen(id, serde_json::json!({"active": false}))
    }

    /// A screen turning teacher-only must not already be granted to a group
    /// with a secretariat member.
    fn ensure_no_secretariat_holders(&self, screen_id: &str) -> Result<(), AccessError> {
        let rows = self.sql.query(
            "SELECT COUNT(*) AS cnt FROM group_grants gg
             JOIN group_members gm ON gm.group_id = gg.group_id
             JOIN users u ON u.id = gm.user_id
             WHERE gg.screen_id = ?1 AND u.profile = 'secretariat'",
            &[Value::Text(screen_id.to_string())],
        )?;
        let held = rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0);
        if held > 0 {
            return Err(AccessError::RestrictedScreen(format!(
                "screen {} is granted to groups with secretariat members",
                screen_id
            )));
        }
        Ok(())
    }
}

fn validate_screen(name: &str, path: &str) -> Result<(), AccessError> {
    if name.trim().is_empty() {
        return Err(AccessError::Validation("screen name is required".into()));
    }
    let path = path.trim();
    if !path.starts_with('/') {
        return Err(AccessError::Validation(format!(
            "screen path must start with '/': {:?}",
            path
        )));
    }
    Ok(())
}

fn screen_indexes(screen: &Screen) -> Vec<(&'static str, Value)> {
    vec![
        ("name", Value::Text(screen.name.clone())),
        ("path", Value::Text(screen.path.clone())),
        ("teacher_only", flag(screen.teacher_only)),
        ("active", flag(screen.active)),
        ("created_at", Value::Text(screen.created_at.clone())),
        ("updated_at", Value::Text(screen.updated_at.clone())),
    ]
}

#[cfg(test)]
mod tests {
    use crate::service::testing::test_service;
    use crate::service::AccessError;
    use super::*;

    fn screen(name: &str, path: &str) -> CreateScreen {
        CreateScreen {
            name: name.into(),
            path: path.into(),
            teacher_only: false,
        }
    }

    #[test]
    fn test_create_and_get() {
        let svc = test_service();
        let s = svc.create_screen(screen("Turmas", "/cadastro/turmas")).unwrap();
        assert!(s.active);
        let got = svc.get_screen(&s.id).unwrap();
        assert_eq!(got.path, "/cadastro/turmas");
        assert_eq!(svc.find_screen_by_path("/cadastro/turmas").unwrap().unwrap().id, s.id);
    }

    #[test]
    fn test_unique_path_and_name() {
        let svc = test_service();
        svc.create_screen(screen("Turmas", "/cadastro/turmas")).unwrap();
        assert!(matches!(
            svc.create_screen(screen("Other", "/cadastro/turmas")),
            Err(AccessError::Conflict(_))
        ));
        assert!(matches!(
            svc.create_screen(screen("Turmas", "/other")),
            Err(AccessError::Conflict(_))
        ));
    }

    #[test]
    fn test_path_validation() {
        let svc = test_service();
        assert!(matches!(
            svc.create_screen(screen("Bad", "cadastro")),
            Err(AccessError::Validation(_))
        ));
        assert!(matches!(
            svc.create_screen(screen(" ", "/x")),
            Err(AccessError::Validation(_))
        ));
    }

    #[test]
    fn test_deactivate_hides_from_default_listing() {
        let svc = test_service();
        let a = svc.create_screen(screen("A", "/a")).unwrap();
        svc.create_screen(screen("B", "/b")).unwrap();

        let off = svc.deactivate_screen(&a.id).unwrap();
        assert!(!off.active);

        let listed = svc
            .list_screens(&ScreenQuery::default(), &ListParams::default())
            .unwrap();
        assert_eq!(listed.total, 1);
        assert_eq!(listed.items[0].path, "/b");

        let all = svc
            .list_screens(&ScreenQuery { include_inactive: true }, &ListParams::default())
            .unwrap();
        assert_eq!(all.total, 2);
        assert_eq!(svc.active_screens().unwrap().len(), 1);
    }

    #[test]
    fn test_update_keeps_identity() {
        let svc = test_service();
        let s = svc.create_screen(screen("Notas", "/notas")).unwrap();
        let u = svc
            .update_screen(&s.id, serde_json::json!({"teacher_only": true, "id": "hijack"}))
            .unwrap();
        assert_eq!(u.id, s.id);
        assert!(u.teacher_only);
        assert_eq!(u.created_at, s.created_at);
    }

    #[test]
    fn test_ensure_is_idempotent() {
        let svc = test_service();
        let (first, created) = svc.ensure_screen(screen("Home", "/home")).unwrap();
        assert!(created);
        let (again, created) = svc.ensure_screen(screen("Home", "/home")).unwrap();
        assert!(!created);
        assert_eq!(first.id, again.id);
    }

    #[test]
    fn test_missing_screen() {
        let svc = test_service();
        assert!(matches!(svc.get_screen("nope"), Err(AccessError::NotFound(_))));
    }
}
