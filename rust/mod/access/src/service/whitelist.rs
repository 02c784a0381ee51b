use tracing::info;

use gatehouse_core::now_rfc3339;
use gatehouse_sql::Value;

use crate::model::{Operations, Profile, PutWhitelistEntry, Screen, WhitelistEntry};
use crate::service::{AccessError, AccessService, decode_operations, encode_operations};

impl AccessService {
    /// Set the operations a whitelist-only profile holds on a screen.
    pub fn put_whitelist_entry(
        &self,
        profile: Profile,
        screen_id: &str,
        input: PutWhitelistEntry,
    ) -> Result<WhitelistEntry, AccessError> {
        ensure_whitelist_profile(profile)?;
        let screen: Screen = self.get_record("screens", screen_id)?;

        let now = now_rfc3339();
        self.sql.exec(
            "INSERT INTO profile_whitelist (profile, screen_id, operations, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)
             ON CONFLICT (profile, screen_id)
             DO UPDATE SET operations = excluded.operations, updated_at = excluded.updated_at",
            &[
                Value::Text(profile.as_str().to_string()),
                Value::Text(screen_id.to_string()),
                encode_operations(&input.operations)?,
                Value::Text(now.clone()),
            ],
        )?;

        info!(profile = %profile, screen = %screen.path, ops = %input.operations.to_compact(), "whitelist entry set");
        Ok(WhitelistEntry {
            profile,
            screen_id: screen_id.to_string(),
            operations: input.operations,
            updated_at: now,
        })
    }

    /// Seed a whitelist entry by screen path unless one already exists.
    /// Returns whether an entry was written.
    pub fn ensure_whitelist_entry(
        &self,
        profile: Profile,
        path: &str,
        operations: Operations,
    ) -> Result<bool, AccessError> {
        let screen = self
            .find_screen_by_path(path)?
            .ok_or_else(|| AccessError::NotFound(format!("screen {}", path)))?;
        if self.whitelist_operations(profile, &screen.id)?.is_some() {
            return Ok(false);
        }
        self.put_whitelist_entry(profile, &screen.id, PutWhitelistEntry { operations })?;
        Ok(true)
    }

    /// Remove a whitelist entry.
    pub fn remove_whitelist_entry(&self, profile: Profile, screen_id: &str) -> Result<(), AccessError> {
        ensure_whitelist_profile(profile)?;
        let affected = self.sql.exec(
            "DELETE FROM profile_whitelist WHERE profile = ?1 AND screen_id = ?2",
            &[Value::Text(profile.as_str().to_string()), Value::Text(screen_id.to_string())],
        )?;
        if affected == 0 {
            return Err(AccessError::NotFound(format!(
                "whitelist entry {} on {}",
                profile, screen_id
            )));
        }
        info!(profile = %profile, screen = %screen_id, "whitelist entry removed");
        Ok(())
    }

    /// List every whitelist entry of a profile.
    pub fn list_whitelist(&self, profile: Profile) -> Result<Vec<WhitelistEntry>, AccessError> {
        ensure_whitelist_profile(profile)?;
        let rows = self.sql.query(
            "SELECT screen_id, operations, updated_at FROM profile_whitelist
             WHERE profile = ?1 ORDER BY screen_id ASC",
            &[Value::Text(profile.as_str().to_string())],
        )?;
        rows.iter()
            .map(|r| {
                Ok(WhitelistEntry {
                    profile,
                    screen_id: r.get_str("screen_id").unwrap_or_default().to_string(),
                    operations: decode_operations(r, "operations")?,
                    updated_at: r.get_str("updated_at").unwrap_or_default().to_string(),
                })
            })
            .collect()
    }

    pub(crate) fn whitelist_operations(
        &self,
        profile: Profile,
        screen_id: &str,
    ) -> Result<Option<Operations>, AccessError> {
        let rows = self.sql.query(
            "SELECT operations FROM profile_whitelist WHERE profile = ?1 AND screen_id = ?2",
            &[Value::Text(profile.as_str().to_string()), Value::Text(screen_id.to_string())],
        )?;
        rows.first().map(|r| decode_operations(r, "operations")).transpose()
    }
}

fn ensure_whitelist_profile(profile: Profile) -> Result<(), AccessError> {
    if profile.is_whitelist_only() {
        Ok(())
    } else {
        Err(AccessError::Validation(format!(
            "profile '{}' is not governed by the whitelist",
            profile
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{CreateScreen, Operation};
    use crate::service::testing::test_service;

    #[test]
    fn test_put_list_remove() {
        let svc = test_service();
        let s = svc
            .create_screen(CreateScreen { name: "Boletim".into(), path: "/boletim".into(), teacher_only: false })
            .unwrap();

        let ops = Operations::new().with(Operation::View, true);
        svc.put_whitelist_entry(Profile::Student, &s.id, PutWhitelistEntry { operations: ops.clone() })
            .unwrap();
        let listed = svc.list_whitelist(Profile::Student).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].operations, ops);
        assert!(svc.list_whitelist(Profile::Guardian).unwrap().is_empty());

        svc.remove_whitelist_entry(Profile::Student, &s.id).unwrap();
        assert!(svc.list_whitelist(Profile::Student).unwrap().is_empty());
    }

    #[test]
    fn test_only_whitelist_profiles() {
        let svc = test_service();
        let s = svc
            .create_screen(CreateScreen { name: "Boletim".into(), path: "/boletim".into(), teacher_only: false })
            .unwrap();
        let result = svc.put_whitelist_entry(
            Profile::Teacher,
            &s.id,
            PutWhitelistEntry { operations: Operations::new() },
        );
        assert!(matches!(result, Err(AccessError::Validation(_))));
    }

    #[test]
    fn test_ensure_does_not_overwrite() {
        let svc = test_service();
        let s = svc
            .create_screen(CreateScreen { name: "Home".into(), path: "/home".into(), teacher_only: false })
            .unwrap();
        let view = Operations::new().with(Operation::View, true);
        assert!(svc.ensure_whitelist_entry(Profile::Guardian, "/home", view.clone()).unwrap());
        assert!(!svc
            .ensure_whitelist_entry(Profile::Guardian, "/home", Operations::new())
            .unwrap());
        assert_eq!(svc.whitelist_operations(Profile::Guardian, &s.id).unwrap(), Some(view));
        assert!(matches!(
            svc.ensure_whitelist_entry(Profile::Guardian, "/missing", Operations::new()),
            Err(AccessError::NotFound(_))
        ));
    }
}
