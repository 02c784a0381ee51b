use tracing::info;

use gatehouse_core::now_rfc3339;
use gatehouse_sql::Value;

use crate::model::{Profile, RegisterUser, UserProfile};
use crate::service::{AccessError, AccessService};

impl AccessService {
    /// Register a user's canonical profile, or re-profile an existing user.
    pub fn register_user(&self, id: &str, input: RegisterUser) -> Result<UserProfile, AccessError> {
        if id.trim().is_empty() {
            return Err(AccessError::Validation("user id is required".into()));
        }

        let now = now_rfc3339();
        let existing: Option<UserProfile> =
            self.find_record("users", "id", Value::Text(id.to_string()))?;

        if input.profile == Profile::Secretariat && self.holds_teacher_only_grant(id)? {
            return Err(AccessError::RestrictedScreen(format!(
                "user {} belongs to a group holding a teacher-only screen",
                id
            )));
        }

        let user = UserProfile {
            id: id.to_string(),
            name: input.name.or_else(|| existing.as_ref().and_then(|u| u.name.clone())),
            profile: input.profile,
            created_at: existing
                .as_ref()
                .map(|u| u.created_at.clone())
                .unwrap_or_else(|| now.clone()),
            updated_at: now.clone(),
        };

        let indexes = vec![
            ("profile", Value::Text(user.profile.as_str().to_string())),
            ("updated_at", Value::Text(now)),
        ];

        if existing.is_some() {
            self.update_record("users", id, &user, &indexes)?;
        } else {
            let mut indexes = indexes;
            indexes.push(("created_at", Value::Text(user.created_at.clone())));
            self.insert_record("users", id, &user, &indexes)?;
        }

        info!(user = %id, profile = %user.profile, "user profile registered");
        Ok(user)
    }

    /// Get a user's profile record.
    pub fn get_user(&self, id: &str) -> Result<UserProfile, AccessError> {
        self.get_record("users", id)
    }

    /// Names of every group the user belongs to, active or not.
    pub fn user_group_names(&self, id: &str) -> Result<Vec<String>, AccessError> {
        let _user = self.get_user(id)?;
        let rows = self.sql.query(
            "SELECT g.name AS name FROM group_members gm
             JOIN groups g ON g.id = gm.group_id
             WHERE gm.user_id = ?1
             ORDER BY g.name ASC",
            &[Value::Text(id.to_string())],
        )?;
        Ok(rows
            .iter()
            .filter_map(|r| r.get_str("name").map(str::to_string))
            .collect())
    }

    /// Whether any group of the user holds a grant on a teacher-only screen.
    pub(crate) fn holds_teacher_only_grant(&self, user_id: &str) -> Result<bool, AccessError> {
        let rows = self.sql.query(
            "SELECT COUNT(*) AS cnt FROM group_members gm
             JOIN group_grants gg ON gg.group_id = gm.group_id
             JOIN screens s ON s.id = gg.screen_id
             WHERE gm.user_id = ?1 AND s.teacher_only = 1",
            &[Value::Text(user_id.to_string())],
        )?;
        Ok(rows.first().and_then(|r| r.get_i64("cnt")).unwrap_or(0) > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::testing::test_service;

    fn reg(profile: Profile) -> RegisterUser {
        RegisterUser { name: Some("Ana".into()), profile }
    }

    #[test]
    fn test_register_and_reprofile() {
        let svc = test_service();
        let u = svc.register_user("u1", reg(Profile::Teacher)).unwrap();
        assert_eq!(u.profile, Profile::Teacher);

        let again = svc
            .register_user("u1", RegisterUser { name: None, profile: Profile::Coordinator })
            .unwrap();
        assert_eq!(again.profile, Profile::Coordinator);
        assert_eq!(again.name.as_deref(), Some("Ana"));
        assert_eq!(again.created_at, u.created_at);
        assert_eq!(svc.get_user("u1").unwrap().profile, Profile::Coordinator);
    }

    #[test]
    fn test_empty_id_rejected() {
        let svc = test_service();
        assert!(matches!(
            svc.register_user("  ", reg(Profile::Teacher)),
            Err(AccessError::Validation(_))
        ));
    }

    #[test]
    fn test_unknown_user() {
        let svc = test_service();
        assert!(matches!(svc.get_user("ghost"), Err(AccessError::NotFound(_))));
        assert!(matches!(svc.user_group_names("ghost"), Err(AccessError::NotFound(_))));
    }
}
