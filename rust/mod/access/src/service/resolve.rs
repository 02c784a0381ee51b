use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use gatehouse_sql::Value;

use crate::model::{
    Decision, DecisionSource, EffectivePermissions, Identity, Operation, Operations,
    PermissionMatrix, Profile, Screen,
};
use crate::resolver::{self, PermissionSource};
use crate::service::{AccessError, AccessService, decode_operations};

/// Resolver tiers read from the SQL store at one instant.
struct SqlSource<'a> {
    svc: &'a AccessService,
    now: DateTime<Utc>,
}

impl PermissionSource for SqlSource<'_> {
    type Error = AccessError;

    fn active_screen(&self, path: &str) -> Result<Option<Screen>, AccessError> {
        Ok(self.svc.find_screen_by_path(path)?.filter(|s| s.active))
    }

    fn whitelist(&self, profile: Profile, screen_id: &str) -> Result<Option<Operations>, AccessError> {
        self.svc.whitelist_operations(profile, screen_id)
    }

    fn active_override(&self, user_id: &str, screen_id: &str) -> Result<Option<Operations>, AccessError> {
        Ok(self
            .svc
            .in_effect_override(user_id, screen_id, self.now)?
            .map(|o| o.operations))
    }

    fn group_grants(&self, user_id: &str, screen_id: &str) -> Result<Vec<Operations>, AccessError> {
        let rows = self.svc.sql.query(
            "SELECT gg.operations AS operations FROM group_grants gg
             JOIN group_members gm ON gm.group_id = gg.group_id
             JOIN groups g ON g.id = gg.group_id
             WHERE gm.user_id = ?1 AND gg.screen_id = ?2 AND g.active = 1",
            &[Value::Text(user_id.to_string()), Value::Text(screen_id.to_string())],
        )?;
        rows.iter().map(|r| decode_operations(r, "operations")).collect()
    }
}

impl AccessService {
    fn source(&self) -> SqlSource<'_> {
        SqlSource { svc: self, now: Utc::now() }
    }

    /// Decide whether the caller may perform `op` on the screen at `path`.
    ///
    /// Every refusal is logged as a warning with its source tag.
    pub fn check(&self, who: &Identity, path: &str, op: Operation) -> Result<Decision, AccessError> {
        let decision = resolver::resolve(&self.source(), &who.user_id, who.profile, path, op)?;
        if decision.allowed {
            debug!(user = %who.user_id, profile = %who.profile, path, operation = %op, source = %decision.source, "access granted");
        } else {
            warn!(user = %who.user_id, profile = %who.profile, path, operation = %op, source = %decision.source, "access denied");
        }
        Ok(decision)
    }

    /// Like [`check`](Self::check), but a refusal becomes `AccessError::Denied`.
    pub fn authorize(&self, who: &Identity, path: &str, op: Operation) -> Result<(), AccessError> {
        let decision = self.check(who, path, op)?;
        if decision.allowed {
            Ok(())
        } else {
            Err(AccessError::Denied(decision.source))
        }
    }

    /// Guard for the administrative API.
    ///
    /// Student and guardian profiles never administer access, whatever the
    /// whitelist says.
    pub fn authorize_admin(&self, who: &Identity, op: Operation) -> Result<(), AccessError> {
        if who.profile.is_whitelist_only() {
            warn!(user = %who.user_id, profile = %who.profile, path = %self.config.admin_screen, operation = %op, "administration refused for whitelist-only profile");
            return Err(AccessError::Denied(DecisionSource::WhitelistDeny));
        }
        self.authorize(who, &self.config.admin_screen, op)
    }

    /// Every operation on every active screen the user may perform.
    pub fn effective(&self, user_id: &str, profile: Profile) -> Result<EffectivePermissions, AccessError> {
        if profile == Profile::Master {
            return Ok(EffectivePermissions::All);
        }

        let source = self.source();
        let mut matrix = PermissionMatrix::new();
        for screen in self.active_screens()? {
            let mut cells = std::collections::BTreeMap::new();
            for op in Operation::ALL {
                let decision = resolver::resolve_on_screen(&source, user_id, profile, &screen, op)?;
                cells.insert(op, decision.allowed);
            }
            matrix.insert(screen.path, cells);
        }
        Ok(EffectivePermissions::Screens(matrix))
    }

    /// Effective permissions of a registered user, looked up by id.
    pub fn effective_for_user(&self, user_id: &str) -> Result<EffectivePermissions, AccessError> {
        let user = self.get_user(user_id)?;
        self.effective(&user.id, user.profile)
    }
}
