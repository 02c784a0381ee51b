//! Permission precedence.
//!
//! The tiers, highest first:
//!
//! 1. **master** profile: everything, even unregistered screens
//! 2. **unregistered / inactive screen**: director only
//! 3. **whitelist**: the only source for student and guardian; an in-effect
//!    override left over from an earlier profile can still narrow it
//! 4. **teacher-only screen**: hard block for secretariat
//! 5. **override**: user-scoped, time-bounded, authoritative per key
//! 6. **group grants**: OR across every active group of the user
//! 7. **director default**: implicit access to unconfigured screens
//! 8. **deny**
//!
//! Everything here is decided against a [`PermissionSource`]; storage, clocks
//! and lazy expiry live behind it.

use crate::model::{Decision, DecisionSource, Operation, Operations, Profile, Screen};

/// Read access to every tier the resolver consults.
pub trait PermissionSource {
    type Error;

    /// Look up an *active* screen by path.
    fn active_screen(&self, path: &str) -> Result<Option<Screen>, Self::Error>;

    /// Whitelist operations for (profile, screen), if an entry exists.
    fn whitelist(&self, profile: Profile, screen_id: &str) -> Result<Option<Operations>, Self::Error>;

    /// Operations of the override currently in effect for (user, screen).
    ///
    /// Implementations reconcile elapsed rows they read before answering.
    fn active_override(&self, user_id: &str, screen_id: &str) -> Result<Option<Operations>, Self::Error>;

    /// Grants held on the screen by every active group the user belongs to.
    fn group_grants(&self, user_id: &str, screen_id: &str) -> Result<Vec<Operations>, Self::Error>;
}

/// Decide whether `user_id` with `profile` may perform `op` on `path`.
pub fn resolve<S: PermissionSource + ?Sized>(
    source: &S,
    user_id: &str,
    profile: Profile,
    path: &str,
    op: Operation,
) -> Result<Decision, S::Error> {
    if profile == Profile::Master {
        return Ok(Decision::allow(DecisionSource::Master));
    }

    match source.active_screen(path)? {
        Some(screen) => resolve_on_screen(source, user_id, profile, &screen, op),
        None if profile == Profile::Director => Ok(Decision::allow(DecisionSource::ProfileDefault)),
        None => Ok(Decision::deny(DecisionSource::Default)),
    }
}

/// Steps 3–8 for a screen that is already known to be active.
pub fn resolve_on_screen<S: PermissionSource + ?Sized>(
    source: &S,
    user_id: &str,
    profile: Profile,
    screen: &Screen,
    op: Operation,
) -> Result<Decision, S::Error> {
    if profile == Profile::Master {
        return Ok(Decision::allow(DecisionSource::Master));
    }

    if profile.is_whitelist_only() {
        let listed = source
            .whitelist(profile, &screen.id)?
            .is_some_and(|ops| ops.allows(op));
        if !listed {
            return Ok(Decision::deny(DecisionSource::WhitelistDeny));
        }
        if let Some(allowed) = override_value(source, user_id, &screen.id, op)? {
            return Ok(Decision { allowed, source: DecisionSource::Override });
        }
        return Ok(Decision::allow(DecisionSource::Whitelist));
    }

    if profile == Profile::Secretariat && screen.teacher_only {
        return Ok(Decision::deny(DecisionSource::RestrictedScreen));
    }

    if let Some(allowed) = override_value(source, user_id, &screen.id, op)? {
        return Ok(Decision { allowed, source: DecisionSource::Override });
    }

    let granted = source
        .group_grants(user_id, &screen.id)?
        .iter()
        .any(|ops| ops.allows(op));
    if granted {
        return Ok(Decision::allow(DecisionSource::Group));
    }

    if profile == Profile::Director {
        return Ok(Decision::allow(DecisionSource::ProfileDefault));
    }

    Ok(Decision::deny(DecisionSource::Default))
}

fn override_value<S: PermissionSource + ?Sized>(
    source: &S,
    user_id: &str,
    screen_id: &str,
    op: Operation,
) -> Result<Option<bool>, S::Error> {
    Ok(source
        .active_override(user_id, screen_id)?
        .and_then(|ops| ops.get(op)))
}
