//! Bootstrap: config checks and idempotent catalog seeding.
//!
//! When gatehoused starts:
//! 1. Verify the config is usable; refuse to start otherwise.
//! 2. Register every configured screen that is not registered yet.
//! 3. Write every configured whitelist entry that does not exist yet.
//!
//! Existing rows are never overwritten, so administrators' edits survive
//! restarts.

use tracing::{info, warn};

use access::model::{CreateScreen, Operations, Profile};
use access::service::AccessService;

use crate::config::ServerConfig;

/// Verify server configuration before touching storage.
pub fn verify_config(config: &ServerConfig) -> anyhow::Result<()> {
    if config.storage.data_dir.trim().is_empty() {
        anyhow::bail!("Storage data_dir is empty in configuration.");
    }
    if !config.access.admin_screen.starts_with('/') {
        anyhow::bail!(
            "access.admin_screen must be a screen path starting with '/', got {:?}",
            config.access.admin_screen
        );
    }
    for seed in &config.screens {
        if !seed.path.starts_with('/') {
            anyhow::bail!("screen seed {:?} has a path not starting with '/'", seed.name);
        }
    }
    for seed in &config.whitelist {
        let profile = whitelist_profile(&seed.profile)?;
        if !config.screens.iter().any(|s| s.path == seed.path) {
            warn!(profile = %profile, path = %seed.path, "whitelist seed refers to a screen outside the seed list");
        }
    }
    Ok(())
}

fn whitelist_profile(raw: &str) -> anyhow::Result<Profile> {
    let profile: Profile = raw
        .parse()
        .map_err(|e: String| anyhow::anyhow!("whitelist seed: {}", e))?;
    if !profile.is_whitelist_only() {
        anyhow::bail!("whitelist seed: profile '{}' is not governed by the whitelist", profile);
    }
    Ok(profile)
}

/// Seed screens and whitelist entries from configuration.
pub fn seed_catalog(svc: &AccessService, config: &ServerConfig) -> anyhow::Result<()> {
    let mut created = 0;
    for seed in &config.screens {
        let (_, is_new) = svc.ensure_screen(CreateScreen {
            name: seed.name.clone(),
            path: seed.path.clone(),
            teacher_only: seed.teacher_only,
        })?;
        if is_new {
            created += 1;
        }
    }
    info!(configured = config.screens.len(), created, "screen catalog seeded");

    let mut written = 0;
    for seed in &config.whitelist {
        let profile = whitelist_profile(&seed.profile)?;
        let operations: Operations = seed.operations.iter().map(|op| (*op, true)).collect();
        if svc.ensure_whitelist_entry(profile, &seed.path, operations)? {
            written += 1;
        }
    }
    info!(configured = config.whitelist.len(), written, "whitelist seeded");
    Ok(())
}
