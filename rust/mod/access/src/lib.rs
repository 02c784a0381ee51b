//! Access module: screen-level authorization decisions.
//!
//! # Resources
//!
//! - **Screen**: a path-addressable surface (`/cadastro/turmas`), optionally teacher-only
//! - **Group**: named set of users holding per-screen operation grants
//! - **Whitelist**: the only screens student and guardian profiles may reach
//! - **Override**: per-user, per-screen, time-bounded grant or denial
//! - **UserProfile**: canonical profile of each user, mirrored from authentication
//!
//! Decisions come from [`resolver::resolve`], which walks the tiers in a
//! fixed order and reports which tier decided.
//!
//! # Usage
//!
//! ```ignore
//! use access::{AccessModule, service::AccessConfig};
//!
//! let module = AccessModule::new(sql, AccessConfig::default())?;
//! let router = module.routes(); // Mount under /access
//! ```

pub mod model;
pub mod resolver;
pub mod service;
pub mod api;

use std::sync::Arc;

use axum::Router;

use gatehouse_core::Module;

use crate::service::{AccessConfig, AccessService};

/// Access module implementing the Module trait.
pub struct AccessModule {
    service: Arc<AccessService>,
}

impl AccessModule {
    /// Create a new AccessModule.
    pub fn new(
        sql: Arc<dyn gatehouse_sql::SQLStore>,
        config: AccessConfig,
    ) -> Result<Self, gatehouse_core::ServiceError> {
        let service = AccessService::new(sql, config).map_err(gatehouse_core::ServiceError::from)?;
        Ok(Self { service })
    }

    /// Get a reference to the underlying AccessService.
    pub fn service(&self) -> &Arc<AccessService> {
        &self.service
    }
}

impl Module for AccessModule {
    fn name(&self) -> &str {
        "access"
    }

    fn routes(&self) -> Router {
        api::build_router(self.service.clone())
    }
}
