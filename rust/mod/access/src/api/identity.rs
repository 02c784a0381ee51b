use axum::extract::FromRequestParts;
use axum::http::HeaderMap;
use axum::http::request::Parts;

use gatehouse_core::ServiceError;

use crate::model::{Identity, Operation};
use crate::service::AccessService;

/// Header carrying the authenticated user id.
pub const USER_ID_HEADER: &str = "x-user-id";
/// Header carrying the raw profile string from the authentication layer.
pub const USER_PROFILE_HEADER: &str = "x-user-profile";
/// Header carrying the master flag ("true" or "1").
pub const USER_MASTER_HEADER: &str = "x-user-master";

/// The calling identity, set by the upstream authentication gateway.
///
/// The profile is canonicalized here, once; unrecognized profiles are
/// rejected with 401.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

impl Caller {
    /// Require `op` on the administration screen.
    pub fn require_admin(&self, svc: &AccessService, op: Operation) -> Result<(), ServiceError> {
        svc.authorize_admin(&self.0, op).map_err(ServiceError::from)
    }
}

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = ServiceError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        identity_from_headers(&parts.headers).map(Caller)
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

fn identity_from_headers(headers: &HeaderMap) -> Result<Identity, ServiceError> {
    let user_id = header(headers, USER_ID_HEADER)
        .ok_or_else(|| ServiceError::Unauthorized("missing caller identity".into()))?;
    let raw_profile = header(headers, USER_PROFILE_HEADER).unwrap_or_default();
    let is_master = header(headers, USER_MASTER_HEADER)
        .is_some_and(|v| v == "1" || v.eq_ignore_ascii_case("true"));

    Identity::from_raw(user_id, raw_profile, is_master).ok_or_else(|| {
        ServiceError::Unauthorized(format!("unrecognized profile '{}'", raw_profile))
    })
}
