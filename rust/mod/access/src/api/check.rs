use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::{Json, Router};

use gatehouse_core::ServiceError;

use crate::api::AppState;
use crate::api::identity::Caller;
use crate::model::{CheckParams, Decision, EffectivePermissions, Operation};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/check", get(check))
        .route("/me/permissions", get(my_permissions))
        .route("/users/{id}/permissions", get(user_permissions))
}

/// GET /access/check?screen=/cadastro/turmas&operation=view
///
/// Decides for the calling identity. Returns `{"allowed", "source"}`.
async fn check(
    State(svc): State<AppState>,
    caller: Caller,
    Query(params): Query<CheckParams>,
) -> Result<Json<Decision>, ServiceError> {
    let decision = svc
        .check(&caller.0, &params.screen, params.operation)
        .map_err(ServiceError::from)?;
    Ok(Json(decision))
}

/// GET /access/me/permissions
async fn my_permissions(
    State(svc): State<AppState>,
    caller: Caller,
) -> Result<Json<EffectivePermissions>, ServiceError> {
    let eff = svc
        .effective(&caller.0.user_id, caller.0.profile)
        .map_err(ServiceError::from)?;
    Ok(Json(eff))
}

/// GET /access/users/{id}/permissions
async fn user_permissions(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<EffectivePermissions>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let eff = svc.effective_for_user(&id).map_err(ServiceError::from)?;
    Ok(Json(eff))
}
