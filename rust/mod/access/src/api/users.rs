use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};

use gatehouse_core::ServiceError;

use crate::api::AppState;
use crate::api::identity::Caller;
use crate::model::{Operation, RegisterUser, UserProfile};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{id}", get(get_user).put(register_user))
        .route("/users/{id}/groups", get(user_groups))
}

async fn get_user(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<UserProfile>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let user = svc.get_user(&id).map_err(ServiceError::from)?;
    Ok(Json(user))
}

/// PUT registers the user or replaces their profile.
async fn register_user(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(input): Json<RegisterUser>,
) -> Result<Json<UserProfile>, ServiceError> {
    caller.require_admin(&svc, Operation::Update)?;
    let user = svc.register_user(&id, input).map_err(ServiceError::from)?;
    Ok(Json(user))
}

/// GET /access/users/{id}/groups: names of the user's groups.
async fn user_groups(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let names = svc.user_group_names(&id).map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({"items": names})))
}
