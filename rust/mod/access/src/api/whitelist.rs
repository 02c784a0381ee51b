use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, put};
use axum::{Json, Router};

use gatehouse_core::ServiceError;

use crate::api::AppState;
use crate::api::identity::Caller;
use crate::model::{Operation, Profile, PutWhitelistEntry, WhitelistEntry};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/whitelist/{profile}", get(list_whitelist))
        .route(
            "/whitelist/{profile}/{screen_id}",
            put(put_entry).delete(remove_entry),
        )
}

fn parse_profile(raw: &str) -> Result<Profile, ServiceError> {
    raw.parse().map_err(ServiceError::Validation)
}

async fn list_whitelist(
    State(svc): State<AppState>,
    caller: Caller,
    Path(profile): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let entries = svc
        .list_whitelist(parse_profile(&profile)?)
        .map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({"items": entries})))
}

async fn put_entry(
    State(svc): State<AppState>,
    caller: Caller,
    Path((profile, screen_id)): Path<(String, String)>,
    Json(input): Json<PutWhitelistEntry>,
) -> Result<Json<WhitelistEntry>, ServiceError> {
    caller.require_admin(&svc, Operation::Update)?;
    let entry = svc
        .put_whitelist_entry(parse_profile(&profile)?, &screen_id, input)
        .map_err(ServiceError::from)?;
    Ok(Json(entry))
}

async fn remove_entry(
    State(svc): State<AppState>,
    caller: Caller,
    Path((profile, screen_id)): Path<(String, String)>,
) -> Result<StatusCode, ServiceError> {
    caller.require_admin(&svc, Operation::Delete)?;
    svc.remove_whitelist_entry(parse_profile(&profile)?, &screen_id)
        .map_err(ServiceError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
