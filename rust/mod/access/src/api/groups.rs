use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, put};
use axum::{Json, Router};
use serde::Deserialize;

use gatehouse_core::{ListParams, ListResult, ServiceError};

use crate::api::AppState;
use crate::api::identity::Caller;
use crate::model::{
    AddGroupMember, CreateGroup, Group, GroupGrant, GroupMember, Operation, Operations,
    PutGroupGrant,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/groups", get(list_groups).post(create_group))
        .route(
            "/groups/{id}",
            get(get_group).put(update_group).delete(deactivate_group),
        )
        .route("/groups/{id}/members", get(list_members).post(add_member))
        .route("/groups/{id}/members/{user_id}", delete(remove_member))
        .route("/groups/{id}/grants", get(list_grants).put(replace_grants))
        .route(
            "/groups/{id}/grants/{screen_id}",
            put(put_grant).delete(remove_grant),
        )
}

/// Body of `PUT /groups/{id}/grants/{screen_id}`.
#[derive(Debug, Deserialize)]
struct GrantBody {
    operations: Operations,
}

async fn list_groups(
    State(svc): State<AppState>,
    caller: Caller,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResult<Group>>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let result = svc.list_groups(&params).map_err(ServiceError::from)?;
    Ok(Json(result))
}

async fn create_group(
    State(svc): State<AppState>,
    caller: Caller,
    Json(input): Json<CreateGroup>,
) -> Result<(StatusCode, Json<Group>), ServiceError> {
    caller.require_admin(&svc, Operation::Create)?;
    let group = svc.create_group(input).map_err(ServiceError::from)?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn get_group(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Group>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let group = svc.get_group(&id).map_err(ServiceError::from)?;
    Ok(Json(group))
}

async fn update_group(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<Group>, ServiceError> {
    caller.require_admin(&svc, Operation::Update)?;
    let group = svc.update_group(&id, patch).map_err(ServiceError::from)?;
    Ok(Json(group))
}

async fn deactivate_group(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Group>, ServiceError> {
    caller.require_admin(&svc, Operation::Delete)?;
    let group = svc.deactivate_group(&id).map_err(ServiceError::from)?;
    Ok(Json(group))
}

async fn list_members(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let members = svc.list_group_members(&id).map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({"items": members})))
}

async fn add_member(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(input): Json<AddGroupMember>,
) -> Result<(StatusCode, Json<GroupMember>), ServiceError> {
    caller.require_admin(&svc, Operation::Update)?;
    let member = svc.add_group_member(&id, input).map_err(ServiceError::from)?;
    Ok((StatusCode::CREATED, Json(member)))
}

async fn remove_member(
    State(svc): State<AppState>,
    caller: Caller,
    Path((id, user_id)): Path<(String, String)>,
) -> Result<StatusCode, ServiceError> {
    caller.require_admin(&svc, Operation::Update)?;
    svc.remove_group_member(&id, &user_id).map_err(ServiceError::from)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_grants(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let grants = svc.list_group_grants(&id).map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({"items": grants})))
}

async fn replace_grants(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(grants): Json<Vec<PutGroupGrant>>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    caller.require_admin(&svc, Operation::Update)?;
    let stored = svc.replace_group_grants(&id, grants).map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({"items": stored})))
}

async fn put_grant(
    State(svc): State<AppState>,
    caller: Caller,
    Path((id, screen_id)): Path<(String, String)>,
    Json(body): Json<GrantBody>,
) -> Result<Json<GroupGrant>, ServiceError> {
    caller.require_admin(&svc, Operation::Update)?;
    let grant = svc
        .put_group_grant(&id, PutGroupGrant { screen_id, operations: body.operations })
        .map_err(ServiceError::from)?;
    Ok(Json(grant))
}

async fn remove_grant(
    State(svc): State<AppState>,
    caller: Caller,
    Path((id, screen_id)): Path<(String, String)>,
) -> Result<StatusCode, ServiceError> {
    caller.require_admin(&svc, Operation::Update)?;
    svc.remove_group_grant(&id, &screen_id).map_err(ServiceError::from)?;
    Ok(StatusCode::NO_CONTENT)
}
