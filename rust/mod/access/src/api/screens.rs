use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::get;
use axum::{Json, Router};

use gatehouse_core::{ListParams, ListResult, ServiceError};

use crate::api::AppState;
use crate::api::identity::Caller;
use crate::model::{CreateScreen, Operation, Screen, ScreenQuery};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/screens", get(list_screens).post(create_screen))
        .route(
            "/screens/{id}",
            get(get_screen).put(update_screen).delete(deactivate_screen),
        )
}

async fn list_screens(
    State(svc): State<AppState>,
    caller: Caller,
    Query(query): Query<ScreenQuery>,
    Query(params): Query<ListParams>,
) -> Result<Json<ListResult<Screen>>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let result = svc.list_screens(&query, &params).map_err(ServiceError::from)?;
    Ok(Json(result))
}

async fn create_screen(
    State(svc): State<AppState>,
    caller: Caller,
    Json(input): Json<CreateScreen>,
) -> Result<(StatusCode, Json<Screen>), ServiceError> {
    caller.require_admin(&svc, Operation::Create)?;
    let screen = svc.create_screen(input).map_err(ServiceError::from)?;
    Ok((StatusCode::CREATED, Json(screen)))
}

async fn get_screen(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Screen>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let screen = svc.get_screen(&id).map_err(ServiceError::from)?;
    Ok(Json(screen))
}

async fn update_screen(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    Json(patch): Json<serde_json::Value>,
) -> Result<Json<Screen>, ServiceError> {
    caller.require_admin(&svc, Operation::Update)?;
    let screen = svc.update_screen(&id, patch).map_err(ServiceError::from)?;
    Ok(Json(screen))
}

/// DELETE deactivates; screens are never removed.
async fn deactivate_screen(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Screen>, ServiceError> {
    caller.require_admin(&svc, Operation::Delete)?;
    let screen = svc.deactivate_screen(&id).map_err(ServiceError::from)?;
    Ok(Json(screen))
}
