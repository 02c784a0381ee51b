use axum::extract::{Path, Query, State};
use axum::http::{StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;

use gatehouse_core::ServiceError;

use crate::api::AppState;
use crate::api::identity::Caller;
use crate::model::{CreateOverride, ExportFormat, Operation, Override, OverrideQuery};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/users/{id}/overrides", get(list_overrides).post(create_overrides))
        .route("/users/{id}/overrides/export", get(export_overrides))
        .route("/overrides/{id}", get(get_override))
        .route("/overrides/{id}/revoke", post(revoke_override))
}

/// Body of an override creation: one window or several.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum CreateOverrideBody {
    Many(Vec<CreateOverride>),
    One(CreateOverride),
}

impl CreateOverrideBody {
    fn into_vec(self) -> Vec<CreateOverride> {
        match self {
            CreateOverrideBody::Many(items) => items,
            CreateOverrideBody::One(item) => vec![item],
        }
    }
}

#[derive(Debug, Deserialize)]
struct ExportParams {
    #[serde(default)]
    format: Option<String>,
}

async fn list_overrides(
    State(svc): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
    Query(query): Query<OverrideQuery>,
) -> Result<Json<serde_json::Value>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let items = svc.list_overrides(&user_id, &query).map_err(ServiceError::from)?;
    Ok(Json(serde_json::json!({"items": items})))
}

/// POST /access/users/{id}/overrides
///
/// Takes one override or an array of them and always answers with the
/// created list. A batch is stored all or nothing.
async fn create_overrides(
    State(svc): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
    Json(body): Json<CreateOverrideBody>,
) -> Result<(StatusCode, Json<Vec<Override>>), ServiceError> {
    caller.require_admin(&svc, Operation::Create)?;
    let created = svc
        .create_overrides(&user_id, body.into_vec())
        .map_err(ServiceError::from)?;
    Ok((StatusCode::CREATED, Json(created)))
}

async fn get_override(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Override>, ServiceError> {
    caller.require_admin(&svc, Operation::View)?;
    let entry = svc.get_override(&id).map_err(ServiceError::from)?;
    Ok(Json(entry))
}

async fn revoke_override(
    State(svc): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<Override>, ServiceError> {
    caller.require_admin(&svc, Operation::Delete)?;
    let entry = svc.revoke_override(&id).map_err(ServiceError::from)?;
    Ok(Json(entry))
}

/// GET /access/users/{id}/overrides/export?format=csv|tsv
async fn export_overrides(
    State(svc): State<AppState>,
    caller: Caller,
    Path(user_id): Path<String>,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse, ServiceError> {
    caller.require_admin(&svc, Operation::Export)?;
    let format: ExportFormat = match params.format.as_deref() {
        Some(raw) => raw.parse().map_err(ServiceError::Validation)?,
        None => ExportFormat::default(),
    };
    let body = svc.export_overrides(&user_id, format).map_err(ServiceError::from)?;

    let headers = [
        (header::CONTENT_TYPE, format.content_type().to_string()),
        (
            header::CONTENT_DISPOSITION,
            format!(
                "attachment; filename=\"overrides-{}.{}\"",
                filename_safe(&user_id),
                format.extension()
            ),
        ),
    ];
    Ok((headers, body))
}

/// Keep only `[A-Za-z0-9_-]` so an id can sit inside a quoted header value.
fn filename_safe(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-')
        .collect()
}
