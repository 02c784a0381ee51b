//! Route registration: module routes plus system endpoints.

use axum::Router;
use axum::response::IntoResponse;
use axum::routing::get;

/// Build the complete router.
///
/// Each module's routes are mounted under `/{module_name}`.
pub fn build_router(module_routes: Vec<(&str, Router)>) -> Router {
    let mut app = Router::new()
        .route("/health", get(health))
        .route("/version", get(version));

    for (name, router) in module_routes {
        app = app.nest(&format!("/{}", name), router);
    }
    app
}

async fn health() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "status": "ok",
    }))
}

async fn version() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": "gatehoused",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    use access::AccessModule;
    use access::service::AccessConfig;
    use gatehouse_core::Module;
    use gatehouse_sql::SqliteStore;

    use super::*;

    async fn get_json(app: &Router, uri: &str, headers: &[(&str, &str)]) -> (StatusCode, serde_json::Value) {
        let mut builder = Request::builder().method("GET").uri(uri);
        for (k, v) in headers {
            builder = builder.header(*k, *v);
        }
        let resp = app.clone().oneshot(builder.body(Body::empty()).unwrap()).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(serde_json::json!(null)))
    }

    fn app() -> Router {
        let sql = Arc::new(SqliteStore::open_in_memory().unwrap());
        let module = AccessModule::new(sql, AccessConfig::default()).unwrap();
        build_router(vec![(module.name(), module.routes())])
    }

    #[tokio::test]
    async fn test_system_endpoints() {
        let app = app();
        let (status, body) = get_json(&app, "/health", &[]).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");

        let (_, body) = get_json(&app, "/version", &[]).await;
        assert_eq!(body["name"], "gatehoused");
    }

    #[tokio::test]
    async fn test_module_mounted_under_name() {
        let app = app();
        let (status, body) = get_json(
            &app,
            "/access/check?screen=/home&operation=view",
            &[("x-user-id", "d1"), ("x-user-profile", "director")],
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["source"], "profileDefault");
    }
}
