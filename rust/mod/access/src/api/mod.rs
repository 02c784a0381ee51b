pub mod identity;
mod check;
mod screens;
mod groups;
mod whitelist;
mod users;
mod overrides;

use std::sync::Arc;

use axum::Router;

use crate::service::AccessService;

/// Shared application state.
pub type AppState = Arc<AccessService>;

/// Build the complete access API router.
///
/// All routes are relative; the server nests them under `/access`.
pub fn build_router(svc: Arc<AccessService>) -> Router {
    Router::new()
        .merge(check::routes())
        .merge(screens::routes())
        .merge(groups::routes())
        .merge(whitelist::routes())
        .merge(users::routes())
        .merge(overrides::routes())
        .with_state(svc)
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{Duration, Utc};
    use tower::ServiceExt;

    use super::*;
    use crate::api::identity::{USER_ID_HEADER, USER_MASTER_HEADER, USER_PROFILE_HEADER};
    use crate::service::testing::test_service;

    /// (user id, raw profile); "master" sets the master flag instead.
    type Who = (&'static str, &'static str);

    const ROOT: Who = ("root", "master");
    const TEACHER: Who = ("t1", "Professor(a)");
    const STUDENT: Who = ("s1", "Aluno");

    async fn send(
        router: &Router,
        who: Option<Who>,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, Option<String>, Vec<u8>) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some((id, profile)) = who {
            builder = builder.header(USER_ID_HEADER, id);
            builder = if profile == "master" {
                builder.header(USER_MASTER_HEADER, "true")
            } else {
                builder.header(USER_PROFILE_HEADER, profile)
            };
        }
        if body.is_some() {
            builder = builder.header("content-type", "application/json");
        }
        let body = match body {
            Some(v) => Body::from(serde_json::to_string(&v).unwrap()),
            None => Body::empty(),
        };
        let req = builder.body(body).unwrap();
        let resp = router.clone().oneshot(req).await.unwrap();
        let status = resp.status();
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let bytes = axum::body::to_bytes(resp.into_body(), 1024 * 1024)
            .await
            .unwrap();
        (status, content_type, bytes.to_vec())
    }

    async fn api(
        router: &Router,
        who: Who,
        method: &str,
        uri: &str,
        body: Option<serde_json::Value>,
    ) -> (StatusCode, serde_json::Value) {
        let (status, _, bytes) = send(router, Some(who), method, uri, body).await;
        let json = if bytes.is_empty() {
            serde_json::json!(null)
        } else {
            serde_json::from_slice(&bytes).unwrap_or(serde_json::json!(null))
        };
        (status, json)
    }

    /// Router plus a registered teacher and one screen, set up as master.
    async fn seeded() -> (Router, String) {
        let router = build_router(test_service());
        let (status, screen) = api(
            &router,
            ROOT,
            "POST",
            "/screens",
            Some(serde_json::json!({"name": "Notas", "path": "/notas"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = api(
            &router,
            ROOT,
            "PUT",
            "/users/t1",
            Some(serde_json::json!({"profile": "teacher"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        (router, screen["id"].as_str().unwrap().to_string())
    }

    #[tokio::test]
    async fn test_missing_identity_is_401() {
        let router = build_router(test_service());
        let (status, _, bytes) = send(&router, None, "GET", "/check?screen=/x&operation=view", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["code"], "UNAUTHENTICATED");

        let (status, _) = api(&router, ("u1", "janitor"), "GET", "/me/permissions", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_check_group_grant() {
        let (router, screen_id) = seeded().await;

        let (status, group) = api(&router, ROOT, "POST", "/groups", Some(serde_json::json!({"name": "Docentes"}))).await;
        assert_eq!(status, StatusCode::CREATED);
        let gid = group["id"].as_str().unwrap().to_string();

        let (status, _) = api(
            &router,
            ROOT,
            "POST",
            &format!("/groups/{}/members", gid),
            Some(serde_json::json!({"user_id": "t1"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);

        let (status, _) = api(
            &router,
            ROOT,
            "PUT",
            &format!("/groups/{}/grants/{}", gid, screen_id),
            Some(serde_json::json!({"operations": {"view": true}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (status, body) = api(&router, TEACHER, "GET", "/check?screen=/notas&operation=view", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"allowed": true, "source": "group"}));

        let (_, body) = api(&router, TEACHER, "GET", "/check?screen=/notas&operation=delete", None).await;
        assert_eq!(body, serde_json::json!({"allowed": false, "source": "default"}));

        let (_, body) = api(&router, TEACHER, "GET", "/me/permissions", None).await;
        assert_eq!(body["scope"], "screens");
        assert_eq!(body["screens"]["/notas"]["view"], true);
        assert_eq!(body["screens"]["/notas"]["update"], false);

        let (_, body) = api(&router, ROOT, "GET", "/users/t1/groups", None).await;
        assert_eq!(body["items"], serde_json::json!(["Docentes"]));
    }

    #[tokio::test]
    async fn test_master_permissions_sentinel() {
        let router = build_router(test_service());
        let (status, body) = api(&router, ROOT, "GET", "/me/permissions", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, serde_json::json!({"scope": "all"}));
    }

    #[tokio::test]
    async fn test_admin_routes_are_guarded() {
        let (router, _) = seeded().await;

        // Teachers have no grant on the administration screen.
        let (status, body) = api(&router, TEACHER, "GET", "/screens", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(body["code"], "PERMISSION_DENIED");
        assert_eq!(body["message"], "permission denied");

        let (status, _) = api(&router, STUDENT, "GET", "/groups", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        // Directors pass through the unconfigured administration screen.
        let (status, body) = api(&router, ("d1", "Diretor"), "GET", "/screens", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
    }

    #[tokio::test]
    async fn test_override_lifecycle_over_http() {
        let (router, screen_id) = seeded().await;
        let now = Utc::now();
        let window = serde_json::json!({
            "screen_id": screen_id,
            "operations": {"view": true},
            "starts_at": (now - Duration::hours(1)).to_rfc3339(),
            "ends_at": (now + Duration::hours(1)).to_rfc3339(),
        });

        let (status, created) = api(&router, ROOT, "POST", "/users/t1/overrides", Some(window.clone())).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(created.as_array().unwrap().len(), 1);
        assert_eq!(created[0]["status"], "ACTIVE");
        let oid = created[0]["id"].as_str().unwrap().to_string();

        let (status, body) = api(&router, ROOT, "POST", "/users/t1/overrides", Some(window)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "OVERLAPPING_PERIOD");

        let (_, body) = api(&router, TEACHER, "GET", "/check?screen=/notas&operation=view", None).await;
        assert_eq!(body["source"], "override");

        let (_, listed) = api(&router, ROOT, "GET", "/users/t1/overrides?active=true", None).await;
        assert_eq!(listed["items"].as_array().unwrap().len(), 1);
        assert_eq!(listed["items"][0]["screen_path"], "/notas");

        let (status, revoked) = api(&router, ROOT, "POST", &format!("/overrides/{}/revoke", oid), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(revoked["status"], "REVOKED");

        let (_, body) = api(&router, TEACHER, "GET", "/check?screen=/notas&operation=view", None).await;
        assert_eq!(body["allowed"], false);
    }

    #[tokio::test]
    async fn test_override_validation_errors() {
        let (router, screen_id) = seeded().await;
        let (status, body) = api(
            &router,
            ROOT,
            "POST",
            "/users/t1/overrides",
            Some(serde_json::json!({
                "screen_id": screen_id,
                "operations": {"view": true},
                "starts_at": "2031-01-02T10:00:00Z",
                "ends_at": "2031-01-01T10:00:00Z",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PERIOD");

        api(&router, ROOT, "PUT", "/users/s1", Some(serde_json::json!({"profile": "student"}))).await;
        let (status, body) = api(
            &router,
            ROOT,
            "POST",
            "/users/s1/overrides",
            Some(serde_json::json!({
                "screen_id": screen_id,
                "operations": {"view": true},
                "starts_at": "2031-01-01T10:00:00Z",
                "ends_at": "2031-01-02T10:00:00Z",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn test_export() {
        let (router, screen_id) = seeded().await;
        api(
            &router,
            ROOT,
            "POST",
            "/users/t1/overrides",
            Some(serde_json::json!({
                "screen_id": screen_id,
                "operations": {"export": true},
                "starts_at": "2031-01-01T10:00:00Z",
                "ends_at": "2031-01-02T10:00:00Z",
            })),
        )
        .await;

        let (status, content_type, bytes) =
            send(&router, Some(ROOT), "GET", "/users/t1/overrides/export?format=tsv", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(content_type.unwrap().starts_with("text/tab-separated-values"));
        let text = String::from_utf8(bytes).unwrap();
        assert!(text.starts_with("screen\toperations\tstarts_at\tends_at\tstatus\n"));
        assert!(text.contains("/notas\texport=true\t2031-01-01T10:00:00Z\t2031-01-02T10:00:00Z\tACTIVE"));

        let (status, body) = api(&router, ROOT, "GET", "/users/t1/overrides/export?format=xlsx", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "VALIDATION_FAILED");
    }

    #[tokio::test]
    async fn test_override_batch_over_http() {
        let (router, screen_id) = seeded().await;
        let batch = serde_json::json!([
            {"screen_id": screen_id, "operations": {"view": true},
             "starts_at": "2031-03-10T08:00", "ends_at": "2031-03-10T12:00"},
            {"screen_id": screen_id, "operations": {"view": false},
             "starts_at": "2031-03-11T08:00", "ends_at": "2031-03-10T20:00:00-03:00"},
        ]);
        let (status, body) = api(&router, ROOT, "POST", "/users/t1/overrides", Some(batch)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "INVALID_PERIOD");

        let batch = serde_json::json!([
            {"screen_id": screen_id, "operations": {"view": true},
             "starts_at": "2031-03-10T08:00", "ends_at": "2031-03-10T12:00"},
            {"screen_id": screen_id, "operations": {"view": false},
             "starts_at": "2031-03-10T11:00", "ends_at": "2031-03-10T13:00"},
        ]);
        let (status, body) = api(&router, ROOT, "POST", "/users/t1/overrides", Some(batch)).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "OVERLAPPING_PERIOD");

        let (_, listed) = api(&router, ROOT, "GET", "/users/t1/overrides", None).await;
        assert!(listed["items"].as_array().unwrap().is_empty());

        let batch = serde_json::json!([
            {"screen_id": screen_id, "operations": {"view": true},
             "starts_at": "2031-03-10T08:00", "ends_at": "2031-03-10T12:00"},
            {"screen_id": screen_id, "operations": {"view": false},
             "starts_at": "2031-03-11T08:00", "ends_at": "2031-03-12T00:00"},
        ]);
        let (status, created) = api(&router, ROOT, "POST", "/users/t1/overrides", Some(batch)).await;
        assert_eq!(status, StatusCode::CREATED);
        let created = created.as_array().unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0]["starts_at"], "2031-03-10T11:00:00Z");
        // Local midnight end covers the whole of that day.
        assert_eq!(created[1]["ends_at"], "2031-03-13T02:59:59Z");
    }

    #[tokio::test]
    async fn test_whitelist_routes() {
        let (router, screen_id) = seeded().await;
        let (status, _) = api(
            &router,
            ROOT,
            "PUT",
            &format!("/whitelist/aluno/{}", screen_id),
            Some(serde_json::json!({"operations": {"view": true}})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);

        let (_, body) = api(&router, STUDENT, "GET", "/check?screen=/notas&operation=view", None).await;
        assert_eq!(body["source"], "whitelist");

        let (status, _) = api(&router, ROOT, "GET", "/whitelist/teacher", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = api(&router, ROOT, "DELETE", &format!("/whitelist/student/{}", screen_id), None).await;
        assert_eq!(status, StatusCode::NO_CONTENT);

        let (_, body) = api(&router, STUDENT, "GET", "/check?screen=/notas&operation=view", None).await;
        assert_eq!(body["source"], "whitelistDeny");
    }

    #[tokio::test]
    async fn test_screen_deactivate_and_conflict() {
        let (router, screen_id) = seeded().await;
        let (status, body) = api(
            &router,
            ROOT,
            "POST",
            "/screens",
            Some(serde_json::json!({"name": "Other", "path": "/notas"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["code"], "ALREADY_EXISTS");

        let (status, body) = api(&router, ROOT, "DELETE", &format!("/screens/{}", screen_id), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["active"], false);

        let (_, body) = api(&router, ROOT, "GET", "/screens?include_inactive=true", None).await;
        assert_eq!(body["total"], 1);
        let (_, body) = api(&router, ROOT, "GET", "/screens", None).await;
        assert_eq!(body["total"], 0);
    }
}
