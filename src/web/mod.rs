pub mod admin;
pub mod agency;
pub mod auth;
pub mod complaints;
pub mod feedback;
pub mod session;

use crate::error::AppError;
use crate::services::uploads::PUBLIC_PREFIX;
use crate::state::SharedState;
use anyhow::Context;
use axum::{
    extract::FromRequest,
    http::{header, HeaderValue, Method, Uri},
    routing::get,
    Json, Router,
};
use chrono::Utc;
use serde_json::json;
use tower_http::{
    cors::CorsLayer, services::ServeDir, set_header::SetResponseHeader, trace::TraceLayer,
};

/// `axum::Json` whose rejections render as field errors.
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

async fn health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "timestamp": Utc::now() }))
}

async fn not_found(uri: Uri) -> AppError {
    AppError::not_found(format!("Can't find {} on the server", uri.path()))
}

pub fn routes(state: SharedState) -> Router {
    let api = Router::new()
        .route("/health", get(health))
        .nest("/auth", auth::router(state.clone()))
        .nest("/complaints", complaints::router(state.clone()))
        .nest("/admin", admin::router(state.clone()))
        .nest("/agency", agency::router(state.clone()))
        .nest("/feedback", feedback::router(state.clone()));

    let uploads = SetResponseHeader::overriding(
        ServeDir::new(state.images.dir()),
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );

    Router::new()
        .nest("/api", api)
        .nest_service(PUBLIC_PREFIX, uploads)
        .fallback(not_found)
}

/// The full application: routes plus CORS for the configured frontend and
/// request tracing.
pub fn app(state: SharedState) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(&state.config.frontend_url)
        .with_context(|| format!("FRONTEND_URL is not a valid origin: {}", state.config.frontend_url))?;

    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_credentials(true)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PATCH,
            Method::PUT,
            Method::DELETE,
            Method::OPTIONS,
        ])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION]);

    Ok(routes(state).layer(cors).layer(TraceLayer::new_for_http()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppConfig;
    use crate::middleware::Limiters;
    use crate::services::uploads::ImageStore;
    use crate::state::AppState;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use base64::{engine::general_purpose, Engine as _};
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;
    use tower::ServiceExt;
    use uuid::Uuid;

    const KEY: &[u8] = b"0123456789abcdef0123456789abcdef";

    /// State backed by a pool that never connects; every request below is
    /// answered before the database is touched.
    fn test_state(uploads: &std::path::Path) -> SharedState {
        let key = general_purpose::STANDARD.encode(KEY);
        let dir = uploads.to_string_lossy().to_string();
        let config = AppConfig::from_lookup(|name| match name {
            "DATABASE_URL" => Some("postgres://localhost/unused".to_string()),
            "SESSION_KEY" => Some(key.clone()),
            "UPLOADS_DIR" => Some(dir.clone()),
            _ => None,
        })
        .unwrap();
        let pool = PgPoolOptions::new()
            .connect_lazy(&config.database_url)
            .unwrap();
        let images = ImageStore::new(&config.uploads_dir, config.max_upload_bytes);

        Arc::new(AppState {
            pool,
            config,
            images,
            limiters: Limiters::default(),
        })
    }

    async fn send(app: Router, request: Request<Body>) -> (StatusCode, serde_json::Value) {
        let response = app.oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
        (status, body)
    }

    fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn error_fields(body: &serde_json::Value) -> Vec<String> {
        body["errors"]
            .as_array()
            .map(|errors| {
                errors
                    .iter()
                    .filter_map(|e| e["field"].as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_health() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let request = Request::get("/api/health").body(Body::empty()).unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["timestamp"].is_string());
    }

    #[tokio::test]
    async fn test_unknown_route_is_json_404() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let request = Request::get("/api/nothing-here").body(Body::empty()).unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);
        assert_eq!(body["message"], "Can't find /api/nothing-here on the server");
    }

    #[tokio::test]
    async fn test_admin_routes_require_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        for uri in ["/api/admin/stats", "/api/admin/export", "/api/agency/complaints", "/api/auth/status"] {
            let request = Request::get(uri).body(Body::empty()).unwrap();
            let (status, body) = send(app.clone(), request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED, "{uri}");
            assert_eq!(body["success"], false);
        }
    }

    #[tokio::test]
    async fn test_forged_and_expired_sessions_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let forged = session::sign_session(
            Uuid::new_v4(),
            Utc::now() + chrono::Duration::hours(1),
            b"ffffffffffffffffffffffffffffffff",
        )
        .unwrap();
        let expired =
            session::sign_session(Uuid::new_v4(), Utc::now() - chrono::Duration::hours(1), KEY).unwrap();

        for token in [forged, expired, "garbage".to_string()] {
            let request = Request::get("/api/admin/stats")
                .header(header::COOKIE, format!("session={token}"))
                .body(Body::empty())
                .unwrap();
            let (status, _) = send(app.clone(), request).await;
            assert_eq!(status, StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn test_status_update_requires_session() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let request = json_request(
            "PATCH",
            &format!("/api/complaints/{}", Uuid::new_v4()),
            json!({ "status": "RESOLVED" }),
        );
        let (status, _) = send(app.clone(), request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let request = json_request(
            "POST",
            &format!("/api/complaints/{}/responses", Uuid::new_v4()),
            json!({ "message": "On it" }),
        );
        let (status, _) = send(app, request).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_submit_rejects_short_description() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let request = json_request(
            "POST",
            "/api/complaints",
            json!({
                "fullName": "Jane Citizen",
                "email": "jane@example.com",
                "category": "EDUCATION",
                "description": "short"
            }),
        );
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_fields(&body), vec!["description"]);
    }

    #[tokio::test]
    async fn test_submit_rejects_malformed_json() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let request = Request::post("/api/complaints")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{not json"))
            .unwrap();
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_fields(&body), vec!["body"]);
    }

    #[tokio::test]
    async fn test_feedback_requires_message() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let request = json_request("POST", "/api/feedback", json!({ "message": "   " }));
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_fields(&body), vec!["message"]);
    }

    #[tokio::test]
    async fn test_login_validation() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let request = json_request(
            "POST",
            "/api/auth/login",
            json!({ "email": "not-an-email", "password": "x" }),
        );
        let (status, body) = send(app, request).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error_fields(&body), vec!["email"]);
    }

    #[tokio::test]
    async fn test_login_is_throttled() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let mut last = StatusCode::OK;
        for _ in 0..6 {
            let mut request = json_request("POST", "/api/auth/login", json!({ "email": "bad" }));
            request
                .headers_mut()
                .insert("x-forwarded-for", HeaderValue::from_static("203.0.113.9"));
            last = send(app.clone(), request).await.0;
        }
        assert_eq!(last, StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_rotating_forwarded_for_does_not_reset_limit() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let mut statuses = Vec::new();
        for i in 0..6 {
            let mut request = json_request("POST", "/api/auth/login", json!({ "email": "bad" }));
            request.headers_mut().insert(
                "x-forwarded-for",
                HeaderValue::from_str(&format!("198.51.100.{i}")).unwrap(),
            );
            statuses.push(send(app.clone(), request).await.0);
        }
        assert_eq!(statuses[..5], [StatusCode::BAD_REQUEST; 5]);
        assert_eq!(statuses[5], StatusCode::TOO_MANY_REQUESTS);
    }

    #[tokio::test]
    async fn test_logout_clears_cookie() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let request = Request::post("/api/auth/logout").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let cookie = response.headers()[header::SET_COOKIE].to_str().unwrap();
        assert!(cookie.starts_with("session=;"));
        assert!(cookie.contains("Max-Age=0"));
    }

    #[tokio::test]
    async fn test_uploads_served_with_nosniff() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("photo.png"), b"\x89PNG").unwrap();
        let app = app(test_state(dir.path())).unwrap();

        let request = Request::get("/uploads/photo.png").body(Body::empty()).unwrap();
        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    }
}
