use crate::db::{self, DbUser};
use crate::domain::access::Caller;
use crate::domain::models::{Agency, Role};
use crate::domain::validation::{is_valid_email, normalize_email};
use crate::error::{AppError, FieldError};
use crate::middleware::throttle;
use crate::state::SharedState;
use crate::web::session::{self, CurrentCaller};
use crate::web::ApiJson;
use argon2::{password_hash::PasswordHash, Argon2, PasswordVerifier};
use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue},
    middleware::from_fn_with_state,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserView {
    pub id: Uuid,
    pub email: String,
    pub full_name: String,
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agency: Option<Agency>,
}

impl UserView {
    fn new(user: DbUser, caller: &Caller) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            role: caller.role(),
            agency: caller.agency().cloned(),
        }
    }
}

#[derive(Serialize)]
pub struct UserResponse {
    pub success: bool,
    pub user: UserView,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub success: bool,
    pub message: &'static str,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/login",
            post(login).layer(from_fn_with_state(state.limiters.login.clone(), throttle)),
        )
        .route("/logout", post(logout))
        .route("/status", get(status))
        .with_state(state)
}

fn validate_login(payload: LoginRequest) -> Result<(String, String), AppError> {
    let mut errors = Vec::new();

    let email = payload.email.as_deref().map(normalize_email).unwrap_or_default();
    if !is_valid_email(&email) {
        errors.push(FieldError::new("email", "Invalid email address"));
    }
    let password = payload.password.unwrap_or_default();
    if password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }

    AppError::check(errors)?;
    Ok((email, password))
}

async fn login(
    State(state): State<SharedState>,
    ApiJson(payload): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    let (email, password) = validate_login(payload)?;
    let invalid = || AppError::unauthorized("Invalid email or password");

    let user = db::find_user_by_email(&state.pool, &email)
        .await?
        .ok_or_else(invalid)?;

    let parsed_hash = PasswordHash::new(&user.hash).map_err(|e| {
        tracing::error!("Stored hash for user {} is unreadable: {}", user.id, e);
        invalid()
    })?;
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .map_err(|_| {
            tracing::warn!("Failed login for {}", email);
            invalid()
        })?;

    let caller = session::caller_for_user(&state.pool, &user).await?;

    let now = Utc::now();
    db::touch_last_login(&state.pool, user.id, now).await?;

    let config = &state.config;
    let token = session::sign_session(user.id, now + config.session_ttl, &config.session_key)
        .map_err(|e| AppError::Internal(e.into()))?;
    let cookie = session::session_cookie(&token, config.session_ttl, config.secure_cookies);

    let mut headers = HeaderMap::new();
    headers.insert(
        header::SET_COOKIE,
        HeaderValue::from_str(&cookie).map_err(|e| AppError::Internal(e.into()))?,
    );

    tracing::info!("User {} logged in as {:?}", user.id, caller.role());

    let resp = UserResponse {
        success: true,
        user: UserView::new(user, &caller),
    };
    Ok((headers, Json(resp)))
}

async fn logout(State(state): State<SharedState>) -> impl IntoResponse {
    let cookie = session::clear_session_cookie(state.config.secure_cookies);
    (
        [(header::SET_COOKIE, cookie)],
        Json(MessageResponse {
            success: true,
            message: "Logged out successfully",
        }),
    )
}

async fn status(
    CurrentCaller(caller): CurrentCaller,
    State(state): State<SharedState>,
) -> Result<Json<UserResponse>, AppError> {
    let user = db::find_user_by_id(&state.pool, caller.user_id())
        .await?
        .ok_or_else(|| AppError::unauthorized("User not found"))?;

    Ok(Json(UserResponse {
        success: true,
        user: UserView::new(user, &caller),
    }))
}
