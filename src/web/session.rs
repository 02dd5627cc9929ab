use crate::db::{self, DbUser};
use crate::domain::access::Caller;
use crate::domain::models::Role;
use crate::error::AppError;
use crate::state::SharedState;
use axum::{
    async_trait,
    extract::{FromRef, FromRequestParts},
    http::{request::Parts, HeaderMap},
};
use base64::{engine::general_purpose, Engine as _};
use chrono::{DateTime, Duration, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use sqlx::PgPool;
use uuid::Uuid;

type HmacSha256 = Hmac<Sha256>;

pub const SESSION_COOKIE: &str = "session";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionClaims {
    pub user_id: Uuid,
    pub exp: i64,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("invalid token format")]
    Invalid,
    #[error("signature mismatch")]
    Signature,
    #[error("expired")]
    Expired,
}

/// Token layout: `base64(user_id|exp).base64(hmac_sha256(payload))`.
/// Only the user ID is carried; role and agency are re-read per request.
pub fn sign_session(user_id: Uuid, expires_at: DateTime<Utc>, key: &[u8]) -> Result<String, SessionError> {
    let payload = format!("{}|{}", user_id, expires_at.timestamp());
    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(payload.as_bytes());
    let sig = mac.finalize().into_bytes();
    Ok(format!(
        "{}.{}",
        general_purpose::STANDARD.encode(payload.as_bytes()),
        general_purpose::STANDARD.encode(sig)
    ))
}

pub fn verify_session(token: &str, key: &[u8]) -> Result<SessionClaims, SessionError> {
    let (payload_b64, sig_b64) = token.split_once('.').ok_or(SessionError::Invalid)?;
    let payload_bytes = general_purpose::STANDARD
        .decode(payload_b64)
        .map_err(|_| SessionError::Invalid)?;
    let sig_bytes = general_purpose::STANDARD
        .decode(sig_b64)
        .map_err(|_| SessionError::Invalid)?;

    let mut mac = HmacSha256::new_from_slice(key).map_err(|_| SessionError::Invalid)?;
    mac.update(&payload_bytes);
    mac.verify_slice(&sig_bytes)
        .map_err(|_| SessionError::Signature)?;

    let payload = String::from_utf8(payload_bytes).map_err(|_| SessionError::Invalid)?;
    let (user_id, exp) = payload.split_once('|').ok_or(SessionError::Invalid)?;
    let user_id = Uuid::parse_str(user_id).map_err(|_| SessionError::Invalid)?;
    let exp: i64 = exp.parse().map_err(|_| SessionError::Invalid)?;
    if Utc::now().timestamp() > exp {
        return Err(SessionError::Expired);
    }
    Ok(SessionClaims { user_id, exp })
}

pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth) = headers.get(axum::http::header::AUTHORIZATION) {
        if let Ok(val) = auth.to_str() {
            if let Some(bearer) = val.strip_prefix("Bearer ") {
                return Some(bearer.trim().to_string());
            }
        }
    }
    let prefix = format!("{SESSION_COOKIE}=");
    headers
        .get_all(axum::http::header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .find_map(|pair| pair.trim().strip_prefix(prefix.as_str()).map(str::to_string))
        .filter(|t| !t.is_empty())
}

pub fn session_cookie(token: &str, ttl: Duration, secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!(
        "{SESSION_COOKIE}={token}; HttpOnly; SameSite=Strict; Path=/; Max-Age={}{secure_flag}",
        ttl.num_seconds()
    )
}

pub fn clear_session_cookie(secure: bool) -> String {
    let secure_flag = if secure { "; Secure" } else { "" };
    format!("{SESSION_COOKIE}=; HttpOnly; SameSite=Strict; Path=/; Max-Age=0{secure_flag}")
}

/// Builds the caller for a stored user, loading the agency of agency admins.
pub async fn caller_for_user(pool: &PgPool, user: &DbUser) -> Result<Caller, AppError> {
    match user.role {
        Role::Citizen => Ok(Caller::Citizen { user_id: user.id }),
        Role::Admin => Ok(Caller::Admin { user_id: user.id }),
        Role::AgencyAdmin => {
            let agency = match user.agency_id {
                Some(agency_id) => db::find_agency_by_id(pool, agency_id).await?,
                None => None,
            };
            let Some(agency) = agency else {
                tracing::warn!("Agency admin {} has no agency", user.id);
                return Err(AppError::forbidden("No agency is linked to this account"));
            };
            Ok(Caller::AgencyAdmin {
                user_id: user.id,
                agency,
            })
        }
    }
}

/// Extractor for an authenticated caller. Rejects with 401 when the session
/// is missing, malformed, expired or points at an unknown user.
///
/// ```ignore
/// async fn handler(CurrentCaller(caller): CurrentCaller) -> Result<..., AppError> {
///     require_admin(&caller)?;
/// }
/// ```
pub struct CurrentCaller(pub Caller);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentCaller
where
    S: Send + Sync,
    SharedState: FromRef<S>,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let shared_state = SharedState::from_ref(state);

        let token = extract_token(&parts.headers)
            .ok_or_else(|| AppError::unauthorized("Authentication required"))?;

        let claims = verify_session(&token, &shared_state.config.session_key).map_err(|e| {
            tracing::warn!("Session verification failed: {}", e);
            AppError::unauthorized("Invalid or expired session")
        })?;

        let user = db::find_user_by_id(&shared_state.pool, claims.user_id)
            .await?
            .ok_or_else(|| AppError::unauthorized("User not found"))?;

        let caller = caller_for_user(&shared_state.pool, &user).await?;
        Ok(CurrentCaller(caller))
    }
}
