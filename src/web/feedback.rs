use crate::db;
use crate::domain::feedback::FeedbackForm;
use crate::error::AppError;
use crate::middleware::throttle;
use crate::state::SharedState;
use crate::web::ApiJson;
use axum::{
    extract::State,
    http::StatusCode,
    middleware::from_fn_with_state,
    routing::post,
    Json, Router,
};
use chrono::Utc;
use serde::Serialize;

#[derive(Serialize)]
pub struct FeedbackResponse {
    pub success: bool,
    pub message: &'static str,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route(
            "/",
            post(submit_feedback)
                .layer(from_fn_with_state(state.limiters.public_writes.clone(), throttle)),
        )
        .with_state(state)
}

async fn submit_feedback(
    State(state): State<SharedState>,
    ApiJson(form): ApiJson<FeedbackForm>,
) -> Result<(StatusCode, Json<FeedbackResponse>), AppError> {
    let feedback = form.validate()?;
    let id = db::insert_feedback(&state.pool, &feedback, Utc::now()).await?;

    tracing::info!(
        "Feedback {} received: type={:?}, service={:?}",
        id,
        feedback.feedback_type,
        feedback.service_type
    );

    Ok((
        StatusCode::CREATED,
        Json(FeedbackResponse {
            success: true,
            message: "Feedback submitted successfully",
        }),
    ))
}
