use crate::analytics::{export, stats};
use crate::db::{self, ComplaintFilter};
use crate::domain::access;
use crate::error::AppError;
use crate::state::SharedState;
use crate::web::session::CurrentCaller;
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    routing::get,
    Json, Router,
};
use chrono::Utc;

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/stats", get(complaint_stats))
        .route("/export", get(export_complaints))
        .with_state(state)
}

async fn complaint_stats(
    CurrentCaller(caller): CurrentCaller,
    State(state): State<SharedState>,
) -> Result<Json<stats::ComplaintStats>, AppError> {
    access::require_admin(&caller)?;

    let samples = db::complaint_samples(&state.pool, None).await?;
    Ok(Json(stats::compute_stats(&samples, Utc::now())))
}

async fn export_complaints(
    CurrentCaller(caller): CurrentCaller,
    State(state): State<SharedState>,
) -> Result<impl IntoResponse, AppError> {
    access::require_admin(&caller)?;

    let complaints = db::list_complaints(&state.pool, &ComplaintFilter::default(), None).await?;
    let csv = export::export_csv(&complaints)?;
    tracing::info!("Exported {} complaints for {}", complaints.len(), caller.user_id());

    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8"),
            (header::CONTENT_DISPOSITION, "attachment; filename=complaints.csv"),
        ],
        csv,
    ))
}
