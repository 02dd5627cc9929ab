//! Routes for agency administrators, restricted to their agency's categories.

use crate::analytics::stats::{self, AgencyStats};
use crate::db::{self, ComplaintFilter};
use crate::domain::access;
use crate::domain::models::Complaint;
use crate::error::AppError;
use crate::state::SharedState;
use crate::web::session::CurrentCaller;
use axum::{extract::State, routing::get, Json, Router};
use serde::Serialize;

#[derive(Serialize)]
pub struct AgencyComplaints {
    pub success: bool,
    pub complaints: Vec<Complaint>,
}

pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/complaints", get(agency_complaints))
        .route("/complaints/stats", get(agency_stats))
        .with_state(state)
}

async fn agency_complaints(
    CurrentCaller(caller): CurrentCaller,
    State(state): State<SharedState>,
) -> Result<Json<AgencyComplaints>, AppError> {
    access::require_agency_admin(&caller)?;
    let filter = ComplaintFilter {
        categories: access::complaint_scope(&caller)?.categories(),
        ..Default::default()
    };

    let complaints = db::list_complaints(&state.pool, &filter, None).await?;
    Ok(Json(AgencyComplaints {
        success: true,
        complaints,
    }))
}

async fn agency_stats(
    CurrentCaller(caller): CurrentCaller,
    State(state): State<SharedState>,
) -> Result<Json<AgencyStats>, AppError> {
    let agency = access::require_agency_admin(&caller)?;

    let samples = db::complaint_samples(&state.pool, Some(agency.categories.clone())).await?;
    Ok(Json(stats::compute_agency_stats(&samples, agency)))
}
