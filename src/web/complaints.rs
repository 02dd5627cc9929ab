use crate::db::{self, ComplaintFilter, Page};
use crate::domain::access::{self, Caller};
use crate::domain::lifecycle::{
    self, ComplaintForm, NewComplaint, Responder, ResponsePayload, StatusUpdatePayload,
};
use crate::domain::models::{Complaint, ComplaintCategory, ComplaintStatus, TrackedComplaint};
use crate::error::{AppError, FieldError};
use crate::middleware::throttle;
use crate::services::uploads::StoredImage;
use crate::state::SharedState;
use crate::web::session::CurrentCaller;
use crate::web::ApiJson;
use axum::{
    extract::{DefaultBodyLimit, FromRequest, Multipart, Path, Query, Request, State},
    http::{header, StatusCode},
    middleware::from_fn_with_state,
    routing::{get, patch, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const DEFAULT_PAGE_SIZE: i64 = 10;
const MAX_PAGE_SIZE: i64 = 100;
const TICKET_ID_ATTEMPTS: usize = 3;
/// Room for the text fields next to the image in a multipart body.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmittedComplaint {
    pub ticket_id: String,
    pub status: ComplaintStatus,
    pub created_at: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SubmitResponse {
    pub success: bool,
    pub complaint: SubmittedComplaint,
}

#[derive(Serialize)]
pub struct TrackResponse {
    pub success: bool,
    pub complaint: TrackedComplaint,
}

#[derive(Serialize)]
pub struct ComplaintResponseBody {
    pub success: bool,
    pub complaint: Complaint,
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct Pagination {
    pub total: i64,
    pub page: i64,
    pub pages: i64,
}

#[derive(Serialize)]
pub struct ListResponse {
    pub success: bool,
    pub complaints: Vec<Complaint>,
    pub pagination: Pagination,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub category: Option<String>,
    pub status: Option<String>,
    pub page: Option<String>,
    pub limit: Option<String>,
}

pub fn router(state: SharedState) -> Router {
    let body_limit = state.config.max_upload_bytes + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route(
            "/",
            post(submit_complaint)
                .layer(from_fn_with_state(state.limiters.public_writes.clone(), throttle)),
        )
        .route("/", get(list_complaints))
        .route("/track/:ticket_id", get(track_complaint))
        .route("/:id", patch(update_status))
        .route("/:id/responses", post(add_response))
        .layer(DefaultBodyLimit::max(body_limit))
        .with_state(state)
}

fn parse_list_query(query: ListQuery) -> Result<(ComplaintFilter, Page), AppError> {
    let mut errors = Vec::new();

    let category = match query.category.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        None => None,
        Some(raw) => {
            let parsed = raw.parse::<ComplaintCategory>().ok();
            if parsed.is_none() {
                errors.push(FieldError::new("category", "Invalid category"));
            }
            parsed
        }
    };

    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => {
            let parsed = raw.parse::<ComplaintStatus>().ok();
            if parsed.is_none() {
                errors.push(FieldError::new("status", "Invalid status"));
            }
            parsed
        }
    };

    let page = match query.page.as_deref().map(str::trim).filter(|p| !p.is_empty()) {
        None => 1,
        Some(raw) => match raw.parse::<i64>() {
            Ok(p) if p >= 1 => p,
            _ => {
                errors.push(FieldError::new("page", "Page must be a positive integer"));
                1
            }
        },
    };

    let limit = match query.limit.as_deref().map(str::trim).filter(|l| !l.is_empty()) {
        None => DEFAULT_PAGE_SIZE,
        Some(raw) => match raw.parse::<i64>() {
            Ok(l) if l >= 1 => l.min(MAX_PAGE_SIZE),
            _ => {
                errors.push(FieldError::new("limit", "Limit must be a positive integer"));
                DEFAULT_PAGE_SIZE
            }
        },
    };

    if (page - 1).checked_mul(limit).is_none() {
        errors.push(FieldError::new("page", "Page is out of range"));
    }

    AppError::check(errors)?;
    Ok((
        ComplaintFilter {
            categories: None,
            category,
            status,
        },
        Page { page, limit },
    ))
}

pub fn pagination(total: i64, page: Page) -> Pagination {
    Pagination {
        total,
        page: page.page,
        pages: (total + page.limit - 1) / page.limit,
    }
}

/// Reads a submission from either a JSON body or a multipart form whose
/// optional `image` part carries the attachment.
async fn read_submission(
    state: &SharedState,
    request: Request,
) -> Result<(ComplaintForm, Option<ImagePart>), AppError> {
    let is_multipart = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|ct| ct.starts_with("multipart/form-data"));

    if !is_multipart {
        let ApiJson(form) = ApiJson::<ComplaintForm>::from_request(request, state).await?;
        return Ok((form, None));
    }

    let mut multipart = Multipart::from_request(request, state)
        .await
        .map_err(|e| AppError::invalid("body", e.body_text()))?;

    let mut form = ComplaintForm::default();
    let mut image = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::invalid("body", e.body_text()))?
    {
        let name = field.name().unwrap_or_default().to_string();
        if name == "image" {
            let file_name = field.file_name().map(str::to_string);
            let content_type = field.content_type().map(str::to_string);
            let bytes = field
                .bytes()
                .await
                .map_err(|e| AppError::invalid("image", e.body_text()))?;
            if !bytes.is_empty() {
                image = Some(ImagePart {
                    file_name,
                    content_type,
                    bytes: bytes.to_vec(),
                });
            }
            continue;
        }

        let value = field
            .text()
            .await
            .map_err(|e| AppError::invalid(name.clone(), e.body_text()))?;
        match name.as_str() {
            "fullName" => form.full_name = Some(value),
            "email" => form.email = Some(value),
            "category" => form.category = Some(value),
            "description" => form.description = Some(value),
            "location" => form.location = Some(value),
            _ => {}
        }
    }
    Ok((form, image))
}

struct ImagePart {
    file_name: Option<String>,
    content_type: Option<String>,
    bytes: Vec<u8>,
}

async fn submit_complaint(
    State(state): State<SharedState>,
    request: Request,
) -> Result<(StatusCode, Json<SubmitResponse>), AppError> {
    let (form, image) = read_submission(&state, request).await?;
    let mut new = form.validate()?;

    let stored = match image {
        Some(part) => Some(
            state
                .images
                .save(part.file_name.as_deref(), part.content_type.as_deref(), &part.bytes)
                .await?,
        ),
        None => None,
    };

    let complaint = match persist_submission(&state, &mut new, stored.as_ref()).await {
        Ok(complaint) => complaint,
        Err(e) => {
            if let Some(image) = &stored {
                state.images.remove(image).await;
            }
            return Err(e);
        }
    };

    tracing::info!(
        "Complaint submitted: ticket={}, category={}, assigned_agency={:?}",
        complaint.ticket_id,
        complaint.category,
        complaint.assigned_agency_id
    );

    Ok((
        StatusCode::CREATED,
        Json(SubmitResponse {
            success: true,
            complaint: SubmittedComplaint {
                ticket_id: complaint.ticket_id,
                status: complaint.status,
                created_at: complaint.created_at,
            },
        }),
    ))
}

/// Inserts the complaint, drawing a fresh ticket ID when the generated one is
/// already taken.
async fn persist_submission(
    state: &SharedState,
    new: &mut NewComplaint,
    image: Option<&StoredImage>,
) -> Result<Complaint, AppError> {
    let agency_id = db::find_agency_for_category(&state.pool, new.category)
        .await?
        .map(|a| a.id);

    let mut attempt = 1;
    loop {
        let inserted = db::insert_complaint(
            &state.pool,
            new,
            image.map(|i| i.url.as_str()),
            agency_id,
            Utc::now(),
        )
        .await;

        match inserted {
            Ok(complaint) => return Ok(complaint),
            Err(e) if attempt < TICKET_ID_ATTEMPTS && db::is_ticket_conflict(&e) => {
                tracing::warn!("Ticket {} already issued, drawing another", new.ticket_id);
                new.ticket_id = lifecycle::generate_ticket_id();
                attempt += 1;
            }
            Err(e) => return Err(e.into()),
        }
    }
}

async fn track_complaint(
    State(state): State<SharedState>,
    Path(ticket_id): Path<String>,
) -> Result<Json<TrackResponse>, AppError> {
    let ticket_id = lifecycle::normalize_ticket_id(&ticket_id);
    let complaint = db::find_complaint_by_ticket(&state.pool, &ticket_id)
        .await?
        .ok_or_else(|| AppError::not_found("Complaint not found"))?;

    Ok(Json(TrackResponse {
        success: true,
        complaint: complaint.into(),
    }))
}

async fn list_complaints(
    CurrentCaller(caller): CurrentCaller,
    State(state): State<SharedState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListResponse>, AppError> {
    access::require_admin(&caller)?;
    let (filter, page) = parse_list_query(query)?;

    let complaints = db::list_complaints(&state.pool, &filter, Some(page)).await?;
    let total = db::count_complaints(&state.pool, &filter).await?;

    Ok(Json(ListResponse {
        success: true,
        complaints,
        pagination: pagination(total, page),
    }))
}

/// Loads the complaint behind a path ID and applies the access rule. IDs that
/// are not UUIDs cannot exist and are reported as not found.
async fn load_authorized(state: &SharedState, caller: &Caller, raw_id: &str) -> Result<Complaint, AppError> {
    let complaint = match Uuid::parse_str(raw_id.trim()) {
        Ok(id) => db::find_complaint_by_id(&state.pool, id).await?,
        Err(_) => None,
    };
    access::authorize_complaint(caller, complaint).map_err(|e| {
        if matches!(e, AppError::Forbidden(_)) {
            tracing::warn!("Caller {} denied access to complaint {}", caller.user_id(), raw_id);
        }
        e
    })
}

fn responder(caller: &Caller) -> Result<Responder, AppError> {
    Responder::from_caller(caller).ok_or_else(|| AppError::forbidden("Administrative access required"))
}

async fn update_status(
    CurrentCaller(caller): CurrentCaller,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<StatusUpdatePayload>,
) -> Result<Json<ComplaintResponseBody>, AppError> {
    let mut complaint = load_authorized(&state, &caller, &id).await?;
    let responder = responder(&caller)?;
    let update = payload.validate()?;

    let previous = complaint.status;
    let applied = lifecycle::apply_update(
        &mut complaint,
        Some(update.status),
        update.message,
        &responder,
        Utc::now(),
    );
    complaint.status = db::save_complaint_update(&state.pool, complaint.id, &applied).await?;

    tracing::info!(
        "Complaint {} status {} -> {} by {:?} {}",
        complaint.ticket_id,
        previous,
        complaint.status,
        responder.role,
        responder.user_id
    );

    Ok(Json(ComplaintResponseBody {
        success: true,
        complaint,
    }))
}

async fn add_response(
    CurrentCaller(caller): CurrentCaller,
    State(state): State<SharedState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<ResponsePayload>,
) -> Result<Json<ComplaintResponseBody>, AppError> {
    let mut complaint = load_authorized(&state, &caller, &id).await?;
    let responder = responder(&caller)?;
    let message = payload.validate()?;

    let applied = lifecycle::apply_update(&mut complaint, None, Some(message), &responder, Utc::now());
    complaint.status = db::save_complaint_update(&state.pool, complaint.id, &applied).await?;

    tracing::info!(
        "Response added to complaint {} by {:?} {}",
        complaint.ticket_id,
        responder.role,
        responder.user_id
    );

    Ok(Json(ComplaintResponseBody {
        success: true,
        complaint,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_query_defaults() {
        let (filter, page) = parse_list_query(ListQuery::default()).unwrap();
        assert_eq!(filter.category, None);
        assert_eq!(filter.status, None);
        assert_eq!(filter.categories, None);
        assert_eq!(page, Page { page: 1, limit: 10 });
    }

    #[test]
    fn test_list_query_filters_and_clamp() {
        let (filter, page) = parse_list_query(ListQuery {
            category: Some("HEALTHCARE".to_string()),
            status: Some("IN_REVIEW".to_string()),
            page: Some("3".to_string()),
            limit: Some("500".to_string()),
        })
        .unwrap();
        assert_eq!(filter.category, Some(ComplaintCategory::Healthcare));
        assert_eq!(filter.status, Some(ComplaintStatus::InReview));
        assert_eq!(page, Page { page: 3, limit: MAX_PAGE_SIZE });
    }

    #[test]
    fn test_list_query_empty_strings_are_absent() {
        let (filter, _) = parse_list_query(ListQuery {
            category: Some(String::new()),
            status: Some("  ".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(filter.category, None);
        assert_eq!(filter.status, None);
    }

    #[test]
    fn test_list_query_rejects_bad_values() {
        let err = parse_list_query(ListQuery {
            category: Some("ROADS".to_string()),
            status: Some("DONE".to_string()),
            page: Some("0".to_string()),
            limit: Some("ten".to_string()),
        })
        .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        let fields: Vec<&str> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["category", "status", "page", "limit"]);
    }

    #[test]
    fn test_list_query_rejects_page_past_offset_range() {
        let err = parse_list_query(ListQuery {
            page: Some(i64::MAX.to_string()),
            limit: Some("100".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        let AppError::Validation(errors) = err else {
            panic!("expected validation error");
        };
        assert_eq!(errors, vec![FieldError::new("page", "Page is out of range")]);

        let (_, page) = parse_list_query(ListQuery {
            page: Some("1000000".to_string()),
            limit: Some("100".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(page.offset(), 99_999_900);
    }

    #[test]
    fn test_pagination_pages() {
        let page = Page { page: 1, limit: 10 };
        assert_eq!(pagination(0, page).pages, 0);
        assert_eq!(pagination(10, page).pages, 1);
        assert_eq!(pagination(11, page).pages, 2);
        assert_eq!(pagination(11, page).total, 11);
    }
}
