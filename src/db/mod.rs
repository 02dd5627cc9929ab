pub mod seed;

use crate::analytics::stats::ComplaintSample;
use crate::domain::feedback::NewFeedback;
use crate::domain::lifecycle::{AppliedUpdate, NewComplaint};
use crate::domain::models::{
    Agency, Complaint, ComplaintCategory, ComplaintResponse, ComplaintStatus, Role,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use uuid::Uuid;

#[derive(Debug, Serialize, FromRow)]
pub struct DbUser {
    pub id: Uuid,
    pub email: String,
    #[serde(skip_serializing)]
    pub hash: String,
    pub role: Role,
    pub agency_id: Option<Uuid>,
    pub full_name: String,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Filters for complaint listings. `categories` carries the caller's scope;
/// `category` and `status` are the optional query-string filters.
#[derive(Debug, Default, Clone)]
pub struct ComplaintFilter {
    pub categories: Option<Vec<ComplaintCategory>>,
    pub category: Option<ComplaintCategory>,
    pub status: Option<ComplaintStatus>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub page: i64,
    pub limit: i64,
}

impl Page {
    pub fn offset(&self) -> i64 {
        (self.page - 1).saturating_mul(self.limit)
    }
}

/// Unique constraint on `complaints.ticket_id`.
pub const TICKET_ID_CONSTRAINT: &str = "complaints_ticket_id_key";

/// Whether an insert failed because its ticket ID was already issued.
pub fn is_ticket_conflict(err: &anyhow::Error) -> bool {
    match err.downcast_ref::<sqlx::Error>() {
        Some(sqlx::Error::Database(db_err)) => {
            db_err.is_unique_violation() && db_err.constraint() == Some(TICKET_ID_CONSTRAINT)
        }
        _ => false,
    }
}

const COMPLAINT_COLUMNS: &str = r#"
    id,
    ticket_id,
    full_name,
    email,
    category,
    description,
    location,
    image_url,
    status,
    assigned_agency_id,
    created_at,
    updated_at
"#;

pub async fn find_user_by_email(pool: &PgPool, email: &str) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        r#"
        SELECT id, email, hash, role, agency_id, full_name, last_login, created_at
        FROM users
        WHERE email = $1
        "#,
    )
    .bind(email)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn find_user_by_id(pool: &PgPool, id: Uuid) -> Result<Option<DbUser>> {
    let user = sqlx::query_as::<_, DbUser>(
        r#"
        SELECT id, email, hash, role, agency_id, full_name, last_login, created_at
        FROM users
        WHERE id = $1
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(user)
}

pub async fn touch_last_login(pool: &PgPool, id: Uuid, at: DateTime<Utc>) -> Result<()> {
    sqlx::query("UPDATE users SET last_login = $1 WHERE id = $2")
        .bind(at)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn find_agency_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Agency>> {
    let agency = sqlx::query_as::<_, Agency>(
        "SELECT id, name, slug, categories, created_at FROM agencies WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await?;
    Ok(agency)
}

/// The agency a new complaint of `category` is assigned to: the first by name
/// among those handling the category.
pub async fn find_agency_for_category(
    pool: &PgPool,
    category: ComplaintCategory,
) -> Result<Option<Agency>> {
    let agency = sqlx::query_as::<_, Agency>(
        r#"
        SELECT id, name, slug, categories, created_at
        FROM agencies
        WHERE $1 = ANY(categories)
        ORDER BY name
        LIMIT 1
        "#,
    )
    .bind(category)
    .fetch_optional(pool)
    .await?;
    Ok(agency)
}

pub async fn insert_complaint(
    pool: &PgPool,
    new: &NewComplaint,
    image_url: Option<&str>,
    assigned_agency_id: Option<Uuid>,
    now: DateTime<Utc>,
) -> Result<Complaint> {
    let complaint = sqlx::query_as::<_, Complaint>(&format!(
        r#"
        INSERT INTO complaints
            (id, ticket_id, full_name, email, category, description, location, image_url,
             status, assigned_agency_id, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $11)
        RETURNING {COMPLAINT_COLUMNS}
        "#
    ))
    .bind(Uuid::new_v4())
    .bind(&new.ticket_id)
    .bind(&new.full_name)
    .bind(&new.email)
    .bind(new.category)
    .bind(&new.description)
    .bind(new.location.as_deref())
    .bind(image_url)
    .bind(new.status())
    .bind(assigned_agency_id)
    .bind(now)
    .fetch_one(pool)
    .await?;
    Ok(complaint)
}

pub async fn find_complaint_by_id(pool: &PgPool, id: Uuid) -> Result<Option<Complaint>> {
    let complaint = sqlx::query_as::<_, Complaint>(&format!(
        "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE id = $1"
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    with_responses(pool, complaint).await
}

pub async fn find_complaint_by_ticket(pool: &PgPool, ticket_id: &str) -> Result<Option<Complaint>> {
    let complaint = sqlx::query_as::<_, Complaint>(&format!(
        "SELECT {COMPLAINT_COLUMNS} FROM complaints WHERE ticket_id = $1"
    ))
    .bind(ticket_id)
    .fetch_optional(pool)
    .await?;

    with_responses(pool, complaint).await
}

async fn with_responses(pool: &PgPool, complaint: Option<Complaint>) -> Result<Option<Complaint>> {
    let Some(complaint) = complaint else {
        return Ok(None);
    };
    let mut complaints = vec![complaint];
    attach_responses(pool, &mut complaints).await?;
    Ok(complaints.pop())
}

/// Loads the response history of every complaint, in insertion order.
async fn attach_responses(pool: &PgPool, complaints: &mut [Complaint]) -> Result<()> {
    if complaints.is_empty() {
        return Ok(());
    }

    let ids: Vec<Uuid> = complaints.iter().map(|c| c.id).collect();
    let rows = sqlx::query_as::<_, ComplaintResponse>(
        r#"
        SELECT id, complaint_id, message, responded_at, responded_by, responder_role, responder_agency_id
        FROM complaint_responses
        WHERE complaint_id = ANY($1)
        ORDER BY seq
        "#,
    )
    .bind(&ids)
    .fetch_all(pool)
    .await?;

    let mut by_complaint: HashMap<Uuid, Vec<ComplaintResponse>> = HashMap::new();
    for row in rows {
        by_complaint.entry(row.complaint_id).or_default().push(row);
    }
    for complaint in complaints.iter_mut() {
        complaint.responses = by_complaint.remove(&complaint.id).unwrap_or_default();
    }
    Ok(())
}

/// Newest first. Without a page every matching complaint is returned.
pub async fn list_complaints(
    pool: &PgPool,
    filter: &ComplaintFilter,
    page: Option<Page>,
) -> Result<Vec<Complaint>> {
    let (limit, offset) = match page {
        Some(p) => (Some(p.limit), p.offset()),
        None => (None, 0),
    };

    let mut complaints = sqlx::query_as::<_, Complaint>(&format!(
        r#"
        SELECT {COMPLAINT_COLUMNS}
        FROM complaints
        WHERE ($1::complaint_category[] IS NULL OR category = ANY($1))
          AND ($2::complaint_category IS NULL OR category = $2)
          AND ($3::complaint_status IS NULL OR status = $3)
        ORDER BY created_at DESC
        LIMIT $4 OFFSET $5
        "#
    ))
    .bind(filter.categories.clone())
    .bind(filter.category)
    .bind(filter.status)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    attach_responses(pool, &mut complaints).await?;
    Ok(complaints)
}

pub async fn count_complaints(pool: &PgPool, filter: &ComplaintFilter) -> Result<i64> {
    let count: i64 = sqlx::query_scalar(
        r#"
        SELECT COUNT(*)
        FROM complaints
        WHERE ($1::complaint_category[] IS NULL OR category = ANY($1))
          AND ($2::complaint_category IS NULL OR category = $2)
          AND ($3::complaint_status IS NULL OR status = $3)
        "#,
    )
    .bind(filter.categories.clone())
    .bind(filter.category)
    .bind(filter.status)
    .fetch_one(pool)
    .await?;
    Ok(count)
}

/// Persists an applied update together with the response it appended. The
/// status column is only written when the update set one; the stored status
/// is returned so callers see concurrent status changes.
pub async fn save_complaint_update(
    pool: &PgPool,
    complaint_id: Uuid,
    update: &AppliedUpdate,
) -> Result<ComplaintStatus> {
    let mut tx = pool.begin().await?;

    let status: ComplaintStatus = sqlx::query_scalar(
        r#"
        UPDATE complaints
        SET status = COALESCE($1, status), updated_at = $2
        WHERE id = $3
        RETURNING status
        "#,
    )
    .bind(update.status)
    .bind(update.updated_at)
    .bind(complaint_id)
    .fetch_one(&mut *tx)
    .await?;

    if let Some(r) = &update.response {
        sqlx::query(
            r#"
            INSERT INTO complaint_responses
                (id, complaint_id, message, responded_at, responded_by, responder_role, responder_agency_id)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(r.id)
        .bind(r.complaint_id)
        .bind(&r.message)
        .bind(r.responded_at)
        .bind(r.responded_by)
        .bind(r.responder_role)
        .bind(r.responder_agency_id)
        .execute(&mut *tx)
        .await?;
    }

    tx.commit().await?;
    Ok(status)
}

pub async fn complaint_samples(
    pool: &PgPool,
    categories: Option<Vec<ComplaintCategory>>,
) -> Result<Vec<ComplaintSample>> {
    let samples = sqlx::query_as::<_, ComplaintSample>(
        r#"
        SELECT
            c.status,
            c.category,
            c.created_at,
            (SELECT MAX(r.responded_at) FROM complaint_responses r WHERE r.complaint_id = c.id)
                AS last_response_at
        FROM complaints c
        WHERE ($1::complaint_category[] IS NULL OR c.category = ANY($1))
        "#,
    )
    .bind(categories)
    .fetch_all(pool)
    .await?;
    Ok(samples)
}

pub async fn insert_feedback(pool: &PgPool, feedback: &NewFeedback, now: DateTime<Utc>) -> Result<Uuid> {
    let id = Uuid::new_v4();
    sqlx::query(
        r#"
        INSERT INTO feedback (id, full_name, email, feedback_type, service_type, message, created_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(id)
    .bind(feedback.full_name.as_deref())
    .bind(feedback.email.as_deref())
    .bind(feedback.feedback_type)
    .bind(feedback.service_type)
    .bind(&feedback.message)
    .bind(now)
    .execute(pool)
    .await?;
    Ok(id)
}
