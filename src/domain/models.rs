use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgHasArrayType, PgTypeInfo};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "user_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Citizen,
    Admin,
    AgencyAdmin,
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, Hash)]
#[sqlx(type_name = "complaint_status", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintStatus {
    Pending,
    InReview,
    Resolved,
    Rejected,
}

impl ComplaintStatus {
    pub const ALL: [ComplaintStatus; 4] = [
        ComplaintStatus::Pending,
        ComplaintStatus::InReview,
        ComplaintStatus::Resolved,
        ComplaintStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComplaintStatus::Pending => "PENDING",
            ComplaintStatus::InReview => "IN_REVIEW",
            ComplaintStatus::Resolved => "RESOLVED",
            ComplaintStatus::Rejected => "REJECTED",
        }
    }
}

impl FromStr for ComplaintStatus {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|s| s.as_str() == raw.trim())
            .ok_or(())
    }
}

impl fmt::Display for ComplaintStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(
    Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq, PartialOrd, Ord, Hash,
)]
#[sqlx(type_name = "complaint_category", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ComplaintCategory {
    Education,
    Taxes,
    Security,
    Corruption,
    Healthcare,
    Infrastructure,
    WaterSanitation,
    PublicTransport,
    Other,
}

impl ComplaintCategory {
    pub const ALL: [ComplaintCategory; 9] = [
        ComplaintCategory::Education,
        ComplaintCategory::Taxes,
        ComplaintCategory::Security,
        ComplaintCategory::Corruption,
        ComplaintCategory::Healthcare,
        ComplaintCategory::Infrastructure,
        ComplaintCategory::WaterSanitation,
        ComplaintCategory::PublicTransport,
        ComplaintCategory::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ComplaintCategory::Education => "EDUCATION",
            ComplaintCategory::Taxes => "TAXES",
            ComplaintCategory::Security => "SECURITY",
            ComplaintCategory::Corruption => "CORRUPTION",
            ComplaintCategory::Healthcare => "HEALTHCARE",
            ComplaintCategory::Infrastructure => "INFRASTRUCTURE",
            ComplaintCategory::WaterSanitation => "WATER_SANITATION",
            ComplaintCategory::PublicTransport => "PUBLIC_TRANSPORT",
            ComplaintCategory::Other => "OTHER",
        }
    }
}

impl FromStr for ComplaintCategory {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == raw.trim())
            .ok_or(())
    }
}

impl fmt::Display for ComplaintCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PgHasArrayType for ComplaintCategory {
    fn array_type_info() -> PgTypeInfo {
        PgTypeInfo::with_name("_complaint_category")
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "feedback_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FeedbackType {
    Suggestion,
    Appreciation,
    Other,
}

impl FromStr for FeedbackType {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "SUGGESTION" => Ok(Self::Suggestion),
            "APPRECIATION" => Ok(Self::Appreciation),
            "OTHER" => Ok(Self::Other),
            _ => Err(()),
        }
    }
}

#[derive(Clone, Copy, Debug, Serialize, Deserialize, sqlx::Type, PartialEq, Eq)]
#[sqlx(type_name = "service_type", rename_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceType {
    Healthcare,
    Roads,
    Sanitation,
    Education,
    GovernmentStaff,
    Other,
}

impl FromStr for ServiceType {
    type Err = ();

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim() {
            "HEALTHCARE" => Ok(Self::Healthcare),
            "ROADS" => Ok(Self::Roads),
            "SANITATION" => Ok(Self::Sanitation),
            "EDUCATION" => Ok(Self::Education),
            "GOVERNMENT_STAFF" => Ok(Self::GovernmentStaff),
            "OTHER" => Ok(Self::Other),
            _ => Err(()),
        }
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Agency {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub categories: Vec<ComplaintCategory>,
    #[serde(skip_serializing)]
    pub created_at: DateTime<Utc>,
}

impl Agency {
    pub fn handles(&self, category: ComplaintCategory) -> bool {
        self.categories.contains(&category)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintResponse {
    pub id: Uuid,
    #[serde(skip_serializing)]
    pub complaint_id: Uuid,
    pub message: String,
    pub responded_at: DateTime<Utc>,
    pub responded_by: Uuid,
    pub responder_role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub responder_agency_id: Option<Uuid>,
}

#[derive(Debug, Clone, Serialize, FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Complaint {
    pub id: Uuid,
    pub ticket_id: String,
    pub full_name: String,
    pub email: String,
    pub category: ComplaintCategory,
    pub description: String,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub status: ComplaintStatus,
    pub assigned_agency_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[sqlx(skip)]
    pub responses: Vec<ComplaintResponse>,
}

/// What an anonymous tracker sees: the complaint without the submitter's email.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackedComplaint {
    pub id: Uuid,
    pub ticket_id: String,
    pub full_name: String,
    pub category: ComplaintCategory,
    pub description: String,
    pub location: Option<String>,
    pub image_url: Option<String>,
    pub status: ComplaintStatus,
    pub responses: Vec<ComplaintResponse>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Complaint> for TrackedComplaint {
    fn from(c: Complaint) -> Self {
        Self {
            id: c.id,
            ticket_id: c.ticket_id,
            full_name: c.full_name,
            category: c.category,
            description: c.description,
            location: c.location,
            image_url: c.image_url,
            status: c.status,
            responses: c.responses,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}
