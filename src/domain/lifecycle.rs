use crate::domain::access::Caller;
use crate::domain::models::{Complaint, ComplaintCategory, ComplaintResponse, ComplaintStatus, Role};
use crate::domain::validation::{is_valid_email, non_empty, normalize_email};
use crate::error::{AppError, FieldError};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Deserialize;
use uuid::Uuid;

pub const MIN_DESCRIPTION_CHARS: usize = 10;
pub const TICKET_ID_LEN: usize = 10;
const TICKET_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Raw submission as received over JSON or multipart.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComplaintForm {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub category: Option<String>,
    pub description: Option<String>,
    pub location: Option<String>,
}

/// A validated submission, ready to be persisted with status `PENDING`.
#[derive(Debug, Clone)]
pub struct NewComplaint {
    pub ticket_id: String,
    pub full_name: String,
    pub email: String,
    pub category: ComplaintCategory,
    pub description: String,
    pub location: Option<String>,
}

impl NewComplaint {
    pub fn status(&self) -> ComplaintStatus {
        ComplaintStatus::Pending
    }
}

impl ComplaintForm {
    pub fn validate(self) -> Result<NewComplaint, AppError> {
        let mut errors = Vec::new();

        let full_name = non_empty(self.full_name);
        if full_name.is_none() {
            errors.push(FieldError::new("fullName", "Full name is required"));
        }

        let email = self.email.as_deref().map(normalize_email).unwrap_or_default();
        if !is_valid_email(&email) {
            errors.push(FieldError::new("email", "Valid email is required"));
        }

        let category = self
            .category
            .as_deref()
            .and_then(|c| c.parse::<ComplaintCategory>().ok());
        if category.is_none() {
            errors.push(FieldError::new("category", "Invalid category"));
        }

        let description = self.description.map(|d| d.trim().to_string()).unwrap_or_default();
        if description.chars().count() < MIN_DESCRIPTION_CHARS {
            errors.push(FieldError::new(
                "description",
                format!("Description must be at least {MIN_DESCRIPTION_CHARS} characters long"),
            ));
        }

        AppError::check(errors)?;

        match (full_name, category) {
            (Some(full_name), Some(category)) => Ok(NewComplaint {
                ticket_id: generate_ticket_id(),
                full_name,
                email,
                category,
                description,
                location: non_empty(self.location),
            }),
            _ => Err(AppError::invalid("body", "Invalid complaint")),
        }
    }
}

pub fn generate_ticket_id() -> String {
    let mut rng = rand::thread_rng();
    (0..TICKET_ID_LEN)
        .map(|_| TICKET_ALPHABET[rng.gen_range(0..TICKET_ALPHABET.len())] as char)
        .collect()
}

/// Ticket IDs are issued upper-case; lookups accept any case.
pub fn normalize_ticket_id(raw: &str) -> String {
    raw.trim().to_ascii_uppercase()
}

#[derive(Debug, Default, Deserialize)]
pub struct StatusUpdatePayload {
    pub status: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ResponsePayload {
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusUpdate {
    pub status: ComplaintStatus,
    pub message: Option<String>,
}

impl StatusUpdatePayload {
    pub fn validate(self) -> Result<StatusUpdate, AppError> {
        let mut errors = Vec::new();

        let status = self
            .status
            .as_deref()
            .and_then(|s| s.parse::<ComplaintStatus>().ok());
        if status.is_none() {
            errors.push(FieldError::new("status", "Invalid status"));
        }

        let message = match self.message {
            Some(raw) => {
                let trimmed = raw.trim().to_string();
                if trimmed.is_empty() {
                    errors.push(FieldError::new(
                        "message",
                        "Response message cannot be empty if provided",
                    ));
                }
                Some(trimmed)
            }
            None => None,
        };

        AppError::check(errors)?;
        let status = status.ok_or_else(|| AppError::invalid("status", "Invalid status"))?;
        Ok(StatusUpdate { status, message })
    }
}

impl ResponsePayload {
    pub fn validate(self) -> Result<String, AppError> {
        non_empty(self.message)
            .ok_or_else(|| AppError::invalid("message", "Response message is required"))
    }
}

/// Identity snapshot stored with every response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Responder {
    pub user_id: Uuid,
    pub role: Role,
    pub agency_id: Option<Uuid>,
}

impl Responder {
    /// Only administrators respond; citizens have no responder identity.
    pub fn from_caller(caller: &Caller) -> Option<Self> {
        match caller {
            Caller::Admin { user_id } => Some(Self {
                user_id: *user_id,
                role: Role::Admin,
                agency_id: None,
            }),
            Caller::AgencyAdmin { user_id, agency } => Some(Self {
                user_id: *user_id,
                role: Role::AgencyAdmin,
                agency_id: Some(agency.id),
            }),
            Caller::Citizen { .. } => None,
        }
    }
}

/// What an update changed, for persistence. `status` is `None` when the
/// update only appended a response, so the stored status is left alone.
#[derive(Debug, Clone, PartialEq)]
pub struct AppliedUpdate {
    pub status: Option<ComplaintStatus>,
    pub updated_at: DateTime<Utc>,
    pub response: Option<ComplaintResponse>,
}

/// Applies a status change and/or a new response to `complaint` in memory.
/// Any status may follow any other. `updated_at` is refreshed
/// unconditionally.
pub fn apply_update(
    complaint: &mut Complaint,
    status: Option<ComplaintStatus>,
    message: Option<String>,
    responder: &Responder,
    now: DateTime<Utc>,
) -> AppliedUpdate {
    if let Some(status) = status {
        complaint.status = status;
    }
    complaint.updated_at = now;

    let response = message.map(|message| ComplaintResponse {
        id: Uuid::new_v4(),
        complaint_id: complaint.id,
        message,
        responded_at: now,
        responded_by: responder.user_id,
        responder_role: responder.role,
        responder_agency_id: responder.agency_id,
    });
    if let Some(response) = &response {
        complaint.responses.push(response.clone());
    }

    AppliedUpdate {
        status,
        updated_at: now,
        response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::access::tests::{agency, complaint};
    use chrono::Duration;
    use std::collections::HashSet;

    fn form(description: &str) -> ComplaintForm {
        ComplaintForm {
            full_name: Some("A".to_string()),
            email: Some("a@b.com".to_string()),
            category: Some("EDUCATION".to_string()),
            description: Some(description.to_string()),
            location: None,
        }
    }

    fn fields(err: AppError) -> Vec<String> {
        match err {
            AppError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    fn admin() -> Responder {
        Responder {
            user_id: Uuid::new_v4(),
            role: Role::Admin,
            agency_id: None,
        }
    }

    #[test]
    fn test_valid_submission() {
        let new = form("School roof leaking badly").validate().unwrap();
        assert_eq!(new.status(), ComplaintStatus::Pending);
        assert_eq!(new.category, ComplaintCategory::Education);
        assert_eq!(new.email, "a@b.com");
        assert_eq!(new.ticket_id.len(), TICKET_ID_LEN);
        assert!(new.location.is_none());
    }

    #[test]
    fn test_short_description_rejected() {
        let err = form("short").validate().unwrap_err();
        assert_eq!(fields(err), vec!["description"]);
    }

    #[test]
    fn test_description_length_counts_trimmed_chars() {
        assert!(form("   123456789   ").validate().is_err());
        assert!(form("  1234567890  ").validate().is_ok());
    }

    #[test]
    fn test_every_invalid_field_reported() {
        let err = ComplaintForm {
            full_name: Some("   ".to_string()),
            email: Some("not-an-email".to_string()),
            category: Some("WATER".to_string()),
            description: None,
            location: Some("Kigali".to_string()),
        }
        .validate()
        .unwrap_err();

        assert_eq!(fields(err), vec!["fullName", "email", "category", "description"]);
    }

    #[test]
    fn test_email_is_normalized() {
        let mut f = form("School roof leaking badly");
        f.email = Some("  Citizen@Example.COM ".to_string());
        f.location = Some("  Nyarugenge ".to_string());
        let new = f.validate().unwrap();
        assert_eq!(new.email, "citizen@example.com");
        assert_eq!(new.location.as_deref(), Some("Nyarugenge"));
    }

    #[test]
    fn test_ticket_ids_are_unique_and_uppercase() {
        let ids: HashSet<String> = (0..2000).map(|_| generate_ticket_id()).collect();
        assert_eq!(ids.len(), 2000);
        for id in &ids {
            assert_eq!(id.len(), TICKET_ID_LEN);
            assert!(id.chars().all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
        }
    }

    #[test]
    fn test_normalize_ticket_id() {
        assert_eq!(normalize_ticket_id(" k3j9x0pq2m "), "K3J9X0PQ2M");
    }

    #[test]
    fn test_status_update_validation() {
        let update = StatusUpdatePayload {
            status: Some("RESOLVED".to_string()),
            message: Some("  Fixed the roof ".to_string()),
        }
        .validate()
        .unwrap();
        assert_eq!(update.status, ComplaintStatus::Resolved);
        assert_eq!(update.message.as_deref(), Some("Fixed the roof"));

        let err = StatusUpdatePayload {
            status: Some("CLOSED".to_string()),
            message: Some("   ".to_string()),
        }
        .validate()
        .unwrap_err();
        assert_eq!(fields(err), vec!["status", "message"]);

        let err = StatusUpdatePayload::default().validate().unwrap_err();
        assert_eq!(fields(err), vec!["status"]);
    }

    #[test]
    fn test_response_payload_requires_message() {
        assert!(ResponsePayload { message: Some(" ".to_string()) }.validate().is_err());
        assert_eq!(
            ResponsePayload { message: Some(" ok ".to_string()) }.validate().unwrap(),
            "ok"
        );
    }

    #[test]
    fn test_any_status_reachable_from_any_status() {
        let responder = admin();
        let mut c = complaint(ComplaintCategory::Education);
        for from in ComplaintStatus::ALL {
            for to in ComplaintStatus::ALL {
                c.status = from;
                apply_update(&mut c, Some(to), None, &responder, Utc::now());
                assert_eq!(c.status, to);
            }
        }
    }

    #[test]
    fn test_update_refreshes_timestamp_and_keeps_response_order() {
        let responder = admin();
        let mut c = complaint(ComplaintCategory::Education);
        let created = c.created_at;
        let t1 = created + Duration::hours(1);
        let t2 = created + Duration::hours(2);
        let t3 = created + Duration::hours(3);

        let first = apply_update(&mut c, Some(ComplaintStatus::InReview), Some("Looking".into()), &responder, t1);
        assert!(first.response.is_some());
        assert_eq!(c.updated_at, t1);

        let none = apply_update(&mut c, Some(ComplaintStatus::InReview), None, &responder, t2);
        assert!(none.response.is_none());
        assert_eq!(c.updated_at, t2);

        apply_update(&mut c, Some(ComplaintStatus::Resolved), Some("Done".into()), &responder, t3);
        assert_eq!(c.updated_at, t3);

        let messages: Vec<&str> = c.responses.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["Looking", "Done"]);
        assert_eq!(c.responses[0].responded_at, t1);
        assert_eq!(c.responses[1].responded_at, t3);
    }

    #[test]
    fn test_response_without_status_change() {
        let responder = admin();
        let mut c = complaint(ComplaintCategory::Education);
        c.status = ComplaintStatus::Rejected;
        let applied = apply_update(&mut c, None, Some("Reopen if needed".into()), &responder, Utc::now());
        assert_eq!(c.status, ComplaintStatus::Rejected);
        assert_eq!(c.responses.len(), 1);
        assert_eq!(applied.response.as_ref(), c.responses.last());
    }

    #[test]
    fn test_response_only_update_leaves_stored_status_untouched() {
        let responder = admin();
        let mut c = complaint(ComplaintCategory::Education);
        let now = Utc::now();

        let applied = apply_update(&mut c, None, Some("We are on it".into()), &responder, now);
        assert_eq!(applied.status, None);
        assert_eq!(applied.updated_at, now);

        let applied = apply_update(&mut c, Some(ComplaintStatus::Resolved), None, &responder, now);
        assert_eq!(applied.status, Some(ComplaintStatus::Resolved));
        assert!(applied.response.is_none());
    }

    #[test]
    fn test_responder_snapshot() {
        let reb = agency(&[ComplaintCategory::Education]);
        let reb_id = reb.id;
        let agency_admin = Caller::AgencyAdmin {
            user_id: Uuid::new_v4(),
            agency: reb,
        };
        let responder = Responder::from_caller(&agency_admin).unwrap();
        assert_eq!(responder.role, Role::AgencyAdmin);
        assert_eq!(responder.agency_id, Some(reb_id));

        let admin = Caller::Admin { user_id: Uuid::new_v4() };
        let responder = Responder::from_caller(&admin).unwrap();
        assert_eq!(responder.role, Role::Admin);
        assert_eq!(responder.agency_id, None);

        assert!(Responder::from_caller(&Caller::Citizen { user_id: Uuid::new_v4() }).is_none());
    }
}
