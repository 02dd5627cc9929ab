use crate::domain::models::{FeedbackType, ServiceType};
use crate::domain::validation::{is_valid_email, non_empty, normalize_email};
use crate::error::{AppError, FieldError};
use serde::Deserialize;

pub const MAX_FEEDBACK_CHARS: usize = 5000;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeedbackForm {
    pub full_name: Option<String>,
    pub email: Option<String>,
    #[serde(rename = "type")]
    pub feedback_type: Option<String>,
    pub service_type: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct NewFeedback {
    pub full_name: Option<String>,
    pub email: Option<String>,
    pub feedback_type: FeedbackType,
    pub service_type: ServiceType,
    pub message: String,
}

impl FeedbackForm {
    pub fn validate(self) -> Result<NewFeedback, AppError> {
        let mut errors = Vec::new();

        let email = non_empty(self.email).map(|e| normalize_email(&e));
        if email.as_deref().is_some_and(|e| !is_valid_email(e)) {
            errors.push(FieldError::new("email", "Please enter a valid email address"));
        }

        let feedback_type = match non_empty(self.feedback_type) {
            None => Some(FeedbackType::Other),
            Some(raw) => raw.parse().ok(),
        };
        if feedback_type.is_none() {
            errors.push(FieldError::new("type", "Invalid feedback type"));
        }

        let service_type = match non_empty(self.service_type) {
            None => Some(ServiceType::Other),
            Some(raw) => raw.parse().ok(),
        };
        if service_type.is_none() {
            errors.push(FieldError::new("serviceType", "Invalid service type"));
        }

        let message = non_empty(self.message);
        match &message {
            None => errors.push(FieldError::new("message", "Feedback message is required")),
            Some(m) if m.chars().count() > MAX_FEEDBACK_CHARS => errors.push(FieldError::new(
                "message",
                format!("Feedback message must be at most {MAX_FEEDBACK_CHARS} characters"),
            )),
            Some(_) => {}
        }

        AppError::check(errors)?;

        match (feedback_type, service_type, message) {
            (Some(feedback_type), Some(service_type), Some(message)) => Ok(NewFeedback {
                full_name: non_empty(self.full_name),
                email,
                feedback_type,
                service_type,
                message,
            }),
            _ => Err(AppError::invalid("body", "Invalid feedback")),
        }
    }
}
