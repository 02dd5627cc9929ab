//! Role-scoped access rules for complaints and administrative actions.
//!
//! Admins see everything. Agency admins see complaints whose category is one
//! of their agency's categories. Citizens get no administrative access.

use crate::domain::models::{Agency, Complaint, ComplaintCategory, Role};
use crate::error::AppError;
use uuid::Uuid;

/// An authenticated caller, resolved from the session on every request.
#[derive(Debug, Clone)]
pub enum Caller {
    Citizen { user_id: Uuid },
    Admin { user_id: Uuid },
    AgencyAdmin { user_id: Uuid, agency: Agency },
}

impl Caller {
    pub fn user_id(&self) -> Uuid {
        match self {
            Caller::Citizen { user_id }
            | Caller::Admin { user_id }
            | Caller::AgencyAdmin { user_id, .. } => *user_id,
        }
    }

    pub fn role(&self) -> Role {
        match self {
            Caller::Citizen { .. } => Role::Citizen,
            Caller::Admin { .. } => Role::Admin,
            Caller::AgencyAdmin { .. } => Role::AgencyAdmin,
        }
    }

    pub fn agency(&self) -> Option<&Agency> {
        match self {
            Caller::AgencyAdmin { agency, .. } => Some(agency),
            Caller::Citizen { .. } | Caller::Admin { .. } => None,
        }
    }
}

/// Which complaints a caller may list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ComplaintScope {
    All,
    Categories(Vec<ComplaintCategory>),
}

impl ComplaintScope {
    pub fn allows(&self, category: ComplaintCategory) -> bool {
        match self {
            ComplaintScope::All => true,
            ComplaintScope::Categories(categories) => categories.contains(&category),
        }
    }

    /// Category restriction to push down into queries; `None` means unrestricted.
    pub fn categories(&self) -> Option<Vec<ComplaintCategory>> {
        match self {
            ComplaintScope::All => None,
            ComplaintScope::Categories(categories) => Some(categories.clone()),
        }
    }
}

/// Admins see everything, agency admins their agency's categories, citizens nothing.
pub fn can_access_complaint(caller: &Caller, complaint: &Complaint) -> bool {
    complaint_scope(caller).is_ok_and(|scope| scope.allows(complaint.category))
}

pub fn complaint_scope(caller: &Caller) -> Result<ComplaintScope, AppError> {
    match caller {
        Caller::Admin { .. } => Ok(ComplaintScope::All),
        Caller::AgencyAdmin { agency, .. } => Ok(ComplaintScope::Categories(agency.categories.clone())),
        Caller::Citizen { .. } => Err(AppError::forbidden("Administrative access required")),
    }
}

/// Gates access to a looked-up complaint. A missing complaint is reported as
/// `NotFound` before any role or category rule is applied.
pub fn authorize_complaint(caller: &Caller, complaint: Option<Complaint>) -> Result<Complaint, AppError> {
    let complaint = complaint.ok_or_else(|| AppError::not_found("Complaint not found"))?;

    match caller {
        Caller::Citizen { .. } => Err(AppError::forbidden("Administrative access required")),
        _ if can_access_complaint(caller, &complaint) => Ok(complaint),
        _ => Err(AppError::forbidden(
            "You do not have access to this complaint category",
        )),
    }
}

pub fn require_admin(caller: &Caller) -> Result<(), AppError> {
    match caller {
        Caller::Admin { .. } => Ok(()),
        Caller::AgencyAdmin { .. } | Caller::Citizen { .. } => {
            Err(AppError::forbidden("Admin access required"))
        }
    }
}

pub fn require_agency_admin(caller: &Caller) -> Result<&Agency, AppError> {
    match caller {
        Caller::AgencyAdmin { agency, .. } => Ok(agency),
        Caller::Admin { .. } | Caller::Citizen { .. } => {
            Err(AppError::forbidden("Agency admin access required"))
        }
    }
}
