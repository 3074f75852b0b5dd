//! Assignment (issue / return ledger entry) model and related types

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use super::device::{DeviceStatus, DeviceSummary};
use super::user::StaffSummary;

/// What the ledger entry records. Fixed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AssignmentAction {
    Issue,
    Return,
}

impl_text_enum!(AssignmentAction {
    Issue => "issue",
    Return => "return",
});

/// Confirmation state of an assignment.
///
/// `PendingConfirm` is the only non-terminal state. `Returned` is reached
/// only through the return path, never through confirmation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssignmentStatus {
    PendingConfirm,
    Confirmed,
    Cancelled,
    Failed,
    Returned,
}

impl_text_enum!(AssignmentStatus {
    PendingConfirm => "PENDING_CONFIRM",
    Confirmed => "CONFIRMED",
    Cancelled => "CANCELLED",
    Failed => "FAILED",
    Returned => "RETURNED",
});

impl AssignmentStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, AssignmentStatus::PendingConfirm)
    }
}

/// Assignment record from database
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub id: i32,
    /// `None` once the device has been deleted
    pub device_id: Option<i32>,
    /// Staff member who recorded the assignment
    pub user_id: Option<i32>,
    pub action: AssignmentAction,
    pub status: AssignmentStatus,
    pub employee_name: String,
    pub employee_code: String,
    pub employee_email: String,
    pub department: String,
    pub notes: Option<String>,
    pub return_reason: Option<String>,
    pub occurred_at: DateTime<Utc>,
    /// SHA-256 hex digest of the emailed token, never the token itself
    #[serde(skip_serializing)]
    pub confirm_token: Option<String>,
    pub confirm_token_expires_at: Option<DateTime<Utc>>,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub confirmed_ip: Option<String>,
    pub confirmed_user_agent: Option<String>,
    pub admin_notified_expired_at: Option<DateTime<Utc>>,
    pub document_url: Option<String>,
    pub document_name: Option<String>,
    pub document_generated_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Employee snapshot captured on the assignment
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EmployeeInfo {
    pub name: String,
    pub code: String,
    pub email: String,
    pub department: String,
}

impl Assignment {
    pub fn employee(&self) -> EmployeeInfo {
        EmployeeInfo {
            name: self.employee_name.clone(),
            code: self.employee_code.clone(),
            email: self.employee_email.clone(),
            department: self.department.clone(),
        }
    }
}

/// Create assignment request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateAssignment {
    pub device_id: i32,
    pub action: AssignmentAction,
    #[validate(length(min = 1, message = "employeeName is required"))]
    pub employee_name: String,
    #[validate(length(min = 1, message = "employeeCode is required"))]
    pub employee_code: String,
    #[validate(email(message = "employeeEmail must be a valid email"))]
    pub employee_email: String,
    #[validate(length(min = 1, message = "department is required"))]
    pub department: String,
    pub notes: Option<String>,
    pub return_reason: Option<String>,
}

impl CreateAssignment {
    /// Trim every text field; blank optional fields become `None`.
    /// Run before `validate` so whitespace-only values count as missing.
    pub fn normalized(self) -> Self {
        let optional = |v: Option<String>| v.map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        Self {
            employee_name: self.employee_name.trim().to_string(),
            employee_code: self.employee_code.trim().to_string(),
            employee_email: self.employee_email.trim().to_string(),
            department: self.department.trim().to_string(),
            notes: optional(self.notes),
            return_reason: optional(self.return_reason),
            ..self
        }
    }
}

/// Row inserted into the ledger
#[derive(Debug, Clone)]
pub struct NewAssignment {
    pub device_id: i32,
    pub user_id: i32,
    pub action: AssignmentAction,
    pub status: AssignmentStatus,
    pub employee: EmployeeInfo,
    pub notes: Option<String>,
    pub return_reason: Option<String>,
    pub confirm_token: Option<String>,
    pub confirm_token_expires_at: Option<DateTime<Utc>>,
}

/// Generated document reference
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRef {
    pub url: String,
    pub name: String,
    pub generated_at: DateTime<Utc>,
}

/// History filters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentQuery {
    /// Single day (takes precedence over start/end)
    pub date: Option<NaiveDate>,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    pub action: Option<AssignmentAction>,
    /// Matches employee, department, notes, device and staff names
    pub search: Option<String>,
}

/// Joined history row
#[derive(Debug, Clone, FromRow)]
pub struct AssignmentHistoryRow {
    #[sqlx(flatten)]
    pub assignment: Assignment,
    pub device_name: Option<String>,
    pub device_code: Option<String>,
    pub device_status: Option<DeviceStatus>,
    pub staff_name: Option<String>,
    pub staff_email: Option<String>,
}

/// Assignment with its device and recording staff member
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct AssignmentDetails {
    #[serde(flatten)]
    pub assignment: Assignment,
    pub device: Option<DeviceSummary>,
    pub user: Option<StaffSummary>,
}

impl From<AssignmentHistoryRow> for AssignmentDetails {
    fn from(row: AssignmentHistoryRow) -> Self {
        let device = match (row.assignment.device_id, row.device_name, row.device_code, row.device_status) {
            (Some(id), Some(name), Some(code), Some(status)) => Some(DeviceSummary { id, name, code, status }),
            _ => None,
        };
        let user = match (row.assignment.user_id, row.staff_name, row.staff_email) {
            (Some(id), Some(name), Some(email)) => Some(StaffSummary { id, name, email }),
            _ => None,
        };
        AssignmentDetails {
            assignment: row.assignment,
            device,
            user,
        }
    }
}

/// Active-assignee filters
#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAssigneeQuery {
    pub employee_code: Option<String>,
    pub employee_email: Option<String>,
}

/// Confirmed issue joined with its currently assigned device
#[derive(Debug, Clone, FromRow)]
pub struct ActiveAssignmentRow {
    pub assignment_id: i32,
    pub device_id: i32,
    pub employee_name: String,
    pub employee_code: String,
    pub employee_email: String,
    pub department: String,
    pub device_name: String,
    pub device_code: String,
    pub device_status: DeviceStatus,
    pub occurred_at: DateTime<Utc>,
}

/// Employee currently holding one or more devices
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ActiveAssignee {
    pub employee_name: String,
    pub employee_code: String,
    pub employee_email: String,
    pub department: String,
    pub devices: Vec<DeviceSummary>,
}

/// Employee snapshot shown on the public device page
#[derive(Debug, Clone, Serialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceHolder {
    pub employee_name: String,
    pub employee_code: String,
    pub employee_email: String,
    pub department: String,
    pub occurred_at: DateTime<Utc>,
    pub notes: Option<String>,
}
