//! Employee confirmation of issued devices.
//!
//! Evaluation is split in two: `check_assignment` / `check_device` decide
//! what should happen from the loaded rows alone, and `ConfirmationService`
//! applies that decision inside a transaction holding the row locks.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Postgres, Transaction};
use utoipa::ToSchema;

use crate::{
    config::ConfirmConfig,
    error::{AppError, AppResult},
    models::{
        assignment::{Assignment, AssignmentAction, AssignmentStatus},
        device::{Device, DeviceStatus},
    },
    repository::{assignments::AssignmentsRepository, devices::DevicesRepository, Repository},
    services::{
        confirm_token::{generate_confirm_token, hash_token, is_expired},
        notifications::Notifier,
    },
};

/// What a confirmation attempt should do, decided from the locked rows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmDecision {
    InvalidToken,
    AlreadyConfirmed,
    NotPending(AssignmentStatus),
    /// `notify` is set when administrators have not been told yet
    Expired { notify: bool },
    DeviceMissing,
    DeviceUnavailable(DeviceStatus),
    Confirm,
}

/// Checks that depend on the assignment alone. Status wins over expiry:
/// a cancelled or failed record never reports TOKEN_EXPIRED.
pub fn check_assignment(
    assignment: Option<&Assignment>,
    now: DateTime<Utc>,
) -> Result<(), ConfirmDecision> {
    let assignment = assignment.ok_or(ConfirmDecision::InvalidToken)?;
    match assignment.status {
        AssignmentStatus::Confirmed => Err(ConfirmDecision::AlreadyConfirmed),
        AssignmentStatus::PendingConfirm => {
            if is_expired(assignment.confirm_token_expires_at, now) {
                Err(ConfirmDecision::Expired {
                    notify: assignment.admin_notified_expired_at.is_none(),
                })
            } else {
                Ok(())
            }
        }
        other => Err(ConfirmDecision::NotPending(other)),
    }
}

pub fn check_device(device: Option<&Device>) -> Result<(), ConfirmDecision> {
    match device {
        None => Err(ConfirmDecision::DeviceMissing),
        Some(d) if d.status != DeviceStatus::Available => Err(ConfirmDecision::DeviceUnavailable(d.status)),
        Some(_) => Ok(()),
    }
}

pub fn decide(assignment: Option<&Assignment>, device: Option<&Device>, now: DateTime<Utc>) -> ConfirmDecision {
    match check_assignment(assignment, now).and_then(|_| check_device(device)) {
        Ok(()) => ConfirmDecision::Confirm,
        Err(decision) => decision,
    }
}

/// Result category reported to the employee
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ConfirmKind {
    Confirmed,
    AlreadyConfirmed,
    InvalidToken,
    TokenExpired,
    NotPending,
    DeviceMissing,
    DeviceUnavailable,
}

impl ConfirmKind {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ConfirmKind::Confirmed | ConfirmKind::AlreadyConfirmed => StatusCode::OK,
            ConfirmKind::InvalidToken | ConfirmKind::TokenExpired | ConfirmKind::NotPending => {
                StatusCode::BAD_REQUEST
            }
            ConfirmKind::DeviceMissing => StatusCode::NOT_FOUND,
            ConfirmKind::DeviceUnavailable => StatusCode::CONFLICT,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ConfirmKind::Confirmed => "Receipt confirmed",
            ConfirmKind::AlreadyConfirmed => "Already confirmed",
            ConfirmKind::TokenExpired => "Confirmation link expired",
            _ => "Confirmation failed",
        }
    }
}

/// Structured result of a confirmation attempt
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmOutcome {
    pub ok: bool,
    #[serde(rename = "code")]
    pub kind: ConfirmKind,
    pub message: String,
    pub assignment_id: Option<i32>,
    pub status: Option<AssignmentStatus>,
    pub device_code: Option<String>,
    pub employee_name: Option<String>,
    pub already_confirmed: bool,
    pub can_resend: bool,
}

impl ConfirmOutcome {
    fn new(kind: ConfirmKind, message: impl Into<String>) -> Self {
        Self {
            ok: kind.status_code().is_success(),
            kind,
            message: message.into(),
            assignment_id: None,
            status: None,
            device_code: None,
            employee_name: None,
            already_confirmed: kind == ConfirmKind::AlreadyConfirmed,
            can_resend: kind == ConfirmKind::TokenExpired,
        }
    }

    fn about(mut self, assignment: &Assignment, device: Option<&Device>) -> Self {
        self.assignment_id = Some(assignment.id);
        self.status = Some(assignment.status);
        self.employee_name = Some(assignment.employee_name.clone());
        self.device_code = device.map(|d| d.code.clone());
        self
    }

    pub fn http_status(&self) -> StatusCode {
        self.kind.status_code()
    }
}

/// Requester details recorded on a successful confirmation
#[derive(Debug, Clone, Default)]
pub struct ClientInfo {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// Returned when a fresh confirmation link has been emailed
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResendReceipt {
    pub assignment_id: i32,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct ConfirmationService {
    repository: Repository,
    notifier: Notifier,
    config: ConfirmConfig,
}

impl ConfirmationService {
    pub fn new(repository: Repository, notifier: Notifier, config: ConfirmConfig) -> Self {
        Self {
            repository,
            notifier,
            config,
        }
    }

    /// Confirm receipt of an issued device through its emailed token
    pub async fn confirm(&self, token: &str, client: &ClientInfo) -> AppResult<ConfirmOutcome> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Validation("Token is required".to_string()));
        }

        let now = Utc::now();
        let mut tx = self.repository.begin().await?;
        let assignment = AssignmentsRepository::lock_by_token_hash(&mut *tx, &hash_token(token)).await?;

        let Some(assignment) = assignment else {
            tracing::info!("confirmation attempted with unknown token");
            return Ok(ConfirmOutcome::new(
                ConfirmKind::InvalidToken,
                "Invalid or already used confirmation link",
            ));
        };

        if let Err(decision) = check_assignment(Some(&assignment), now) {
            return self.settle_without_device(tx, assignment, decision, now).await;
        }

        // Assignment row first, then the device row
        let device = match assignment.device_id {
            Some(id) => DevicesRepository::lock_by_id(&mut *tx, id).await?,
            None => None,
        };

        match (check_device(device.as_ref()), device) {
            (Ok(()), Some(device)) => {
                DevicesRepository::set_status(&mut *tx, device.id, DeviceStatus::Assigned).await?;
                let confirmed = AssignmentsRepository::mark_confirmed(
                    &mut *tx,
                    assignment.id,
                    now,
                    client.ip.as_deref(),
                    client.user_agent.as_deref(),
                )
                .await?;
                tx.commit().await?;

                tracing::info!(assignment_id = confirmed.id, device_id = device.id, "assignment confirmed");
                let message = format!(
                    "Assignment #{} for device {} has been confirmed",
                    confirmed.id, device.code
                );
                Ok(ConfirmOutcome::new(ConfirmKind::Confirmed, message).about(&confirmed, Some(&device)))
            }
            (Err(ConfirmDecision::DeviceUnavailable(status)), device) => {
                let note = format!("Confirmation failed: device was {} at confirmation time", status);
                let failed = AssignmentsRepository::mark_failed(&mut *tx, assignment.id, &note).await?;
                tx.commit().await?;
                tracing::warn!(assignment_id = failed.id, device_status = %status, "confirmation failed, device unavailable");
                Ok(
                    ConfirmOutcome::new(ConfirmKind::DeviceUnavailable, "The device is no longer available for issue")
                        .about(&failed, device.as_ref()),
                )
            }
            _ => {
                let failed = AssignmentsRepository::mark_failed(
                    &mut *tx,
                    assignment.id,
                    "Confirmation failed: device no longer exists",
                )
                .await?;
                tx.commit().await?;
                tracing::warn!(assignment_id = failed.id, "confirmation failed, device missing");
                Ok(ConfirmOutcome::new(ConfirmKind::DeviceMissing, "The device no longer exists").about(&failed, None))
            }
        }
    }

    /// Outcomes decided before the device row is needed
    async fn settle_without_device(
        &self,
        mut tx: Transaction<'static, Postgres>,
        assignment: Assignment,
        decision: ConfirmDecision,
        now: DateTime<Utc>,
    ) -> AppResult<ConfirmOutcome> {
        let notify = match decision {
            ConfirmDecision::Expired { notify: true } => {
                AssignmentsRepository::mark_expiry_notified(&mut *tx, assignment.id, now).await?
            }
            _ => false,
        };
        tx.commit().await?;

        let device = match assignment.device_id {
            Some(id) => self.repository.devices.find_by_id(id).await?,
            None => None,
        };

        let outcome = match decision {
            ConfirmDecision::AlreadyConfirmed => ConfirmOutcome::new(
                ConfirmKind::AlreadyConfirmed,
                format!("Assignment #{} was already confirmed", assignment.id),
            ),
            ConfirmDecision::Expired { .. } => {
                tracing::info!(assignment_id = assignment.id, notify, "confirmation link expired");
                if notify {
                    let admins = self.repository.users.active_admin_emails().await.unwrap_or_else(|e| {
                        tracing::error!(error = %e, "failed to load administrator emails");
                        Vec::new()
                    });
                    self.notifier.notify_expired(admins, &assignment, device.as_ref()).await;
                }
                ConfirmOutcome::new(
                    ConfirmKind::TokenExpired,
                    "This confirmation link has expired. Request a new one.",
                )
            }
            ConfirmDecision::NotPending(status) => ConfirmOutcome::new(
                ConfirmKind::NotPending,
                format!("This assignment is not awaiting confirmation (status {})", status),
            ),
            _ => ConfirmOutcome::new(ConfirmKind::InvalidToken, "Invalid or already used confirmation link"),
        };

        Ok(outcome.about(&assignment, device.as_ref()))
    }

    /// Self-service resend: the employee trades a known token for a fresh link
    pub async fn resend_by_token(&self, token: &str) -> AppResult<ResendReceipt> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AppError::Validation("Token is required".to_string()));
        }

        let mut tx = self.repository.begin().await?;
        let assignment = AssignmentsRepository::lock_by_token_hash(&mut *tx, &hash_token(token))
            .await?
            .ok_or(AppError::InvalidToken)?;

        if assignment.status == AssignmentStatus::Confirmed {
            return Err(AppError::BadRequest("This assignment is already confirmed".to_string()));
        }
        if assignment.action != AssignmentAction::Issue {
            return Err(AppError::BadRequest("Only issue assignments need confirmation".to_string()));
        }

        let device = self.device_of(&assignment).await?;
        self.reissue(tx, &assignment, &device).await
    }

    /// Staff resend for a pending issue
    pub async fn resend_for_assignment(&self, id: i32) -> AppResult<ResendReceipt> {
        let mut tx = self.repository.begin().await?;
        let assignment = AssignmentsRepository::lock_by_id(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment with id {} not found", id)))?;

        if assignment.action != AssignmentAction::Issue {
            return Err(AppError::BadRequest("Only issue assignments need confirmation".to_string()));
        }
        if assignment.status != AssignmentStatus::PendingConfirm {
            return Err(AppError::BadRequest(format!(
                "Assignment is not awaiting confirmation (status {})",
                assignment.status
            )));
        }

        let device = self.device_of(&assignment).await?;
        self.reissue(tx, &assignment, &device).await
    }

    /// Cancel a pending assignment. The device is left untouched.
    pub async fn cancel(&self, id: i32) -> AppResult<Assignment> {
        let mut tx = self.repository.begin().await?;
        let assignment = AssignmentsRepository::lock_by_id(&mut *tx, id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment with id {} not found", id)))?;

        if assignment.status != AssignmentStatus::PendingConfirm {
            return Err(AppError::BadRequest(format!(
                "Only pending assignments can be cancelled (status {})",
                assignment.status
            )));
        }

        let cancelled = AssignmentsRepository::mark_cancelled(&mut *tx, id).await?;
        tx.commit().await?;
        tracing::info!(assignment_id = id, "assignment cancelled");
        Ok(cancelled)
    }

    async fn device_of(&self, assignment: &Assignment) -> AppResult<Device> {
        let device = match assignment.device_id {
            Some(id) => self.repository.devices.find_by_id(id).await?,
            None => None,
        };
        device.ok_or_else(|| AppError::NotFound("Device not found".to_string()))
    }

    /// Rotate the token, then regenerate the document and email the new link.
    /// The email is the point of a resend, so its failure is returned.
    async fn reissue(
        &self,
        mut tx: Transaction<'static, Postgres>,
        assignment: &Assignment,
        device: &Device,
    ) -> AppResult<ResendReceipt> {
        let token = generate_confirm_token(self.config.issue_lifetime_hours());
        let rotated =
            AssignmentsRepository::rotate_token(&mut *tx, assignment.id, &token.token_hash, token.expires_at).await?;
        tx.commit().await?;
        tracing::info!(assignment_id = rotated.id, expires_at = %token.expires_at, "confirmation token reissued");

        let (rotated, attachment) = self
            .notifier
            .attach_document(&self.repository.assignments, rotated, device)
            .await;
        self.notifier
            .send_issue_request(&rotated, device, &token, attachment)
            .await?;

        Ok(ResendReceipt {
            assignment_id: rotated.id,
            expires_at: token.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::assignment::tests::pending_issue;
    use crate::models::device::tests::device;
    use chrono::Duration;

    #[test]
    fn test_decision_table() {
        let now = Utc::now();
        let live = pending_issue("h", now + Duration::minutes(10));
        let available = device(DeviceStatus::Available);
        let assigned = device(DeviceStatus::Assigned);

        let mut expired = live.clone();
        expired.confirm_token_expires_at = Some(now - Duration::seconds(1));
        let mut expired_notified = expired.clone();
        expired_notified.admin_notified_expired_at = Some(now - Duration::minutes(1));
        let mut confirmed = live.clone();
        confirmed.status = AssignmentStatus::Confirmed;
        let mut cancelled_and_stale = expired.clone();
        cancelled_and_stale.status = AssignmentStatus::Cancelled;

        let cases: Vec<(Option<&Assignment>, Option<&Device>, ConfirmDecision)> = vec![
            (None, Some(&available), ConfirmDecision::InvalidToken),
            (Some(&confirmed), Some(&assigned), ConfirmDecision::AlreadyConfirmed),
            (Some(&expired), Some(&available), ConfirmDecision::Expired { notify: true }),
            (Some(&expired_notified), Some(&available), ConfirmDecision::Expired { notify: false }),
            (
                Some(&cancelled_and_stale),
                Some(&available),
                ConfirmDecision::NotPending(AssignmentStatus::Cancelled),
            ),
            (Some(&live), None, ConfirmDecision::DeviceMissing),
            (
                Some(&live),
                Some(&assigned),
                ConfirmDecision::DeviceUnavailable(DeviceStatus::Assigned),
            ),
            (Some(&live), Some(&available), ConfirmDecision::Confirm),
        ];

        for (assignment, device, expected) in cases {
            assert_eq!(decide(assignment, device, now), expected);
        }
    }

    #[test]
    fn test_missing_expiry_counts_as_expired() {
        let now = Utc::now();
        let mut assignment = pending_issue("h", now);
        assignment.confirm_token_expires_at = None;
        assert_eq!(
            check_assignment(Some(&assignment), now),
            Err(ConfirmDecision::Expired { notify: true })
        );
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let now = Utc::now();
        let assignment = pending_issue("h", now);
        assert_eq!(check_assignment(Some(&assignment), now), Ok(()));
    }

    #[test]
    fn test_terminal_states_are_not_pending() {
        let now = Utc::now();
        for status in [AssignmentStatus::Failed, AssignmentStatus::Returned] {
            let mut assignment = pending_issue("h", now + Duration::hours(1));
            assignment.status = status;
            assert_eq!(
                check_assignment(Some(&assignment), now),
                Err(ConfirmDecision::NotPending(status))
            );
        }
    }

    #[test]
    fn test_cancelled_link_is_not_pending() {
        let now = Utc::now();
        let mut assignment = pending_issue("h", now + Duration::minutes(20));
        assignment.status = AssignmentStatus::Cancelled;
        assert!(assignment.confirm_token.is_some());
        assert_eq!(
            decide(Some(&assignment), Some(&device(DeviceStatus::Available)), now),
            ConfirmDecision::NotPending(AssignmentStatus::Cancelled)
        );
    }

    #[test]
    fn test_outcome_statuses() {
        assert_eq!(ConfirmKind::Confirmed.status_code(), StatusCode::OK);
        assert_eq!(ConfirmKind::AlreadyConfirmed.status_code(), StatusCode::OK);
        assert_eq!(ConfirmKind::InvalidToken.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ConfirmKind::TokenExpired.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ConfirmKind::NotPending.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ConfirmKind::DeviceMissing.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ConfirmKind::DeviceUnavailable.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_outcome_payload() {
        let now = Utc::now();
        let assignment = pending_issue("h", now);
        let expired = ConfirmOutcome::new(ConfirmKind::TokenExpired, "expired")
            .about(&assignment, Some(&device(DeviceStatus::Available)));
        let json = serde_json::to_value(&expired).unwrap();
        assert_eq!(json["ok"], false);
        assert_eq!(json["code"], "TOKEN_EXPIRED");
        assert_eq!(json["canResend"], true);
        assert_eq!(json["deviceCode"], "LAP-001");
        assert_eq!(json["status"], "PENDING_CONFIRM");

        let already = ConfirmOutcome::new(ConfirmKind::AlreadyConfirmed, "done");
        let json = serde_json::to_value(&already).unwrap();
        assert_eq!(json["ok"], true);
        assert_eq!(json["alreadyConfirmed"], true);
        assert_eq!(json["canResend"], false);
    }
}
