//! Issue and return of devices

use std::collections::HashSet;

use chrono::{NaiveDate, Utc};
use indexmap::IndexMap;
use validator::Validate;

use crate::{
    config::ConfirmConfig,
    error::{AppError, AppResult},
    models::{
        assignment::{
            ActiveAssignee, ActiveAssigneeQuery, ActiveAssignmentRow, Assignment, AssignmentAction,
            AssignmentDetails, AssignmentQuery, AssignmentStatus, CreateAssignment, EmployeeInfo,
            NewAssignment,
        },
        device::{Device, DeviceStatus, DeviceSummary, LifecycleStatus},
        user::UserClaims,
    },
    repository::{assignments::AssignmentsRepository, devices::DevicesRepository, Repository},
    services::{auth::verify_password, confirm_token::generate_confirm_token, notifications::Notifier},
};

/// Device-side conditions for recording `action`
pub fn check_preconditions(device: &Device, action: AssignmentAction, today: NaiveDate) -> AppResult<()> {
    match action {
        AssignmentAction::Issue => {
            if device.status != DeviceStatus::Available {
                return Err(AppError::Conflict(format!("Device {} is not available", device.code)));
            }
            if device.lifecycle_status != LifecycleStatus::Normal {
                return Err(AppError::Conflict(format!(
                    "Device {} is not in an assignable lifecycle state ({})",
                    device.code, device.lifecycle_status
                )));
            }
            if device.is_warranty_expired(today) || device.is_maintenance_due(today) {
                return Err(AppError::Conflict(format!(
                    "Device {} is out of warranty or due for maintenance",
                    device.code
                )));
            }
        }
        AssignmentAction::Return => {
            if device.status != DeviceStatus::Assigned {
                return Err(AppError::Conflict(format!("Device {} is not currently assigned", device.code)));
            }
        }
    }
    Ok(())
}

/// Keep the newest row per device, then group devices by employee (code and email).
/// Rows must be sorted newest first.
pub fn group_active_assignees(rows: Vec<ActiveAssignmentRow>) -> Vec<ActiveAssignee> {
    let mut seen_devices = HashSet::new();
    let mut employees: IndexMap<(String, String), ActiveAssignee> = IndexMap::new();

    for row in rows {
        if !seen_devices.insert(row.device_id) {
            continue;
        }
        let key = (row.employee_code.clone(), row.employee_email.clone());
        let entry = employees.entry(key).or_insert_with(|| ActiveAssignee {
            employee_name: row.employee_name.clone(),
            employee_code: row.employee_code.clone(),
            employee_email: row.employee_email.clone(),
            department: row.department.clone(),
            devices: Vec::new(),
        });
        entry.devices.push(DeviceSummary {
            id: row.device_id,
            name: row.device_name,
            code: row.device_code,
            status: row.device_status,
        });
    }

    employees.into_values().collect()
}

#[derive(Clone)]
pub struct AssignmentsService {
    repository: Repository,
    notifier: Notifier,
    config: ConfirmConfig,
}

impl AssignmentsService {
    pub fn new(repository: Repository, notifier: Notifier, config: ConfirmConfig) -> Self {
        Self {
            repository,
            notifier,
            config,
        }
    }

    /// Record an issue (pending employee confirmation) or a return.
    ///
    /// The device row stays locked from the precondition check to the
    /// ledger insert. Document and email follow the commit and never fail
    /// the request.
    pub async fn create_assignment(&self, request: CreateAssignment, actor: &UserClaims) -> AppResult<Assignment> {
        let request = request.normalized();
        request.validate()?;

        let action = request.action;
        let employee = EmployeeInfo {
            name: request.employee_name,
            code: request.employee_code,
            email: request.employee_email,
            department: request.department,
        };

        let mut tx = self.repository.begin().await?;
        let device = DevicesRepository::lock_by_id(&mut *tx, request.device_id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Device with id {} not found", request.device_id)))?;

        check_preconditions(&device, action, Utc::now().date_naive())?;

        let token = match action {
            AssignmentAction::Issue => Some(generate_confirm_token(self.config.issue_lifetime_hours())),
            AssignmentAction::Return => {
                DevicesRepository::set_status(&mut *tx, device.id, DeviceStatus::Available).await?;
                None
            }
        };

        let assignment = AssignmentsRepository::insert(
            &mut *tx,
            &NewAssignment {
                device_id: device.id,
                user_id: actor.sub,
                action,
                status: match action {
                    AssignmentAction::Issue => AssignmentStatus::PendingConfirm,
                    AssignmentAction::Return => AssignmentStatus::Returned,
                },
                employee,
                notes: request.notes,
                return_reason: match action {
                    AssignmentAction::Return => request.return_reason,
                    AssignmentAction::Issue => None,
                },
                confirm_token: token.as_ref().map(|t| t.token_hash.clone()),
                confirm_token_expires_at: token.as_ref().map(|t| t.expires_at),
            },
        )
        .await?;
        tx.commit().await?;

        tracing::info!(
            assignment_id = assignment.id,
            device_id = device.id,
            action = %action,
            user_id = actor.sub,
            "assignment recorded"
        );

        let (assignment, attachment) = self
            .notifier
            .attach_document(&self.repository.assignments, assignment, &device)
            .await;

        let sent = match &token {
            Some(token) => {
                self.notifier
                    .send_issue_request(&assignment, &device, token, attachment)
                    .await
            }
            None => self.notifier.send_return_notice(&assignment, &device, attachment).await,
        };
        if let Err(e) = sent {
            tracing::warn!(assignment_id = assignment.id, error = %e, "assignment email not sent");
        }

        Ok(assignment)
    }

    pub async fn list(&self, query: &AssignmentQuery) -> AppResult<Vec<AssignmentDetails>> {
        self.repository.assignments.list(query).await
    }

    /// Employees currently holding confirmed devices
    pub async fn active_assignees(&self, query: &ActiveAssigneeQuery) -> AppResult<Vec<ActiveAssignee>> {
        let rows = self.repository.assignments.list_active(query).await?;
        Ok(group_active_assignees(rows))
    }

    /// Purge a ledger entry. Requires an administrator and their password.
    pub async fn delete_assignment(&self, id: i32, password: &str, actor: &UserClaims) -> AppResult<()> {
        actor.require_admin()?;
        if password.trim().is_empty() {
            return Err(AppError::Validation("Administrator password is required".to_string()));
        }

        let admin = self.repository.users.get_by_id(actor.sub).await?;
        if !verify_password(&admin.password_hash, password)? {
            return Err(AppError::Authentication("Incorrect administrator password".to_string()));
        }

        self.repository.assignments.delete(id).await?;
        tracing::warn!(assignment_id = id, user_id = actor.sub, "assignment deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::device::tests::device;
    use chrono::{DateTime, Duration, TimeZone};

    fn row(device_id: i32, code: &str, email: &str, at: DateTime<Utc>) -> ActiveAssignmentRow {
        ActiveAssignmentRow {
            assignment_id: device_id * 10,
            device_id,
            employee_name: format!("Employee {}", code),
            employee_code: code.to_string(),
            employee_email: email.to_string(),
            department: "IT".to_string(),
            device_name: format!("Device {}", device_id),
            device_code: format!("LAP-{:03}", device_id),
            device_status: DeviceStatus::Assigned,
            occurred_at: at,
        }
    }

    #[test]
    fn test_issue_preconditions() {
        let today = Utc::now().date_naive();
        assert!(check_preconditions(&device(DeviceStatus::Available), AssignmentAction::Issue, today).is_ok());

        let assigned = device(DeviceStatus::Assigned);
        assert!(matches!(
            check_preconditions(&assigned, AssignmentAction::Issue, today),
            Err(AppError::Conflict(_))
        ));

        let mut in_repair = device(DeviceStatus::Available);
        in_repair.lifecycle_status = LifecycleStatus::Repair;
        assert!(matches!(
            check_preconditions(&in_repair, AssignmentAction::Issue, today),
            Err(AppError::Conflict(msg)) if msg.contains("lifecycle")
        ));

        let mut out_of_warranty = device(DeviceStatus::Available);
        out_of_warranty.purchase_date = today - Duration::days(800);
        assert!(check_preconditions(&out_of_warranty, AssignmentAction::Issue, today).is_err());

        let mut never_maintained = device(DeviceStatus::Available);
        never_maintained.last_maintenance_date = None;
        assert!(check_preconditions(&never_maintained, AssignmentAction::Issue, today).is_err());
    }

    #[test]
    fn test_return_preconditions() {
        let today = Utc::now().date_naive();
        assert!(check_preconditions(&device(DeviceStatus::Assigned), AssignmentAction::Return, today).is_ok());
        assert!(matches!(
            check_preconditions(&device(DeviceStatus::Available), AssignmentAction::Return, today),
            Err(AppError::Conflict(_))
        ));

        // Lifecycle and maintenance do not block a return
        let mut broken = device(DeviceStatus::Assigned);
        broken.lifecycle_status = LifecycleStatus::Repair;
        broken.last_maintenance_date = None;
        assert!(check_preconditions(&broken, AssignmentAction::Return, today).is_ok());
    }

    #[test]
    fn test_group_active_assignees() {
        let t = |h: u32| Utc.with_ymd_and_hms(2026, 5, 1, h, 0, 0).unwrap();
        let rows = vec![
            row(3, "EMP002", "b@example.com", t(12)),
            row(1, "EMP001", "a@example.com", t(11)),
            // Older confirmation of device 3 is superseded
            row(3, "EMP001", "a@example.com", t(10)),
            row(2, "EMP001", "a@example.com", t(9)),
            // Same code, different email: separate employee
            row(4, "EMP001", "a.other@example.com", t(8)),
        ];

        let grouped = group_active_assignees(rows);
        assert_eq!(grouped.len(), 3);

        assert_eq!(grouped[0].employee_code, "EMP002");
        assert_eq!(grouped[0].devices.len(), 1);
        assert_eq!(grouped[0].devices[0].id, 3);

        assert_eq!(grouped[1].employee_email, "a@example.com");
        let ids: Vec<i32> = grouped[1].devices.iter().map(|d| d.id).collect();
        assert_eq!(ids, vec![1, 2]);

        assert_eq!(grouped[2].employee_email, "a.other@example.com");
    }
}
