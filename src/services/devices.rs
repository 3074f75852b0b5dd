//! Device inventory: creation with generated codes, bulk import, lifecycle and maintenance

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use sqlx::PgConnection;
use validator::Validate;

use crate::{
    error::{AppError, AppResult},
    models::device::{
        CreateDevice, DeviceAlerts, DeviceCounts, DeviceStatus, DeviceView, ImportDevices,
        ImportReport, NewDevice, PublicDevice, UpdateLifecycle,
    },
    repository::{devices::DevicesRepository, Repository},
};

const FALLBACK_PREFIX: &str = "GEN";
const PREFIX_LEN: usize = 3;

/// Code prefix for a category: upper-cased ASCII alphanumerics, first three,
/// padded with `X`. `GEN` when nothing usable is left.
pub fn code_prefix(category: Option<&str>) -> String {
    let base: String = category
        .unwrap_or(FALLBACK_PREFIX)
        .to_uppercase()
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(PREFIX_LEN)
        .collect();
    if base.is_empty() {
        return FALLBACK_PREFIX.to_string();
    }
    format!("{:X<width$}", base, width = PREFIX_LEN)
}

pub fn format_code(prefix: &str, sequence: i32) -> String {
    format!("{}-{:03}", prefix, sequence)
}

/// Next free sequence number per prefix, for one transaction.
///
/// The first use of a prefix takes the per-prefix advisory lock and reads the
/// highest number in use; later codes for that prefix come from memory.
#[derive(Debug, Default)]
pub struct CodeAllocator {
    next: HashMap<String, i32>,
}

impl CodeAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_seeded(&self, prefix: &str) -> bool {
        self.next.contains_key(prefix)
    }

    pub fn seed(&mut self, prefix: &str, max_used: Option<i32>) {
        self.next.insert(prefix.to_string(), max_used.unwrap_or(0).saturating_add(1));
    }

    pub fn take(&mut self, prefix: &str) -> String {
        let next = self.next.entry(prefix.to_string()).or_insert(1);
        let code = format_code(prefix, *next);
        *next = next.saturating_add(1);
        code
    }

    pub async fn allocate(&mut self, conn: &mut PgConnection, category: Option<&str>) -> AppResult<String> {
        let prefix = code_prefix(category);
        if !self.is_seeded(&prefix) {
            DevicesRepository::lock_code_prefix(&mut *conn, &prefix).await?;
            let max_used = DevicesRepository::max_code_sequence(&mut *conn, &prefix).await?;
            self.seed(&prefix, max_used);
        }
        Ok(self.take(&prefix))
    }
}

/// Devices whose warranty has lapsed or whose maintenance is due
pub fn collect_alerts(devices: Vec<DeviceView>) -> DeviceAlerts {
    let mut alerts = DeviceAlerts::default();
    for device in devices {
        if !device.warranty_expired && !device.maintenance_due {
            continue;
        }
        alerts.total += 1;
        if device.warranty_expired {
            alerts.warranty.push(device.clone());
        }
        if device.maintenance_due {
            alerts.maintenance.push(device);
        }
    }
    alerts
}

fn today() -> NaiveDate {
    Utc::now().date_naive()
}

#[derive(Clone)]
pub struct DevicesService {
    repository: Repository,
}

impl DevicesService {
    pub fn new(repository: Repository) -> Self {
        Self { repository }
    }

    pub async fn list(&self, status: Option<DeviceStatus>) -> AppResult<Vec<DeviceView>> {
        let today = today();
        let devices = self.repository.devices.list(status).await?;
        Ok(devices.into_iter().map(|d| d.view(today)).collect())
    }

    pub async fn get(&self, id: i32) -> AppResult<DeviceView> {
        Ok(self.repository.devices.get_by_id(id).await?.view(today()))
    }

    /// Create a device, generating its code from the category when none is given
    pub async fn create(&self, request: CreateDevice) -> AppResult<DeviceView> {
        request.validate()?;
        let data = NewDevice::from(request);

        let mut tx = self.repository.begin().await?;
        let code = match &data.code {
            Some(code) => code.trim().to_string(),
            None => {
                CodeAllocator::new()
                    .allocate(&mut *tx, data.category.as_deref())
                    .await?
            }
        };
        let device = DevicesRepository::insert(&mut *tx, &data, &code).await?;
        tx.commit().await?;

        tracing::info!(device_id = device.id, code = %device.code, "device created");
        Ok(device.view(today()))
    }

    /// Upsert a batch by code in one transaction.
    ///
    /// Rows carrying an existing code update that device. New rows with an
    /// explicit code are inserted before any code is generated, so generated
    /// numbers never collide with codes from the same batch.
    pub async fn import(&self, request: ImportDevices) -> AppResult<ImportReport> {
        let rows: Vec<NewDevice> = request
            .devices
            .into_iter()
            .filter_map(|row| row.normalize())
            .collect();
        if rows.is_empty() {
            return Err(AppError::Validation("No valid devices to import".to_string()));
        }
        let total = rows.len();

        let mut tx = self.repository.begin().await?;
        let codes: Vec<String> = rows.iter().filter_map(|r| r.code.clone()).collect();
        let existing = DevicesRepository::ids_by_codes(&mut *tx, &codes).await?;

        let mut updated = 0;
        let mut explicit = Vec::new();
        let mut generated = Vec::new();
        for row in rows {
            match row.code.as_ref().and_then(|code| existing.get(code)) {
                Some(&id) => {
                    DevicesRepository::update_imported(&mut *tx, id, &row).await?;
                    updated += 1;
                }
                None if row.code.is_some() => explicit.push(row),
                None => generated.push(row),
            }
        }

        let imported = explicit.len() + generated.len();
        for row in explicit {
            let code = row.code.clone().unwrap_or_default();
            DevicesRepository::insert(&mut *tx, &row, &code).await?;
        }

        let mut allocator = CodeAllocator::new();
        for row in generated {
            let code = allocator.allocate(&mut *tx, row.category.as_deref()).await?;
            DevicesRepository::insert(&mut *tx, &row, &code).await?;
        }

        tx.commit().await?;
        tracing::info!(imported, updated, total, "device import finished");
        Ok(ImportReport { imported, updated, total })
    }

    /// Change the technical lifecycle status. A reason is required for any change.
    pub async fn update_lifecycle(&self, id: i32, request: UpdateLifecycle) -> AppResult<DeviceView> {
        let device = self.repository.devices.get_by_id(id).await?;
        let reason = request
            .reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty());

        let changed = device.lifecycle_status != request.lifecycle_status;
        if changed && reason.is_none() {
            return Err(AppError::Validation(
                "A reason is required when changing the lifecycle status".to_string(),
            ));
        }
        let reason = if changed { reason } else { reason.or(device.lifecycle_reason) };

        let updated = self
            .repository
            .devices
            .update_lifecycle(id, request.lifecycle_status, reason.as_deref())
            .await?;
        if changed {
            tracing::info!(
                device_id = id,
                from = %device.lifecycle_status,
                to = %updated.lifecycle_status,
                "lifecycle status changed"
            );
        }
        Ok(updated.view(today()))
    }

    /// Record maintenance done today
    pub async fn mark_maintenance(&self, id: i32) -> AppResult<DeviceView> {
        let today = today();
        let device = self.repository.devices.mark_maintenance(id, today).await?;
        Ok(device.view(today))
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        self.repository.devices.delete(id).await?;
        tracing::info!(device_id = id, "device deleted");
        Ok(())
    }

    pub async fn counts(&self) -> AppResult<DeviceCounts> {
        self.repository.devices.counts().await
    }

    pub async fn alerts(&self) -> AppResult<DeviceAlerts> {
        Ok(collect_alerts(self.list(None).await?))
    }

    /// Unauthenticated lookup by code, with the current holder when assigned
    pub async fn public_lookup(&self, code: &str) -> AppResult<PublicDevice> {
        let code = code.trim();
        if code.is_empty() {
            return Err(AppError::Validation("Missing device code".to_string()));
        }
        let device = self
            .repository
            .devices
            .find_by_code(code)
            .await?
            .ok_or_else(|| AppError::NotFound("Device not found".to_string()))?;

        let assignment = match device.status {
            DeviceStatus::Assigned => self.repository.assignments.latest_issue_holder(device.id).await?,
            DeviceStatus::Available => None,
        };

        Ok(PublicDevice {
            device: device.view(today()),
            assignment,
        })
    }
}
