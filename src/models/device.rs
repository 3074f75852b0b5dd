//! Device (physical asset) model

use chrono::{DateTime, Duration, Months, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use validator::Validate;

use super::assignment::DeviceHolder;

pub const DEFAULT_WARRANTY_MONTHS: i32 = 12;
pub const DEFAULT_MAINTENANCE_INTERVAL_DAYS: i32 = 30;
pub const MAX_WARRANTY_MONTHS: i32 = 240;
pub const MAX_MAINTENANCE_INTERVAL_DAYS: i32 = 3650;

/// Assignment status of a device
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Available,
    Assigned,
}

impl_text_enum!(DeviceStatus {
    Available => "available",
    Assigned => "assigned",
});

/// Technical lifecycle status, independent of the assignment status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleStatus {
    #[default]
    Normal,
    Maintenance,
    Repair,
    InTransit,
    Retired,
}

impl_text_enum!(LifecycleStatus {
    Normal => "normal",
    Maintenance => "maintenance",
    Repair => "repair",
    InTransit => "in_transit",
    Retired => "retired",
});

/// Device record
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    pub id: i32,
    /// Category-prefixed sequential code, e.g. `LAP-007`
    pub code: String,
    pub name: String,
    pub category: Option<String>,
    pub status: DeviceStatus,
    pub lifecycle_status: LifecycleStatus,
    pub lifecycle_reason: Option<String>,
    pub purchase_date: NaiveDate,
    pub warranty_months: i32,
    pub last_maintenance_date: Option<NaiveDate>,
    pub maintenance_interval_days: i32,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Device {
    /// Purchase date plus the warranty duration; `None` without a warranty
    pub fn warranty_end_date(&self) -> Option<NaiveDate> {
        let months = u32::try_from(self.warranty_months).ok().filter(|m| *m > 0)?;
        self.purchase_date.checked_add_months(Months::new(months))
    }

    pub fn is_warranty_expired(&self, today: NaiveDate) -> bool {
        self.warranty_end_date().map(|end| end < today).unwrap_or(false)
    }

    /// Due when never maintained, or once the interval has elapsed
    pub fn is_maintenance_due(&self, today: NaiveDate) -> bool {
        let interval = if self.maintenance_interval_days > 0 {
            self.maintenance_interval_days
        } else {
            DEFAULT_MAINTENANCE_INTERVAL_DAYS
        };
        match self.last_maintenance_date {
            None => true,
            Some(last) => last
                .checked_add_signed(Duration::days(interval as i64))
                .map(|due| due <= today)
                .unwrap_or(false),
        }
    }

    pub fn view(self, today: NaiveDate) -> DeviceView {
        DeviceView {
            warranty_end_date: self.warranty_end_date(),
            warranty_expired: self.is_warranty_expired(today),
            maintenance_due: self.is_maintenance_due(today),
            device: self,
        }
    }
}

/// Device with its derived warranty and maintenance fields
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceView {
    #[serde(flatten)]
    pub device: Device,
    pub warranty_end_date: Option<NaiveDate>,
    pub warranty_expired: bool,
    pub maintenance_due: bool,
}

/// Public lookup result (QR label): the device and, when assigned, who holds it
#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PublicDevice {
    #[serde(flatten)]
    pub device: DeviceView,
    pub assignment: Option<DeviceHolder>,
}

/// Short device representation embedded in assignment listings
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeviceSummary {
    pub id: i32,
    pub name: String,
    pub code: String,
    pub status: DeviceStatus,
}

/// Create device request
#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateDevice {
    #[validate(length(min = 1, message = "name is required"))]
    pub name: String,
    /// Explicit code; generated from the category when absent
    pub code: Option<String>,
    pub category: Option<String>,
    pub purchase_date: NaiveDate,
    #[validate(range(min = 0, max = 240))]
    pub warranty_months: Option<i32>,
    pub last_maintenance_date: Option<NaiveDate>,
    #[validate(range(min = 1, max = 3650))]
    pub maintenance_interval_days: Option<i32>,
    pub notes: Option<String>,
}

/// One row of a bulk import. Rows without a name or purchase date are skipped.
#[derive(Debug, Clone, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ImportDeviceRow {
    pub name: Option<String>,
    pub code: Option<String>,
    pub category: Option<String>,
    pub purchase_date: Option<NaiveDate>,
    pub warranty_months: Option<i32>,
    pub last_maintenance_date: Option<NaiveDate>,
    pub maintenance_interval_days: Option<i32>,
    pub lifecycle_status: Option<LifecycleStatus>,
    pub lifecycle_reason: Option<String>,
    pub notes: Option<String>,
}

/// Import row after normalization
#[derive(Debug, Clone, PartialEq)]
pub struct NewDevice {
    pub name: String,
    pub code: Option<String>,
    pub category: Option<String>,
    pub purchase_date: NaiveDate,
    pub warranty_months: i32,
    pub last_maintenance_date: Option<NaiveDate>,
    pub maintenance_interval_days: i32,
    pub lifecycle_status: LifecycleStatus,
    pub lifecycle_reason: Option<String>,
    pub notes: Option<String>,
}

impl ImportDeviceRow {
    /// Apply defaults; `None` when the row lacks a name or purchase date
    pub fn normalize(self) -> Option<NewDevice> {
        let name = self.name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty())?;
        let purchase_date = self.purchase_date?;
        Some(NewDevice {
            name,
            code: self.code.map(|c| c.trim().to_string()).filter(|c| !c.is_empty()),
            category: self.category.filter(|c| !c.trim().is_empty()),
            purchase_date,
            warranty_months: self
                .warranty_months
                .filter(|m| *m > 0)
                .map(|m| m.min(MAX_WARRANTY_MONTHS))
                .unwrap_or(DEFAULT_WARRANTY_MONTHS),
            last_maintenance_date: self.last_maintenance_date.or(Some(purchase_date)),
            maintenance_interval_days: self
                .maintenance_interval_days
                .filter(|d| *d > 0)
                .map(|d| d.min(MAX_MAINTENANCE_INTERVAL_DAYS))
                .unwrap_or(DEFAULT_MAINTENANCE_INTERVAL_DAYS),
            lifecycle_status: self.lifecycle_status.unwrap_or_default(),
            lifecycle_reason: self.lifecycle_reason,
            notes: self.notes,
        })
    }
}

impl From<CreateDevice> for NewDevice {
    fn from(data: CreateDevice) -> Self {
        NewDevice {
            name: data.name.trim().to_string(),
            code: data.code.filter(|c| !c.trim().is_empty()),
            category: data.category,
            purchase_date: data.purchase_date,
            warranty_months: data.warranty_months.unwrap_or(DEFAULT_WARRANTY_MONTHS),
            last_maintenance_date: data.last_maintenance_date.or(Some(data.purchase_date)),
            maintenance_interval_days: data
                .maintenance_interval_days
                .unwrap_or(DEFAULT_MAINTENANCE_INTERVAL_DAYS),
            lifecycle_status: LifecycleStatus::Normal,
            lifecycle_reason: None,
            notes: data.notes,
        }
    }
}

/// Bulk import request
#[derive(Debug, Deserialize, ToSchema)]
pub struct ImportDevices {
    pub devices: Vec<ImportDeviceRow>,
}

/// Bulk import result
#[derive(Debug, Serialize, ToSchema)]
pub struct ImportReport {
    pub imported: usize,
    pub updated: usize,
    pub total: usize,
}

/// Lifecycle status change request
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateLifecycle {
    pub lifecycle_status: LifecycleStatus,
    pub reason: Option<String>,
}

/// Device counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct DeviceCounts {
    pub total: i64,
    pub assigned: i64,
    pub available: i64,
}

/// Devices needing attention
#[derive(Debug, Default, Serialize, ToSchema)]
pub struct DeviceAlerts {
    pub total: usize,
    pub warranty: Vec<DeviceView>,
    pub maintenance: Vec<DeviceView>,
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn device(status: DeviceStatus) -> Device {
        let now = Utc::now();
        let today = now.date_naive();
        Device {
            id: 1,
            code: "LAP-001".to_string(),
            name: "ThinkPad T14".to_string(),
            category: Some("Laptop".to_string()),
            status,
            lifecycle_status: LifecycleStatus::Normal,
            lifecycle_reason: None,
            purchase_date: today - Duration::days(30),
            warranty_months: 24,
            last_maintenance_date: Some(today),
            maintenance_interval_days: 30,
            notes: None,
            created_at: now,
            updated_at: now,
        }
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_warranty_end_date() {
        let mut d = device(DeviceStatus::Available);
        d.purchase_date = date(2024, 1, 31);
        d.warranty_months = 1;
        // Month arithmetic clamps to the last day of the month
        assert_eq!(d.warranty_end_date(), Some(date(2024, 2, 29)));
        assert!(!d.is_warranty_expired(date(2024, 2, 29)));
        assert!(d.is_warranty_expired(date(2024, 3, 1)));

        // No warranty: no end date, never expired
        d.warranty_months = 0;
        assert_eq!(d.warranty_end_date(), None);
        assert!(!d.is_warranty_expired(date(2030, 1, 1)));
    }

    #[test]
    fn test_maintenance_due() {
        let mut d = device(DeviceStatus::Available);
        d.last_maintenance_date = Some(date(2024, 5, 1));
        d.maintenance_interval_days = 10;
        assert!(!d.is_maintenance_due(date(2024, 5, 10)));
        assert!(d.is_maintenance_due(date(2024, 5, 11)));

        d.last_maintenance_date = None;
        assert!(d.is_maintenance_due(date(2024, 5, 2)));
    }

    #[test]
    fn test_huge_maintenance_interval_is_not_due() {
        let mut d = device(DeviceStatus::Available);
        d.last_maintenance_date = Some(date(2024, 5, 1));
        d.maintenance_interval_days = i32::MAX;
        assert!(!d.is_maintenance_due(date(2024, 5, 2)));

        d.warranty_months = i32::MAX;
        let view = d.view(date(2024, 5, 2));
        assert!(!view.maintenance_due);
        assert!(!view.warranty_expired);
    }

    #[test]
    fn test_create_request_bounds() {
        let request = |warranty: i32, interval: i32| CreateDevice {
            name: "Laptop".to_string(),
            code: None,
            category: None,
            purchase_date: date(2025, 1, 1),
            warranty_months: Some(warranty),
            last_maintenance_date: None,
            maintenance_interval_days: Some(interval),
            notes: None,
        };
        assert!(request(24, 30).validate().is_ok());
        assert!(request(0, 30).validate().is_ok());
        assert!(request(24, MAX_MAINTENANCE_INTERVAL_DAYS + 1).validate().is_err());
        assert!(request(MAX_WARRANTY_MONTHS + 1, 30).validate().is_err());
    }

    #[test]
    fn test_lifecycle_text_mapping() {
        assert_eq!(LifecycleStatus::InTransit.as_str(), "in_transit");
        assert_eq!("retired".parse::<LifecycleStatus>(), Ok(LifecycleStatus::Retired));
        assert!("broken".parse::<LifecycleStatus>().is_err());
        assert_eq!(LifecycleStatus::default(), LifecycleStatus::Normal);
    }

    #[test]
    fn test_import_row_normalization() {
        let row = ImportDeviceRow {
            name: Some("  Dell Monitor ".to_string()),
            code: Some("".to_string()),
            category: Some("Monitor".to_string()),
            purchase_date: Some(date(2025, 1, 1)),
            warranty_months: Some(0),
            last_maintenance_date: None,
            maintenance_interval_days: Some(i32::MAX),
            lifecycle_status: None,
            lifecycle_reason: None,
            notes: None,
        };
        let normalized = row.normalize().unwrap();
        assert_eq!(normalized.name, "Dell Monitor");
        assert_eq!(normalized.code, None);
        assert_eq!(normalized.warranty_months, DEFAULT_WARRANTY_MONTHS);
        assert_eq!(normalized.maintenance_interval_days, MAX_MAINTENANCE_INTERVAL_DAYS);
        assert_eq!(normalized.last_maintenance_date, Some(date(2025, 1, 1)));
        assert_eq!(normalized.lifecycle_status, LifecycleStatus::Normal);

        let missing_date = ImportDeviceRow {
            name: Some("Phone".to_string()),
            code: None,
            category: None,
            purchase_date: None,
            warranty_months: None,
            last_maintenance_date: None,
            maintenance_interval_days: None,
            lifecycle_status: None,
            lifecycle_reason: None,
            notes: None,
        };
        assert!(missing_date.normalize().is_none());
    }
}
