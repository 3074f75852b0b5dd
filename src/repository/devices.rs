//! Devices repository for database operations

use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use sqlx::{PgConnection, Pool, Postgres};

use crate::{
    error::{AppError, AppResult},
    models::device::{Device, DeviceCounts, DeviceStatus, LifecycleStatus, NewDevice},
};

#[derive(Clone)]
pub struct DevicesRepository {
    pool: Pool<Postgres>,
}

impl DevicesRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get device by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Device> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Device with id {} not found", id)))
    }

    pub async fn find_by_id(&self, id: i32) -> AppResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    /// Fetch and row-lock a device for the rest of the transaction
    pub async fn lock_by_id(conn: &mut PgConnection, id: i32) -> AppResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE id = $1 FOR UPDATE")
            .bind(id)
            .fetch_optional(conn)
            .await?;
        Ok(device)
    }

    pub async fn find_by_code(&self, code: &str) -> AppResult<Option<Device>> {
        let device = sqlx::query_as::<_, Device>("SELECT * FROM devices WHERE code = $1")
            .bind(code)
            .fetch_optional(&self.pool)
            .await?;
        Ok(device)
    }

    /// List devices, newest first
    pub async fn list(&self, status: Option<DeviceStatus>) -> AppResult<Vec<Device>> {
        let devices = sqlx::query_as::<_, Device>(
            "SELECT * FROM devices WHERE ($1::text IS NULL OR status = $1) ORDER BY id DESC",
        )
        .bind(status)
        .fetch_all(&self.pool)
        .await?;
        Ok(devices)
    }

    /// Set the assignment status inside a transaction
    pub async fn set_status(conn: &mut PgConnection, id: i32, status: DeviceStatus) -> AppResult<()> {
        sqlx::query("UPDATE devices SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Insert a new, available device
    pub async fn insert(conn: &mut PgConnection, data: &NewDevice, code: &str) -> AppResult<Device> {
        let device = sqlx::query_as::<_, Device>(
            r#"
            INSERT INTO devices (
                code, name, category, status, lifecycle_status, lifecycle_reason,
                purchase_date, warranty_months, last_maintenance_date,
                maintenance_interval_days, notes
            )
            VALUES ($1, $2, $3, 'available', $4, $5, $6, $7, $8, $9, $10)
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(&data.name)
        .bind(&data.category)
        .bind(data.lifecycle_status)
        .bind(&data.lifecycle_reason)
        .bind(data.purchase_date)
        .bind(data.warranty_months)
        .bind(data.last_maintenance_date)
        .bind(data.maintenance_interval_days)
        .bind(&data.notes)
        .fetch_one(conn)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                AppError::Conflict(format!("Device code {} already exists", code))
            }
            other => AppError::Database(other),
        })?;
        Ok(device)
    }

    /// Overwrite the descriptive fields of an imported device; assignment status is untouched
    pub async fn update_imported(conn: &mut PgConnection, id: i32, data: &NewDevice) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE devices
            SET name = $1, category = $2, purchase_date = $3, warranty_months = $4,
                last_maintenance_date = $5, maintenance_interval_days = $6,
                lifecycle_status = $7, lifecycle_reason = $8, notes = $9, updated_at = $10
            WHERE id = $11
            "#,
        )
        .bind(&data.name)
        .bind(&data.category)
        .bind(data.purchase_date)
        .bind(data.warranty_months)
        .bind(data.last_maintenance_date)
        .bind(data.maintenance_interval_days)
        .bind(data.lifecycle_status)
        .bind(&data.lifecycle_reason)
        .bind(&data.notes)
        .bind(Utc::now())
        .bind(id)
        .execute(conn)
        .await?;
        Ok(())
    }

    /// Map existing codes to device ids
    pub async fn ids_by_codes(conn: &mut PgConnection, codes: &[String]) -> AppResult<HashMap<String, i32>> {
        if codes.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<(String, i32)> =
            sqlx::query_as("SELECT code, id FROM devices WHERE code = ANY($1)")
                .bind(codes)
                .fetch_all(conn)
                .await?;
        Ok(rows.into_iter().collect())
    }

    /// Serialize code allocation for a prefix until the transaction ends
    pub async fn lock_code_prefix(conn: &mut PgConnection, prefix: &str) -> AppResult<()> {
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(format!("device-code:{}", prefix))
            .execute(conn)
            .await?;
        Ok(())
    }

    /// Highest sequence number already used under `prefix`.
    /// Codes whose number does not fit in nine digits are not part of the sequence.
    pub async fn max_code_sequence(conn: &mut PgConnection, prefix: &str) -> AppResult<Option<i32>> {
        let max: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT MAX(CAST(substring(code FROM '-([0-9]{1,9})$') AS INTEGER))
            FROM devices
            WHERE code ~ $1
            "#,
        )
        .bind(format!("^{}-[0-9]{{1,9}}$", prefix))
        .fetch_one(conn)
        .await?;
        Ok(max)
    }

    pub async fn update_lifecycle(
        &self,
        id: i32,
        status: LifecycleStatus,
        reason: Option<&str>,
    ) -> AppResult<Device> {
        sqlx::query_as::<_, Device>(
            r#"
            UPDATE devices
            SET lifecycle_status = $1, lifecycle_reason = $2, updated_at = $3
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(status)
        .bind(reason)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Device with id {} not found", id)))
    }

    pub async fn mark_maintenance(&self, id: i32, date: NaiveDate) -> AppResult<Device> {
        sqlx::query_as::<_, Device>(
            "UPDATE devices SET last_maintenance_date = $1, updated_at = $2 WHERE id = $3 RETURNING *",
        )
        .bind(date)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Device with id {} not found", id)))
    }

    /// Delete a device; its assignment history is kept with a null device reference
    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM devices WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Device with id {} not found", id)));
        }
        Ok(())
    }

    pub async fn counts(&self) -> AppResult<DeviceCounts> {
        let (total, assigned, available): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT COUNT(*),
                   COUNT(*) FILTER (WHERE status = 'assigned'),
                   COUNT(*) FILTER (WHERE status = 'available')
            FROM devices
            "#,
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(DeviceCounts { total, assigned, available })
    }
}
