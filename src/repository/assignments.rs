//! Assignments repository for database operations

use chrono::{DateTime, Duration, NaiveTime, Utc};
use sqlx::{PgConnection, Pool, Postgres, QueryBuilder};

use crate::{
    error::{AppError, AppResult},
    models::assignment::{
        ActiveAssigneeQuery, ActiveAssignmentRow, Assignment, AssignmentDetails,
        AssignmentHistoryRow, AssignmentQuery, AssignmentStatus, DeviceHolder, DocumentRef,
        NewAssignment,
    },
};

#[derive(Clone)]
pub struct AssignmentsRepository {
    pool: Pool<Postgres>,
}

impl AssignmentsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    /// Get assignment by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<Assignment> {
        sqlx::query_as::<_, Assignment>("SELECT * FROM assignments WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Assignment with id {} not found", id)))
    }

    /// Fetch and row-lock an assignment for the rest of the transaction
    pub async fn lock_by_id(conn: &mut PgConnection, id: i32) -> AppResult<Option<Assignment>> {
        let assignment =
            sqlx::query_as::<_, Assignment>("SELECT * FROM assignments WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(conn)
                .await?;
        Ok(assignment)
    }

    /// Fetch and row-lock the assignment holding a token digest
    pub async fn lock_by_token_hash(
        conn: &mut PgConnection,
        token_hash: &str,
    ) -> AppResult<Option<Assignment>> {
        let assignment = sqlx::query_as::<_, Assignment>(
            "SELECT * FROM assignments WHERE confirm_token = $1 FOR UPDATE",
        )
        .bind(token_hash)
        .fetch_optional(conn)
        .await?;
        Ok(assignment)
    }

    /// Append a new ledger entry
    pub async fn insert(conn: &mut PgConnection, data: &NewAssignment) -> AppResult<Assignment> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"
            INSERT INTO assignments (
                device_id, user_id, action, status,
                employee_name, employee_code, employee_email, department,
                notes, return_reason, confirm_token, confirm_token_expires_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(data.device_id)
        .bind(data.user_id)
        .bind(data.action)
        .bind(data.status)
        .bind(&data.employee.name)
        .bind(&data.employee.code)
        .bind(&data.employee.email)
        .bind(&data.employee.department)
        .bind(&data.notes)
        .bind(&data.return_reason)
        .bind(&data.confirm_token)
        .bind(data.confirm_token_expires_at)
        .fetch_one(conn)
        .await?;
        Ok(assignment)
    }

    /// Record a successful confirmation and burn the token
    pub async fn mark_confirmed(
        conn: &mut PgConnection,
        id: i32,
        confirmed_at: DateTime<Utc>,
        ip: Option<&str>,
        user_agent: Option<&str>,
    ) -> AppResult<Assignment> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"
            UPDATE assignments
            SET status = 'CONFIRMED', confirmed_at = $1, confirmed_ip = $2,
                confirmed_user_agent = $3, confirm_token = NULL, updated_at = $1
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(confirmed_at)
        .bind(ip)
        .bind(user_agent)
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(assignment)
    }

    /// Move to FAILED, appending a diagnostic line to the notes
    pub async fn mark_failed(conn: &mut PgConnection, id: i32, note: &str) -> AppResult<Assignment> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"
            UPDATE assignments
            SET status = 'FAILED',
                notes = CASE WHEN notes IS NULL OR notes = '' THEN $1 ELSE notes || E'\n' || $1 END,
                updated_at = $2
            WHERE id = $3
            RETURNING *
            "#,
        )
        .bind(note)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(assignment)
    }

    /// Set the expired-notification flag. Returns false when it was already set.
    pub async fn mark_expiry_notified(
        conn: &mut PgConnection,
        id: i32,
        at: DateTime<Utc>,
    ) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE assignments
            SET admin_notified_expired_at = $1, updated_at = $1
            WHERE id = $2 AND admin_notified_expired_at IS NULL
            "#,
        )
        .bind(at)
        .bind(id)
        .execute(conn)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Cancel a pending assignment. The token stays so a late click reports the cancellation.
    pub async fn mark_cancelled(conn: &mut PgConnection, id: i32) -> AppResult<Assignment> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"
            UPDATE assignments
            SET status = 'CANCELLED', updated_at = $1
            WHERE id = $2
            RETURNING *
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(assignment)
    }

    /// Replace the token (the previous one dies), back to PENDING_CONFIRM with a clear expiry flag
    pub async fn rotate_token(
        conn: &mut PgConnection,
        id: i32,
        token_hash: &str,
        expires_at: DateTime<Utc>,
    ) -> AppResult<Assignment> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"
            UPDATE assignments
            SET confirm_token = $1, confirm_token_expires_at = $2, status = $3,
                admin_notified_expired_at = NULL, updated_at = $4
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(token_hash)
        .bind(expires_at)
        .bind(AssignmentStatus::PendingConfirm)
        .bind(Utc::now())
        .bind(id)
        .fetch_one(conn)
        .await?;
        Ok(assignment)
    }

    pub async fn set_document(&self, id: i32, document: &DocumentRef) -> AppResult<Assignment> {
        let assignment = sqlx::query_as::<_, Assignment>(
            r#"
            UPDATE assignments
            SET document_url = $1, document_name = $2, document_generated_at = $3, updated_at = $3
            WHERE id = $4
            RETURNING *
            "#,
        )
        .bind(&document.url)
        .bind(&document.name)
        .bind(document.generated_at)
        .bind(id)
        .fetch_one(&self.pool)
        .await?;
        Ok(assignment)
    }

    /// History listing, newest first
    pub async fn list(&self, query: &AssignmentQuery) -> AppResult<Vec<AssignmentDetails>> {
        let mut builder = QueryBuilder::<Postgres>::new(
            r#"
            SELECT a.*,
                   d.name AS device_name, d.code AS device_code, d.status AS device_status,
                   u.name AS staff_name, u.email AS staff_email
            FROM assignments a
            LEFT JOIN devices d ON d.id = a.device_id
            LEFT JOIN users u ON u.id = a.user_id
            WHERE TRUE
            "#,
        );

        if let Some(date) = query.date {
            let from = date.and_time(NaiveTime::MIN).and_utc();
            builder
                .push(" AND a.occurred_at >= ")
                .push_bind(from)
                .push(" AND a.occurred_at < ")
                .push_bind(from + Duration::days(1));
        } else {
            if let Some(start) = query.start {
                builder.push(" AND a.occurred_at >= ").push_bind(start);
            }
            if let Some(end) = query.end {
                builder.push(" AND a.occurred_at <= ").push_bind(end);
            }
        }

        if let Some(action) = query.action {
            builder.push(" AND a.action = ").push_bind(action);
        }

        if let Some(search) = query.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let term = format!("%{}%", search);
            builder.push(" AND (");
            let mut columns = builder.separated(" OR ");
            for column in [
                "a.employee_name",
                "a.employee_code",
                "a.department",
                "a.notes",
                "d.name",
                "d.code",
                "u.name",
            ] {
                columns.push(format!("{} ILIKE ", column));
                columns.push_bind_unseparated(term.clone());
            }
            builder.push(")");
        }

        builder.push(" ORDER BY a.occurred_at DESC, a.id DESC");

        let rows = builder
            .build_query_as::<AssignmentHistoryRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(AssignmentDetails::from).collect())
    }

    /// Confirmed issues whose device is still assigned, newest first
    pub async fn list_active(&self, query: &ActiveAssigneeQuery) -> AppResult<Vec<ActiveAssignmentRow>> {
        let rows = sqlx::query_as::<_, ActiveAssignmentRow>(
            r#"
            SELECT a.id AS assignment_id, a.device_id AS device_id,
                   a.employee_name, a.employee_code, a.employee_email, a.department,
                   d.name AS device_name, d.code AS device_code, d.status AS device_status,
                   a.occurred_at
            FROM assignments a
            JOIN devices d ON d.id = a.device_id
            WHERE a.status = 'CONFIRMED'
              AND a.action = 'issue'
              AND d.status = 'assigned'
              AND ($1::text IS NULL OR a.employee_code = $1)
              AND ($2::text IS NULL OR a.employee_email = $2)
            ORDER BY a.occurred_at DESC, a.id DESC
            "#,
        )
        .bind(&query.employee_code)
        .bind(&query.employee_email)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    /// Employee snapshot of the latest issue for a device
    pub async fn latest_issue_holder(&self, device_id: i32) -> AppResult<Option<DeviceHolder>> {
        let holder = sqlx::query_as::<_, DeviceHolder>(
            r#"
            SELECT employee_name, employee_code, employee_email, department, occurred_at, notes
            FROM assignments
            WHERE device_id = $1 AND action = 'issue'
            ORDER BY occurred_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(device_id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(holder)
    }

    pub async fn delete(&self, id: i32) -> AppResult<()> {
        let result = sqlx::query("DELETE FROM assignments WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Assignment with id {} not found", id)));
        }
        Ok(())
    }
}
