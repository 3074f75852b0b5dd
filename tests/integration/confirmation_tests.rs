//! Confirmation flow tests against a real database
//!
//! These drive the services directly over a `PgPool` taken from
//! `DATABASE_URL`. Rows are seeded with known tokens so the transactional
//! paths can be exercised without the email round-trip.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{Duration, Utc};
use sqlx::{postgres::PgPoolOptions, PgPool};

use itam_server::{
    config::{AppConfig, DocumentsConfig},
    models::{
        assignment::{Assignment, AssignmentAction, AssignmentStatus, CreateAssignment},
        device::{CreateDevice, Device},
        user::{Role, UserClaims},
    },
    repository::Repository,
    services::{
        confirm_token::hash_token,
        confirmation::{ClientInfo, ConfirmKind},
        documents::{DocumentRenderer, RenderedDocument},
        email::{Mailer, OutgoingEmail},
        Services,
    },
    AppResult,
};

/// Keeps every email instead of sending it
#[derive(Default)]
struct RecordingMailer {
    sent: Mutex<Vec<OutgoingEmail>>,
}

impl RecordingMailer {
    fn subjects(&self) -> Vec<String> {
        self.sent
            .lock()
            .expect("mailer lock poisoned")
            .iter()
            .map(|e| e.subject.clone())
            .collect()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send(&self, email: OutgoingEmail) -> AppResult<()> {
        self.sent.lock().expect("mailer lock poisoned").push(email);
        Ok(())
    }
}

struct PlainRenderer;

#[async_trait]
impl DocumentRenderer for PlainRenderer {
    async fn render(&self, assignment: &Assignment, device: &Device) -> AppResult<RenderedDocument> {
        Ok(RenderedDocument {
            file_name: format!("form_{}_{}.html", device.code, assignment.id),
            content_type: "text/html".to_string(),
            bytes: b"<html></html>".to_vec(),
        })
    }
}

struct TestContext {
    pool: PgPool,
    services: Services,
    mailer: Arc<RecordingMailer>,
}

async fn setup() -> TestContext {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&url)
        .await
        .expect("Failed to connect to database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations");

    let config = AppConfig {
        server: Default::default(),
        database: Default::default(),
        auth: Default::default(),
        logging: Default::default(),
        email: Default::default(),
        confirm: Default::default(),
        documents: DocumentsConfig {
            upload_dir: std::env::temp_dir()
                .join("itam-confirmation-tests")
                .to_string_lossy()
                .into_owned(),
            ..Default::default()
        },
        bootstrap: Default::default(),
    };

    let mailer = Arc::new(RecordingMailer::default());
    let services = Services::new(
        Repository::new(pool.clone()),
        &config,
        mailer.clone(),
        Arc::new(PlainRenderer),
    );

    TestContext { pool, services, mailer }
}

fn unique() -> u32 {
    rand::random()
}

async fn seed_device(pool: &PgPool, status: &str) -> i32 {
    let today = Utc::now().date_naive();
    sqlx::query_scalar(
        r#"
        INSERT INTO devices (code, name, category, status, purchase_date, last_maintenance_date)
        VALUES ($1, 'Seeded laptop', 'laptop', $2, $3, $3)
        RETURNING id
        "#,
    )
    .bind(format!("TST-{}", unique()))
    .bind(status)
    .bind(today)
    .fetch_one(pool)
    .await
    .expect("Failed to seed device")
}

/// Pending issue of `device_id` whose raw token is returned alongside its id
async fn seed_pending_issue(pool: &PgPool, device_id: i32, expires_in: Duration) -> (i32, String) {
    let token = format!("token-{}-{}", device_id, unique());
    let id = sqlx::query_scalar(
        r#"
        INSERT INTO assignments (device_id, action, status, employee_name, employee_code,
                                 employee_email, department, confirm_token, confirm_token_expires_at)
        VALUES ($1, 'issue', 'PENDING_CONFIRM', 'Jane Doe', 'E-1001',
                'jane.doe@example.com', 'Finance', $2, $3)
        RETURNING id
        "#,
    )
    .bind(device_id)
    .bind(hash_token(&token))
    .bind(Utc::now() + expires_in)
    .fetch_one(pool)
    .await
    .expect("Failed to seed assignment");
    (id, token)
}

async fn seed_admin(pool: &PgPool) -> UserClaims {
    let email = format!("ops-{}@itam.local", unique());
    let id: i32 = sqlx::query_scalar(
        "INSERT INTO users (name, email, password_hash, role) VALUES ('Ops', $1, 'unused', 'ADMIN') RETURNING id",
    )
    .bind(&email)
    .fetch_one(pool)
    .await
    .expect("Failed to seed administrator");

    let now = Utc::now().timestamp();
    UserClaims {
        sub: id,
        name: "Ops".to_string(),
        email,
        role: Role::Admin,
        exp: now + 3600,
        iat: now,
    }
}

async fn load_assignment(pool: &PgPool, id: i32) -> Assignment {
    sqlx::query_as::<_, Assignment>("SELECT * FROM assignments WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("Failed to load assignment")
}

async fn device_status(pool: &PgPool, id: i32) -> String {
    sqlx::query_scalar("SELECT status FROM devices WHERE id = $1")
        .bind(id)
        .fetch_one(pool)
        .await
        .expect("Failed to load device")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_confirmed_token_is_dead() {
    let ctx = setup().await;
    let device_id = seed_device(&ctx.pool, "available").await;
    let (id, token) = seed_pending_issue(&ctx.pool, device_id, Duration::hours(1)).await;
    let client = ClientInfo {
        ip: Some("10.0.0.7".to_string()),
        user_agent: Some("test-agent".to_string()),
    };

    let first = ctx.services.confirmation.confirm(&token, &client).await.expect("confirm failed");
    assert_eq!(first.kind, ConfirmKind::Confirmed);
    assert_eq!(device_status(&ctx.pool, device_id).await, "assigned");

    let confirmed = load_assignment(&ctx.pool, id).await;
    assert_eq!(confirmed.status, AssignmentStatus::Confirmed);
    assert!(confirmed.confirm_token.is_none());
    assert_eq!(confirmed.confirmed_ip.as_deref(), Some("10.0.0.7"));

    let second = ctx.services.confirmation.confirm(&token, &client).await.expect("confirm failed");
    assert_eq!(second.kind, ConfirmKind::InvalidToken);
    assert!(!second.ok);

    let unchanged = load_assignment(&ctx.pool, id).await;
    assert_eq!(unchanged.status, AssignmentStatus::Confirmed);
    assert_eq!(unchanged.confirmed_at, confirmed.confirmed_at);
}

#[tokio::test]
#[ignore]
async fn test_racing_confirms_for_one_device() {
    let ctx = setup().await;
    let device_id = seed_device(&ctx.pool, "available").await;
    let (first_id, first_token) = seed_pending_issue(&ctx.pool, device_id, Duration::hours(1)).await;
    let (second_id, second_token) = seed_pending_issue(&ctx.pool, device_id, Duration::hours(1)).await;
    let client = ClientInfo::default();

    let (a, b) = tokio::join!(
        ctx.services.confirmation.confirm(&first_token, &client),
        ctx.services.confirmation.confirm(&second_token, &client),
    );
    let a = a.expect("confirm failed");
    let b = b.expect("confirm failed");

    let mut kinds = vec![a.kind, b.kind];
    kinds.sort_by_key(|k| k.status_code().as_u16());
    assert_eq!(kinds, vec![ConfirmKind::Confirmed, ConfirmKind::DeviceUnavailable]);

    let (winner, loser) = if a.kind == ConfirmKind::Confirmed {
        (first_id, second_id)
    } else {
        (second_id, first_id)
    };
    assert_eq!(load_assignment(&ctx.pool, winner).await.status, AssignmentStatus::Confirmed);
    let failed = load_assignment(&ctx.pool, loser).await;
    assert_eq!(failed.status, AssignmentStatus::Failed);
    assert!(failed.notes.unwrap_or_default().contains("device was assigned"));
    assert_eq!(device_status(&ctx.pool, device_id).await, "assigned");
}

#[tokio::test]
#[ignore]
async fn test_expired_link_notifies_admins_once() {
    let ctx = setup().await;
    seed_admin(&ctx.pool).await;
    let device_id = seed_device(&ctx.pool, "available").await;
    let (id, token) = seed_pending_issue(&ctx.pool, device_id, Duration::minutes(-5)).await;
    let client = ClientInfo::default();

    for _ in 0..3 {
        let outcome = ctx.services.confirmation.confirm(&token, &client).await.expect("confirm failed");
        assert_eq!(outcome.kind, ConfirmKind::TokenExpired);
        assert!(outcome.can_resend);
    }

    let subject = format!("Confirmation expired for assignment #{}", id);
    let notices = ctx.mailer.subjects().into_iter().filter(|s| *s == subject).count();
    assert_eq!(notices, 1);

    let expired = load_assignment(&ctx.pool, id).await;
    assert_eq!(expired.status, AssignmentStatus::PendingConfirm);
    assert!(expired.admin_notified_expired_at.is_some());
    assert_eq!(device_status(&ctx.pool, device_id).await, "available");
}

#[tokio::test]
#[ignore]
async fn test_resend_after_expiry_rearms_notification() {
    let ctx = setup().await;
    let device_id = seed_device(&ctx.pool, "available").await;
    let (id, token) = seed_pending_issue(&ctx.pool, device_id, Duration::minutes(-5)).await;

    ctx.services
        .confirmation
        .confirm(&token, &ClientInfo::default())
        .await
        .expect("confirm failed");
    let receipt = ctx.services.confirmation.resend_by_token(&token).await.expect("resend failed");
    assert_eq!(receipt.assignment_id, id);
    assert!(receipt.expires_at > Utc::now());

    let rotated = load_assignment(&ctx.pool, id).await;
    assert!(rotated.admin_notified_expired_at.is_none());
    assert_ne!(rotated.confirm_token.as_deref(), Some(hash_token(&token).as_str()));

    // The old link died with the rotation
    let outcome = ctx
        .services
        .confirmation
        .confirm(&token, &ClientInfo::default())
        .await
        .expect("confirm failed");
    assert_eq!(outcome.kind, ConfirmKind::InvalidToken);
}

#[tokio::test]
#[ignore]
async fn test_confirm_after_cancel_is_not_pending() {
    let ctx = setup().await;
    let device_id = seed_device(&ctx.pool, "available").await;
    let (id, token) = seed_pending_issue(&ctx.pool, device_id, Duration::hours(1)).await;

    let cancelled = ctx.services.confirmation.cancel(id).await.expect("cancel failed");
    assert_eq!(cancelled.status, AssignmentStatus::Cancelled);

    let outcome = ctx
        .services
        .confirmation
        .confirm(&token, &ClientInfo::default())
        .await
        .expect("confirm failed");
    assert_eq!(outcome.kind, ConfirmKind::NotPending);
    assert_eq!(outcome.status, Some(AssignmentStatus::Cancelled));
    assert_eq!(device_status(&ctx.pool, device_id).await, "available");
}

#[tokio::test]
#[ignore]
async fn test_return_clears_token_fields() {
    let ctx = setup().await;
    let actor = seed_admin(&ctx.pool).await;
    let device_id = seed_device(&ctx.pool, "assigned").await;

    let request = CreateAssignment {
        device_id,
        action: AssignmentAction::Return,
        employee_name: " Jane Doe ".to_string(),
        employee_code: "E-1001".to_string(),
        employee_email: "jane.doe@example.com".to_string(),
        department: "Finance".to_string(),
        notes: None,
        return_reason: Some("Leaving the company".to_string()),
    };
    let returned = ctx
        .services
        .assignments
        .create_assignment(request, &actor)
        .await
        .expect("return failed");

    assert_eq!(returned.status, AssignmentStatus::Returned);
    assert_eq!(returned.employee_name, "Jane Doe");
    assert!(returned.confirm_token.is_none());
    assert!(returned.confirm_token_expires_at.is_none());
    assert_eq!(returned.return_reason.as_deref(), Some("Leaving the company"));
    assert_eq!(device_status(&ctx.pool, device_id).await, "available");
}

#[tokio::test]
#[ignore]
async fn test_generated_code_after_long_explicit_code() {
    let ctx = setup().await;
    let today = Utc::now().date_naive();
    let device = |code: Option<String>| CreateDevice {
        name: "Galaxy Tab".to_string(),
        code,
        category: Some("Tablet".to_string()),
        purchase_date: today,
        warranty_months: Some(24),
        last_maintenance_date: Some(today),
        maintenance_interval_days: None,
        notes: None,
    };

    let long_code = format!("TAB-{}", 90_000_000_000u64 + u64::from(unique()));
    let explicit = ctx
        .services
        .devices
        .create(device(Some(long_code.clone())))
        .await
        .expect("explicit code rejected");
    assert_eq!(explicit.device.code, long_code);

    let generated = ctx.services.devices.create(device(None)).await.expect("code generation failed");
    assert!(generated.device.code.starts_with("TAB-"));
    assert!(generated.device.code.len() < long_code.len());
}
