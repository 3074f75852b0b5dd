//! API integration tests
//!
//! These run against a live server with a fresh database and the default
//! bootstrap administrator.

use reqwest::{Client, StatusCode};
use serde_json::{json, Value};

const BASE_URL: &str = "http://localhost:5000/api";

/// Helper to get an authenticated client
async fn get_auth_token(client: &Client) -> String {
    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": "admin@itam.local",
            "password": "admin123"
        }))
        .send()
        .await
        .expect("Failed to send login request");

    let body: Value = response.json().await.expect("Failed to parse login response");
    body["token"].as_str().expect("No token in response").to_string()
}

async fn create_device(client: &Client, token: &str, name: &str) -> Value {
    let today = chrono::Utc::now().date_naive().to_string();
    let response = client
        .post(format!("{}/devices", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "name": name,
            "category": "laptop",
            "purchaseDate": today,
            "lastMaintenanceDate": today,
            "warrantyMonths": 24
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CREATED);
    response.json().await.expect("Failed to parse device")
}

async fn issue(client: &Client, token: &str, device_id: i64) -> reqwest::Response {
    client
        .post(format!("{}/assignments", BASE_URL))
        .bearer_auth(token)
        .json(&json!({
            "deviceId": device_id,
            "action": "issue",
            "employeeName": "Jane Doe",
            "employeeCode": "E-1001",
            "employeeEmail": "jane.doe@example.com",
            "department": "Finance"
        }))
        .send()
        .await
        .expect("Failed to send request")
}

#[tokio::test]
#[ignore] // Run with: cargo test -- --ignored
async fn test_health_check() {
    let client = Client::new();

    let response = client
        .get(format!("{}/health", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["status"], "healthy");

    let response = client
        .get(format!("{}/ready", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());
}

#[tokio::test]
#[ignore]
async fn test_login() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": "admin@itam.local",
            "password": "admin123"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());

    let body: Value = response.json().await.expect("Failed to parse response");
    assert!(body["token"].is_string());
    assert_eq!(body["token_type"], "Bearer");
}

#[tokio::test]
#[ignore]
async fn test_login_wrong_password() {
    let client = Client::new();

    let response = client
        .post(format!("{}/auth/login", BASE_URL))
        .json(&json!({
            "email": "admin@itam.local",
            "password": "nope"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_unauthorized_access() {
    let client = Client::new();

    let response = client
        .get(format!("{}/devices", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
#[ignore]
async fn test_create_device_generates_code() {
    let client = Client::new();
    let token = get_auth_token(&client).await;

    let device = create_device(&client, &token, "ThinkPad T14").await;
    let code = device["code"].as_str().expect("No code");
    assert!(code.starts_with("LAP-"), "unexpected code {}", code);
    assert_eq!(device["status"], "available");
    assert_eq!(device["lifecycleStatus"], "normal");
}

#[tokio::test]
#[ignore]
async fn test_issue_leaves_device_available_until_confirmed() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let device = create_device(&client, &token, "Dell Latitude").await;
    let device_id = device["id"].as_i64().expect("No id");

    let response = issue(&client, &token, device_id).await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let assignment: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(assignment["status"], "PENDING_CONFIRM");
    assert!(assignment.get("confirmTokenHash").is_none());

    let response = client
        .get(format!("{}/devices/{}", BASE_URL, device_id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    let device: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(device["status"], "available");
}

#[tokio::test]
#[ignore]
async fn test_return_of_available_device_conflicts() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let device = create_device(&client, &token, "MacBook Air").await;

    let response = client
        .post(format!("{}/assignments", BASE_URL))
        .bearer_auth(&token)
        .json(&json!({
            "deviceId": device["id"],
            "action": "return",
            "employeeName": "Jane Doe",
            "employeeCode": "E-1001",
            "employeeEmail": "jane.doe@example.com",
            "department": "Finance"
        }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
#[ignore]
async fn test_confirm_with_unknown_token() {
    let client = Client::new();

    let response = client
        .post(format!("{}/assignments/confirm", BASE_URL))
        .json(&json!({ "token": "does-not-exist" }))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["ok"], false);
    assert_eq!(body["code"], "INVALID_TOKEN");
}

#[tokio::test]
#[ignore]
async fn test_confirm_without_token() {
    let client = Client::new();

    let response = client
        .get(format!("{}/assignments/confirm?token=%20", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_confirm_renders_html_for_browsers() {
    let client = Client::new();

    let response = client
        .get(format!("{}/assignments/confirm?token=does-not-exist", BASE_URL))
        .header("Accept", "text/html,application/xhtml+xml,*/*;q=0.8")
        .send()
        .await
        .expect("Failed to send request");

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let content_type = response
        .headers()
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.starts_with("text/html"));
    let body = response.text().await.expect("Failed to read body");
    assert!(body.contains("<html"));
}

#[tokio::test]
#[ignore]
async fn test_cancel_then_resend_rejected() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let device = create_device(&client, &token, "HP EliteBook").await;

    let response = issue(&client, &token, device["id"].as_i64().expect("No id")).await;
    let assignment: Value = response.json().await.expect("Failed to parse response");
    let id = assignment["id"].as_i64().expect("No id");

    let response = client
        .post(format!("{}/assignments/{}/cancel", BASE_URL, id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert!(response.status().is_success());

    let response = client
        .post(format!("{}/assignments/{}/cancel", BASE_URL, id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = client
        .post(format!("{}/assignments/{}/resend-email", BASE_URL, id))
        .bearer_auth(&token)
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
#[ignore]
async fn test_public_device_lookup() {
    let client = Client::new();
    let token = get_auth_token(&client).await;
    let device = create_device(&client, &token, "Lenovo Yoga").await;
    let code = device["code"].as_str().expect("No code");

    let response = client
        .get(format!("{}/devices/public/{}", BASE_URL, code))
        .send()
        .await
        .expect("Failed to send request");

    assert!(response.status().is_success());
    let body: Value = response.json().await.expect("Failed to parse response");
    assert_eq!(body["code"], code);
    assert!(body["assignment"].is_null());

    let response = client
        .get(format!("{}/devices/public/NOPE-999", BASE_URL))
        .send()
        .await
        .expect("Failed to send request");
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
