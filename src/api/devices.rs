//! Device inventory endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;

use crate::{
    error::AppResult,
    models::device::{
        CreateDevice, DeviceAlerts, DeviceCounts, DeviceStatus, DeviceView, ImportDevices,
        ImportReport, PublicDevice, UpdateLifecycle,
    },
    AppState,
};

use super::AuthenticatedUser;

#[derive(Debug, Deserialize, IntoParams)]
pub struct DeviceListQuery {
    /// `available` or `assigned`
    pub status: Option<DeviceStatus>,
}

/// List devices with their warranty and maintenance state
#[utoipa::path(
    get,
    path = "/devices",
    tag = "devices",
    security(("bearer_auth" = [])),
    params(DeviceListQuery),
    responses(
        (status = 200, description = "Devices, newest first", body = Vec<DeviceView>)
    )
)]
pub async fn list_devices(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<DeviceListQuery>,
) -> AppResult<Json<Vec<DeviceView>>> {
    let devices = state.services.devices.list(query.status).await?;
    Ok(Json(devices))
}

/// Get a device
#[utoipa::path(
    get,
    path = "/devices/{id}",
    tag = "devices",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Device ID")),
    responses(
        (status = 200, description = "Device", body = DeviceView),
        (status = 404, description = "Device not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn get_device(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<DeviceView>> {
    let device = state.services.devices.get(id).await?;
    Ok(Json(device))
}

/// Create a device; the code is generated from the category when omitted
#[utoipa::path(
    post,
    path = "/devices",
    tag = "devices",
    security(("bearer_auth" = [])),
    request_body = CreateDevice,
    responses(
        (status = 201, description = "Device created", body = DeviceView),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 409, description = "Code already in use", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_device(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Json(request): Json<CreateDevice>,
) -> AppResult<(StatusCode, Json<DeviceView>)> {
    let device = state.services.devices.create(request).await?;
    Ok((StatusCode::CREATED, Json(device)))
}

/// Bulk create or update devices by code
#[utoipa::path(
    post,
    path = "/devices/import",
    tag = "devices",
    security(("bearer_auth" = [])),
    request_body = ImportDevices,
    responses(
        (status = 200, description = "Import summary", body = ImportReport),
        (status = 400, description = "No usable rows", body = crate::error::ErrorResponse)
    )
)]
pub async fn import_devices(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<ImportDevices>,
) -> AppResult<Json<ImportReport>> {
    tracing::info!(user_id = claims.sub, rows = request.devices.len(), "device import requested");
    let report = state.services.devices.import(request).await?;
    Ok(Json(report))
}

/// Change the technical lifecycle status
#[utoipa::path(
    put,
    path = "/devices/{id}/lifecycle",
    tag = "devices",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Device ID")),
    request_body = UpdateLifecycle,
    responses(
        (status = 200, description = "Device updated", body = DeviceView),
        (status = 400, description = "Reason missing", body = crate::error::ErrorResponse),
        (status = 404, description = "Device not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn update_lifecycle(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<UpdateLifecycle>,
) -> AppResult<Json<DeviceView>> {
    let device = state.services.devices.update_lifecycle(id, request).await?;
    Ok(Json(device))
}

/// Record maintenance performed today
#[utoipa::path(
    post,
    path = "/devices/{id}/maintenance",
    tag = "devices",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Device ID")),
    responses(
        (status = 200, description = "Device updated", body = DeviceView),
        (status = 404, description = "Device not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn mark_maintenance(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<DeviceView>> {
    let device = state.services.devices.mark_maintenance(id).await?;
    Ok(Json(device))
}

/// Delete a device; its history stays with no device reference
#[utoipa::path(
    delete,
    path = "/devices/{id}",
    tag = "devices",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Device ID")),
    responses(
        (status = 204, description = "Device deleted"),
        (status = 404, description = "Device not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_device(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<StatusCode> {
    state.services.devices.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Device counters
#[utoipa::path(
    get,
    path = "/devices/metrics/counts",
    tag = "devices",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Totals by assignment status", body = DeviceCounts)
    )
)]
pub async fn device_counts(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<DeviceCounts>> {
    Ok(Json(state.services.devices.counts().await?))
}

/// Devices out of warranty or due for maintenance
#[utoipa::path(
    get,
    path = "/devices/issues/alerts",
    tag = "devices",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Devices needing attention", body = DeviceAlerts)
    )
)]
pub async fn device_alerts(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<DeviceAlerts>> {
    Ok(Json(state.services.devices.alerts().await?))
}

/// Public lookup by code (QR labels), no authentication
#[utoipa::path(
    get,
    path = "/devices/public/{code}",
    tag = "devices",
    params(("code" = String, Path, description = "Device code, e.g. LAP-001")),
    responses(
        (status = 200, description = "Device and current holder", body = PublicDevice),
        (status = 404, description = "Device not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn public_device(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> AppResult<Json<PublicDevice>> {
    Ok(Json(state.services.devices.public_lookup(&code).await?))
}
