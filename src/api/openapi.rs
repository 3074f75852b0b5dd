//! OpenAPI documentation

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{assignments, auth, confirm, devices, health};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "ITAM API",
        version = "1.0.0",
        description = "IT asset management REST API: devices, issue/return assignments and employee confirmation"
    ),
    servers(
        (url = "/api", description = "API")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        // Devices
        devices::list_devices,
        devices::get_device,
        devices::create_device,
        devices::import_devices,
        devices::update_lifecycle,
        devices::mark_maintenance,
        devices::delete_device,
        devices::device_counts,
        devices::device_alerts,
        devices::public_device,
        // Assignments
        assignments::create_assignment,
        assignments::list_assignments,
        assignments::list_active_assignees,
        assignments::resend_email,
        assignments::cancel_assignment,
        assignments::delete_assignment,
        // Confirmation
        confirm::confirm_get,
        confirm::confirm_post,
        confirm::confirm_resend,
    ),
    components(
        schemas(
            // Auth
            auth::LoginResponse,
            crate::models::user::LoginRequest,
            crate::models::user::User,
            crate::models::user::Role,
            crate::models::user::StaffSummary,
            // Devices
            crate::models::device::Device,
            crate::models::device::DeviceView,
            crate::models::device::DeviceSummary,
            crate::models::device::DeviceStatus,
            crate::models::device::LifecycleStatus,
            crate::models::device::CreateDevice,
            crate::models::device::ImportDeviceRow,
            crate::models::device::ImportDevices,
            crate::models::device::ImportReport,
            crate::models::device::UpdateLifecycle,
            crate::models::device::DeviceCounts,
            crate::models::device::DeviceAlerts,
            crate::models::device::PublicDevice,
            // Assignments
            crate::models::assignment::Assignment,
            crate::models::assignment::AssignmentAction,
            crate::models::assignment::AssignmentStatus,
            crate::models::assignment::AssignmentDetails,
            crate::models::assignment::CreateAssignment,
            crate::models::assignment::ActiveAssignee,
            crate::models::assignment::DeviceHolder,
            assignments::DeleteAssignmentRequest,
            // Confirmation
            confirm::TokenPayload,
            confirm::ResendResponse,
            crate::services::confirmation::ConfirmOutcome,
            crate::services::confirmation::ConfirmKind,
            crate::services::confirmation::ResendReceipt,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "devices", description = "Device inventory"),
        (name = "assignments", description = "Device issue and return"),
        (name = "confirmation", description = "Employee confirmation of received devices")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}
