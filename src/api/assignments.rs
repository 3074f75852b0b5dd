//! Assignment endpoints for staff

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;

use crate::{
    error::AppResult,
    models::assignment::{
        ActiveAssignee, ActiveAssigneeQuery, Assignment, AssignmentDetails, AssignmentQuery,
        CreateAssignment,
    },
    services::confirmation::ResendReceipt,
    AppState,
};

use super::AuthenticatedUser;

/// Administrator password confirming a purge
#[derive(Deserialize, ToSchema)]
pub struct DeleteAssignmentRequest {
    pub password: Option<String>,
}

/// Record a device issue or return
#[utoipa::path(
    post,
    path = "/assignments",
    tag = "assignments",
    security(("bearer_auth" = [])),
    request_body = CreateAssignment,
    responses(
        (status = 201, description = "Assignment recorded", body = Assignment),
        (status = 400, description = "Invalid request", body = crate::error::ErrorResponse),
        (status = 404, description = "Device not found", body = crate::error::ErrorResponse),
        (status = 409, description = "Device state does not allow this action", body = crate::error::ErrorResponse)
    )
)]
pub async fn create_assignment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(request): Json<CreateAssignment>,
) -> AppResult<(StatusCode, Json<Assignment>)> {
    let assignment = state.services.assignments.create_assignment(request, &claims).await?;
    Ok((StatusCode::CREATED, Json(assignment)))
}

/// Assignment history, newest first
#[utoipa::path(
    get,
    path = "/assignments",
    tag = "assignments",
    security(("bearer_auth" = [])),
    params(AssignmentQuery),
    responses(
        (status = 200, description = "Assignment history", body = Vec<AssignmentDetails>)
    )
)]
pub async fn list_assignments(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<AssignmentQuery>,
) -> AppResult<Json<Vec<AssignmentDetails>>> {
    let assignments = state.services.assignments.list(&query).await?;
    Ok(Json(assignments))
}

/// Employees currently holding confirmed devices
#[utoipa::path(
    get,
    path = "/assignments/active",
    tag = "assignments",
    security(("bearer_auth" = [])),
    params(ActiveAssigneeQuery),
    responses(
        (status = 200, description = "Current holders grouped by employee", body = Vec<ActiveAssignee>)
    )
)]
pub async fn list_active_assignees(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<ActiveAssigneeQuery>,
) -> AppResult<Json<Vec<ActiveAssignee>>> {
    let assignees = state.services.assignments.active_assignees(&query).await?;
    Ok(Json(assignees))
}

/// Send a fresh confirmation email for a pending issue
#[utoipa::path(
    post,
    path = "/assignments/{id}/resend-email",
    tag = "assignments",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Assignment ID")),
    responses(
        (status = 200, description = "New link emailed", body = ResendReceipt),
        (status = 400, description = "Not a pending issue", body = crate::error::ErrorResponse),
        (status = 404, description = "Assignment or device not found", body = crate::error::ErrorResponse),
        (status = 500, description = "Email could not be sent", body = crate::error::ErrorResponse)
    )
)]
pub async fn resend_email(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<ResendReceipt>> {
    tracing::info!(assignment_id = id, user_id = claims.sub, "resending confirmation email");
    let receipt = state.services.confirmation.resend_for_assignment(id).await?;
    Ok(Json(receipt))
}

/// Cancel a pending issue
#[utoipa::path(
    post,
    path = "/assignments/{id}/cancel",
    tag = "assignments",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Assignment ID")),
    responses(
        (status = 200, description = "Assignment cancelled", body = Assignment),
        (status = 400, description = "Not awaiting confirmation", body = crate::error::ErrorResponse),
        (status = 404, description = "Assignment not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn cancel_assignment(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<i32>,
) -> AppResult<Json<Assignment>> {
    let assignment = state.services.confirmation.cancel(id).await?;
    Ok(Json(assignment))
}

/// Permanently delete a history entry (administrators only)
#[utoipa::path(
    delete,
    path = "/assignments/{id}",
    tag = "assignments",
    security(("bearer_auth" = [])),
    params(("id" = i32, Path, description = "Assignment ID")),
    request_body = DeleteAssignmentRequest,
    responses(
        (status = 204, description = "Assignment deleted"),
        (status = 400, description = "Password missing", body = crate::error::ErrorResponse),
        (status = 401, description = "Wrong password", body = crate::error::ErrorResponse),
        (status = 403, description = "Administrator role required", body = crate::error::ErrorResponse),
        (status = 404, description = "Assignment not found", body = crate::error::ErrorResponse)
    )
)]
pub async fn delete_assignment(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<i32>,
    Json(request): Json<DeleteAssignmentRequest>,
) -> AppResult<StatusCode> {
    let password = request.password.unwrap_or_default();
    state
        .services
        .assignments
        .delete_assignment(id, &password, &claims)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
