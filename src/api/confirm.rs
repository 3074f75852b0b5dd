//! Public confirmation endpoints, reached from the link in the issue email

use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::Response,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::{
    error::AppError,
    services::confirmation::{ConfirmOutcome, ResendReceipt},
    AppState,
};

use super::{negotiate::ResponseFormat, Client};

/// Token carried by the emailed link
#[derive(Debug, Default, Deserialize, IntoParams, ToSchema)]
#[into_params(parameter_in = Query)]
pub struct TokenPayload {
    pub token: Option<String>,
}

/// Fresh confirmation link sent
#[derive(Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResendResponse {
    pub ok: bool,
    pub assignment_id: i32,
    pub expires_at: DateTime<Utc>,
    pub message: String,
}

impl From<ResendReceipt> for ResendResponse {
    fn from(receipt: ResendReceipt) -> Self {
        Self {
            ok: true,
            assignment_id: receipt.assignment_id,
            expires_at: receipt.expires_at,
            message: "A new confirmation link has been sent".to_string(),
        }
    }
}

/// Body token first, then the query string
fn pick_token(query: TokenPayload, body: Option<TokenPayload>) -> Result<String, AppError> {
    let non_blank = |t: Option<String>| t.map(|t| t.trim().to_string()).filter(|t| !t.is_empty());
    non_blank(body.and_then(|b| b.token))
        .or_else(|| non_blank(query.token))
        .ok_or_else(|| AppError::Validation("Token is required".to_string()))
}

async fn confirm(state: &AppState, format: ResponseFormat, client: Client, token: Result<String, AppError>) -> Response {
    let result = match token {
        Ok(token) => state.services.confirmation.confirm(&token, &client.0).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(outcome) => render_outcome(format, &outcome),
        Err(e) => format.error(e),
    }
}

fn render_outcome(format: ResponseFormat, outcome: &ConfirmOutcome) -> Response {
    format.respond(outcome.http_status(), outcome, outcome.kind.title(), &outcome.message)
}

/// Confirm receipt of a device (link opened from the email)
#[utoipa::path(
    get,
    path = "/assignments/confirm",
    tag = "confirmation",
    params(TokenPayload),
    responses(
        (status = 200, description = "Confirmed, or already confirmed", body = ConfirmOutcome),
        (status = 400, description = "Missing, invalid or expired token, or not awaiting confirmation", body = ConfirmOutcome),
        (status = 404, description = "Device no longer exists", body = ConfirmOutcome),
        (status = 409, description = "Device no longer available", body = ConfirmOutcome)
    )
)]
pub async fn confirm_get(
    State(state): State<AppState>,
    format: ResponseFormat,
    client: Client,
    Query(query): Query<TokenPayload>,
) -> Response {
    confirm(&state, format, client, pick_token(query, None)).await
}

/// Confirm receipt of a device, token in the JSON body or the query string
#[utoipa::path(
    post,
    path = "/assignments/confirm",
    tag = "confirmation",
    params(TokenPayload),
    request_body(content = TokenPayload, description = "Token (optional when given in the query)"),
    responses(
        (status = 200, description = "Confirmed, or already confirmed", body = ConfirmOutcome),
        (status = 400, description = "Missing, invalid or expired token, or not awaiting confirmation", body = ConfirmOutcome),
        (status = 404, description = "Device no longer exists", body = ConfirmOutcome),
        (status = 409, description = "Device no longer available", body = ConfirmOutcome)
    )
)]
pub async fn confirm_post(
    State(state): State<AppState>,
    format: ResponseFormat,
    client: Client,
    Query(query): Query<TokenPayload>,
    body: Option<Json<TokenPayload>>,
) -> Response {
    let token = pick_token(query, body.map(|Json(b)| b));
    confirm(&state, format, client, token).await
}

/// Trade a known (typically expired) token for a fresh confirmation email
#[utoipa::path(
    post,
    path = "/assignments/confirm-resend",
    tag = "confirmation",
    params(TokenPayload),
    request_body(content = TokenPayload, description = "Token (optional when given in the query)"),
    responses(
        (status = 200, description = "New link emailed", body = ResendResponse),
        (status = 400, description = "Missing or unknown token, or already confirmed", body = crate::error::ErrorResponse),
        (status = 404, description = "Device not found", body = crate::error::ErrorResponse),
        (status = 500, description = "Email could not be sent", body = crate::error::ErrorResponse)
    )
)]
pub async fn confirm_resend(
    State(state): State<AppState>,
    format: ResponseFormat,
    Query(query): Query<TokenPayload>,
    body: Option<Json<TokenPayload>>,
) -> Response {
    let result = match pick_token(query, body.map(|Json(b)| b)) {
        Ok(token) => state.services.confirmation.resend_by_token(&token).await,
        Err(e) => Err(e),
    };
    match result {
        Ok(receipt) => {
            let response = ResendResponse::from(receipt);
            let message = format!(
                "A new confirmation link has been sent to your email. It expires at {}.",
                response.expires_at.format("%d/%m/%Y %H:%M UTC")
            );
            format.respond(StatusCode::OK, &response, "Confirmation link sent", &message)
        }
        Err(e) => format.error(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payload(token: Option<&str>) -> TokenPayload {
        TokenPayload {
            token: token.map(str::to_string),
        }
    }

    #[test]
    fn test_body_token_wins() {
        let token = pick_token(payload(Some("from-query")), Some(payload(Some("from-body")))).unwrap();
        assert_eq!(token, "from-body");

        let token = pick_token(payload(Some("from-query")), Some(payload(None))).unwrap();
        assert_eq!(token, "from-query");
    }

    #[test]
    fn test_blank_token_is_rejected() {
        assert!(matches!(
            pick_token(payload(Some("   ")), None),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(pick_token(payload(None), None), Err(AppError::Validation(_))));
    }
}
