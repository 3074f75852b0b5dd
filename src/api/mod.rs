//! API handlers for the ITAM REST endpoints

pub mod assignments;
pub mod auth;
pub mod confirm;
pub mod devices;
pub mod health;
pub mod negotiate;
pub mod openapi;

use std::net::SocketAddr;

use axum::{
    async_trait,
    extract::{ConnectInfo, FromRequestParts},
    http::{
        header::{AUTHORIZATION, USER_AGENT},
        request::Parts,
    },
};

use crate::{error::AppError, models::user::UserClaims, services::confirmation::ClientInfo, AppState};

/// Extractor for authenticated staff from the JWT bearer token
pub struct AuthenticatedUser(pub UserClaims);

#[async_trait]
impl FromRequestParts<AppState> for AuthenticatedUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::Authentication("Missing authorization header".to_string()))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| AppError::Authentication("Invalid authorization header format".to_string()))?;

        let claims = UserClaims::from_token(token, &state.config.auth.jwt_secret)
            .map_err(|e| AppError::Authentication(e.to_string()))?;

        Ok(AuthenticatedUser(claims))
    }
}

/// Requester address and user agent, recorded when an employee confirms
pub struct Client(pub ClientInfo);

#[async_trait]
impl FromRequestParts<AppState> for Client {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Client(ClientInfo {
            ip: client_ip(parts, state.config.server.trust_proxy),
            user_agent: header_value(parts, USER_AGENT.as_str()),
        }))
    }
}

fn header_value(parts: &Parts, name: &str) -> Option<String> {
    parts
        .headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// Socket peer address. Behind a trusted proxy, the first X-Forwarded-For hop
/// then X-Real-IP take precedence.
fn client_ip(parts: &Parts, trust_proxy: bool) -> Option<String> {
    if trust_proxy {
        if let Some(forwarded) = header_value(parts, "x-forwarded-for") {
            if let Some(first) = forwarded.split(',').map(str::trim).find(|ip| !ip.is_empty()) {
                return Some(first.to_string());
            }
        }
        if let Some(real_ip) = header_value(parts, "x-real-ip") {
            return Some(real_ip);
        }
    }
    parts
        .extensions
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.ip().to_string())
}
