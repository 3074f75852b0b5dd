//! JSON or HTML, chosen from the `Accept` header.
//!
//! Confirmation links are opened straight from an email client, so those
//! endpoints answer browsers with a small HTML page and everything else
//! with JSON.

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::ACCEPT, request::Parts, StatusCode},
    response::{Html, IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::{error::AppError, html::escape};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseFormat {
    Json,
    Html,
}

impl ResponseFormat {
    /// HTML only when `text/html` has a strictly higher quality than `application/json`
    pub fn from_accept(accept: Option<&str>) -> Self {
        let Some(accept) = accept else {
            return ResponseFormat::Json;
        };
        let ranges: Vec<(String, f32)> = accept.split(',').filter_map(parse_range).collect();
        if quality(&ranges, "text", "html") > quality(&ranges, "application", "json") {
            ResponseFormat::Html
        } else {
            ResponseFormat::Json
        }
    }

    /// Send `body` as JSON, or `title`/`message` as a page
    pub fn respond<T: Serialize>(self, status: StatusCode, body: &T, title: &str, message: &str) -> Response {
        match self {
            ResponseFormat::Json => (status, Json(body)).into_response(),
            ResponseFormat::Html => (status, Html(page(title, message))).into_response(),
        }
    }

    pub fn error(self, error: AppError) -> Response {
        match self {
            ResponseFormat::Json => error.into_response(),
            ResponseFormat::Html => {
                let (status, _, message) = error.parts();
                if status.is_server_error() {
                    tracing::error!(error = ?error, "request failed");
                }
                (status, Html(page("Confirmation failed", &message))).into_response()
            }
        }
    }
}

#[async_trait]
impl<S: Send + Sync> FromRequestParts<S> for ResponseFormat {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let accept = parts.headers.get(ACCEPT).and_then(|v| v.to_str().ok());
        Ok(ResponseFormat::from_accept(accept))
    }
}

/// `type/subtype;q=0.8` into a lowercase media range and its quality
fn parse_range(range: &str) -> Option<(String, f32)> {
    let mut params = range.split(';');
    let media = params.next()?.trim().to_ascii_lowercase();
    if media.is_empty() {
        return None;
    }
    let q = params
        .filter_map(|p| p.trim().strip_prefix("q="))
        .find_map(|q| q.trim().parse::<f32>().ok())
        .unwrap_or(1.0)
        .clamp(0.0, 1.0);
    Some((media, q))
}

/// Quality of the most specific range matching `kind/sub`, 0 when none does
fn quality(ranges: &[(String, f32)], kind: &str, sub: &str) -> f32 {
    let exact = format!("{}/{}", kind, sub);
    let family = format!("{}/*", kind);
    [exact.as_str(), family.as_str(), "*/*"]
        .iter()
        .find_map(|wanted| ranges.iter().find(|(media, _)| media == wanted).map(|(_, q)| *q))
        .unwrap_or(0.0)
}

pub fn page(title: &str, message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
  <head>
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>{title}</title>
    <style>
      body {{ font-family: Arial, sans-serif; background: #f1f5f9; color: #0f172a; display: flex; align-items: center; justify-content: center; min-height: 100vh; margin: 0; }}
      main {{ background: #fff; border: 1px solid #e2e8f0; border-radius: 10px; padding: 24px 28px; max-width: 480px; }}
      h1 {{ font-size: 20px; margin: 0 0 12px; }}
      p {{ margin: 0; line-height: 1.6; }}
    </style>
  </head>
  <body>
    <main>
      <h1>{title}</h1>
      <p>{message}</p>
    </main>
  </body>
</html>
"#,
        title = escape(title),
        message = escape(message),
    )
}
