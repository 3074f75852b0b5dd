//! ITAM Server
//!
//! IT asset management backend: device inventory, issue and return of
//! devices to employees, and email-based confirmation of receipt.

use std::sync::Arc;

pub mod api;
pub mod config;
pub mod error;
pub mod html;
pub mod models;
pub mod repository;
pub mod services;

pub use config::AppConfig;
pub use error::{AppError, AppResult};

/// Application state shared across all handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub services: Arc<services::Services>,
}
