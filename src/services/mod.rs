//! Business logic services

pub mod assignments;
pub mod auth;
pub mod confirm_token;
pub mod confirmation;
pub mod devices;
pub mod documents;
pub mod email;
pub mod notifications;

use std::sync::Arc;

use crate::{config::AppConfig, error::AppResult, repository::Repository};

use documents::{DocumentRenderer, DocumentStore};
use email::Mailer;
use notifications::Notifier;

/// Container for all services
#[derive(Clone)]
pub struct Services {
    pub auth: auth::AuthService,
    pub devices: devices::DevicesService,
    pub assignments: assignments::AssignmentsService,
    pub confirmation: confirmation::ConfirmationService,
    repository: Repository,
}

impl Services {
    /// Create all services over one repository and the outbound collaborators
    pub fn new(
        repository: Repository,
        config: &AppConfig,
        mailer: Arc<dyn Mailer>,
        renderer: Arc<dyn DocumentRenderer>,
    ) -> Self {
        let notifier = Notifier::new(
            mailer,
            renderer,
            DocumentStore::new(&config.documents),
            config.confirm.clone(),
        );

        Self {
            auth: auth::AuthService::new(repository.clone(), config.auth.clone()),
            devices: devices::DevicesService::new(repository.clone()),
            assignments: assignments::AssignmentsService::new(
                repository.clone(),
                notifier.clone(),
                config.confirm.clone(),
            ),
            confirmation: confirmation::ConfirmationService::new(
                repository.clone(),
                notifier,
                config.confirm.clone(),
            ),
            repository,
        }
    }

    /// Database round-trip for the readiness probe
    pub async fn ping(&self) -> AppResult<()> {
        self.repository.ping().await
    }
}
