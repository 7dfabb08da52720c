//! Process-wide services shared by every handler.

use codeverse_ai::{Assistant, CompletionBackend, GroqBackend};
use codeverse_auth::{AuthService, LogMailer, Mailer, PasswordHasher, SmtpMailer, SystemClock};
use codeverse_collab::{DocumentStore, StoreConfig as DocStoreConfig, SyncServer};
use codeverse_store::{AppStore, StoreConfig};
use std::sync::Arc;
use thiserror::Error;

use crate::collab::{LineCountObserver, SessionAuthorizer};
use crate::config::Config;

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Failed to open app store: {0}")]
    Store(#[from] codeverse_store::StoreError),

    #[error("Failed to open document store: {0}")]
    Documents(#[from] codeverse_collab::DocStoreError),

    #[error("Mail setup failed: {0}")]
    Mail(#[from] codeverse_auth::MailError),

    #[error("AI client setup failed: {0}")]
    Ai(#[from] codeverse_ai::AiError),
}

/// External collaborators; replaced in tests.
pub struct Services {
    pub mailer: Arc<dyn Mailer>,
    pub completions: Arc<dyn CompletionBackend>,
    pub hasher: PasswordHasher,
}

impl Services {
    /// SMTP when configured, otherwise mail is only logged.
    pub fn from_config(config: &Config) -> Result<Self, StartupError> {
        let mailer: Arc<dyn Mailer> = if config.mail.is_configured() {
            Arc::new(SmtpMailer::new(&config.mail.smtp_settings())?)
        } else {
            log::warn!("No SMTP credentials configured, outgoing mail will only be logged");
            Arc::new(LogMailer)
        };
        if config.ai.api_key.is_empty() {
            log::warn!("No AI API key configured, assistant requests will fail");
        }
        Ok(Self {
            mailer,
            completions: Arc::new(GroqBackend::new(&config.ai)?),
            hasher: PasswordHasher::default(),
        })
    }
}

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<AppStore>,
    pub auth: Arc<AuthService>,
    pub assistant: Arc<Assistant>,
    pub sync: SyncServer,
    pub config: Arc<Config>,
}

impl AppState {
    /// Open both databases and wire the services together.
    pub fn build(config: Config, services: Services) -> Result<Self, StartupError> {
        let store = Arc::new(AppStore::open(StoreConfig {
            path: config.storage.app_path(),
            ..StoreConfig::default()
        })?);
        let documents = Arc::new(DocumentStore::open(DocStoreConfig {
            path: config.storage.documents_path(),
            ..DocStoreConfig::default()
        })?);

        let auth = Arc::new(AuthService::new(
            store.clone(),
            services.mailer,
            Arc::new(SystemClock),
            services.hasher,
            config.auth.clone(),
        ));
        let assistant = Arc::new(Assistant::new(services.completions, &config.ai));

        let sync = SyncServer::with_store(config.collab.clone(), Some(documents))
            .with_authorizer(Arc::new(SessionAuthorizer::new(auth.clone(), store.clone())))
            .with_observer(Arc::new(LineCountObserver::new(store.clone())));

        Ok(Self {
            store,
            auth,
            assistant,
            sync,
            config: Arc::new(config),
        })
    }
}
