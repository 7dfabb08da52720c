//! # codeverse-server — HTTP API and process wiring
//!
//! ```text
//!  browser ──HTTP/JSON──► axum router ──► AuthService ──┐
//!                              │        ──► Assistant ───┼──► hosted completion API
//!                              │        ──► AppStore ◄───┘    (RocksDB: app/)
//!                              ▼
//!  editor ───WebSocket───► SyncServer ──► DocumentStore      (RocksDB: documents/)
//!                              │
//!                              └─ SessionAuthorizer / LineCountObserver ──► AppStore
//! ```
//!
//! Both listeners run in one process and share the stores.

pub mod collab;
pub mod config;
pub mod error;
pub mod extract;
pub mod routes;
pub mod state;

pub use config::{Config, ConfigError};
pub use error::ApiError;
pub use state::{AppState, Services, StartupError};

use codeverse_ai::Assistant;
use codeverse_auth::{AuthError, AuthService};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Serve the JSON API on an already bound listener.
pub async fn serve_http(state: AppState, listener: TcpListener) -> std::io::Result<()> {
    axum::serve(listener, routes::router(state)).await
}

/// Delete expired sessions and forget the chat memory of sessions that ended.
pub async fn sweep_sessions(auth: &AuthService, assistant: &Assistant) {
    if let Err(e) = auth.purge_expired_sessions() {
        log::error!("Session purge failed: {e}");
    }
    // Store failures keep the conversation; only a definite miss drops it
    let dropped = assistant
        .retain_conversations(|token| {
            !matches!(auth.authenticate(token), Err(AuthError::InvalidSession))
        })
        .await;
    if dropped > 0 {
        log::debug!("Dropped {dropped} conversations of ended sessions");
    }
}

/// Run [`sweep_sessions`] every `every`.
pub fn spawn_session_purge(
    auth: Arc<AuthService>,
    assistant: Arc<Assistant>,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(every);
        // The first tick completes immediately
        ticker.tick().await;
        loop {
            ticker.tick().await;
            sweep_sessions(&auth, &assistant).await;
        }
    })
}

/// Open the stores, start the sync server and serve HTTP until either stops.
pub async fn run(config: Config) -> Result<(), BoxError> {
    let services = Services::from_config(&config)?;
    let state = AppState::build(config, services)?;

    let http = TcpListener::bind(&state.config.http.bind_addr).await?;
    log::info!("HTTP API listening on {}", http.local_addr()?);

    let purge = spawn_session_purge(
        state.auth.clone(),
        state.assistant.clone(),
        Duration::from_secs(state.config.auth.session_purge_interval_secs),
    );

    let sync = state.sync.clone();
    let result = tokio::select! {
        res = sync.run() => res,
        res = serve_http(state, http) => res.map_err(BoxError::from),
    };
    purge.abort();
    result
}
