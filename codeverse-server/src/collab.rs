//! Hooks that tie the sync server to accounts and projects.

use codeverse_auth::AuthService;
use codeverse_collab::{Admission, DocumentObserver, JoinAuthorizer, JoinRequest};
use codeverse_store::AppStore;
use std::sync::Arc;
use uuid::Uuid;

/// Admits any peer presenting a live session token.
///
/// Rooms are shared by link, so membership is not checked; the peer's
/// display name always comes from the account.
pub struct SessionAuthorizer {
    auth: Arc<AuthService>,
    store: Arc<AppStore>,
}

impl SessionAuthorizer {
    pub fn new(auth: Arc<AuthService>, store: Arc<AppStore>) -> Self {
        Self { auth, store }
    }
}

impl JoinAuthorizer for SessionAuthorizer {
    fn authorize(&self, doc_id: Uuid, request: &JoinRequest) -> Result<Admission, String> {
        let user = self
            .auth
            .authenticate(&request.token)
            .map_err(|e| e.to_string())?;

        match self.store.find_file_by_room(doc_id) {
            Ok(Some(file)) => log::debug!("{} opened {} ({doc_id})", user.username, file.filename),
            Ok(None) => log::debug!("{} opened quick room {doc_id}", user.username),
            Err(e) => {
                log::error!("Room lookup for {doc_id} failed: {e}");
                return Err("room lookup failed".into());
            }
        }

        Ok(Admission {
            user_id: Some(user.id),
            name: user.username,
        })
    }
}

/// Records the line count of a file when its room empties.
pub struct LineCountObserver {
    store: Arc<AppStore>,
}

impl LineCountObserver {
    pub fn new(store: Arc<AppStore>) -> Self {
        Self { store }
    }
}

impl DocumentObserver for LineCountObserver {
    fn room_closed(&self, doc_id: Uuid, text: &str) {
        let lines = count_lines(text);
        match self.store.update_file_lines(doc_id, lines) {
            Ok(Some(file)) => log::info!("{} saved with {lines} lines", file.filename),
            Ok(None) => {}
            Err(e) => log::error!("Failed to record line count for room {doc_id}: {e}"),
        }
    }
}

/// Editor line count: an empty document has none, a trailing newline opens no new line.
pub fn count_lines(text: &str) -> u64 {
    text.lines().count() as u64
}
