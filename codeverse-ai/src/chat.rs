use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

use crate::backend::ChatMessage;

pub const WELCOME_MESSAGE: &str = "Welcome to CodeVerse AI. How can I help you today? 😊";

/// One user's conversation with the assistant.
///
/// Always starts with the welcome message. Once the history grows past
/// `max_history`, the oldest exchanges after the welcome are dropped.
#[derive(Debug, Clone)]
pub struct ChatSession {
    messages: Vec<ChatMessage>,
    max_history: usize,
}

impl ChatSession {
    pub fn new(max_history: usize) -> Self {
        Self {
            messages: vec![ChatMessage::assistant(WELCOME_MESSAGE)],
            max_history: max_history.max(3),
        }
    }

    pub fn history(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Back to the welcome state.
    pub fn clear(&mut self) {
        self.messages.truncate(1);
    }

    /// System prompt, history, then the pending user message.
    pub fn request(&self, system_prompt: &str, user_text: &str) -> Vec<ChatMessage> {
        let mut out = Vec::with_capacity(self.messages.len() + 2);
        out.push(ChatMessage::system(system_prompt));
        out.extend(self.messages.iter().cloned());
        out.push(ChatMessage::user(user_text));
        out
    }

    /// Record a completed exchange.
    pub fn record(&mut self, user_text: &str, reply: &str) {
        self.messages.push(ChatMessage::user(user_text));
        self.messages.push(ChatMessage::assistant(reply));

        // Drop whole exchanges so the history never opens on an orphan reply
        let excess = self.messages.len().saturating_sub(self.max_history);
        let excess = (excess + excess % 2).min(self.messages.len() - 1);
        if excess > 0 {
            self.messages.drain(1..1 + excess);
        }
    }
}

/// Conversations keyed by login session token.
#[derive(Default)]
pub struct ChatRegistry {
    sessions: RwLock<HashMap<String, Arc<Mutex<ChatSession>>>>,
}

impl ChatRegistry {
    /// Existing conversation for `key`, or a fresh one.
    pub async fn get_or_create(&self, key: &str, max_history: usize) -> Arc<Mutex<ChatSession>> {
        if let Some(session) = self.sessions.read().await.get(key) {
            return session.clone();
        }
        self.sessions
            .write()
            .await
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(ChatSession::new(max_history))))
            .clone()
    }

    /// Existing conversation for `key`, without creating one.
    pub async fn get(&self, key: &str) -> Option<Arc<Mutex<ChatSession>>> {
        self.sessions.read().await.get(key).cloned()
    }

    /// Drop a conversation (e.g. on logout).
    pub async fn remove(&self, key: &str) -> bool {
        self.sessions.write().await.remove(key).is_some()
    }

    /// Keep only conversations whose key passes `keep`. Returns how many were dropped.
    pub async fn retain<F>(&self, mut keep: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        let mut sessions = self.sessions.write().await;
        let before = sessions.len();
        sessions.retain(|key, _| keep(key));
        before - sessions.len()
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Role;

    #[test]
    fn test_new_session_has_welcome() {
        let session = ChatSession::new(10);
        assert_eq!(session.history().len(), 1);
        assert_eq!(session.history()[0].role, Role::Assistant);
        assert_eq!(session.history()[0].content, WELCOME_MESSAGE);
    }

    #[test]
    fn test_request_prepends_system_prompt() {
        let mut session = ChatSession::new(10);
        session.record("hi", "hello");
        let req = session.request("sys", "next");
        let roles: Vec<_> = req.iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![Role::System, Role::Assistant, Role::User, Role::Assistant, Role::User]
        );
        assert_eq!(req.last().unwrap().content, "next");
    }

    #[test]
    fn test_history_bounded_keeps_welcome() {
        let mut session = ChatSession::new(5);
        for i in 0..10 {
            session.record(&format!("q{i}"), &format!("a{i}"));
        }
        let history = session.history();
        assert!(history.len() <= 5);
        assert_eq!(history[0].content, WELCOME_MESSAGE);
        assert_eq!(history.last().unwrap().content, "a9");
    }

    #[test]
    fn test_clear_restores_welcome() {
        let mut session = ChatSession::new(10);
        session.record("hi", "hello");
        session.clear();
        assert_eq!(session.history(), ChatSession::new(10).history());
    }

    #[tokio::test]
    async fn test_registry_reuses_sessions() {
        let registry = ChatRegistry::default();
        let a = registry.get_or_create("tok", 10).await;
        a.lock().await.record("hi", "hello");
        let again = registry.get_or_create("tok", 10).await;
        assert_eq!(again.lock().await.history().len(), 3);

        assert!(registry.remove("tok").await);
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn test_registry_lookup_and_retain() {
        let registry = ChatRegistry::default();
        assert!(registry.get("tok").await.is_none());
        assert!(registry.is_empty().await);

        for key in ["live-1", "dead-1", "live-2", "dead-2"] {
            registry.get_or_create(key, 10).await;
        }
        assert_eq!(registry.retain(|key| key.starts_with("live")).await, 2);
        assert_eq!(registry.len().await, 2);
        assert!(registry.get("live-2").await.is_some());
        assert!(registry.get("dead-1").await.is_none());
    }
}
