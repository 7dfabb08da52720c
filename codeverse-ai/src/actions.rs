use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::backend::{AiConfig, ChatMessage, CompletionBackend};
use crate::chat::{ChatRegistry, ChatSession};
use crate::error::AiError;

/// One-shot tasks the editor can run on a snippet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeAction {
    Explain,
    Debug,
    Optimize,
    #[serde(alias = "docs")]
    Document,
    Complete,
}

impl CodeAction {
    pub const ALL: [CodeAction; 5] = [
        CodeAction::Explain,
        CodeAction::Debug,
        CodeAction::Optimize,
        CodeAction::Document,
        CodeAction::Complete,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CodeAction::Explain => "explain",
            CodeAction::Debug => "debug",
            CodeAction::Optimize => "optimize",
            CodeAction::Document => "document",
            CodeAction::Complete => "complete",
        }
    }

    fn instructions(&self) -> &'static str {
        match self {
            CodeAction::Explain => {
                "Explain what the following code does, step by step, for a developer \
                 who is new to it. Mention any non-obvious behaviour."
            }
            CodeAction::Debug => {
                "Find bugs in the following code. For each problem, say where it is, \
                 why it is wrong, and show the corrected code."
            }
            CodeAction::Optimize => {
                "Suggest performance and readability improvements for the following code. \
                 Show the improved version and summarise what changed."
            }
            CodeAction::Document => {
                "Write documentation for the following code: a short overview plus \
                 doc comments for every public function, in the idiom of the language."
            }
            CodeAction::Complete => {
                "Continue the following code. Reply with the completed code only, \
                 in a single fenced block."
            }
        }
    }

    /// Messages for a one-shot completion on `code`.
    pub fn prompt(&self, language: &str, code: &str, note: Option<&str>) -> Vec<ChatMessage> {
        let language = if language.trim().is_empty() { "plaintext" } else { language.trim() };
        let system = format!(
            "You are CodeVerse AI, an expert {language} programming assistant. \
             Answer in Markdown and keep code in fenced blocks."
        );
        let mut user = format!("{}\n\n```{language}\n{code}\n```", self.instructions());
        if let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) {
            user.push_str("\n\nAdditional context from the user: ");
            user.push_str(note);
        }
        vec![ChatMessage::system(system), ChatMessage::user(user)]
    }
}

impl fmt::Display for CodeAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CodeAction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "explain" => Ok(CodeAction::Explain),
            "debug" => Ok(CodeAction::Debug),
            "optimize" | "optimise" => Ok(CodeAction::Optimize),
            "document" | "docs" => Ok(CodeAction::Document),
            "complete" => Ok(CodeAction::Complete),
            other => Err(format!("unknown code action: {other}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AssistRequest {
    pub action: CodeAction,
    #[serde(default)]
    pub language: String,
    pub code: String,
    #[serde(default)]
    pub note: Option<String>,
}

/// Chat and code actions over one completion backend.
pub struct Assistant {
    backend: Arc<dyn CompletionBackend>,
    system_prompt: String,
    max_history: usize,
    chats: ChatRegistry,
}

impl Assistant {
    pub fn new(backend: Arc<dyn CompletionBackend>, config: &AiConfig) -> Self {
        Self {
            backend,
            system_prompt: config.system_prompt.clone(),
            max_history: config.max_history,
            chats: ChatRegistry::default(),
        }
    }

    /// Send a chat message in the conversation bound to `key`.
    ///
    /// The exchange is only recorded when the backend answers.
    pub async fn chat(&self, key: &str, text: &str) -> Result<String, AiError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(AiError::EmptyPrompt);
        }

        let session = self.chats.get_or_create(key, self.max_history).await;
        let mut session = session.lock().await;
        let request = session.request(&self.system_prompt, text);
        let reply = self.backend.complete(&request).await?;
        session.record(text, &reply);
        Ok(reply)
    }

    /// Conversation so far. Keys without one see the welcome state.
    pub async fn history(&self, key: &str) -> Vec<ChatMessage> {
        let Some(session) = self.chats.get(key).await else {
            return ChatSession::new(self.max_history).history().to_vec();
        };
        let history = session.lock().await.history().to_vec();
        history
    }

    pub async fn clear(&self, key: &str) {
        if let Some(session) = self.chats.get(key).await {
            session.lock().await.clear();
        }
    }

    /// Drop the conversation entirely.
    pub async fn forget(&self, key: &str) {
        self.chats.remove(key).await;
    }

    /// Drop every conversation whose key fails `is_live`. Returns how many went.
    pub async fn retain_conversations<F>(&self, is_live: F) -> usize
    where
        F: FnMut(&str) -> bool,
    {
        self.chats.retain(is_live).await
    }

    pub async fn conversation_count(&self) -> usize {
        self.chats.len().await
    }

    /// Run a one-shot code action. Not part of any conversation.
    pub async fn assist(&self, request: &AssistRequest) -> Result<String, AiError> {
        if request.code.trim().is_empty() {
            return Err(AiError::EmptyPrompt);
        }
        log::debug!(
            "Running {} on {} bytes of {}",
            request.action,
            request.code.len(),
            request.language
        );
        let messages = request
            .action
            .prompt(&request.language, &request.code, request.note.as_deref());
        self.backend.complete(&messages).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Role;

    #[test]
    fn test_parse_aliases() {
        assert_eq!("docs".parse::<CodeAction>().unwrap(), CodeAction::Document);
        assert_eq!(" Explain ".parse::<CodeAction>().unwrap(), CodeAction::Explain);
        assert!("refactor".parse::<CodeAction>().is_err());
        for action in CodeAction::ALL {
            assert_eq!(action.as_str().parse::<CodeAction>().unwrap(), action);
        }
    }

    #[test]
    fn test_prompt_embeds_snippet() {
        let msgs = CodeAction::Debug.prompt("python", "print(x", Some("it crashes"));
        assert_eq!(msgs.len(), 2);
        assert_eq!(msgs[0].role, Role::System);
        assert!(msgs[0].content.contains("python"));
        assert!(msgs[1].content.contains("```python\nprint(x\n```"));
        assert!(msgs[1].content.contains("it crashes"));
    }

    #[test]
    fn test_prompt_defaults_language() {
        let msgs = CodeAction::Explain.prompt("  ", "x", Some("   "));
        assert!(msgs[1].content.contains("```plaintext"));
        assert!(!msgs[1].content.contains("Additional context"));
    }

    #[test]
    fn test_deserialize_request() {
        let req: AssistRequest =
            serde_json::from_str(r#"{"action":"docs","code":"fn main() {}"}"#).unwrap();
        assert_eq!(req.action, CodeAction::Document);
        assert_eq!(req.language, "");
        assert!(req.note.is_none());
    }
}
