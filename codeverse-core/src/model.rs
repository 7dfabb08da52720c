//! Persistent entities.
//!
//! Timestamps are seconds since the Unix epoch. Every type here is stored
//! with bincode, so enums stay externally tagged (bincode cannot decode
//! internally tagged enums).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::SystemTime;
use uuid::Uuid;

/// Current time in seconds since the Unix epoch.
pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// A registered account.
///
/// `password_hash` is an argon2 PHC string; plaintext never reaches this type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    /// Lowercased, trimmed. Unique across the store.
    pub email: String,
    pub password_hash: String,
    pub created_at: u64,
}

impl User {
    pub fn new(username: impl Into<String>, email: impl Into<String>, password_hash: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            username: username.into(),
            email: email.into(),
            password_hash,
            created_at: unix_now(),
        }
    }

    /// View safe to hand to clients.
    pub fn public(&self) -> PublicUser {
        PublicUser {
            id: self.id,
            username: self.username.clone(),
            email: self.email.clone(),
            created_at: self.created_at,
        }
    }
}

/// A user without credential material.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublicUser {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: u64,
}

/// Server-issued login session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    /// Opaque random token (hex).
    pub token: String,
    pub user_id: Uuid,
    pub created_at: u64,
    pub expires_at: u64,
}

impl Session {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Pending password-reset code for one email address.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OtpRecord {
    pub email: String,
    /// Six ASCII digits.
    pub code: String,
    pub issued_at: u64,
    pub expires_at: u64,
    /// Earliest time a new code may be requested.
    pub resend_available_at: u64,
    /// Failed verification attempts so far.
    pub attempts: u32,
}

impl OtpRecord {
    pub fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// Seconds left before a resend is allowed (0 = allowed now).
    pub fn cooldown_remaining(&self, now: u64) -> u64 {
        self.resend_available_at.saturating_sub(now)
    }
}

/// Single-use grant to change the password of `email`, issued after OTP verification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResetTicket {
    pub token: String,
    pub email: String,
    pub expires_at: u64,
}

impl ResetTicket {
    pub fn is_expired(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}

/// Editor language of a project or file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Python,
    JavaScript,
    Java,
    Cpp,
    Html,
    PlainText,
}

impl Language {
    pub const ALL: [Language; 6] = [
        Language::Python,
        Language::JavaScript,
        Language::Java,
        Language::Cpp,
        Language::Html,
        Language::PlainText,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Java => "java",
            Language::Cpp => "cpp",
            Language::Html => "html",
            Language::PlainText => "plaintext",
        }
    }

    /// Guess the language from a file name's extension.
    pub fn from_filename(filename: &str) -> Option<Self> {
        let (_, ext) = filename.rsplit_once('.')?;
        match ext.to_ascii_lowercase().as_str() {
            "py" => Some(Language::Python),
            "js" | "mjs" | "cjs" | "jsx" => Some(Language::JavaScript),
            "java" => Some(Language::Java),
            "cpp" | "cc" | "cxx" | "hpp" | "h" => Some(Language::Cpp),
            "html" | "htm" => Some(Language::Html),
            "txt" | "md" => Some(Language::PlainText),
            _ => None,
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "python" | "py" => Ok(Language::Python),
            "javascript" | "js" => Ok(Language::JavaScript),
            "java" => Ok(Language::Java),
            "cpp" | "c++" => Ok(Language::Cpp),
            "html" => Ok(Language::Html),
            "plaintext" | "text" | "txt" => Ok(Language::PlainText),
            other => Err(format!("unsupported language: {other}")),
        }
    }
}

/// A user-owned collection of files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: Uuid,
    pub owner: Uuid,
    pub name: String,
    pub language: Language,
    pub lines_of_code: u64,
    pub files_count: u64,
    pub created_at: u64,
}

impl Project {
    pub fn new(owner: Uuid, name: impl Into<String>, language: Language) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner,
            name: name.into(),
            language,
            lines_of_code: 0,
            files_count: 0,
            created_at: unix_now(),
        }
    }
}

/// A file inside a project, backed by one collaborative document room.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectFile {
    pub id: Uuid,
    pub project_id: Uuid,
    pub filename: String,
    pub language: Language,
    /// Document id used by the sync server.
    pub room_id: Uuid,
    pub lines: u64,
    pub created_at: u64,
}

impl ProjectFile {
    pub fn new(project_id: Uuid, filename: impl Into<String>, language: Language) -> Self {
        Self {
            id: Uuid::new_v4(),
            project_id,
            filename: filename.into(),
            language,
            room_id: Uuid::new_v4(),
            lines: 0,
            created_at: unix_now(),
        }
    }
}

/// What happened in a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ActivityKind {
    ProjectCreated { name: String },
    FileCreated { filename: String },
    FileDeleted { filename: String },
    FileEdited { filename: String, lines: u64 },
}

/// One entry of a project's append-only activity log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEntry {
    pub project_id: Uuid,
    /// Assigned by the store; strictly increasing per project.
    pub sequence: u64,
    pub at: u64,
    /// `None` for system-generated entries (e.g. edits flushed by the sync server).
    pub actor: Option<Uuid>,
    pub kind: ActivityKind,
}
