//! # codeverse-store — RocksDB persistence for accounts and projects
//!
//! ```text
//! ┌──────────────┐           ┌────────────────────────────────────────┐
//! │ AuthService  │──────────►│ AppStore (RocksDB)                     │
//! │ HTTP API     │           │                                        │
//! └──────────────┘           │ CF "users"     user_id → User          │
//!                            │ CF "emails"    email → user_id         │
//!                            │ CF "sessions"  token → Session         │
//!                            │ CF "otp"       email → OtpRecord       │
//!                            │ CF "tickets"   token → ResetTicket     │
//!                            │ CF "logins"    user_id:day → ()        │
//!                            │ CF "projects"  project_id → Project    │
//!                            │ CF "owners"    owner:project_id → ()   │
//!                            │ CF "files"     file_id → ProjectFile   │
//!                            │ CF "members"   project_id:file_id → () │
//!                            │ CF "rooms"     room_id → file_id       │
//!                            │ CF "activity"  project_id:seq → Entry  │
//!                            └────────────────────────────────────────┘
//! ```
//!
//! Values are bincode-encoded. Multi-key updates go through one `WriteBatch`
//! so indexes never disagree with their primary rows.

mod accounts;
mod error;
mod projects;
mod rocks;

pub use accounts::OtpCheck;
pub use error::StoreError;
pub use rocks::{AppStore, StoreConfig};
