//! # codeverse-core — Domain model for CodeVerse
//!
//! Shared entities and pure logic used by every other crate:
//!
//! - [`model`] — users, sessions, OTP records, projects, files, activity
//! - [`validate`] — input validation and normalization for forms
//! - [`dashboard`] — statistics aggregation, login streaks, coding tips, editor links
//!
//! Nothing in this crate performs I/O.

pub mod dashboard;
pub mod model;
pub mod validate;

pub use dashboard::{
    current_streak, file_editor_link, quick_room_link, sample_tips, CodingTip, DashboardStats,
    CODING_TIPS,
};
pub use model::{
    unix_now, ActivityEntry, ActivityKind, Language, OtpRecord, Project, ProjectFile, PublicUser,
    ResetTicket, Session, User,
};
pub use validate::{
    validate_email, validate_filename, validate_password, validate_project_name,
    validate_username, ValidationError, MIN_PASSWORD_LEN,
};
