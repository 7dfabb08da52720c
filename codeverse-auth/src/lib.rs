//! # codeverse-auth — Accounts, sessions and password reset
//!
//! ```text
//! signup ──► validate ──► argon2id hash ──► AppStore ──► welcome mail
//! login  ──► verify hash ──► record login day ──► Session token
//!
//! request_reset ──► OTP (6 digits, 5 min) ──► mail
//! verify_reset  ──► OTP consumed ──► ResetTicket (10 min, single use)
//! complete_reset ──► new hash ──► all sessions revoked
//! ```
//!
//! Passwords, OTP codes and tokens are never logged.

mod clock;
mod error;
mod mail;
mod password;
mod service;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::AuthError;
pub use mail::{otp_mail, welcome_mail, LogMailer, Mail, MailError, Mailer, SmtpMailer, SmtpSettings};
pub use password::PasswordHasher;
pub use service::{AuthConfig, AuthService, LoginOutcome, OtpIssued, SignupRequest};
