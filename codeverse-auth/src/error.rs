use codeverse_core::ValidationError;
use codeverse_store::StoreError;
use thiserror::Error;

use crate::mail::MailError;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("Email already registered")]
    EmailTaken,

    #[error("No account found with this email")]
    AccountNotFound,

    #[error("Invalid password")]
    InvalidPassword,

    #[error("Session is invalid or expired")]
    InvalidSession,

    #[error("No active OTP found, request a new one")]
    NoActiveOtp,

    #[error("OTP has expired, request a new one")]
    OtpExpired,

    #[error("Invalid OTP")]
    InvalidOtp,

    #[error("Please wait {remaining_secs}s before requesting a new OTP")]
    Cooldown { remaining_secs: u64 },

    #[error("Reset ticket is invalid or expired")]
    InvalidTicket,

    #[error("Could not deliver email: {0}")]
    MailDelivery(#[from] MailError),

    #[error("Password hashing failed: {0}")]
    Hashing(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
