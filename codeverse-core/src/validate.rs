//! Form validation. Each validator returns the normalized value on success.

use thiserror::Error;

/// Minimum accepted password length in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

const MAX_USERNAME_LEN: usize = 100;
const MAX_EMAIL_LEN: usize = 255;
const MAX_NAME_LEN: usize = 255;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Please enter a valid email address")]
    InvalidEmail,

    #[error("Passwords do not match")]
    PasswordMismatch,

    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    #[error("{field} contains invalid characters")]
    InvalidCharacters { field: &'static str },
}

fn required(value: &str, field: &'static str, max: usize) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::Missing(field));
    }
    if trimmed.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(trimmed.to_string())
}

pub fn validate_username(username: &str) -> Result<String, ValidationError> {
    let name = required(username, "Username", MAX_USERNAME_LEN)?;
    if name.chars().any(char::is_control) {
        return Err(ValidationError::InvalidCharacters { field: "Username" });
    }
    Ok(name)
}

/// Lowercases and trims. Requires a non-empty local part and a dotted domain.
pub fn validate_email(email: &str) -> Result<String, ValidationError> {
    let email = required(email, "Email", MAX_EMAIL_LEN)?.to_lowercase();
    if email.chars().any(char::is_whitespace) {
        return Err(ValidationError::InvalidEmail);
    }
    let Some((local, domain)) = email.split_once('@') else {
        return Err(ValidationError::InvalidEmail);
    };
    let domain_ok = domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && !domain.contains('@');
    if local.is_empty() || !domain_ok {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(email)
}

/// Checks a new password against its confirmation. The password is not trimmed.
pub fn validate_password(password: &str, confirm: &str) -> Result<(), ValidationError> {
    if password.is_empty() {
        return Err(ValidationError::Missing("Password"));
    }
    if confirm.is_empty() {
        return Err(ValidationError::Missing("Password confirmation"));
    }
    if password != confirm {
        return Err(ValidationError::PasswordMismatch);
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_LEN });
    }
    Ok(())
}

pub fn validate_project_name(name: &str) -> Result<String, ValidationError> {
    required(name, "Project name", MAX_NAME_LEN)
}

pub fn validate_filename(filename: &str) -> Result<String, ValidationError> {
    let name = required(filename, "File name", MAX_NAME_LEN)?;
    if name.contains(['/', '\\']) || name.chars().any(char::is_control) || name == "." || name == ".." {
        return Err(ValidationError::InvalidCharacters { field: "File name" });
    }
    Ok(name)
}
