//! HTTP error mapping. Every failure leaves the API as `{"error": "..."}`.

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use codeverse_ai::AiError;
use codeverse_auth::AuthError;
use codeverse_collab::DocStoreError;
use codeverse_core::ValidationError;
use codeverse_store::StoreError;
use serde_json::json;
use thiserror::Error;

pub const MAIL_UNAVAILABLE: &str = "Could not send the email, please try again later";
pub const AI_UNAVAILABLE: &str = "The AI assistant is unavailable right now";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{message}")]
    TooManyRequests { message: String, retry_after_secs: u64 },

    /// The AI API or the mail relay failed. `detail` is only logged.
    #[error("{message}")]
    Upstream { message: &'static str, detail: String },

    /// Logged in full, answered with a generic message.
    #[error("{0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::TooManyRequests { .. } => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Upstream { .. } => StatusCode::BAD_GATEWAY,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Internal(detail) => {
                log::error!("Internal error: {detail}");
                "Internal server error".to_string()
            }
            ApiError::Upstream { message, detail } => {
                log::warn!("Upstream failure: {detail}");
                message.to_string()
            }
            other => other.to_string(),
        };

        let mut response = (status, Json(json!({ "error": message }))).into_response();
        if let ApiError::TooManyRequests { retry_after_secs, .. } = self {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(retry_after_secs));
        }
        response
    }
}

impl From<ValidationError> for ApiError {
    fn from(e: ValidationError) -> Self {
        ApiError::BadRequest(e.to_string())
    }
}

impl From<StoreError> for ApiError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound { kind, .. } => ApiError::NotFound(format!("{kind} not found")),
            StoreError::Conflict(detail) => ApiError::Conflict(detail),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl From<DocStoreError> for ApiError {
    fn from(e: DocStoreError) -> Self {
        ApiError::Internal(e.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::Validation(e) => e.into(),
            AuthError::Store(e) => e.into(),
            AuthError::EmailTaken => ApiError::Conflict(e.to_string()),
            AuthError::AccountNotFound => ApiError::NotFound(e.to_string()),
            AuthError::InvalidPassword | AuthError::InvalidSession => {
                ApiError::Unauthorized(e.to_string())
            }
            AuthError::NoActiveOtp
            | AuthError::OtpExpired
            | AuthError::InvalidOtp
            | AuthError::InvalidTicket => ApiError::BadRequest(e.to_string()),
            AuthError::Cooldown { remaining_secs } => ApiError::TooManyRequests {
                message: e.to_string(),
                retry_after_secs: remaining_secs,
            },
            AuthError::MailDelivery(_) => ApiError::Upstream {
                message: MAIL_UNAVAILABLE,
                detail: e.to_string(),
            },
            AuthError::Hashing(_) => ApiError::Internal(e.to_string()),
        }
    }
}

impl From<AiError> for ApiError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::EmptyPrompt => ApiError::BadRequest(e.to_string()),
            AiError::MissingApiKey
            | AiError::Upstream { .. }
            | AiError::EmptyResponse
            | AiError::Http(_) => ApiError::Upstream {
                message: AI_UNAVAILABLE,
                detail: e.to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use codeverse_auth::MailError;

    #[test]
    fn test_auth_error_statuses() {
        let cases = [
            (AuthError::EmailTaken, StatusCode::CONFLICT),
            (AuthError::AccountNotFound, StatusCode::NOT_FOUND),
            (AuthError::InvalidPassword, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidSession, StatusCode::UNAUTHORIZED),
            (AuthError::InvalidOtp, StatusCode::BAD_REQUEST),
            (AuthError::Cooldown { remaining_secs: 12 }, StatusCode::TOO_MANY_REQUESTS),
            (AuthError::Hashing("bad".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status(), status);
        }
    }

    #[test]
    fn test_store_errors() {
        let missing = StoreError::NotFound { kind: "file", id: "x".into() };
        assert!(matches!(ApiError::from(missing), ApiError::NotFound(m) if m == "file not found"));
        assert_eq!(ApiError::from(StoreError::LockPoisoned).status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_upstream_ai_errors() {
        let err = AiError::Upstream { status: 503, body: "busy".into() };
        assert_eq!(ApiError::from(err).status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ApiError::from(AiError::EmptyPrompt).status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_upstream_detail_stays_in_logs() {
        let err = AiError::Upstream { status: 401, body: "invalid key sk-live-1234".into() };
        let response = ApiError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(body, json!({ "error": AI_UNAVAILABLE }));

        let mail = AuthError::MailDelivery(MailError::Transport("535 auth failed for relay-user".into()));
        let response = ApiError::from(mail).into_response();
        let body = axum::body::to_bytes(response.into_body(), 4096).await.unwrap();
        assert!(!String::from_utf8_lossy(&body).contains("relay-user"));
    }

    #[test]
    fn test_cooldown_sets_retry_after() {
        let response = ApiError::from(AuthError::Cooldown { remaining_secs: 7 }).into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "7");
    }

    #[test]
    fn test_internal_detail_hidden() {
        let response = ApiError::Internal("disk on fire".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
