//! Signup, login, logout and the password-reset flow.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use codeverse_auth::{OtpIssued, SignupRequest};
use codeverse_core::PublicUser;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::extract::{ApiJson, CurrentUser};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginBody {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct VerifyBody {
    pub email: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
pub struct CompleteBody {
    pub ticket: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
pub struct SessionResponse {
    pub token: String,
    pub expires_at: u64,
    pub user: PublicUser,
}

#[derive(Debug, Serialize)]
pub struct OtpResponse {
    pub email: String,
    pub expires_at: u64,
    pub resend_available_at: u64,
}

impl From<OtpIssued> for OtpResponse {
    fn from(issued: OtpIssued) -> Self {
        Self {
            email: issued.email,
            expires_at: issued.expires_at,
            resend_available_at: issued.resend_available_at,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct TicketResponse {
    pub ticket: String,
    pub expires_at: u64,
}

pub async fn signup(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> Result<(StatusCode, Json<PublicUser>), ApiError> {
    let user = state.auth.signup(request).await?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginBody>,
) -> Result<Json<SessionResponse>, ApiError> {
    let outcome = state.auth.login(&body.email, &body.password).await?;
    Ok(Json(SessionResponse {
        token: outcome.session.token,
        expires_at: outcome.session.expires_at,
        user: outcome.user,
    }))
}

/// Revokes the session and drops its chat conversation.
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<StatusCode, ApiError> {
    state.auth.logout(&current.token).await?;
    state.assistant.forget(&current.token).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn me(current: CurrentUser) -> Json<PublicUser> {
    Json(current.user)
}

pub async fn request_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EmailBody>,
) -> Result<(StatusCode, Json<OtpResponse>), ApiError> {
    let issued = state.auth.request_reset(&body.email).await?;
    Ok((StatusCode::ACCEPTED, Json(issued.into())))
}

pub async fn resend_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<EmailBody>,
) -> Result<(StatusCode, Json<OtpResponse>), ApiError> {
    let issued = state.auth.resend_reset(&body.email).await?;
    Ok((StatusCode::ACCEPTED, Json(issued.into())))
}

pub async fn verify_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<VerifyBody>,
) -> Result<Json<TicketResponse>, ApiError> {
    let ticket = state.auth.verify_reset(&body.email, &body.code).await?;
    Ok(Json(TicketResponse {
        ticket: ticket.token,
        expires_at: ticket.expires_at,
    }))
}

pub async fn complete_reset(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CompleteBody>,
) -> Result<StatusCode, ApiError> {
    state
        .auth
        .complete_reset(&body.ticket, &body.password, &body.confirm_password)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
