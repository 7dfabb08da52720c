use codeverse_core::{
    validate_email, validate_password, validate_username, OtpRecord, PublicUser, ResetTicket,
    Session, User, ValidationError,
};
use codeverse_store::{AppStore, OtpCheck, StoreError};
use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::clock::Clock;
use crate::error::AuthError;
use crate::mail::{otp_mail, welcome_mail, Mailer};
use crate::password::PasswordHasher;

/// Lifetimes and limits of the auth flows. All durations in seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    pub session_ttl_secs: u64,
    pub otp_ttl_secs: u64,
    pub otp_resend_cooldown_secs: u64,
    /// Wrong codes allowed before the OTP is discarded.
    pub otp_max_attempts: u32,
    pub reset_ticket_ttl_secs: u64,
    /// How often the server sweeps expired sessions.
    pub session_purge_interval_secs: u64,
    /// Linked from the welcome mail.
    pub dashboard_url: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 24 * 60 * 60,
            otp_ttl_secs: 300,
            otp_resend_cooldown_secs: 30,
            otp_max_attempts: 5,
            reset_ticket_ttl_secs: 600,
            session_purge_interval_secs: 15 * 60,
            dashboard_url: "http://localhost:8080".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub session: Session,
    pub user: PublicUser,
}

/// Returned after an OTP was stored and mailed.
#[derive(Debug, Clone, PartialEq)]
pub struct OtpIssued {
    pub email: String,
    pub expires_at: u64,
    pub resend_available_at: u64,
}

/// Signup, login, sessions and the OTP password-reset flow.
pub struct AuthService {
    store: Arc<AppStore>,
    mailer: Arc<dyn Mailer>,
    clock: Arc<dyn Clock>,
    hasher: PasswordHasher,
    config: AuthConfig,
}

impl AuthService {
    pub fn new(
        store: Arc<AppStore>,
        mailer: Arc<dyn Mailer>,
        clock: Arc<dyn Clock>,
        hasher: PasswordHasher,
        config: AuthConfig,
    ) -> Self {
        Self {
            store,
            mailer,
            clock,
            hasher,
            config,
        }
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    // ─── Accounts ─────────────────────────────────────────────────────

    /// Create an account. A failed welcome mail does not fail the signup.
    pub async fn signup(&self, request: SignupRequest) -> Result<PublicUser, AuthError> {
        let username = validate_username(&request.username)?;
        let email = validate_email(&request.email)?;
        validate_password(&request.password, &request.confirm_password)?;

        if self.store.find_user_by_email(&email)?.is_some() {
            return Err(AuthError::EmailTaken);
        }

        let hash = self.hasher.hash(&request.password)?;
        let mut user = User::new(username, email, hash);
        user.created_at = self.clock.now();
        self.store.insert_user(&user).map_err(|e| match e {
            StoreError::Conflict(_) => AuthError::EmailTaken,
            other => AuthError::Store(other),
        })?;
        log::info!("New account {} ({})", user.id, user.username);

        let mail = welcome_mail(&user.email, &user.username, &self.config.dashboard_url);
        if let Err(e) = self.mailer.send(mail).await {
            log::warn!("Welcome mail to {} failed: {e}", user.email);
        }

        Ok(user.public())
    }

    /// Check credentials, record today's login and open a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email)?;
        if password.is_empty() {
            return Err(ValidationError::Missing("password").into());
        }

        let user = self
            .store
            .find_user_by_email(&email)?
            .ok_or(AuthError::AccountNotFound)?;
        if !self.hasher.verify(password, &user.password_hash)? {
            log::info!("Failed login for {}", user.id);
            return Err(AuthError::InvalidPassword);
        }

        self.store.record_login(user.id, self.clock.today())?;

        let now = self.clock.now();
        let session = Session {
            token: random_token(),
            user_id: user.id,
            created_at: now,
            expires_at: now + self.config.session_ttl_secs,
        };
        self.store.put_session(&session)?;
        log::info!("User {} logged in", user.id);

        Ok(LoginOutcome {
            session,
            user: user.public(),
        })
    }

    pub async fn logout(&self, token: &str) -> Result<(), AuthError> {
        if !self.store.delete_session(token)? {
            return Err(AuthError::InvalidSession);
        }
        Ok(())
    }

    /// Resolve a bearer token to its user. Expired sessions are deleted.
    pub fn authenticate(&self, token: &str) -> Result<PublicUser, AuthError> {
        let session = self
            .store
            .get_session(token)?
            .ok_or(AuthError::InvalidSession)?;
        if session.is_expired(self.clock.now()) {
            self.store.delete_session(token)?;
            return Err(AuthError::InvalidSession);
        }
        let user = self
            .store
            .get_user(session.user_id)?
            .ok_or(AuthError::InvalidSession)?;
        Ok(user.public())
    }

    pub fn purge_expired_sessions(&self) -> Result<usize, AuthError> {
        let purged = self.store.purge_expired_sessions(self.clock.now())?;
        if purged > 0 {
            log::debug!("Purged {purged} expired sessions");
        }
        Ok(purged)
    }

    // ─── Password reset ───────────────────────────────────────────────

    /// Issue and mail a fresh OTP for a registered email.
    pub async fn request_reset(&self, email: &str) -> Result<OtpIssued, AuthError> {
        let email = normalize_email(email)?;
        if self.store.find_user_by_email(&email)?.is_none() {
            return Err(AuthError::AccountNotFound);
        }
        self.issue_otp(email).await
    }

    /// Like [`request_reset`](Self::request_reset), but refuses inside the cooldown window.
    pub async fn resend_reset(&self, email: &str) -> Result<OtpIssued, AuthError> {
        let email = normalize_email(email)?;
        if let Some(existing) = self.store.get_otp(&email)? {
            let remaining_secs = existing.cooldown_remaining(self.clock.now());
            if remaining_secs > 0 {
                return Err(AuthError::Cooldown { remaining_secs });
            }
        }
        self.request_reset(&email).await
    }

    /// Check a code. Success consumes the OTP and yields a reset ticket.
    pub async fn verify_reset(&self, email: &str, code: &str) -> Result<ResetTicket, AuthError> {
        let email = normalize_email(email)?;
        let now = self.clock.now();

        let max_attempts = self.config.otp_max_attempts;
        match self.store.check_otp(&email, code.trim(), now, max_attempts)? {
            OtpCheck::Missing => return Err(AuthError::NoActiveOtp),
            OtpCheck::Expired => return Err(AuthError::OtpExpired),
            OtpCheck::Mismatch { attempts, discarded } => {
                if discarded {
                    log::warn!("OTP for {email} discarded after {attempts} failed attempts");
                }
                return Err(AuthError::InvalidOtp);
            }
            OtpCheck::Accepted(_) => {}
        }

        let ticket = ResetTicket {
            token: random_token(),
            email,
            expires_at: now + self.config.reset_ticket_ttl_secs,
        };
        self.store.put_ticket(&ticket)?;
        log::info!("OTP verified for {}", ticket.email);
        Ok(ticket)
    }

    /// Set a new password with a ticket from [`verify_reset`](Self::verify_reset).
    ///
    /// The ticket survives a validation failure, so the user can retry.
    pub async fn complete_reset(
        &self,
        ticket: &str,
        password: &str,
        confirm: &str,
    ) -> Result<(), AuthError> {
        validate_password(password, confirm)?;

        let ticket = self
            .store
            .take_ticket(ticket)?
            .ok_or(AuthError::InvalidTicket)?;
        if ticket.is_expired(self.clock.now()) {
            return Err(AuthError::InvalidTicket);
        }

        let hash = self.hasher.hash(password)?;
        if !self.store.update_password(&ticket.email, &hash)? {
            return Err(AuthError::AccountNotFound);
        }
        self.store.clear_otp(&ticket.email)?;
        self.store.clear_tickets_for(&ticket.email)?;

        if let Some(user) = self.store.find_user_by_email(&ticket.email)? {
            let revoked = self.store.delete_user_sessions(user.id)?;
            log::info!("Password reset for {}, {revoked} sessions revoked", user.id);
        }
        Ok(())
    }

    async fn issue_otp(&self, email: String) -> Result<OtpIssued, AuthError> {
        let now = self.clock.now();
        let record = OtpRecord {
            email: email.clone(),
            code: generate_otp(),
            issued_at: now,
            expires_at: now + self.config.otp_ttl_secs,
            resend_available_at: now + self.config.otp_resend_cooldown_secs,
            attempts: 0,
        };
        self.store.save_otp(&record)?;

        let minutes = (self.config.otp_ttl_secs / 60).max(1);
        if let Err(e) = self.mailer.send(otp_mail(&email, &record.code, minutes)).await {
            log::error!("OTP mail to {email} failed: {e}");
            self.store.clear_otp(&email)?;
            return Err(e.into());
        }

        log::info!("OTP issued for {email}");
        Ok(OtpIssued {
            email,
            expires_at: record.expires_at,
            resend_available_at: record.resend_available_at,
        })
    }
}

fn normalize_email(email: &str) -> Result<String, AuthError> {
    let email = email.trim().to_lowercase();
    if email.is_empty() {
        return Err(ValidationError::Missing("email").into());
    }
    Ok(email)
}

/// Six decimal digits, never starting with zero.
fn generate_otp() -> String {
    rand::thread_rng().gen_range(100_000..=999_999u32).to_string()
}

/// 32 random bytes, hex-encoded.
fn random_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}
