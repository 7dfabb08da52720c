//! Outgoing mail: templates and delivery backends.

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Invalid address '{address}': {reason}")]
    Address { address: String, reason: String },

    #[error("Failed to build message: {0}")]
    Build(String),

    #[error("SMTP transport error: {0}")]
    Transport(String),
}

/// A rendered message with plain-text and HTML bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct Mail {
    pub to: String,
    pub subject: String,
    pub text: String,
    pub html: String,
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, mail: Mail) -> Result<(), MailError>;
}

/// Relay connection settings.
#[derive(Debug, Clone, Deserialize)]
pub struct SmtpSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// `From:` mailbox, e.g. `CodeVerse AI <noreply@example.com>`.
    pub from: String,
}

/// Sends through an SMTP relay upgraded with STARTTLS.
pub struct SmtpMailer {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpMailer {
    pub fn new(settings: &SmtpSettings) -> Result<Self, MailError> {
        let from = parse_mailbox(&settings.from)?;
        let transport = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&settings.host)
            .map_err(|e| MailError::Transport(e.to_string()))?
            .port(settings.port)
            .credentials(Credentials::new(
                settings.username.clone(),
                settings.password.clone(),
            ))
            .build();
        log::info!("SMTP relay {}:{}", settings.host, settings.port);
        Ok(Self { transport, from })
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        let message = Message::builder()
            .from(self.from.clone())
            .to(parse_mailbox(&mail.to)?)
            .subject(mail.subject)
            .multipart(MultiPart::alternative_plain_html(mail.text, mail.html))
            .map_err(|e| MailError::Build(e.to_string()))?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Transport(e.to_string()))?;
        log::info!("Mail sent to {}", mail.to);
        Ok(())
    }
}

/// Logs the envelope instead of sending. Used when no relay is configured.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, mail: Mail) -> Result<(), MailError> {
        // Bodies may carry OTP codes; only the envelope is logged
        log::info!("Mail delivery disabled, dropping '{}' to {}", mail.subject, mail.to);
        Ok(())
    }
}

fn parse_mailbox(address: &str) -> Result<Mailbox, MailError> {
    address.parse().map_err(|e: lettre::address::AddressError| MailError::Address {
        address: address.to_string(),
        reason: e.to_string(),
    })
}

// ─── Templates ────────────────────────────────────────────────────────

pub fn welcome_mail(to: &str, username: &str, dashboard_url: &str) -> Mail {
    let text = format!(
        "Hi {username}, welcome to CodeVerse AI! We're thrilled to have you with us.\n\
         Open your dashboard: {dashboard_url}"
    );
    let html = format!(
        r#"<html>
  <body style="font-family: 'Segoe UI', Arial, sans-serif; background: #f4f6fb;">
    <div style="max-width: 600px; margin: 30px auto; background: #fff; border-radius: 16px;">
      <h1 style="background: #4a90e2; color: #fff; margin: 0; padding: 24px;">Welcome to CodeVerse AI</h1>
      <div style="padding: 30px; color: #444;">
        <p>Hey <b>{username}</b>,</p>
        <p>Your account is ready. Open a project, invite a teammate to the editor
           and ask the assistant whenever you get stuck.</p>
        <p style="text-align: center;">
          <a href="{dashboard_url}" style="background: #4a90e2; color: #fff; padding: 12px 30px;
             border-radius: 8px; text-decoration: none;">Launch Dashboard</a>
        </p>
      </div>
    </div>
  </body>
</html>"#,
        username = html_escape(username),
        dashboard_url = html_escape(dashboard_url),
    );
    Mail {
        to: to.to_string(),
        subject: "Welcome to CodeVerse AI 🚀".to_string(),
        text,
        html,
    }
}

pub fn otp_mail(to: &str, code: &str, valid_minutes: u64) -> Mail {
    let text = format!(
        "Your CodeVerse AI password reset OTP is {code}. It is valid for {valid_minutes} minutes."
    );
    let html = format!(
        r#"<html>
  <body style="font-family: 'Segoe UI', Arial, sans-serif; background: #f4f6fb;">
    <div style="max-width: 480px; margin: 30px auto; background: #fff; border-radius: 16px;">
      <h1 style="background: #6a5acd; color: #fff; margin: 0; padding: 20px;">Password Reset OTP</h1>
      <div style="padding: 24px; color: #444; text-align: center;">
        <p>Your OTP code is:</p>
        <p style="font-size: 32px; letter-spacing: 8px; font-weight: 700;">{code}</p>
        <p>This OTP is valid for <b>{valid_minutes} minutes</b>. If you did not request a
           password reset, you can ignore this email.</p>
      </div>
    </div>
  </body>
</html>"#
    );
    Mail {
        to: to.to_string(),
        subject: "CodeVerse AI - Password Reset OTP".to_string(),
        text,
        html,
    }
}

fn html_escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
