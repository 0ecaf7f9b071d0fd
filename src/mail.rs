//! Transactional email: welcome, verification and password reset messages.
//!
//! Delivery runs on a spawned task after the triggering state change has been
//! committed. A failed delivery is logged and does not fail the request.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;

use crate::error::AppError;

const SENDGRID_ENDPOINT: &str = "https://api.sendgrid.com/v3/mail/send";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EmailKind {
    Welcome,
    Verification { url: String },
    PasswordReset { url: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email {
    pub to: String,
    pub name: String,
    pub kind: EmailKind,
}

impl Email {
    pub fn new(to: impl Into<String>, name: impl Into<String>, kind: EmailKind) -> Self {
        Self {
            to: to.into(),
            name: name.into(),
            kind,
        }
    }

    pub fn subject(&self) -> &'static str {
        match self.kind {
            EmailKind::Welcome => "Welcome to Taskdeck",
            EmailKind::Verification { .. } => "Verify your email address",
            EmailKind::PasswordReset { .. } => "Reset Password",
        }
    }

    pub fn html(&self) -> String {
        let body = match &self.kind {
            EmailKind::Welcome => {
                "<p>Your account is verified. Welcome aboard!</p>".to_string()
            }
            EmailKind::Verification { url } => format!(
                "<p>Thanks for signing up. Click the link below to verify your email address:</p>\
                 <a href=\"{url}\">Verify Email</a>\
                 <p>The link expires in a few minutes.</p>",
                url = url
            ),
            EmailKind::PasswordReset { url } => format!(
                "<p>You have requested a password reset. Click the link below to reset your password:</p>\
                 <a href=\"{url}\">Reset Password</a>\
                 <p>If you didn't request this, please ignore this email.</p>",
                url = url
            ),
        };
        format!(
            "<html><body><h1>{}</h1><p>Hello {},</p>{}</body></html>",
            self.subject(),
            self.name,
            body
        )
    }
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send(&self, email: &Email) -> Result<(), AppError>;
}

/// Delivers through the SendGrid v3 HTTP API.
pub struct SendGridMailer {
    client: reqwest::Client,
    api_key: String,
    from: String,
}

impl SendGridMailer {
    pub fn new(api_key: impl Into<String>, from: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: api_key.into(),
            from: from.into(),
        }
    }
}

#[async_trait]
impl Mailer for SendGridMailer {
    async fn send(&self, email: &Email) -> Result<(), AppError> {
        let payload = json!({
            "personalizations": [{ "to": [{ "email": email.to, "name": email.name }] }],
            "from": { "email": self.from },
            "subject": email.subject(),
            "content": [{ "type": "text/html", "value": email.html() }],
        });

        self.client
            .post(SENDGRID_ENDPOINT)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?
            .error_for_status()?;

        log::info!("Sent '{}' email to {}", email.subject(), email.to);
        Ok(())
    }
}

/// Used when no mail transport is configured. Records the send without the link.
#[derive(Debug, Default)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send(&self, email: &Email) -> Result<(), AppError> {
        log::info!(
            "Mail transport not configured; '{}' email to {} not delivered",
            email.subject(),
            email.to
        );
        Ok(())
    }
}

/// Sends `email` on a background task. Failures are logged.
pub fn dispatch(mailer: Arc<dyn Mailer>, email: Email) {
    tokio::spawn(async move {
        if let Err(e) = mailer.send(&email).await {
            log::error!("Failed to send '{}' email to {}: {}", email.subject(), email.to, e);
        }
    });
}
