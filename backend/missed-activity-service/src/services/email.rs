use crate::config::SmtpConfig;
use crate::error::{AppError, Result};
use lettre::message::{header, Mailbox, Message};
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Tokio1Executor};
use std::sync::Arc;
use tracing::{info, warn};

/// Async email transport wrapper (SMTP or no-op)
#[derive(Clone)]
pub struct EmailService {
    transport: Option<Arc<AsyncSmtpTransport<Tokio1Executor>>>,
    from: Mailbox,
}

impl EmailService {
    /// If the SMTP host is empty, operates in no-op mode (logs only).
    pub fn new(config: &SmtpConfig) -> Result<Self> {
        let from = config
            .from
            .parse::<Mailbox>()
            .map_err(|e| AppError::Config(format!("Invalid SMTP_FROM address: {}", e)))?;

        let transport = if config.host.trim().is_empty() {
            warn!("SMTP host not configured; email service will operate in no-op mode");
            None
        } else {
            let builder = if config.starttls {
                AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
            } else {
                AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
            }
            .map_err(|e| AppError::Config(format!("Failed to configure SMTP transport: {}", e)))?
            .port(config.port);

            let builder = if !config.username.is_empty() {
                builder.credentials(Credentials::new(
                    config.username.clone(),
                    config.password.clone(),
                ))
            } else {
                builder
            };

            Some(Arc::new(builder.build()))
        };

        Ok(Self { transport, from })
    }

    pub fn is_enabled(&self) -> bool {
        self.transport.is_some()
    }

    pub async fn send_mail(&self, recipient: &str, subject: &str, body: &str) -> Result<()> {
        if let Some(transport) = &self.transport {
            let to = recipient
                .parse::<Mailbox>()
                .map_err(|e| AppError::Email(format!("Invalid recipient email address: {}", e)))?;

            let email = Message::builder()
                .from(self.from.clone())
                .to(to)
                .subject(subject)
                .header(header::ContentType::TEXT_PLAIN)
                .body(body.to_string())
                .map_err(|e| AppError::Email(format!("Failed to build email message: {}", e)))?;

            transport
                .send(email)
                .await
                .map_err(|e| AppError::Email(format!("Failed to send email: {}", e)))?;
            info!(subject, "email sent successfully");
        } else {
            info!(
                subject,
                recipient, "Email service running in no-op mode; skipping actual send"
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn smtp(host: &str, from: &str) -> SmtpConfig {
        SmtpConfig {
            host: host.into(),
            port: 587,
            username: String::new(),
            password: String::new(),
            from: from.into(),
            starttls: true,
        }
    }

    #[tokio::test]
    async fn test_noop_mode_sends_nothing() {
        let service = EmailService::new(&smtp("", "noreply@example.com")).unwrap();
        assert!(!service.is_enabled());
        service
            .send_mail("user@example.com", "subject", "body")
            .await
            .unwrap();
    }

    #[test]
    fn test_invalid_from_rejected() {
        let err = EmailService::new(&smtp("", "not an address")).err().unwrap();
        assert!(matches!(err, AppError::Config(_)));
    }
}
