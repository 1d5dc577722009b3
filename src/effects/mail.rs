//! Outgoing mail.
//!
//! Messages are built here and handed to a [`MailTransport`]. Outside
//! production the mailer logs the message and skips delivery.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::config::AppConfig;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to send email: {0}")]
    SendFailed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailMessage {
    pub to: String,
    pub to_name: Option<String>,
    pub subject: String,
    pub body_text: String,
}

#[async_trait]
pub trait MailTransport: Send + Sync {
    fn name(&self) -> &'static str;

    async fn deliver(&self, from: &str, message: &EmailMessage) -> Result<(), MailError>;
}

/// Writes messages to the log instead of a mail server.
pub struct LogTransport;

#[async_trait]
impl MailTransport for LogTransport {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn deliver(&self, from: &str, message: &EmailMessage) -> Result<(), MailError> {
        info!(
            to = %message.to,
            to_name = ?message.to_name,
            from = %from,
            subject = %message.subject,
            "email (log transport)"
        );
        debug!(body_text = %message.body_text, "email body");
        Ok(())
    }
}

#[derive(Clone)]
pub struct Mailer {
    from: String,
    delivers: bool,
    transport: Arc<dyn MailTransport>,
}

impl Mailer {
    pub fn new(config: &AppConfig) -> Self {
        Self::with_transport(config, Arc::new(LogTransport))
    }

    pub fn with_transport(config: &AppConfig, transport: Arc<dyn MailTransport>) -> Self {
        Self {
            from: config.mail_from.clone(),
            delivers: config.environment.is_production(),
            transport,
        }
    }

    pub async fn send(&self, message: &EmailMessage) -> Result<(), MailError> {
        if !message.to.contains('@') {
            return Err(MailError::InvalidAddress(message.to.clone()));
        }

        if !self.delivers {
            debug!(to = %message.to, subject = %message.subject, "mail delivery disabled outside production");
            return Ok(());
        }

        self.transport.deliver(&self.from, message).await
    }

    pub fn verification_message(to: &str, to_name: Option<&str>, otp: &str, ttl_minutes: i64) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            to_name: to_name.map(String::from),
            subject: "Verify your email address".to_string(),
            body_text: format!(
                "Hi{name},\n\nYour verification code is {otp}. It expires in {ttl_minutes} minutes.\n\n\
                 If you did not create an account you can ignore this email.",
                name = greeting_name(to_name),
            ),
        }
    }

    pub fn password_reset_message(to: &str, to_name: Option<&str>, otp: &str, ttl_minutes: i64) -> EmailMessage {
        EmailMessage {
            to: to.to_string(),
            to_name: to_name.map(String::from),
            subject: "Reset your password".to_string(),
            body_text: format!(
                "Hi{name},\n\nUse the code {otp} to reset your password. It expires in {ttl_minutes} minutes.\n\n\
                 If you did not ask for a reset you can ignore this email.",
                name = greeting_name(to_name),
            ),
        }
    }
}

fn greeting_name(name: Option<&str>) -> String {
    name.filter(|n| !n.trim().is_empty())
        .map(|n| format!(" {}", n.trim()))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Environment;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting(Arc<AtomicUsize>);

    #[async_trait]
    impl MailTransport for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn deliver(&self, _from: &str, _message: &EmailMessage) -> Result<(), MailError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn config(environment: Environment) -> AppConfig {
        AppConfig {
            environment,
            ..AppConfig::default()
        }
    }

    #[tokio::test]
    async fn only_production_delivers() {
        let sent = Arc::new(AtomicUsize::new(0));
        let message = Mailer::verification_message("ada@example.com", Some("Ada"), "123456", 10);

        let dev = Mailer::with_transport(&config(Environment::Development), Arc::new(Counting(sent.clone())));
        dev.send(&message).await.expect("dev send");
        assert_eq!(sent.load(Ordering::SeqCst), 0);

        let prod = Mailer::with_transport(&config(Environment::Production), Arc::new(Counting(sent.clone())));
        prod.send(&message).await.expect("prod send");
        assert_eq!(sent.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn messages_carry_the_code() {
        let message = Mailer::password_reset_message("ada@example.com", None, "654321", 10);
        assert!(message.body_text.contains("654321"));
        assert!(message.body_text.starts_with("Hi,"));
    }
}
