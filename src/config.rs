use std::path::PathBuf;

use crate::errors::AppError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Production,
    Development,
    Test,
}

impl Environment {
    fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "production" | "prod" => Ok(Self::Production),
            "development" | "dev" | "" => Ok(Self::Development),
            "test" | "testing" => Ok(Self::Test),
            other => Err(AppError::configuration(format!("unknown APP_ENV value: {other}"))),
        }
    }

    pub fn is_production(self) -> bool {
        self == Self::Production
    }
}

/// Application settings read from the environment.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_url: String,
    pub environment: Environment,
    pub mail_from: String,
    pub storage_root: PathBuf,
    pub otp_ttl_minutes: i64,
    pub notification_retention_days: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_url: "http://localhost:8000".to_string(),
            environment: Environment::Development,
            mail_from: "no-reply@localhost".to_string(),
            storage_root: PathBuf::from("./storage"),
            otp_ttl_minutes: 10,
            notification_retention_days: 30,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let defaults = Self::default();

        let app_url = std::env::var("APP_URL")
            .map(|url| url.trim_end_matches('/').to_string())
            .unwrap_or(defaults.app_url);
        let environment = match std::env::var("APP_ENV") {
            Ok(raw) => Environment::parse(&raw)?,
            Err(_) => defaults.environment,
        };
        let mail_from = std::env::var("MAIL_FROM").unwrap_or(defaults.mail_from);
        let storage_root = std::env::var("STORAGE_ROOT")
            .map(PathBuf::from)
            .unwrap_or(defaults.storage_root);
        let otp_ttl_minutes = parse_var("OTP_TTL_MINUTES", defaults.otp_ttl_minutes)?;
        let notification_retention_days =
            parse_var("NOTIFICATION_RETENTION_DAYS", defaults.notification_retention_days)?;

        if otp_ttl_minutes <= 0 {
            return Err(AppError::configuration("OTP_TTL_MINUTES must be positive"));
        }

        Ok(Self {
            app_url,
            environment,
            mail_from,
            storage_root,
            otp_ttl_minutes,
            notification_retention_days,
        })
    }

    /// Public URL of a stored file, `APP_URL/storage/<path>`.
    pub fn media_url(&self, path: &str) -> String {
        format!("{}/storage/{}", self.app_url, path.trim_start_matches('/'))
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match std::env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| AppError::configuration(format!("{name} must be a valid number"))),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_environment_names() {
        assert_eq!(Environment::parse("Production").ok(), Some(Environment::Production));
        assert_eq!(Environment::parse("dev").ok(), Some(Environment::Development));
        assert!(Environment::parse("staging").is_err());
    }

    #[test]
    fn media_url_joins_with_storage_prefix() {
        let config = AppConfig {
            app_url: "https://portal.example.org".into(),
            ..AppConfig::default()
        };
        assert_eq!(
            config.media_url("/media/01-02-2025/a.pdf"),
            "https://portal.example.org/storage/media/01-02-2025/a.pdf"
        );
    }
}
