//! Process configuration, read once at startup from the environment.

use crate::rate_limit::RateLimitConfig;

const MIN_SECRET_LEN: usize = 32;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),
    #[error("JWT_SECRET must be at least {MIN_SECRET_LEN} characters long")]
    WeakSecret,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub frontend_url: Option<String>,
    pub database_url: Option<String>,
    /// Emails that receive the `super admin` role when they register.
    pub bootstrap_admin_emails: Vec<String>,
    pub rate_limit: RateLimitConfig,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let secret = get("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?;
        if secret.len() < MIN_SECRET_LEN {
            return Err(ConfigError::WeakSecret);
        }
        let database_url = get("DATABASE_URL");
        if cfg!(feature = "postgres-store") && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        let bootstrap_admin_emails = get("BOOTSTRAP_ADMIN_EMAILS")
            .unwrap_or_default()
            .split(',')
            .map(|s| s.trim().to_ascii_lowercase())
            .filter(|s| !s.is_empty())
            .collect();
        Ok(Self {
            bind_addr: get("BIND_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
            frontend_url: get("FRONTEND_URL"),
            database_url,
            bootstrap_admin_emails,
            rate_limit: RateLimitConfig::from_lookup(&get),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |k: &str| map.get(k).cloned()
    }

    #[test]
    fn secret_is_required() {
        let err = AppConfig::from_lookup(lookup(&[])).unwrap_err();
        assert_eq!(err, ConfigError::Missing("JWT_SECRET"));
    }

    #[test]
    fn short_secret_is_rejected() {
        let err = AppConfig::from_lookup(lookup(&[("JWT_SECRET", "short")])).unwrap_err();
        assert_eq!(err, ConfigError::WeakSecret);
    }

    #[cfg(not(feature = "postgres-store"))]
    #[test]
    fn defaults_and_admin_list() {
        let cfg = AppConfig::from_lookup(lookup(&[
            ("JWT_SECRET", "0123456789abcdef0123456789abcdef"),
            ("BOOTSTRAP_ADMIN_EMAILS", " Root@Example.com, ,ops@example.com"),
        ]))
        .unwrap();
        assert_eq!(cfg.bind_addr, "0.0.0.0:8080");
        assert_eq!(cfg.bootstrap_admin_emails, vec!["root@example.com", "ops@example.com"]);
        assert!(cfg.rate_limit.enabled);
    }
}
