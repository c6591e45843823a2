use std::env;
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;

/// How the reminder scanner orders the notification and the `reminder_sent` write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeliveryMode {
    /// Notify first, then persist the flag. Concurrent scanners may both notify.
    #[default]
    NotifyThenMark,
    /// Claim the flag with a conditional write, notify only if the claim won.
    ClaimThenNotify,
}

impl DeliveryMode {
    fn parse(value: &str) -> Result<Self, AppError> {
        match value.trim() {
            "notify_then_mark" => Ok(DeliveryMode::NotifyThenMark),
            "claim_then_notify" => Ok(DeliveryMode::ClaimThenNotify),
            other => Err(AppError::Config(format!(
                "REMINDER_DELIVERY_MODE must be notify_then_mark or claim_then_notify, got {}",
                other
            ))),
        }
    }
}

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub scan_interval: Duration,
    pub reminder_endpoint: Option<String>,
    pub dispatch_timeout: Duration,
    pub delivery_mode: DeliveryMode,
    pub admin_emails: Vec<String>,
}

impl AppConfig {
    pub fn new_from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup("DATABASE_URL")
            .unwrap_or_else(|| "sqlite://todos.db?mode=rwc".to_string());

        let bind_addr = lookup("BIND_ADDR")
            .unwrap_or_else(|| "127.0.0.1:3000".to_string())
            .parse::<SocketAddr>()
            .map_err(|e| AppError::Config(format!("BIND_ADDR is invalid: {}", e)))?;

        let scan_interval = Duration::from_secs(parse_secs(&lookup, "REMINDER_SCAN_INTERVAL_SECS", 60)?);
        let dispatch_timeout =
            Duration::from_secs(parse_secs(&lookup, "REMINDER_DISPATCH_TIMEOUT_SECS", 10)?);

        let reminder_endpoint = lookup("REMINDER_ENDPOINT")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty());

        let delivery_mode = match lookup("REMINDER_DELIVERY_MODE") {
            Some(value) => DeliveryMode::parse(&value)?,
            None => DeliveryMode::default(),
        };

        let admin_emails = lookup("ADMIN_EMAILS")
            .map(|list| {
                list.split(',')
                    .map(|s| s.trim().to_lowercase())
                    .filter(|s| !s.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(Self {
            database_url,
            bind_addr,
            scan_interval,
            reminder_endpoint,
            dispatch_timeout,
            delivery_mode,
            admin_emails,
        })
    }
}

fn parse_secs<F>(lookup: &F, key: &str, default: u64) -> Result<u64, AppError>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) => {
            let secs = value
                .trim()
                .parse::<u64>()
                .map_err(|e| AppError::Config(format!("{} is invalid: {}", key, e)))?;
            if secs == 0 {
                return Err(AppError::Config(format!("{} must be greater than zero", key)));
            }
            Ok(secs)
        }
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, AppError> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.scan_interval, Duration::from_secs(60));
        assert_eq!(config.bind_addr.port(), 3000);
        assert_eq!(config.reminder_endpoint, None);
        assert_eq!(config.delivery_mode, DeliveryMode::NotifyThenMark);
        assert!(config.admin_emails.is_empty());
    }

    #[test]
    fn reads_overrides() {
        let config = config_from(&[
            ("REMINDER_SCAN_INTERVAL_SECS", "5"),
            ("REMINDER_ENDPOINT", "https://example.com/remind"),
            ("REMINDER_DELIVERY_MODE", "claim_then_notify"),
            ("ADMIN_EMAILS", "Root@Example.com, ops@example.com ,"),
        ])
        .unwrap();
        assert_eq!(config.scan_interval, Duration::from_secs(5));
        assert_eq!(config.reminder_endpoint.as_deref(), Some("https://example.com/remind"));
        assert_eq!(config.delivery_mode, DeliveryMode::ClaimThenNotify);
        assert_eq!(
            config.admin_emails,
            vec!["root@example.com".to_string(), "ops@example.com".to_string()]
        );
    }

    #[test]
    fn rejects_bad_values() {
        assert!(config_from(&[("REMINDER_SCAN_INTERVAL_SECS", "0")]).is_err());
        assert!(config_from(&[("BIND_ADDR", "nowhere")]).is_err());
        assert!(config_from(&[("REMINDER_DELIVERY_MODE", "twice")]).is_err());
    }
}
