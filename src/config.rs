use std::{str::FromStr, time::Duration};

use anyhow::Context;

use crate::{restoration::SeekRetryPolicy, sync::SyncSettings};

#[derive(Debug, Clone)]
pub struct Config {
    pub api_base_url: String,
    pub api_key: String,
    pub db_connection_string: String,
    pub bind_addr: String,
    pub local_save_debounce: Duration,
    pub remote_sync_debounce: Duration,
    pub remote_timeout: Duration,
    pub seek_retry: SeekRetryPolicy,
    pub start_online: bool,
}

const DEFAULT_DB_CONNECTION_STRING: &str = "sqlite://progress.sqlite?mode=rwc";
const DEFAULT_BIND_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_LOCAL_SAVE_DEBOUNCE_MS: u64 = 500;
const DEFAULT_REMOTE_SYNC_DEBOUNCE_MS: u64 = 2000;
const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SEEK_RETRY_ATTEMPTS: u32 = 10;
const DEFAULT_SEEK_RETRY_INTERVAL_MS: u64 = 5000;

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; `load` uses the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let api_base_url = lookup("PROGRESS_API_BASE_URL").unwrap_or_default();
        let api_key = lookup("PROGRESS_API_KEY").unwrap_or_default();
        let db_connection_string = lookup("DB_CONNECTION_STRING")
            .unwrap_or(DEFAULT_DB_CONNECTION_STRING.into());
        let bind_addr = lookup("BIND_ADDR").unwrap_or(DEFAULT_BIND_ADDR.into());

        let millis = |key: &str, default: u64| -> anyhow::Result<Duration> {
            parse_or(&lookup, key, default).map(Duration::from_millis)
        };

        Ok(Config {
            api_base_url,
            api_key,
            db_connection_string,
            bind_addr,
            local_save_debounce: millis("LOCAL_SAVE_DEBOUNCE_MS", DEFAULT_LOCAL_SAVE_DEBOUNCE_MS)?,
            remote_sync_debounce: millis(
                "REMOTE_SYNC_DEBOUNCE_MS",
                DEFAULT_REMOTE_SYNC_DEBOUNCE_MS,
            )?,
            remote_timeout: millis("REMOTE_TIMEOUT_MS", DEFAULT_REMOTE_TIMEOUT_MS)?,
            seek_retry: SeekRetryPolicy {
                max_attempts: parse_or(&lookup, "SEEK_RETRY_ATTEMPTS", DEFAULT_SEEK_RETRY_ATTEMPTS)?,
                interval: millis("SEEK_RETRY_INTERVAL_MS", DEFAULT_SEEK_RETRY_INTERVAL_MS)?,
            },
            start_online: parse_or(&lookup, "START_ONLINE", true)?,
        })
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.api_base_url.is_empty() {
            return Err("PROGRESS_API_BASE_URL is missing".into());
        }
        if self.db_connection_string.is_empty() {
            return Err("DB_CONNECTION_STRING is missing".into());
        }
        if self.remote_timeout.is_zero() {
            return Err("REMOTE_TIMEOUT_MS must be greater than zero".into());
        }
        Ok(())
    }

    pub fn sync_settings(&self) -> SyncSettings {
        SyncSettings {
            local_save_debounce: self.local_save_debounce,
            remote_sync_debounce: self.remote_sync_debounce,
        }
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<T>()
            .with_context(|| format!("Invalid {}: {}", key, raw)),
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> anyhow::Result<Config> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("PROGRESS_API_BASE_URL", "https://books.example.com/api")]).unwrap();
        assert_eq!(config.local_save_debounce, Duration::from_millis(500));
        assert_eq!(config.remote_sync_debounce, Duration::from_millis(2000));
        assert_eq!(config.seek_retry, SeekRetryPolicy::default());
        assert!(config.start_online);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn windows_are_tunable() {
        let config = config_from(&[
            ("PROGRESS_API_BASE_URL", "http://localhost"),
            ("LOCAL_SAVE_DEBOUNCE_MS", "250"),
            ("REMOTE_SYNC_DEBOUNCE_MS", " 5000 "),
            ("START_ONLINE", "false"),
        ])
        .unwrap();
        assert_eq!(config.sync_settings().local_save_debounce, Duration::from_millis(250));
        assert_eq!(config.sync_settings().remote_sync_debounce, Duration::from_millis(5000));
        assert!(!config.start_online);
    }

    #[test]
    fn invalid_number_is_an_error() {
        let err = config_from(&[("LOCAL_SAVE_DEBOUNCE_MS", "soon")]).unwrap_err();
        assert!(err.to_string().contains("LOCAL_SAVE_DEBOUNCE_MS"));
    }

    #[test]
    fn missing_base_url_fails_validation() {
        let config = config_from(&[]).unwrap();
        assert_eq!(
            config.validate(),
            Err("PROGRESS_API_BASE_URL is missing".to_string())
        );
    }
}
