//! Runtime configuration for the dashboard.
//!
//! Values come from the process environment (the CLI loads `.env` first).
//! Parsing goes through a lookup function so tests can supply a map.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::util::is_http_url;

pub const DEFAULT_RECORDS_TABLE: &str = "parking_restrictions";
pub const DEFAULT_ROLES_TABLE: &str = "users";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone)]
pub struct DashboardConfig {
    pub supabase_url: String,
    pub supabase_anon_key: String,
    pub records_table: String,
    pub roles_table: String,
    pub bulk_data_url: Option<String>,
    pub feed_poll_interval: Duration,
    pub resubscribe_backoff: Duration,
    pub resubscribe_max_backoff: Duration,
    pub http_timeout: Duration,
}

impl fmt::Debug for DashboardConfig {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("DashboardConfig")
            .field("supabase_url", &self.supabase_url)
            .field("supabase_anon_key", &"[REDACTED]")
            .field("records_table", &self.records_table)
            .field("roles_table", &self.roles_table)
            .field("bulk_data_url", &self.bulk_data_url)
            .field("feed_poll_interval", &self.feed_poll_interval)
            .field("resubscribe_backoff", &self.resubscribe_backoff)
            .field("resubscribe_max_backoff", &self.resubscribe_max_backoff)
            .field("http_timeout", &self.http_timeout)
            .finish()
    }
}

impl DashboardConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let values: HashMap<String, String> = env::vars().collect();
        Self::from_lookup(|name| values.get(name).cloned())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let supabase_url = required_trimmed(&lookup, "SUPABASE_URL")?;
        if !is_http_url(&supabase_url) {
            return Err(ConfigError::Invalid(
                "SUPABASE_URL must start with http:// or https://".to_string(),
            ));
        }
        let supabase_url = trim_trailing(&supabase_url).to_string();
        let supabase_anon_key = required_trimmed(&lookup, "SUPABASE_ANON_KEY")?;

        let records_table =
            value_or_default(&lookup, "KERBSIDE_RECORDS_TABLE", DEFAULT_RECORDS_TABLE);
        let roles_table = value_or_default(&lookup, "KERBSIDE_ROLES_TABLE", DEFAULT_ROLES_TABLE);

        let bulk_data_url = optional_trimmed(&lookup, "KERBSIDE_BULK_DATA_URL");
        if let Some(url) = bulk_data_url.as_deref() {
            if !is_http_url(url) {
                return Err(ConfigError::Invalid(
                    "KERBSIDE_BULK_DATA_URL must start with http:// or https://".to_string(),
                ));
            }
        }

        let feed_poll_interval_ms = bounded_u64(
            &lookup,
            "KERBSIDE_FEED_POLL_INTERVAL_MS",
            "2000",
            250..=60_000,
        )?;
        let resubscribe_backoff_ms = bounded_u64(
            &lookup,
            "KERBSIDE_RESUBSCRIBE_BACKOFF_MS",
            "1000",
            100..=60_000,
        )?;
        let resubscribe_max_backoff_ms = bounded_u64(
            &lookup,
            "KERBSIDE_RESUBSCRIBE_MAX_BACKOFF_MS",
            "30000",
            100..=600_000,
        )?;
        if resubscribe_max_backoff_ms < resubscribe_backoff_ms {
            return Err(ConfigError::Invalid(
                "KERBSIDE_RESUBSCRIBE_MAX_BACKOFF_MS must be >= KERBSIDE_RESUBSCRIBE_BACKOFF_MS"
                    .to_string(),
            ));
        }
        let http_timeout_secs = bounded_u64(&lookup, "KERBSIDE_HTTP_TIMEOUT_SECS", "10", 1..=120)?;

        Ok(Self {
            supabase_url,
            supabase_anon_key,
            records_table,
            roles_table,
            bulk_data_url: bulk_data_url.map(|url| trim_trailing(&url).to_string()),
            feed_poll_interval: Duration::from_millis(feed_poll_interval_ms),
            resubscribe_backoff: Duration::from_millis(resubscribe_backoff_ms),
            resubscribe_max_backoff: Duration::from_millis(resubscribe_max_backoff_ms),
            http_timeout: Duration::from_secs(http_timeout_secs),
        })
    }

    /// PostgREST base URL, e.g. `https://project.supabase.co/rest/v1`.
    pub fn rest_url(&self) -> String {
        format!("{}/rest/v1", self.supabase_url)
    }
}

fn bounded_u64(
    lookup: impl Fn(&str) -> Option<String>,
    name: &str,
    default: &str,
    range: std::ops::RangeInclusive<u64>,
) -> Result<u64, ConfigError> {
    let value = value_or_default(lookup, name, default)
        .parse::<u64>()
        .map_err(|_| {
            ConfigError::Invalid(format!(
                "{name} must be an integer in [{}, {}]",
                range.start(),
                range.end()
            ))
        })?;
    if !range.contains(&value) {
        return Err(ConfigError::Invalid(format!(
            "{name} must be in [{}, {}]",
            range.start(),
            range.end()
        )));
    }
    Ok(value)
}

fn value_or_default(lookup: impl Fn(&str) -> Option<String>, name: &str, default: &str) -> String {
    optional_trimmed(lookup, name).unwrap_or_else(|| default.to_string())
}

fn required_trimmed(
    lookup: impl Fn(&str) -> Option<String>,
    name: &'static str,
) -> Result<String, ConfigError> {
    optional_trimmed(lookup, name).ok_or(ConfigError::MissingVar(name))
}

fn optional_trimmed(lookup: impl Fn(&str) -> Option<String>, name: &str) -> Option<String> {
    crate::util::normalize_text_option(lookup(name))
}

fn trim_trailing(value: &str) -> &str {
    value.trim_end_matches('/')
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<DashboardConfig, ConfigError> {
        let map: HashMap<&str, &str> = pairs.iter().copied().collect();
        DashboardConfig::from_lookup(|key| map.get(key).map(|value| (*value).to_string()))
    }

    #[test]
    fn config_requires_supabase_settings() {
        let err = config_from(&[]).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_URL"));

        let err = config_from(&[("SUPABASE_URL", "https://project.supabase.co")]).unwrap_err();
        assert!(err.to_string().contains("SUPABASE_ANON_KEY"));
    }

    #[test]
    fn config_applies_defaults() {
        let config = config_from(&[
            ("SUPABASE_URL", "https://project.supabase.co/"),
            ("SUPABASE_ANON_KEY", "anon"),
        ])
        .unwrap();

        assert_eq!(config.rest_url(), "https://project.supabase.co/rest/v1");
        assert_eq!(config.records_table, DEFAULT_RECORDS_TABLE);
        assert_eq!(config.roles_table, DEFAULT_ROLES_TABLE);
        assert_eq!(config.bulk_data_url, None);
        assert_eq!(config.feed_poll_interval, Duration::from_millis(2000));
        assert_eq!(config.resubscribe_backoff, Duration::from_millis(1000));
        assert_eq!(config.resubscribe_max_backoff, Duration::from_secs(30));
        assert_eq!(config.http_timeout, Duration::from_secs(10));
    }

    #[test]
    fn config_rejects_out_of_range_values() {
        let err = config_from(&[
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("KERBSIDE_FEED_POLL_INTERVAL_MS", "10"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("KERBSIDE_FEED_POLL_INTERVAL_MS"));

        let err = config_from(&[
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("KERBSIDE_RESUBSCRIBE_BACKOFF_MS", "5000"),
            ("KERBSIDE_RESUBSCRIBE_MAX_BACKOFF_MS", "1000"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("MAX_BACKOFF"));
    }

    #[test]
    fn config_rejects_non_http_bulk_url() {
        let err = config_from(&[
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_ANON_KEY", "anon"),
            ("KERBSIDE_BULK_DATA_URL", "ftp://data.example.com"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("KERBSIDE_BULK_DATA_URL"));
    }

    #[test]
    fn config_redacts_anon_key_in_debug() {
        let config = config_from(&[
            ("SUPABASE_URL", "https://project.supabase.co"),
            ("SUPABASE_ANON_KEY", "sensitive-anon-key"),
        ])
        .unwrap();
        let debug_output = format!("{config:?}");
        assert!(!debug_output.contains("sensitive-anon-key"));
        assert!(debug_output.contains("[REDACTED]"));
    }
}
