//! Daemon configuration.
//!
//! All values are read from the environment exactly once at startup into an
//! immutable [`DaemonConfig`] that is passed by reference to each component
//! constructor. No component reads ambient process state directly, and there
//! is no hot reload.

use crate::error::{DaemonError, Result};
use serde::{Deserialize, Serialize};

/// Top-level configuration for the daemon.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DaemonConfig {
    /// Report recipient and spending limit.
    pub report: ReportConfig,
    /// When the daily job fires and how long a run may take.
    pub schedule: ScheduleConfig,
    /// Control surface bind address.
    pub server: ServerConfig,
    /// Plaid aggregator credentials.
    pub plaid: PlaidConfig,
    /// Twilio messaging credentials and addresses.
    pub twilio: TwilioConfig,
}

/// Recipient name and daily limit interpolated into the report message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Name used in the message greeting.
    pub recipient_name: String,
    /// Daily spending limit in dollars.
    pub daily_limit: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            recipient_name: "Friend".to_owned(),
            daily_limit: 100.0,
        }
    }
}

/// Job timing configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    /// Hour of day the report job fires (0-23, UTC).
    pub hour: u8,
    /// Minute of hour (0-59).
    pub min: u8,
    /// Deadline for a single run, in seconds. A run exceeding it is
    /// cancelled and recorded as failed.
    pub run_timeout_secs: u64,
    /// Interval between process-health log lines, in seconds.
    pub health_log_interval_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            hour: 8,
            min: 0,
            run_timeout_secs: 300,
            health_log_interval_secs: 60,
        }
    }
}

/// Control surface bind address.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Bind host.
    pub host: String,
    /// Bind port.
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_owned(),
            port: 3000,
        }
    }
}

/// Plaid aggregator credentials.
///
/// Empty credential strings are tolerated at startup; the client reports a
/// config error when a fetch is actually attempted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaidConfig {
    /// Plaid API base URL (derived from `PLAID_ENV`).
    pub base_url: String,
    /// Plaid client ID.
    pub client_id: String,
    /// Plaid secret.
    pub secret: String,
    /// Access token for the linked bank item.
    pub access_token: String,
}

impl Default for PlaidConfig {
    fn default() -> Self {
        Self {
            base_url: "https://sandbox.plaid.com".to_owned(),
            client_id: String::new(),
            secret: String::new(),
            access_token: String::new(),
        }
    }
}

/// Twilio messaging credentials and the raw notification addresses.
///
/// Address strings are kept raw here; the notifier derives the candidate
/// format variants at send time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TwilioConfig {
    /// Twilio API base URL.
    pub base_url: String,
    /// Account SID.
    pub account_sid: String,
    /// Auth token.
    pub auth_token: String,
    /// SMS sender number.
    pub sms_from: String,
    /// SMS destination number.
    pub sms_to: String,
    /// WhatsApp sender number (raw, with or without `whatsapp:` prefix).
    pub whatsapp_from: String,
    /// WhatsApp destination number (raw).
    pub whatsapp_to: String,
}

impl Default for TwilioConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.twilio.com".to_owned(),
            account_sid: String::new(),
            auth_token: String::new(),
            sms_from: String::new(),
            sms_to: String::new(),
            whatsapp_from: String::new(),
            whatsapp_to: String::new(),
        }
    }
}

impl DaemonConfig {
    /// Build the configuration from the process environment.
    ///
    /// Missing optional values fall back to defaults; malformed numeric
    /// values are a startup error rather than a silent fallback.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Some(name) = env_string("YOUR_NAME") {
            config.report.recipient_name = name;
        }
        if let Some(limit) = env_parse::<f64>("DAILY_SPENDING_LIMIT")? {
            config.report.daily_limit = limit;
        }

        if let Some(hour) = env_parse::<u8>("SCHEDULE_HOUR")? {
            if hour > 23 {
                return Err(DaemonError::Config(format!(
                    "SCHEDULE_HOUR must be 0-23, got {hour}"
                )));
            }
            config.schedule.hour = hour;
        }
        if let Some(min) = env_parse::<u8>("SCHEDULE_MINUTE")? {
            if min > 59 {
                return Err(DaemonError::Config(format!(
                    "SCHEDULE_MINUTE must be 0-59, got {min}"
                )));
            }
            config.schedule.min = min;
        }
        if let Some(secs) = env_parse::<u64>("RUN_TIMEOUT_SECS")? {
            config.schedule.run_timeout_secs = secs;
        }
        if let Some(secs) = env_parse::<u64>("HEALTH_LOG_INTERVAL_SECS")? {
            config.schedule.health_log_interval_secs = secs;
        }

        if let Some(host) = env_string("HOST") {
            config.server.host = host;
        }
        if let Some(port) = env_parse::<u16>("PORT")? {
            config.server.port = port;
        }

        config.plaid.base_url = plaid_base_url(env_string("PLAID_ENV").as_deref())?;
        if let Some(v) = env_string("PLAID_CLIENT_ID") {
            config.plaid.client_id = v;
        }
        if let Some(v) = env_string("PLAID_SECRET") {
            config.plaid.secret = v;
        }
        if let Some(v) = env_string("PLAID_ACCESS_TOKEN") {
            config.plaid.access_token = v;
        }

        if let Some(v) = env_string("TWILIO_ACCOUNT_SID") {
            config.twilio.account_sid = v;
        }
        if let Some(v) = env_string("TWILIO_AUTH_TOKEN") {
            config.twilio.auth_token = v;
        }
        if let Some(v) = env_string("TWILIO_PHONE_NUMBER") {
            config.twilio.sms_from = v;
        }
        if let Some(v) = env_string("YOUR_PHONE_NUMBER") {
            config.twilio.sms_to = v;
        }
        if let Some(v) = env_string("TWILIO_WHATSAPP_FROM") {
            config.twilio.whatsapp_from = v;
        }
        if let Some(v) = env_string("YOUR_WHATSAPP_NUMBER") {
            config.twilio.whatsapp_to = v;
        }

        Ok(config)
    }
}

/// Map a `PLAID_ENV` value onto the matching API base URL.
fn plaid_base_url(env: Option<&str>) -> Result<String> {
    match env.map(str::trim) {
        None | Some("") | Some("sandbox") => Ok("https://sandbox.plaid.com".to_owned()),
        Some("development") => Ok("https://development.plaid.com".to_owned()),
        Some("production") => Ok("https://production.plaid.com".to_owned()),
        Some(other) => Err(DaemonError::Config(format!(
            "unknown PLAID_ENV '{other}' (expected sandbox, development or production)"
        ))),
    }
}

/// Read a non-empty environment string.
fn env_string(key: &str) -> Option<String> {
    match std::env::var(key) {
        Ok(value) if !value.trim().is_empty() => Some(value.trim().to_owned()),
        _ => None,
    }
}

/// Read and parse an environment value, erroring on malformed input.
fn env_parse<T: std::str::FromStr>(key: &str) -> Result<Option<T>> {
    let Some(raw) = env_string(key) else {
        return Ok(None);
    };
    raw.parse::<T>()
        .map(Some)
        .map_err(|_| DaemonError::Config(format!("cannot parse {key}='{raw}'")))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used)]

    use super::*;

    #[test]
    fn defaults_cover_every_section() {
        let config = DaemonConfig::default();
        assert_eq!(config.report.recipient_name, "Friend");
        assert!((config.report.daily_limit - 100.0).abs() < f64::EPSILON);
        assert_eq!(config.schedule.hour, 8);
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.plaid.base_url, "https://sandbox.plaid.com");
    }

    #[test]
    fn plaid_base_url_maps_environments() {
        assert_eq!(
            plaid_base_url(Some("production")).unwrap(),
            "https://production.plaid.com"
        );
        assert_eq!(
            plaid_base_url(Some("development")).unwrap(),
            "https://development.plaid.com"
        );
        assert_eq!(
            plaid_base_url(None).unwrap(),
            "https://sandbox.plaid.com"
        );
        assert!(plaid_base_url(Some("staging")).is_err());
    }

    #[test]
    fn config_serde_round_trip() {
        let config = DaemonConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: DaemonConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.report.recipient_name, "Friend");
        assert_eq!(restored.twilio.base_url, "https://api.twilio.com");
    }
}
