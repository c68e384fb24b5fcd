//! Application configuration from environment variables

use std::env::VarError;
use std::fmt;
use std::time::Duration;
use thiserror::Error;
use tripflow_api::{ClientSettings, InquiryToken};
use tripflow_runtime::RetryPolicy;

/// Default backend base URL
pub const DEFAULT_API_BASE_URL: &str = ClientSettings::DEFAULT_BASE_URL;

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A required variable is not set
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),

    /// A variable is set to a value that does not parse
    #[error("invalid value for {var}: {reason}")]
    InvalidEnvVar {
        /// Variable name
        var: String,
        /// Why the value was rejected
        reason: String,
    },
}

/// Runtime configuration of the booking client
#[derive(Clone, PartialEq, Eq)]
pub struct AppConfig {
    /// `TRIPFLOW_API_BASE_URL`
    pub api_base_url: String,
    /// `TRIPFLOW_AUTH_TOKEN`
    pub auth_token: String,
    /// `TRIPFLOW_INQUIRY_TOKEN`
    pub inquiry_token: Option<InquiryToken>,
    /// `TRIPFLOW_HTTP_TIMEOUT_SECS`
    pub http_timeout: Duration,
    /// `TRIPFLOW_MAX_MANUAL_RETRIES`
    pub max_manual_retries: Option<u32>,
    /// `TRIPFLOW_LOG`, else `RUST_LOG`, else `info`
    pub log_filter: String,
}

impl AppConfig {
    /// Settings of the HTTP client
    #[must_use]
    pub fn client_settings(&self) -> ClientSettings {
        let settings = ClientSettings::new(self.auth_token.clone())
            .with_base_url(self.api_base_url.clone())
            .with_timeout(self.http_timeout);
        match &self.inquiry_token {
            Some(token) => settings.with_inquiry_token(token.clone()),
            None => settings,
        }
    }

    /// Manual retry policy, capped when configured
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        match self.max_manual_retries {
            Some(max) => RetryPolicy::manual_only().with_max_manual_attempts(max),
            None => RetryPolicy::manual_only(),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("api_base_url", &self.api_base_url)
            .field("auth_token", &"<redacted>")
            .field("inquiry_token", &self.inquiry_token)
            .field("http_timeout", &self.http_timeout)
            .field("max_manual_retries", &self.max_manual_retries)
            .field("log_filter", &self.log_filter)
            .finish()
    }
}

/// Load configuration, reading a `.env` file first if there is one
///
/// # Errors
///
/// Returns `ConfigError` if required variables are missing or values are invalid.
pub fn load() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_from_env()
}

/// Load configuration from the process environment only
///
/// # Errors
///
/// Returns `ConfigError` if required variables are missing or values are invalid.
pub fn load_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build configuration from an arbitrary variable lookup
///
/// Blank values count as unset.
///
/// # Errors
///
/// Returns `ConfigError` if required variables are missing or values are invalid.
pub fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, VarError>,
{
    let optional = |var: &str| -> Option<String> {
        lookup(var)
            .ok()
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    };

    let require = |var: &str| -> Result<String, ConfigError> {
        optional(var).ok_or_else(|| ConfigError::MissingEnvVar(var.to_string()))
    };

    let parse_u64 = |var: &str, default: u64| -> Result<u64, ConfigError> {
        optional(var).map_or(Ok(default), |raw| {
            raw.parse::<u64>().map_err(|e| ConfigError::InvalidEnvVar {
                var: var.to_string(),
                reason: e.to_string(),
            })
        })
    };

    let api_base_url = optional("TRIPFLOW_API_BASE_URL").unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string());
    if !(api_base_url.starts_with("http://") || api_base_url.starts_with("https://")) {
        return Err(ConfigError::InvalidEnvVar {
            var: "TRIPFLOW_API_BASE_URL".to_string(),
            reason: "must be an http or https URL".to_string(),
        });
    }

    let auth_token = require("TRIPFLOW_AUTH_TOKEN")?;
    let inquiry_token = optional("TRIPFLOW_INQUIRY_TOKEN").map(InquiryToken::new);

    let timeout_secs = parse_u64("TRIPFLOW_HTTP_TIMEOUT_SECS", 30)?;
    if timeout_secs == 0 {
        return Err(ConfigError::InvalidEnvVar {
            var: "TRIPFLOW_HTTP_TIMEOUT_SECS".to_string(),
            reason: "must be greater than zero".to_string(),
        });
    }

    let max_manual_retries = optional("TRIPFLOW_MAX_MANUAL_RETRIES")
        .map(|raw| {
            raw.parse::<u32>().map_err(|e| ConfigError::InvalidEnvVar {
                var: "TRIPFLOW_MAX_MANUAL_RETRIES".to_string(),
                reason: e.to_string(),
            })
        })
        .transpose()?;

    let log_filter = optional("TRIPFLOW_LOG")
        .or_else(|| optional("RUST_LOG"))
        .unwrap_or_else(|| "info".to_string());

    Ok(AppConfig {
        api_base_url,
        auth_token,
        inquiry_token,
        http_timeout: Duration::from_secs(timeout_secs),
        max_manual_retries,
        log_filter,
    })
}
