//! Error types for the travel API client

use thiserror::Error;

/// Errors that can occur when calling the travel backend
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection, TLS or timeout failure
    #[error("Request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-2xx status
    #[error("API error (status {status}): {message}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Message from the envelope, or the raw body
        message: String,
        /// Provider error code, if the envelope carried one
        code: Option<String>,
    },

    /// Backend answered `success: false`
    #[error("{message}")]
    Rejected {
        /// Message from the envelope
        message: String,
        /// Provider error code, if any
        code: Option<String>,
    },

    /// Response body did not match the expected shape
    #[error("Response parsing failed for {context}: {source}")]
    Decode {
        /// Endpoint being decoded
        context: &'static str,
        /// Underlying JSON error
        #[source]
        source: serde_json::Error,
    },

    /// Successful envelope without the expected `data`
    #[error("Response for {context} carried no data")]
    MissingData {
        /// Endpoint being decoded
        context: &'static str,
    },

    /// Configured base URL is not an absolute http(s) URL
    #[error("Invalid base URL {0:?}")]
    InvalidBaseUrl(String),
}

impl ApiError {
    /// Provider error code, if the backend sent one
    #[must_use]
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Status { code, .. } | Self::Rejected { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    /// Message suitable for showing to the user
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Status { message, .. } | Self::Rejected { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}
