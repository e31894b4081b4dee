//! Custom error types for docchat

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Canned guidance shown instead of raw transport messages
pub const NETWORK_GUIDANCE: &str = "Network error. Please check your connection and try again.";
pub const UNAUTHORIZED_GUIDANCE: &str = "You need to log in to access this feature.";
pub const FORBIDDEN_GUIDANCE: &str = "You don't have permission to perform this action.";

/// Main error type for docchat operations
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    /// Transport-level failure: no response was received
    #[error("{detail}")]
    Network { code: ErrorCode, detail: String },

    /// The backend answered with a non-success status
    #[error("{}", .detail.message())]
    Api {
        status: u16,
        code: Option<String>,
        detail: ErrorDetail,
    },

    /// Input rejected before any backend call
    #[error("{0}")]
    Validation(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    #[error("Not logged in: run 'docchat login' first")]
    NotAuthenticated,

    #[error("No active session")]
    NoActiveSession,

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn network(code: ErrorCode, detail: impl Into<String>) -> Self {
        Error::Network {
            code,
            detail: detail.into(),
        }
    }

    /// Machine-readable code, when the failure carries one
    pub fn code(&self) -> Option<&str> {
        match self {
            Error::Network { code, .. } => Some(code.as_str()),
            Error::Api { code, .. } => code.as_deref(),
            _ => None,
        }
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Error::Network { .. })
    }

    /// Friendly message for notifications
    pub fn user_message(&self) -> String {
        match self {
            Error::Network { .. } => NETWORK_GUIDANCE.to_string(),
            Error::Api { status: 401, .. } => UNAUTHORIZED_GUIDANCE.to_string(),
            Error::Api { status: 403, .. } => FORBIDDEN_GUIDANCE.to_string(),
            other => friendly_message(&other.to_string()),
        }
    }
}

/// Replace well-known failure messages with guidance text
pub fn friendly_message(message: &str) -> String {
    let lower = message.to_lowercase();
    if lower.contains("network") {
        NETWORK_GUIDANCE.to_string()
    } else if lower.contains("unauthorized") {
        UNAUTHORIZED_GUIDANCE.to_string()
    } else if lower.contains("forbidden") {
        FORBIDDEN_GUIDANCE.to_string()
    } else {
        message.to_string()
    }
}

/// Machine-readable codes for transport failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    NetworkError,
    UploadError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::NetworkError => "NETWORK_ERROR",
            ErrorCode::UploadError => "UPLOAD_ERROR",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error body returned by the backend
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorBody {
    pub detail: ErrorDetail,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// `detail` is either a plain message or a list of field-level validation errors
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum ErrorDetail {
    Message(String),
    Fields(Vec<FieldError>),
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct FieldError {
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub loc: Vec<serde_json::Value>,
    #[serde(default)]
    pub msg: Option<String>,
}

impl ErrorDetail {
    /// Flatten the detail into one display string
    pub fn message(&self) -> String {
        match self {
            ErrorDetail::Message(message) => message.clone(),
            ErrorDetail::Fields(fields) => match fields.as_slice() {
                [] => "An error occurred".to_string(),
                [single] => single
                    .msg
                    .clone()
                    .unwrap_or_else(|| "Validation error".to_string()),
                many => many
                    .iter()
                    .filter_map(|field| field.msg.as_deref())
                    .collect::<Vec<_>>()
                    .join(", "),
            },
        }
    }
}

/// Result type alias for docchat
pub type Result<T> = std::result::Result<T, Error>;
