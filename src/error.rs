//! Error types for Pilot

use thiserror::Error;

/// Result type alias for Pilot operations
pub type Result<T> = std::result::Result<T, Error>;

/// Message fragments the provider uses when a request is too large.
const SIZE_LIMIT_PATTERNS: &[&str] = &[
    "prompt is too long",
    "request too large",
    "maximum context length",
    "too many tokens",
    "context window",
];

/// Message fragments the provider uses when tool_use/tool_result blocks don't pair up.
const PAIRING_PATTERNS: &[&str] = &[
    "unexpected `tool_use_id` found in `tool_result` blocks",
    "each `tool_result` block must have a corresponding `tool_use` block",
    "`tool_use` ids were found without `tool_result` blocks",
];

/// Errors that can occur in Pilot
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Request exceeds the provider size limit: {0}")]
    SizeLimit(String),

    #[error("Provider rejected tool pairing: {0}")]
    Pairing(String),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("tool not found: {0}")]
    UnknownTool(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Build an error from a non-success provider response.
    ///
    /// Size-limit and pairing rejections get their own variants so the
    /// retry executor can reset history instead of retrying blindly.
    pub fn from_api_response(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();

        if status == 413 || SIZE_LIMIT_PATTERNS.iter().any(|p| lower.contains(p)) {
            Error::SizeLimit(message)
        } else if PAIRING_PATTERNS.iter().any(|p| lower.contains(p)) {
            Error::Pairing(message)
        } else {
            Error::Api { status, message }
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}
