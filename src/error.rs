//! Error types.

use thiserror::Error;

/// Extract the message from a provider error envelope.
///
/// Recognized shapes:
/// - `{"error": {"message": "..."}}` (OpenAI and most compatible servers)
/// - `{"error": "..."}`
///
/// Returns `None` for anything else, including valid JSON that is not an envelope.
#[must_use]
pub fn extract_error_message(body: &[u8]) -> Option<String> {
    let json: serde_json::Value = serde_json::from_slice(body).ok()?;
    let error = json.get("error")?;

    if let Some(msg) = error.get("message").and_then(|v| v.as_str()) {
        return Some(msg.to_string());
    }

    error.as_str().map(String::from)
}

/// Fallback message for a non-2xx response without an error envelope.
///
/// Always contains the numeric status so callers can match on it in logs.
#[must_use]
pub(crate) fn status_message(status: reqwest::StatusCode, body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if text.is_empty() {
        format!("HTTP {status}")
    } else {
        format!("HTTP {status}: {text}")
    }
}

#[derive(Debug, Error)]
pub enum Error {
    /// Transport-level failure: DNS, TLS, connection reset, timeout.
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The provider rejected the request or reported an application-level error.
    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    /// The response body did not match the expected schema.
    #[error("Decoding error: {0}")]
    Decoding(#[source] serde_json::Error),

    /// A streamed payload could not be parsed. Aborts the stream.
    #[error("Stream error: {0}")]
    Stream(String),

    /// The consumer withdrew before completion.
    #[error("Cancelled")]
    Cancelled,

    #[error("Failed to encode request: {0}")]
    Encoding(#[source] serde_json::Error),

    #[error("Missing API key. Set one of: {}", env_vars.join(", "))]
    MissingApiKey { env_vars: Vec<String> },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Whether the error reflects a caller-initiated abort.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// HTTP status carried by the error, if any.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
