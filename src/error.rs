//! Error taxonomy shared by the backend client, forms, poller and storage.
//!
//! Every variant is scoped to a single operation; none of them terminates the console.

use crate::model::Notice;
use thiserror::Error;

/// Client-side validation failures. No request is issued when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("{field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
    #[error("filter is not a valid JSON object: {0}")]
    InvalidFilter(String),
    #[error("file not found: {0}")]
    NoSuchFile(String),
}

#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error(transparent)]
    Validation(#[from] FormError),
    /// Network or HTTP failure. `message` is the server's own message when it sent one.
    #[error("{message}")]
    Request {
        status: Option<u16>,
        message: String,
    },
    #[error("status poll failed: {0}")]
    Poll(String),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ConsoleError {
    pub fn request(status: Option<u16>, message: impl Into<String>) -> Self {
        ConsoleError::Request {
            status,
            message: message.into(),
        }
    }

    /// Map the error to the notice the operator should see.
    pub fn to_notice(&self) -> Notice {
        match self {
            ConsoleError::Validation(e) => Notice::warning(e.to_string()),
            other => Notice::error(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for ConsoleError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            return ConsoleError::Decode(e.to_string());
        }
        ConsoleError::Request {
            status: e.status().map(|s| s.as_u16()),
            message: e.to_string(),
        }
    }
}

/// Pull a human-readable message out of an error response body.
///
/// Prefers the `detail`, `message` or `error` field of a JSON body and falls back to the
/// raw text. FastAPI validation errors carry `detail` as a list; their `msg` fields are joined.
pub fn server_message(body: &str) -> Option<String> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(v) = serde_json::from_str::<serde_json::Value>(trimmed) {
        for key in ["detail", "message", "error"] {
            match v.get(key) {
                Some(serde_json::Value::String(s)) if !s.is_empty() => return Some(s.clone()),
                Some(serde_json::Value::Array(items)) => {
                    let msgs: Vec<&str> = items
                        .iter()
                        .filter_map(|i| i.get("msg").and_then(|m| m.as_str()))
                        .collect();
                    if !msgs.is_empty() {
                        return Some(msgs.join("; "));
                    }
                }
                _ => {}
            }
        }
    }
    Some(trimmed.to_string())
}
