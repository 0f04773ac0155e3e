use thiserror::Error;

/// Failures a command can surface. Nothing here is fatal to the process;
/// each screen/command isolates its own failure.
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure (connection refused, timeout, bad TLS).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Non-2xx response from the backend.
    #[error("{message} (HTTP {status})")]
    Server { status: u16, message: String },

    /// Session could not be established or renewed; caller should sign in.
    #[error("not signed in: {0}")]
    Unauthenticated(String),

    /// Business "not found": rendered as an explicit empty state.
    #[error("{0} not found")]
    NotFound(String),

    /// Local validation rejected the input before any request was sent.
    #[error("invalid input: {0}")]
    Invalid(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ApiError>;

/// Pull a human message out of an error body. The backend puts one in a
/// `message` field when it has something to say; otherwise fall back to a
/// generic string, matching how sign-in failures are reported.
pub fn server_message(body: &str, fallback: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|v| v.get("message").and_then(|m| m.as_str()).map(String::from))
        .unwrap_or_else(|| fallback.to_string())
}
