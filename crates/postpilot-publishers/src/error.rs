use thiserror::Error;

/// Errors that can occur while publishing to a remote platform.
#[derive(Debug, Error)]
pub enum PublishError {
    /// Transport-level failure (connect, TLS, timeout).
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The platform API returned a structured error payload.
    #[error("API error ({code}): {message}")]
    Api { code: i64, message: String },

    /// The credentials were missing or rejected.
    #[error("Authentication failed: {0}")]
    Auth(String),

    /// No adapter is registered under the requested platform name.
    #[error("Platform not supported: {0}")]
    Unsupported(String),

    /// The remote answered with a shape the adapter cannot interpret.
    #[error("Malformed response: {0}")]
    Malformed(String),
}
