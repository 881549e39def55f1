//! Error types for the chat client.

use thiserror::Error;

/// Failure of a single reply stream.
///
/// The widget renders every variant the same way; the distinction only
/// reaches the diagnostic log.
#[derive(Error, Debug)]
pub enum ChatError {
    /// The server answered the initial request with a non-success status.
    #[error("Error fetching stream: {status_text}")]
    Request {
        /// HTTP status code.
        status: u16,
        /// Canonical reason phrase for the status.
        status_text: String,
    },

    /// Reading a chunk of the response body failed.
    #[error("Error reading stream: {0}")]
    StreamRead(String),

    /// The origin or request URL could not be built.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The request could not be sent at all.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The reply was cancelled before the stream finished.
    #[error("Reply cancelled")]
    Cancelled,
}

/// Result type alias for chat operations.
pub type Result<T> = std::result::Result<T, ChatError>;
