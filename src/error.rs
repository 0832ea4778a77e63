use thiserror::Error;

/// A specialized `Result` type for the SSI API client crate.
pub type Result<T> = std::result::Result<T, Error>;

/// The error type for the SSI API client crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or invalid client configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A caller-supplied argument had the wrong shape. Raised before any
    /// network I/O takes place.
    #[error("validation error: {0}")]
    Validation(String),

    /// The server answered with a non-200 status. `message` has already
    /// been resolved by the status classifier.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("request error: {0}")]
    Request(#[from] reqwest::Error),

    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("websocket connect timed out")]
    ConnectTimeout,

    #[error("serde JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("message error: {0}")]
    Message(String),
}

impl Error {
    /// HTTP status of a classified API error, if this is one.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api { status, .. } => Some(*status),
            _ => None,
        }
    }
}
