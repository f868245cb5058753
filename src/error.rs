//! Error types for the structured streaming client

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the client
///
/// Only failures that end a turn are represented here. Recoverable conditions
/// (a malformed record line, a delta addressing a missing part, a buffer that is
/// not yet valid JSON, a failing tool call) are logged and dropped where they
/// occur and never reach the caller as an `Err`.
#[derive(Error, Debug)]
pub enum Error {
    /// HTTP request error (connection refused, reset, TLS, ...)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The endpoint answered with a non-2xx status
    #[error("Transport error: HTTP {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, if it could be read
        body: String,
    },

    /// The server finished a response as `failed` or `incomplete`
    #[error("API error: {0}")]
    Api(String),

    /// Streaming error
    #[error("Streaming error: {0}")]
    Stream(String),

    /// Tool registration or execution error
    #[error("Tool execution error: {0}")]
    Tool(String),

    /// Schema or tool descriptor could not be encoded
    #[error("Schema encoding error: {0}")]
    Schema(String),

    /// The model's final output is not valid for the requested schema
    #[error("Structured output error: {0}")]
    Output(String),

    /// No bytes arrived within the idle timeout
    #[error("Request timeout")]
    Timeout,

    /// Other errors
    #[error("Error: {0}")]
    Other(String),
}

impl Error {
    /// Create a new config error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a new transport status error
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Error::Status {
            status,
            body: body.into(),
        }
    }

    /// Create a new API error
    pub fn api(msg: impl Into<String>) -> Self {
        Error::Api(msg.into())
    }

    /// Create a new stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Error::Stream(msg.into())
    }

    /// Create a new tool error
    pub fn tool(msg: impl Into<String>) -> Self {
        Error::Tool(msg.into())
    }

    /// Create a new schema encoding error
    pub fn schema(msg: impl Into<String>) -> Self {
        Error::Schema(msg.into())
    }

    /// Create a new structured output error
    pub fn output(msg: impl Into<String>) -> Self {
        Error::Output(msg.into())
    }

    /// Create a new other error
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Create a timeout error
    pub fn timeout() -> Self {
        Error::Timeout
    }

    /// Whether this error is a transport failure (connection, status, idle timeout).
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Http(_) | Error::Status { .. } | Error::Timeout)
    }
}
