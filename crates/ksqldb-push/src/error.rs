//! Error types
//!
//! Every failure of a push session is terminal for the call and surfaces as one
//! [`KsqlError`] value. Nothing is retried internally.
//!
//! | Variant | Raised when | Bytes already delivered? |
//! |---------|-------------|--------------------------|
//! | `RequestBuild` | URL join or request construction fails | no |
//! | `Transport` | the streaming request cannot be executed | no |
//! | `Status` | the server answers the streaming request with a non-success status | no |
//! | `Parse` | a line of the body is not valid JSON | possibly |
//! | `Protocol` | a line is valid JSON but neither an object nor an array | possibly |
//! | `StreamInterrupted` | reading the body fails before a clean end of stream | possibly |
//! | `CloseQuery` | the close-query handshake fails after cancellation | possibly |
//! | `Config` | the client configuration is unusable | no |
//! | `Join` | a spawned push session panicked or was aborted | possibly |

use crate::protocol::ServerError;
use reqwest::StatusCode;
use thiserror::Error;

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, KsqlError>;

#[derive(Debug, Error)]
pub enum KsqlError {
    #[error("failed to build request: {0}")]
    RequestBuild(String),

    #[error("failed to execute request: {0}")]
    Transport(#[source] reqwest::Error),

    #[error("{}", status_message(.status, .body, .server))]
    Status {
        status: StatusCode,
        /// Raw body line returned with the status
        body: Vec<u8>,
        /// Decoded ksqlDB error object, when the body carries one
        server: Option<ServerError>,
    },

    #[error("could not parse the response: {source}\n{}", String::from_utf8_lossy(.raw))]
    Parse {
        raw: Vec<u8>,
        #[source]
        source: serde_json::Error,
    },

    #[error("expected a JSON object or array, got: {}", String::from_utf8_lossy(.raw))]
    Protocol { raw: Vec<u8> },

    #[error("response stream interrupted: {0}")]
    StreamInterrupted(#[source] reqwest::Error),

    #[error("failed to close query {query_id:?}: {source}")]
    CloseQuery {
        query_id: String,
        #[source]
        source: Box<KsqlError>,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("push session task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl KsqlError {
    /// Build a status error, decoding the ksqlDB error object from the body when possible.
    pub fn from_status(status: StatusCode, body: Vec<u8>) -> Self {
        let server = serde_json::from_slice::<ServerError>(&body).ok();
        KsqlError::Status {
            status,
            body,
            server,
        }
    }

    /// HTTP status carried by this error, looking through a failed close handshake.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            KsqlError::Status { status, .. } => Some(*status),
            KsqlError::CloseQuery { source, .. } => source.status(),
            _ => None,
        }
    }

    pub fn is_close_query(&self) -> bool {
        matches!(self, KsqlError::CloseQuery { .. })
    }
}

fn status_message(status: &StatusCode, body: &[u8], server: &Option<ServerError>) -> String {
    match server {
        Some(err) => format!(
            "server returned {} (error_code {}): {}",
            status, err.error_code, err.message
        ),
        None if body.is_empty() => format!("server returned {}", status),
        None => format!(
            "server returned {}: {}",
            status,
            String::from_utf8_lossy(body).trim_end()
        ),
    }
}
