//! ksqldb-push - streaming push-query client for ksqlDB
//!
//! Issues a push query over HTTP, reads the newline-delimited JSON response
//! indefinitely and delivers the schema header and every result row on two
//! caller-owned channels. Cancelling the supplied token stops the stream and
//! asks the server to close the query.
//!
//! ```ignore
//! use ksqldb_push::{ClientConfig, KsqlClient};
//! use tokio::sync::mpsc;
//! use tokio_util::sync::CancellationToken;
//!
//! let client = KsqlClient::new(ClientConfig::new("http://localhost:8088"))?;
//! let (row_tx, mut rows) = mpsc::channel(64);
//! let (header_tx, mut headers) = mpsc::channel(4);
//! let cancel = CancellationToken::new();
//!
//! let session = client.push(
//!     "SELECT * FROM PAGEVIEWS EMIT CHANGES;",
//!     cancel.clone(),
//!     row_tx,
//!     header_tx,
//! );
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod request;
pub mod session;
pub mod stream;
pub mod transport;

pub use client::{KsqlClient, PushQuery};
pub use config::ClientConfig;
pub use error::{KsqlError, Result};
pub use protocol::{Column, Header, Row};
pub use session::{PushSession, SessionState};
pub use stream::{classify, Fragment};
pub use tokio_util::sync::CancellationToken;
pub use transport::Transport;
