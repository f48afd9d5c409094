//! Push session
//!
//! One session drives one push query from request to close:
//!
//! ```text
//! Sending ──> Streaming ──> Done              (clean end of stream)
//!    │            │
//!    │            └──> Cancelling ──> Done    (token fired / receiver dropped)
//!    └──> Cancelling
//! any state ──> Error                         (returned to the caller)
//! ```
//!
//! Every await that can block (sending the request, reading the next body chunk,
//! sending on an output channel) is raced against the cancellation token, with
//! the token polled first. A cancellation therefore never waits for server data
//! or for a slow consumer. On cancellation the remote query is closed with the
//! last captured query id before the output channels are closed.
//!
//! The response body and both channel senders are owned by the session and
//! dropped on every exit path, which is how the caller observes completion.
//! A dropped row receiver ends the query like a cancellation; a dropped header
//! receiver only stops header delivery.

use crate::error::{KsqlError, Result};
use crate::protocol::{CloseQueryPayload, Header, QueryStreamPayload, Row};
use crate::request::RequestFactory;
use crate::stream::{classify, Fragment, LineReader};
use crate::transport::Transport;
use std::fmt;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Sending,
    Streaming,
    Cancelling,
    Done,
    Error,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Sending => write!(f, "sending"),
            SessionState::Streaming => write!(f, "streaming"),
            SessionState::Cancelling => write!(f, "cancelling"),
            SessionState::Done => write!(f, "done"),
            SessionState::Error => write!(f, "error"),
        }
    }
}

/// Why the streaming loop stopped without an error
enum StreamEnd {
    Eof,
    Cancelled,
    RowReceiverDropped,
}

enum Delivery {
    Sent,
    Cancelled,
    ReceiverDropped,
}

pub struct PushSession<'a> {
    transport: &'a dyn Transport,
    requests: &'a RequestFactory,
    cancel: CancellationToken,
    rows: mpsc::Sender<Row>,
    // None once the header receiver is gone
    headers: Option<mpsc::Sender<Header>>,
    header: Header,
    state: SessionState,
}

impl<'a> PushSession<'a> {
    pub fn new(
        transport: &'a dyn Transport,
        requests: &'a RequestFactory,
        cancel: CancellationToken,
        rows: mpsc::Sender<Row>,
        headers: mpsc::Sender<Header>,
    ) -> Self {
        Self {
            transport,
            requests,
            cancel,
            rows,
            headers: Some(headers),
            header: Header::default(),
            state: SessionState::Sending,
        }
    }

    /// Run the session to completion.
    ///
    /// Returns `Ok(())` on a clean end of stream and after a successful close
    /// handshake. Both channels are closed when this returns, whatever the outcome.
    pub async fn run(mut self, sql: &str) -> Result<()> {
        let result = self.drive(sql).await;
        if result.is_err() {
            self.transition(SessionState::Error);
        }
        result
    }

    async fn drive(&mut self, sql: &str) -> Result<()> {
        debug!(state = %self.state, sql, "starting push query");
        let request = self.requests.query_stream(&QueryStreamPayload::latest(sql))?;

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return self.close_remote(StreamEnd::Cancelled).await,
            response = self.transport.execute(request) => response.map_err(KsqlError::Transport)?,
        };

        let status = response.status();
        self.transition(SessionState::Streaming);
        let mut reader = LineReader::new(Box::pin(response.bytes_stream()));

        if !status.is_success() {
            // The server never started the query, so there is nothing to close.
            let body = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => Vec::new(),
                line = reader.next_line() => line.ok().flatten().unwrap_or_default(),
            };
            warn!(%status, "push query rejected by server");
            return Err(KsqlError::from_status(status, body));
        }

        let end = loop {
            let line = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break StreamEnd::Cancelled,
                line = reader.next_line() => line?,
            };

            let Some(line) = line else {
                break StreamEnd::Eof;
            };

            let Some(fragment) = classify(&line)? else {
                continue;
            };

            match self.dispatch(fragment).await {
                Delivery::Sent => {}
                Delivery::Cancelled => break StreamEnd::Cancelled,
                Delivery::ReceiverDropped => break StreamEnd::RowReceiverDropped,
            }
        };

        // Release the connection before talking to the server again.
        drop(reader);

        match end {
            StreamEnd::Eof => {
                self.transition(SessionState::Done);
                info!(query_id = ?self.header.query_id, "push query stream ended");
                Ok(())
            }
            end => self.close_remote(end).await,
        }
    }

    async fn dispatch(&mut self, fragment: Fragment) -> Delivery {
        match fragment {
            Fragment::Header(header) => {
                self.header.merge(header);
                debug!(
                    query_id = ?self.header.query_id,
                    columns = self.header.columns.len(),
                    "received header"
                );
                let Some(sink) = &self.headers else {
                    return Delivery::Sent;
                };
                let delivery = deliver(&self.cancel, sink, self.header.clone()).await;
                if let Delivery::ReceiverDropped = delivery {
                    debug!("header receiver dropped, no further headers will be sent");
                    self.headers = None;
                    return Delivery::Sent;
                }
                delivery
            }
            Fragment::Row(row) => {
                tracing::trace!(values = row.len(), "received row");
                deliver(&self.cancel, &self.rows, row).await
            }
        }
    }

    async fn close_remote(&mut self, end: StreamEnd) -> Result<()> {
        self.transition(SessionState::Cancelling);
        let query_id = self.header.query_id.clone().unwrap_or_default();
        match end {
            StreamEnd::RowReceiverDropped => {
                info!(query_id = %query_id, "row receiver dropped, closing query")
            }
            _ => info!(query_id = %query_id, "push query cancelled, closing query"),
        }

        close_query(self.transport, self.requests, &query_id).await?;

        self.transition(SessionState::Done);
        info!(query_id = %query_id, "query closed");
        Ok(())
    }

    fn transition(&mut self, state: SessionState) {
        debug!(from = %self.state, to = %state, "push session transition");
        self.state = state;
    }
}

async fn deliver<T>(cancel: &CancellationToken, sink: &mpsc::Sender<T>, item: T) -> Delivery {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Delivery::Cancelled,
        sent = sink.send(item) => match sent {
            Ok(()) => Delivery::Sent,
            Err(_) => Delivery::ReceiverDropped,
        },
    }
}

/// Ask the server to terminate a running push query.
///
/// Any failure, including a non-success status, is returned as
/// [`KsqlError::CloseQuery`] wrapping the underlying error.
pub async fn close_query(
    transport: &dyn Transport,
    requests: &RequestFactory,
    query_id: &str,
) -> Result<()> {
    if let Err(source) = send_close(transport, requests, query_id).await {
        warn!(query_id = %query_id, error = %source, "close query failed");
        return Err(KsqlError::CloseQuery {
            query_id: query_id.to_string(),
            source: Box::new(source),
        });
    }
    Ok(())
}

async fn send_close(
    transport: &dyn Transport,
    requests: &RequestFactory,
    query_id: &str,
) -> Result<()> {
    let request = requests.close_query(&CloseQueryPayload::new(query_id))?;
    let response = transport.execute(request).await.map_err(KsqlError::Transport)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.bytes().await.map(|b| b.to_vec()).unwrap_or_default();
        return Err(KsqlError::from_status(status, body));
    }
    Ok(())
}

/// Run one push query, delivering headers and rows until the stream ends,
/// the token is cancelled, or an error occurs.
pub async fn push(
    transport: &dyn Transport,
    requests: &RequestFactory,
    sql: &str,
    cancel: CancellationToken,
    rows: mpsc::Sender<Row>,
    headers: mpsc::Sender<Header>,
) -> Result<()> {
    PushSession::new(transport, requests, cancel, rows, headers)
        .run(sql)
        .await
}
