//! ksqlDB push-query client

use crate::config::ClientConfig;
use crate::error::Result;
use crate::protocol::{Header, Row};
use crate::request::RequestFactory;
use crate::session;
use crate::transport::{build_http_client, Transport};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Entry point for push queries against one ksqlDB server.
///
/// Cheap to clone; clones share the underlying HTTP connection pool.
#[derive(Clone)]
pub struct KsqlClient {
    config: ClientConfig,
    requests: RequestFactory,
    transport: Arc<dyn Transport>,
}

impl KsqlClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = build_http_client(&config)?;
        let requests = RequestFactory::new(http.clone(), &config)?;
        Ok(Self {
            config,
            requests,
            transport: Arc::new(http),
        })
    }

    /// Client executing requests through a custom transport.
    pub fn with_transport(config: ClientConfig, transport: Arc<dyn Transport>) -> Result<Self> {
        let requests = RequestFactory::new(build_http_client(&config)?, &config)?;
        Ok(Self {
            config,
            requests,
            transport,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env()?)
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Run a push query until the stream ends, `cancel` fires, or an error occurs.
    ///
    /// The header is sent on `headers` (again whenever a later header fragment
    /// extends it), rows on `rows`. Sends wait for channel capacity, so the
    /// caller must keep draining both receivers. Both channels are closed when
    /// this returns. On cancellation the query is closed on the server before
    /// the call returns; a failed close is reported as
    /// [`KsqlError::CloseQuery`](crate::KsqlError::CloseQuery).
    ///
    /// Dropping the row receiver also closes the query. Dropping only the header
    /// receiver keeps rows flowing; later headers are discarded.
    ///
    /// `sql` must already be a valid push query; it is sent as-is.
    pub async fn push(
        &self,
        sql: &str,
        cancel: CancellationToken,
        rows: mpsc::Sender<Row>,
        headers: mpsc::Sender<Header>,
    ) -> Result<()> {
        session::push(
            self.transport.as_ref(),
            &self.requests,
            sql,
            cancel,
            rows,
            headers,
        )
        .await
    }

    /// Spawn a push query on the current tokio runtime.
    ///
    /// `capacity` bounds both output channels.
    pub fn spawn_push(&self, sql: impl Into<String>, capacity: usize) -> PushQuery {
        let (row_tx, rows) = mpsc::channel(capacity);
        let (header_tx, headers) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();

        let client = self.clone();
        let sql = sql.into();
        let token = cancel.clone();
        let span = tracing::info_span!("push_query", base_url = %self.requests.base_url());
        let session = async move { client.push(&sql, token, row_tx, header_tx).await };
        let task = tokio::spawn(session.instrument(span));

        PushQuery {
            headers,
            rows,
            cancel,
            task,
        }
    }

    /// Terminate a running push query by id.
    pub async fn close_query(&self, query_id: &str) -> Result<()> {
        session::close_query(self.transport.as_ref(), &self.requests, query_id).await
    }
}

/// Handle to a spawned push query
pub struct PushQuery {
    pub headers: mpsc::Receiver<Header>,
    pub rows: mpsc::Receiver<Row>,
    cancel: CancellationToken,
    task: JoinHandle<Result<()>>,
}

impl PushQuery {
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Request cancellation without waiting for the session to finish.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the session to finish on its own.
    pub async fn join(self) -> Result<()> {
        self.task.await?
    }

    /// Cancel the query, close it on the server and wait for the session.
    pub async fn close(self) -> Result<()> {
        let PushQuery {
            headers,
            rows,
            cancel,
            task,
        } = self;
        cancel.cancel();
        drop(headers);
        drop(rows);
        task.await?
    }
}
