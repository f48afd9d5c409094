//! Shared helpers for push-session integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures::Stream;
use ksqldb_push::{ClientConfig, Header, KsqlClient, Row, Transport};
use reqwest::{Request, Response, StatusCode};
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;

pub const TEST_TIMEOUT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

type BodyItem = Result<Bytes, std::io::Error>;

/// Response body fed chunk by chunk from the test; ends when the feeder is dropped.
struct ChannelBody {
    rx: mpsc::UnboundedReceiver<BodyItem>,
}

impl Stream for ChannelBody {
    type Item = BodyItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.rx.poll_recv(cx)
    }
}

/// Write side of a never-ending streaming response
#[derive(Clone)]
pub struct BodyFeeder {
    tx: mpsc::UnboundedSender<BodyItem>,
}

impl BodyFeeder {
    pub fn line(&self, line: &str) {
        let _ = self.tx.send(Ok(Bytes::from(format!("{}\n", line))));
    }

    pub fn raw(&self, bytes: &'static [u8]) {
        let _ = self.tx.send(Ok(Bytes::from_static(bytes)));
    }

    pub fn fail(&self) {
        let _ = self.tx.send(Err(std::io::Error::new(
            std::io::ErrorKind::ConnectionReset,
            "connection reset by peer",
        )));
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub body: String,
}

/// Transport answering `/query-stream` with a test-fed body and
/// `/close-query` with a fixed status, recording every request.
pub struct FakeTransport {
    stream_status: StatusCode,
    close_status: StatusCode,
    body: Mutex<Option<ChannelBody>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl FakeTransport {
    pub fn new() -> (Arc<Self>, BodyFeeder) {
        Self::with_statuses(StatusCode::OK, StatusCode::OK)
    }

    pub fn with_statuses(
        stream_status: StatusCode,
        close_status: StatusCode,
    ) -> (Arc<Self>, BodyFeeder) {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::new(Self {
            stream_status,
            close_status,
            body: Mutex::new(Some(ChannelBody { rx })),
            requests: Mutex::new(Vec::new()),
        });
        (transport, BodyFeeder { tx })
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn close_bodies(&self) -> Vec<String> {
        self.requests()
            .into_iter()
            .filter(|r| r.path == "/close-query")
            .map(|r| r.body)
            .collect()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: Request) -> Result<Response, reqwest::Error> {
        let path = request.url().path().to_string();
        let body = request
            .body()
            .and_then(|b| b.as_bytes())
            .map(|b| String::from_utf8_lossy(b).into_owned())
            .unwrap_or_default();
        self.requests.lock().unwrap().push(RecordedRequest {
            path: path.clone(),
            body,
        });

        let response = if path == "/query-stream" {
            let body = self.body.lock().unwrap().take().expect("query-stream requested twice");
            http::Response::builder()
                .status(self.stream_status)
                .body(reqwest::Body::wrap_stream(body))
                .unwrap()
        } else {
            http::Response::builder()
                .status(self.close_status)
                .body(reqwest::Body::from(Vec::new()))
                .unwrap()
        };
        Ok(Response::from(response))
    }
}

pub fn fake_client(transport: Arc<FakeTransport>) -> KsqlClient {
    KsqlClient::with_transport(ClientConfig::new("http://ksql.test:8088"), transport).unwrap()
}

pub fn channels(
    capacity: usize,
) -> (
    mpsc::Sender<Row>,
    mpsc::Receiver<Row>,
    mpsc::Sender<Header>,
    mpsc::Receiver<Header>,
) {
    let (row_tx, row_rx) = mpsc::channel(capacity);
    let (header_tx, header_rx) = mpsc::channel(capacity);
    (row_tx, row_rx, header_tx, header_rx)
}

/// Drain a receiver until it is closed.
pub async fn drain<T>(rx: &mut mpsc::Receiver<T>) -> Vec<T> {
    let mut items = Vec::new();
    while let Some(item) = rx.recv().await {
        items.push(item);
    }
    items
}
