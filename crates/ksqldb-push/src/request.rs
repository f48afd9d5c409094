//! HTTP request construction for the push-query endpoints

use crate::config::{redacted, ClientConfig};
use crate::error::{KsqlError, Result};
use crate::protocol::{CloseQueryPayload, QueryStreamPayload};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Request;
use serde::Serialize;
use std::fmt;
use url::Url;

pub const QUERY_STREAM_PATH: &str = "query-stream";
pub const CLOSE_QUERY_PATH: &str = "close-query";

/// Request body media type understood by ksqlDB
pub const KSQL_CONTENT_TYPE: &str = "application/vnd.ksql.v1+json; charset=utf-8";
/// Response media type selecting newline-delimited JSON
pub const DELIMITED_ACCEPT: &str = "application/vnd.ksqlapi.delimited.v1";

/// Builds the streaming-query and close-query requests.
///
/// The `reqwest::Client` is only used as a request builder here; execution
/// goes through a [`Transport`](crate::transport::Transport).
#[derive(Clone)]
pub struct RequestFactory {
    http: reqwest::Client,
    base_url: Url,
    username: Option<String>,
    password: Option<String>,
}

impl fmt::Debug for RequestFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestFactory")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("password", &redacted(self.password.as_deref()))
            .finish_non_exhaustive()
    }
}

impl RequestFactory {
    pub fn new(http: reqwest::Client, config: &ClientConfig) -> Result<Self> {
        config.validate()?;
        let mut base_url = config.url()?;
        // Url::join replaces the last segment unless the path ends with '/'
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        Ok(Self {
            http,
            base_url,
            username: config.username.clone(),
            password: config.password.clone(),
        })
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// POST to `/query-stream` asking for newline-delimited results.
    pub fn query_stream(&self, payload: &QueryStreamPayload) -> Result<Request> {
        self.post(QUERY_STREAM_PATH, DELIMITED_ACCEPT, payload)
    }

    /// POST to `/close-query` terminating a running push query.
    pub fn close_query(&self, payload: &CloseQueryPayload) -> Result<Request> {
        self.post(CLOSE_QUERY_PATH, KSQL_CONTENT_TYPE, payload)
    }

    fn post<T: Serialize>(&self, path: &str, accept: &str, payload: &T) -> Result<Request> {
        let url = self
            .base_url
            .join(path)
            .map_err(|e| KsqlError::RequestBuild(format!("invalid endpoint {}: {}", path, e)))?;
        let body = serde_json::to_vec(payload)
            .map_err(|e| KsqlError::RequestBuild(format!("failed to encode payload: {}", e)))?;

        let mut builder = self
            .http
            .post(url)
            .header(CONTENT_TYPE, KSQL_CONTENT_TYPE)
            .header(ACCEPT, accept)
            .body(body);

        if let Some(username) = &self.username {
            builder = builder.basic_auth(username, self.password.as_deref());
        }

        builder.build().map_err(|e| KsqlError::RequestBuild(e.to_string()))
    }
}
