//! Transport seam
//!
//! Connection management belongs to the HTTP client; sessions only need
//! "execute this request, give me the response".

use crate::config::ClientConfig;
use crate::error::{KsqlError, Result};
use async_trait::async_trait;
use reqwest::{Request, Response};

#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: Request) -> std::result::Result<Response, reqwest::Error>;
}

#[async_trait]
impl Transport for reqwest::Client {
    async fn execute(&self, request: Request) -> std::result::Result<Response, reqwest::Error> {
        reqwest::Client::execute(self, request).await
    }
}

/// HTTP client for push queries: connect timeout only, never a request timeout.
pub fn build_http_client(config: &ClientConfig) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder().connect_timeout(config.connect_timeout());
    if config.http2_prior_knowledge {
        builder = builder.http2_prior_knowledge();
    }
    builder.build().map_err(|e| KsqlError::Config(format!("failed to build http client: {}", e)))
}
