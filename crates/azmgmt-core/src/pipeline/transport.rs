//! reqwest-backed transport at the bottom of the policy chain

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::Service;

/// User agent string for azmgmt HTTP requests
pub const AZMGMT_USER_AGENT: &str = concat!("azmgmt/", env!("CARGO_PKG_VERSION"));

/// Sends a [`Request`] over the network and buffers the whole response
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(AZMGMT_USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;
        Ok(Self { client })
    }

    /// Wrap an existing client (custom TLS, proxies)
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Service<Request> for HttpTransport {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let client = self.client.clone();
        Box::pin(async move {
            let mut builder = client
                .request(request.method, request.url)
                .headers(request.headers);
            if let Some(body) = request.body {
                builder = builder.body(body);
            }

            let response = builder.send().await?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response.bytes().await?.to_vec();
            Ok(Response::new(status, headers, body))
        })
    }
}
