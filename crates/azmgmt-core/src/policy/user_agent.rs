use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{AZMGMT_USER_AGENT, HttpService, dispatch};
use futures::future::BoxFuture;
use reqwest::header::{HeaderValue, USER_AGENT};
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Sets `User-Agent: azmgmt/<version> [suffix]`
#[derive(Clone, Debug)]
pub struct UserAgentLayer {
    value: HeaderValue,
}

impl UserAgentLayer {
    /// An invalid suffix is dropped rather than failing pipeline construction
    pub fn new(suffix: Option<&str>) -> Self {
        let value = suffix
            .map(|suffix| format!("{} {}", AZMGMT_USER_AGENT, suffix.trim()))
            .and_then(|full| HeaderValue::from_str(&full).ok())
            .unwrap_or_else(|| HeaderValue::from_static(AZMGMT_USER_AGENT));
        Self { value }
    }
}

impl Layer<HttpService> for UserAgentLayer {
    type Service = UserAgentPolicy;

    fn layer(&self, inner: HttpService) -> Self::Service {
        UserAgentPolicy {
            inner,
            value: self.value.clone(),
        }
    }
}

#[derive(Clone)]
pub struct UserAgentPolicy {
    inner: HttpService,
    value: HeaderValue,
}

impl Service<Request> for UserAgentPolicy {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        request.headers.insert(USER_AGENT, self.value.clone());
        Box::pin(async move { dispatch(&mut inner, request).await })
    }
}
