use crate::error::{CloudError, Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{HttpService, dispatch};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Decodes non-2xx bodies into [`CloudError`] so outer policies can inspect
/// the error code without reparsing
#[derive(Clone, Copy, Debug, Default)]
pub struct DecodingLayer;

impl Layer<HttpService> for DecodingLayer {
    type Service = DecodingPolicy;

    fn layer(&self, inner: HttpService) -> Self::Service {
        DecodingPolicy { inner }
    }
}

#[derive(Clone)]
pub struct DecodingPolicy {
    inner: HttpService,
}

impl Service<Request> for DecodingPolicy {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        Box::pin(async move {
            let mut response = dispatch(&mut inner, request).await?;
            if !response.is_success() && response.cloud_error.is_none() {
                response.cloud_error = CloudError::from_body(&response.body);
                if response.cloud_error.is_none() && !response.body.is_empty() {
                    tracing::trace!(
                        "{} response body is not a CloudError",
                        response.status.as_u16()
                    );
                }
            }
            Ok(response)
        })
    }
}
