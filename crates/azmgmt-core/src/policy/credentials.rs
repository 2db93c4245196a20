use crate::credentials::TokenCredential;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{HttpService, dispatch};
use futures::future::BoxFuture;
use reqwest::header::{AUTHORIZATION, HeaderValue};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};

/// Attaches `Authorization: Bearer <token>` to every attempt
#[derive(Clone)]
pub struct CredentialsLayer {
    credential: Arc<dyn TokenCredential>,
}

impl CredentialsLayer {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        Self { credential }
    }
}

impl Layer<HttpService> for CredentialsLayer {
    type Service = CredentialsPolicy;

    fn layer(&self, inner: HttpService) -> Self::Service {
        CredentialsPolicy {
            inner,
            credential: self.credential.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CredentialsPolicy {
    inner: HttpService,
    credential: Arc<dyn TokenCredential>,
}

impl Service<Request> for CredentialsPolicy {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let credential = self.credential.clone();
        Box::pin(async move {
            let token = credential.token().await?;
            let value = HeaderValue::from_str(&format!("Bearer {}", token.token))
                .map_err(|_| Error::Credential("token is not a valid header value".to_string()))?;
            request.headers.insert(AUTHORIZATION, value);
            dispatch(&mut inner, request).await
        })
    }
}
