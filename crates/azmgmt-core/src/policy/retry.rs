use crate::config::RetryConfig;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{HttpService, dispatch};
use futures::future::BoxFuture;
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::{debug, warn};

/// Status codes worth another attempt. 429 is left to the throttling policy.
fn is_retryable_status(status: u16) -> bool {
    matches!(status, 408 | 500 | 502 | 503 | 504)
}

/// Retries transport failures and transient server errors with exponential
/// backoff
#[derive(Clone)]
pub struct RetryLayer {
    config: RetryConfig,
}

impl RetryLayer {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }
}

impl Layer<HttpService> for RetryLayer {
    type Service = RetryPolicy;

    fn layer(&self, inner: HttpService) -> Self::Service {
        RetryPolicy {
            inner,
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct RetryPolicy {
    inner: HttpService,
    config: RetryConfig,
}

impl Service<Request> for RetryPolicy {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let config = self.config.clone();
        Box::pin(async move {
            let max_attempts = config.max_attempts.max(1);
            let mut attempt = 1;
            loop {
                let delay = match dispatch(&mut inner, request.clone()).await {
                    Ok(response) => {
                        let status = response.status.as_u16();
                        if !is_retryable_status(status) || attempt >= max_attempts {
                            return Ok(response);
                        }
                        let hinted = if status == 503 {
                            response.retry_after_secs().map(Duration::from_secs)
                        } else {
                            None
                        };
                        let delay = hinted.unwrap_or_else(|| config.backoff_for(attempt));
                        warn!(
                            "{} {} returned {}, retrying in {:?} (attempt {}/{})",
                            request.method,
                            request.url.path(),
                            status,
                            delay,
                            attempt,
                            max_attempts
                        );
                        delay
                    }
                    Err(Error::Transport(message)) => {
                        if attempt >= max_attempts {
                            return Err(Error::Connectivity {
                                attempts: attempt,
                                message,
                            });
                        }
                        let delay = config.backoff_for(attempt);
                        debug!(
                            "Transport failure on attempt {}/{}: {}; retrying in {:?}",
                            attempt, max_attempts, message, delay
                        );
                        delay
                    }
                    Err(e) => return Err(e),
                };
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tower::util::BoxCloneSyncService;
    use tower::{ServiceExt, service_fn};

    fn scripted(statuses: Vec<u16>, calls: Arc<AtomicU32>) -> HttpService {
        BoxCloneSyncService::new(service_fn(move |_req: Request| {
            let n = calls.fetch_add(1, Ordering::SeqCst) as usize;
            let status = statuses[n.min(statuses.len() - 1)];
            async move {
                Ok::<_, Error>(Response::new(
                    StatusCode::from_u16(status).unwrap(),
                    HeaderMap::new(),
                    Vec::new(),
                ))
            }
        }))
    }

    fn request() -> Request {
        Request::parse(reqwest::Method::GET, "https://example.test/r").unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_server_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryLayer::new(RetryConfig::default())
            .layer(scripted(vec![503, 500, 200], calls.clone()));

        let response = policy.oneshot(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_returns_last_response_when_exhausted() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy =
            RetryLayer::new(RetryConfig::default()).layer(scripted(vec![502], calls.clone()));

        let response = policy.oneshot(request()).await.unwrap();
        assert_eq!(response.status, StatusCode::BAD_GATEWAY);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_retries_throttling_or_client_errors() {
        for status in [429, 404, 409] {
            let calls = Arc::new(AtomicU32::new(0));
            let policy = RetryLayer::new(RetryConfig::default())
                .layer(scripted(vec![status], calls.clone()));
            let response = policy.oneshot(request()).await.unwrap();
            assert_eq!(response.status.as_u16(), status);
            assert_eq!(calls.load(Ordering::SeqCst), 1);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_transport_failures_become_connectivity_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let inner = BoxCloneSyncService::new(service_fn(move |_req: Request| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move { Err::<Response, _>(Error::Transport("connection refused".to_string())) }
        }));
        let policy = RetryLayer::new(RetryConfig::default()).layer(inner);

        let err = policy.oneshot(request()).await.unwrap_err();
        match err {
            Error::Connectivity { attempts, message } => {
                assert_eq!(attempts, 3);
                assert!(message.contains("refused"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_honours_retry_after_on_503() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let inner = BoxCloneSyncService::new(service_fn(move |_req: Request| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move {
                let mut headers = HeaderMap::new();
                if n == 0 {
                    headers.insert("retry-after", "7".parse().unwrap());
                    return Ok::<_, Error>(Response::new(
                        StatusCode::SERVICE_UNAVAILABLE,
                        headers,
                        Vec::new(),
                    ));
                }
                Ok(Response::new(StatusCode::OK, headers, Vec::new()))
            }
        }));
        let policy = RetryLayer::new(RetryConfig::default()).layer(inner);

        let start = tokio::time::Instant::now();
        policy.oneshot(request()).await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(7));
    }
}
