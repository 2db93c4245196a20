use crate::config::HttpLogDetailLevel;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{HttpService, dispatch};
use futures::future::BoxFuture;
use reqwest::header::HeaderMap;
use std::task::{Context, Poll};
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, trace, warn};

/// Maximum body length to log (to avoid huge log entries)
const MAX_LOG_BODY_LENGTH: usize = 1000;

/// Headers whose values never reach the log
const REDACTED_HEADERS: &[&str] = &["authorization", "cookie", "set-cookie"];

fn sanitize_for_log(body: &[u8]) -> String {
    let text = String::from_utf8_lossy(body);
    let truncated = if text.len() > MAX_LOG_BODY_LENGTH {
        let mut end = MAX_LOG_BODY_LENGTH;
        while !text.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &text[..end], body.len())
    } else {
        text.into_owned()
    };
    truncated.replace(|c: char| c.is_control() && c != ' ', "")
}

fn format_headers(headers: &HeaderMap) -> String {
    headers
        .iter()
        .map(|(name, value)| {
            let shown = if REDACTED_HEADERS.contains(&name.as_str()) {
                "<redacted>"
            } else {
                value.to_str().unwrap_or("<binary>")
            };
            format!("{}: {}", name, shown)
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Logs each exchange at the configured detail level
#[derive(Clone, Copy, Debug)]
pub struct HttpLoggingLayer {
    level: HttpLogDetailLevel,
}

impl HttpLoggingLayer {
    pub fn new(level: HttpLogDetailLevel) -> Self {
        Self { level }
    }
}

impl Layer<HttpService> for HttpLoggingLayer {
    type Service = HttpLoggingPolicy;

    fn layer(&self, inner: HttpService) -> Self::Service {
        HttpLoggingPolicy {
            inner,
            level: self.level,
        }
    }
}

#[derive(Clone)]
pub struct HttpLoggingPolicy {
    inner: HttpService,
    level: HttpLogDetailLevel,
}

impl Service<Request> for HttpLoggingPolicy {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let level = self.level;
        Box::pin(async move {
            if level == HttpLogDetailLevel::None {
                return dispatch(&mut inner, request).await;
            }

            let method = request.method.clone();
            let url = request.url.clone();
            let context = request.logging_context.clone().unwrap_or_default();
            debug!("--> {} {} {}", method, url, context);
            if matches!(level, HttpLogDetailLevel::Headers | HttpLogDetailLevel::Body) {
                trace!("Request headers: {}", format_headers(&request.headers));
            }
            if level == HttpLogDetailLevel::Body
                && let Some(body) = &request.body
            {
                trace!("Request body: {}", sanitize_for_log(body));
            }

            let start = Instant::now();
            let result = dispatch(&mut inner, request).await;
            let elapsed = start.elapsed();

            match &result {
                Ok(response) => {
                    debug!(
                        "<-- {} {} {} ({} ms)",
                        response.status.as_u16(),
                        method,
                        url,
                        elapsed.as_millis()
                    );
                    if matches!(level, HttpLogDetailLevel::Headers | HttpLogDetailLevel::Body) {
                        trace!("Response headers: {}", format_headers(&response.headers));
                    }
                    if level == HttpLogDetailLevel::Body && !response.body.is_empty() {
                        trace!("Response body: {}", sanitize_for_log(&response.body));
                    }
                }
                Err(e) => warn!("<-- {} {} failed after {:?}: {}", method, url, elapsed, e),
            }
            result
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::HeaderValue;

    #[test]
    fn test_sanitize_truncates_on_char_boundary() {
        let body = "é".repeat(MAX_LOG_BODY_LENGTH);
        let logged = sanitize_for_log(body.as_bytes());
        assert!(logged.contains("[truncated, 2000 bytes total]"));
    }

    #[test]
    fn test_sanitize_strips_control_characters() {
        assert_eq!(sanitize_for_log(b"{\"a\":\n1}\r"), "{\"a\":1}");
    }

    #[test]
    fn test_authorization_is_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer secret"));
        headers.insert("x-ms-request-id", HeaderValue::from_static("req-1"));
        let formatted = format_headers(&headers);
        assert!(!formatted.contains("secret"));
        assert!(formatted.contains("authorization: <redacted>"));
        assert!(formatted.contains("x-ms-request-id: req-1"));
    }
}
