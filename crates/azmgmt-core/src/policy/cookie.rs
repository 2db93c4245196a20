use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{HttpService, dispatch};
use futures::future::BoxFuture;
use reqwest::cookie::{CookieStore, Jar};
use reqwest::header::{COOKIE, HeaderValue, SET_COOKIE};
use std::sync::Arc;
use std::task::{Context, Poll};
use tower::{Layer, Service};
use url::Url;

/// Cookie store shared by every clone of the jar.
///
/// Domain, path and expiry rules are those of [`reqwest::cookie::Jar`].
#[derive(Clone, Debug, Default)]
pub struct CookieJar {
    jar: Arc<Jar>,
}

impl CookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// The `Cookie` header value for a request to `url`
    pub fn header_for(&self, url: &Url) -> Option<HeaderValue> {
        self.jar.cookies(url)
    }

    /// Record the `Set-Cookie` headers of a response from `url`
    pub fn store<'a>(&self, url: &Url, set_cookies: impl IntoIterator<Item = &'a HeaderValue>) {
        self.jar.set_cookies(&mut set_cookies.into_iter(), url);
    }
}

/// Replays cookies the service set on earlier responses from the same host
#[derive(Clone, Debug)]
pub struct CookieLayer {
    jar: CookieJar,
}

impl CookieLayer {
    pub fn new(jar: CookieJar) -> Self {
        Self { jar }
    }
}

impl Layer<HttpService> for CookieLayer {
    type Service = CookiePolicy;

    fn layer(&self, inner: HttpService) -> Self::Service {
        CookiePolicy {
            inner,
            jar: self.jar.clone(),
        }
    }
}

#[derive(Clone)]
pub struct CookiePolicy {
    inner: HttpService,
    jar: CookieJar,
}

impl Service<Request> for CookiePolicy {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, mut request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let jar = self.jar.clone();
        Box::pin(async move {
            let url = request.url.clone();
            if let Some(stored) = jar.header_for(&url) {
                request.headers.insert(COOKIE, stored);
            }

            let response = dispatch(&mut inner, request).await?;
            jar.store(&url, response.headers.get_all(SET_COOKIE));
            Ok(response)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use reqwest::header::HeaderMap;
    use tower::util::BoxCloneSyncService;
    use tower::{ServiceExt, service_fn};

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    fn set(jar: &CookieJar, at: &str, set_cookie: &'static str) {
        jar.store(&url(at), [&HeaderValue::from_static(set_cookie)]);
    }

    fn cookies(jar: &CookieJar, at: &str) -> Vec<String> {
        let mut pairs: Vec<String> = jar
            .header_for(&url(at))
            .map(|v| v.to_str().unwrap().split("; ").map(str::to_string).collect())
            .unwrap_or_default();
        pairs.sort();
        pairs
    }

    #[test]
    fn test_store_and_expire() {
        let jar = CookieJar::new();
        set(&jar, "https://a.test/", "session=abc; Path=/; HttpOnly");
        set(&jar, "https://a.test/", "affinity=1");
        assert_eq!(cookies(&jar, "https://a.test/x"), ["affinity=1", "session=abc"]);
        assert!(jar.header_for(&url("https://b.test/")).is_none());

        set(&jar, "https://a.test/", "session=gone; Max-Age=0");
        assert_eq!(cookies(&jar, "https://a.test/x"), ["affinity=1"]);
        set(
            &jar,
            "https://a.test/",
            "affinity=1; Expires=Thu, 01 Jan 1970 00:00:00 GMT",
        );
        assert!(jar.header_for(&url("https://a.test/x")).is_none());
    }

    #[test]
    fn test_respects_domain_and_path_attributes() {
        let jar = CookieJar::new();
        set(&jar, "https://a.test/", "scoped=1; Path=/providers");
        set(&jar, "https://a.test/", "foreign=1; Domain=other.test");

        assert!(cookies(&jar, "https://a.test/subscriptions").is_empty());
        assert_eq!(cookies(&jar, "https://a.test/providers/x"), ["scoped=1"]);
        assert!(cookies(&jar, "https://other.test/").is_empty());
    }

    #[tokio::test]
    async fn test_replays_cookies_on_next_request() {
        let inner = BoxCloneSyncService::new(service_fn(|req: Request| async move {
            let mut headers = HeaderMap::new();
            headers.insert(SET_COOKIE, HeaderValue::from_static("arr=node-7; Path=/"));
            let echoed = req.header("cookie").unwrap_or_default().as_bytes().to_vec();
            Ok::<_, Error>(Response::new(StatusCode::OK, headers, echoed))
        }));
        let jar = CookieJar::new();
        let layer = CookieLayer::new(jar.clone());
        let request = Request::parse(reqwest::Method::GET, "https://a.test/x").unwrap();

        let first = layer
            .layer(inner.clone())
            .oneshot(request.clone())
            .await
            .unwrap();
        assert_eq!(first.text(), "");

        let second = layer.layer(inner).oneshot(request).await.unwrap();
        assert_eq!(second.text(), "arr=node-7");
    }

    #[tokio::test]
    async fn test_stored_cookies_replace_caller_header() {
        let inner = BoxCloneSyncService::new(service_fn(|req: Request| async move {
            let echoed = req.header("cookie").unwrap_or_default().as_bytes().to_vec();
            Ok::<_, Error>(Response::new(StatusCode::OK, HeaderMap::new(), echoed))
        }));
        let jar = CookieJar::new();
        set(&jar, "https://a.test/", "arr=node-2");
        let request = Request::parse(reqwest::Method::GET, "https://a.test/x")
            .unwrap()
            .with_header("cookie", "stale=1")
            .unwrap();

        let response = CookieLayer::new(jar)
            .layer(inner)
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.text(), "arr=node-2");
    }
}
