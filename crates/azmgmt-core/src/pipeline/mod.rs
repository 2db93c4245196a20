//! The HTTP pipeline
//!
//! A [`Pipeline`] is an ordered chain of tower services over a transport.
//! Every policy is a [`tower::Layer`] and the chain is assembled innermost
//! first, so for the policy list
//!
//! 1. credentials
//! 2. retry
//! 3. response decoding
//! 4. cookie jar
//! 5. provider registration
//! 6. throttling
//!
//! the composed call is `throttling(registration(cookie(decoding(retry(credentials(send))))))`.
//! User-agent and HTTP logging sit between credentials and the transport, and
//! policies added with [`PipelineBuilder::with_request_policy`] wrap the whole
//! chain.
//!
//! Each stage is erased into an [`HttpService`], so policies hold a cloneable
//! handle to the rest of the chain and can replay a request through it.

pub mod transport;

pub use transport::{AZMGMT_USER_AGENT, HttpTransport};

use crate::config::PipelineConfig;
use crate::credentials::TokenCredential;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::lro::Poller;
use crate::paging::{Page, PagedSequence};
use crate::policy::{
    CookieJar, CookieLayer, CredentialsLayer, DecodingLayer, HttpLoggingLayer, RetryLayer,
    UserAgentLayer,
};
use crate::registration::{ProviderRegistrar, ProviderRegistrationLayer};
use crate::throttling::{ThrottleRegistry, ThrottlingLayer};
use reqwest::Method;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use tower::util::BoxCloneSyncService;
use tower::{Layer, Service, ServiceExt};
use tracing::Instrument;

/// A type-erased stage of the policy chain
pub type HttpService = BoxCloneSyncService<Request, Response, Error>;

/// A user-supplied policy: wraps the chain built so far
pub type RequestPolicy = Arc<dyn Fn(HttpService) -> HttpService + Send + Sync>;

/// Drive `service` to readiness and send `request` through it
pub(crate) async fn dispatch(service: &mut HttpService, request: Request) -> Result<Response> {
    service.ready().await?.call(request).await
}

fn boxed<L>(layer: L, inner: HttpService) -> HttpService
where
    L: Layer<HttpService>,
    L::Service: Service<Request, Response = Response, Error = Error> + Clone + Send + Sync + 'static,
    <L::Service as Service<Request>>::Future: Send + 'static,
{
    BoxCloneSyncService::new(layer.layer(inner))
}

/// An assembled policy chain plus the configuration it was built from
#[derive(Clone)]
pub struct Pipeline {
    service: HttpService,
    config: Arc<PipelineConfig>,
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Pipeline {
    pub fn builder(credential: Arc<dyn TokenCredential>) -> PipelineBuilder {
        PipelineBuilder::new(credential)
    }

    /// Wrap an already assembled service
    pub fn from_service(service: HttpService, config: PipelineConfig) -> Self {
        Self {
            service,
            config: Arc::new(config),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Send a request through every policy and return whatever response
    /// survives, 2xx or not
    pub async fn execute(&self, request: Request) -> Result<Response> {
        let span = tracing::debug_span!(
            "azmgmt_request",
            method = %request.method,
            path = %request.url.path(),
            context = request.logging_context.as_deref().unwrap_or(""),
        );
        self.service.clone().oneshot(request).instrument(span).await
    }

    /// Like [`execute`](Self::execute) but non-2xx responses become [`Error::Http`]
    pub async fn send(&self, request: Request) -> Result<Response> {
        self.execute(request).await?.into_result()
    }

    /// Send and deserialize a 2xx JSON body
    pub async fn send_json<T: DeserializeOwned>(&self, request: Request) -> Result<T> {
        self.send(request).await?.json()
    }

    /// Fetch the first page of a list operation and follow `nextLink` lazily
    pub async fn list<T>(&self, request: Request) -> Result<PagedSequence<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let logging_context = request.logging_context.clone();
        let first: Page<T> = self.send_json(request).await?;
        let pipeline = self.clone();
        Ok(PagedSequence::new(first, move |link| {
            let pipeline = pipeline.clone();
            let logging_context = logging_context.clone();
            async move {
                let mut request = Request::parse(Method::GET, &link)?;
                request.logging_context = logging_context;
                pipeline.send_json::<Page<T>>(request).await
            }
        }))
    }

    /// Send the triggering request of a long-running operation and return a
    /// poller for it
    pub async fn begin_long_running_operation(&self, request: Request) -> Result<Poller> {
        Poller::start(self.clone(), request).await
    }
}

/// Builder for [`Pipeline`]
pub struct PipelineBuilder {
    credential: Arc<dyn TokenCredential>,
    config: PipelineConfig,
    transport: Option<HttpService>,
    throttle_registry: Option<ThrottleRegistry>,
    registrar: Option<Arc<dyn ProviderRegistrar>>,
    cookie_jar: Option<CookieJar>,
    request_policies: Vec<RequestPolicy>,
}

impl PipelineBuilder {
    pub fn new(credential: Arc<dyn TokenCredential>) -> Self {
        Self {
            credential,
            config: PipelineConfig::default(),
            transport: None,
            throttle_registry: None,
            registrar: None,
            cookie_jar: None,
            request_policies: Vec::new(),
        }
    }

    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the reqwest transport (mock services, custom clients)
    pub fn transport<S>(mut self, transport: S) -> Self
    where
        S: Service<Request, Response = Response, Error = Error> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        self.transport = Some(BoxCloneSyncService::new(transport));
        self
    }

    /// Share throttling state with other pipelines.
    ///
    /// Pipelines built without one get a private registry, so two pipelines
    /// only coordinate backoff when they were handed the same registry.
    pub fn throttle_registry(mut self, registry: ThrottleRegistry) -> Self {
        self.throttle_registry = Some(registry);
        self
    }

    /// Enable automatic provider registration through `registrar`
    pub fn provider_registrar(mut self, registrar: Arc<dyn ProviderRegistrar>) -> Self {
        self.registrar = Some(registrar);
        self
    }

    pub fn cookie_jar(mut self, jar: CookieJar) -> Self {
        self.cookie_jar = Some(jar);
        self
    }

    /// Add a policy outside the built-in ones
    pub fn with_request_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(HttpService) -> HttpService + Send + Sync + 'static,
    {
        self.request_policies.push(Arc::new(policy));
        self
    }

    pub fn build(self) -> Result<Pipeline> {
        let config = self.config;
        let mut service = match self.transport {
            Some(transport) => transport,
            None => BoxCloneSyncService::new(HttpTransport::new(&config)?),
        };

        service = boxed(HttpLoggingLayer::new(config.log_level), service);
        service = boxed(UserAgentLayer::new(config.user_agent.as_deref()), service);
        service = boxed(CredentialsLayer::new(self.credential), service);
        if config.retry.enabled {
            service = boxed(RetryLayer::new(config.retry.clone()), service);
        }
        service = boxed(DecodingLayer, service);
        service = boxed(
            CookieLayer::new(self.cookie_jar.unwrap_or_default()),
            service,
        );
        if config.registration.enabled
            && let Some(registrar) = self.registrar
        {
            service = boxed(
                ProviderRegistrationLayer::new(registrar, config.registration.clone()),
                service,
            );
        }
        if config.throttling.enabled {
            service = boxed(
                ThrottlingLayer::new(
                    self.throttle_registry.unwrap_or_default(),
                    config.throttling.clone(),
                ),
                service,
            );
        }
        for policy in &self.request_policies {
            service = policy(service);
        }

        tracing::debug!(
            retry = config.retry.enabled,
            throttling = config.throttling.enabled,
            custom_policies = self.request_policies.len(),
            "Built HTTP pipeline"
        );
        Ok(Pipeline::from_service(service, config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::StaticTokenCredential;
    use reqwest::StatusCode;
    use serde_json::json;
    use std::sync::Mutex;
    use tower::service_fn;

    fn credential() -> Arc<dyn TokenCredential> {
        Arc::new(StaticTokenCredential::new("token-1"))
    }

    #[tokio::test]
    async fn test_credentials_and_user_agent_reach_transport() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let recorder = seen.clone();
        let transport = service_fn(move |req: Request| {
            let recorder = recorder.clone();
            async move {
                recorder.lock().unwrap().push((
                    req.header("authorization").map(str::to_string),
                    req.header("user-agent").map(str::to_string),
                ));
                Ok::<_, Error>(Response::json_body(200, &json!({"ok": true})))
            }
        });

        let mut config = PipelineConfig::default();
        config.user_agent = Some("tests/1.0".to_string());
        let pipeline = Pipeline::builder(credential())
            .config(config)
            .transport(transport)
            .build()
            .unwrap();

        let request = Request::parse(Method::GET, "https://example.test/subscriptions").unwrap();
        let value: serde_json::Value = pipeline.send_json(request).await.unwrap();
        assert_eq!(value["ok"], true);

        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].0.as_deref(), Some("Bearer token-1"));
        let agent = seen[0].1.as_deref().unwrap();
        assert!(agent.starts_with("azmgmt/"));
        assert!(agent.ends_with("tests/1.0"));
    }

    #[tokio::test]
    async fn test_custom_policy_wraps_chain() {
        let transport = service_fn(|req: Request| async move {
            let tag = req.header("x-test-tag").unwrap_or("missing").to_string();
            Ok::<_, Error>(Response::json_body(200, &json!({ "tag": tag })))
        });

        let pipeline = Pipeline::builder(credential())
            .transport(transport)
            .with_request_policy(|inner: HttpService| {
                BoxCloneSyncService::new(tower::util::MapRequestLayer::new(|req: Request| {
                    req.with_header("x-test-tag", "custom")
                        .expect("static header value")
                })
                .layer(inner))
            })
            .build()
            .unwrap();

        let request = Request::parse(Method::GET, "https://example.test/x").unwrap();
        let value: serde_json::Value = pipeline.send_json(request).await.unwrap();
        assert_eq!(value["tag"], "custom");
    }

    #[tokio::test]
    async fn test_send_turns_non_success_into_http_error() {
        let transport = service_fn(|_req: Request| async move {
            Ok::<_, Error>(Response::json_body(
                404,
                &json!({"error": {"code": "ResourceGroupNotFound", "message": "nope"}}),
            ))
        });
        let pipeline = Pipeline::builder(credential())
            .transport(transport)
            .build()
            .unwrap();

        let request = Request::parse(Method::GET, "https://example.test/x").unwrap();
        let response = pipeline.execute(request.clone()).await.unwrap();
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(
            response.cloud_error.as_ref().map(|e| e.code.as_str()),
            Some("ResourceGroupNotFound")
        );

        let err = pipeline.send(request).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_list_follows_next_links() {
        let transport = service_fn(|req: Request| async move {
            let body = if req.url.query() == Some("page=2") {
                json!({"value": [3]})
            } else {
                json!({"value": [1, 2], "nextLink": "https://example.test/items?page=2"})
            };
            Ok::<_, Error>(Response::json_body(200, &body))
        });
        let pipeline = Pipeline::builder(credential())
            .transport(transport)
            .build()
            .unwrap();

        let request = Request::parse(Method::GET, "https://example.test/items").unwrap();
        let items: Vec<u32> = pipeline
            .list(request)
            .await
            .unwrap()
            .try_collect_all()
            .await
            .unwrap();
        assert_eq!(items, vec![1, 2, 3]);
    }
}
