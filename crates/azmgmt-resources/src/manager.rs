//! Entry points: configure, authenticate, pick a subscription
//!
//! ```text
//! ResourceManager::configure()      -> Configurable
//!     .authenticate(credential)     -> Authenticated   (tenants, subscriptions)
//!     .with_subscription(id)        -> ResourceManager (providers, groups, resources)
//! ```

use crate::client::{ArmClient, DEFAULT_ENDPOINT};
use crate::generic_resources::GenericResources;
use crate::providers::Providers;
use crate::resource_groups::ResourceGroups;
use crate::subscriptions::{Subscriptions, Tenants};
use async_trait::async_trait;
use azmgmt_core::{
    CookieJar, Error, HttpLogDetailLevel, HttpService, Pipeline, PipelineBuilder, PipelineConfig,
    ProviderOperations, ProviderRegistrar, Request, RequestPolicy, Response, Result,
    ThrottleRegistry, TokenCredential,
};
use std::sync::Arc;
use tower::Service;
use tower::util::BoxCloneSyncService;

/// Optional settings applied before authenticating
pub struct Configurable {
    config: PipelineConfig,
    endpoint: String,
    transport: Option<HttpService>,
    request_policies: Vec<RequestPolicy>,
    throttle_registry: Option<ThrottleRegistry>,
}

impl Default for Configurable {
    fn default() -> Self {
        Self {
            config: PipelineConfig::default(),
            endpoint: DEFAULT_ENDPOINT.to_string(),
            transport: None,
            request_policies: Vec::new(),
            throttle_registry: None,
        }
    }
}

impl Configurable {
    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_log_level(mut self, level: HttpLogDetailLevel) -> Self {
        self.config.log_level = level;
        self
    }

    /// Appended to the default `User-Agent`
    pub fn with_user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.config.user_agent = Some(user_agent.into());
        self
    }

    /// Wrap the built-in policies with `policy`
    pub fn with_request_policy<F>(mut self, policy: F) -> Self
    where
        F: Fn(HttpService) -> HttpService + Send + Sync + 'static,
    {
        self.request_policies.push(Arc::new(policy));
        self
    }

    pub fn with_base_url(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    /// Replace the HTTP transport
    pub fn with_transport<S>(mut self, transport: S) -> Self
    where
        S: Service<Request, Response = Response, Error = Error> + Clone + Send + Sync + 'static,
        S::Future: Send + 'static,
    {
        self.transport = Some(BoxCloneSyncService::new(transport));
        self
    }

    /// Share throttling backoff with other managers
    pub fn with_throttle_registry(mut self, registry: ThrottleRegistry) -> Self {
        self.throttle_registry = Some(registry);
        self
    }

    /// Build the policy chain for `credential`
    pub fn authenticate(self, credential: Arc<dyn TokenCredential>) -> Result<Authenticated> {
        let registry = self.throttle_registry.clone().unwrap_or_default();
        let cookies = CookieJar::new();

        // Registration calls go through a chain without the registration
        // policy, sharing backoff state with the main chain
        let side_channel = self
            .pipeline_builder(credential.clone(), &registry, &cookies)
            .build()?;
        let registrar = Arc::new(SideChannelRegistrar {
            client: ArmClient::new(side_channel, &self.endpoint)?,
        });

        let pipeline = self
            .pipeline_builder(credential, &registry, &cookies)
            .provider_registrar(registrar)
            .build()?;
        Ok(Authenticated {
            client: ArmClient::new(pipeline, &self.endpoint)?,
        })
    }

    fn pipeline_builder(
        &self,
        credential: Arc<dyn TokenCredential>,
        registry: &ThrottleRegistry,
        cookies: &CookieJar,
    ) -> PipelineBuilder {
        let mut builder = Pipeline::builder(credential)
            .config(self.config.clone())
            .throttle_registry(registry.clone())
            .cookie_jar(cookies.clone());
        if let Some(transport) = &self.transport {
            builder = builder.transport(transport.clone());
        }
        for policy in &self.request_policies {
            let policy = policy.clone();
            builder = builder.with_request_policy(move |inner| policy(inner));
        }
        builder
    }
}

/// Hands the registration policy a provider client for the failing
/// subscription
#[derive(Debug)]
struct SideChannelRegistrar {
    client: ArmClient,
}

#[async_trait]
impl ProviderRegistrar for SideChannelRegistrar {
    async fn for_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<Arc<dyn ProviderOperations>> {
        Ok(Arc::new(Providers::new(self.client.clone(), subscription_id)))
    }
}

/// Operations that work across subscriptions
#[derive(Clone, Debug)]
pub struct Authenticated {
    client: ArmClient,
}

impl Authenticated {
    pub fn tenants(&self) -> Tenants {
        Tenants::new(self.client.clone())
    }

    pub fn subscriptions(&self) -> Subscriptions {
        Subscriptions::new(self.client.clone())
    }

    pub fn with_subscription(&self, subscription_id: impl Into<String>) -> ResourceManager {
        ResourceManager {
            client: self.client.clone(),
            subscription_id: subscription_id.into(),
        }
    }

    pub fn client(&self) -> &ArmClient {
        &self.client
    }
}

/// Resource Manager operations in one subscription
#[derive(Clone, Debug)]
pub struct ResourceManager {
    client: ArmClient,
    subscription_id: String,
}

impl ResourceManager {
    pub fn configure() -> Configurable {
        Configurable::default()
    }

    /// Authenticate with default settings
    pub fn authenticate(credential: Arc<dyn TokenCredential>) -> Result<Authenticated> {
        Self::configure().authenticate(credential)
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn client(&self) -> &ArmClient {
        &self.client
    }

    pub fn providers(&self) -> Providers {
        Providers::new(self.client.clone(), self.subscription_id.clone())
    }

    pub fn resource_groups(&self) -> ResourceGroups {
        ResourceGroups::new(self.client.clone(), self.subscription_id.clone())
    }

    pub fn generic_resources(&self) -> GenericResources {
        GenericResources::new(self.client.clone(), self.subscription_id.clone())
    }
}
