//! Automatic resource provider registration
//!
//! A subscription must register a resource provider namespace before it can
//! create resources of that namespace. When a call fails with
//! `MissingSubscriptionRegistration`, the policy registers the namespace
//! through a side-channel provider client, waits for registration to settle
//! and re-issues the original request once.
//!
//! The provider client is produced by a [`ProviderRegistrar`] so this crate
//! does not depend on the resource-level API. The registrar's pipeline must
//! not itself contain this policy.

use crate::config::RegistrationConfig;
use crate::error::{CloudError, Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{HttpService, dispatch};
use async_trait::async_trait;
use futures::future::BoxFuture;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::sync::{Arc, LazyLock};
use std::task::{Context, Poll};
use std::time::Duration;
use tower::{Layer, Service};
use tracing::{debug, info};

/// CloudError code that triggers registration
pub const MISSING_SUBSCRIPTION_REGISTRATION: &str = "MissingSubscriptionRegistration";

static SUBSCRIPTION_IN_URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)/subscriptions/([\w-]+)/").expect("valid regex"));

// Greedy prefix: the namespace is the last quoted segment of the message
static NAMESPACE_IN_MESSAGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r".*'(.*)'").expect("valid regex"));

/// Registration state of a provider namespace in one subscription
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderRegistrationState {
    NotRegistered,
    Registering,
    Registered,
    Unregistering,
    /// Any state string the service adds later
    Other(String),
}

impl ProviderRegistrationState {
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "notregistered" | "unregistered" => Self::NotRegistered,
            "registering" => Self::Registering,
            "registered" => Self::Registered,
            "unregistering" => Self::Unregistering,
            _ => Self::Other(value.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::NotRegistered => "NotRegistered",
            Self::Registering => "Registering",
            Self::Registered => "Registered",
            Self::Unregistering => "Unregistering",
            Self::Other(value) => value,
        }
    }

    /// Registration is still underway; anything else ends the wait
    pub fn is_pending_registration(&self) -> bool {
        matches!(self, Self::NotRegistered | Self::Registering)
    }
}

impl std::fmt::Display for ProviderRegistrationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProviderRegistrationState {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderRegistrationState {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        Ok(Self::parse(&value))
    }
}

/// The provider operations the registration policy needs
#[async_trait]
pub trait ProviderOperations: Send + Sync {
    /// Ask the platform to register `namespace`; returns the state reported
    /// by the register call
    async fn register(&self, namespace: &str) -> Result<ProviderRegistrationState>;

    /// Current registration state of `namespace`
    async fn registration_state(&self, namespace: &str) -> Result<ProviderRegistrationState>;
}

/// Produces provider clients scoped to a subscription
#[async_trait]
pub trait ProviderRegistrar: Send + Sync {
    async fn for_subscription(&self, subscription_id: &str)
    -> Result<Arc<dyn ProviderOperations>>;
}

/// Subscription id from a request URL path
pub fn subscription_from_url(url: &url::Url) -> Option<String> {
    SUBSCRIPTION_IN_URL
        .captures(url.path())
        .map(|c| c[1].to_string())
}

/// Namespace named by a `MissingSubscriptionRegistration` error: the last
/// quoted segment of the message, else the error target
pub fn namespace_from_error(error: &CloudError) -> Result<String> {
    if let Some(captures) = NAMESPACE_IN_MESSAGE.captures(&error.message)
        && !captures[1].is_empty()
    {
        return Ok(captures[1].to_string());
    }
    match error.target.as_deref() {
        Some(target) if !target.is_empty() && !target.contains(char::is_whitespace) => {
            Ok(target.to_string())
        }
        _ => Err(Error::Contract(format!(
            "cannot find provider namespace in '{}'",
            error.message
        ))),
    }
}

/// Register `namespace` and poll until it leaves the registering states
pub async fn register_and_wait(
    providers: &dyn ProviderOperations,
    namespace: &str,
    config: &RegistrationConfig,
) -> Result<ProviderRegistrationState> {
    let mut state = providers
        .register(namespace)
        .await
        .map_err(|e| Error::RegistrationFailed {
            namespace: namespace.to_string(),
            message: e.to_string(),
        })?;

    let interval = Duration::from_secs(config.poll_interval_secs);
    let mut polls = 0;
    while state.is_pending_registration() {
        if polls >= config.max_polls {
            return Err(Error::RegistrationTimeout {
                namespace: namespace.to_string(),
                polls,
            });
        }
        tokio::time::sleep(interval).await;
        polls += 1;
        state = providers
            .registration_state(namespace)
            .await
            .map_err(|e| Error::RegistrationFailed {
                namespace: namespace.to_string(),
                message: e.to_string(),
            })?;
        debug!("Provider {} is {} after {} polls", namespace, state, polls);
    }
    Ok(state)
}

#[derive(Clone)]
pub struct ProviderRegistrationLayer {
    registrar: Arc<dyn ProviderRegistrar>,
    config: RegistrationConfig,
}

impl ProviderRegistrationLayer {
    pub fn new(registrar: Arc<dyn ProviderRegistrar>, config: RegistrationConfig) -> Self {
        Self { registrar, config }
    }
}

impl Layer<HttpService> for ProviderRegistrationLayer {
    type Service = ProviderRegistrationPolicy;

    fn layer(&self, inner: HttpService) -> Self::Service {
        ProviderRegistrationPolicy {
            inner,
            registrar: self.registrar.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ProviderRegistrationPolicy {
    inner: HttpService,
    registrar: Arc<dyn ProviderRegistrar>,
    config: RegistrationConfig,
}

impl Service<Request> for ProviderRegistrationPolicy {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let registrar = self.registrar.clone();
        let config = self.config.clone();
        Box::pin(async move {
            let response = dispatch(&mut inner, request.clone()).await?;
            if response.is_success() {
                return Ok(response);
            }
            let Some(error) = response.decoded_error() else {
                return Ok(response);
            };
            if error.code != MISSING_SUBSCRIPTION_REGISTRATION {
                return Ok(response);
            }

            let subscription_id = subscription_from_url(&request.url).ok_or_else(|| {
                Error::Contract(format!(
                    "no subscription id in URL of unregistered call: {}",
                    request.url
                ))
            })?;
            let namespace = namespace_from_error(&error)?;

            info!(
                "Registering provider {} in subscription {}",
                namespace, subscription_id
            );
            let providers = registrar.for_subscription(&subscription_id).await?;
            let state = register_and_wait(providers.as_ref(), &namespace, &config).await?;
            info!("Provider {} is {}, re-issuing request", namespace, state);

            dispatch(&mut inner, request).await
        })
    }
}
