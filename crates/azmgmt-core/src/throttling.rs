//! Per-scope throttling
//!
//! Resource Manager throttles per subscription. When a call gets `429`, the
//! policy records how long the scope must back off, sleeps once for the whole
//! scope and replays the call. Calls that hit `429` while another caller is
//! already backing off join that backoff instead of starting their own, and
//! calls that start while a backoff is in progress wait for it before they
//! are sent.
//!
//! Throttle state lives in a [`ThrottleRegistry`] owned by whoever builds the
//! pipelines. Pipelines coordinate only when they share a registry.

use crate::config::ThrottlingConfig;
use crate::error::{Error, Result};
use crate::http::{Request, Response};
use crate::pipeline::{HttpService, dispatch};
use crate::resource_id::extract_from_resource_id;
use futures::future::BoxFuture;
use regex::Regex;
use reqwest::StatusCode;
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::time::Instant;
use tower::{Layer, Service};
use tracing::{debug, info};

/// Scope used for requests that are not under a subscription
pub const GLOBAL_SCOPE: &str = "global";

static WAIT_MINUTES: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)try again after '([0-9]+)' minutes").expect("valid regex")
});

static WAIT_SECONDS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)try again after '([0-9]+)' seconds").expect("valid regex")
});

/// Backoff state for one scope
#[derive(Debug, Default)]
pub struct ScopeGate {
    /// Held by the single caller sleeping out a backoff
    sleeper: tokio::sync::Mutex<()>,
    /// When the current backoff ends
    deadline: Mutex<Option<Instant>>,
}

impl ScopeGate {
    fn deadline(&self) -> Option<Instant> {
        self.deadline.lock().ok().and_then(|d| *d)
    }

    fn set_deadline(&self, deadline: Option<Instant>) {
        if let Ok(mut current) = self.deadline.lock() {
            *current = deadline;
        }
    }

    /// True while a backoff deadline is in the future
    pub fn is_backing_off(&self) -> bool {
        self.deadline().is_some_and(|d| d > Instant::now())
    }

    /// Wait for an in-progress backoff, if any
    async fn join(&self) {
        let _guard = self.sleeper.lock().await;
        // The previous sleeper may have been dropped before its deadline.
        if let Some(deadline) = self.deadline() {
            if deadline > Instant::now() {
                tokio::time::sleep_until(deadline).await;
            }
            self.set_deadline(None);
        }
    }
}

/// Throttle state keyed by scope, shared by clones
#[derive(Clone, Debug, Default)]
pub struct ThrottleRegistry {
    scopes: Arc<Mutex<HashMap<String, Arc<ScopeGate>>>>,
}

impl ThrottleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// The subscription id in the URL path, or [`GLOBAL_SCOPE`]
    pub fn scope_for(request: &Request) -> String {
        extract_from_resource_id(request.url.path(), "subscriptions")
            .map(str::to_ascii_lowercase)
            .unwrap_or_else(|| GLOBAL_SCOPE.to_string())
    }

    /// The gate for `scope`, created on first use
    pub fn gate(&self, scope: &str) -> Arc<ScopeGate> {
        match self.scopes.lock() {
            Ok(mut scopes) => scopes.entry(scope.to_string()).or_default().clone(),
            // A poisoned map still yields a working, if unshared, gate
            Err(_) => Arc::new(ScopeGate::default()),
        }
    }

    /// Whether any caller is currently backing off on `scope`
    pub fn is_backing_off(&self, scope: &str) -> bool {
        self.scopes
            .lock()
            .ok()
            .and_then(|scopes| scopes.get(scope).map(|gate| gate.is_backing_off()))
            .unwrap_or(false)
    }
}

/// How long a 429 asks us to wait: `Retry-After`, then the body text, then
/// the configured default
fn requested_wait(response: &Response, config: &ThrottlingConfig) -> Duration {
    if let Some(secs) = response.retry_after_secs().filter(|s| *s > 0) {
        return Duration::from_secs(secs);
    }
    let body = response.text();
    let from_body = WAIT_MINUTES
        .captures(&body)
        .and_then(|c| c[1].parse::<u64>().ok())
        .map(|m| m.saturating_mul(60))
        .or_else(|| {
            WAIT_SECONDS
                .captures(&body)
                .and_then(|c| c[1].parse::<u64>().ok())
        })
        .filter(|s| *s > 0);
    Duration::from_secs(from_body.unwrap_or(config.default_wait_secs))
}

#[derive(Clone, Debug)]
pub struct ThrottlingLayer {
    registry: ThrottleRegistry,
    config: ThrottlingConfig,
}

impl ThrottlingLayer {
    pub fn new(registry: ThrottleRegistry, config: ThrottlingConfig) -> Self {
        Self { registry, config }
    }
}

impl Layer<HttpService> for ThrottlingLayer {
    type Service = ThrottlingPolicy;

    fn layer(&self, inner: HttpService) -> Self::Service {
        ThrottlingPolicy {
            inner,
            registry: self.registry.clone(),
            config: self.config.clone(),
        }
    }
}

#[derive(Clone)]
pub struct ThrottlingPolicy {
    inner: HttpService,
    registry: ThrottleRegistry,
    config: ThrottlingConfig,
}

impl Service<Request> for ThrottlingPolicy {
    type Response = Response;
    type Error = Error;
    type Future = BoxFuture<'static, Result<Response>>;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: Request) -> Self::Future {
        let mut inner = self.inner.clone();
        let registry = self.registry.clone();
        let config = self.config.clone();
        Box::pin(async move {
            let scope = ThrottleRegistry::scope_for(&request);
            let gate = registry.gate(&scope);

            if gate.is_backing_off() {
                debug!("Scope '{}' is backing off, waiting before send", scope);
                gate.join().await;
            }

            let response = dispatch(&mut inner, request.clone()).await?;
            if response.status != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }

            let Ok(guard) = gate.sleeper.try_lock() else {
                debug!("Scope '{}' throttled, joining backoff in progress", scope);
                gate.join().await;
                return dispatch(&mut inner, request).await;
            };

            let wait = requested_wait(&response, &config);
            let limit = Duration::from_secs(config.max_wait_secs);
            if wait > limit {
                return Err(Error::ThrottleWaitExceeded {
                    scope,
                    requested: wait,
                    limit,
                });
            }

            let deadline = Instant::now() + wait + Duration::from_millis(config.safety_margin_ms);
            gate.set_deadline(Some(deadline));
            info!(
                "Read/write per hour limit reached on scope '{}', retrying {} {} in {} seconds",
                scope,
                request.method,
                request.url.path(),
                wait.as_secs()
            );
            tokio::time::sleep_until(deadline).await;
            gate.set_deadline(None);
            drop(guard);

            dispatch(&mut inner, request).await
        })
    }
}
