//! # azmgmt-core
//!
//! Runtime core shared by management-plane clients: an HTTP policy chain
//! with automatic throttling backoff and resource-provider registration, a
//! lazy `nextLink` pager and a long-running operation poller.
//!
//! ## Layout
//!
//! ```text
//! azmgmt-core/
//! ├── src/
//! │   ├── pipeline/      # Pipeline, PipelineBuilder, reqwest transport
//! │   ├── policy/        # credentials, retry, decoding, cookies, user agent, logging
//! │   ├── throttling.rs  # per-scope 429 backoff
//! │   ├── registration.rs # MissingSubscriptionRegistration handling
//! │   ├── paging.rs      # PagedSequence
//! │   ├── lro/           # Poller and operation states
//! │   ├── config/        # serde/TOML configuration
//! │   └── error.rs       # Error and CloudError
//! ```
//!
//! ## Example
//!
//! ```rust,no_run
//! use azmgmt_core::{Method, Pipeline, Request, StaticTokenCredential};
//! use std::sync::Arc;
//!
//! # async fn example() -> azmgmt_core::Result<()> {
//! let pipeline = Pipeline::builder(Arc::new(StaticTokenCredential::new("token"))).build()?;
//!
//! let request = Request::parse(
//!     Method::GET,
//!     "https://management.azure.com/subscriptions?api-version=2020-01-01",
//! )?;
//! let mut subscriptions = pipeline.list::<serde_json::Value>(request).await?;
//! while let Some(subscription) = subscriptions.next().await {
//!     println!("{}", subscription?["subscriptionId"]);
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod credentials;
pub mod error;
pub mod http;
pub mod lro;
pub mod paging;
pub mod pipeline;
pub mod policy;
pub mod registration;
pub mod resource_id;
pub mod throttling;

pub use config::{
    HttpLogDetailLevel, PipelineConfig, PollingConfig, RegistrationConfig, RetryConfig,
    ThrottlingConfig,
};
pub use credentials::{AccessToken, ClientSecretCredential, StaticTokenCredential, TokenCredential};
pub use error::{CloudError, Error, Result};
pub use http::{Request, Response};
pub use lro::{LroCallback, LroEvent, OperationHandle, OperationState, OperationStatus, Poller};
pub use paging::{Page, PagedSequence};
pub use pipeline::{HttpService, Pipeline, PipelineBuilder, RequestPolicy};
pub use policy::CookieJar;
pub use registration::{ProviderOperations, ProviderRegistrar, ProviderRegistrationState};
pub use resource_id::{ResourceId, extract_from_resource_id};
pub use throttling::ThrottleRegistry;

// Re-exported so callers can name methods and status codes without a direct
// reqwest dependency
pub use reqwest::{Method, StatusCode};
