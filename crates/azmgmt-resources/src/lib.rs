//! # azmgmt-resources
//!
//! Resource Manager client built on `azmgmt-core`: tenants, subscriptions,
//! resource providers, resource groups and generic resources.
//!
//! Every call goes through the core policy chain, so throttled calls back
//! off per subscription and calls that hit an unregistered provider
//! namespace register it and retry.
//!
//! ## Example
//!
//! ```rust,no_run
//! use azmgmt_core::ClientSecretCredential;
//! use azmgmt_resources::{Creatable, ResourceManager};
//! use std::sync::Arc;
//!
//! # async fn example() -> azmgmt_core::Result<()> {
//! let credential = Arc::new(ClientSecretCredential::new("tenant", "client", "secret"));
//! let manager = ResourceManager::configure()
//!     .with_user_agent("my-tool/1.0")
//!     .authenticate(credential)?
//!     .with_subscription("00000000-0000-0000-0000-000000000000");
//!
//! let group = manager
//!     .resource_groups()
//!     .define("rg-demo")
//!     .with_region("westus")
//!     .with_tag("env", "dev")
//!     .create()
//!     .await?;
//! println!("created {}", group.name());
//!
//! manager.resource_groups().delete("rg-demo").await?;
//! # Ok(())
//! # }
//! ```

pub mod capabilities;
pub mod client;
pub mod generic_resources;
pub mod manager;
pub mod providers;
pub mod resource_groups;
pub mod subscriptions;
pub mod workflows;

pub use capabilities::{Creatable, Refreshable, Updatable};
pub use client::ArmClient;
pub use generic_resources::{GenericResource, GenericResourceData, GenericResources};
pub use manager::{Authenticated, Configurable, ResourceManager};
pub use providers::{Provider, ProviderResourceType, Providers};
pub use resource_groups::{
    ResourceGroup, ResourceGroupData, ResourceGroupDefinition, ResourceGroups,
};
pub use subscriptions::{Subscription, Subscriptions, Tenant, Tenants};
pub use workflows::{
    RemoteReference, create_or_update_resource_and_wait, create_resource_group_and_wait,
    create_then_reconcile, delete_resource_group_and_wait,
};
