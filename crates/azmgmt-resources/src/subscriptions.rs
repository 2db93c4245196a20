//! Subscriptions and tenants visible to the authenticated identity

use crate::client::{ArmClient, SUBSCRIPTIONS_API_VERSION, segment};
use azmgmt_core::{Method, PagedSequence, Result};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    pub id: String,
    pub subscription_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Enabled, Warned, PastDue, Disabled or Deleted
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<String>,
}

impl Subscription {
    pub fn is_enabled(&self) -> bool {
        self.state
            .as_deref()
            .is_some_and(|state| state.eq_ignore_ascii_case("enabled"))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    pub tenant_id: String,
}

/// Subscription operations
#[derive(Clone, Debug)]
pub struct Subscriptions {
    client: ArmClient,
}

impl Subscriptions {
    pub(crate) fn new(client: ArmClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<PagedSequence<Subscription>> {
        let request = self
            .client
            .request(Method::GET, "/subscriptions", SUBSCRIPTIONS_API_VERSION)?;
        self.client.pipeline().list(request).await
    }

    pub async fn get(&self, subscription_id: &str) -> Result<Subscription> {
        let request = self.client.request(
            Method::GET,
            &format!("/subscriptions/{}", segment(subscription_id)),
            SUBSCRIPTIONS_API_VERSION,
        )?;
        self.client.pipeline().send_json(request).await
    }
}

/// Tenant operations
#[derive(Clone, Debug)]
pub struct Tenants {
    client: ArmClient,
}

impl Tenants {
    pub(crate) fn new(client: ArmClient) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> Result<PagedSequence<Tenant>> {
        let request = self
            .client
            .request(Method::GET, "/tenants", SUBSCRIPTIONS_API_VERSION)?;
        self.client.pipeline().list(request).await
    }
}
