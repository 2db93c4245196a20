//! Resource provider operations
//!
//! [`Providers`] also serves as the provider client the registration policy
//! uses to register namespaces on demand.

use crate::client::{ArmClient, RESOURCES_API_VERSION, segment};
use async_trait::async_trait;
use azmgmt_core::{
    Method, PagedSequence, ProviderOperations, ProviderRegistrationState, Result,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// A resource provider namespace and its registration in one subscription
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Provider {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub namespace: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_state: Option<ProviderRegistrationState>,
    #[serde(default)]
    pub resource_types: Vec<ProviderResourceType>,
}

impl Provider {
    /// Resource type by name, case-insensitively
    pub fn resource_type(&self, name: &str) -> Option<&ProviderResourceType> {
        self.resource_types
            .iter()
            .find(|t| t.resource_type.eq_ignore_ascii_case(name))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderResourceType {
    pub resource_type: String,
    #[serde(default)]
    pub locations: Vec<String>,
    #[serde(default)]
    pub api_versions: Vec<String>,
}

/// Provider operations in one subscription
#[derive(Clone, Debug)]
pub struct Providers {
    client: ArmClient,
    subscription_id: String,
}

impl Providers {
    pub fn new(client: ArmClient, subscription_id: impl Into<String>) -> Self {
        Self {
            client,
            subscription_id: subscription_id.into(),
        }
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    fn path(&self, namespace: Option<&str>) -> String {
        let base = format!("/subscriptions/{}/providers", segment(&self.subscription_id));
        match namespace {
            Some(namespace) => format!("{}/{}", base, segment(namespace)),
            None => base,
        }
    }

    pub async fn list(&self) -> Result<PagedSequence<Provider>> {
        let request = self
            .client
            .request(Method::GET, &self.path(None), RESOURCES_API_VERSION)?;
        self.client.pipeline().list(request).await
    }

    pub async fn get_by_name(&self, namespace: &str) -> Result<Provider> {
        let request =
            self.client
                .request(Method::GET, &self.path(Some(namespace)), RESOURCES_API_VERSION)?;
        self.client.pipeline().send_json(request).await
    }

    /// Start registering `namespace`; the returned provider is usually still
    /// `Registering`
    pub async fn register(&self, namespace: &str) -> Result<Provider> {
        self.post_action(namespace, "register").await
    }

    pub async fn unregister(&self, namespace: &str) -> Result<Provider> {
        self.post_action(namespace, "unregister").await
    }

    async fn post_action(&self, namespace: &str, action: &str) -> Result<Provider> {
        let path = format!("{}/{}", self.path(Some(namespace)), action);
        debug!(
            "{} provider {} in subscription {}",
            action, namespace, self.subscription_id
        );
        let request = self
            .client
            .request(Method::POST, &path, RESOURCES_API_VERSION)?;
        self.client.pipeline().send_json(request).await
    }
}

#[async_trait]
impl ProviderOperations for Providers {
    async fn register(&self, namespace: &str) -> Result<ProviderRegistrationState> {
        let provider = Providers::register(self, namespace).await?;
        // A register response without a state is still being processed
        Ok(provider
            .registration_state
            .unwrap_or(ProviderRegistrationState::Registering))
    }

    async fn registration_state(&self, namespace: &str) -> Result<ProviderRegistrationState> {
        let provider = self.get_by_name(namespace).await?;
        Ok(provider
            .registration_state
            .unwrap_or(ProviderRegistrationState::NotRegistered))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_provider_from_json() {
        let provider: Provider = serde_json::from_value(json!({
            "id": "/subscriptions/sub-1/providers/Microsoft.Storage",
            "namespace": "Microsoft.Storage",
            "registrationState": "Registering",
            "resourceTypes": [{
                "resourceType": "storageAccounts",
                "locations": ["West US", "East US"],
                "apiVersions": ["2019-06-01"]
            }]
        }))
        .unwrap();
        assert_eq!(
            provider.registration_state,
            Some(ProviderRegistrationState::Registering)
        );
        let accounts = provider.resource_type("StorageAccounts").unwrap();
        assert_eq!(accounts.locations, vec!["West US", "East US"]);
        assert!(provider.resource_type("blobServices").is_none());
    }

    #[test]
    fn test_provider_without_resource_types() {
        let provider: Provider =
            serde_json::from_value(json!({"namespace": "Microsoft.Foo"})).unwrap();
        assert!(provider.registration_state.is_none());
        assert!(provider.resource_types.is_empty());
    }
}
