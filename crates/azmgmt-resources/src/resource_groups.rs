//! Resource group operations and handles

use crate::capabilities::{Creatable, Refreshable, Updatable};
use crate::client::{ArmClient, RESOURCES_API_VERSION, segment};
use async_trait::async_trait;
use azmgmt_core::{Error, Method, PagedSequence, Poller, Result, StatusCode};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Resource group as the service returns it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub location: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub managed_by: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub properties: Option<ResourceGroupProperties>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceGroupProperties {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provisioning_state: Option<String>,
}

/// Resource group operations in one subscription
#[derive(Clone, Debug)]
pub struct ResourceGroups {
    client: ArmClient,
    subscription_id: String,
}

impl ResourceGroups {
    pub(crate) fn new(client: ArmClient, subscription_id: impl Into<String>) -> Self {
        Self {
            client,
            subscription_id: subscription_id.into(),
        }
    }

    fn path(&self, name: Option<&str>) -> String {
        let base = format!(
            "/subscriptions/{}/resourcegroups",
            segment(&self.subscription_id)
        );
        match name {
            Some(name) => format!("{}/{}", base, segment(name)),
            None => base,
        }
    }

    /// Start defining a new resource group
    pub fn define(&self, name: impl Into<String>) -> ResourceGroupDefinition {
        ResourceGroupDefinition {
            groups: self.clone(),
            name: name.into(),
            region: None,
            tags: BTreeMap::new(),
        }
    }

    pub async fn get(&self, name: &str) -> Result<ResourceGroup> {
        let data = self.fetch(name).await?;
        Ok(self.wrap(name, data))
    }

    /// True when the group exists
    pub async fn contains(&self, name: &str) -> Result<bool> {
        let request =
            self.client
                .request(Method::HEAD, &self.path(Some(name)), RESOURCES_API_VERSION)?;
        let response = self.client.pipeline().execute(request).await?;
        match response.status {
            StatusCode::NO_CONTENT | StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => response.into_result().map(|_| true),
        }
    }

    pub async fn list(&self) -> Result<PagedSequence<ResourceGroupData>> {
        let request = self
            .client
            .request(Method::GET, &self.path(None), RESOURCES_API_VERSION)?;
        self.client.pipeline().list(request).await
    }

    /// Start deleting a group and everything in it
    pub async fn begin_delete(&self, name: &str) -> Result<Poller> {
        info!(
            "Deleting resource group {} in subscription {}",
            name, self.subscription_id
        );
        let request =
            self.client
                .request(Method::DELETE, &self.path(Some(name)), RESOURCES_API_VERSION)?;
        self.client
            .pipeline()
            .begin_long_running_operation(request)
            .await
    }

    /// Delete a group and wait until the service reports completion
    pub async fn delete(&self, name: &str) -> Result<()> {
        self.begin_delete(name).await?.wait().await?;
        Ok(())
    }

    async fn fetch(&self, name: &str) -> Result<ResourceGroupData> {
        let request =
            self.client
                .request(Method::GET, &self.path(Some(name)), RESOURCES_API_VERSION)?;
        self.client.pipeline().send_json(request).await
    }

    async fn put(&self, name: &str, data: &ResourceGroupData) -> Result<ResourceGroupData> {
        let request = self
            .client
            .request(Method::PUT, &self.path(Some(name)), RESOURCES_API_VERSION)?
            .with_json(data)?;
        self.client.pipeline().send_json(request).await
    }

    async fn patch(&self, name: &str, data: &ResourceGroupData) -> Result<ResourceGroupData> {
        let request = self
            .client
            .request(Method::PATCH, &self.path(Some(name)), RESOURCES_API_VERSION)?
            .with_json(data)?;
        self.client.pipeline().send_json(request).await
    }

    fn wrap(&self, name: &str, data: ResourceGroupData) -> ResourceGroup {
        ResourceGroup {
            groups: self.clone(),
            name: data.name.clone().unwrap_or_else(|| name.to_string()),
            data,
        }
    }
}

/// A resource group that does not exist yet
#[derive(Debug)]
pub struct ResourceGroupDefinition {
    groups: ResourceGroups,
    name: String,
    region: Option<String>,
    tags: BTreeMap<String, String>,
}

impl ResourceGroupDefinition {
    #[must_use]
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region = Some(region.into());
        self
    }

    #[must_use]
    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

#[async_trait]
impl Creatable for ResourceGroupDefinition {
    type Output = ResourceGroup;

    async fn create(self) -> Result<ResourceGroup> {
        let Some(location) = self.region else {
            return Err(Error::Contract(format!(
                "resource group '{}' needs a region",
                self.name
            )));
        };
        let data = ResourceGroupData {
            location,
            tags: self.tags,
            ..Default::default()
        };
        let created = self.groups.put(&self.name, &data).await?;
        debug!("Created resource group {}", self.name);
        Ok(self.groups.wrap(&self.name, created))
    }
}

/// An existing resource group
#[derive(Debug, Clone)]
pub struct ResourceGroup {
    groups: ResourceGroups,
    name: String,
    data: ResourceGroupData,
}

impl ResourceGroup {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn id(&self) -> Option<&str> {
        self.data.id.as_deref()
    }

    pub fn region(&self) -> &str {
        &self.data.location
    }

    pub fn tags(&self) -> &BTreeMap<String, String> {
        &self.data.tags
    }

    pub fn provisioning_state(&self) -> Option<&str> {
        self.data
            .properties
            .as_ref()
            .and_then(|p| p.provisioning_state.as_deref())
    }

    pub fn data(&self) -> &ResourceGroupData {
        &self.data
    }

    /// Stage a tag; sent by [`Updatable::apply`]
    pub fn with_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.data.tags.insert(key.into(), value.into());
        self
    }

    pub fn without_tag(&mut self, key: &str) -> &mut Self {
        self.data.tags.remove(key);
        self
    }
}

#[async_trait]
impl Updatable for ResourceGroup {
    async fn apply(&mut self) -> Result<()> {
        let patch = ResourceGroupData {
            location: self.data.location.clone(),
            tags: self.data.tags.clone(),
            ..Default::default()
        };
        self.data = self.groups.patch(&self.name, &patch).await?;
        Ok(())
    }
}

#[async_trait]
impl Refreshable for ResourceGroup {
    async fn refresh(&mut self) -> Result<()> {
        self.data = self.groups.fetch(&self.name).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azmgmt_core::{Pipeline, StaticTokenCredential};
    use serde_json::json;
    use std::sync::Arc;

    fn groups() -> ResourceGroups {
        let pipeline = Pipeline::builder(Arc::new(StaticTokenCredential::new("t")))
            .build()
            .unwrap();
        let client = ArmClient::new(pipeline, crate::client::DEFAULT_ENDPOINT).unwrap();
        ResourceGroups::new(client, "sub-1")
    }

    #[test]
    fn test_paths() {
        let groups = groups();
        assert_eq!(groups.path(None), "/subscriptions/sub-1/resourcegroups");
        assert_eq!(
            groups.path(Some("my rg")),
            "/subscriptions/sub-1/resourcegroups/my%20rg"
        );
    }

    #[test]
    fn test_create_body_omits_server_fields() {
        let data = ResourceGroupData {
            location: "westus".to_string(),
            tags: BTreeMap::from([("env".to_string(), "test".to_string())]),
            ..Default::default()
        };
        assert_eq!(
            serde_json::to_value(&data).unwrap(),
            json!({"location": "westus", "tags": {"env": "test"}})
        );
    }

    #[test]
    fn test_provisioning_state_from_json() {
        let data: ResourceGroupData = serde_json::from_value(json!({
            "id": "/subscriptions/sub-1/resourceGroups/rg-1",
            "name": "rg-1",
            "location": "westus",
            "properties": {"provisioningState": "Succeeded"}
        }))
        .unwrap();
        let group = groups().wrap("rg-1", data);
        assert_eq!(group.provisioning_state(), Some("Succeeded"));
        assert!(group.tags().is_empty());
    }

    #[tokio::test]
    async fn test_create_without_region_fails_locally() {
        let err = groups().define("rg-1").create().await.unwrap_err();
        assert!(matches!(err, Error::Contract(_)));
    }
}
