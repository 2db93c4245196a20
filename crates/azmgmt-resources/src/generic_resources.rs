//! Resources of any type, addressed by id

use crate::capabilities::Refreshable;
use crate::client::{ArmClient, RESOURCES_API_VERSION, segment};
use async_trait::async_trait;
use azmgmt_core::{Method, PagedSequence, Poller, ResourceId, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A resource of any provider type
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GenericResourceData {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub resource_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub tags: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
}

impl GenericResourceData {
    pub fn provisioning_state(&self) -> Option<&str> {
        self.properties.get("provisioningState")?.as_str()
    }
}

/// Generic resource operations
#[derive(Clone, Debug)]
pub struct GenericResources {
    client: ArmClient,
    subscription_id: String,
}

impl GenericResources {
    pub(crate) fn new(client: ArmClient, subscription_id: impl Into<String>) -> Self {
        Self {
            client,
            subscription_id: subscription_id.into(),
        }
    }

    /// Fetch a resource; `api_version` must be one its provider supports
    pub async fn get_by_id(&self, id: &str, api_version: &str) -> Result<GenericResource> {
        let data = self.fetch(id, api_version).await?;
        Ok(GenericResource {
            resources: self.clone(),
            id: ResourceId::parse(id)?,
            api_version: api_version.to_string(),
            data,
        })
    }

    /// Start a create or update. The poller's result is the final resource.
    pub async fn begin_create_or_update_by_id(
        &self,
        id: &str,
        api_version: &str,
        resource: &GenericResourceData,
    ) -> Result<Poller> {
        ResourceId::parse(id)?;
        let request = self
            .client
            .request(Method::PUT, id, api_version)?
            .with_json(resource)?;
        self.client
            .pipeline()
            .begin_long_running_operation(request)
            .await
    }

    pub async fn begin_delete_by_id(&self, id: &str, api_version: &str) -> Result<Poller> {
        ResourceId::parse(id)?;
        let request = self.client.request(Method::DELETE, id, api_version)?;
        self.client
            .pipeline()
            .begin_long_running_operation(request)
            .await
    }

    pub async fn list_by_resource_group(
        &self,
        resource_group: &str,
    ) -> Result<PagedSequence<GenericResourceData>> {
        let path = format!(
            "/subscriptions/{}/resourceGroups/{}/resources",
            segment(&self.subscription_id),
            segment(resource_group)
        );
        let request = self
            .client
            .request(Method::GET, &path, RESOURCES_API_VERSION)?;
        self.client.pipeline().list(request).await
    }

    async fn fetch(&self, id: &str, api_version: &str) -> Result<GenericResourceData> {
        let request = self.client.request(Method::GET, id, api_version)?;
        self.client.pipeline().send_json(request).await
    }
}

/// An existing resource
#[derive(Debug, Clone)]
pub struct GenericResource {
    resources: GenericResources,
    id: ResourceId,
    api_version: String,
    data: GenericResourceData,
}

impl GenericResource {
    pub(crate) fn from_data(
        resources: GenericResources,
        id: ResourceId,
        api_version: &str,
        data: GenericResourceData,
    ) -> Self {
        Self {
            resources,
            id,
            api_version: api_version.to_string(),
            data,
        }
    }

    pub fn id(&self) -> &ResourceId {
        &self.id
    }

    pub fn api_version(&self) -> &str {
        &self.api_version
    }

    pub fn data(&self) -> &GenericResourceData {
        &self.data
    }

    pub fn into_data(self) -> GenericResourceData {
        self.data
    }
}

#[async_trait]
impl Refreshable for GenericResource {
    async fn refresh(&mut self) -> Result<()> {
        self.data = self
            .resources
            .fetch(self.id.id(), &self.api_version)
            .await?;
        Ok(())
    }
}
