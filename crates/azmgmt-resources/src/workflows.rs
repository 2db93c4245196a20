//! Multi-step workflows
//!
//! These compose single operations with waiting, progress reporting and
//! follow-up calls.

use crate::capabilities::{Creatable, Refreshable};
use crate::generic_resources::{GenericResource, GenericResourceData};
use crate::manager::ResourceManager;
use crate::resource_groups::ResourceGroup;
use azmgmt_core::{
    CloudError, Error, LroCallback, OperationState, PollingConfig, ResourceId, Result,
};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

fn polling_with_timeout(manager: &ResourceManager, timeout: Duration) -> PollingConfig {
    PollingConfig {
        timeout_secs: Some(timeout.as_secs()),
        ..manager.client().pipeline().config().polling.clone()
    }
}

/// Create a resource group and wait until it is provisioned
///
/// # Arguments
///
/// * `manager` - Resource Manager for the target subscription
/// * `name` - Resource group name
/// * `region` - Region the group's metadata lives in
/// * `tags` - Tags to set on the group
/// * `timeout` - Maximum time to wait for provisioning
pub async fn create_resource_group_and_wait(
    manager: &ResourceManager,
    name: &str,
    region: &str,
    tags: &BTreeMap<String, String>,
    timeout: Duration,
) -> Result<ResourceGroup> {
    let mut definition = manager.resource_groups().define(name).with_region(region);
    for (key, value) in tags {
        definition = definition.with_tag(key.clone(), value.clone());
    }

    // Step 1: Create
    let mut group = definition.create().await?;

    // Step 2: Refresh until the group leaves its transitional state
    let interval = Duration::from_secs(
        manager
            .client()
            .pipeline()
            .config()
            .polling
            .default_interval_secs,
    );
    let started = Instant::now();
    loop {
        let state = group
            .provisioning_state()
            .map(OperationState::parse)
            .unwrap_or(OperationState::Succeeded);
        match state {
            OperationState::Succeeded => return Ok(group),
            OperationState::Failed | OperationState::Canceled => {
                return Err(Error::OperationFailed {
                    error: Some(CloudError::new(
                        "ResourceGroupProvisioningFailed",
                        format!("resource group '{}' is {}", name, state),
                    )),
                });
            }
            OperationState::Started | OperationState::InProgress => {}
        }
        let elapsed = started.elapsed();
        if elapsed >= timeout {
            return Err(Error::PollTimeout(timeout));
        }
        debug!("Resource group {} is {}, checking again", name, state);
        tokio::time::sleep(interval.min(timeout - elapsed)).await;
        group.refresh().await?;
    }
}

/// Delete a resource group and wait for completion
///
/// # Arguments
///
/// * `manager` - Resource Manager for the target subscription
/// * `name` - Resource group to delete
/// * `timeout` - Maximum time to wait for completion
/// * `on_progress` - Optional callback for progress updates
pub async fn delete_resource_group_and_wait(
    manager: &ResourceManager,
    name: &str,
    timeout: Duration,
    on_progress: Option<LroCallback>,
) -> Result<()> {
    let mut poller = manager
        .resource_groups()
        .begin_delete(name)
        .await?
        .with_polling_config(polling_with_timeout(manager, timeout));
    if let Some(callback) = on_progress {
        poller = poller.with_progress(callback);
    }
    poller.wait().await?;
    Ok(())
}

/// Create or update a resource by id and wait for completion
///
/// # Arguments
///
/// * `manager` - Resource Manager for the target subscription
/// * `id` - Full resource id
/// * `api_version` - API version supported by the resource's provider
/// * `resource` - Desired state of the resource
/// * `timeout` - Maximum time to wait for completion
/// * `on_progress` - Optional callback for progress updates
///
/// # Example
///
/// ```rust,ignore
/// use azmgmt_resources::{GenericResourceData, create_or_update_resource_and_wait};
/// use std::time::Duration;
///
/// let resource = GenericResourceData {
///     location: Some("westus".to_string()),
///     properties: serde_json::json!({"addressSpace": {"addressPrefixes": ["10.0.0.0/16"]}}),
///     ..Default::default()
/// };
/// let vnet = create_or_update_resource_and_wait(
///     &manager,
///     "/subscriptions/sub/resourceGroups/rg/providers/Microsoft.Network/virtualNetworks/vnet",
///     "2019-11-01",
///     &resource,
///     Duration::from_secs(600),
///     None,
/// )
/// .await?;
/// ```
pub async fn create_or_update_resource_and_wait(
    manager: &ResourceManager,
    id: &str,
    api_version: &str,
    resource: &GenericResourceData,
    timeout: Duration,
    on_progress: Option<LroCallback>,
) -> Result<GenericResource> {
    let resources = manager.generic_resources();

    // Step 1: Send the PUT
    let mut poller = resources
        .begin_create_or_update_by_id(id, api_version, resource)
        .await?
        .with_polling_config(polling_with_timeout(manager, timeout));
    if let Some(callback) = on_progress {
        poller = poller.with_progress(callback);
    }

    // Step 2: Poll until complete; a PUT finishes with the resource body
    let data = match poller.wait().await? {
        Some(value) => serde_json::from_value(value)?,
        None => return resources.get_by_id(id, api_version).await,
    };
    Ok(GenericResource::from_data(
        resources,
        ResourceId::parse(id)?,
        api_version,
        data,
    ))
}

/// A resource the created one depends on
#[derive(Debug, Clone, Copy)]
pub struct RemoteReference<'a> {
    pub id: &'a str,
    pub api_version: &'a str,
}

/// Create a resource, then reconcile it with a resource it references.
///
/// Steps, in order:
/// 1. create `resource` at `id` and wait for it
/// 2. fetch `remote` when it lives in the same subscription as `id`;
///    references into other subscriptions are passed to `reconcile` as `None`
/// 3. call `reconcile` with the created and remote state; a returned value is
///    applied as a second create-or-update
/// 4. refresh `parent` so it reflects the new child
///
/// # Arguments
///
/// * `manager` - Resource Manager for the subscription of `id`
/// * `id` - Full id of the resource to create
/// * `api_version` - API version for `id`
/// * `resource` - Desired state of the resource
/// * `remote` - Optional referenced resource
/// * `reconcile` - Decides whether the created resource needs an update
/// * `parent` - Optional handle refreshed at the end
/// * `timeout` - Maximum wait for each create-or-update
#[allow(clippy::too_many_arguments)]
pub async fn create_then_reconcile<F>(
    manager: &ResourceManager,
    id: &str,
    api_version: &str,
    resource: &GenericResourceData,
    remote: Option<RemoteReference<'_>>,
    reconcile: F,
    parent: Option<&mut GenericResource>,
    timeout: Duration,
) -> Result<GenericResource>
where
    F: FnOnce(&GenericResourceData, Option<&GenericResourceData>) -> Option<GenericResourceData>,
{
    let own_id = ResourceId::parse(id)?;

    // Step 1: Create
    let created =
        create_or_update_resource_and_wait(manager, id, api_version, resource, timeout, None)
            .await?;

    // Step 2: Fetch the referenced resource if it is in our subscription
    let remote_state = match remote {
        Some(reference) => {
            let remote_id = ResourceId::parse(reference.id)?;
            if remote_id.same_subscription(&own_id) {
                let fetched = manager
                    .generic_resources()
                    .get_by_id(reference.id, reference.api_version)
                    .await?;
                Some(fetched.into_data())
            } else {
                debug!(
                    "Not fetching {} from subscription {}",
                    reference.id,
                    remote_id.subscription_id()
                );
                None
            }
        }
        None => None,
    };

    // Step 3: Reconcile
    let result = match reconcile(created.data(), remote_state.as_ref()) {
        Some(update) => {
            info!("Reconciling {} with its reference", id);
            create_or_update_resource_and_wait(manager, id, api_version, &update, timeout, None)
                .await?
        }
        None => created,
    };

    // Step 4: Refresh the parent
    if let Some(parent) = parent {
        parent.refresh().await?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use azmgmt_core::{Method, Request, Response, StaticTokenCredential};
    use serde_json::json;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tower::service_fn;

    /// A manager whose resource group never leaves `Creating`
    fn stuck_group_manager(refreshes: Arc<AtomicU32>) -> ResourceManager {
        let transport = service_fn(move |req: Request| {
            let refreshes = refreshes.clone();
            async move {
                if req.method == Method::GET {
                    refreshes.fetch_add(1, Ordering::SeqCst);
                }
                let status = if req.method == Method::PUT { 201 } else { 200 };
                Ok::<_, Error>(Response::json_body(
                    status,
                    &json!({
                        "name": "rg-slow",
                        "location": "westus",
                        "properties": {"provisioningState": "Creating"}
                    }),
                ))
            }
        });
        ResourceManager::configure()
            .with_transport(transport)
            .authenticate(Arc::new(StaticTokenCredential::new("t")))
            .unwrap()
            .with_subscription("sub-1")
    }

    #[tokio::test(start_paused = true)]
    async fn test_group_wait_stops_at_timeout_not_next_interval() {
        let refreshes = Arc::new(AtomicU32::new(0));
        let manager = stuck_group_manager(refreshes.clone());
        let timeout = Duration::from_secs(5);

        let started = Instant::now();
        let err = create_resource_group_and_wait(
            &manager,
            "rg-slow",
            "westus",
            &BTreeMap::new(),
            timeout,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, Error::PollTimeout(t) if t == timeout));
        // The default 30 second interval is cut short by the 5 second budget
        assert!(started.elapsed() < Duration::from_secs(10));
        assert_eq!(refreshes.load(Ordering::SeqCst), 1);
    }
}
