//! Request construction shared by every operation group

use azmgmt_core::{Error, Method, Pipeline, Request, Result};
use url::Url;

/// Default Resource Manager endpoint
pub const DEFAULT_ENDPOINT: &str = "https://management.azure.com";

/// API version of the subscription and tenant operations
pub const SUBSCRIPTIONS_API_VERSION: &str = "2016-06-01";

/// API version of the provider and resource group operations
pub const RESOURCES_API_VERSION: &str = "2019-08-01";

/// A pipeline bound to a Resource Manager endpoint
#[derive(Clone, Debug)]
pub struct ArmClient {
    pipeline: Pipeline,
    endpoint: Url,
}

impl ArmClient {
    pub fn new(pipeline: Pipeline, endpoint: &str) -> Result<Self> {
        let mut endpoint = Url::parse(endpoint)
            .map_err(|e| Error::Config(format!("invalid endpoint '{}': {}", endpoint, e)))?;
        // Request paths are joined relative to the endpoint, keeping any prefix
        if !endpoint.path().ends_with('/') {
            let path = format!("{}/", endpoint.path());
            endpoint.set_path(&path);
        }
        Ok(Self { pipeline, endpoint })
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// Build a request for `path` below the endpoint at `api_version`
    pub fn request(&self, method: Method, path: &str, api_version: &str) -> Result<Request> {
        let url = self
            .endpoint
            .join(path.trim_start_matches('/'))
            .map_err(|e| Error::Contract(format!("invalid request path '{}': {}", path, e)))?;
        Ok(Request::new(method, url).with_query("api-version", api_version))
    }
}

/// Percent-encode one path segment
pub(crate) fn segment(value: &str) -> String {
    urlencoding::encode(value).into_owned()
}
