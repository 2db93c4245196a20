//! ARM resource id parsing
//!
//! Ids look like
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/{type}/{name}[/{childType}/{childName}...]`.
//! Segment keys are matched case-insensitively.

use crate::error::{Error, Result};

/// Return the path segment that follows `key`, matched case-insensitively.
///
/// `extract_from_resource_id("/subscriptions/abc/resourceGroups/rg", "subscriptions")`
/// yields `Some("abc")`.
pub fn extract_from_resource_id<'a>(path: &'a str, key: &str) -> Option<&'a str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    while let Some(segment) = segments.next() {
        if segment.eq_ignore_ascii_case(key) {
            return segments.next();
        }
    }
    None
}

/// A parsed ARM resource id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceId {
    id: String,
    subscription_id: String,
    resource_group: Option<String>,
    provider_namespace: Option<String>,
    /// (type, name) pairs below the provider, outermost first
    types: Vec<(String, String)>,
}

impl ResourceId {
    pub fn parse(id: &str) -> Result<Self> {
        let invalid = |why: &str| Error::Contract(format!("invalid resource id '{}': {}", id, why));
        let segments: Vec<&str> = id.split('/').filter(|s| !s.is_empty()).collect();

        if segments.len() < 2 || !segments[0].eq_ignore_ascii_case("subscriptions") {
            return Err(invalid("must start with /subscriptions/{id}"));
        }
        let subscription_id = segments[1].to_string();
        let mut rest = &segments[2..];

        let mut resource_group = None;
        if rest.len() >= 2 && rest[0].eq_ignore_ascii_case("resourceGroups") {
            resource_group = Some(rest[1].to_string());
            rest = &rest[2..];
        } else if rest.len() == 1 {
            return Err(invalid("dangling segment"));
        }

        let mut provider_namespace = None;
        let mut types = Vec::new();
        if !rest.is_empty() {
            if !rest[0].eq_ignore_ascii_case("providers") || rest.len() < 2 {
                return Err(invalid("expected providers/{namespace}"));
            }
            provider_namespace = Some(rest[1].to_string());
            let pairs = &rest[2..];
            if pairs.len() % 2 != 0 {
                return Err(invalid("type without a name"));
            }
            types = pairs
                .chunks(2)
                .map(|pair| (pair[0].to_string(), pair[1].to_string()))
                .collect();
        }

        Ok(Self {
            id: id.to_string(),
            subscription_id,
            resource_group,
            provider_namespace,
            types,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn subscription_id(&self) -> &str {
        &self.subscription_id
    }

    pub fn resource_group(&self) -> Option<&str> {
        self.resource_group.as_deref()
    }

    pub fn provider_namespace(&self) -> Option<&str> {
        self.provider_namespace.as_deref()
    }

    /// Full type, e.g. `Microsoft.Network/virtualNetworks/subnets`
    pub fn resource_type(&self) -> Option<String> {
        let namespace = self.provider_namespace.as_ref()?;
        if self.types.is_empty() {
            return None;
        }
        let mut full = namespace.clone();
        for (t, _) in &self.types {
            full.push('/');
            full.push_str(t);
        }
        Some(full)
    }

    /// Name of the innermost resource, or the resource group / subscription
    pub fn name(&self) -> &str {
        if let Some((_, name)) = self.types.last() {
            name
        } else if let Some(rg) = &self.resource_group {
            rg
        } else {
            &self.subscription_id
        }
    }

    /// Id of the enclosing resource for child resources
    pub fn parent(&self) -> Option<ResourceId> {
        if self.types.len() < 2 {
            return None;
        }
        let mut parent = self.clone();
        parent.types.pop();
        parent.id = parent.render();
        Some(parent)
    }

    /// True when both ids live in the same subscription
    pub fn same_subscription(&self, other: &ResourceId) -> bool {
        self.subscription_id
            .eq_ignore_ascii_case(&other.subscription_id)
    }

    fn render(&self) -> String {
        let mut out = format!("/subscriptions/{}", self.subscription_id);
        if let Some(rg) = &self.resource_group {
            out.push_str("/resourceGroups/");
            out.push_str(rg);
        }
        if let Some(ns) = &self.provider_namespace {
            out.push_str("/providers/");
            out.push_str(ns);
            for (t, n) in &self.types {
                out.push('/');
                out.push_str(t);
                out.push('/');
                out.push_str(n);
            }
        }
        out
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.id)
    }
}
