use crate::error::CloudError;
use serde_json::Value;
use std::time::Duration;

/// Lifecycle of a long-running operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationState {
    /// Triggering request accepted, not yet polled
    Started,
    InProgress,
    Succeeded,
    Failed,
    Canceled,
}

impl OperationState {
    /// Parse a `status` or `provisioningState` value. Anything that is not a
    /// terminal state (`Accepted`, `Creating`, `Updating`, ...) is in progress.
    pub fn parse(value: &str) -> Self {
        match value.to_ascii_lowercase().as_str() {
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "canceled" | "cancelled" => Self::Canceled,
            _ => Self::InProgress,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Canceled)
    }
}

impl std::fmt::Display for OperationState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Started => "Started",
            Self::InProgress => "InProgress",
            Self::Succeeded => "Succeeded",
            Self::Failed => "Failed",
            Self::Canceled => "Canceled",
        };
        f.write_str(name)
    }
}

/// Snapshot of an operation after the last status check
#[derive(Debug, Clone, PartialEq)]
pub struct OperationStatus {
    pub state: OperationState,
    /// Delay the service asked for before the next check
    pub retry_after: Option<Duration>,
    /// Final payload, set once `state` is Succeeded
    pub result: Option<Value>,
    /// Error payload, set once `state` is Failed or Canceled
    pub error: Option<CloudError>,
}

impl OperationStatus {
    pub fn new(state: OperationState) -> Self {
        Self {
            state,
            retry_after: None,
            result: None,
            error: None,
        }
    }

    pub fn succeeded(result: Option<Value>) -> Self {
        Self {
            result,
            ..Self::new(OperationState::Succeeded)
        }
    }
}

/// `status` of an operation resource, else `properties.provisioningState`
pub(crate) fn state_from_body(body: &Value) -> Option<OperationState> {
    body.get("status")
        .and_then(Value::as_str)
        .or_else(|| {
            body.get("properties")
                .and_then(|p| p.get("provisioningState"))
                .and_then(Value::as_str)
        })
        .map(OperationState::parse)
}

/// `error` of an operation resource, else `properties.error`
pub(crate) fn error_from_body(body: &Value) -> Option<CloudError> {
    body.get("error")
        .or_else(|| body.get("properties").and_then(|p| p.get("error")))
        .and_then(|e| serde_json::from_value::<CloudError>(e.clone()).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(OperationState::parse("SUCCEEDED"), OperationState::Succeeded);
        assert_eq!(OperationState::parse("Cancelled"), OperationState::Canceled);
        assert_eq!(OperationState::parse("Accepted"), OperationState::InProgress);
        assert_eq!(OperationState::parse("Deleting"), OperationState::InProgress);
        assert!(!OperationState::Started.is_terminal());
        assert!(OperationState::Failed.is_terminal());
    }

    #[test]
    fn test_state_from_body() {
        assert_eq!(
            state_from_body(&json!({"status": "InProgress"})),
            Some(OperationState::InProgress)
        );
        assert_eq!(
            state_from_body(&json!({"properties": {"provisioningState": "Succeeded"}})),
            Some(OperationState::Succeeded)
        );
        assert_eq!(state_from_body(&json!({"name": "rg"})), None);
        assert_eq!(state_from_body(&Value::Null), None);
    }

    #[test]
    fn test_error_from_body() {
        let body = json!({"status": "Failed", "error": {"code": "Quota", "message": "limit"}});
        assert_eq!(error_from_body(&body), Some(CloudError::new("Quota", "limit")));
        let body = json!({"properties": {"error": {"code": "X", "message": "y"}}});
        assert_eq!(error_from_body(&body).unwrap().code, "X");
        assert!(error_from_body(&json!({"status": "Failed"})).is_none());
    }
}
