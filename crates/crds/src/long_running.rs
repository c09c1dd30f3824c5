//! Persisted long-running operation handles
//!
//! A `Future` records an Azure operation that did not finish within the
//! per-call deadline so the next reconcile can resume polling it instead of
//! submitting the request again.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Kind of submitted operation
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub enum FutureType {
    /// Create or update
    #[serde(rename = "PUT")]
    Put,
    /// Partial update
    #[serde(rename = "PATCH")]
    Patch,
    /// Delete
    #[serde(rename = "DELETE")]
    Delete,
}

impl FutureType {
    /// HTTP verb of the operation
    pub fn as_str(&self) -> &'static str {
        match self {
            FutureType::Put => "PUT",
            FutureType::Patch => "PATCH",
            FutureType::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for FutureType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An in-flight long-running operation persisted on the owner status.
///
/// Keyed by `(service_name, name, type_)`; at most one entry exists per key.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Future {
    /// Operation kind
    #[serde(rename = "type")]
    pub type_: FutureType,

    /// Azure resource kind (e.g. `Microsoft.Network/networkSecurityGroups`)
    #[serde(default)]
    pub resource_kind: String,

    /// Resource group the resource lives in
    pub resource_group: String,

    /// Service that submitted the operation
    pub service_name: String,

    /// Resource name
    pub name: String,

    /// Opaque resume token (base64 of the JSON operation handle)
    pub data: String,
}

impl Future {
    /// Whether this entry matches the store key
    pub fn matches(&self, name: &str, service_name: &str, type_: FutureType) -> bool {
        self.name == name && self.service_name == service_name && self.type_ == type_
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_future_type_serializes_as_verb() {
        let future = Future {
            type_: FutureType::Delete,
            resource_kind: "Microsoft.Resources/resourceGroups".into(),
            resource_group: "rg".into(),
            service_name: "group".into(),
            name: "rg".into(),
            data: "e30=".into(),
        };
        let value = serde_json::to_value(&future).unwrap();
        assert_eq!(value["type"], "DELETE");
        assert_eq!(value["serviceName"], "group");

        let back: Future = serde_json::from_value(value).unwrap();
        assert_eq!(back, future);
    }

    #[test]
    fn test_matches_full_key() {
        let future = Future {
            type_: FutureType::Put,
            resource_kind: String::new(),
            resource_group: "rg".into(),
            service_name: "securitygroups".into(),
            name: "nsg".into(),
            data: String::new(),
        };
        assert!(future.matches("nsg", "securitygroups", FutureType::Put));
        assert!(!future.matches("nsg", "securitygroups", FutureType::Delete));
        assert!(!future.matches("nsg", "subnets", FutureType::Put));
    }
}
