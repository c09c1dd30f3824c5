//! Status conditions
//!
//! Kubernetes-style conditions recorded on the AzureCluster status, one per
//! reconciled service plus the `InfrastructureReady` umbrella.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Umbrella condition summarizing all services
pub const INFRASTRUCTURE_READY_CONDITION: &str = "InfrastructureReady";
/// Resource group readiness
pub const RESOURCE_GROUP_READY_CONDITION: &str = "ResourceGroupReady";
/// Virtual network readiness
pub const VNET_READY_CONDITION: &str = "VNetReady";
/// Subnets readiness
pub const SUBNETS_READY_CONDITION: &str = "SubnetsReady";
/// Route tables readiness
pub const ROUTE_TABLES_READY_CONDITION: &str = "RouteTablesReady";
/// Network security groups readiness
pub const SECURITY_GROUPS_READY_CONDITION: &str = "NSGReady";
/// Public IP addresses readiness
pub const PUBLIC_IPS_READY_CONDITION: &str = "PublicIPsReady";
/// Load balancers readiness
pub const LOAD_BALANCERS_READY_CONDITION: &str = "LoadBalancerReady";
/// Private endpoints readiness
pub const PRIVATE_ENDPOINTS_READY_CONDITION: &str = "PrivateEndpointsReady";
/// Resource group tags readiness
pub const TAGS_READY_CONDITION: &str = "TagsReady";

/// A create or update operation is in flight
pub const CREATING_REASON: &str = "Creating";
/// A patch operation is in flight
pub const UPDATING_REASON: &str = "Updating";
/// A delete operation is in flight
pub const DELETING_REASON: &str = "Deleting";
/// The resource was deleted
pub const DELETED_REASON: &str = "Deleted";
/// A create, update or patch failed
pub const FAILED_REASON: &str = "Failed";
/// A delete failed
pub const DELETION_FAILED_REASON: &str = "DeletionFailed";
/// Reconcile hit a retryable cloud failure
pub const TRANSIENT_FAILURE_REASON: &str = "TransientFailure";
/// Reconcile hit a controller bug
pub const PROGRAMMER_ERROR_REASON: &str = "ProgrammerError";

/// Condition status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, Default, PartialEq, Eq)]
pub enum ConditionStatus {
    /// Condition holds
    True,
    /// Condition does not hold
    False,
    /// Condition state cannot be determined
    #[default]
    Unknown,
}

/// Severity of a False condition
#[derive(Debug, Clone, Copy, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
pub enum ConditionSeverity {
    /// Something is broken and needs attention
    Error,
    /// A retryable problem was hit
    Warning,
    /// Progress is being made
    Info,
}

/// A single status condition
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Condition type (e.g. `NSGReady`)
    #[serde(rename = "type")]
    pub type_: String,

    /// Condition status
    pub status: ConditionStatus,

    /// Severity, only meaningful when status is False
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub severity: Option<ConditionSeverity>,

    /// Machine-readable reason
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,

    /// Human-readable message
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    /// Last time the status flipped
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<DateTime<Utc>>,
}

impl Condition {
    /// A True condition of the given type
    pub fn true_condition(type_: &str) -> Self {
        Self {
            type_: type_.to_string(),
            status: ConditionStatus::True,
            severity: None,
            reason: None,
            message: None,
            last_transition_time: Some(Utc::now()),
        }
    }

    /// A False condition with reason, severity and message
    pub fn false_condition(
        type_: &str,
        reason: &str,
        severity: ConditionSeverity,
        message: impl Into<String>,
    ) -> Self {
        Self {
            type_: type_.to_string(),
            status: ConditionStatus::False,
            severity: Some(severity),
            reason: Some(reason.to_string()),
            message: Some(message.into()),
            last_transition_time: Some(Utc::now()),
        }
    }

    /// Whether the condition holds
    pub fn is_true(&self) -> bool {
        self.status == ConditionStatus::True
    }
}

/// Find a condition by type
pub fn get_condition<'a>(conditions: &'a [Condition], type_: &str) -> Option<&'a Condition> {
    conditions.iter().find(|c| c.type_ == type_)
}

/// Whether the condition of the given type exists and is True
pub fn is_condition_true(conditions: &[Condition], type_: &str) -> bool {
    get_condition(conditions, type_).is_some_and(Condition::is_true)
}

/// Upsert a condition.
///
/// `lastTransitionTime` is carried over from the previous condition of the
/// same type unless the status changed.
pub fn set_condition(conditions: &mut Vec<Condition>, mut condition: Condition) {
    match conditions.iter_mut().find(|c| c.type_ == condition.type_) {
        Some(existing) => {
            if existing.status == condition.status {
                condition.last_transition_time = existing.last_transition_time;
            }
            *existing = condition;
        }
        None => conditions.push(condition),
    }
}

/// Remove a condition by type
pub fn delete_condition(conditions: &mut Vec<Condition>, type_: &str) {
    conditions.retain(|c| c.type_ != type_);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_set_condition_inserts_and_replaces() {
        let mut conditions = Vec::new();
        set_condition(&mut conditions, Condition::true_condition(VNET_READY_CONDITION));
        set_condition(
            &mut conditions,
            Condition::false_condition(
                SUBNETS_READY_CONDITION,
                CREATING_REASON,
                ConditionSeverity::Info,
                "in progress",
            ),
        );
        assert_eq!(conditions.len(), 2);

        set_condition(&mut conditions, Condition::true_condition(SUBNETS_READY_CONDITION));
        assert_eq!(conditions.len(), 2);
        assert!(is_condition_true(&conditions, SUBNETS_READY_CONDITION));
    }

    #[test]
    fn test_transition_time_kept_when_status_unchanged() {
        let earlier = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single();
        let mut first = Condition::false_condition(
            SECURITY_GROUPS_READY_CONDITION,
            CREATING_REASON,
            ConditionSeverity::Info,
            "a",
        );
        first.last_transition_time = earlier;
        let mut conditions = vec![first];

        set_condition(
            &mut conditions,
            Condition::false_condition(
                SECURITY_GROUPS_READY_CONDITION,
                FAILED_REASON,
                ConditionSeverity::Error,
                "b",
            ),
        );
        let c = get_condition(&conditions, SECURITY_GROUPS_READY_CONDITION).unwrap();
        assert_eq!(c.last_transition_time, earlier);
        assert_eq!(c.reason.as_deref(), Some(FAILED_REASON));

        set_condition(&mut conditions, Condition::true_condition(SECURITY_GROUPS_READY_CONDITION));
        let c = get_condition(&conditions, SECURITY_GROUPS_READY_CONDITION).unwrap();
        assert_ne!(c.last_transition_time, earlier);
    }

    #[test]
    fn test_condition_serializes_type_field() {
        let c = Condition::true_condition(TAGS_READY_CONDITION);
        let value = serde_json::to_value(&c).unwrap();
        assert_eq!(value["type"], "TagsReady");
        assert_eq!(value["status"], "True");
        assert!(value.get("severity").is_none());
    }

    #[test]
    fn test_delete_condition() {
        let mut conditions = vec![Condition::true_condition(TAGS_READY_CONDITION)];
        delete_condition(&mut conditions, TAGS_READY_CONDITION);
        assert!(conditions.is_empty());
    }
}
