//! Network security group service.
//!
//! Rules are reconciled with a three-way merge between the rules observed on
//! the NSG, the rules declared on the AzureCluster and the rules this
//! controller applied last time (kept in the
//! [`SECURITY_RULE_LAST_APPLIED_ANNOTATION`] annotation):
//!
//! - a declared rule missing from the NSG is added
//! - a rule on the NSG that was never applied by the controller is left alone
//! - a previously applied rule that is no longer declared is removed
//! - a previously applied rule that drifted from its declaration is restored
//!
//! When the merge changes nothing the NSG is not PUT.

use super::virtual_networks::vnet_is_managed;
use crate::async_ops::OperationContext;
use crate::error::ReconcileError;
use crate::scope::ClusterScope;
use crate::service::ServiceStrategy;
use crate::spec::{ResourceSpec, existing_as};
use async_trait::async_trait;
use azure_client::{
    AzureClientTrait, ResourceBody, ResourceKind, SecurityGroup, SecurityGroupProperties, SecurityRule,
    SecurityRuleProperties, TypedBody,
};
use crds::{
    BuildParams, SECURITY_GROUPS_READY_CONDITION, SECURITY_RULE_LAST_APPLIED_ANNOTATION,
    SecurityRuleAccess, SecurityRuleDirection, SecurityRuleProtocol, Tags,
};
use std::collections::BTreeMap;

#[cfg(test)]
#[path = "security_groups_test.rs"]
mod security_groups_test;

/// Service name
pub const SERVICE_NAME: &str = "securitygroups";

/// Last-applied rules: NSG name to rule name to rule
pub type LastAppliedRules = BTreeMap<String, BTreeMap<String, SecurityRule>>;

/// Desired network security group
#[derive(Debug, Clone)]
pub struct NsgSpec {
    name: String,
    resource_group: String,
    location: String,
    cluster_name: String,
    tags: Tags,
    security_rules: Vec<SecurityRule>,
    last_applied: BTreeMap<String, SecurityRule>,
}

impl NsgSpec {
    /// Declared rules in wire form
    pub fn security_rules(&self) -> &[SecurityRule] {
        &self.security_rules
    }

    fn was_applied(&self, rule_name: &str) -> bool {
        self.last_applied
            .keys()
            .any(|name| name.eq_ignore_ascii_case(rule_name))
    }

    fn new_group(&self) -> SecurityGroup {
        SecurityGroup {
            location: self.location.clone(),
            tags: Some(crds::build(BuildParams {
                cluster_name: &self.cluster_name,
                name: Some(&self.name),
                additional: Some(&self.tags),
                ..Default::default()
            })),
            properties: SecurityGroupProperties {
                security_rules: self.security_rules.clone(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

impl ResourceSpec for NsgSpec {
    fn kind(&self) -> ResourceKind {
        ResourceKind::SecurityGroup
    }

    fn resource_name(&self) -> &str {
        &self.name
    }

    fn resource_group_name(&self) -> &str {
        &self.resource_group
    }

    fn parameters(&self, existing: Option<&ResourceBody>) -> Result<Option<ResourceBody>, ReconcileError> {
        let Some(existing) = existing else {
            return Ok(Some(self.new_group().into_body()));
        };
        let nsg = existing_as::<SecurityGroup>(existing, &self.name)?;
        let observed = &nsg.properties.security_rules;

        let mut changed = false;
        let mut merged = Vec::with_capacity(observed.len() + self.security_rules.len());
        for rule in observed {
            match find_rule(&self.security_rules, &rule.name) {
                Some(desired) if !rules_equal(rule, desired) && self.was_applied(&rule.name) => {
                    merged.push(desired.clone());
                    changed = true;
                }
                Some(_) => merged.push(rule.clone()),
                None if self.was_applied(&rule.name) => changed = true,
                None => merged.push(rule.clone()),
            }
        }
        for desired in &self.security_rules {
            if find_rule(observed, &desired.name).is_none() {
                merged.push(desired.clone());
                changed = true;
            }
        }

        if !changed {
            return Ok(None);
        }
        let mut updated = nsg.clone();
        updated.properties.security_rules = merged;
        updated.properties.provisioning_state = None;
        Ok(Some(updated.into_body()))
    }
}

fn find_rule<'a>(rules: &'a [SecurityRule], name: &str) -> Option<&'a SecurityRule> {
    rules.iter().find(|r| r.name.eq_ignore_ascii_case(name))
}

/// Rules are equal when their names match ignoring case and every
/// traffic-matching field is identical.
pub fn rules_equal(a: &SecurityRule, b: &SecurityRule) -> bool {
    let (x, y) = (&a.properties, &b.properties);
    a.name.eq_ignore_ascii_case(&b.name)
        && x.protocol == y.protocol
        && x.direction == y.direction
        && x.access == y.access
        && x.priority == y.priority
        && x.source_address_prefix == y.source_address_prefix
        && x.destination_address_prefix == y.destination_address_prefix
        && x.source_port_range == y.source_port_range
        && x.destination_port_range == y.destination_port_range
}

/// Convert a declared rule to its ARM form; unset prefixes and ports mean any
pub fn to_azure_rule(rule: &crds::SecurityRule) -> SecurityRule {
    let any = |v: &Option<String>| Some(v.clone().unwrap_or_else(|| "*".to_string()));
    SecurityRule {
        name: rule.name.clone(),
        properties: SecurityRuleProperties {
            description: rule.description.clone(),
            protocol: match rule.protocol {
                SecurityRuleProtocol::All => "*",
                SecurityRuleProtocol::Tcp => "Tcp",
                SecurityRuleProtocol::Udp => "Udp",
                SecurityRuleProtocol::Icmp => "Icmp",
            }
            .to_string(),
            direction: match rule.direction {
                SecurityRuleDirection::Inbound => "Inbound",
                SecurityRuleDirection::Outbound => "Outbound",
            }
            .to_string(),
            access: match rule.action {
                SecurityRuleAccess::Allow => "Allow",
                SecurityRuleAccess::Deny => "Deny",
            }
            .to_string(),
            priority: rule.priority,
            source_address_prefix: any(&rule.source),
            source_port_range: any(&rule.source_ports),
            destination_address_prefix: any(&rule.destination),
            destination_port_range: any(&rule.destination_ports),
            provisioning_state: None,
        },
        ..Default::default()
    }
}

/// Strategy for the NSGs attached to cluster subnets
#[derive(Debug, Default)]
pub struct SecurityGroups;

#[async_trait]
impl ServiceStrategy for SecurityGroups {
    type Spec = NsgSpec;

    fn name(&self) -> &'static str {
        SERVICE_NAME
    }

    fn condition_type(&self) -> &'static str {
        SECURITY_GROUPS_READY_CONDITION
    }

    async fn is_managed(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        client: &dyn AzureClientTrait,
    ) -> Result<bool, ReconcileError> {
        vnet_is_managed(scope, ctx, client).await
    }

    fn specs(&self, scope: &ClusterScope) -> Result<Vec<NsgSpec>, ReconcileError> {
        let mut last_applied: LastAppliedRules =
            scope.annotation_json(SECURITY_RULE_LAST_APPLIED_ANNOTATION)?;
        let mut specs: Vec<NsgSpec> = Vec::new();
        for subnet in &scope.network_spec().subnets {
            let group = &subnet.security_group;
            if group.name.is_empty() || specs.iter().any(|s| s.name == group.name) {
                continue;
            }
            let mut tags = scope.additional_tags().clone();
            tags.extend(group.tags.clone());
            specs.push(NsgSpec {
                name: group.name.clone(),
                resource_group: scope.resource_group().to_string(),
                location: scope.location().to_string(),
                cluster_name: scope.cluster_name(),
                tags,
                security_rules: group.security_rules.iter().map(to_azure_rule).collect(),
                last_applied: last_applied.remove(&group.name).unwrap_or_default(),
            });
        }
        Ok(specs)
    }

    fn on_applied(
        &self,
        scope: &mut ClusterScope,
        spec: &NsgSpec,
        result: Option<&ResourceBody>,
    ) -> Result<(), ReconcileError> {
        let Some(result) = result else {
            return Ok(());
        };
        let nsg = existing_as::<SecurityGroup>(result, &spec.name)?;
        // a same-named rule kept at the user's version was never applied by us
        let applied: BTreeMap<String, SecurityRule> = spec
            .security_rules
            .iter()
            .filter(|desired| {
                nsg.properties
                    .security_rules
                    .iter()
                    .any(|observed| rules_equal(observed, desired))
            })
            .map(|r| (r.name.clone(), r.clone()))
            .collect();

        let current: LastAppliedRules = scope.annotation_json(SECURITY_RULE_LAST_APPLIED_ANNOTATION)?;
        let mut updated = current.clone();
        if applied.is_empty() {
            updated.remove(&spec.name);
        } else {
            updated.insert(spec.name.clone(), applied);
        }
        if updated != current {
            scope.update_annotation_json(SECURITY_RULE_LAST_APPLIED_ANNOTATION, &updated)?;
        }
        Ok(())
    }
}
