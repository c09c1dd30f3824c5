//! Unit tests for security group rule reconciliation

use super::*;
use crate::async_ops::{AsyncReconciler, OperationContext};
use crate::metrics::Metrics;
use crate::service::{ResourceService, Service};
use crate::test_utils::{
    TEST_CLUSTER_NAME, TEST_RESOURCE_GROUP, TEST_SUBSCRIPTION, create_test_azure_cluster, scope_for,
    test_rule,
};
use azure_client::{MockAzureClient, MockVerb, ResourceRef};
use crds::{ConditionStatus, SubnetSpec, get_condition};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

const NSG: &str = "test-nsg";

fn allow_ssh() -> crds::SecurityRule {
    test_rule("allow_ssh", 100, "22")
}

fn other() -> crds::SecurityRule {
    test_rule("other", 110, "80")
}

fn custom() -> crds::SecurityRule {
    test_rule("custom", 120, "443")
}

fn nsg_ref() -> ResourceRef {
    ResourceRef::new(ResourceKind::SecurityGroup, TEST_SUBSCRIPTION, TEST_RESOURCE_GROUP, NSG)
}

/// Scope with a single subnet whose NSG declares `rules`
fn scope_with(rules: Vec<crds::SecurityRule>, last_applied: Option<Vec<crds::SecurityRule>>) -> ClusterScope {
    let mut azure_cluster = create_test_azure_cluster(TEST_CLUSTER_NAME, "default");
    azure_cluster.spec.network_spec.subnets = vec![SubnetSpec {
        name: "node-subnet".into(),
        cidr_blocks: vec!["10.1.0.0/16".into()],
        security_group: crds::SecurityGroupSpec {
            name: NSG.into(),
            security_rules: rules,
            ..Default::default()
        },
        ..Default::default()
    }];
    if let Some(applied) = last_applied {
        let bag: LastAppliedRules = BTreeMap::from([(
            NSG.to_string(),
            applied
                .iter()
                .map(|r| (r.name.clone(), to_azure_rule(r)))
                .collect(),
        )]);
        azure_cluster.metadata.annotations = Some(BTreeMap::from([(
            SECURITY_RULE_LAST_APPLIED_ANNOTATION.to_string(),
            serde_json::to_string(&bag).unwrap(),
        )]));
    }
    scope_for(azure_cluster)
}

fn existing_nsg(client: &MockAzureClient, rules: &[crds::SecurityRule]) {
    client.insert(
        &nsg_ref(),
        SecurityGroup {
            location: "westeurope".into(),
            properties: SecurityGroupProperties {
                security_rules: rules.iter().map(to_azure_rule).collect(),
                ..Default::default()
            },
            ..Default::default()
        }
        .into_body(),
    );
}

fn service(client: &MockAzureClient) -> ResourceService<SecurityGroups> {
    let reconciler = AsyncReconciler::new(Arc::new(client.clone()), Arc::new(Metrics::new().unwrap()));
    ResourceService::new(Arc::new(reconciler), SecurityGroups)
}

fn ctx() -> OperationContext {
    OperationContext::new(Duration::from_secs(60), CancellationToken::new())
}

/// Rule names of the single PUT the service made
fn put_rule_names(client: &MockAzureClient) -> Vec<String> {
    let puts = client.calls_of(MockVerb::Put);
    assert_eq!(puts.len(), 1, "expected exactly one PUT");
    let body = puts[0].body.clone().unwrap();
    let nsg = body.as_typed::<SecurityGroup>().unwrap();
    nsg.properties
        .security_rules
        .iter()
        .map(|r| r.name.clone())
        .collect()
}

fn nsg_condition(scope: &ClusterScope) -> ConditionStatus {
    get_condition(&scope.status().conditions, SECURITY_GROUPS_READY_CONDITION)
        .unwrap()
        .status
}

#[tokio::test]
async fn test_new_nsg_is_created_with_declared_rules_and_owner_tags() {
    let client = MockAzureClient::new();
    let mut scope = scope_with(vec![allow_ssh(), other()], None);

    service(&client).reconcile(&mut scope, &ctx()).await.unwrap();

    assert_eq!(put_rule_names(&client), vec!["allow_ssh", "other"]);
    let body = client.calls_of(MockVerb::Put)[0].body.clone().unwrap();
    let tags = body.tags().unwrap();
    assert_eq!(tags.len(), 2);
    assert_eq!(
        tags.get("sigs.k8s.io_cluster-api-provider-azure_cluster_my-cluster"),
        Some(&"owned".to_string())
    );
    assert_eq!(tags.get("Name"), Some(&NSG.to_string()));
    assert_eq!(nsg_condition(&scope), ConditionStatus::True);
}

#[tokio::test]
async fn test_matching_nsg_is_not_put() {
    let client = MockAzureClient::new();
    existing_nsg(&client, &[allow_ssh(), other()]);
    let mut scope = scope_with(vec![allow_ssh(), other()], None);

    service(&client).reconcile(&mut scope, &ctx()).await.unwrap();

    assert_eq!(client.count(MockVerb::Put), 0);
    assert_eq!(nsg_condition(&scope), ConditionStatus::True);
}

#[tokio::test]
async fn test_user_rule_is_preserved() {
    let client = MockAzureClient::new();
    existing_nsg(&client, &[allow_ssh(), custom()]);
    let mut scope = scope_with(vec![allow_ssh(), other()], None);

    service(&client).reconcile(&mut scope, &ctx()).await.unwrap();

    assert_eq!(put_rule_names(&client), vec!["allow_ssh", "custom", "other"]);
    let put = &client.calls_of(MockVerb::Put)[0];
    assert!(put.if_match.is_some());
}

#[tokio::test]
async fn test_previously_applied_rule_is_removed() {
    let client = MockAzureClient::new();
    existing_nsg(&client, &[allow_ssh(), custom(), other()]);
    let mut scope = scope_with(
        vec![allow_ssh(), custom()],
        Some(vec![allow_ssh(), custom(), other()]),
    );

    service(&client).reconcile(&mut scope, &ctx()).await.unwrap();

    assert_eq!(put_rule_names(&client), vec!["allow_ssh", "custom"]);
}

#[tokio::test]
async fn test_last_applied_is_recorded() {
    let client = MockAzureClient::new();
    let mut scope = scope_with(vec![allow_ssh()], None);

    service(&client).reconcile(&mut scope, &ctx()).await.unwrap();

    let bag: LastAppliedRules = scope
        .annotation_json(SECURITY_RULE_LAST_APPLIED_ANNOTATION)
        .unwrap();
    let applied = bag.get(NSG).unwrap();
    assert_eq!(applied.keys().collect::<Vec<_>>(), vec!["allow_ssh"]);
}

#[tokio::test]
async fn test_user_version_of_declared_rule_is_not_recorded_as_applied() {
    let client = MockAzureClient::new();
    let mut users = allow_ssh();
    users.destination_ports = Some("2222".into());
    existing_nsg(&client, &[users.clone()]);
    let mut scope = scope_with(vec![allow_ssh()], None);

    service(&client).reconcile(&mut scope, &ctx()).await.unwrap();
    assert_eq!(client.count(MockVerb::Put), 0);
    let bag: LastAppliedRules = scope
        .annotation_json(SECURITY_RULE_LAST_APPLIED_ANNOTATION)
        .unwrap();
    assert!(!bag.contains_key(NSG));

    // a later pass still leaves the user's rule alone
    service(&client).reconcile(&mut scope, &ctx()).await.unwrap();
    assert_eq!(client.count(MockVerb::Put), 0);
    let stored = client.resource(&nsg_ref()).unwrap();
    let nsg = stored.as_typed::<SecurityGroup>().unwrap();
    assert!(rules_equal(&nsg.properties.security_rules[0], &to_azure_rule(&users)));
}

#[test]
fn test_drifted_rule_is_restored_only_when_previously_applied() {
    let mut drifted = allow_ssh();
    drifted.destination_ports = Some("2222".into());
    let existing = SecurityGroup {
        properties: SecurityGroupProperties {
            security_rules: vec![to_azure_rule(&drifted)],
            ..Default::default()
        },
        ..Default::default()
    }
    .into_body();

    let untracked = &SecurityGroups.specs(&scope_with(vec![allow_ssh()], None)).unwrap()[0];
    assert!(untracked.parameters(Some(&existing)).unwrap().is_none());

    let tracked = &SecurityGroups
        .specs(&scope_with(vec![allow_ssh()], Some(vec![allow_ssh()])))
        .unwrap()[0];
    let body = tracked.parameters(Some(&existing)).unwrap().unwrap();
    let nsg = body.as_typed::<SecurityGroup>().unwrap();
    assert!(rules_equal(&nsg.properties.security_rules[0], &tracked.security_rules()[0]));
}

#[test]
fn test_rule_equality_is_exact_per_field() {
    let a = to_azure_rule(&allow_ssh());
    let mut b = a.clone();
    b.name = "ALLOW_SSH".into();
    assert!(rules_equal(&a, &b));

    b.properties.direction = "Outbound".into();
    assert!(!rules_equal(&a, &b));

    let mut c = a.clone();
    c.properties.protocol = "Udp".into();
    assert!(!rules_equal(&a, &c));

    let mut d = a.clone();
    d.properties.source_address_prefix = Some("10.0.0.0/8".into());
    assert!(!rules_equal(&a, &d));
}

#[test]
fn test_shared_nsg_yields_one_spec() {
    let mut azure_cluster = create_test_azure_cluster(TEST_CLUSTER_NAME, "default");
    let shared = azure_cluster.spec.network_spec.subnets[0].security_group.clone();
    azure_cluster.spec.network_spec.subnets[1].security_group = shared;

    let specs = SecurityGroups.specs(&scope_for(azure_cluster)).unwrap();
    assert_eq!(specs.len(), 1);
    assert_eq!(specs[0].resource_name(), "my-cluster-controlplane-nsg");
}

#[test]
fn test_wrong_kind_is_a_programmer_error() {
    let spec = &SecurityGroups.specs(&scope_with(vec![allow_ssh()], None)).unwrap()[0];
    let err = spec
        .parameters(Some(&azure_client::RouteTable::default().into_body()))
        .unwrap_err();
    assert!(matches!(err, ReconcileError::Programmer(_)));
}
