//! Service loop.
//!
//! A service owns one Azure resource kind. [`ResourceService`] is the shared
//! Reconcile/Delete loop; each kind only supplies a [`ServiceStrategy`] that
//! says whether the kind is managed, which specs it wants and how observed
//! results are written back to the scope.

use crate::async_ops::{AsyncReconciler, OperationContext};
use crate::error::{ReconcileError, more_pressing};
use crate::scope::ClusterScope;
use crate::spec::ResourceSpec;
use async_trait::async_trait;
use azure_client::{AzureClientTrait, ResourceBody};
use crds::FutureType;
use std::sync::Arc;
use tracing::{debug, warn};

/// A per-resource-kind reconciler driven by the orchestrator
#[async_trait]
pub trait Service: Send + Sync {
    /// Service name, used in Future keys and error messages
    fn name(&self) -> &'static str;

    /// Whether this cluster controls the lifecycle of the service's resources
    async fn is_managed(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
    ) -> Result<bool, ReconcileError>;

    /// Bring every resource of the service to its desired state
    async fn reconcile(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
    ) -> Result<(), ReconcileError>;

    /// Delete every resource of the service
    async fn delete(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
    ) -> Result<(), ReconcileError>;
}

/// What distinguishes one resource kind from another
#[async_trait]
pub trait ServiceStrategy: Send + Sync {
    /// Spec type produced for each resource
    type Spec: ResourceSpec;

    /// Service name
    fn name(&self) -> &'static str;

    /// Readiness condition owned by the service
    fn condition_type(&self) -> &'static str;

    /// Verb the service's specs submit with; decides the status reason
    fn operation_type(&self) -> FutureType {
        FutureType::Put
    }

    /// Resources are removed together with a parent; delete does nothing
    fn delete_is_noop(&self) -> bool {
        false
    }

    /// Managed-ness of the service's resources
    async fn is_managed(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        client: &dyn AzureClientTrait,
    ) -> Result<bool, ReconcileError>;

    /// Desired resources, in processing order
    fn specs(&self, scope: &ClusterScope) -> Result<Vec<Self::Spec>, ReconcileError>;

    /// Record a converged resource on the scope
    fn on_applied(
        &self,
        _scope: &mut ClusterScope,
        _spec: &Self::Spec,
        _result: Option<&ResourceBody>,
    ) -> Result<(), ReconcileError> {
        Ok(())
    }
}

/// The shared Reconcile/Delete loop over one strategy
pub struct ResourceService<S> {
    reconciler: Arc<AsyncReconciler>,
    strategy: S,
}

impl<S: ServiceStrategy> ResourceService<S> {
    /// Wrap a strategy
    pub fn new(reconciler: Arc<AsyncReconciler>, strategy: S) -> Self {
        Self { reconciler, strategy }
    }

    fn update_status(&self, scope: &mut ClusterScope, err: Option<&ReconcileError>) {
        let condition = self.strategy.condition_type();
        let name = self.strategy.name();
        match self.strategy.operation_type() {
            FutureType::Patch => scope.update_patch_status(condition, name, err),
            _ => scope.update_put_status(condition, name, err),
        }
    }

    /// Managed-ness and specs, or the error that prevents knowing them
    async fn prepare(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
    ) -> Result<Option<Vec<S::Spec>>, ReconcileError> {
        if !self
            .strategy
            .is_managed(scope, ctx, self.reconciler.client())
            .await?
        {
            return Ok(None);
        }
        self.strategy.specs(scope).map(Some)
    }
}

#[async_trait]
impl<S: ServiceStrategy> Service for ResourceService<S> {
    fn name(&self) -> &'static str {
        self.strategy.name()
    }

    async fn is_managed(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
    ) -> Result<bool, ReconcileError> {
        self.strategy
            .is_managed(scope, ctx, self.reconciler.client())
            .await
    }

    async fn reconcile(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
    ) -> Result<(), ReconcileError> {
        let name = self.strategy.name();
        let specs = match self.prepare(scope, ctx).await {
            Ok(Some(specs)) => specs,
            Ok(None) => {
                debug!("Skipping {} reconcile: resources are not managed", name);
                return Ok(());
            }
            Err(e) => {
                self.update_status(scope, Some(&e));
                return Err(e);
            }
        };

        let mut result: Option<ReconcileError> = None;
        for spec in &specs {
            let outcome = self
                .reconciler
                .create_or_update_resource(scope, ctx, spec, name)
                .await
                .and_then(|body| self.strategy.on_applied(scope, spec, body.as_ref()));
            if let Err(e) = outcome {
                if !e.is_operation_not_done() {
                    warn!("{}: {}", name, e);
                }
                result = more_pressing(result, e);
            }
        }

        self.update_status(scope, result.as_ref());
        result.map_or(Ok(()), Err)
    }

    async fn delete(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
    ) -> Result<(), ReconcileError> {
        let name = self.strategy.name();
        if self.strategy.delete_is_noop() {
            debug!("Skipping {} delete: removed with its parent", name);
            return Ok(());
        }
        let condition = self.strategy.condition_type();
        let specs = match self.prepare(scope, ctx).await {
            Ok(Some(specs)) => specs,
            Ok(None) => {
                debug!("Skipping {} delete: resources are not managed", name);
                return Ok(());
            }
            Err(e) => {
                scope.update_delete_status(condition, name, Some(&e));
                return Err(e);
            }
        };

        let mut result: Option<ReconcileError> = None;
        for spec in &specs {
            if let Err(e) = self.reconciler.delete_resource(scope, ctx, spec, name).await {
                if !e.is_operation_not_done() {
                    warn!("{}: {}", name, e);
                }
                result = more_pressing(result, e);
            }
        }

        scope.update_delete_status(condition, name, result.as_ref());
        result.map_or(Ok(()), Err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorClass;
    use crate::metrics::Metrics;
    use crate::test_utils::{TEST_RESOURCE_GROUP, TEST_SUBSCRIPTION, test_scope};
    use azure_client::{MockAzureClient, MockVerb, ResourceKind, ResourceRef, RouteTable, TypedBody};
    use crds::{ConditionSeverity, ConditionStatus, ROUTE_TABLES_READY_CONDITION, get_condition};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    struct TableSpec {
        name: String,
    }

    impl ResourceSpec for TableSpec {
        fn kind(&self) -> ResourceKind {
            ResourceKind::RouteTable
        }

        fn resource_name(&self) -> &str {
            &self.name
        }

        fn resource_group_name(&self) -> &str {
            TEST_RESOURCE_GROUP
        }

        fn parameters(
            &self,
            existing: Option<&ResourceBody>,
        ) -> Result<Option<ResourceBody>, ReconcileError> {
            Ok(existing.is_none().then(|| {
                RouteTable {
                    location: "westeurope".into(),
                    ..Default::default()
                }
                .into_body()
            }))
        }
    }

    struct Tables {
        names: Vec<&'static str>,
        managed: bool,
    }

    #[async_trait]
    impl ServiceStrategy for Tables {
        type Spec = TableSpec;

        fn name(&self) -> &'static str {
            "routetables"
        }

        fn condition_type(&self) -> &'static str {
            ROUTE_TABLES_READY_CONDITION
        }

        async fn is_managed(
            &self,
            _scope: &mut ClusterScope,
            _ctx: &OperationContext,
            _client: &dyn AzureClientTrait,
        ) -> Result<bool, ReconcileError> {
            Ok(self.managed)
        }

        fn specs(&self, _scope: &ClusterScope) -> Result<Vec<TableSpec>, ReconcileError> {
            Ok(self
                .names
                .iter()
                .map(|n| TableSpec { name: n.to_string() })
                .collect())
        }
    }

    fn service(client: &MockAzureClient, names: Vec<&'static str>, managed: bool) -> ResourceService<Tables> {
        let reconciler = AsyncReconciler::new(
            Arc::new(client.clone()),
            Arc::new(Metrics::new().unwrap()),
        );
        ResourceService::new(Arc::new(reconciler), Tables { names, managed })
    }

    fn ctx() -> OperationContext {
        OperationContext::new(Duration::from_secs(60), CancellationToken::new())
            .with_operation_timeout(Duration::ZERO)
    }

    fn table(name: &str) -> ResourceRef {
        ResourceRef::new(ResourceKind::RouteTable, TEST_SUBSCRIPTION, TEST_RESOURCE_GROUP, name)
    }

    #[tokio::test]
    async fn test_empty_spec_list_sets_condition_true() {
        let client = MockAzureClient::new();
        let mut scope = test_scope();

        service(&client, vec![], true).reconcile(&mut scope, &ctx()).await.unwrap();

        assert!(client.calls().is_empty());
        let status = scope.status();
        let condition = get_condition(&status.conditions, ROUTE_TABLES_READY_CONDITION).unwrap();
        assert_eq!(condition.status, ConditionStatus::True);
    }

    #[tokio::test]
    async fn test_unmanaged_service_makes_no_calls() {
        let client = MockAzureClient::new();
        let mut scope = test_scope();

        service(&client, vec!["a"], false).reconcile(&mut scope, &ctx()).await.unwrap();

        assert!(client.calls().is_empty());
        assert!(scope.status().conditions.is_empty());
    }

    #[tokio::test]
    async fn test_terminal_error_wins_and_every_spec_is_attempted() {
        let client = MockAzureClient::new();
        client.fail_with_status(MockVerb::Put, "a", 400);
        client.set_long_running("b", 3);
        let mut scope = test_scope();

        let err = service(&client, vec!["a", "b"], true)
            .reconcile(&mut scope, &ctx())
            .await
            .unwrap_err();

        assert_eq!(err.class(), ErrorClass::Terminal);
        assert!(err.to_string().starts_with("failed to create resource my-rg/a (service: routetables):"));
        let puts: Vec<String> = client
            .calls_of(MockVerb::Put)
            .into_iter()
            .map(|c| c.resource.name)
            .collect();
        assert_eq!(puts, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(scope.status().long_running_operation_states.len(), 1);

        let status = scope.status();
        let condition = get_condition(&status.conditions, ROUTE_TABLES_READY_CONDITION).unwrap();
        assert_eq!(condition.severity, Some(ConditionSeverity::Error));
    }

    #[tokio::test]
    async fn test_not_done_first_seen_is_kept() {
        let client = MockAzureClient::new();
        client.set_long_running("a", 3);
        client.set_long_running("b", 3);
        let mut scope = test_scope();

        let err = service(&client, vec!["a", "b"], true)
            .reconcile(&mut scope, &ctx())
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "PUT on my-rg/a is not done yet");
        let status = scope.status();
        let condition = get_condition(&status.conditions, ROUTE_TABLES_READY_CONDITION).unwrap();
        assert_eq!(condition.severity, Some(ConditionSeverity::Info));
        assert_eq!(condition.reason.as_deref(), Some(crds::CREATING_REASON));
    }

    #[tokio::test]
    async fn test_delete_missing_resources_succeeds() {
        let client = MockAzureClient::new();
        client.insert(&table("a"), RouteTable::default().into_body());
        let mut scope = test_scope();

        service(&client, vec!["a", "b"], true).delete(&mut scope, &ctx()).await.unwrap();

        assert!(!client.contains(&table("a")));
        assert_eq!(client.count(MockVerb::Delete), 1);
        let status = scope.status();
        let condition = get_condition(&status.conditions, ROUTE_TABLES_READY_CONDITION).unwrap();
        assert_eq!(condition.reason.as_deref(), Some(crds::DELETED_REASON));
    }
}
