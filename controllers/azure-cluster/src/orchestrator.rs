//! Cluster orchestrator.
//!
//! Runs every service of an AzureCluster in dependency order and derives the
//! cluster's phase and readiness from the aggregated outcome.
//!
//! On the normal path a service that is merely not done does not stop later
//! services; any other failure ends the pass. On the delete path services run
//! in delete order (reverse create order unless configured otherwise) and the
//! first failure of any kind ends the pass. A managed resource group is
//! deleted on its own, which takes everything inside it.

use crate::async_ops::{AsyncReconciler, OperationContext};
use crate::error::{ErrorClass, ReconcileError, more_pressing};
use crate::scope::ClusterScope;
use crate::service::{ResourceService, Service};
use crate::services::{
    groups::Groups, load_balancers::LoadBalancers, private_endpoints::PrivateEndpoints, public_ips::PublicIps,
    route_tables::RouteTables, security_groups::SecurityGroups, subnets::Subnets, tags::ResourceGroupTags,
    virtual_networks::VirtualNetworks,
};
use crds::{ClusterPhase, INFRASTRUCTURE_READY_CONDITION};
use std::sync::Arc;
use tracing::{debug, info};

/// Name the orchestrator reports its own condition under
const ORCHESTRATOR_NAME: &str = "cluster";

/// Drives the services of one AzureCluster
pub struct ClusterOrchestrator {
    group: Box<dyn Service>,
    services: Vec<Box<dyn Service>>,
    // indices into `services`
    delete_order: Vec<usize>,
}

impl ClusterOrchestrator {
    /// Orchestrator over a resource group service and the services that live
    /// inside it, in create order
    pub fn new(group: Box<dyn Service>, services: Vec<Box<dyn Service>>) -> Self {
        let delete_order = (0..services.len()).rev().collect();
        Self {
            group,
            services,
            delete_order,
        }
    }

    /// Delete services in the given order instead of reverse create order.
    /// Services not named keep their reverse create order after the named ones.
    pub fn with_delete_order(mut self, names: &[&str]) -> Self {
        let mut order: Vec<usize> = names
            .iter()
            .filter_map(|name| self.services.iter().position(|s| s.name() == *name))
            .collect();
        let rest: Vec<usize> = (0..self.services.len())
            .rev()
            .filter(|i| !order.contains(i))
            .collect();
        order.extend(rest);
        self.delete_order = order;
        self
    }

    /// The full AzureCluster service set.
    ///
    /// NSGs and route tables come before subnets so the subnets can
    /// reference them. Subnets are removed with their VNet, so the VNet has
    /// to go before the NSGs and route tables those subnets still use.
    pub fn azure_cluster(reconciler: Arc<AsyncReconciler>) -> Self {
        let r = || reconciler.clone();
        Self::new(
            Box::new(ResourceService::new(r(), Groups)),
            vec![
                Box::new(ResourceService::new(r(), VirtualNetworks)),
                Box::new(ResourceService::new(r(), SecurityGroups)),
                Box::new(ResourceService::new(r(), RouteTables)),
                Box::new(ResourceService::new(r(), Subnets)),
                Box::new(ResourceService::new(r(), PublicIps)),
                Box::new(ResourceService::new(r(), LoadBalancers)),
                Box::new(ResourceService::new(r(), PrivateEndpoints)),
                Box::new(ResourceService::new(r(), ResourceGroupTags)),
            ],
        )
        .with_delete_order(&[
            "tags",
            "privateendpoints",
            "loadbalancers",
            "publicips",
            "subnets",
            "virtualnetwork",
            "routetables",
            "securitygroups",
        ])
    }

    /// Service names in create order
    pub fn service_names(&self) -> Vec<&'static str> {
        std::iter::once(self.group.name())
            .chain(self.services.iter().map(|s| s.name()))
            .collect()
    }

    /// Service names in delete order, used when the group is not managed
    pub fn delete_names(&self) -> Vec<&'static str> {
        self.delete_order.iter().map(|&i| self.services[i].name()).collect()
    }

    /// Bring every service to its desired state
    pub async fn reconcile(&self, scope: &mut ClusterScope, ctx: &OperationContext) -> Result<(), ReconcileError> {
        let mut result: Option<ReconcileError> = None;
        for service in std::iter::once(&self.group).chain(self.services.iter()) {
            debug!("Reconciling service {}", service.name());
            if let Err(e) = service.reconcile(scope, ctx).await {
                let not_done = e.is_operation_not_done();
                result = more_pressing(result, e);
                if !not_done {
                    break;
                }
            }
        }

        scope.update_put_status(INFRASTRUCTURE_READY_CONDITION, ORCHESTRATOR_NAME, result.as_ref());
        match result.as_ref().map(ReconcileError::class) {
            None => {
                if scope.status().phase != ClusterPhase::Ready {
                    info!("AzureCluster {}/{} is ready", scope.namespace(), scope.name());
                }
                scope.set_phase(ClusterPhase::Ready);
                scope.set_ready(true, None);
            }
            Some(ErrorClass::NotDone | ErrorClass::Transient) => {
                // A failed cluster stays failed until a pass fully succeeds
                if scope.status().phase != ClusterPhase::Failed {
                    scope.set_phase(ClusterPhase::Provisioning);
                    scope.set_ready(false, None);
                }
            }
            Some(ErrorClass::Terminal | ErrorClass::Programmer) => {
                scope.set_phase(ClusterPhase::Failed);
                scope.set_ready(false, result.as_ref().map(ToString::to_string));
            }
        }
        result.map_or(Ok(()), Err)
    }

    /// Remove every managed resource of the cluster
    pub async fn delete(&self, scope: &mut ClusterScope, ctx: &OperationContext) -> Result<(), ReconcileError> {
        scope.set_phase(ClusterPhase::Deleting);
        let result = self.delete_services(scope, ctx).await;

        scope.update_delete_status(INFRASTRUCTURE_READY_CONDITION, ORCHESTRATOR_NAME, result.as_ref().err());
        match &result {
            Ok(()) => {
                info!("AzureCluster {}/{} infrastructure deleted", scope.namespace(), scope.name());
                scope.set_phase(ClusterPhase::Deleted);
                scope.set_ready(false, None);
            }
            // retried on a later pass like an operation still in flight
            Err(e) if matches!(e.class(), ErrorClass::NotDone | ErrorClass::Transient) => {
                scope.set_ready(false, None)
            }
            Err(e) => {
                scope.set_phase(ClusterPhase::Failed);
                scope.set_ready(false, Some(e.to_string()));
            }
        }
        result
    }

    async fn delete_services(&self, scope: &mut ClusterScope, ctx: &OperationContext) -> Result<(), ReconcileError> {
        if self.group.is_managed(scope, ctx).await? {
            info!(
                "Deleting managed resource group {} with everything in it",
                scope.resource_group()
            );
            return self.group.delete(scope, ctx).await;
        }
        for service in self.delete_order.iter().map(|&i| &self.services[i]) {
            debug!("Deleting service {}", service.name());
            service.delete(scope, ctx).await?;
        }
        Ok(())
    }
}
