//! Kubernetes resource watchers.
//!
//! AzureClusters are reconciled through a kube_runtime [`Controller`] that
//! also watches `Cluster` objects and maps them to the AzureCluster their
//! infrastructureRef points at, so un-pausing a Cluster or setting its
//! infrastructureRef triggers a pass. A second, lighter watch cancels
//! in-flight normal passes as soon as an AzureCluster is marked for deletion.

use crate::error::ControllerError;
use crate::predicates::cluster_to_azure_cluster;
use crate::reconciler::Reconciler;
use crds::{AzureCluster, Cluster};
use futures::StreamExt;
use kube::{Api, Client, ResourceExt};
use kube_runtime::controller::{Action, Config as ControllerConfig};
use kube_runtime::{watcher, Controller, WatchStreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Debounce between the last event on an object and its reconcile
const DEBOUNCE: Duration = Duration::from_secs(1);

/// Watches AzureCluster and Cluster resources.
pub struct Watcher {
    reconciler: Arc<Reconciler>,
    azure_cluster_api: Api<AzureCluster>,
    cluster_api: Api<Cluster>,
    concurrency: u16,
    shutdown: CancellationToken,
}

impl Watcher {
    /// Watch `namespace`, or all namespaces when `None`
    pub fn new(
        client: Client,
        namespace: Option<&str>,
        reconciler: Arc<Reconciler>,
        concurrency: u16,
        shutdown: CancellationToken,
    ) -> Self {
        let (azure_cluster_api, cluster_api) = match namespace {
            Some(ns) => (Api::namespaced(client.clone(), ns), Api::namespaced(client, ns)),
            None => (Api::all(client.clone()), Api::all(client)),
        };
        Self {
            reconciler,
            azure_cluster_api,
            cluster_api,
            concurrency,
            shutdown,
        }
    }

    /// Run the controller and the deletion observer until shutdown
    pub async fn run(self) -> Result<(), ControllerError> {
        info!("Starting AzureCluster watcher");
        let observer = observe_deletions(
            self.azure_cluster_api.clone(),
            self.reconciler.clone(),
            self.shutdown.clone(),
        );
        let controller = self.run_controller();
        tokio::join!(observer, controller);
        info!("AzureCluster watcher stopped");
        Ok(())
    }

    async fn run_controller(&self) {
        let reconcile = |obj: Arc<AzureCluster>, ctx: Arc<Reconciler>| async move {
            debug!("Reconciling AzureCluster {}/{}", obj.namespace().unwrap_or_default(), obj.name_any());
            ctx.reconcile(&obj).await
        };
        let error_policy = |obj: Arc<AzureCluster>, error: &ControllerError, ctx: Arc<Reconciler>| -> Action {
            ctx.error_policy(&obj, error)
        };

        let controller_config = ControllerConfig::default()
            .debounce(DEBOUNCE)
            .concurrency(self.concurrency);
        let shutdown = self.shutdown.clone();

        Controller::new(self.azure_cluster_api.clone(), watcher::Config::default())
            .watches(self.cluster_api.clone(), watcher::Config::default(), cluster_to_azure_cluster)
            .with_config(controller_config)
            .graceful_shutdown_on(async move { shutdown.cancelled().await })
            .run(reconcile, error_policy, self.reconciler.clone())
            .for_each(|res| async move {
                match res {
                    Ok((obj, _action)) => debug!("Reconciled AzureCluster {}", obj.name),
                    Err(e) => error!("AzureCluster controller error: {}", e),
                }
            })
            .await;
    }
}

/// Cancel in-flight passes of AzureClusters that got a deletion timestamp
async fn observe_deletions(api: Api<AzureCluster>, reconciler: Arc<Reconciler>, shutdown: CancellationToken) {
    let events = watcher::watcher(api, watcher::Config::default())
        .default_backoff()
        .applied_objects()
        .take_until(shutdown.cancelled_owned());
    futures::pin_mut!(events);

    while let Some(event) = events.next().await {
        match event {
            Ok(azure_cluster) if azure_cluster.metadata.deletion_timestamp.is_some() => {
                reconciler.cancel_in_flight(&azure_cluster);
            }
            Ok(_) => {}
            Err(e) => error!("AzureCluster deletion watch error: {}", e),
        }
    }
}
