//! Main controller implementation.
//!
//! Wires the Kubernetes client, the ARM client, the reconciler and the
//! probe server together and runs them until shutdown.

use crate::async_ops::AsyncReconciler;
use crate::config::Config;
use crate::error::ControllerError;
use crate::metrics::Metrics;
use crate::orchestrator::ClusterOrchestrator;
use crate::probes::{self, ProbeState};
use crate::reconciler::Reconciler;
use crate::store::KubeObjectStore;
use crate::watcher::Watcher;
use azure_client::AzureClient;
use kube::Client;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Main controller for AzureCluster infrastructure.
pub struct Controller {
    watcher: JoinHandle<Result<(), ControllerError>>,
    probes: JoinHandle<Result<(), ControllerError>>,
    shutdown: CancellationToken,
}

impl Controller {
    /// Creates a new controller instance and starts its tasks.
    pub async fn new(config: Config) -> Result<Self, ControllerError> {
        info!("Initializing AzureCluster Controller");

        let kube_client = Client::try_default().await?;
        let azure_client = AzureClient::new(config.arm_endpoint.clone(), config.access_token.clone())?;
        let metrics = Arc::new(Metrics::new()?);
        let shutdown = CancellationToken::new();

        let engine = Arc::new(AsyncReconciler::new(Arc::new(azure_client), metrics.clone()));
        let orchestrator = ClusterOrchestrator::azure_cluster(engine);
        info!("Services: {}", orchestrator.service_names().join(", "));
        info!("Delete order: {}", orchestrator.delete_names().join(", "));

        let reconciler = Arc::new(Reconciler::new(
            Arc::new(KubeObjectStore::new(kube_client.clone())),
            orchestrator,
            metrics.clone(),
            config.clone(),
            shutdown.clone(),
        ));

        let probe_state = ProbeState::new(metrics);
        let probes = tokio::spawn(probes::serve(
            config.probe_bind_address,
            probe_state.clone(),
            shutdown.clone(),
        ));

        let watcher = Watcher::new(
            kube_client,
            config.namespace.as_deref(),
            reconciler,
            config.max_concurrent_reconciles,
            shutdown.clone(),
        );
        let watcher = tokio::spawn(watcher.run());
        probe_state.set_ready(true);

        Ok(Self {
            watcher,
            probes,
            shutdown,
        })
    }

    /// Runs the controller until shutdown.
    pub async fn run(mut self) -> Result<(), ControllerError> {
        info!("AzureCluster Controller running");

        let result = tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Received shutdown signal");
                Ok(())
            }
            result = &mut self.watcher => {
                result.map_err(|e| ControllerError::Watch(format!("AzureCluster watcher panicked: {}", e)))?
            }
            result = &mut self.probes => {
                result.map_err(|e| ControllerError::Server(format!("probe server panicked: {}", e)))?
            }
        };

        // in-flight passes observe the cancellation through their operation context
        self.shutdown.cancel();
        if !self.watcher.is_finished() {
            if let Err(e) = (&mut self.watcher).await {
                warn!("AzureCluster watcher did not stop cleanly: {}", e);
            }
        }
        info!("Shutdown complete");
        result
    }
}
