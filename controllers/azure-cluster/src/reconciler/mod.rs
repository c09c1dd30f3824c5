//! AzureCluster reconciliation.
//!
//! One call to [`Reconciler::reconcile`] is one pass: look up the owner
//! Cluster, apply the skip predicates, open a [`ClusterScope`], run the
//! orchestrator on the normal or delete path, write the scope back once and
//! turn the outcome into a requeue [`Action`].
//!
//! Outcome mapping:
//! - success: reset the backoff and wait for the next change
//! - operation not done: requeue after a jittered short delay
//! - transient: requeue after the error's hint
//! - terminal: return the error so the error policy backs off
//! - programmer error: log it, publish an event and wait for a change

use crate::async_ops::OperationContext;
use crate::backoff::FibonacciBackoff;
use crate::config::Config;
use crate::error::{ControllerError, ErrorClass, ReconcileError};
use crate::metrics::Metrics;
use crate::orchestrator::ClusterOrchestrator;
use crate::predicates::{owner_cluster_name, skip_reason};
use crate::scope::ClusterScope;
use crate::store::{ClusterEvent, ObjectStore};
use crds::{AzureCluster, ClusterPhase};
use kube::ResourceExt;
use kube_runtime::controller::Action;
use rand::Rng;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
mod reconciler_test;

/// Event reasons
const REASON_PROVISIONED: &str = "InfrastructureReady";
const REASON_DELETED: &str = "InfrastructureDeleted";
const REASON_FAILED: &str = "ReconcileFailed";
const REASON_TRANSIENT: &str = "TransientFailure";
const REASON_BUG: &str = "ProgrammerError";

/// Which path a pass took
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Path {
    Normal,
    Delete,
}

/// Reconciles AzureCluster resources
pub struct Reconciler {
    store: Arc<dyn ObjectStore>,
    orchestrator: ClusterOrchestrator,
    metrics: Arc<Metrics>,
    config: Config,
    shutdown: CancellationToken,
    /// Per-object backoff for the error policy (namespace/name -> backoff)
    backoff_states: Mutex<HashMap<String, FibonacciBackoff>>,
    /// Cancellation of in-flight normal passes (namespace/name -> token)
    in_flight: Mutex<HashMap<String, CancellationToken>>,
}

fn key_of(azure_cluster: &AzureCluster) -> String {
    format!("{}/{}", azure_cluster.namespace().unwrap_or_default(), azure_cluster.name_any())
}

impl Reconciler {
    /// Creates a new reconciler instance.
    pub fn new(
        store: Arc<dyn ObjectStore>,
        orchestrator: ClusterOrchestrator,
        metrics: Arc<Metrics>,
        config: Config,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            store,
            orchestrator,
            metrics,
            config,
            shutdown,
            backoff_states: Mutex::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
        }
    }

    /// Run one pass for `azure_cluster`
    pub async fn reconcile(&self, azure_cluster: &AzureCluster) -> Result<Action, ControllerError> {
        let started = Instant::now();
        let key = key_of(azure_cluster);
        let result = self.reconcile_inner(azure_cluster, &key).await;
        let outcome = match &result {
            Ok(Some(Ok(()))) => "success",
            Ok(Some(Err(e))) => match e.class() {
                ErrorClass::NotDone => "not_done",
                ErrorClass::Transient => "transient",
                ErrorClass::Terminal => "terminal",
                ErrorClass::Programmer => "programmer_error",
            },
            Ok(None) => "skipped",
            Err(_) => "error",
        };
        self.metrics.record_reconcile(outcome, started.elapsed().as_secs_f64());

        match result {
            Ok(None) => Ok(Action::await_change()),
            Ok(Some(Ok(()))) => {
                self.reset_backoff(&key);
                Ok(Action::await_change())
            }
            Ok(Some(Err(e))) => self.action_for(azure_cluster, &key, e).await,
            Err(e) => Err(e),
        }
    }

    /// Error policy: back off along the Fibonacci sequence per object
    pub fn error_policy(&self, azure_cluster: &AzureCluster, error: &ControllerError) -> Action {
        let key = key_of(azure_cluster);
        let delay = match self.backoff_states.lock() {
            Ok(mut states) => states.entry(key.clone()).or_default().next_backoff(),
            Err(_) => FibonacciBackoff::default().next_backoff(),
        };
        warn!("Reconcile of AzureCluster {} failed, retrying in {:?}: {}", key, delay, error);
        Action::requeue(delay)
    }

    /// Cancel an in-flight normal pass, e.g. because the object is being deleted
    pub fn cancel_in_flight(&self, azure_cluster: &AzureCluster) {
        let key = key_of(azure_cluster);
        if let Some(token) = self.in_flight.lock().ok().and_then(|mut m| m.remove(&key)) {
            info!("Cancelling in-flight reconcile of AzureCluster {}", key);
            token.cancel();
        }
    }

    /// `Ok(None)` when the pass was skipped; otherwise the engine outcome
    async fn reconcile_inner(
        &self,
        azure_cluster: &AzureCluster,
        key: &str,
    ) -> Result<Option<Result<(), ReconcileError>>, ControllerError> {
        let namespace = azure_cluster.namespace().unwrap_or_default();
        let owner = match owner_cluster_name(azure_cluster) {
            Some(name) => self.store.get_cluster(&namespace, &name).await?,
            None => None,
        };
        if let Some(reason) = skip_reason(azure_cluster, owner.as_ref()) {
            info!("Skipping AzureCluster {}: {}", key, reason);
            return Ok(None);
        }
        let Some(cluster) = owner else {
            return Ok(None);
        };

        let mut scope = ClusterScope::new(
            cluster,
            azure_cluster.clone(),
            self.config.default_subscription_id.as_deref(),
        )?;
        let path = if scope.is_deleting() { Path::Delete } else { Path::Normal };
        if path == Path::Delete && !scope.has_finalizer() {
            debug!("AzureCluster {} is deleting without our finalizer, nothing to do", key);
            return Ok(None);
        }

        let token = self.shutdown.child_token();
        if path == Path::Normal {
            if let Ok(mut in_flight) = self.in_flight.lock() {
                in_flight.insert(key.to_string(), token.clone());
            }
        }
        let ctx = OperationContext::new(self.config.reconcile_timeout, token)
            .with_operation_timeout(self.config.operation_timeout)
            .with_poll_interval(self.config.poll_interval);

        let phase_before = scope.status().phase;
        let result = match path {
            Path::Normal => {
                scope.add_finalizer();
                self.orchestrator.reconcile(&mut scope, &ctx).await
            }
            Path::Delete => {
                let result = self.orchestrator.delete(&mut scope, &ctx).await;
                if result.is_ok() {
                    scope.remove_finalizer();
                }
                result
            }
        };
        let phase_after = scope.status().phase;

        if path == Path::Normal {
            if let Ok(mut in_flight) = self.in_flight.lock() {
                in_flight.remove(key);
            }
        }
        scope.close(self.store.as_ref()).await?;

        if result.is_ok() && phase_after != phase_before {
            let event = match phase_after {
                ClusterPhase::Deleted => ClusterEvent::normal(REASON_DELETED, "Azure infrastructure deleted"),
                _ => ClusterEvent::normal(REASON_PROVISIONED, "Azure infrastructure is ready"),
            };
            self.publish(azure_cluster, event).await;
        }
        Ok(Some(result))
    }

    async fn action_for(
        &self,
        azure_cluster: &AzureCluster,
        key: &str,
        err: ReconcileError,
    ) -> Result<Action, ControllerError> {
        match err.class() {
            ErrorClass::NotDone => {
                let delay = jitter(self.config.not_done_requeue);
                debug!("AzureCluster {} has operations in flight, requeue in {:?}: {}", key, delay, err);
                Ok(Action::requeue(delay))
            }
            ErrorClass::Transient => {
                let delay = err.requeue_after().unwrap_or(self.config.not_done_requeue);
                warn!("Transient failure reconciling AzureCluster {}, requeue in {:?}: {}", key, delay, err);
                self.publish(azure_cluster, ClusterEvent::warning(REASON_TRANSIENT, err.to_string()))
                    .await;
                Ok(Action::requeue(delay))
            }
            ErrorClass::Terminal => {
                error!("Reconcile of AzureCluster {} failed: {}", key, err);
                self.publish(azure_cluster, ClusterEvent::warning(REASON_FAILED, err.to_string()))
                    .await;
                Err(ControllerError::Reconcile(err))
            }
            ErrorClass::Programmer => {
                error!("BUG: reconcile of AzureCluster {} hit a controller bug: {}", key, err);
                self.publish(azure_cluster, ClusterEvent::warning(REASON_BUG, err.to_string()))
                    .await;
                Ok(Action::await_change())
            }
        }
    }

    async fn publish(&self, azure_cluster: &AzureCluster, event: ClusterEvent) {
        if let Err(e) = self.store.publish_event(azure_cluster, event).await {
            warn!("Failed to publish event for AzureCluster {}: {}", key_of(azure_cluster), e);
        }
    }

    fn reset_backoff(&self, key: &str) {
        if let Ok(mut states) = self.backoff_states.lock() {
            if let Some(backoff) = states.get_mut(key) {
                backoff.reset();
            }
        }
    }
}

/// `base` plus up to half of it again, so requeues of many clusters spread out
fn jitter(base: Duration) -> Duration {
    let spread = base.as_millis() as u64 / 2;
    if spread == 0 {
        return base;
    }
    base + Duration::from_millis(rand::thread_rng().gen_range(0..=spread))
}
