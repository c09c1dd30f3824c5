//! Async reconciler.
//!
//! Drives one resource at a time through ARM's long-running operation
//! protocol. A submitted operation is waited on for at most the inner
//! deadline; if it is still running after that, its handle is persisted on
//! the AzureCluster status as a [`Future`] and the pass reports
//! [`ReconcileError::OperationNotDone`]. The next pass finds the future and
//! polls it once instead of submitting again.

use crate::error::{
    DEFAULT_TRANSIENT_REQUEUE, OperationNotDoneError, ReconcileError, ResourceAction,
};
use crate::metrics::Metrics;
use crate::scope::ClusterScope;
use crate::spec::ResourceSpec;
use azure_client::{
    AzureClientTrait, AzureError, OperationHandle, PollStatus, ResourceBody, ResourceRef, Submitted,
};
use crds::{Future, FutureType};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};


/// Inner deadline for a single long-running operation
pub const DEFAULT_OPERATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Delay between polls when ARM sends no `Retry-After`
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Requeue hint after a pass was cancelled
const CANCELLED_REQUEUE: Duration = Duration::from_secs(1);

/// Deadlines and cancellation for one reconcile pass
#[derive(Debug, Clone)]
pub struct OperationContext {
    deadline: Instant,
    cancel: CancellationToken,
    operation_timeout: Duration,
    poll_interval: Duration,
}

impl OperationContext {
    /// Context whose outer deadline is `timeout` from now
    pub fn new(timeout: Duration, cancel: CancellationToken) -> Self {
        Self {
            deadline: Instant::now() + timeout,
            cancel,
            operation_timeout: DEFAULT_OPERATION_TIMEOUT,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    /// Override the inner per-operation deadline
    #[must_use]
    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = timeout;
        self
    }

    /// Override the poll interval
    #[must_use]
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// Whether the pass was cancelled
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Deadline for waiting on one operation, never past the outer deadline
    pub fn inner_deadline(&self) -> Instant {
        std::cmp::min(Instant::now() + self.operation_timeout, self.deadline)
    }

    /// Run one cloud call under the outer deadline and cancellation.
    ///
    /// The outer `Err` means the call was abandoned; the inner result is the
    /// call's own outcome.
    pub async fn run<T, F>(&self, call: F) -> Result<Result<T, AzureError>, ReconcileError>
    where
        F: std::future::Future<Output = Result<T, AzureError>>,
    {
        tokio::select! {
            biased;
            result = call => Ok(result),
            () = self.cancel.cancelled() => {
                Err(ReconcileError::transient("reconcile cancelled", CANCELLED_REQUEUE))
            }
            () = tokio::time::sleep_until(self.deadline) => Err(ReconcileError::transient(
                "reconcile deadline exceeded",
                DEFAULT_TRANSIENT_REQUEUE,
            )),
        }
    }
}

/// How waiting on a freshly submitted operation ended
#[derive(Debug)]
enum Waited {
    Succeeded,
    Pending,
    /// The operation itself failed; nothing is left to poll
    Failed(AzureError),
    /// Polling failed; the operation may still be running
    Interrupted(AzureError),
}

/// Issues mutations and tracks their long-running operations
pub struct AsyncReconciler {
    client: Arc<dyn AzureClientTrait>,
    metrics: Arc<Metrics>,
}

impl AsyncReconciler {
    /// Create a reconciler over the given client
    pub fn new(client: Arc<dyn AzureClientTrait>, metrics: Arc<Metrics>) -> Self {
        Self { client, metrics }
    }

    /// Underlying ARM client, for read-only lookups
    pub fn client(&self) -> &dyn AzureClientTrait {
        self.client.as_ref()
    }

    /// Bring one resource to its desired state.
    ///
    /// Returns the resource as last observed: the existing body when nothing
    /// needed to change, otherwise the result of the completed operation.
    pub async fn create_or_update_resource(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        spec: &dyn ResourceSpec,
        service: &str,
    ) -> Result<Option<ResourceBody>, ReconcileError> {
        let reference = spec.resource_ref(scope.subscription_id());
        let rg = spec.resource_group_name();
        let name = spec.resource_name();
        let type_ = spec.operation_type();

        debug!("Getting {} (service: {})", reference, service);
        let existing = match ctx.run(self.client.get(&reference)).await {
            Ok(Ok(body)) => Some(body),
            Ok(Err(e)) if e.is_not_found() => None,
            Ok(Err(e)) => {
                return Err(ReconcileError::from(e).for_resource(ResourceAction::Get, rg, name, service));
            }
            Err(e) => return Err(e.for_resource(ResourceAction::Get, rg, name, service)),
        };

        let action = if existing.is_none() && type_ == FutureType::Put {
            ResourceAction::Create
        } else {
            ResourceAction::Update
        };
        let wrap = |e: ReconcileError| e.for_resource(action, rg, name, service);

        // ARM exposes a resource to GET while its PUT is still running
        if let Some(future) = scope.long_running_operation_state(name, service, type_) {
            return self.resume(scope, ctx, &reference, future).await.map_err(wrap);
        }

        let Some(parameters) = spec.parameters(existing.as_ref()).map_err(wrap)? else {
            debug!("{} is up to date (service: {})", reference, service);
            return Ok(existing);
        };

        debug!("Submitting {} {} (service: {})", type_, reference, service);
        let submitted = match type_ {
            FutureType::Patch => ctx.run(self.client.begin_update(&reference, &parameters)).await,
            _ => {
                ctx.run(
                    self.client
                        .begin_create_or_update(&reference, &parameters, parameters.etag()),
                )
                .await
            }
        };
        let submitted = submitted.map_err(wrap)?.map_err(|e| wrap(e.into()))?;
        self.metrics.record_async_operation(type_.as_str(), "submitted");

        let result = self
            .complete(scope, ctx, spec, service, type_, &reference, submitted)
            .await
            .map_err(wrap)?;
        info!("{} {}d (service: {})", reference, action, service);
        Ok(result)
    }

    /// Delete one resource; an absent resource is already deleted.
    pub async fn delete_resource(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        spec: &dyn ResourceSpec,
        service: &str,
    ) -> Result<(), ReconcileError> {
        let reference = spec.resource_ref(scope.subscription_id());
        let rg = spec.resource_group_name();
        let name = spec.resource_name();
        let wrap = |e: ReconcileError| e.for_resource(ResourceAction::Delete, rg, name, service);

        debug!("Getting {} before delete (service: {})", reference, service);
        match ctx.run(self.client.get(&reference)).await.map_err(wrap)? {
            Ok(_) => {}
            Err(e) if e.is_not_found() => {
                if scope
                    .long_running_operation_state(name, service, FutureType::Delete)
                    .is_some()
                {
                    info!("{} is gone, clearing pending delete (service: {})", reference, service);
                    scope.delete_long_running_operation_state(name, service, FutureType::Delete);
                }
                debug!("{} already deleted (service: {})", reference, service);
                return Ok(());
            }
            Err(e) => return Err(wrap(e.into())),
        }

        if let Some(future) = scope.long_running_operation_state(name, service, FutureType::Delete) {
            return self
                .resume(scope, ctx, &reference, future)
                .await
                .map(|_| ())
                .map_err(wrap);
        }

        debug!("Submitting DELETE {} (service: {})", reference, service);
        let submitted = ctx
            .run(self.client.begin_delete(&reference))
            .await
            .map_err(wrap)?
            .map_err(|e| wrap(e.into()))?;
        self.metrics.record_async_operation(FutureType::Delete.as_str(), "submitted");

        self.complete(scope, ctx, spec, service, FutureType::Delete, &reference, submitted)
            .await
            .map_err(wrap)?;
        info!("{} deleted (service: {})", reference, service);
        Ok(())
    }

    /// Finish a fresh submission: return the result, or persist a future
    #[allow(clippy::too_many_arguments, reason = "internal helper threading the pass state")]
    async fn complete(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        spec: &dyn ResourceSpec,
        service: &str,
        type_: FutureType,
        reference: &ResourceRef,
        submitted: Submitted,
    ) -> Result<Option<ResourceBody>, ReconcileError> {
        let handle = match submitted {
            Submitted::Done(result) => {
                scope.delete_long_running_operation_state(spec.resource_name(), service, type_);
                self.metrics.record_async_operation(type_.as_str(), "done");
                return Ok(result);
            }
            Submitted::InProgress(handle) => handle,
        };

        match self.wait(ctx, &handle).await {
            Waited::Succeeded => {
                scope.delete_long_running_operation_state(spec.resource_name(), service, type_);
                self.metrics.record_async_operation(type_.as_str(), "done");
                self.fetch_result(ctx, &handle).await
            }
            Waited::Failed(e) => {
                warn!("{} {} failed: {}", type_, reference, e);
                self.metrics.record_async_operation(type_.as_str(), "failed");
                Err(e.into())
            }
            Waited::Pending => Err(self.persist(scope, spec, service, type_, &handle)),
            Waited::Interrupted(e) => {
                warn!("Lost track of {} {}: {}", type_, reference, e);
                let not_done = self.persist(scope, spec, service, type_, &handle);
                match not_done {
                    ReconcileError::OperationNotDone(_) => Err(e.into()),
                    bug => Err(bug),
                }
            }
        }
    }

    /// Poll a fresh operation until it finishes or the inner deadline passes
    async fn wait(&self, ctx: &OperationContext, handle: &OperationHandle) -> Waited {
        let deadline = ctx.inner_deadline();
        let mut delay = ctx.poll_interval;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || ctx.is_cancelled() {
                return Waited::Pending;
            }
            tokio::select! {
                () = ctx.cancel.cancelled() => return Waited::Pending,
                () = tokio::time::sleep(delay.min(remaining)) => {}
            }

            debug!("Polling {} {}", handle.method.as_str(), handle.resource_url);
            match ctx.run(self.client.poll(handle)).await {
                Err(_) => return Waited::Pending,
                Ok(Ok(PollStatus::Succeeded)) => return Waited::Succeeded,
                Ok(Ok(PollStatus::InProgress { retry_after })) => {
                    delay = retry_after.unwrap_or(ctx.poll_interval);
                }
                Ok(Err(e @ AzureError::OperationFailed { .. })) => return Waited::Failed(e),
                Ok(Err(e)) => return Waited::Interrupted(e),
            }
        }
    }

    /// Poll a persisted future exactly once
    async fn resume(
        &self,
        scope: &mut ClusterScope,
        ctx: &OperationContext,
        reference: &ResourceRef,
        future: Future,
    ) -> Result<Option<ResourceBody>, ReconcileError> {
        let handle = match OperationHandle::from_token(&future.data) {
            Ok(handle) => handle,
            Err(e) => {
                warn!("Discarding unreadable {} future for {}: {}", future.type_, reference, e);
                scope.delete_long_running_operation_state(&future.name, &future.service_name, future.type_);
                return Err(ReconcileError::transient(
                    format!("discarded unreadable {} future: {}", future.type_, e),
                    CANCELLED_REQUEUE,
                ));
            }
        };

        debug!("Resuming {} on {}", future.type_, reference);
        match ctx.run(self.client.poll(&handle)).await? {
            Ok(PollStatus::InProgress { .. }) => {
                debug!("{} on {} still in progress", future.type_, reference);
                self.metrics.record_async_operation(future.type_.as_str(), "pending");
                Err(ReconcileError::OperationNotDone(OperationNotDoneError::new(future)))
            }
            Ok(PollStatus::Succeeded) => {
                info!("{} on {} completed", future.type_, reference);
                scope.delete_long_running_operation_state(&future.name, &future.service_name, future.type_);
                self.metrics.record_async_operation(future.type_.as_str(), "done");
                self.fetch_result(ctx, &handle).await
            }
            Err(e @ AzureError::OperationFailed { .. }) => {
                warn!("{} on {} failed: {}", future.type_, reference, e);
                scope.delete_long_running_operation_state(&future.name, &future.service_name, future.type_);
                self.metrics.record_async_operation(future.type_.as_str(), "failed");
                Err(e.into())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn fetch_result(
        &self,
        ctx: &OperationContext,
        handle: &OperationHandle,
    ) -> Result<Option<ResourceBody>, ReconcileError> {
        Ok(ctx.run(self.client.result(handle)).await??)
    }

    /// Store the handle on the status and build the not-done error
    fn persist(
        &self,
        scope: &mut ClusterScope,
        spec: &dyn ResourceSpec,
        service: &str,
        type_: FutureType,
        handle: &OperationHandle,
    ) -> ReconcileError {
        let data = match handle.to_token() {
            Ok(data) => data,
            Err(e) => {
                return ReconcileError::Programmer(format!("failed to encode operation handle: {}", e));
            }
        };
        let future = Future {
            type_,
            resource_kind: format!("{:?}", spec.kind()),
            resource_group: spec.resource_group_name().to_string(),
            service_name: service.to_string(),
            name: spec.resource_name().to_string(),
            data,
        };
        info!(
            "{} on {}/{} still running, saved for the next pass (service: {})",
            type_, future.resource_group, future.name, service
        );
        scope.set_long_running_operation_state(future.clone());
        self.metrics.record_async_operation(type_.as_str(), "pending");
        ReconcileError::OperationNotDone(OperationNotDoneError::new(future))
    }
}
