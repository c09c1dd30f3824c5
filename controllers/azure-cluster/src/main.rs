//! AzureCluster Controller
//!
//! Reconciles the Azure infrastructure behind a Cluster API `AzureCluster`:
//! resource group, virtual network, security groups, route tables, subnets,
//! the API server load balancer with its public IP, private endpoints and
//! resource group tags. Long-running ARM operations are persisted on the
//! AzureCluster status and resumed on later passes instead of blocking.

mod async_ops;
mod backoff;
mod config;
mod controller;
mod error;
mod metrics;
mod orchestrator;
mod predicates;
mod probes;
mod reconciler;
mod scope;
mod service;
mod services;
mod spec;
mod store;
mod watcher;

#[cfg(test)]
mod test_utils;

use crate::config::Config;
use crate::controller::Controller;
use crate::error::ControllerError;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and reqwest both pull in rustls; pick the provider once for the process
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        warn!("A rustls crypto provider was already installed");
    }

    info!("Starting AzureCluster Controller");

    let config = Config::from_env()?;
    config.log();

    let controller = Controller::new(config).await?;
    controller.run().await?;

    Ok(())
}
