//! Controller configuration loaded from environment variables.

use crate::error::ControllerError;
use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Default Azure Resource Manager endpoint
pub const DEFAULT_ARM_ENDPOINT: &str = "https://management.azure.com";

/// Runtime configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Bearer token for ARM
    pub access_token: String,
    /// ARM endpoint
    pub arm_endpoint: String,
    /// Subscription used when an AzureCluster does not name one
    pub default_subscription_id: Option<String>,
    /// Namespace to watch; all namespaces when unset
    pub namespace: Option<String>,
    /// Outer deadline of one reconcile pass
    pub reconcile_timeout: Duration,
    /// Inner deadline of one long-running operation
    pub operation_timeout: Duration,
    /// Poll interval while waiting on an operation
    pub poll_interval: Duration,
    /// Base requeue delay while operations are in flight
    pub not_done_requeue: Duration,
    /// Maximum concurrent reconciles
    pub max_concurrent_reconciles: u16,
    /// Address of the probe and metrics server
    pub probe_bind_address: SocketAddr,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            access_token: String::new(),
            arm_endpoint: DEFAULT_ARM_ENDPOINT.to_string(),
            default_subscription_id: None,
            namespace: None,
            reconcile_timeout: Duration::from_secs(900),
            operation_timeout: Duration::from_secs(15),
            poll_interval: Duration::from_secs(1),
            not_done_requeue: Duration::from_secs(15),
            max_concurrent_reconciles: 10,
            probe_bind_address: SocketAddr::from(([0, 0, 0, 0], 8080)),
        }
    }
}

/// Parse an optional variable, keeping `default` when it is unset
fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T, ControllerError>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw.trim().parse().map_err(|e| {
            ControllerError::InvalidConfig(format!("{} has an invalid value {:?}: {}", name, raw, e))
        }),
        Err(_) => Ok(default),
    }
}

fn seconds_var(name: &str, default: Duration) -> Result<Duration, ControllerError> {
    parse_var(name, default.as_secs()).map(Duration::from_secs)
}

impl Config {
    /// Load from the process environment
    pub fn from_env() -> Result<Self, ControllerError> {
        let defaults = Self::default();
        let access_token = env::var("AZURE_ACCESS_TOKEN").map_err(|_| {
            ControllerError::InvalidConfig("AZURE_ACCESS_TOKEN environment variable is required".to_string())
        })?;
        let config = Self {
            access_token,
            arm_endpoint: env::var("AZURE_RESOURCE_MANAGER_ENDPOINT")
                .unwrap_or_else(|_| DEFAULT_ARM_ENDPOINT.to_string()),
            default_subscription_id: env::var("AZURE_SUBSCRIPTION_ID").ok().filter(|s| !s.is_empty()),
            namespace: env::var("WATCH_NAMESPACE").ok().filter(|s| !s.is_empty()),
            reconcile_timeout: seconds_var("RECONCILE_TIMEOUT_SECONDS", defaults.reconcile_timeout)?,
            operation_timeout: seconds_var("ASYNC_OPERATION_TIMEOUT_SECONDS", defaults.operation_timeout)?,
            poll_interval: seconds_var("ASYNC_POLL_INTERVAL_SECONDS", defaults.poll_interval)?,
            not_done_requeue: seconds_var("OPERATION_NOT_DONE_REQUEUE_SECONDS", defaults.not_done_requeue)?,
            max_concurrent_reconciles: parse_var("MAX_CONCURRENT_RECONCILES", defaults.max_concurrent_reconciles)?,
            probe_bind_address: parse_var("PROBE_BIND_ADDRESS", defaults.probe_bind_address)?,
        };
        if config.max_concurrent_reconciles == 0 {
            return Err(ControllerError::InvalidConfig(
                "MAX_CONCURRENT_RECONCILES must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }

    /// Log the effective configuration, without the token
    pub fn log(&self) {
        info!("Configuration:");
        info!("  ARM endpoint: {}", self.arm_endpoint);
        info!(
            "  Default subscription: {}",
            self.default_subscription_id.as_deref().unwrap_or("none")
        );
        info!("  Namespace: {}", self.namespace.as_deref().unwrap_or("all namespaces"));
        info!("  Reconcile timeout: {:?}", self.reconcile_timeout);
        info!("  Operation timeout: {:?}", self.operation_timeout);
        info!("  Max concurrent reconciles: {}", self.max_concurrent_reconciles);
        info!("  Probe address: {}", self.probe_bind_address);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.arm_endpoint, "https://management.azure.com");
        assert_eq!(config.reconcile_timeout, Duration::from_secs(900));
        assert_eq!(config.operation_timeout, Duration::from_secs(15));
        assert_eq!(config.max_concurrent_reconciles, 10);
        assert_eq!(config.probe_bind_address.port(), 8080);
    }

    #[test]
    fn test_unset_variable_keeps_default() {
        let value: u16 = parse_var("AZURE_CLUSTER_TEST_SURELY_UNSET_VARIABLE", 7).unwrap();
        assert_eq!(value, 7);
    }
}
