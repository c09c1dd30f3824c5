//! Azure infrastructure CRD definitions
//!
//! Kubernetes Custom Resource Definitions consumed by the AzureCluster
//! controller: the `AzureCluster` infrastructure object, the minimal slice of
//! the Cluster API `Cluster` it is owned by, and the shared status types
//! (conditions and persisted long-running operation handles).

pub mod azure_cluster;
pub mod cluster;
pub mod conditions;
pub mod long_running;
pub mod network;
pub mod tags;

pub use azure_cluster::*;
pub use cluster::*;
pub use conditions::*;
pub use long_running::*;
pub use network::*;
pub use tags::*;
