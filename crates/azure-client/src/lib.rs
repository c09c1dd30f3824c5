//! Azure Resource Manager REST client
//!
//! A small client for the subset of ARM the AzureCluster controller drives:
//! resource groups, virtual networks, subnets, route tables, network
//! security groups, public IPs, load balancers, private endpoints and
//! resource-group tags.
//!
//! Mutating calls return [`Submitted`]: either the final body or an
//! [`OperationHandle`] that can be polled later, possibly from another
//! process after round-tripping through [`OperationHandle::to_token`].
//!
//! # Example
//!
//! ```no_run
//! use azure_client::{AzureClient, AzureClientTrait, ResourceKind, ResourceRef, Submitted};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = AzureClient::new(
//!     "https://management.azure.com".to_string(),
//!     "bearer-token".to_string(),
//! )?;
//!
//! let rg = ResourceRef::new(ResourceKind::ResourceGroup, "sub-id", "my-rg", "my-rg");
//! match client.begin_delete(&rg).await? {
//!     Submitted::Done(_) => println!("deleted"),
//!     Submitted::InProgress(op) => println!("poll later: {}", op.to_token()?),
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod common;
pub mod error;
pub mod models;
pub mod operation;
pub mod resource;
#[path = "trait.rs"]
pub mod azure_trait;
#[cfg(feature = "test-util")]
pub mod mock;

pub use azure_trait::AzureClientTrait;
pub use client::AzureClient;
pub use common::{HttpClient, RawResponse};
pub use error::AzureError;
pub use models::*;
pub use operation::{OperationHandle, OperationMethod, PollStatus, PollingStrategy, Submitted};
pub use resource::{ResourceKind, ResourceRef};
#[cfg(feature = "test-util")]
pub use mock::{MockAzureClient, MockVerb, RecordedCall};
