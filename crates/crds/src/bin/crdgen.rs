//! Print the CustomResourceDefinitions as a multi-document YAML stream.

use crds::{AzureCluster, Cluster};
use kube::CustomResourceExt;

fn main() -> anyhow::Result<()> {
    print!("{}", serde_yaml::to_string(&AzureCluster::crd())?);
    println!("---");
    print!("{}", serde_yaml::to_string(&Cluster::crd())?);
    Ok(())
}
