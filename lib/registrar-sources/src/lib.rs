//! Snapshot sources and the publish-on-change poll loop
//!
//! This library provides:
//! - The `SnapshotSource` contract and the generic `Poller` that drives it
//! - The cluster-pod, local-file and remote-registry sources
//! - The `RegistryClient` contract and its HTTP implementation

pub mod poller;
pub mod cluster;
pub mod localfiles;
pub mod registry;

pub use poller::{CycleOutcome, Poller, SnapshotSource};
pub use cluster::ClusterSource;
pub use localfiles::LocalFileSource;
pub use registry::{HttpRegistryClient, LogOnlyRegistryClient, RegistryClient, RegistrySource};
