//! Compiled contract artifacts and the per-network deployment records they
//! carry.
//!
//! The compiler toolchain writes one JSON artifact per contract into a build
//! directory. Besides ABI and bytecode every artifact holds a table of the
//! addresses the contract was deployed to on each network. This crate reads
//! those artifacts, builds creation code from them and keeps the deployment
//! table up to date.

pub mod artifact;
pub mod store;

pub use {
    artifact::{ContractArtifact, DeployedInstance, NetworkDeployment},
    store::{ArtifactDirectory, DeploymentStore, InMemoryStore},
};

pub mod networks {
    pub const SEPOLIA: u64 = 11155111;
}
