//! Kubernetes adapters for the bootstrap and state traits.

pub mod cluster;
pub mod store;

pub use cluster::KubeCluster;
pub use store::AnnotationStore;
