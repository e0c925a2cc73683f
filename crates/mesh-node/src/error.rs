//! Error types for the node coordinator.

use thiserror::Error;

/// Errors that can occur operating a [`crate::Node`].
#[derive(Debug, Error)]
pub enum NodeError {
    #[error("transport error: {0}")]
    Transport(#[from] mesh_core::error::TransportError),

    #[error("routing error: {0}")]
    Routing(#[from] mesh_core::error::NoRouteError),

    #[error("discovery error: {0}")]
    Discovery(#[from] mesh_transport::DiscoveryError),
}

pub type NodeResult<T> = Result<T, NodeError>;
