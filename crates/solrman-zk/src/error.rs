//! Ensemble discovery error types.

use std::time::Duration;

use thiserror::Error;

/// Result type for ensemble discovery operations.
pub type DiscoveryResult<T> = Result<T, DiscoveryError>;

/// Ensemble discovery errors.
///
/// Discovery is all-or-nothing: any of these means no base URL could be
/// derived and resolution must fail rather than guess an address.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    /// The ensemble could not be reached on any configured host.
    #[error("ensemble unreachable: {0}")]
    Unreachable(String),

    /// The ensemble did not answer within the configured timeout.
    #[error("ensemble did not answer within {0:?}")]
    Timeout(Duration),

    /// The ensemble is reachable but no node is registered as live.
    #[error("no live nodes registered under /live_nodes")]
    NoLiveNodes,

    /// A live node entry did not match the `host:port_context` layout.
    #[error("malformed live node entry: {0}")]
    MalformedNode(String),
}

impl DiscoveryError {
    /// Creates an unreachable error.
    pub fn unreachable(msg: impl Into<String>) -> Self {
        Self::Unreachable(msg.into())
    }

    /// Creates a malformed node error.
    pub fn malformed_node(entry: impl Into<String>) -> Self {
        Self::MalformedNode(entry.into())
    }
}

impl From<zookeeper_client::Error> for DiscoveryError {
    fn from(err: zookeeper_client::Error) -> Self {
        Self::unreachable(err.to_string())
    }
}
