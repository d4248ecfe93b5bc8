#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod discovery;
mod error;

pub use discovery::{DEFAULT_ENSEMBLE_TIMEOUT, EnsembleDiscovery, LIVE_NODES_PATH};
pub use error::{DiscoveryError, DiscoveryResult};

/// Tracing target for ensemble discovery operations.
pub const TRACING_TARGET: &str = "solrman_zk";
