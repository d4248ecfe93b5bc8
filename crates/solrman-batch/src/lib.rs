#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod engine;
mod error;
mod job;
mod mutation;
mod resolver;

pub use engine::{BatchEngine, RetryPolicy};
pub use error::{EngineError, ResolveError};
pub use job::{BatchJob, BatchResult, DEFAULT_PAGE_SIZE, FailureSubject, MutationFailure};
pub use mutation::MutationSpec;
pub use resolver::{
    ConnectionOverrides, ConnectionResolver, NodeDiscovery, OperationKind, ProfileConfig,
};

/// Tracing target for batch engine operations.
pub const TRACING_TARGET: &str = "solrman_batch";
