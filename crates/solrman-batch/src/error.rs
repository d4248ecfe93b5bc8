//! Resolution and batch engine error types.

use solrman_client::ClientError;
use solrman_zk::DiscoveryError;
use thiserror::Error;

use crate::job::BatchResult;

/// Errors raised while resolving a connection profile.
///
/// All of these are fatal: the job never starts on an unresolved
/// connection, and resolution never falls back to a guessed address.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No collection name in either the profile or the overrides.
    #[error("no collection configured: pass an explicit collection or set one in the profile")]
    MissingCollection,

    /// Neither a direct URL nor ensemble hosts are configured.
    #[error("no usable connection: configure either a direct Solr URL or ensemble hosts")]
    MissingConnection,

    /// Ensemble discovery was required and failed.
    #[error("ensemble discovery failed: {0}")]
    Discovery(#[from] DiscoveryError),

    /// The merged values did not form a valid connection profile.
    #[error(transparent)]
    Profile(#[from] ClientError),
}

/// Errors raised by a batch job.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The job was rejected before any document was touched.
    #[error("invalid batch job: {0}")]
    InvalidJob(String),

    /// The connection itself failed beyond the retry budget (or the server
    /// rejected our credentials); continuing would only accumulate
    /// identical failures.
    ///
    /// `partial` carries the counts and per-document errors accumulated up
    /// to the failure so callers can still report progress made.
    #[error("batch job failed fatally: {source}")]
    Fatal {
        /// Result accumulated before the fatal failure.
        partial: BatchResult,
        /// The underlying connection failure.
        source: ClientError,
    },
}

impl EngineError {
    /// Creates an invalid job error.
    pub fn invalid_job(msg: impl Into<String>) -> Self {
        Self::InvalidJob(msg.into())
    }

    /// The partial result accumulated before a fatal failure, if any.
    pub fn partial_result(&self) -> Option<&BatchResult> {
        match self {
            Self::Fatal { partial, .. } => Some(partial),
            Self::InvalidJob(_) => None,
        }
    }
}
