#![forbid(unsafe_code)]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

mod client;
mod config;
mod cursor;
mod error;

pub use client::{SelectPage, SolrClient, SolrDocument, doc_id};
pub use config::{ConnectionProfile, Credentials, DEFAULT_TIMEOUT};
pub use cursor::{DEFAULT_SORT, QueryCursor};
pub use error::{ClientError, ClientResult};

/// Tracing target for Solr client operations.
pub const TRACING_TARGET: &str = "solrman_client";
