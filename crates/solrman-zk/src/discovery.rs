//! Live node discovery against a ZooKeeper ensemble.

use std::time::Duration;

use tracing::{debug, info};
use url::Url;

use crate::TRACING_TARGET;
use crate::error::{DiscoveryError, DiscoveryResult};

/// ZooKeeper path where SolrCloud nodes register their liveness.
pub const LIVE_NODES_PATH: &str = "/live_nodes";

/// Default budget for reaching the ensemble and reading membership.
pub const DEFAULT_ENSEMBLE_TIMEOUT: Duration = Duration::from_secs(10);

/// Discovers a live Solr node by reading cluster membership from a
/// ZooKeeper ensemble.
///
/// Hosts are tried in listed order as one cluster string; quorum handling
/// lives in the ZooKeeper client. Selection among multiple live nodes is
/// deterministic for a given membership state so that resolution is
/// reproducible within a run.
#[derive(Debug, Clone)]
pub struct EnsembleDiscovery {
    hosts: Vec<String>,
    chroot: Option<String>,
    timeout: Duration,
}

impl EnsembleDiscovery {
    /// Creates a discovery handle for an ordered list of `host:port` pairs.
    pub fn new<I, S>(hosts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            hosts: hosts.into_iter().map(Into::into).collect(),
            chroot: None,
            timeout: DEFAULT_ENSEMBLE_TIMEOUT,
        }
    }

    /// Sets the chroot path the Solr cluster lives under.
    pub fn with_chroot(mut self, chroot: impl Into<String>) -> Self {
        let chroot = chroot.into();
        self.chroot = Some(if chroot.starts_with('/') {
            chroot
        } else {
            format!("/{chroot}")
        });
        self
    }

    /// Overrides the ensemble timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The connection string handed to the ZooKeeper client.
    fn cluster_string(&self) -> String {
        let hosts = self.hosts.join(",");
        match &self.chroot {
            Some(chroot) => format!("{hosts}{chroot}"),
            None => hosts,
        }
    }

    /// Finds one currently live node and synthesizes its HTTP base URL.
    ///
    /// Fails when the ensemble is unreachable on all hosts or no live node
    /// is registered; never returns a best-guess address.
    pub async fn discover_live_node(&self) -> DiscoveryResult<Url> {
        let cluster = self.cluster_string();
        debug!(
            target: TRACING_TARGET,
            cluster = %cluster,
            timeout = ?self.timeout,
            "Connecting to ensemble"
        );

        let client = tokio::time::timeout(self.timeout, zookeeper_client::Client::connect(&cluster))
            .await
            .map_err(|_| DiscoveryError::Timeout(self.timeout))??;

        let mut nodes = tokio::time::timeout(self.timeout, client.list_children(LIVE_NODES_PATH))
            .await
            .map_err(|_| DiscoveryError::Timeout(self.timeout))??;

        debug!(
            target: TRACING_TARGET,
            live_nodes = nodes.len(),
            "Read cluster membership"
        );

        let node = select_live_node(&mut nodes).ok_or(DiscoveryError::NoLiveNodes)?;
        let base_url = parse_live_node(&node)?;

        info!(
            target: TRACING_TARGET,
            node = %node,
            base_url = %base_url,
            "Discovered live Solr node"
        );
        Ok(base_url)
    }
}

/// Deterministic choice among live nodes: the lexicographically smallest
/// entry. Any live node suffices for correctness; a stable pick keeps
/// resolution reproducible for identical membership.
fn select_live_node(nodes: &mut Vec<String>) -> Option<String> {
    nodes.sort_unstable();
    nodes.first().cloned()
}

/// Parses a live node entry of the form `host:port_context` (for example
/// `10.0.0.3:8983_solr`) into an HTTP base URL.
fn parse_live_node(node: &str) -> DiscoveryResult<Url> {
    let (addr, context) = node
        .split_once('_')
        .ok_or_else(|| DiscoveryError::malformed_node(node))?;
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| DiscoveryError::malformed_node(node))?;
    let port: u16 = port
        .parse()
        .map_err(|_| DiscoveryError::malformed_node(node))?;
    if host.is_empty() || context.is_empty() {
        return Err(DiscoveryError::malformed_node(node));
    }

    Url::parse(&format!("http://{host}:{port}/{context}"))
        .map_err(|_| DiscoveryError::malformed_node(node))
}
