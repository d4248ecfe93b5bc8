//! Connection resolution.
//!
//! Merges profile defaults, explicit overrides, and ensemble discovery into
//! one immutable [`ConnectionProfile`] under strict precedence rules. The
//! profile itself is loaded by an external collaborator; this module only
//! consumes the already-parsed values.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use solrman_client::{ConnectionProfile, Credentials, DEFAULT_TIMEOUT};
use solrman_zk::{DiscoveryError, EnsembleDiscovery};
use tracing::{debug, info};
use url::Url;

use crate::TRACING_TARGET;
use crate::error::ResolveError;

/// One named configuration profile, as handed over by the config loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    /// Direct Solr base URL.
    #[serde(default)]
    pub solr_url: Option<String>,
    /// Ensemble hosts (`host:port`), in preference order.
    #[serde(default)]
    pub zk_hosts: Option<Vec<String>>,
    /// Chroot path the cluster lives under in the ensemble.
    #[serde(default)]
    pub zk_chroot: Option<String>,
    /// Target collection.
    #[serde(default)]
    pub collection: Option<String>,
    /// Basic-auth username.
    #[serde(default)]
    pub username: Option<String>,
    /// Basic-auth password.
    #[serde(default)]
    pub password: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub timeout_secs: Option<u64>,
    /// Default page/chunk size for batch jobs.
    #[serde(default)]
    pub batch_size: Option<u32>,
    /// Default commit latency bound for updates, in milliseconds.
    #[serde(default)]
    pub commit_within_ms: Option<u64>,
}

/// Explicit per-field overrides, each taking precedence over the profile.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConnectionOverrides {
    /// Overrides the direct Solr base URL.
    pub solr_url: Option<String>,
    /// Overrides the ensemble host list.
    pub zk_hosts: Option<Vec<String>>,
    /// Overrides the ensemble chroot path.
    pub zk_chroot: Option<String>,
    /// Overrides the target collection.
    pub collection: Option<String>,
    /// Overrides the basic-auth username.
    pub username: Option<String>,
    /// Overrides the basic-auth password.
    pub password: Option<String>,
    /// Overrides the request timeout in seconds.
    pub timeout_secs: Option<u64>,
}

/// The flavor of operation a connection is being resolved for.
///
/// Mutation workloads run long and are sensitive to node membership drift,
/// so they re-derive their node from the ensemble on every invocation even
/// when a direct URL is also configured. Quick admin reads keep the simpler
/// direct-URL-wins rule. This asymmetry is deliberate and load-bearing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    /// Read-only admin calls (list/info and friends).
    Admin,
    /// Batch mutation jobs.
    Mutation,
}

/// Source of live node addresses.
///
/// The production implementation is [`EnsembleDiscovery`]; tests substitute
/// a stub to exercise precedence without a running ensemble.
#[async_trait]
pub trait NodeDiscovery: Send + Sync {
    /// Returns the base URL of one currently live node.
    async fn discover_live_node(&self) -> Result<Url, DiscoveryError>;
}

#[async_trait]
impl NodeDiscovery for EnsembleDiscovery {
    async fn discover_live_node(&self) -> Result<Url, DiscoveryError> {
        EnsembleDiscovery::discover_live_node(self).await
    }
}

/// Resolves connection profiles.
///
/// Deterministic given identical inputs and ensemble state; the only side
/// effect is the discovery network call, and that only when no authoritative
/// direct URL applies.
#[derive(Default)]
pub struct ConnectionResolver {
    discovery: Option<Box<dyn NodeDiscovery>>,
}

impl ConnectionResolver {
    /// Creates a resolver that discovers nodes through the real ensemble.
    pub fn new() -> Self {
        Self { discovery: None }
    }

    /// Substitutes the discovery backend (test seam).
    pub fn with_discovery(mut self, discovery: impl NodeDiscovery + 'static) -> Self {
        self.discovery = Some(Box::new(discovery));
        self
    }

    /// Merges profile, overrides, and (when needed) discovery into a
    /// resolved connection profile.
    ///
    /// Field precedence is override > profile; the collection resolves
    /// independently of the URL. URL resolution depends on `kind`:
    ///
    /// - [`OperationKind::Admin`]: override URL > profile URL > discovery.
    /// - [`OperationKind::Mutation`]: override URL > discovery (whenever
    ///   ensemble hosts are configured, even alongside a stale profile URL)
    ///   > profile URL.
    ///
    /// A required discovery that fails is fatal; no HTTP call is ever made
    /// against a guessed address.
    pub async fn resolve(
        &self,
        profile: &ProfileConfig,
        overrides: &ConnectionOverrides,
        kind: OperationKind,
    ) -> Result<ConnectionProfile, ResolveError> {
        let collection = overrides
            .collection
            .as_deref()
            .or(profile.collection.as_deref())
            .ok_or(ResolveError::MissingCollection)?;

        let timeout = Duration::from_secs(
            overrides
                .timeout_secs
                .or(profile.timeout_secs)
                .unwrap_or(DEFAULT_TIMEOUT.as_secs()),
        );

        let (zk_hosts, zk_chroot) = merged_ensemble(profile, overrides);
        let direct_url = profile.solr_url.as_deref();

        let base_url = if let Some(url) = overrides.solr_url.as_deref() {
            url.to_string()
        } else {
            match (kind, direct_url, zk_hosts) {
                // Admin reads trust a configured URL outright.
                (OperationKind::Admin, Some(url), _) => url.to_string(),
                // Mutations prefer current membership over a static URL.
                (OperationKind::Mutation, _, Some(hosts)) => self
                    .discover(hosts, zk_chroot, timeout)
                    .await?
                    .to_string(),
                (OperationKind::Mutation, Some(url), None) => url.to_string(),
                (OperationKind::Admin, None, Some(hosts)) => self
                    .discover(hosts, zk_chroot, timeout)
                    .await?
                    .to_string(),
                (_, None, None) => return Err(ResolveError::MissingConnection),
            }
        };

        let username = overrides
            .username
            .as_deref()
            .or(profile.username.as_deref());
        let password = overrides
            .password
            .as_deref()
            .or(profile.password.as_deref());

        let mut resolved = ConnectionProfile::new(&base_url, collection)?.with_timeout(timeout);
        if let (Some(username), Some(password)) = (username, password) {
            resolved = resolved.with_credentials(Credentials::new(username, password));
        }

        info!(
            target: TRACING_TARGET,
            base_url = %resolved.base_url(),
            collection = %resolved.collection(),
            kind = ?kind,
            "Connection resolved"
        );
        Ok(resolved)
    }

    async fn discover(
        &self,
        hosts: &[String],
        chroot: Option<&str>,
        timeout: Duration,
    ) -> Result<Url, ResolveError> {
        debug!(
            target: TRACING_TARGET,
            hosts = ?hosts,
            chroot = ?chroot,
            "Deriving node from ensemble"
        );

        let url = match &self.discovery {
            Some(discovery) => discovery.discover_live_node().await?,
            None => {
                let mut discovery =
                    EnsembleDiscovery::new(hosts.iter().cloned()).with_timeout(timeout);
                if let Some(chroot) = chroot {
                    discovery = discovery.with_chroot(chroot);
                }
                discovery.discover_live_node().await?
            }
        };
        Ok(url)
    }
}

/// Ensemble settings under override-wins precedence; an empty host list
/// counts as unconfigured.
fn merged_ensemble<'a>(
    profile: &'a ProfileConfig,
    overrides: &'a ConnectionOverrides,
) -> (Option<&'a [String]>, Option<&'a str>) {
    let hosts = overrides
        .zk_hosts
        .as_deref()
        .or(profile.zk_hosts.as_deref())
        .filter(|hosts| !hosts.is_empty());
    let chroot = overrides
        .zk_chroot
        .as_deref()
        .or(profile.zk_chroot.as_deref());
    (hosts, chroot)
}

impl std::fmt::Debug for ConnectionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionResolver")
            .field("discovery", &self.discovery.as_ref().map(|_| "custom"))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Stub discovery recording whether it was consulted.
    struct StubDiscovery {
        url: Option<&'static str>,
        called: Arc<AtomicBool>,
    }

    impl StubDiscovery {
        fn returning(url: &'static str) -> (Self, Arc<AtomicBool>) {
            let called = Arc::new(AtomicBool::new(false));
            (
                Self {
                    url: Some(url),
                    called: called.clone(),
                },
                called,
            )
        }

        fn failing() -> Self {
            Self {
                url: None,
                called: Arc::new(AtomicBool::new(false)),
            }
        }
    }

    #[async_trait]
    impl NodeDiscovery for StubDiscovery {
        async fn discover_live_node(&self) -> Result<Url, DiscoveryError> {
            self.called.store(true, Ordering::SeqCst);
            match self.url {
                Some(url) => Ok(Url::parse(url).unwrap()),
                None => Err(DiscoveryError::NoLiveNodes),
            }
        }
    }

    fn profile() -> ProfileConfig {
        ProfileConfig {
            solr_url: Some("http://stale-node:8983/solr".to_string()),
            zk_hosts: Some(vec!["zk1:2181".to_string()]),
            collection: Some("products".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn explicit_url_override_beats_everything() {
        let (stub, called) = StubDiscovery::returning("http://zk-derived:8983/solr");
        let resolver = ConnectionResolver::new().with_discovery(stub);
        let overrides = ConnectionOverrides {
            solr_url: Some("http://cli-node:8983/solr".to_string()),
            ..Default::default()
        };

        for kind in [OperationKind::Admin, OperationKind::Mutation] {
            let resolved = resolver.resolve(&profile(), &overrides, kind).await.unwrap();
            assert_eq!(resolved.base_url().as_str(), "http://cli-node:8983/solr");
        }
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn admin_prefers_direct_url_and_skips_discovery() {
        let (stub, called) = StubDiscovery::returning("http://zk-derived:8983/solr");
        let resolver = ConnectionResolver::new().with_discovery(stub);

        let resolved = resolver
            .resolve(&profile(), &ConnectionOverrides::default(), OperationKind::Admin)
            .await
            .unwrap();

        assert_eq!(resolved.base_url().as_str(), "http://stale-node:8983/solr");
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn mutation_rederives_url_from_ensemble_even_with_stale_direct_url() {
        let (stub, called) = StubDiscovery::returning("http://zk-derived:8983/solr");
        let resolver = ConnectionResolver::new().with_discovery(stub);

        let resolved = resolver
            .resolve(
                &profile(),
                &ConnectionOverrides::default(),
                OperationKind::Mutation,
            )
            .await
            .unwrap();

        assert_eq!(resolved.base_url().as_str(), "http://zk-derived:8983/solr");
        assert!(called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn mutation_without_ensemble_falls_back_to_direct_url() {
        let resolver = ConnectionResolver::new().with_discovery(StubDiscovery::failing());
        let config = ProfileConfig {
            zk_hosts: None,
            ..profile()
        };

        let resolved = resolver
            .resolve(&config, &ConnectionOverrides::default(), OperationKind::Mutation)
            .await
            .unwrap();
        assert_eq!(resolved.base_url().as_str(), "http://stale-node:8983/solr");
    }

    #[tokio::test]
    async fn discovery_failure_is_fatal_with_no_fallback() {
        let resolver = ConnectionResolver::new().with_discovery(StubDiscovery::failing());
        let config = ProfileConfig {
            solr_url: None,
            ..profile()
        };

        for kind in [OperationKind::Admin, OperationKind::Mutation] {
            let err = resolver
                .resolve(&config, &ConnectionOverrides::default(), kind)
                .await
                .unwrap_err();
            assert!(matches!(err, ResolveError::Discovery(_)), "{kind:?}");
        }
    }

    #[tokio::test]
    async fn missing_everything_is_a_config_error() {
        let resolver = ConnectionResolver::new();
        let config = ProfileConfig {
            collection: Some("products".to_string()),
            ..Default::default()
        };

        let err = resolver
            .resolve(&config, &ConnectionOverrides::default(), OperationKind::Admin)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingConnection));
    }

    #[tokio::test]
    async fn missing_collection_is_rejected_before_discovery() {
        let (stub, called) = StubDiscovery::returning("http://zk-derived:8983/solr");
        let resolver = ConnectionResolver::new().with_discovery(stub);
        let config = ProfileConfig {
            collection: None,
            ..profile()
        };

        let err = resolver
            .resolve(&config, &ConnectionOverrides::default(), OperationKind::Mutation)
            .await
            .unwrap_err();
        assert!(matches!(err, ResolveError::MissingCollection));
        assert!(!called.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn collection_override_is_independent_of_url_resolution() {
        let resolver = ConnectionResolver::new();
        let config = ProfileConfig {
            zk_hosts: None,
            ..profile()
        };
        let overrides = ConnectionOverrides {
            collection: Some("archive".to_string()),
            ..Default::default()
        };

        let resolved = resolver
            .resolve(&config, &overrides, OperationKind::Admin)
            .await
            .unwrap();
        assert_eq!(resolved.collection(), "archive");
        assert_eq!(resolved.base_url().as_str(), "http://stale-node:8983/solr");
    }

    #[test]
    fn ensemble_chroot_override_beats_profile() {
        let config = ProfileConfig {
            zk_chroot: Some("/solr".to_string()),
            ..profile()
        };

        let overrides = ConnectionOverrides {
            zk_chroot: Some("/staging".to_string()),
            ..Default::default()
        };
        let (hosts, chroot) = merged_ensemble(&config, &overrides);
        assert_eq!(chroot, Some("/staging"));
        assert_eq!(hosts.unwrap(), ["zk1:2181".to_string()]);

        let no_overrides = ConnectionOverrides::default();
        let (_, chroot) = merged_ensemble(&config, &no_overrides);
        assert_eq!(chroot, Some("/solr"));
    }

    #[tokio::test]
    async fn credentials_require_both_halves() {
        let resolver = ConnectionResolver::new();
        let mut config = ProfileConfig {
            zk_hosts: None,
            username: Some("admin".to_string()),
            ..profile()
        };

        let resolved = resolver
            .resolve(&config, &ConnectionOverrides::default(), OperationKind::Admin)
            .await
            .unwrap();
        assert!(resolved.credentials().is_none());

        config.password = Some("hunter2".to_string());
        let overrides = ConnectionOverrides {
            username: Some("root".to_string()),
            ..Default::default()
        };
        let resolved = resolver
            .resolve(&config, &overrides, OperationKind::Admin)
            .await
            .unwrap();
        let credentials = resolved.credentials().unwrap();
        assert_eq!(credentials.username, "root");
        assert_eq!(credentials.password, "hunter2");
    }

    #[tokio::test]
    async fn timeout_precedence_and_default() {
        let resolver = ConnectionResolver::new();
        let config = ProfileConfig {
            zk_hosts: None,
            timeout_secs: Some(60),
            ..profile()
        };

        let resolved = resolver
            .resolve(&config, &ConnectionOverrides::default(), OperationKind::Admin)
            .await
            .unwrap();
        assert_eq!(resolved.timeout(), Duration::from_secs(60));

        let overrides = ConnectionOverrides {
            timeout_secs: Some(5),
            ..Default::default()
        };
        let resolved = resolver
            .resolve(&config, &overrides, OperationKind::Admin)
            .await
            .unwrap();
        assert_eq!(resolved.timeout(), Duration::from_secs(5));

        let config = ProfileConfig {
            timeout_secs: None,
            zk_hosts: None,
            ..profile()
        };
        let resolved = resolver
            .resolve(&config, &ConnectionOverrides::default(), OperationKind::Admin)
            .await
            .unwrap();
        assert_eq!(resolved.timeout(), DEFAULT_TIMEOUT);
    }
}
