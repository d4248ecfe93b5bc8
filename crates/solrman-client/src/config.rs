//! Resolved connection descriptor types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{ClientError, ClientResult};

/// Default request timeout when a profile does not configure one.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Basic-auth credentials for a Solr node.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Username sent with every request.
    pub username: String,
    /// Password sent with every request.
    pub password: String,
}

impl Credentials {
    /// Creates a credential pair.
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Resolved, immutable description of how to reach a cluster node and which
/// collection to target.
///
/// Produced once per invocation by connection resolution and shared read-only
/// afterwards. Construction validates the base URL so a partially-resolved
/// profile can never exist.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionProfile {
    base_url: Url,
    collection: String,
    credentials: Option<Credentials>,
    timeout: Duration,
}

impl ConnectionProfile {
    /// Creates a profile from a base URL and a target collection.
    ///
    /// Fails when the URL is empty or not an absolute `http`/`https` URL, or
    /// when the collection name is empty.
    pub fn new(base_url: impl AsRef<str>, collection: impl Into<String>) -> ClientResult<Self> {
        let raw = base_url.as_ref().trim();
        if raw.is_empty() {
            return Err(ClientError::invalid_profile("base URL must not be empty"));
        }
        let base_url = Url::parse(raw)
            .map_err(|e| ClientError::invalid_profile(format!("invalid base URL '{raw}': {e}")))?;
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ClientError::invalid_profile(format!(
                "unsupported URL scheme '{}'",
                base_url.scheme()
            )));
        }

        let collection = collection.into();
        if collection.trim().is_empty() {
            return Err(ClientError::invalid_profile(
                "collection name must not be empty",
            ));
        }

        Ok(Self {
            base_url,
            collection,
            credentials: None,
            timeout: DEFAULT_TIMEOUT,
        })
    }

    /// Attaches basic-auth credentials.
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Overrides the request timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// The API root of the resolved cluster node.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// The target collection name.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    /// Basic-auth credentials, if configured.
    pub fn credentials(&self) -> Option<&Credentials> {
        self.credentials.as_ref()
    }

    /// The request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}
