//! HTTP client for the Solr query/update API.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::TRACING_TARGET;
use crate::config::ConnectionProfile;
use crate::error::{ClientError, ClientResult};

/// A single Solr document, as returned by the select handler.
pub type SolrDocument = serde_json::Map<String, Value>;

/// Extracts the unique key from a document.
///
/// Solr schemas used with cursor paging key on `id`; documents without one
/// cannot be addressed by atomic updates.
pub fn doc_id(doc: &SolrDocument) -> Option<&str> {
    doc.get("id").and_then(Value::as_str)
}

/// One page of a select response.
#[derive(Debug, Clone)]
pub struct SelectPage {
    /// Documents in this page.
    pub docs: Vec<SolrDocument>,
    /// Total number of matching documents as of the query snapshot.
    pub num_found: u64,
    /// Continuation marker for the next page.
    pub next_cursor_mark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SelectResponse {
    response: SelectBody,
    #[serde(rename = "nextCursorMark")]
    next_cursor_mark: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SelectBody {
    #[serde(rename = "numFound")]
    num_found: u64,
    #[serde(default)]
    docs: Vec<SolrDocument>,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    msg: Option<String>,
}

/// HTTP client for a single Solr node and collection.
///
/// Built once from a resolved [`ConnectionProfile`]; cheap to clone and safe
/// to share across concurrent sub-operations.
#[derive(Debug, Clone)]
pub struct SolrClient {
    http: Client,
    profile: ConnectionProfile,
}

impl SolrClient {
    /// Creates a client from a resolved connection profile.
    pub fn new(profile: ConnectionProfile) -> ClientResult<Self> {
        let http = Client::builder()
            .timeout(profile.timeout())
            .user_agent(concat!("solrman/", env!("CARGO_PKG_VERSION")))
            .build()?;

        debug!(
            target: TRACING_TARGET,
            base_url = %profile.base_url(),
            collection = %profile.collection(),
            timeout = ?profile.timeout(),
            "Solr client initialized"
        );

        Ok(Self { http, profile })
    }

    /// The connection profile this client was built from.
    pub fn profile(&self) -> &ConnectionProfile {
        &self.profile
    }

    fn collection_url(&self, handler: &str) -> String {
        format!(
            "{}/{}/{}",
            self.profile.base_url().as_str().trim_end_matches('/'),
            self.profile.collection(),
            handler
        )
    }

    fn admin_url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.profile.base_url().as_str().trim_end_matches('/'),
            path
        )
    }

    fn request(&self, method: Method, url: String) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match self.profile.credentials() {
            Some(c) => builder.basic_auth(&c.username, Some(&c.password)),
            None => builder,
        }
    }

    /// Fetches one page of a cursor-paged select.
    ///
    /// `sort` must impose a total order (unique key tiebreak) for the
    /// continuation marker to be stable.
    pub async fn select_page(
        &self,
        query: &str,
        rows: u32,
        cursor_mark: &str,
        sort: &str,
    ) -> ClientResult<SelectPage> {
        debug!(
            target: TRACING_TARGET,
            query = %query,
            rows = rows,
            cursor_mark = %cursor_mark,
            "Fetching select page"
        );

        let response = self
            .request(Method::GET, self.collection_url("select"))
            .query(&[
                ("q", query),
                ("rows", &rows.to_string()),
                ("sort", sort),
                ("cursorMark", cursor_mark),
                ("wt", "json"),
            ])
            .send()
            .await?;

        let body: SelectResponse = Self::read_json(response).await?;
        Ok(SelectPage {
            docs: body.response.docs,
            num_found: body.response.num_found,
            next_cursor_mark: body.next_cursor_mark,
        })
    }

    /// Counts documents matching a query without fetching them.
    pub async fn count(&self, query: &str) -> ClientResult<u64> {
        let response = self
            .request(Method::GET, self.collection_url("select"))
            .query(&[("q", query), ("rows", "0"), ("wt", "json")])
            .send()
            .await?;

        let body: SelectResponse = Self::read_json(response).await?;
        Ok(body.response.num_found)
    }

    /// Sends a batch of atomic partial-update documents.
    ///
    /// Each element must be an update document of the form
    /// `{"id": "...", "field": {"set": value}}`; fields not named in the
    /// update are left untouched. `commit_within` is passed through so the
    /// server can batch commits for throughput.
    pub async fn atomic_update(
        &self,
        updates: &[Value],
        commit_within: Option<Duration>,
    ) -> ClientResult<()> {
        debug!(
            target: TRACING_TARGET,
            count = updates.len(),
            commit_within = ?commit_within,
            "Sending atomic updates"
        );

        let mut builder = self
            .request(Method::POST, self.collection_url("update"))
            .json(&updates);
        if let Some(within) = commit_within {
            builder = builder.query(&[("commitWithin", within.as_millis().to_string())]);
        }

        let response = builder.send().await?;
        Self::read_json::<Value>(response).await.map(|_| ())
    }

    /// Deletes all documents matching a query in a single server-side call.
    pub async fn delete_by_query(&self, query: &str) -> ClientResult<()> {
        debug!(target: TRACING_TARGET, query = %query, "Deleting by query");

        let response = self
            .request(Method::POST, self.collection_url("update"))
            .json(&json!({ "delete": { "query": query } }))
            .send()
            .await?;
        Self::read_json::<Value>(response).await.map(|_| ())
    }

    /// Deletes the documents with the given ids.
    pub async fn delete_by_ids(&self, ids: &[String]) -> ClientResult<()> {
        debug!(target: TRACING_TARGET, count = ids.len(), "Deleting by id list");

        let response = self
            .request(Method::POST, self.collection_url("update"))
            .json(&json!({ "delete": ids }))
            .send()
            .await?;
        Self::read_json::<Value>(response).await.map(|_| ())
    }

    /// Forces completed mutations to become durably visible.
    pub async fn commit(&self) -> ClientResult<()> {
        debug!(target: TRACING_TARGET, collection = %self.profile.collection(), "Committing");

        let response = self
            .request(Method::POST, self.collection_url("update"))
            .query(&[("commit", "true")])
            .json(&json!({}))
            .send()
            .await?;
        Self::read_json::<Value>(response).await.map(|_| ())
    }

    /// Validates that the node answers the collections admin endpoint.
    ///
    /// Used to confirm a discovered node is actually serving before a job
    /// starts; collection lifecycle itself is handled elsewhere.
    pub async fn ping(&self) -> ClientResult<()> {
        let response = self
            .request(Method::GET, self.admin_url("admin/collections"))
            .query(&[("action", "LIST"), ("wt", "json")])
            .send()
            .await?;
        Self::read_json::<Value>(response).await.map(|_| ())
    }

    async fn read_json<T: for<'de> Deserialize<'de>>(response: Response) -> ClientResult<T> {
        let status = response.status();
        if status.is_success() {
            let body = response.text().await?;
            serde_json::from_str(&body).map_err(|e| {
                ClientError::malformed_response(format!("failed to parse response: {e}"))
            })
        } else {
            let body = response.text().await.unwrap_or_default();
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .ok()
                .and_then(|e| e.error.msg)
                .unwrap_or_else(|| {
                    if body.is_empty() {
                        status.to_string()
                    } else {
                        body
                    }
                });
            Err(ClientError::api(status.as_u16(), message))
        }
    }
}

#[cfg(test)]
mod tests {
    use wiremock::matchers::{body_partial_json, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    fn select_body(num_found: u64, docs: Value, mark: &str) -> Value {
        json!({
            "responseHeader": { "status": 0 },
            "response": { "numFound": num_found, "start": 0, "docs": docs },
            "nextCursorMark": mark,
        })
    }

    async fn client_for(server: &MockServer) -> SolrClient {
        let profile =
            ConnectionProfile::new(format!("{}/solr", server.uri()), "products").unwrap();
        SolrClient::new(profile).unwrap()
    }

    #[tokio::test]
    async fn count_uses_zero_rows_and_reads_num_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/solr/products/select"))
            .and(query_param("rows", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(select_body(42, json!([]), "*")))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert_eq!(client.count("category:book").await.unwrap(), 42);
    }

    #[tokio::test]
    async fn atomic_update_passes_commit_within_millis() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/solr/products/update"))
            .and(query_param("commitWithin", "10000"))
            .and(body_partial_json(json!([{ "id": "doc1", "price": { "set": 9 } }])))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "responseHeader": { "status": 0 } })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let updates = vec![json!({ "id": "doc1", "price": { "set": 9 } })];
        client
            .atomic_update(&updates, Some(Duration::from_secs(10)))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn delete_by_query_sends_single_delete_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/solr/products/update"))
            .and(body_partial_json(json!({ "delete": { "query": "stale:true" } })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "responseHeader": { "status": 0 } })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.delete_by_query("stale:true").await.unwrap();
    }

    #[tokio::test]
    async fn solr_error_body_is_surfaced_as_api_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/solr/products/select"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": { "msg": "undefined field bogus", "code": 400 }
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.count("bogus:1").await.unwrap_err();
        match err {
            ClientError::Api { status, message } => {
                assert_eq!(status, 400);
                assert_eq!(message, "undefined field bogus");
            }
            other => panic!("expected api error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn ping_checks_the_admin_endpoint_outside_the_collection() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/solr/admin/collections"))
            .and(query_param("action", "LIST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "responseHeader": { "status": 0 },
                "collections": ["products"],
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.ping().await.unwrap();
    }

    #[tokio::test]
    async fn basic_auth_header_is_attached_when_credentials_present() {
        use wiremock::matchers::header_exists;

        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/solr/products/update"))
            .and(header_exists("authorization"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "responseHeader": { "status": 0 } })))
            .expect(1)
            .mount(&server)
            .await;

        let profile = ConnectionProfile::new(format!("{}/solr", server.uri()), "products")
            .unwrap()
            .with_credentials(crate::Credentials::new("admin", "hunter2"));
        let client = SolrClient::new(profile).unwrap();
        client.commit().await.unwrap();
    }
}
