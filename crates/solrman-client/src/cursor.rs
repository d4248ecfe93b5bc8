//! Deep-paging query cursor.

use tracing::debug;

use crate::TRACING_TARGET;
use crate::client::{SolrClient, SolrDocument};
use crate::error::{ClientError, ClientResult};

/// Default sort for cursor paging.
///
/// Cursor marks require a total order over the result set, which means the
/// unique key must appear in the sort.
pub const DEFAULT_SORT: &str = "id asc";

const INITIAL_MARK: &str = "*";

/// Lazy sequence of document pages matching a query.
///
/// Uses server-side continuation markers (`cursorMark`) rather than offset
/// paging, so every document matching the query at open time is delivered
/// exactly once even when the underlying index changes mid-iteration.
///
/// A failed [`next_page`](Self::next_page) call leaves the marker unchanged;
/// the caller may retry the call, but retry policy belongs to the consumer.
/// Once exhausted the cursor stays exhausted; reopen from scratch to rescan.
#[derive(Debug)]
pub struct QueryCursor<'a> {
    client: &'a SolrClient,
    query: String,
    page_size: u32,
    sort: String,
    mark: String,
    exhausted: bool,
}

impl<'a> QueryCursor<'a> {
    /// Opens a cursor over all documents matching `query`.
    pub fn open(client: &'a SolrClient, query: impl Into<String>, page_size: u32) -> Self {
        Self {
            client,
            query: query.into(),
            page_size,
            sort: DEFAULT_SORT.to_string(),
            mark: INITIAL_MARK.to_string(),
            exhausted: false,
        }
    }

    /// Overrides the sort specification.
    ///
    /// The sort must still include the unique key as a tiebreak, otherwise
    /// the server rejects cursor paging.
    pub fn with_sort(mut self, sort: impl Into<String>) -> Self {
        self.sort = sort.into();
        self
    }

    /// Whether the cursor has delivered every matching document.
    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Fetches the next page, or `None` once the result set is exhausted.
    pub async fn next_page(&mut self) -> ClientResult<Option<Vec<SolrDocument>>> {
        if self.exhausted {
            return Ok(None);
        }

        let page = self
            .client
            .select_page(&self.query, self.page_size, &self.mark, &self.sort)
            .await?;
        let next_mark = page.next_cursor_mark.ok_or_else(|| {
            ClientError::malformed_response("select response is missing nextCursorMark")
        })?;

        if page.docs.is_empty() {
            self.exhausted = true;
            return Ok(None);
        }

        // An unchanged marker means the server has nothing beyond this page.
        if next_mark == self.mark {
            self.exhausted = true;
        }
        self.mark = next_mark;

        debug!(
            target: TRACING_TARGET,
            docs = page.docs.len(),
            num_found = page.num_found,
            exhausted = self.exhausted,
            "Cursor page fetched"
        );

        Ok(Some(page.docs))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;
    use crate::config::ConnectionProfile;

    fn fixture_ids(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("doc{i:02}")).collect()
    }

    /// Mounts a cursor-paged select fixture: pages keyed by cursorMark, the
    /// final request answered with an empty page and an unchanged marker.
    async fn mount_pages(server: &MockServer, ids: &[String], page_size: usize) {
        let mut mark = "*".to_string();
        for (page_index, chunk) in ids.chunks(page_size).enumerate() {
            let next_mark = format!("mark{page_index}");
            let docs: Vec<_> = chunk.iter().map(|id| json!({ "id": id })).collect();
            Mock::given(method("GET"))
                .and(path("/solr/items/select"))
                .and(query_param("cursorMark", mark.clone()))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                    "response": { "numFound": ids.len(), "start": 0, "docs": docs },
                    "nextCursorMark": next_mark,
                })))
                .mount(server)
                .await;
            mark = next_mark;
        }

        Mock::given(method("GET"))
            .and(path("/solr/items/select"))
            .and(query_param("cursorMark", mark.clone()))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "numFound": ids.len(), "start": 0, "docs": [] },
                "nextCursorMark": mark,
            })))
            .mount(server)
            .await;
    }

    async fn client_for(server: &MockServer) -> SolrClient {
        let profile = ConnectionProfile::new(format!("{}/solr", server.uri()), "items").unwrap();
        SolrClient::new(profile).unwrap()
    }

    async fn collect_ids(cursor: &mut QueryCursor<'_>) -> Vec<String> {
        let mut seen = Vec::new();
        while let Some(page) = cursor.next_page().await.unwrap() {
            for doc in &page {
                seen.push(crate::doc_id(doc).unwrap().to_string());
            }
        }
        seen
    }

    #[tokio::test]
    async fn cursor_delivers_every_document_exactly_once() {
        let ids = fixture_ids(10);

        // Page sizes below, at, and above the result-set size.
        for page_size in [1usize, 7, 10, 11] {
            let server = MockServer::start().await;
            mount_pages(&server, &ids, page_size).await;
            let client = client_for(&server).await;

            let mut cursor = QueryCursor::open(&client, "*:*", page_size as u32);
            let seen = collect_ids(&mut cursor).await;

            assert_eq!(seen, ids, "page_size {page_size}");
            assert!(cursor.is_exhausted());
        }
    }

    #[tokio::test]
    async fn exhausted_cursor_keeps_returning_none() {
        let ids = fixture_ids(3);
        let server = MockServer::start().await;
        mount_pages(&server, &ids, 10).await;
        let client = client_for(&server).await;

        let mut cursor = QueryCursor::open(&client, "*:*", 10);
        assert_eq!(cursor.next_page().await.unwrap().unwrap().len(), 3);
        assert!(cursor.next_page().await.unwrap().is_none());
        assert!(cursor.next_page().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn empty_result_set_yields_no_pages() {
        let server = MockServer::start().await;
        mount_pages(&server, &[], 5).await;
        let client = client_for(&server).await;

        let mut cursor = QueryCursor::open(&client, "*:*", 5);
        assert!(cursor.next_page().await.unwrap().is_none());
        assert!(cursor.is_exhausted());
    }

    #[tokio::test]
    async fn failed_fetch_leaves_marker_unchanged_for_retry() {
        let ids = fixture_ids(4);
        let server = MockServer::start().await;
        let client = client_for(&server).await;
        let mut cursor = QueryCursor::open(&client, "*:*", 2);

        // First attempt hits a transient 503; the cursor surfaces the error
        // without advancing.
        {
            let _outage = Mock::given(method("GET"))
                .and(path("/solr/items/select"))
                .respond_with(ResponseTemplate::new(503))
                .mount_as_scoped(&server)
                .await;
            let err = cursor.next_page().await.unwrap_err();
            assert!(err.is_retryable());
        }

        mount_pages(&server, &ids, 2).await;
        let seen = collect_ids(&mut cursor).await;
        assert_eq!(seen, ids);
    }

    #[tokio::test]
    async fn missing_cursor_mark_is_a_malformed_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/solr/items/select"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "response": { "numFound": 1, "start": 0, "docs": [{ "id": "a" }] },
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let mut cursor = QueryCursor::open(&client, "*:*", 5);
        let err = cursor.next_page().await.unwrap_err();
        assert!(matches!(err, ClientError::MalformedResponse(_)));
    }
}
