//! Batch mutation engine.

use std::future::Future;
use std::time::Duration;

use solrman_client::{ClientError, QueryCursor, SolrClient, SolrDocument, doc_id};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::TRACING_TARGET;
use crate::error::EngineError;
use crate::job::{BatchJob, BatchResult, FailureSubject};
use crate::mutation::MutationSpec;

/// Exponential backoff budget for transient failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the initial attempt.
    pub max_retries: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Backoff factor applied per retry.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(500),
            multiplier: 2,
        }
    }
}

impl RetryPolicy {
    fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * self.multiplier.pow(attempt.saturating_sub(1))
    }
}

/// Executes batch mutation jobs against a resolved cluster node.
///
/// Pages through the selection sequentially, applies the job's mutation to
/// each page, and accounts for every matched document exactly once: on any
/// non-aborted run, `documents_mutated + documents_failed` equals
/// `documents_matched`.
///
/// Per-document and per-chunk failures are recorded and the run continues.
/// Connection-class failures (credential rejection, or transport errors that
/// survive the retry budget) end the run with [`EngineError::Fatal`] carrying
/// the partial result.
pub struct BatchEngine {
    client: SolrClient,
    retry: RetryPolicy,
    cancel: CancellationToken,
    progress: Option<Box<dyn Fn(u64) + Send + Sync>>,
}

impl BatchEngine {
    /// Creates an engine over a connected client.
    pub fn new(client: SolrClient) -> Self {
        Self {
            client,
            retry: RetryPolicy::default(),
            cancel: CancellationToken::new(),
            progress: None,
        }
    }

    /// Overrides the retry budget for transient failures.
    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Attaches an externally owned cancellation token. Cancelling it aborts
    /// the run at the next page boundary.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Registers a callback invoked with the running matched-document count
    /// after every processed page or chunk.
    pub fn with_progress(mut self, progress: impl Fn(u64) + Send + Sync + 'static) -> Self {
        self.progress = Some(Box::new(progress));
        self
    }

    /// The cancellation token observed between pages.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Runs a batch job to completion, abort, or fatal failure.
    ///
    /// A clean finish commits the collection unless the job is a dry run,
    /// was aborted, or carries its own commit latency bound.
    pub async fn run(&self, job: &BatchJob) -> Result<BatchResult, EngineError> {
        job.validate().map_err(EngineError::invalid_job)?;

        info!(
            target: TRACING_TARGET,
            collection = %self.client.profile().collection(),
            mutation = job.mutation().kind(),
            query = %job.query(),
            dry_run = job.is_dry_run(),
            "Batch job started"
        );

        let mut result = BatchResult::default();
        let outcome = match job.mutation() {
            MutationSpec::DeleteByQuery { query } => {
                self.run_delete_by_query(job, query, &mut result).await
            }
            MutationSpec::DeleteByIds { ids } => self.run_delete_by_ids(job, ids, &mut result).await,
            _ => self.run_per_document(job, &mut result).await,
        };
        if let Err(source) = outcome {
            return Err(EngineError::Fatal {
                partial: result,
                source,
            });
        }

        let needs_commit = !job.is_dry_run()
            && !result.aborted
            && job.mutation().commit_within().is_none()
            && result.documents_mutated > 0;
        if needs_commit {
            if let Err(source) = self.with_retry(|| self.client.commit()).await {
                return Err(EngineError::Fatal {
                    partial: result,
                    source,
                });
            }
        }

        debug_assert!(
            result.aborted
                || result.documents_mutated + result.documents_failed == result.documents_matched
        );
        info!(
            target: TRACING_TARGET,
            matched = result.documents_matched,
            mutated = result.documents_mutated,
            failed = result.documents_failed,
            aborted = result.aborted,
            "Batch job finished"
        );
        Ok(result)
    }

    async fn run_per_document(
        &self,
        job: &BatchJob,
        result: &mut BatchResult,
    ) -> Result<(), ClientError> {
        let mut cursor = QueryCursor::open(&self.client, job.query(), job.page_size());
        loop {
            if self.cancel.is_cancelled() {
                result.aborted = true;
                return Ok(());
            }

            let Some(docs) = self.next_page_with_retry(&mut cursor).await? else {
                return Ok(());
            };
            result.documents_matched += docs.len() as u64;

            if job.is_dry_run() {
                // Same accounting as a wet run: keyless documents cannot
                // be mutated, so a dry run must not count them either.
                for doc in &docs {
                    if doc_id(doc).is_some() {
                        result.documents_mutated += 1;
                    } else {
                        record_missing_id(result);
                    }
                }
            } else {
                self.apply_page(job.mutation(), &docs, result).await?;
            }
            self.report_progress(result.documents_matched);
        }
    }

    /// Applies the mutation to one page, preferring a single bulk update.
    ///
    /// A structural rejection of the bulk request falls back to per-document
    /// updates so one bad document cannot take the whole page down with it.
    async fn apply_page(
        &self,
        mutation: &MutationSpec,
        docs: &[SolrDocument],
        result: &mut BatchResult,
    ) -> Result<(), ClientError> {
        let commit_within = mutation.commit_within();
        let mut updates = Vec::with_capacity(docs.len());
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            match doc_id(doc) {
                Some(id) => {
                    if let Some(update) = mutation.atomic_update_doc(id) {
                        updates.push(update);
                        ids.push(id.to_string());
                    }
                }
                None => record_missing_id(result),
            }
        }
        if updates.is_empty() {
            return Ok(());
        }

        match self
            .with_retry(|| self.client.atomic_update(&updates, commit_within))
            .await
        {
            Ok(()) => {
                result.documents_mutated += updates.len() as u64;
                return Ok(());
            }
            Err(err) if Self::is_fatal(&err) => return Err(err),
            Err(err) if updates.len() == 1 => {
                result.record_failure(FailureSubject::Document(ids[0].clone()), err.to_string(), 1);
                return Ok(());
            }
            Err(err) => {
                warn!(
                    target: TRACING_TARGET,
                    error = %err,
                    docs = updates.len(),
                    "Bulk update rejected, isolating per document"
                );
            }
        }

        for (update, id) in updates.iter().zip(&ids) {
            let single = std::slice::from_ref(update);
            match self
                .with_retry(|| self.client.atomic_update(single, commit_within))
                .await
            {
                Ok(()) => result.documents_mutated += 1,
                Err(err) if Self::is_fatal(&err) => return Err(err),
                Err(err) => {
                    result.record_failure(FailureSubject::Document(id.clone()), err.to_string(), 1)
                }
            }
        }
        Ok(())
    }

    async fn run_delete_by_query(
        &self,
        job: &BatchJob,
        query: &str,
        result: &mut BatchResult,
    ) -> Result<(), ClientError> {
        let matched = self.with_retry(|| self.client.count(query)).await?;
        result.documents_matched = matched;

        if job.is_dry_run() {
            result.documents_mutated = matched;
        } else {
            match self.with_retry(|| self.client.delete_by_query(query)).await {
                Ok(()) => result.documents_mutated = matched,
                Err(err) if Self::is_fatal(&err) => return Err(err),
                Err(err) => result.record_failure(FailureSubject::Chunk(0), err.to_string(), matched),
            }
        }
        self.report_progress(result.documents_matched);
        Ok(())
    }

    async fn run_delete_by_ids(
        &self,
        job: &BatchJob,
        ids: &[String],
        result: &mut BatchResult,
    ) -> Result<(), ClientError> {
        for (index, chunk) in ids.chunks(job.page_size() as usize).enumerate() {
            if self.cancel.is_cancelled() {
                result.aborted = true;
                return Ok(());
            }
            result.documents_matched += chunk.len() as u64;

            if job.is_dry_run() {
                result.documents_mutated += chunk.len() as u64;
            } else {
                match self.with_retry(|| self.client.delete_by_ids(chunk)).await {
                    Ok(()) => result.documents_mutated += chunk.len() as u64,
                    Err(err) if Self::is_fatal(&err) => return Err(err),
                    Err(err) => result.record_failure(
                        FailureSubject::Chunk(index),
                        err.to_string(),
                        chunk.len() as u64,
                    ),
                }
            }
            self.report_progress(result.documents_matched);
        }
        Ok(())
    }

    async fn next_page_with_retry(
        &self,
        cursor: &mut QueryCursor<'_>,
    ) -> Result<Option<Vec<SolrDocument>>, ClientError> {
        let mut attempt = 0;
        loop {
            match cursor.next_page().await {
                Ok(page) => return Ok(page),
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        target: TRACING_TARGET,
                        attempt,
                        error = %err,
                        "Retrying page fetch"
                    );
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn with_retry<T, F, Fut>(&self, op: F) -> Result<T, ClientError>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, ClientError>>,
    {
        let mut attempt = 0;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retryable() && attempt < self.retry.max_retries => {
                    attempt += 1;
                    warn!(
                        target: TRACING_TARGET,
                        attempt,
                        error = %err,
                        "Retrying after transient failure"
                    );
                    tokio::time::sleep(self.retry.delay(attempt)).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// A retryable error that survived the retry budget means the connection
    /// itself is bad; credential rejections never improve on retry.
    fn is_fatal(err: &ClientError) -> bool {
        err.is_auth() || err.is_retryable()
    }

    fn report_progress(&self, processed: u64) {
        if let Some(progress) = &self.progress {
            progress(processed);
        }
    }
}

fn record_missing_id(result: &mut BatchResult) {
    result.record_failure(
        FailureSubject::Document("<missing id>".to_string()),
        "document has no unique key",
        1,
    );
}

impl std::fmt::Debug for BatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchEngine")
            .field("client", &self.client)
            .field("retry", &self.retry)
            .field("progress", &self.progress.as_ref().map(|_| "fn"))
            .finish()
    }
}
