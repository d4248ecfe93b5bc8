//! Batch job and result types.

use std::time::Duration;

use serde::Serialize;

use crate::mutation::MutationSpec;
use crate::resolver::ProfileConfig;

/// Default number of documents per page/chunk.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// One batch mutation run: a document selection plus exactly one mutation.
///
/// Constructed once from resolved inputs, executed once, not reused.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchJob {
    query: String,
    page_size: u32,
    mutation: MutationSpec,
    dry_run: bool,
}

impl BatchJob {
    /// Creates a job applying `mutation` to every document matching `query`.
    pub fn new(query: impl Into<String>, mutation: MutationSpec) -> Self {
        Self {
            query: query.into(),
            page_size: DEFAULT_PAGE_SIZE,
            mutation,
            dry_run: false,
        }
    }

    /// Creates a delete-by-query job. The selection query doubles as the
    /// deletion query.
    pub fn delete_by_query(query: impl Into<String>) -> Self {
        let query = query.into();
        Self::new(
            query.clone(),
            MutationSpec::DeleteByQuery { query },
        )
    }

    /// Creates a delete-by-id-list job. The id list is iterated directly;
    /// no selection query is involved.
    pub fn delete_by_ids(ids: Vec<String>) -> Self {
        Self::new("", MutationSpec::DeleteByIds { ids })
    }

    /// Overrides the page/chunk size.
    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size;
        self
    }

    /// Marks the job as a dry run: documents are counted but no mutation
    /// is sent.
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Applies the profile's job defaults: `batch_size` becomes the page
    /// size, and `commit_within_ms` the commit bound for field updates
    /// whose mutation does not carry its own. Call before job-specific
    /// builders so explicit settings win.
    pub fn with_defaults_from(mut self, profile: &ProfileConfig) -> Self {
        if let Some(batch_size) = profile.batch_size {
            self.page_size = batch_size;
        }
        if let (Some(ms), MutationSpec::AddUpdateFields { commit_within, .. }) =
            (profile.commit_within_ms, &mut self.mutation)
        {
            if commit_within.is_none() {
                *commit_within = Some(Duration::from_millis(ms));
            }
        }
        self
    }

    /// The document selection query (unused for delete-by-id-list).
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Documents per page/chunk.
    pub fn page_size(&self) -> u32 {
        self.page_size
    }

    /// The mutation this job applies.
    pub fn mutation(&self) -> &MutationSpec {
        &self.mutation
    }

    /// Whether this run skips the mutation endpoint.
    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    /// Rejects structurally invalid jobs before any document is touched.
    pub fn validate(&self) -> Result<(), String> {
        if self.page_size == 0 {
            return Err("page size must be positive".to_string());
        }
        self.mutation.validate()?;
        if self.mutation.is_per_document() && self.query.trim().is_empty() {
            return Err("per-document mutations require a selection query".to_string());
        }
        Ok(())
    }
}

/// What a mutation failure refers to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureSubject {
    /// A single document, by unique key.
    Document(String),
    /// A whole chunk of a delete-by-id-list run, by chunk index.
    Chunk(usize),
}

/// One recorded mutation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutationFailure {
    /// The document or chunk that failed.
    pub subject: FailureSubject,
    /// Why it failed.
    pub message: String,
}

/// Aggregated outcome of a batch job.
///
/// For every run that completes without abort,
/// `documents_mutated + documents_failed == documents_matched`: each matched
/// document is accounted for exactly once. Dry runs count would-be
/// mutations as mutated so the invariant holds there too.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchResult {
    /// Documents matched by the selection (or listed ids).
    pub documents_matched: u64,
    /// Documents successfully mutated (or that would have been, on dry run).
    pub documents_mutated: u64,
    /// Documents whose mutation failed.
    pub documents_failed: u64,
    /// Per-document and per-chunk failures, in encounter order.
    pub errors: Vec<MutationFailure>,
    /// Whether the job was aborted between pages; counts cover the pages
    /// processed before the abort.
    pub aborted: bool,
}

impl BatchResult {
    /// Whether every matched document was mutated.
    pub fn is_fully_applied(&self) -> bool {
        !self.aborted && self.documents_failed == 0
    }

    pub(crate) fn record_failure(
        &mut self,
        subject: FailureSubject,
        message: impl Into<String>,
        documents: u64,
    ) {
        self.documents_failed += documents;
        self.errors.push(MutationFailure {
            subject,
            message: message.into(),
        });
    }
}
