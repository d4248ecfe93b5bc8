//! Batch mutation specifications.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

/// The mutation a batch job applies to every matched document.
///
/// Exactly one variant is active per job; the closed union makes "one
/// mutation mode per job" structural rather than a runtime check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MutationSpec {
    /// Set the named fields on every matched document, leaving all other
    /// fields untouched. Issued as atomic partial updates.
    AddUpdateFields {
        /// Field name to new value.
        fields: BTreeMap<String, Value>,
        /// Upper bound on commit latency passed through to the server.
        #[serde(default)]
        commit_within: Option<Duration>,
    },

    /// Remove the named fields from every matched document.
    DeleteFields {
        /// Fields to remove.
        field_names: BTreeSet<String>,
    },

    /// Delete everything matching a query in one server-side call.
    DeleteByQuery {
        /// The deletion query.
        query: String,
    },

    /// Delete an explicit id list, chunked to the job's page size.
    DeleteByIds {
        /// Ids to delete, in order.
        ids: Vec<String>,
    },
}

impl MutationSpec {
    /// Short name for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddUpdateFields { .. } => "add_update_fields",
            Self::DeleteFields { .. } => "delete_fields",
            Self::DeleteByQuery { .. } => "delete_by_query",
            Self::DeleteByIds { .. } => "delete_by_ids",
        }
    }

    /// The commit latency bound, when the variant carries one.
    pub fn commit_within(&self) -> Option<Duration> {
        match self {
            Self::AddUpdateFields { commit_within, .. } => *commit_within,
            _ => None,
        }
    }

    /// Whether this mutation iterates documents through the query cursor.
    pub fn is_per_document(&self) -> bool {
        matches!(self, Self::AddUpdateFields { .. } | Self::DeleteFields { .. })
    }

    /// Builds the atomic update document for one matched document.
    ///
    /// Uses `set` operations throughout, so applying the same mutation
    /// twice yields the same field values as applying it once; `set: null`
    /// removes a field.
    ///
    /// Returns `None` for variants that do not mutate per document.
    pub(crate) fn atomic_update_doc(&self, id: &str) -> Option<Value> {
        let mut doc = Map::new();
        doc.insert("id".to_string(), Value::String(id.to_string()));
        match self {
            Self::AddUpdateFields { fields, .. } => {
                for (name, value) in fields {
                    doc.insert(name.clone(), json!({ "set": value }));
                }
            }
            Self::DeleteFields { field_names } => {
                for name in field_names {
                    doc.insert(name.clone(), json!({ "set": null }));
                }
            }
            Self::DeleteByQuery { .. } | Self::DeleteByIds { .. } => return None,
        }
        Some(Value::Object(doc))
    }

    /// Validates the variant's payload.
    pub(crate) fn validate(&self) -> Result<(), String> {
        match self {
            Self::AddUpdateFields { fields, .. } => {
                if fields.is_empty() {
                    return Err("add/update mutation names no fields".to_string());
                }
                if fields.contains_key("id") {
                    return Err("the unique key 'id' cannot be mutated".to_string());
                }
            }
            Self::DeleteFields { field_names } => {
                if field_names.is_empty() {
                    return Err("field deletion names no fields".to_string());
                }
                if field_names.contains("id") {
                    return Err("the unique key 'id' cannot be removed".to_string());
                }
            }
            Self::DeleteByQuery { query } => {
                if query.trim().is_empty() {
                    return Err("delete-by-query requires a non-empty query".to_string());
                }
            }
            Self::DeleteByIds { .. } => {}
        }
        Ok(())
    }
}
