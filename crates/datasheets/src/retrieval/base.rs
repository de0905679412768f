use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Result cap used when a caller does not ask for a specific count.
pub const DEFAULT_NUM_RESULTS: u32 = 5;

/// One metadata constraint: a document matches when the value at `key`
/// (dot-addressed into nested metadata) equals any of `values`. Clauses
/// combine with AND; an absent key is simply a non-match, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetadataFilter {
    pub key: String,
    pub values: Vec<String>,
}

impl MetadataFilter {
    pub fn new<K: Into<String>>(key: K, values: Vec<String>) -> Self {
        Self {
            key: key.into(),
            values,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RetrieveOptions {
    pub num_results: u32,
    pub metadata_filters: Vec<MetadataFilter>,
}

impl Default for RetrieveOptions {
    fn default() -> Self {
        Self {
            num_results: DEFAULT_NUM_RESULTS,
            metadata_filters: Vec::new(),
        }
    }
}

/// A single normalized document returned by the retrieval pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub score: f64,
    pub text: String,
    #[serde(default)]
    pub metadata: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chunk_id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_chunks: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub document_metadata: Option<Value>,
}

/// Documents come back score-ranked; backend order is preserved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub documents: Vec<Document>,
}

/// Seam to the hosted document-retrieval pipeline.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Run one retrieval query. Succeeds with normalized results or fails
    /// with a description; translating failures into something the model can
    /// read is the caller's job.
    async fn retrieve(&self, question: &str, options: RetrieveOptions) -> Result<SearchResults>;
}
