use std::time::Duration;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Map, Value};

use super::base::{Document, RetrieveOptions, Retriever, SearchResults};
use crate::config::RetrievalConfig;

/// Marker substituted when the backend returns a document without text.
pub const NO_TEXT_AVAILABLE: &str = "No text available";

/// Client for the managed retrieval pipeline.
pub struct VectorizeClient {
    client: Client,
    config: RetrievalConfig,
}

impl VectorizeClient {
    pub fn new(config: RetrievalConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;

        Ok(Self { client, config })
    }

    async fn post(&self, url: &str, token: &str, payload: Value) -> Result<Value> {
        let response = self
            .client
            .post(url)
            .header("Authorization", format!("Bearer {}", token))
            .json(&payload)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            // The body is read for diagnostics only; callers get the status.
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "retrieval request failed");
            return Err(anyhow!("Retrieval request failed: {}", status));
        }

        Ok(response.json().await?)
    }

    fn normalize_document(doc: &Value) -> Document {
        let metadata = doc.get("metadata").cloned().unwrap_or(Value::Null);
        let chunk_id = metadata.get("chunk_id").cloned();
        let filename = metadata
            .get("source_display_name")
            .or_else(|| metadata.get("source"))
            .and_then(|v| v.as_str())
            .map(String::from);
        let total_chunks = metadata.get("total_chunks").cloned();
        let document_metadata = metadata.get("document_metadata").cloned();

        Document {
            id: doc
                .get("id")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string(),
            score: doc.get("score").and_then(|v| v.as_f64()).unwrap_or(0.0),
            text: doc
                .get("text")
                .and_then(|v| v.as_str())
                .filter(|text| !text.is_empty())
                .unwrap_or(NO_TEXT_AVAILABLE)
                .to_string(),
            metadata,
            chunk_id,
            filename,
            total_chunks,
            document_metadata,
        }
    }
}

#[async_trait]
impl Retriever for VectorizeClient {
    async fn retrieve(&self, question: &str, options: RetrieveOptions) -> Result<SearchResults> {
        // Credentials are checked before anything goes over the wire.
        let creds = self.config.credentials()?;

        let mut payload = json!({
            "question": question,
            "numResults": options.num_results,
        });

        // An empty filter list is omitted entirely, never sent as [].
        if !options.metadata_filters.is_empty() {
            let filters: Vec<Value> = options
                .metadata_filters
                .iter()
                .map(|filter| {
                    let mut clause = Map::new();
                    clause.insert(filter.key.clone(), json!(filter.values));
                    Value::Object(clause)
                })
                .collect();
            payload
                .as_object_mut()
                .unwrap()
                .insert("metadata-filters".to_string(), json!(filters));
        }

        tracing::debug!(
            %question,
            num_results = options.num_results,
            filters = options.metadata_filters.len(),
            "querying retrieval pipeline"
        );

        let url = format!(
            "{}/org/{}/pipelines/{}/retrieval",
            self.config.host.trim_end_matches('/'),
            creds.organization_id,
            creds.pipeline_id,
        );

        let response = self.post(&url, creds.api_token, payload).await?;

        let documents: Vec<Document> = response
            .get("documents")
            .and_then(|v| v.as_array())
            .map(|docs| docs.iter().map(Self::normalize_document).collect())
            .unwrap_or_default();

        tracing::debug!(documents = documents.len(), "retrieval response received");

        Ok(SearchResults { documents })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retrieval::base::MetadataFilter;
    use wiremock::matchers::{body_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn test_config(host: &str) -> RetrievalConfig {
        RetrievalConfig::new(
            Some("test-token".to_string()),
            Some("org-1".to_string()),
            Some("pipe-1".to_string()),
        )
        .with_host(host)
    }

    #[tokio::test]
    async fn test_retrieve_normalizes_documents() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/org/org-1/pipelines/pipe-1/retrieval"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{
                    "id": "doc-1",
                    "score": 0.91,
                    "text": "TP1281 is a rail-to-rail op amp",
                    "metadata": {
                        "chunk_id": 4,
                        "source_display_name": "tp1281.pdf",
                        "total_chunks": 12,
                        "document_metadata": {"component_type": "op_amp"}
                    }
                }]
            })))
            .mount(&server)
            .await;

        let client = VectorizeClient::new(test_config(&server.uri()))?;
        let results = client
            .retrieve("op amp", RetrieveOptions::default())
            .await?;

        assert_eq!(results.documents.len(), 1);
        let doc = &results.documents[0];
        assert_eq!(doc.id, "doc-1");
        assert_eq!(doc.score, 0.91);
        assert_eq!(doc.text, "TP1281 is a rail-to-rail op amp");
        assert_eq!(doc.filename.as_deref(), Some("tp1281.pdf"));
        assert_eq!(doc.chunk_id, Some(json!(4)));
        assert_eq!(doc.document_metadata, Some(json!({"component_type": "op_amp"})));
        Ok(())
    }

    #[tokio::test]
    async fn test_retrieve_omits_empty_filter_list() -> Result<()> {
        let server = MockServer::start().await;
        // Exact body match: the mock only responds when "metadata-filters"
        // is absent from the payload.
        Mock::given(method("POST"))
            .and(path("/org/org-1/pipelines/pipe-1/retrieval"))
            .and(body_json(json!({"question": "adc", "numResults": 5})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": []})))
            .mount(&server)
            .await;

        let client = VectorizeClient::new(test_config(&server.uri()))?;
        let results = client.retrieve("adc", RetrieveOptions::default()).await?;
        assert!(results.documents.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_retrieve_sends_filter_clauses() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/org/org-1/pipelines/pipe-1/retrieval"))
            .and(body_json(json!({
                "question": "low power",
                "numResults": 20,
                "metadata-filters": [{"document_metadata.component_type": ["adc"]}]
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"documents": []})))
            .mount(&server)
            .await;

        let client = VectorizeClient::new(test_config(&server.uri()))?;
        let options = RetrieveOptions {
            num_results: 20,
            metadata_filters: vec![MetadataFilter::new(
                "document_metadata.component_type",
                vec!["adc".to_string()],
            )],
        };
        let results = client.retrieve("low power", options).await?;
        assert!(results.documents.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn test_retrieve_defaults_missing_text() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/org/org-1/pipelines/pipe-1/retrieval"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "documents": [{"id": "doc-1", "score": 0.5, "metadata": {}}]
            })))
            .mount(&server)
            .await;

        let client = VectorizeClient::new(test_config(&server.uri()))?;
        let results = client
            .retrieve("anything", RetrieveOptions::default())
            .await?;
        assert_eq!(results.documents[0].text, NO_TEXT_AVAILABLE);
        Ok(())
    }

    #[tokio::test]
    async fn test_retrieve_propagates_backend_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/org/org-1/pipelines/pipe-1/retrieval"))
            .respond_with(ResponseTemplate::new(500).set_body_string("pipeline exploded"))
            .mount(&server)
            .await;

        let client = VectorizeClient::new(test_config(&server.uri()))?;
        let err = client
            .retrieve("anything", RetrieveOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("500"));
        Ok(())
    }

    #[tokio::test]
    async fn test_retrieve_fails_fast_without_credentials() -> Result<()> {
        // No mock server at all: a missing credential must fail before any
        // request is issued.
        let config = RetrievalConfig::new(None, Some("org-1".to_string()), None)
            .with_host("http://127.0.0.1:9");
        let client = VectorizeClient::new(config)?;

        let err = client
            .retrieve("anything", RetrieveOptions::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("api_token"));
        assert!(err.to_string().contains("pipeline_id"));
        Ok(())
    }
}
