//! Full-text index sink
//!
//! The pipeline talks to the index through the [`DocumentSink`] trait;
//! [`SearchIndex`] is the OpenSearch implementation. Document ids are a
//! deterministic function of the URL, so re-crawls overwrite rather than
//! duplicate and retries are idempotent.

use async_trait::async_trait;
use opensearch::http::request::JsonBody;
use opensearch::http::transport::{SingleNodeConnectionPool, TransportBuilder};
use opensearch::indices::{IndicesCreateParts, IndicesExistsParts};
use opensearch::{BulkParts, IndexParts, OpenSearch, SearchParts};
use serde_json::{json, Value};
use url::Url;

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::metrics;
use crate::models::IndexedDocument;

/// One search result row
#[derive(Debug, Clone)]
pub struct SearchHit {
    pub url: String,
    pub title: String,
    pub score: f64,
}

/// Where indexed documents go
#[async_trait]
pub trait DocumentSink: Send + Sync {
    /// Create the backing index if it does not exist
    async fn ensure_index(&self) -> Result<()>;

    /// Index or overwrite one document under its deterministic id
    async fn index_document(&self, doc: &IndexedDocument) -> Result<()>;

    /// Index a batch of documents in one request
    async fn bulk_index(&self, docs: &[IndexedDocument]) -> Result<()>;

    /// Full-text query over title, description, and content
    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>>;
}

/// OpenSearch-backed document sink
pub struct SearchIndex {
    client: OpenSearch,
    index_name: String,
}

impl SearchIndex {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let url = Url::parse(&config.url)
            .map_err(|e| Error::config(format!("invalid OpenSearch URL: {e}")))?;

        let conn_pool = SingleNodeConnectionPool::new(url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();

        if let (Some(username), Some(password)) = (&config.username, &config.password) {
            builder = builder.auth(opensearch::auth::Credentials::Basic(
                username.clone(),
                password.clone(),
            ));
        }

        let transport = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build OpenSearch transport: {e}")))?;

        Ok(Self {
            client: OpenSearch::new(transport),
            index_name: config.index_name.clone(),
        })
    }

    fn mappings() -> Value {
        json!({
            "mappings": {
                "properties": {
                    "url": { "type": "keyword" },
                    "title": { "type": "text" },
                    "description": { "type": "text" },
                    "content": { "type": "text" },
                    "keywords": { "type": "keyword" },
                    "domain": { "type": "keyword" },
                    "crawl_date": { "type": "date" },
                    "last_modified": { "type": "date" },
                    "content_type": { "type": "keyword" },
                    "language": { "type": "keyword" },
                    "word_count": { "type": "integer" },
                    "content_hash": { "type": "keyword" },
                    "links": {
                        "properties": {
                            "url": { "type": "keyword" },
                            "text": { "type": "text" },
                            "title": { "type": "text" }
                        }
                    },
                    "metadata": { "type": "object", "enabled": false }
                }
            }
        })
    }
}

#[async_trait]
impl DocumentSink for SearchIndex {
    async fn ensure_index(&self) -> Result<()> {
        let exists = self
            .client
            .indices()
            .exists(IndicesExistsParts::Index(&[&self.index_name]))
            .send()
            .await?;

        if exists.status_code().is_success() {
            return Ok(());
        }

        let response = self
            .client
            .indices()
            .create(IndicesCreateParts::Index(&self.index_name))
            .body(Self::mappings())
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(Error::IndexStatus(response.status_code().as_u16()));
        }

        tracing::info!(index = %self.index_name, "Search index created");
        Ok(())
    }

    async fn index_document(&self, doc: &IndexedDocument) -> Result<()> {
        let response = self
            .client
            .index(IndexParts::IndexId(&self.index_name, &doc.id))
            .body(doc)
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(Error::IndexStatus(response.status_code().as_u16()));
        }

        metrics::DOCUMENTS_INDEXED.inc();
        Ok(())
    }

    async fn bulk_index(&self, docs: &[IndexedDocument]) -> Result<()> {
        if docs.is_empty() {
            return Ok(());
        }

        let mut body: Vec<JsonBody<Value>> = Vec::with_capacity(docs.len() * 2);
        for doc in docs {
            body.push(json!({ "index": { "_id": doc.id } }).into());
            body.push(serde_json::to_value(doc)?.into());
        }

        let response = self
            .client
            .bulk(BulkParts::Index(&self.index_name))
            .body(body)
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(Error::IndexStatus(response.status_code().as_u16()));
        }

        metrics::DOCUMENTS_INDEXED.inc_by(docs.len() as f64);
        Ok(())
    }

    async fn search(&self, query: &str, k: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .search(SearchParts::Index(&[&self.index_name]))
            .size(k as i64)
            .body(json!({
                "query": {
                    "multi_match": {
                        "query": query,
                        "fields": ["title^3", "description^2", "content", "keywords^2"]
                    }
                }
            }))
            .send()
            .await?;

        if !response.status_code().is_success() {
            return Err(Error::IndexStatus(response.status_code().as_u16()));
        }

        let body: Value = response.json().await?;
        let hits = body["hits"]["hits"]
            .as_array()
            .cloned()
            .unwrap_or_default();

        Ok(hits
            .iter()
            .map(|hit| SearchHit {
                url: hit["_source"]["url"].as_str().unwrap_or_default().to_string(),
                title: hit["_source"]["title"].as_str().unwrap_or_default().to_string(),
                score: hit["_score"].as_f64().unwrap_or(0.0),
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_creation() {
        let config = SearchConfig::default();
        assert!(SearchIndex::new(&config).is_ok());

        let bad = SearchConfig {
            url: String::from("not a url"),
            ..Default::default()
        };
        assert!(SearchIndex::new(&bad).is_err());
    }

    #[test]
    fn test_mappings_cover_document_fields() {
        let mappings = SearchIndex::mappings();
        let properties = &mappings["mappings"]["properties"];
        for field in [
            "url",
            "title",
            "content",
            "keywords",
            "domain",
            "crawl_date",
            "content_hash",
            "links",
        ] {
            assert!(!properties[field].is_null(), "missing mapping for {field}");
        }
    }

    // Round-trip tests need a live cluster
    #[tokio::test]
    #[ignore = "Requires running OpenSearch"]
    async fn test_index_round_trip() {
        use crate::models::document_id;
        use std::collections::HashMap;

        let sink = SearchIndex::new(&SearchConfig::default()).unwrap();
        sink.ensure_index().await.unwrap();

        let url = "https://example.com/roundtrip";
        let doc = IndexedDocument {
            id: document_id(url),
            url: url.into(),
            title: "Round trip".into(),
            description: String::new(),
            content: "round trip body".into(),
            keywords: vec![],
            domain: "example.com".into(),
            crawl_date: chrono::Utc::now(),
            last_modified: None,
            content_type: "text/html".into(),
            language: "en".into(),
            word_count: 3,
            content_hash: crate::models::content_hash("round trip body"),
            links: vec![],
            metadata: HashMap::new(),
        };

        sink.index_document(&doc).await.unwrap();
        // Indexing the same URL again must overwrite, not duplicate
        sink.index_document(&doc).await.unwrap();
    }
}
