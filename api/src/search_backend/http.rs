//! HTTP client for an Elasticsearch-compatible search service.

use anyhow::Context;
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};

use super::{SearchBackend, SearchHit, SearchResults};

const REQUEST_TIMEOUT_SECS: u64 = 30;

pub struct HttpSearchBackend {
    client: Client,
    base_url: String,
    index_prefix: String,
}

impl HttpSearchBackend {
    pub fn new(base_url: impl Into<String>, index_prefix: impl Into<String>) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            index_prefix: index_prefix.into(),
        })
    }

    /// The index dialect keeps every index name lower-case, so the prefix
    /// and collection name are normalized here regardless of how the caller
    /// spells them.
    fn index_name(&self, collection: &str) -> String {
        format!("{}_{}", self.index_prefix, collection).to_lowercase()
    }

    fn index_url(&self, collection: &str, path: &str) -> String {
        format!("{}/{}{}", self.base_url, self.index_name(collection), path)
    }

    async fn error_from(&self, response: reqwest::Response) -> anyhow::Error {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        anyhow::anyhow!("search backend error ({}): {}", status, body)
    }
}

#[derive(Debug, Deserialize)]
struct EsSearchResponse {
    hits: EsHits,
}

#[derive(Debug, Deserialize)]
struct EsHits {
    total: EsTotal,
    hits: Vec<EsHit>,
}

#[derive(Debug, Deserialize)]
struct EsTotal {
    value: u64,
}

#[derive(Debug, Deserialize)]
struct EsHit {
    #[serde(rename = "_id")]
    id: String,
    #[serde(rename = "_score")]
    score: Option<f64>,
    #[serde(rename = "_source", default)]
    source: Value,
}

#[derive(Debug, Deserialize)]
struct EsBulkResponse {
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<Value>,
}

#[async_trait]
impl SearchBackend for HttpSearchBackend {
    async fn search(
        &self,
        collection: &str,
        query: &str,
        skip: u64,
        limit: u64,
        filter: Option<&Value>,
    ) -> anyhow::Result<SearchResults> {
        // Strict full-text matching: terms combine with AND, quotes give
        // exact phrases.
        let mut query_body = json!({
            "simple_query_string": {
                "query": query,
                "fields": ["display_name"],
                "default_operator": "and",
                "analyze_wildcard": false,
                "auto_generate_synonyms_phrase_query": false,
                "flags": "PHRASE|PRECEDENCE|AND|NOT|OR|WHITESPACE"
            }
        });
        if let Some(filter) = filter {
            query_body = json!({
                "bool": {
                    "must": [query_body],
                    "filter": filter
                }
            });
        }
        let body = json!({
            "query": query_body,
            "from": skip,
            "size": limit,
            "sort": [{ "_score": { "order": "desc" } }]
        });

        let response = self
            .client
            .post(self.index_url(collection, "/_search"))
            .json(&body)
            .send()
            .await
            .context("search request failed")?;
        if !response.status().is_success() {
            return Err(self.error_from(response).await);
        }

        let parsed: EsSearchResponse = response
            .json()
            .await
            .context("unparseable search response")?;
        Ok(SearchResults {
            total: parsed.hits.total.value,
            hits: parsed
                .hits
                .hits
                .into_iter()
                .map(|hit| SearchHit {
                    id: hit.id,
                    score: hit.score.unwrap_or(0.0),
                    source: hit.source,
                })
                .collect(),
        })
    }

    async fn index_document(&self, collection: &str, id: &str, doc: &Value) -> anyhow::Result<()> {
        let url = self.index_url(collection, &format!("/_doc/{}", id));
        let response = self.client.put(&url).json(doc).send().await?;
        if !response.status().is_success() {
            return Err(self.error_from(response).await);
        }
        Ok(())
    }

    async fn bulk_index(&self, collection: &str, docs: &[(String, Value)]) -> anyhow::Result<()> {
        if docs.is_empty() {
            return Ok(());
        }
        let index = self.index_name(collection);
        let mut ndjson = String::new();
        for (id, doc) in docs {
            // Create ops fail on existing documents instead of overwriting.
            ndjson.push_str(&json!({ "create": { "_index": index, "_id": id } }).to_string());
            ndjson.push('\n');
            ndjson.push_str(&doc.to_string());
            ndjson.push('\n');
        }

        let response = self
            .client
            .post(format!("{}/_bulk?refresh=true", self.base_url))
            .header("Content-Type", "application/x-ndjson")
            .body(ndjson)
            .send()
            .await?;
        if !response.status().is_success() {
            return Err(self.error_from(response).await);
        }

        let parsed: EsBulkResponse = response.json().await.context("unparseable bulk response")?;
        if parsed.errors {
            // Documents that already exist are expected on re-index runs;
            // anything else counts as a failure.
            let failed = parsed
                .items
                .iter()
                .filter(|item| {
                    let error = item["create"]["error"]["type"].as_str();
                    error.is_some() && error != Some("version_conflict_engine_exception")
                })
                .count();
            let already_indexed = parsed.items.len() - failed;
            tracing::info!(
                collection,
                total = docs.len(),
                already_indexed,
                failed,
                "bulk indexing finished with per-document errors"
            );
            if failed > 0 {
                anyhow::bail!("bulk indexing failed for {} documents", failed);
            }
        }
        Ok(())
    }

    async fn initialize_indices(&self, collections: &[&str]) -> anyhow::Result<()> {
        for collection in collections {
            let url = self.index_url(collection, "");
            let head = self.client.head(&url).send().await?;
            if head.status() == StatusCode::OK {
                continue;
            }

            let mappings = json!({
                "mappings": {
                    "properties": {
                        "id": { "type": "keyword" },
                        "display_name": {
                            "type": "text",
                            "analyzer": "standard",
                            "fields": {
                                "keyword": { "type": "keyword" }
                            }
                        }
                    }
                }
            });
            let response = self.client.put(&url).json(&mappings).send().await?;
            if !response.status().is_success() {
                return Err(self.error_from(response).await);
            }
            tracing::info!(index = %self.index_name(collection), "created search index");
        }
        Ok(())
    }

    async fn delete_index(&self, collection: &str) -> anyhow::Result<()> {
        let response = self
            .client
            .delete(self.index_url(collection, ""))
            .send()
            .await?;
        if !response.status().is_success() && response.status() != StatusCode::NOT_FOUND {
            return Err(self.error_from(response).await);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;
    use serde_json::json;

    fn hit(id: &str, score: f64, name: &str) -> Value {
        json!({ "_id": id, "_score": score, "_source": { "id": id, "display_name": name } })
    }

    #[tokio::test]
    async fn test_search_parses_ranked_hits() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/scholarly_publishers/_search")
            .match_body(Matcher::PartialJson(json!({
                "query": {
                    "simple_query_string": {
                        "query": "nature group",
                        "default_operator": "and"
                    }
                },
                "from": 0,
                "size": 10
            })))
            .with_body(
                json!({
                    "hits": {
                        "total": { "value": 2 },
                        "hits": [hit("P1", 9.5, "Nature Group"), hit("P2", 3.2, "Nature Research")]
                    }
                })
                .to_string(),
            )
            .create_async()
            .await;

        let backend = HttpSearchBackend::new(server.url(), "scholarly").unwrap();
        let results = backend
            .search("publishers", "nature group", 0, 10, None)
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(results.total, 2);
        assert_eq!(results.hits.len(), 2);
        assert_eq!(results.hits[0].id, "P1");
        assert!(results.hits[0].score > results.hits[1].score);
    }

    #[tokio::test]
    async fn test_filter_becomes_bool_must_filter() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/scholarly_works/_search")
            .match_body(Matcher::PartialJson(json!({
                "query": {
                    "bool": {
                        "must": [{ "simple_query_string": { "query": "proteins" } }],
                        "filter": { "term": { "type": "journal-article" } }
                    }
                }
            })))
            .with_body(
                json!({ "hits": { "total": { "value": 0 }, "hits": [] } }).to_string(),
            )
            .create_async()
            .await;

        let backend = HttpSearchBackend::new(server.url(), "scholarly").unwrap();
        let filter = json!({ "term": { "type": "journal-article" } });
        let results = backend
            .search("works", "proteins", 0, 10, Some(&filter))
            .await
            .unwrap();

        mock.assert_async().await;
        assert_eq!(results.total, 0);
    }

    #[tokio::test]
    async fn test_index_names_are_lowercased() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/scholarly_works/_search")
            .with_body(
                json!({ "hits": { "total": { "value": 0 }, "hits": [] } }).to_string(),
            )
            .create_async()
            .await;

        let backend = HttpSearchBackend::new(server.url(), "Scholarly").unwrap();
        backend.search("Works", "x", 0, 10, None).await.unwrap();
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_search_error_is_propagated() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/scholarly_works/_search")
            .with_status(503)
            .with_body("index is rebuilding")
            .create_async()
            .await;

        let backend = HttpSearchBackend::new(server.url(), "scholarly").unwrap();
        let err = backend.search("works", "x", 0, 10, None).await.unwrap_err();
        assert!(err.to_string().contains("503"));
    }

    #[tokio::test]
    async fn test_initialize_skips_existing_index() {
        let mut server = mockito::Server::new_async().await;
        let head = server
            .mock("HEAD", "/scholarly_works")
            .with_status(200)
            .create_async()
            .await;

        let backend = HttpSearchBackend::new(server.url(), "scholarly").unwrap();
        backend.initialize_indices(&["works"]).await.unwrap();
        head.assert_async().await;
    }

    #[tokio::test]
    async fn test_initialize_creates_missing_index_with_mappings() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("HEAD", "/scholarly_works")
            .with_status(404)
            .create_async()
            .await;
        let put = server
            .mock("PUT", "/scholarly_works")
            .match_body(Matcher::PartialJson(json!({
                "mappings": { "properties": { "id": { "type": "keyword" } } }
            })))
            .with_body("{}")
            .create_async()
            .await;

        let backend = HttpSearchBackend::new(server.url(), "scholarly").unwrap();
        backend.initialize_indices(&["works"]).await.unwrap();
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_index_document_puts_by_id() {
        let mut server = mockito::Server::new_async().await;
        let put = server
            .mock("PUT", "/scholarly_works/_doc/W1")
            .match_body(Matcher::PartialJson(json!({ "display_name": "Alpha" })))
            .with_body("{}")
            .create_async()
            .await;

        let backend = HttpSearchBackend::new(server.url(), "scholarly").unwrap();
        backend
            .index_document("works", "W1", &json!({ "display_name": "Alpha" }))
            .await
            .unwrap();
        put.assert_async().await;
    }

    #[tokio::test]
    async fn test_delete_index_tolerates_missing() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("DELETE", "/scholarly_works")
            .with_status(404)
            .create_async()
            .await;

        let backend = HttpSearchBackend::new(server.url(), "scholarly").unwrap();
        backend.delete_index("works").await.unwrap();
    }

    #[tokio::test]
    async fn test_bulk_index_sends_ndjson_create_ops() {
        let mut server = mockito::Server::new_async().await;
        let bulk = server
            .mock("POST", "/_bulk?refresh=true")
            .match_body(Matcher::Regex(r#""create""#.to_string()))
            .with_body(json!({ "errors": false, "items": [] }).to_string())
            .create_async()
            .await;

        let backend = HttpSearchBackend::new(server.url(), "scholarly").unwrap();
        backend
            .bulk_index(
                "works",
                &[("W1".to_string(), json!({ "display_name": "Alpha" }))],
            )
            .await
            .unwrap();
        bulk.assert_async().await;
    }
}
