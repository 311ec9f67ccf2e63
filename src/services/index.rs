//! Vector index service client
//!
//! The index holds two kinds of collections: one global collection with an
//! entry per indexed frame across all streams (used to shortlist candidate
//! streams), and one collection per stream keyed by frame index. Both are
//! reached through the same HTTP API.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

/// One similarity hit returned by a search call.
///
/// For the global collection `stream` names the stream owning the frame; for
/// a per-stream collection it equals the collection itself and `frame` is the
/// entry's primary key.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub stream: String,
    pub frame: i64,
    pub score: f32,
}

/// One batched-lookup result, keyed by the frame id it was requested for
#[derive(Debug, Clone, Deserialize)]
pub struct OffsetEntry {
    pub frame: i64,
    pub offset: u64,
}

#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Cosine-similarity search, hits sorted by similarity descending
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> QueryResult<Vec<SearchHit>>;

    /// Batched point lookup of storage offsets for the given frame ids.
    /// The returned entries preserve the order of `ids`.
    async fn get_offsets(&self, collection: &str, ids: &[i64]) -> QueryResult<Vec<OffsetEntry>>;

    /// Number of indexed frames in a collection (highest valid frame id + 1)
    async fn frame_count(&self, collection: &str) -> QueryResult<i64>;
}

#[derive(Serialize)]
struct SearchRequest<'a> {
    vector: &'a [f32],
    limit: usize,
    metric: &'static str,
}

#[derive(Deserialize)]
struct SearchResponse {
    hits: Vec<SearchHit>,
}

#[derive(Serialize)]
struct GetRequest<'a> {
    ids: &'a [i64],
    fields: &'a [&'a str],
}

#[derive(Deserialize)]
struct GetResponse {
    entries: Vec<OffsetEntry>,
}

#[derive(Deserialize)]
struct StatsResponse {
    num_entities: i64,
}

/// HTTP client for the vector index service
pub struct HttpVectorIndex {
    client: reqwest::Client,
    base_url: String,
}

impl HttpVectorIndex {
    pub fn new(base_url: &str, timeout: Duration) -> QueryResult<Self> {
        // One pooled client for all index calls
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .pool_max_idle_per_host(5)
            .build()
            .map_err(|e| QueryError::Config(format!("cannot build index client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn collection_url(&self, collection: &str, op: &str) -> String {
        format!("{}/v1/collections/{}/{}", self.base_url, collection, op)
    }
}

#[async_trait]
impl VectorIndex for HttpVectorIndex {
    async fn search(
        &self,
        collection: &str,
        vector: &[f32],
        limit: usize,
    ) -> QueryResult<Vec<SearchHit>> {
        let request = SearchRequest {
            vector,
            limit,
            metric: "cosine",
        };

        let response = self
            .client
            .post(self.collection_url(collection, "search"))
            .json(&request)
            .send()
            .await
            .map_err(|e| QueryError::search(collection, e))?;

        if !response.status().is_success() {
            return Err(QueryError::search(
                collection,
                format!("index returned status {}", response.status()),
            ));
        }

        let body: SearchResponse = response
            .json()
            .await
            .map_err(|e| QueryError::search(collection, e))?;

        Ok(body.hits)
    }

    async fn get_offsets(&self, collection: &str, ids: &[i64]) -> QueryResult<Vec<OffsetEntry>> {
        let request = GetRequest {
            ids,
            fields: &["offset"],
        };

        let response = self
            .client
            .post(self.collection_url(collection, "get"))
            .json(&request)
            .send()
            .await
            .map_err(|e| QueryError::lookup(collection, e))?;

        if !response.status().is_success() {
            return Err(QueryError::lookup(
                collection,
                format!("index returned status {}", response.status()),
            ));
        }

        let body: GetResponse = response
            .json()
            .await
            .map_err(|e| QueryError::lookup(collection, e))?;

        Ok(body.entries)
    }

    async fn frame_count(&self, collection: &str) -> QueryResult<i64> {
        let response = self
            .client
            .get(self.collection_url(collection, "stats"))
            .send()
            .await
            .map_err(|e| QueryError::lookup(collection, e))?;

        if !response.status().is_success() {
            return Err(QueryError::lookup(
                collection,
                format!("index returned status {}", response.status()),
            ));
        }

        let body: StatsResponse = response
            .json()
            .await
            .map_err(|e| QueryError::lookup(collection, e))?;

        Ok(body.num_entities)
    }
}
