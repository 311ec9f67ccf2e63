//! Run configuration
//!
//! Loaded from an optional JSON file, with defaults matching the reference
//! deployment. CLI flags override individual fields after loading.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{QueryError, QueryResult};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    /// Base URL of the vector index service
    pub index_url: String,
    /// Collection holding one entry per indexed frame across all streams,
    /// used to shortlist candidate streams
    pub global_collection: String,
    /// Number of candidate streams kept after the global search
    pub top_k: usize,
    /// Per-stream search limit for the local (per-frame) search
    pub local_k: usize,
    /// Frames added on both sides of a qualifying hit before merging
    pub padding: i64,
    /// Minimum cosine similarity for a frame hit to qualify
    pub similarity_threshold: f32,
    /// Vision model used to embed the query image
    pub image_embedding_model: String,
    /// Global search limit multiplier: the global collection is searched with
    /// `top_k * search_limit_factor` so the per-stream cut still has enough
    /// distinct streams after duplicate suppression
    pub search_limit_factor: usize,
    /// Program invoked as `<program> <stream> <dest> <start> <end>` to export
    /// one fragment from bulk storage
    pub export_program: String,
    /// Optional program used to count frames in exported fragments
    pub probe_program: Option<String>,
    /// Directory receiving exported fragments
    pub result_dir: String,
    /// Directory receiving one report JSON per query
    pub log_dir: String,
    /// Optional ceiling on concurrent fragment exports; unset means one
    /// in-flight export per fragment task
    pub export_concurrency: Option<usize>,
    /// Request timeout for index service calls, in seconds
    pub request_timeout_secs: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            index_url: "http://127.0.0.1:19530".to_string(),
            global_collection: "global".to_string(),
            top_k: 5,
            local_k: 100,
            padding: 10,
            similarity_threshold: 0.9,
            image_embedding_model: "Qdrant/clip-ViT-B-32-vision".to_string(),
            search_limit_factor: 100,
            export_program: "export".to_string(),
            probe_program: None,
            result_dir: "results".to_string(),
            log_dir: "logs".to_string(),
            export_concurrency: None,
            request_timeout_secs: 30,
        }
    }
}

impl QueryConfig {
    /// Load configuration from a JSON file
    pub fn load(path: &Path) -> QueryResult<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|e| QueryError::Config(format!("cannot read {}: {}", path.display(), e)))?;
        let config: QueryConfig = serde_json::from_str(&raw)
            .map_err(|e| QueryError::Config(format!("cannot parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> QueryResult<()> {
        if self.top_k == 0 {
            return Err(QueryError::Config("top_k must be positive".to_string()));
        }
        if self.local_k == 0 {
            return Err(QueryError::Config("local_k must be positive".to_string()));
        }
        if self.padding < 0 {
            return Err(QueryError::Config("padding must be non-negative".to_string()));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(QueryError::Config(
                "similarity_threshold must be in [0, 1]".to_string(),
            ));
        }
        if self.export_concurrency == Some(0) {
            return Err(QueryError::Config(
                "export_concurrency must be positive when set".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = QueryConfig::default();
        assert_eq!(config.top_k, 5);
        assert_eq!(config.local_k, 100);
        assert_eq!(config.padding, 10);
        assert_eq!(config.similarity_threshold, 0.9);
        assert!(config.export_concurrency.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn load_overrides_defaults_and_keeps_the_rest() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"top_k": 3, "similarity_threshold": 0.8}"#).unwrap();

        let config = QueryConfig::load(&path).unwrap();
        assert_eq!(config.top_k, 3);
        assert_eq!(config.similarity_threshold, 0.8);
        assert_eq!(config.local_k, 100);
    }

    #[test]
    fn load_rejects_invalid_values() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"top_k": 0}"#).unwrap();

        assert!(matches!(
            QueryConfig::load(&path),
            Err(QueryError::Config(_))
        ));
    }
}
