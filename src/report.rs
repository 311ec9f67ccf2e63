//! Per-query metrics record
//!
//! One flat JSON document per query, appended to the log directory as
//! `query_logs_<timestamp>.json`. The field set is stable so downstream
//! tooling can ingest it without schema negotiation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::Local;
use serde::Serialize;

use crate::error::QueryResult;
use crate::services::fragments::Interval;

/// Outcome of one candidate sub-pipeline.
///
/// `Empty` (no frame passed the similarity threshold) and `Failed` are
/// different outcomes and are never conflated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CandidateStatus {
    Ok,
    Empty,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct FragmentRecord {
    pub filename: String,
    pub size_bytes: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailureRecord {
    pub stream_id: String,
    pub interval: Interval,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct CandidateReport {
    pub stream_id: String,
    pub status: CandidateStatus,
    /// Set only for `Failed`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub search_ms: u64,
    pub export_ms: u64,
    pub fragments: Vec<FragmentRecord>,
    pub failures: Vec<FailureRecord>,
    pub bytes_retrieved: u64,
}

impl CandidateReport {
    pub fn failed(stream_id: String, search_ms: u64, error: String) -> Self {
        Self {
            stream_id,
            status: CandidateStatus::Failed,
            error: Some(error),
            search_ms,
            export_ms: 0,
            fragments: Vec::new(),
            failures: Vec::new(),
            bytes_retrieved: 0,
        }
    }
}

/// Frame count of one exported artifact. A failed probe keeps its record so
/// the report distinguishes "probe failed" from "not probed".
#[derive(Debug, Clone, Serialize)]
pub struct FrameCountRecord {
    pub filename: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frame_count: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Resolved configuration echoed into every report
#[derive(Debug, Clone, Serialize)]
pub struct RunParameters {
    pub top_k: usize,
    pub local_k: usize,
    pub padding: i64,
    pub similarity_threshold: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryReport {
    pub image_path: String,
    pub started_at: String,
    pub embed_ms: u64,
    pub global_search_ms: u64,
    pub candidates: Vec<String>,
    pub candidate_runs: Vec<CandidateReport>,
    pub total_bytes_retrieved: u64,
    pub frame_counts: Vec<FrameCountRecord>,
    pub config: RunParameters,
}

/// Write the report as a timestamped JSON file and return its path
pub fn write_report(log_dir: &Path, report: &QueryReport) -> QueryResult<PathBuf> {
    fs::create_dir_all(log_dir)?;

    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let path = log_dir.join(format!("query_logs_{}.json", timestamp));

    let body = serde_json::to_string_pretty(report)
        .map_err(|e| crate::error::QueryError::Config(format!("cannot serialize report: {}", e)))?;
    fs::write(&path, body)?;

    Ok(path)
}
