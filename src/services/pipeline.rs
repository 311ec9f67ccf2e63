//! Query pipeline orchestration
//!
//! Sequences one query end to end: embed the query image, search the global
//! collection, rank candidate streams, then run one sub-pipeline per candidate
//! concurrently (local search → interval merge → offset resolution → fragment
//! retrieval). Every stage hands its timings and results back by value; only
//! the orchestrator assembles the final report, so no metrics state is shared
//! across tasks.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use chrono::Local;
use futures_util::future::join_all;

use crate::config::QueryConfig;
use crate::error::{QueryError, QueryResult};
use crate::report::{
    CandidateReport, CandidateStatus, FailureRecord, FragmentRecord, FrameCountRecord,
    QueryReport, RunParameters,
};
use crate::services::embedding::QueryEmbedder;
use crate::services::fragments::merge_intervals;
use crate::services::index::VectorIndex;
use crate::services::probe::FrameProbe;
use crate::services::ranker::rank_candidates;
use crate::services::resolver::resolve_offsets;
use crate::services::retrieval::{build_tasks, retrieve_fragments, FragmentExporter};

pub struct QueryPipeline {
    embedder: Arc<dyn QueryEmbedder>,
    index: Arc<dyn VectorIndex>,
    exporter: Arc<dyn FragmentExporter>,
    probe: Option<Arc<FrameProbe>>,
    config: QueryConfig,
}

impl QueryPipeline {
    pub fn new(
        embedder: Arc<dyn QueryEmbedder>,
        index: Arc<dyn VectorIndex>,
        exporter: Arc<dyn FragmentExporter>,
        probe: Option<Arc<FrameProbe>>,
        config: QueryConfig,
    ) -> Self {
        Self {
            embedder,
            index,
            exporter,
            probe,
            config,
        }
    }

    /// Run one query to completion.
    ///
    /// Only an embedding failure or a global-search failure aborts the query;
    /// every candidate- or fragment-scoped failure is recorded in the report
    /// and leaves sibling work untouched.
    pub async fn run(&self, image_path: &Path) -> QueryResult<QueryReport> {
        let started_at = Local::now().to_rfc3339();

        // 1. Embed the query image
        let clock = Instant::now();
        let embedding = Arc::new(self.embedder.embed_image(image_path).await?);
        let embed_ms = clock.elapsed().as_millis() as u64;
        tracing::debug!(embed_ms, dims = embedding.len(), "query image embedded");

        // 2. Global search: per-frame hits across all streams, oversampled so
        // the per-stream cut still has enough distinct streams
        let clock = Instant::now();
        let limit = self.config.top_k * self.config.search_limit_factor;
        let global_hits = self
            .index
            .search(&self.config.global_collection, &embedding, limit)
            .await?;
        let global_search_ms = clock.elapsed().as_millis() as u64;

        // 3. Rank
        let candidates = rank_candidates(&global_hits, self.config.top_k);
        tracing::info!(
            global_search_ms,
            candidates = ?candidates,
            "candidate streams ranked"
        );

        // 4. One concurrent sub-pipeline per candidate
        let result_dir = PathBuf::from(&self.config.result_dir);
        let handles: Vec<_> = candidates
            .iter()
            .map(|stream_id| {
                let index = self.index.clone();
                let exporter = self.exporter.clone();
                let embedding = embedding.clone();
                let config = self.config.clone();
                let result_dir = result_dir.clone();
                let stream_id = stream_id.clone();
                tokio::spawn(async move {
                    run_candidate(index, exporter, embedding, config, result_dir, stream_id).await
                })
            })
            .collect();

        let mut candidate_runs = Vec::with_capacity(handles.len());
        for (stream_id, joined) in candidates.iter().zip(join_all(handles).await) {
            match joined {
                Ok(report) => candidate_runs.push(report),
                Err(join_err) => candidate_runs.push(CandidateReport::failed(
                    stream_id.clone(),
                    0,
                    format!("candidate task aborted: {}", join_err),
                )),
            }
        }

        // 5. Aggregate
        let total_bytes_retrieved = candidate_runs.iter().map(|run| run.bytes_retrieved).sum();
        let frame_counts = self.probe_fragments(&candidate_runs, &result_dir).await;

        Ok(QueryReport {
            image_path: image_path.display().to_string(),
            started_at,
            embed_ms,
            global_search_ms,
            candidates,
            candidate_runs,
            total_bytes_retrieved,
            frame_counts,
            config: RunParameters {
                top_k: self.config.top_k,
                local_k: self.config.local_k,
                padding: self.config.padding,
                similarity_threshold: self.config.similarity_threshold,
            },
        })
    }

    async fn probe_fragments(
        &self,
        candidate_runs: &[CandidateReport],
        result_dir: &Path,
    ) -> Vec<FrameCountRecord> {
        let Some(probe) = &self.probe else {
            return Vec::new();
        };

        let mut records = Vec::new();
        for run in candidate_runs {
            for fragment in &run.fragments {
                match probe.count_frames(&result_dir.join(&fragment.filename)).await {
                    Ok(frame_count) => records.push(FrameCountRecord {
                        filename: fragment.filename.clone(),
                        frame_count: Some(frame_count),
                        error: None,
                    }),
                    Err(e) => {
                        tracing::warn!(filename = %fragment.filename, error = %e, "frame probe failed");
                        records.push(FrameCountRecord {
                            filename: fragment.filename.clone(),
                            frame_count: None,
                            error: Some(e.to_string()),
                        });
                    }
                }
            }
        }
        records
    }
}

/// One candidate's sub-pipeline: local search → merge → resolve → retrieve.
///
/// Never returns an error: failures become a `Failed` report, a candidate
/// whose frames all miss the threshold becomes `Empty`.
async fn run_candidate(
    index: Arc<dyn VectorIndex>,
    exporter: Arc<dyn FragmentExporter>,
    embedding: Arc<Vec<f32>>,
    config: QueryConfig,
    result_dir: PathBuf,
    stream_id: String,
) -> CandidateReport {
    let clock = Instant::now();

    let search_result: QueryResult<_> = async {
        let hits = index.search(&stream_id, &embedding, config.local_k).await?;

        let frame_hits: Vec<(i64, f32)> =
            hits.iter().map(|hit| (hit.frame, hit.score)).collect();
        let intervals =
            merge_intervals(&frame_hits, config.similarity_threshold, config.padding);
        if intervals.is_empty() {
            return Ok(None);
        }

        let max_valid_index = index.frame_count(&stream_id).await? - 1;
        if max_valid_index < 0 {
            return Err(QueryError::lookup(&stream_id, "collection has no entries"));
        }

        let offsets = resolve_offsets(index.as_ref(), &stream_id, &intervals, max_valid_index)
            .await?;
        Ok(Some((intervals, offsets)))
    }
    .await;

    let search_ms = clock.elapsed().as_millis() as u64;

    let (intervals, offsets) = match search_result {
        Ok(Some(resolved)) => resolved,
        Ok(None) => {
            tracing::info!(stream_id = %stream_id, "no frames passed the similarity threshold");
            return CandidateReport {
                stream_id,
                status: CandidateStatus::Empty,
                error: None,
                search_ms,
                export_ms: 0,
                fragments: Vec::new(),
                failures: Vec::new(),
                bytes_retrieved: 0,
            };
        }
        Err(e) => {
            tracing::error!(stream_id = %stream_id, error = %e, "candidate dropped");
            return CandidateReport::failed(stream_id, search_ms, e.to_string());
        }
    };

    tracing::debug!(
        stream_id = %stream_id,
        intervals = intervals.len(),
        search_ms,
        "exporting fragments"
    );

    let clock = Instant::now();
    let tasks = build_tasks(&stream_id, &intervals, &offsets, &result_dir);
    let outcome = retrieve_fragments(exporter, tasks, config.export_concurrency).await;
    let export_ms = clock.elapsed().as_millis() as u64;

    CandidateReport {
        stream_id,
        status: CandidateStatus::Ok,
        error: None,
        search_ms,
        export_ms,
        fragments: outcome
            .files
            .into_iter()
            .map(|file| FragmentRecord {
                filename: file.filename,
                size_bytes: file.size_bytes,
            })
            .collect(),
        failures: outcome
            .failures
            .into_iter()
            .map(|failure| FailureRecord {
                stream_id: failure.stream_id,
                interval: failure.interval,
                error: failure.message,
            })
            .collect(),
        bytes_retrieved: outcome.total_bytes,
    }
}
