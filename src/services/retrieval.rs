//! Fragment retrieval worker pool
//!
//! One spawned task per fragment export, optionally gated by a semaphore when
//! a concurrency ceiling is configured. A failed export is collected with its
//! task context and never cancels sibling exports; the pool returns only after
//! every submitted task has resolved.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::process::Command;
use tokio::sync::Semaphore;

use crate::error::{QueryError, QueryResult};
use crate::services::fragments::Interval;
use crate::services::resolver::OffsetRange;

/// Immutable unit of retrieval work
#[derive(Debug, Clone)]
pub struct FragmentTask {
    pub stream_id: String,
    pub interval: Interval,
    pub offsets: OffsetRange,
    pub dest: PathBuf,
}

/// Successfully exported fragment
#[derive(Debug, Clone)]
pub struct FragmentFile {
    pub filename: String,
    pub size_bytes: u64,
}

/// Failed export, attributable back to its task
#[derive(Debug, Clone)]
pub struct FragmentFailure {
    pub stream_id: String,
    pub interval: Interval,
    pub message: String,
}

/// Aggregate result of one retrieval batch. Ordering of `files` and
/// `failures` follows task completion and is not a contract.
#[derive(Debug, Default)]
pub struct RetrievalOutcome {
    pub files: Vec<FragmentFile>,
    pub failures: Vec<FragmentFailure>,
    pub total_bytes: u64,
}

#[async_trait]
pub trait FragmentExporter: Send + Sync {
    /// Export one fragment to `task.dest`. On success the artifact exists at
    /// the destination with a determinable size.
    async fn export(&self, task: &FragmentTask) -> QueryResult<()>;
}

/// Exporter invoking the external bulk-storage export tool as
/// `<program> <stream> <dest> <start_offset> <end_offset>`
pub struct CommandExporter {
    program: String,
}

impl CommandExporter {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
        }
    }
}

#[async_trait]
impl FragmentExporter for CommandExporter {
    async fn export(&self, task: &FragmentTask) -> QueryResult<()> {
        let output = Command::new(&self.program)
            .arg(&task.stream_id)
            .arg(&task.dest)
            .arg(task.offsets.start.to_string())
            .arg(task.offsets.end.to_string())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| QueryError::Export {
                stream_id: task.stream_id.clone(),
                start: task.interval.start,
                end: task.interval.end,
                message: format!("cannot spawn {}: {}", self.program, e),
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(QueryError::Export {
                stream_id: task.stream_id.clone(),
                start: task.interval.start,
                end: task.interval.end,
                message: format!("exit status {}: {}", output.status, stderr.trim()),
            });
        }

        Ok(())
    }
}

/// Build the task list for one stream's resolved intervals
pub fn build_tasks(
    stream_id: &str,
    intervals: &[Interval],
    offsets: &[OffsetRange],
    result_dir: &Path,
) -> Vec<FragmentTask> {
    intervals
        .iter()
        .zip(offsets.iter())
        .enumerate()
        .map(|(idx, (interval, range))| {
            let filename = format!(
                "{}_{}_{}_{}.h264",
                stream_id, idx, range.start, range.end
            );
            FragmentTask {
                stream_id: stream_id.to_string(),
                interval: *interval,
                offsets: *range,
                dest: result_dir.join(filename),
            }
        })
        .collect()
}

/// Run every task to completion, isolating per-task failures.
///
/// `width_cap` bounds the number of in-flight exports; `None` leaves the
/// fan-out at one worker per task.
pub async fn retrieve_fragments(
    exporter: Arc<dyn FragmentExporter>,
    tasks: Vec<FragmentTask>,
    width_cap: Option<usize>,
) -> RetrievalOutcome {
    let permits = width_cap.map(|width| Arc::new(Semaphore::new(width)));

    let (contexts, handles): (Vec<FragmentTask>, Vec<_>) = tasks
        .into_iter()
        .map(|task| {
            let exporter = exporter.clone();
            let permits = permits.clone();
            let context = task.clone();
            let handle = tokio::spawn(async move {
                // The semaphore is never closed, so acquire only fails if the
                // pool is torn down mid-flight; proceeding without a permit is
                // harmless at that point.
                let _permit = match &permits {
                    Some(semaphore) => semaphore.clone().acquire_owned().await.ok(),
                    None => None,
                };
                export_one(exporter.as_ref(), &task).await
            });
            (context, handle)
        })
        .unzip();

    let mut outcome = RetrievalOutcome::default();
    let results = join_all(handles).await;

    for (task, joined) in contexts.into_iter().zip(results) {
        match joined {
            Ok(Ok(file)) => {
                outcome.total_bytes += file.size_bytes;
                outcome.files.push(file);
            }
            Ok(Err(failure)) => {
                tracing::error!(
                    stream_id = %failure.stream_id,
                    start = failure.interval.start,
                    end = failure.interval.end,
                    error = %failure.message,
                    "fragment export failed"
                );
                outcome.failures.push(failure);
            }
            Err(join_err) => {
                outcome.failures.push(FragmentFailure {
                    stream_id: task.stream_id,
                    interval: task.interval,
                    message: format!("export task aborted: {}", join_err),
                });
            }
        }
    }

    outcome
}

async fn export_one(
    exporter: &dyn FragmentExporter,
    task: &FragmentTask,
) -> Result<FragmentFile, FragmentFailure> {
    let failure = |message: String| FragmentFailure {
        stream_id: task.stream_id.clone(),
        interval: task.interval,
        message,
    };

    exporter
        .export(task)
        .await
        .map_err(|e| failure(e.to_string()))?;

    let metadata = tokio::fs::metadata(&task.dest)
        .await
        .map_err(|e| failure(format!("exported artifact missing: {}", e)))?;

    let filename = task
        .dest
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| task.dest.display().to_string());

    Ok(FragmentFile {
        filename,
        size_bytes: metadata.len(),
    })
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    /// Writes `size` bytes to the destination, or fails for selected streams
    struct StubExporter {
        size: usize,
        fail_intervals: Vec<Interval>,
        calls: AtomicUsize,
    }

    impl StubExporter {
        fn new(size: usize) -> Self {
            Self {
                size,
                fail_intervals: Vec::new(),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl FragmentExporter for StubExporter {
        async fn export(&self, task: &FragmentTask) -> QueryResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_intervals.contains(&task.interval) {
                return Err(QueryError::Export {
                    stream_id: task.stream_id.clone(),
                    start: task.interval.start,
                    end: task.interval.end,
                    message: "exit status 1".to_string(),
                });
            }
            std::fs::write(&task.dest, vec![0u8; self.size]).unwrap();
            Ok(())
        }
    }

    fn task(stream: &str, start: i64, dir: &Path) -> FragmentTask {
        FragmentTask {
            stream_id: stream.to_string(),
            interval: Interval { start, end: start + 10 },
            offsets: OffsetRange {
                start: start as u64 * 1000,
                end: (start as u64 + 10) * 1000,
            },
            dest: dir.join(format!("{}_{}.h264", stream, start)),
        }
    }

    #[tokio::test]
    async fn sums_bytes_of_successful_exports_only() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = StubExporter::new(4096);
        exporter.fail_intervals.push(Interval { start: 20, end: 30 });
        let exporter = Arc::new(exporter);

        let tasks = vec![
            task("a", 0, dir.path()),
            task("a", 20, dir.path()),
            task("b", 40, dir.path()),
        ];

        let outcome = retrieve_fragments(exporter.clone(), tasks, None).await;

        assert_eq!(outcome.files.len(), 2);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.total_bytes, 2 * 4096);
        // Every submitted task resolved
        assert_eq!(exporter.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn failure_is_attributable_to_its_task() {
        let dir = tempfile::tempdir().unwrap();
        let mut exporter = StubExporter::new(16);
        exporter.fail_intervals.push(Interval { start: 0, end: 10 });

        let tasks = vec![task("stream-x", 0, dir.path())];
        let outcome = retrieve_fragments(Arc::new(exporter), tasks, None).await;

        assert!(outcome.files.is_empty());
        let failure = &outcome.failures[0];
        assert_eq!(failure.stream_id, "stream-x");
        assert_eq!(failure.interval, Interval { start: 0, end: 10 });
        assert_eq!(outcome.total_bytes, 0);
    }

    #[tokio::test]
    async fn width_cap_still_completes_every_task() {
        let dir = tempfile::tempdir().unwrap();
        let exporter = Arc::new(StubExporter::new(8));

        let tasks: Vec<FragmentTask> = (0..6i64).map(|i| task("a", i * 100, dir.path())).collect();
        let outcome = retrieve_fragments(exporter.clone(), tasks, Some(2)).await;

        assert_eq!(outcome.files.len(), 6);
        assert_eq!(outcome.total_bytes, 6 * 8);
        assert_eq!(exporter.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn empty_task_list_returns_empty_outcome() {
        let exporter = Arc::new(StubExporter::new(8));
        let outcome = retrieve_fragments(exporter, Vec::new(), None).await;
        assert!(outcome.files.is_empty());
        assert!(outcome.failures.is_empty());
        assert_eq!(outcome.total_bytes, 0);
    }

    #[test]
    fn build_tasks_pairs_intervals_with_offsets_in_order() {
        let intervals = [
            Interval { start: 0, end: 10 },
            Interval { start: 95, end: 110 },
        ];
        let offsets = [
            OffsetRange { start: 0, end: 10_000 },
            OffsetRange { start: 95_000, end: 110_000 },
        ];

        let tasks = build_tasks("cam-1", &intervals, &offsets, Path::new("/tmp/out"));

        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0].dest, Path::new("/tmp/out/cam-1_0_0_10000.h264"));
        assert_eq!(tasks[1].interval, intervals[1]);
        assert_eq!(tasks[1].offsets, offsets[1]);
    }
}
