//! fragseek CLI
//!
//! Runs one query: embed the given image, rank candidate streams, and export
//! the similar fragments, then writes the query report to the log directory.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use fragseek::services::embedding::ClipEmbedder;
use fragseek::services::index::HttpVectorIndex;
use fragseek::services::probe::FrameProbe;
use fragseek::services::retrieval::CommandExporter;
use fragseek::{QueryConfig, QueryPipeline, QueryResult};

/// Find and retrieve video fragments similar to a query image
#[derive(Parser)]
#[command(name = "fragseek")]
#[command(version)]
#[command(about = "Content-based video fragment search and retrieval")]
struct Cli {
    /// Query image
    #[arg(long)]
    image: PathBuf,

    /// Optional JSON config file; CLI flags override its fields
    #[arg(long)]
    config: Option<PathBuf>,

    /// Base URL of the vector index service
    #[arg(long)]
    index_url: Option<String>,

    /// Number of candidate streams to keep after the global search
    #[arg(long)]
    top_k: Option<usize>,

    /// Per-stream search limit
    #[arg(long)]
    local_k: Option<usize>,

    /// Frames of padding around each qualifying hit
    #[arg(long)]
    padding: Option<i64>,

    /// Minimum cosine similarity for a frame hit to qualify
    #[arg(long)]
    threshold: Option<f32>,

    /// Directory receiving exported fragments
    #[arg(long)]
    result_dir: Option<PathBuf>,

    /// Directory receiving query reports
    #[arg(long)]
    log_dir: Option<PathBuf>,

    /// Ceiling on concurrent fragment exports
    #[arg(long)]
    export_concurrency: Option<usize>,
}

impl Cli {
    fn resolve_config(&self) -> QueryResult<QueryConfig> {
        let mut config = match &self.config {
            Some(path) => QueryConfig::load(path)?,
            None => QueryConfig::default(),
        };

        if let Some(url) = &self.index_url {
            config.index_url = url.clone();
        }
        if let Some(top_k) = self.top_k {
            config.top_k = top_k;
        }
        if let Some(local_k) = self.local_k {
            config.local_k = local_k;
        }
        if let Some(padding) = self.padding {
            config.padding = padding;
        }
        if let Some(threshold) = self.threshold {
            config.similarity_threshold = threshold;
        }
        if let Some(dir) = &self.result_dir {
            config.result_dir = dir.display().to_string();
        }
        if let Some(dir) = &self.log_dir {
            config.log_dir = dir.display().to_string();
        }
        if let Some(width) = self.export_concurrency {
            config.export_concurrency = Some(width);
        }

        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        tracing::error!(error = %e, "query failed");
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fragseek::QueryError;

    fn parse(args: &[&str]) -> Cli {
        let mut full = vec!["fragseek", "--image", "query.png"];
        full.extend_from_slice(args);
        Cli::parse_from(full)
    }

    #[test]
    fn no_flags_resolves_to_defaults() {
        let config = parse(&[]).resolve_config().unwrap();
        let defaults = QueryConfig::default();
        assert_eq!(config.index_url, defaults.index_url);
        assert_eq!(config.top_k, defaults.top_k);
        assert_eq!(config.local_k, defaults.local_k);
        assert_eq!(config.padding, defaults.padding);
        assert_eq!(config.export_concurrency, defaults.export_concurrency);
    }

    #[test]
    fn each_flag_overrides_its_config_field() {
        let config = parse(&[
            "--index-url",
            "http://index:9000",
            "--top-k",
            "3",
            "--local-k",
            "50",
            "--padding",
            "4",
            "--threshold",
            "0.75",
            "--result-dir",
            "out",
            "--log-dir",
            "runlogs",
            "--export-concurrency",
            "8",
        ])
        .resolve_config()
        .unwrap();

        assert_eq!(config.index_url, "http://index:9000");
        assert_eq!(config.top_k, 3);
        assert_eq!(config.local_k, 50);
        assert_eq!(config.padding, 4);
        assert_eq!(config.similarity_threshold, 0.75);
        assert_eq!(config.result_dir, "out");
        assert_eq!(config.log_dir, "runlogs");
        assert_eq!(config.export_concurrency, Some(8));
    }

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"top_k": 7, "local_k": 200}"#).unwrap();

        let config = parse(&[
            "--config",
            &path.display().to_string(),
            "--top-k",
            "2",
        ])
        .resolve_config()
        .unwrap();

        assert_eq!(config.top_k, 2);
        assert_eq!(config.local_k, 200);
    }

    #[test]
    fn invalid_override_is_rejected() {
        let result = parse(&["--top-k", "0"]).resolve_config();
        assert!(matches!(result, Err(QueryError::Config(_))));
    }
}

async fn run(cli: Cli) -> QueryResult<()> {
    let config = cli.resolve_config()?;
    fs::create_dir_all(&config.result_dir)?;
    fs::create_dir_all(&config.log_dir)?;

    tracing::info!(index_url = %config.index_url, "initializing embedding model");
    let embedder = Arc::new(ClipEmbedder::new(&config.image_embedding_model)?);
    let index = Arc::new(HttpVectorIndex::new(
        &config.index_url,
        Duration::from_secs(config.request_timeout_secs),
    )?);
    let exporter = Arc::new(CommandExporter::new(&config.export_program));
    let probe = config
        .probe_program
        .as_deref()
        .map(|program| Arc::new(FrameProbe::new(program)));

    let log_dir = PathBuf::from(&config.log_dir);
    let pipeline = QueryPipeline::new(embedder, index, exporter, probe, config);

    let report = pipeline.run(&cli.image).await?;
    let report_path = fragseek::report::write_report(&log_dir, &report)?;

    tracing::info!(
        candidates = report.candidates.len(),
        total_bytes = report.total_bytes_retrieved,
        report = %report_path.display(),
        "query complete"
    );

    Ok(())
}
