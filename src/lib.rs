//! fragseek: content-based video fragment search and retrieval.
//!
//! Embeds a query image, shortlists candidate streams in a global vector
//! collection, locates similar frames per stream, merges them into contiguous
//! intervals, resolves storage offsets, and exports only those byte ranges
//! from bulk storage. One JSON report per query.

pub mod config;
pub mod error;
pub mod report;
pub mod services;

pub use config::QueryConfig;
pub use error::{QueryError, QueryResult};
pub use report::QueryReport;
pub use services::pipeline::QueryPipeline;
