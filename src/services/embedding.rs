//! Query image embedding
//!
//! Wraps a CLIP vision model so the rest of the pipeline only sees
//! "image path in, fixed-length vector out".

use std::path::Path;

use async_trait::async_trait;
use fastembed::{ImageEmbedding, ImageEmbeddingModel, ImageInitOptions};
use tokio::sync::Mutex;

use crate::error::{QueryError, QueryResult};

#[async_trait]
pub trait QueryEmbedder: Send + Sync {
    /// Embed one query image into a fixed-length vector
    async fn embed_image(&self, path: &Path) -> QueryResult<Vec<f32>>;
}

/// fastembed-backed CLIP embedder
pub struct ClipEmbedder {
    model: Mutex<ImageEmbedding>,
}

impl ClipEmbedder {
    pub fn new(model_name: &str) -> QueryResult<Self> {
        let image_model: ImageEmbeddingModel = model_name
            .parse::<ImageEmbeddingModel>()
            .map_err(|e| QueryError::Embedding(e.to_string()))?;

        let model = ImageEmbedding::try_new(ImageInitOptions::new(image_model))
            .map_err(|e| QueryError::Embedding(e.to_string()))?;

        Ok(Self {
            model: Mutex::new(model),
        })
    }
}

#[async_trait]
impl QueryEmbedder for ClipEmbedder {
    async fn embed_image(&self, path: &Path) -> QueryResult<Vec<f32>> {
        // Reject unreadable or unsupported images before handing the path to
        // the model, which reports such failures less precisely.
        image::open(path)
            .map_err(|e| QueryError::Embedding(format!("{}: {}", path.display(), e)))?;

        let vectors = {
            let mut model = self.model.lock().await;
            model.embed(vec![path], None)
        }
        .map_err(|e| QueryError::Embedding(e.to_string()))?;

        vectors
            .into_iter()
            .next()
            .ok_or_else(|| QueryError::Embedding("image embedding returned no vectors".to_string()))
    }
}
