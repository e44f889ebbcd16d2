//! Optional dense embeddings backend, per SPEC_FULL.md §4.7.
//!
//! Builds on the `fastembed`/`ort` dependency pair the teacher's own `crates/core/Cargo.toml`
//! declares under its `semantic` feature but never calls into (the teacher's actual semantic
//! search, in its `server/src/embeddings.rs`, is a hand-rolled `candle`+`hf_hub` BERT pipeline
//! instead). This module is the fastembed-backed implementation that Cargo.toml's declared
//! dependency always implied: one `TextEmbedding` model, lazily constructed behind a one-shot
//! latch (§9 "Global model handle"), feeding the `DenseSearch` capability interface the retriever
//! consumes.

use std::sync::OnceLock;

use tracing::{debug, warn};

#[cfg(feature = "semantic")]
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use crate::config::Config;
use crate::error::QaError;
use crate::retriever::DenseSearch;
use crate::store::{EmbeddingRow, Store};
use crate::types::ProjectIndex;

/// Longest content slice folded into a chunk's embedding surface.
const SURFACE_CONTENT_CHARS: usize = 500;

/// Build the textual surface embedded for one chunk: `"<rel_path> <symbol?>\n<first 500 chars>"`.
fn chunk_surface(rel_path: &str, symbol: Option<&str>, content: &str) -> String {
    let head: String = content.chars().take(SURFACE_CONTENT_CHARS).collect();
    match symbol {
        Some(sym) => format!("{rel_path} {sym}\n{head}"),
        None => format!("{rel_path}\n{head}"),
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(feature = "semantic")]
fn resolve_model(name: &str) -> EmbeddingModel {
    match name {
        "minilm" => EmbeddingModel::AllMiniLML6V2,
        "codebert" => EmbeddingModel::BGESmallENV15,
        "starencoder" => EmbeddingModel::BGEBaseENV15,
        _ => EmbeddingModel::AllMiniLML6V2,
    }
}

#[cfg(feature = "semantic")]
struct LoadedModel {
    model: std::sync::Mutex<TextEmbedding>,
}

#[cfg(feature = "semantic")]
static MODEL: OnceLock<Option<LoadedModel>> = OnceLock::new();

#[cfg(feature = "semantic")]
fn loaded_model(embedding_model: &str) -> Option<&'static LoadedModel> {
    MODEL
        .get_or_init(|| {
            let model_name = resolve_model(embedding_model);
            match TextEmbedding::try_new(InitOptions::new(model_name).with_show_download_progress(false)) {
                Ok(model) => Some(LoadedModel { model: std::sync::Mutex::new(model) }),
                Err(e) => {
                    warn!(error = %e, "failed to initialize embedding model, dense search disabled");
                    None
                }
            }
        })
        .as_ref()
}

#[cfg(not(feature = "semantic"))]
fn loaded_model(_embedding_model: &str) -> Option<&'static ()> {
    None
}

fn embed_batch(embedding_model: &str, texts: Vec<String>) -> Option<Vec<Vec<f32>>> {
    #[cfg(feature = "semantic")]
    {
        let handle = loaded_model(embedding_model)?;
        let model = handle.model.lock().unwrap();
        match model.embed(texts, None) {
            Ok(mut vectors) => {
                for v in vectors.iter_mut() {
                    l2_normalize(v);
                }
                Some(vectors)
            }
            Err(e) => {
                warn!(error = %e, "embedding batch failed");
                None
            }
        }
    }
    #[cfg(not(feature = "semantic"))]
    {
        let _ = (embedding_model, texts, loaded_model(embedding_model));
        None
    }
}

/// Build and persist embeddings for every chunk in `index`. Never fails the caller: any failure
/// in the embedding path is logged and leaves the project without dense search, per §4.7's
/// graceful-degradation rule.
pub fn build_and_store_embeddings(index: &ProjectIndex, config: &Config, store: &Store) {
    if !config.embeddings_enabled {
        return;
    }

    let mut surfaces = Vec::new();
    let mut coordinates: Vec<(String, u32)> = Vec::new();
    for (rel_path, entry) in &index.file_index {
        for chunk in &entry.chunks {
            surfaces.push(chunk_surface(rel_path, chunk.symbol.as_deref(), &chunk.content));
            coordinates.push((rel_path.clone(), chunk.chunk_index));
        }
    }
    if surfaces.is_empty() {
        return;
    }

    let Some(vectors) = embed_batch(&config.embedding_model, surfaces) else {
        debug!(project = %index.project_id, "embeddings unavailable, skipping dense index build");
        return;
    };

    let rows: Vec<EmbeddingRow> = coordinates
        .into_iter()
        .zip(vectors)
        .map(|((rel_path, chunk_index), vector)| EmbeddingRow { rel_path, chunk_index, vector })
        .collect();

    if let Err(e) = store.save_embeddings(&index.project_id, &rows) {
        warn!(project = %index.project_id, error = %e, "failed to persist embeddings");
    }
}

/// `DenseSearch` implementation backed by a lazily-initialized `fastembed` model and the
/// project's persisted chunk vectors.
pub struct FastEmbedSearch<'a> {
    config: &'a Config,
    store: &'a Store,
}

impl<'a> FastEmbedSearch<'a> {
    pub fn new(config: &'a Config, store: &'a Store) -> Self {
        FastEmbedSearch { config, store }
    }
}

impl<'a> DenseSearch for FastEmbedSearch<'a> {
    fn available(&self) -> bool {
        self.config.embeddings_enabled && loaded_model(&self.config.embedding_model).is_some()
    }

    fn search(&self, query: &str, project_id: &str, top_k: usize) -> Vec<(String, u32, f32)> {
        if !self.available() {
            return Vec::new();
        }
        let Some(mut vectors) = embed_batch(&self.config.embedding_model, vec![query.to_string()]) else {
            return Vec::new();
        };
        let Some(query_vector) = vectors.pop() else { return Vec::new() };

        let rows = match self.store.load_embeddings(project_id) {
            Ok(rows) => rows,
            Err(e) => {
                warn!(project = project_id, error = %e, "failed to load embeddings, dense search skipped");
                return Vec::new();
            }
        };

        let mut scored: Vec<(String, u32, f32)> = rows
            .into_iter()
            .map(|row| {
                let score = dot(&query_vector, &row.vector);
                (row.rel_path, row.chunk_index, score)
            })
            .collect();
        scored.sort_by(|a, b| b.2.partial_cmp(&a.2).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(top_k);
        scored
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// Used by callers that want to surface a structured error instead of silently degrading,
/// e.g. when a caller explicitly requested semantic search and it is unavailable.
pub fn unavailable_reason() -> QaError {
    QaError::EmbeddingUnavailable("no embedding backend compiled in".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_surface_includes_symbol_and_truncates_content() {
        let long = "x".repeat(600);
        let surface = chunk_surface("src/a.py", Some("foo"), &long);
        assert!(surface.starts_with("src/a.py foo\n"));
        assert_eq!(surface.len(), "src/a.py foo\n".len() + SURFACE_CONTENT_CHARS);
    }

    #[test]
    fn chunk_surface_without_symbol() {
        let surface = chunk_surface("src/a.py", None, "hello");
        assert_eq!(surface, "src/a.py\nhello");
    }

    #[test]
    fn l2_normalize_produces_unit_vector() {
        let mut v = vec![3.0_f32, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_untouched() {
        let mut v = vec![0.0_f32, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }

    #[test]
    fn dot_product_of_orthogonal_vectors_is_zero() {
        assert_eq!(dot(&[1.0, 0.0], &[0.0, 1.0]), 0.0);
    }

    #[test]
    fn dense_search_without_available_model_returns_empty() {
        let store_dir = tempfile::TempDir::new().unwrap();
        let mut config = Config::default();
        config.embeddings_enabled = false;
        let store = Store::new(store_dir.path().to_path_buf());
        let dense = FastEmbedSearch::new(&config, &store);
        assert!(!dense.available());
        assert!(dense.search("anything", "proj_x", 5).is_empty());
    }
}
