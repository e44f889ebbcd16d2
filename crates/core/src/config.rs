//! Tuning knobs for the indexer and retriever, loadable from a TOML file.
//!
//! Mirrors the two-stage pattern the server layers on top: a `Config` parsed from disk, then
//! CLI flags overriding individual fields before the config reaches the core.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Base directory holding `projects/`, `sessions.db`, and `repos/`.
    pub base_dir: Option<PathBuf>,

    /// Scanner: files above this size are skipped entirely.
    pub max_file_bytes: u64,
    /// Indexer: bytes read from a file before extraction (the 50 KB read cap).
    pub read_cap_bytes: usize,
    /// Binary sniff window for the null-byte check.
    pub binary_sniff_bytes: usize,

    /// Extractor: max lines per chunk after a symbol's start line.
    pub max_chunk_lines: usize,
    /// Extractor: keyword bag cardinality per file.
    pub keyword_top_n: usize,
    /// Retriever: top-n keywords extracted from the query itself.
    pub query_keyword_top_n: usize,

    /// Retriever: minimum total score for a file to be considered relevant.
    pub score_floor: f64,
    /// Retriever: number of files returned after ranking.
    pub top_files: usize,
    /// Retriever: flat boost applied when a query word exactly matches a symbol name.
    pub symbol_boost: f64,
    /// Retriever: dense-similarity threshold above which a chunk contributes to its file's score.
    pub dense_boost_threshold: f32,
    /// Retriever: multiplier applied to a chunk's dense similarity once past the threshold.
    pub dense_boost_scale: f64,
    /// Retriever: additive bias in the confidence normalizer's denominator (see SPEC_FULL.md §9).
    pub confidence_bias: f64,

    /// Retriever: character budget for the assembled context blob.
    pub context_char_budget: usize,

    /// Watcher: debounce quiet period before an incremental update fires.
    pub watch_debounce_ms: u64,

    /// Whether the embeddings capability is enabled at all (mirrors the `semantic` feature).
    pub embeddings_enabled: bool,
    /// Embedding model preset: `minilm`, `codebert`, `starencoder`, or a HuggingFace model id.
    pub embedding_model: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            base_dir: None,
            max_file_bytes: 1_000_000,
            read_cap_bytes: 50_000,
            binary_sniff_bytes: 8_000,
            max_chunk_lines: 60,
            keyword_top_n: 20,
            query_keyword_top_n: 10,
            score_floor: 0.5,
            top_files: 5,
            symbol_boost: 5.0,
            dense_boost_threshold: 0.3,
            dense_boost_scale: 3.0,
            confidence_bias: 5.0,
            context_char_budget: 24_000,
            watch_debounce_ms: 2_000,
            embeddings_enabled: true,
            embedding_model: "minilm".to_string(),
        }
    }
}

impl Config {
    pub fn from_toml_str(raw: &str) -> Result<Config, toml::de::Error> {
        toml::from_str(raw)
    }

    pub fn load(path: &std::path::Path) -> std::io::Result<Config> {
        let raw = std::fs::read_to_string(path)?;
        Config::from_toml_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))
    }

    /// Resolve the base directory, applying the `CODEBASE_QA_HOME` override and the
    /// `$HOME/.codebase-qa-agent` default.
    pub fn resolved_base_dir(&self) -> PathBuf {
        if let Some(dir) = &self.base_dir {
            return dir.clone();
        }
        if let Ok(env_dir) = std::env::var("CODEBASE_QA_HOME") {
            return PathBuf::from(env_dir);
        }
        dirs_home().join(".codebase-qa-agent")
    }
}

fn dirs_home() -> PathBuf {
    std::env::var_os("HOME").map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."))
}
