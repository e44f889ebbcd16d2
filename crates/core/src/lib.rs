//! Core retrieval engine for local code question answering: scanning, structural/regex symbol
//! extraction, durable per-project storage, incremental indexing, hybrid BM25 + symbol + dense
//! retrieval, a debounced filesystem watcher, and GitHub clone-and-index.
//!
//! This crate has no async runtime and installs no logging subscriber of its own — both are the
//! hosting binary's responsibility (see `server`).

pub mod clone;
pub mod config;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod indexer;
pub mod retriever;
pub mod scanner;
pub mod store;
pub mod types;
pub mod watcher;

pub use config::Config;
pub use error::{QaError, Result};
pub use indexer::{Indexer, UpdateReport};
pub use retriever::{retrieve_context, AnswerModel, Confidence, DenseSearch, NoAnswerModel, RetrievalResult};
pub use store::Store;
pub use types::ProjectIndex;
pub use watcher::WatcherRegistry;
