//! Core data model: project identity, file entries, chunks, symbols, sessions.
//!
//! These types are the in-memory shape the Store reconstructs on `load_index` and the Indexer
//! builds on a full or incremental scan. See SPEC_FULL.md §3 for the invariants they uphold.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Declaration kind for a `Symbol`, per SPEC_FULL.md §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Class,
    Interface,
    Type,
}

impl SymbolKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SymbolKind::Function => "function",
            SymbolKind::Class => "class",
            SymbolKind::Interface => "interface",
            SymbolKind::Type => "type",
        }
    }
}

impl std::str::FromStr for SymbolKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "function" => Ok(SymbolKind::Function),
            "class" => Ok(SymbolKind::Class),
            "interface" => Ok(SymbolKind::Interface),
            "type" => Ok(SymbolKind::Type),
            _ => Err(()),
        }
    }
}

/// A named declaration occurrence at a specific line in a specific file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Symbol {
    pub name: String,
    pub kind: SymbolKind,
    pub line: u32,
}

/// One occurrence of a symbol name, as stored in the symbol map (one name -> many locations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SymbolLocation {
    pub file: String,
    pub line: u32,
    pub kind: SymbolKind,
}

/// An atomic retrievable unit of code within a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chunk {
    pub chunk_index: u32,
    pub start_line: u32,
    pub end_line: u32,
    pub content: String,
    pub symbol: Option<String>,
}

/// Per-file metadata as produced by the scanner, before extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileMeta {
    pub relative_path: String,
    pub absolute_path: std::path::PathBuf,
    pub extension: String,
    pub size_bytes: u64,
    pub last_modified: f64,
}

/// A fully extracted file entry, as held in the in-memory index and persisted by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileEntry {
    pub extension: String,
    pub size_bytes: u64,
    pub last_modified: f64,
    pub keywords: Vec<String>,
    pub chunks: Vec<Chunk>,
    pub symbols: Vec<String>,
}

/// The complete in-memory index for one project, as reconstructed by `Store::load_index`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectIndex {
    pub project_root: String,
    pub project_id: String,
    pub slug: String,
    pub indexed_at: f64,
    pub file_index: BTreeMap<String, FileEntry>,
    pub keyword_map: BTreeMap<String, Vec<String>>,
    pub symbol_map: BTreeMap<String, Vec<SymbolLocation>>,
}

impl ProjectIndex {
    pub fn total_files(&self) -> usize {
        self.file_index.len()
    }
}

/// One turn in a session's append-only conversation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionTurn {
    pub turn_index: u32,
    pub question: String,
    pub answer: String,
    pub relevant_files: Vec<String>,
    pub created_at: f64,
}

/// Summary row as returned by `Store::list_projects`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectSummary {
    pub project_id: String,
    pub slug: String,
    pub project_root: String,
    pub indexed_at: f64,
    pub total_files: u32,
}

/// Lowercase basename of a root path, spaces replaced with hyphens.
pub fn slugify(root: &std::path::Path) -> String {
    let base = root.file_name().and_then(|n| n.to_str()).unwrap_or("project");
    base.to_lowercase().replace(' ', "-")
}

/// `<slug>_<hex12>` where hex12 is the first 12 hex digits of SHA-256 over the canonical root.
///
/// Deterministic across runs and collision-resistant across distinct roots, per SPEC_FULL.md §3.
pub fn project_id(root: &std::path::Path) -> String {
    let canonical = root.to_string_lossy();
    let mut hasher = Sha256::new();
    hasher.update(canonical.as_bytes());
    let digest = hasher.finalize();
    let hex12: String = digest.iter().take(6).map(|b| format!("{b:02x}")).collect();
    format!("{}_{}", slugify(root), hex12)
}
