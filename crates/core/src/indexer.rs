//! Full build and incremental update orchestration, per SPEC_FULL.md §4.4.
//!
//! No teacher analogue exists for this exact pipeline (the teacher's `scan.rs` only enumerates
//! files); the full-build/incremental-update split and the binary/blank-file skip rule are
//! grounded in the original Python `reasoners/indexer.py` and `skills/scanner.py`, restructured
//! around this crate's synchronous `Scanner`/`Extractor`/`Store` instead of an LLM summarizer.

use std::collections::BTreeMap;
use std::path::Path;

use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{QaError, Result};
use crate::extractor::{chunk_file, extract_keywords, extract_symbols};
use crate::scanner::scan;
use crate::store::Store;
use crate::types::{project_id, slugify, FileEntry, ProjectIndex, SymbolLocation};

/// Report returned by `update_index`.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct UpdateReport {
    pub changed_files: Vec<String>,
    pub deleted_files: Vec<String>,
    pub files_updated: usize,
}

pub struct Indexer<'a> {
    pub config: &'a Config,
    pub store: &'a Store,
}

impl<'a> Indexer<'a> {
    pub fn new(config: &'a Config, store: &'a Store) -> Self {
        Indexer { config, store }
    }

    /// Build a fresh index for `root`, replacing any prior index for the same project.
    pub fn index_project(&self, root: &Path) -> Result<ProjectIndex> {
        if !root.exists() {
            return Err(QaError::PathMissing(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(QaError::NotADirectory(root.to_path_buf()));
        }

        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let files = scan(&canonical_root, self.config)?;
        info!(root = %canonical_root.display(), count = files.len(), "scanned project");

        let mut index = ProjectIndex {
            project_root: canonical_root.to_string_lossy().to_string(),
            project_id: project_id(&canonical_root),
            slug: slugify(&canonical_root),
            indexed_at: now_seconds(),
            file_index: BTreeMap::new(),
            keyword_map: BTreeMap::new(),
            symbol_map: BTreeMap::new(),
        };

        for meta in &files {
            match extract_one(&meta.absolute_path, &meta.relative_path, self.config) {
                Ok(Some(entry)) => {
                    add_file_contributions(&mut index, &meta.relative_path, &entry);
                    index.file_index.insert(meta.relative_path.clone(), FileEntry {
                        extension: meta.extension.clone(),
                        size_bytes: meta.size_bytes,
                        last_modified: meta.last_modified,
                        keywords: entry.keywords,
                        chunks: entry.chunks,
                        symbols: entry.symbols,
                    });
                }
                Ok(None) => debug!(file = %meta.relative_path, "skipped blank or binary file"),
                Err(e) => warn!(file = %meta.relative_path, error = %e, "failed to extract file, continuing"),
            }
        }

        self.store.save_index(&index)?;
        info!(project = %index.project_id, files = index.total_files(), "index saved");

        crate::embeddings::build_and_store_embeddings(&index, self.config, self.store);

        Ok(index)
    }

    /// Reconcile the prior index for `root` with the current filesystem state.
    pub fn update_index(&self, root: &Path) -> Result<UpdateReport> {
        if !root.exists() {
            return Err(QaError::PathMissing(root.to_path_buf()));
        }
        if !root.is_dir() {
            return Err(QaError::NotADirectory(root.to_path_buf()));
        }

        let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
        let id = project_id(&canonical_root);
        let mut index = self
            .store
            .load_index(&id)?
            .ok_or_else(|| QaError::IndexAbsent { identifier: id.clone() })?;

        let prior_indexed_at = index.indexed_at;
        let files = scan(&canonical_root, self.config)?;
        let current_paths: std::collections::HashSet<&str> =
            files.iter().map(|f| f.relative_path.as_str()).collect();

        let prior_paths: Vec<String> = index.file_index.keys().cloned().collect();
        let mut deleted = Vec::new();
        for rel_path in prior_paths {
            if !current_paths.contains(rel_path.as_str()) {
                remove_file_contributions(&mut index, &rel_path);
                index.file_index.remove(&rel_path);
                deleted.push(rel_path);
            }
        }

        let mut changed = Vec::new();
        for meta in &files {
            let needs_update = match index.file_index.get(&meta.relative_path) {
                None => true,
                Some(_) => meta.last_modified > prior_indexed_at,
            };
            if !needs_update {
                continue;
            }

            remove_file_contributions(&mut index, &meta.relative_path);

            match extract_one(&meta.absolute_path, &meta.relative_path, self.config) {
                Ok(Some(entry)) => {
                    add_file_contributions(&mut index, &meta.relative_path, &entry);
                    index.file_index.insert(meta.relative_path.clone(), FileEntry {
                        extension: meta.extension.clone(),
                        size_bytes: meta.size_bytes,
                        last_modified: meta.last_modified,
                        keywords: entry.keywords,
                        chunks: entry.chunks,
                        symbols: entry.symbols,
                    });
                    changed.push(meta.relative_path.clone());
                }
                Ok(None) => {
                    index.file_index.remove(&meta.relative_path);
                    debug!(file = %meta.relative_path, "skipped blank or binary file on update");
                }
                Err(e) => warn!(file = %meta.relative_path, error = %e, "failed to re-extract file, continuing"),
            }
        }

        index.indexed_at = now_seconds();
        self.store.save_index(&index)?;

        info!(project = %id, changed = changed.len(), deleted = deleted.len(), "incremental update saved");
        Ok(UpdateReport { files_updated: changed.len(), changed_files: changed, deleted_files: deleted })
    }
}

/// The extracted shape of one file, before it's merged into file_index/keyword_map/symbol_map.
struct ExtractedFile {
    keywords: Vec<String>,
    chunks: Vec<crate::types::Chunk>,
    symbols: Vec<String>,
    symbol_locations: Vec<(String, SymbolLocation)>,
}

/// Read bounded bytes, skip blank/binary files, extract symbols/keywords/chunks.
/// Returns `Ok(None)` for blank or binary content (not an error, just nothing to index).
fn extract_one(absolute_path: &Path, relative_path: &str, config: &Config) -> Result<Option<ExtractedFile>> {
    let raw = std::fs::read(absolute_path).map_err(|e| QaError::ReadError {
        path: absolute_path.to_path_buf(),
        message: e.to_string(),
    })?;
    let capped = &raw[..raw.len().min(config.read_cap_bytes)];

    if is_binary(capped, config.binary_sniff_bytes) {
        return Ok(None);
    }

    let content = String::from_utf8_lossy(capped).to_string();
    if content.trim().is_empty() {
        return Ok(None);
    }

    let ext = absolute_path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase();
    let symbols = extract_symbols(&content, &ext);
    let keywords = extract_keywords(&content, config.keyword_top_n);
    let chunks = chunk_file(&content, &symbols, config.max_chunk_lines);

    let symbol_locations: Vec<(String, SymbolLocation)> = symbols
        .iter()
        .map(|s| {
            (
                s.name.clone(),
                SymbolLocation { file: relative_path.to_string(), line: s.line, kind: s.kind },
            )
        })
        .collect();

    Ok(Some(ExtractedFile {
        keywords,
        chunks,
        symbols: symbols.iter().map(|s| s.name.clone()).collect(),
        symbol_locations,
    }))
}

/// Binary iff a null byte appears in the first `sniff_bytes`, or decoding produces a
/// replacement-character ratio above 10%.
fn is_binary(bytes: &[u8], sniff_bytes: usize) -> bool {
    let window = &bytes[..bytes.len().min(sniff_bytes)];
    if window.contains(&0u8) {
        return true;
    }
    let text = String::from_utf8_lossy(bytes);
    if text.is_empty() {
        return false;
    }
    let replacement_count = text.chars().filter(|&c| c == '\u{FFFD}').count();
    (replacement_count as f64 / text.chars().count() as f64) > 0.10
}

fn add_file_contributions(index: &mut ProjectIndex, rel_path: &str, entry: &ExtractedFile) {
    for kw in &entry.keywords {
        let files = index.keyword_map.entry(kw.clone()).or_default();
        if !files.iter().any(|f| f == rel_path) {
            files.push(rel_path.to_string());
        }
    }
    for (name, loc) in &entry.symbol_locations {
        index.symbol_map.entry(name.clone()).or_default().push(loc.clone());
    }
}

fn remove_file_contributions(index: &mut ProjectIndex, rel_path: &str) {
    index.keyword_map.retain(|_, files| {
        files.retain(|f| f != rel_path);
        !files.is_empty()
    });
    index.symbol_map.retain(|_, locations| {
        locations.retain(|loc| loc.file != rel_path);
        !locations.is_empty()
    });
}

fn now_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn write(dir: &Path, rel: &str, contents: &str) {
        let path = dir.join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).unwrap();
        }
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn is_binary_detects_null_byte() {
        assert!(is_binary(b"abc\0def", 8000));
        assert!(!is_binary(b"fn main() {}", 8000));
    }

    #[test]
    fn full_index_then_incremental_update_detects_changes_and_deletions() {
        let project_dir = TempDir::new().unwrap();
        let store_dir = TempDir::new().unwrap();
        write(project_dir.path(), "src/a.py", "def a():\n    return 1\n");
        write(project_dir.path(), "src/b.py", "def b():\n    return 2\n");

        let config = Config::default();
        let store = Store::new(store_dir.path().to_path_buf());
        let indexer = Indexer::new(&config, &store);

        let index = indexer.index_project(project_dir.path()).unwrap();
        assert_eq!(index.total_files(), 2);
        assert!(index.symbol_map.contains_key("a"));
        assert!(index.symbol_map.contains_key("b"));

        std::fs::remove_file(project_dir.path().join("src/b.py")).unwrap();
        write(project_dir.path(), "src/c.py", "def c():\n    return 3\n");

        std::thread::sleep(std::time::Duration::from_millis(10));
        let report = indexer.update_index(project_dir.path()).unwrap();
        assert_eq!(report.deleted_files, vec!["src/b.py".to_string()]);

        let reloaded = indexer.store.load_index(&project_id(
            &project_dir.path().canonicalize().unwrap(),
        )).unwrap().unwrap();
        assert!(!reloaded.file_index.contains_key("src/b.py"));
        assert!(!reloaded.symbol_map.contains_key("b"));
        assert!(reloaded.file_index.contains_key("src/c.py"));
    }

    #[test]
    fn update_index_without_prior_index_fails() {
        let project_dir = TempDir::new().unwrap();
        let store_dir = TempDir::new().unwrap();
        write(project_dir.path(), "src/a.py", "def a(): pass\n");

        let config = Config::default();
        let store = Store::new(store_dir.path().to_path_buf());
        let indexer = Indexer::new(&config, &store);

        let err = indexer.update_index(project_dir.path()).unwrap_err();
        assert_eq!(err.kind_tag(), "IndexAbsent");
    }

    #[test]
    fn index_project_fails_on_missing_root() {
        let store_dir = TempDir::new().unwrap();
        let config = Config::default();
        let store = Store::new(store_dir.path().to_path_buf());
        let indexer = Indexer::new(&config, &store);

        let err = indexer.index_project(Path::new("/nonexistent/xyz")).unwrap_err();
        assert_eq!(err.kind_tag(), "PathMissing");
    }

    #[test]
    fn blank_files_are_skipped_not_indexed() {
        let project_dir = TempDir::new().unwrap();
        let store_dir = TempDir::new().unwrap();
        write(project_dir.path(), "src/blank.py", "   \n\n  \n");
        write(project_dir.path(), "src/real.py", "def real(): pass\n");

        let config = Config::default();
        let store = Store::new(store_dir.path().to_path_buf());
        let indexer = Indexer::new(&config, &store);
        let index = indexer.index_project(project_dir.path()).unwrap();

        assert!(!index.file_index.contains_key("src/blank.py"));
        assert!(index.file_index.contains_key("src/real.py"));
    }
}
