//! Enumerate eligible files under a project root.
//!
//! Grounded in the teacher's `ignore::WalkBuilder`-based parallel walk (denylist via
//! `.filter_entry()`, `.hidden(true)`), generalized to the exact allowlist/denylist/size rules
//! SPEC_FULL.md §4.1 specifies.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;
use std::time::UNIX_EPOCH;

use ignore::WalkBuilder;
use rayon::prelude::*;

use crate::config::Config;
use crate::error::{QaError, Result};
use crate::types::FileMeta;

const DENYLISTED_DIRS: &[&str] = &[
    ".git",
    "node_modules",
    "__pycache__",
    ".venv",
    "venv",
    "env",
    ".pytest_cache",
    ".mypy_cache",
    "dist",
    "build",
    ".next",
    ".nuxt",
    "coverage",
    ".turbo",
    "target",
    ".gradle",
    "out",
    "classes",
    "bin",
    "obj",
    ".vs",
    "packages",
    "vendor",
    ".bundle",
    "tmp",
    "temp",
    "logs",
    ".cache",
];

const SOURCE_EXTENSIONS: &[&str] = &[
    "py", "js", "ts", "jsx", "tsx", "go", "rs", "java", "cpp", "c", "rb", "php", "cs", "swift",
];

const MARKUP_EXTENSIONS: &[&str] =
    &["html", "css", "scss", "json", "yaml", "yml", "toml", "md", "txt", "sh"];

/// True if `ext` (without the leading dot) names a source-code extension per the allowlist.
pub fn is_source_extension(ext: &str) -> bool {
    SOURCE_EXTENSIONS.contains(&ext)
}

fn is_allowed_extension(ext: &str) -> bool {
    SOURCE_EXTENSIONS.contains(&ext) || MARKUP_EXTENSIONS.contains(&ext)
}

/// True if any path component's basename is in the denylist.
pub fn has_denylisted_ancestor(rel_path: &str) -> bool {
    rel_path.split('/').any(|part| DENYLISTED_DIRS.contains(&part))
}

fn extension_of(path: &Path) -> String {
    path.extension().and_then(|e| e.to_str()).unwrap_or("").to_lowercase()
}

/// Scan `root`, returning file metadata sorted ascending by relative path.
///
/// Fails with `PathMissing` or `NotADirectory`; never partially succeeds on a bad root.
pub fn scan(root: &Path, config: &Config) -> Result<Vec<FileMeta>> {
    if !root.exists() {
        return Err(QaError::PathMissing(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(QaError::NotADirectory(root.to_path_buf()));
    }

    let canonical_root = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());

    let denylist: HashSet<&str> = DENYLISTED_DIRS.iter().copied().collect();
    let walker = WalkBuilder::new(root)
        .hidden(true)
        .follow_links(false)
        .filter_entry(move |entry| {
            if entry.file_type().map(|t| t.is_dir()).unwrap_or(false) {
                let name = entry.file_name().to_str().unwrap_or("");
                return !denylist.contains(name);
            }
            true
        })
        .build_parallel();

    let collected: Mutex<Vec<std::path::PathBuf>> = Mutex::new(Vec::new());
    walker.run(|| {
        let collected = &collected;
        Box::new(move |entry| {
            if let Ok(entry) = entry {
                if entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                    collected.lock().unwrap().push(entry.path().to_path_buf());
                }
            }
            ignore::WalkState::Continue
        })
    });

    let candidates = collected.into_inner().unwrap();

    let mut metas: Vec<FileMeta> = candidates
        .into_par_iter()
        .filter_map(|path| build_file_meta(&path, &canonical_root, config))
        .collect();

    metas.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
    Ok(metas)
}

fn build_file_meta(path: &Path, canonical_root: &Path, config: &Config) -> Option<FileMeta> {
    // Symlinks (file or dir) are skipped entirely; ignore::Walk already resolves metadata lazily
    // so we check the symlink bit explicitly rather than trusting `path.is_file()`.
    let symlink_meta = std::fs::symlink_metadata(path).ok()?;
    if symlink_meta.file_type().is_symlink() {
        return None;
    }
    if !symlink_meta.is_file() {
        return None;
    }

    let ext = extension_of(path);
    if !is_allowed_extension(&ext) {
        return None;
    }

    let size = symlink_meta.len();
    if size == 0 || size > config.max_file_bytes {
        return None;
    }

    let canonical_path = path.canonicalize().ok()?;
    if !canonical_path.starts_with(canonical_root) {
        return None;
    }

    let relative_path = canonical_path
        .strip_prefix(canonical_root)
        .ok()?
        .to_string_lossy()
        .replace('\\', "/");

    if has_denylisted_ancestor(&relative_path) {
        return None;
    }

    let mtime = symlink_meta
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);

    Some(FileMeta {
        relative_path,
        absolute_path: canonical_path,
        extension: ext,
        size_bytes: size,
        last_modified: mtime,
    })
}
