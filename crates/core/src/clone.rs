//! GitHub URL parsing and clone-to-index, per SPEC_FULL.md §4.7/§6.
//!
//! `git2` stays the dependency the teacher already carries for repository access, but its use
//! here is `Repository::clone` rather than the teacher's blame/history walk — cloning a remote
//! into `repos/<owner>_<repo>/` under the store's base directory, then handing the checkout to
//! `Indexer::index_project`. The URL grammar (`owner/repo` with or without the `github.com` host)
//! is this module's own regex, since nothing in the corpus parses GitHub URLs.

use std::path::PathBuf;

use regex::Regex;
use serde::Serialize;
use std::sync::OnceLock;

use crate::config::Config;
use crate::error::{QaError, Result};
use crate::indexer::Indexer;
use crate::store::Store;
use crate::types::ProjectIndex;

/// Result of `clone_and_index`: the index build plus the clone bookkeeping fields §6 asks for.
#[derive(Serialize)]
pub struct CloneResult {
    pub index: ProjectIndex,
    pub owner_repo: String,
    pub clone_action: String,
}

fn url_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(
            r"(?xi)
            ^(?:https?://(?:www\.)?github\.com/)?
            (?P<owner>[A-Za-z0-9_.-]+)
            /
            (?P<repo>[A-Za-z0-9_.-]+?)
            (?:\.git)?
            /?$
            ",
        )
        .expect("static GitHub URL regex is valid")
    })
}

/// Parse a GitHub URL (`https://github.com/owner/repo[.git][/]`) or bare `owner/repo` shorthand
/// into `(owner, repo)`. Anything else fails with `InvalidUrl`.
pub fn parse_github_url(raw: &str) -> Result<(String, String)> {
    let trimmed = raw.trim();
    let caps = url_pattern().captures(trimmed).ok_or_else(|| QaError::InvalidUrl(raw.to_string()))?;
    let owner = caps.name("owner").unwrap().as_str().to_string();
    let repo = caps.name("repo").unwrap().as_str().to_string();
    if owner.is_empty() || repo.is_empty() {
        return Err(QaError::InvalidUrl(raw.to_string()));
    }
    Ok((owner, repo))
}

/// Clone `github_url` into the store's `repos/<owner>_<repo>/` directory (reusing an existing
/// checkout if already present) and index it. Any parse failure short-circuits before any
/// filesystem side effect, per §8 scenario 6.
pub fn clone_and_index(github_url: &str, config: &Config, store: &Store) -> Result<CloneResult> {
    let (owner, repo) = parse_github_url(github_url)?;
    let owner_repo = format!("{owner}/{repo}");
    let dest: PathBuf = store.repos_dir().join(format!("{owner}_{repo}"));

    let clone_action = if dest.join(".git").exists() {
        "reused_existing_checkout".to_string()
    } else {
        std::fs::create_dir_all(store.repos_dir())
            .map_err(|e| QaError::ReadError { path: store.repos_dir(), message: e.to_string() })?;
        let clone_url = format!("https://github.com/{owner}/{repo}.git");
        git2::Repository::clone(&clone_url, &dest)
            .map_err(|e| QaError::InvalidUrl(format!("clone of {clone_url} failed: {e}")))?;
        "cloned".to_string()
    };

    let indexer = Indexer::new(config, store);
    let index = indexer.index_project(&dest)?;
    Ok(CloneResult { index, owner_repo, clone_action })
}
