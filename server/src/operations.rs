//! The ten operations of SPEC_FULL.md §6, implemented once and shared by the CLI subcommands
//! and the MCP `tools/call` dispatcher.
//!
//! Each function takes loosely-typed JSON in, returns loosely-typed JSON out — SPEC_FULL.md §9
//! ("Dynamic JSON shapes at the boundary... tagged result variants... reject unknown input keys")
//! is honored by each function validating its own required fields and mapping `QaError` into the
//! uniform `{error, error_kind}` shape via `QaError`'s `From<QaError> for serde_json::Value`.

use std::path::{Path, PathBuf};

use codebase_qa_core::embeddings::FastEmbedSearch;
use codebase_qa_core::{
    clone, retrieve_context, AnswerModel, Config, Indexer, NoAnswerModel, QaError, Result, Store,
    WatcherRegistry,
};
use serde_json::{json, Value};

pub struct AppState {
    pub config: Config,
    pub store: Store,
    pub watchers: WatcherRegistry,
}

impl AppState {
    pub fn new(config: Config, store: Store) -> Self {
        AppState { config, store, watchers: WatcherRegistry::new() }
    }
}

fn required_str<'a>(args: &'a Value, field: &str) -> std::result::Result<&'a str, Value> {
    args.get(field)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| json!({ "error": format!("missing required field '{field}'"), "error_kind": "InvalidInput" }))
}

fn optional_str<'a>(args: &'a Value, field: &str) -> Option<&'a str> {
    args.get(field).and_then(Value::as_str).filter(|s| !s.is_empty())
}

pub fn index_project(state: &AppState, args: &Value) -> Value {
    let project_path = match required_str(args, "project_path") {
        Ok(p) => p,
        Err(e) => return e,
    };
    match index_path(state, Path::new(project_path)) {
        Ok(index) => json!({
            "files_indexed": index.total_files(),
            "project_root": index.project_root,
            "indexed_at": index.indexed_at,
            "message": format!("indexed {} files", index.total_files()),
        }),
        Err(e) => e.into(),
    }
}

fn index_path(state: &AppState, path: &Path) -> Result<codebase_qa_core::ProjectIndex> {
    let indexer = Indexer::new(&state.config, &state.store);
    indexer.index_project(path)
}

pub fn update_index(state: &AppState, args: &Value) -> Value {
    let project_path = match required_str(args, "project_path") {
        Ok(p) => p,
        Err(e) => return e,
    };
    let indexer = Indexer::new(&state.config, &state.store);
    match indexer.update_index(Path::new(project_path)) {
        Ok(report) => json!({
            "files_updated": report.files_updated,
            "files_deleted": report.deleted_files.len(),
            "updated_files": report.changed_files,
            "deleted_files": report.deleted_files,
            "message": format!(
                "{} file(s) updated, {} file(s) deleted",
                report.files_updated, report.deleted_files.len()
            ),
        }),
        Err(e) => e.into(),
    }
}

pub fn watch_project(state: &AppState, args: &Value) -> Value {
    let project_path = match required_str(args, "project_path") {
        Ok(p) => p,
        Err(e) => return e,
    };
    let path = Path::new(project_path);
    match state.watchers.watch(path, state.config.clone(), state.store.clone()) {
        Ok(started) => json!({
            "watching": true,
            "project_path": project_path,
            "newly_started": started,
            "active_watchers": state.watchers.active_roots(),
        }),
        Err(e) => e.into(),
    }
}

pub fn unwatch_project(state: &AppState, args: &Value) -> Value {
    let project_path = match required_str(args, "project_path") {
        Ok(p) => p,
        Err(e) => return e,
    };
    let stopped = state.watchers.unwatch(Path::new(project_path));
    json!({ "stopped": stopped, "active_watchers": state.watchers.active_roots() })
}

pub fn clone_and_index(state: &AppState, args: &Value) -> Value {
    let github_url = match required_str(args, "github_url") {
        Ok(u) => u,
        Err(e) => return e,
    };
    match clone::clone_and_index(github_url, &state.config, &state.store) {
        Ok(result) => json!({
            "files_indexed": result.index.total_files(),
            "project_root": result.index.project_root,
            "indexed_at": result.index.indexed_at,
            "owner_repo": result.owner_repo,
            "clone_action": result.clone_action,
            "message": format!("indexed {} files from {}", result.index.total_files(), result.owner_repo),
        }),
        Err(e) => e.into(),
    }
}

pub fn delete_project(state: &AppState, args: &Value) -> Value {
    let identifier = match required_str(args, "project_identifier") {
        Ok(i) => i,
        Err(e) => return e,
    };
    match state.store.delete_project(identifier) {
        Ok(true) => json!({ "deleted": true, "message": format!("deleted project '{identifier}'") }),
        Ok(false) => json!({ "deleted": false, "message": format!("no project found for '{identifier}'") }),
        Err(e) => e.into(),
    }
}

pub fn list_projects(state: &AppState) -> Value {
    match state.store.list_projects() {
        Ok(projects) => {
            let total = projects.len();
            json!({ "projects": projects, "total": total })
        }
        Err(e) => e.into(),
    }
}

fn resolve_identifier(state: &AppState, project_path: Option<&str>) -> Result<codebase_qa_core::ProjectIndex> {
    let identifier = project_path.unwrap_or("");
    let summary = state
        .store
        .resolve(identifier)?
        .ok_or_else(|| QaError::IndexAbsent { identifier: identifier.to_string() })?;
    state
        .store
        .load_index(&summary.project_id)?
        .ok_or_else(|| QaError::IndexAbsent { identifier: summary.project_id })
}

pub fn answer_question(state: &AppState, args: &Value) -> Value {
    let question = match required_str(args, "question") {
        Ok(q) => q,
        Err(e) => return e,
    };
    let project_path = optional_str(args, "project_path");
    let session_id = optional_str(args, "session_id").map(str::to_string).unwrap_or_else(new_session_id);

    let index = match resolve_identifier(state, project_path) {
        Ok(i) => i,
        Err(e) => return e.into(),
    };

    let history = match state.store.load_session(&session_id, 20) {
        Ok(h) => h,
        Err(_) => Vec::new(),
    };
    let enriched = codebase_qa_core::retriever::enrich_query(question, &history);

    let dense = FastEmbedSearch::new(&state.config, &state.store);
    let result = retrieve_context(&enriched, &index, &state.config, &dense);

    let answer = NoAnswerModel.answer(question, &result.context);
    let follow_up = follow_up_suggestions(&result);

    if let Err(e) = state.store.save_session_turn(&session_id, question, &answer, &result.top_files) {
        tracing::warn!(error = %e, "failed to persist session turn");
    }

    json!({
        "answer": answer,
        "relevant_files": result.top_files,
        "confidence": result.confidence.as_str(),
        "follow_up": follow_up,
        "session_id": session_id,
        "project_id": index.project_id,
    })
}

fn follow_up_suggestions(result: &codebase_qa_core::RetrievalResult) -> Vec<String> {
    result.symbol_hits.keys().take(3).map(|name| format!("How does `{name}` work?")).collect()
}

fn new_session_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    format!("session_{nanos:x}")
}

pub fn find_relevant_files(state: &AppState, args: &Value) -> Value {
    let query = match required_str(args, "query") {
        Ok(q) => q,
        Err(e) => return e,
    };
    let project_path = optional_str(args, "project_path");

    let index = match resolve_identifier(state, project_path) {
        Ok(i) => i,
        Err(e) => return e.into(),
    };

    let dense = FastEmbedSearch::new(&state.config, &state.store);
    let result = retrieve_context(query, &index, &state.config, &dense);

    let symbol_hits: Vec<Value> = result
        .symbol_hits
        .iter()
        .flat_map(|(name, locations)| {
            locations.iter().map(move |loc| {
                json!({ "symbol": name, "file": loc.file, "line": loc.line, "kind": loc.kind.as_str() })
            })
        })
        .collect();

    json!({
        "files": result.top_files,
        "symbol_hits": symbol_hits,
        "confidence": result.confidence.as_str(),
        "reasoning": format!("top_score={:.3}", result.top_score),
    })
}

pub fn get_file_content(state: &AppState, args: &Value) -> Value {
    let file_path = match required_str(args, "file_path") {
        Ok(p) => p,
        Err(e) => return e,
    };
    let project_path = optional_str(args, "project_path");

    let index = match resolve_identifier(state, project_path) {
        Ok(i) => i,
        Err(e) => return e.into(),
    };

    let Some(entry) = index.file_index.get(file_path) else {
        return QaError::ReadError {
            path: PathBuf::from(file_path),
            message: "not present in the index".to_string(),
        }
        .into();
    };

    let content = match std::fs::read_to_string(PathBuf::from(&index.project_root).join(file_path)) {
        Ok(c) => c,
        Err(e) => {
            return QaError::ReadError { path: PathBuf::from(file_path), message: e.to_string() }.into();
        }
    };

    json!({
        "file_path": file_path,
        "content": content,
        "symbols": entry.symbols,
        "keywords": entry.keywords,
        "extension": entry.extension,
        "size_bytes": entry.size_bytes,
        "chunks_count": entry.chunks.len(),
    })
}
