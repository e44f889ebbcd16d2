//! Whole-pipeline integration tests against the public `Indexer`/`Retriever`/`Store` API, per
//! SPEC_FULL.md §8's end-to-end scenarios. Each test builds its own `TempDir`-backed project tree
//! and its own `TempDir`-backed store, so none of this touches `$HOME`.

use std::fs;
use std::path::Path;

use codebase_qa_core::retriever::{enrich_query, retrieve_context, NoDenseSearch};
use codebase_qa_core::types::{project_id, SessionTurn};
use codebase_qa_core::{clone, Config, Indexer, Store};
use tempfile::TempDir;

fn write_file(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}

fn auth_project(dir: &Path) {
    write_file(
        dir,
        "src/main.py",
        "def authenticate(user, password):\n    return user == password\n",
    );
    write_file(dir, "src/util.py", "def helper():\n    return 1\n");
}

#[test]
fn index_and_query_surfaces_the_matching_file() {
    let project = TempDir::new().unwrap();
    auth_project(project.path());
    let store_dir = TempDir::new().unwrap();
    let config = Config::default();
    let store = Store::new(store_dir.path().to_path_buf());
    let indexer = Indexer::new(&config, &store);

    let index = indexer.index_project(project.path()).unwrap();
    assert_eq!(index.total_files(), 2);
    store.save_index(&index).unwrap();

    let result = retrieve_context(
        "how does authentication work?",
        &index,
        &config,
        &NoDenseSearch,
    );
    assert_eq!(result.top_files.first().map(String::as_str), Some("src/main.py"));
    assert!(matches!(
        result.confidence.as_str(),
        "high" | "medium"
    ));
    assert!(result.symbol_hits.contains_key("authenticate"));
}

#[test]
fn incremental_update_removes_a_deleted_file_from_the_index() {
    let project = TempDir::new().unwrap();
    auth_project(project.path());
    let store_dir = TempDir::new().unwrap();
    let config = Config::default();
    let store = Store::new(store_dir.path().to_path_buf());
    let indexer = Indexer::new(&config, &store);

    let index = indexer.index_project(project.path()).unwrap();
    store.save_index(&index).unwrap();

    fs::remove_file(project.path().join("src/util.py")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));

    let report = indexer.update_index(project.path()).unwrap();
    assert_eq!(report.files_deleted, vec!["src/util.py".to_string()]);
    assert_eq!(report.files_updated, 0);

    let loaded = store.load_index(&index.project_id).unwrap().unwrap();
    let result = retrieve_context("helper", &loaded, &config, &NoDenseSearch);
    assert!(result.top_files.is_empty());
}

#[test]
fn two_projects_in_the_same_store_stay_isolated() {
    let project_a = TempDir::new().unwrap();
    write_file(project_a.path(), "src/a.py", "def a_only():\n    return 1\n");
    let project_b = TempDir::new().unwrap();
    write_file(project_b.path(), "src/b.py", "def b_only():\n    return 2\n");

    let store_dir = TempDir::new().unwrap();
    let config = Config::default();
    let store = Store::new(store_dir.path().to_path_buf());
    let indexer = Indexer::new(&config, &store);

    let index_a = indexer.index_project(project_a.path()).unwrap();
    store.save_index(&index_a).unwrap();
    let index_b = indexer.index_project(project_b.path()).unwrap();
    store.save_index(&index_b).unwrap();

    let projects = store.list_projects().unwrap();
    assert_eq!(projects.len(), 2);

    let loaded_a = store.load_index(&index_a.slug).unwrap().unwrap();
    assert!(loaded_a.file_index.contains_key("src/a.py"));
    assert!(!loaded_a.file_index.contains_key("src/b.py"));
}

#[test]
fn schema_version_mismatch_is_treated_as_absent_and_the_file_is_discarded() {
    let project = TempDir::new().unwrap();
    auth_project(project.path());
    let store_dir = TempDir::new().unwrap();
    let config = Config::default();
    let store = Store::new(store_dir.path().to_path_buf());
    let indexer = Indexer::new(&config, &store);

    let index = indexer.index_project(project.path()).unwrap();
    store.save_index(&index).unwrap();

    let db_path = store.projects_dir().join(format!("{}.db", index.project_id));
    {
        let conn = rusqlite::Connection::open(&db_path).unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO meta VALUES ('schema_version', ?1)",
            rusqlite::params!["999"],
        )
        .unwrap();
    }

    let loaded = store.load_index(&index.project_id).unwrap();
    assert!(loaded.is_none());
    assert!(!db_path.exists());

    let rebuilt = indexer.index_project(project.path()).unwrap();
    assert_eq!(rebuilt.total_files(), 2);
}

#[test]
fn follow_up_query_is_enriched_with_the_prior_turns_keywords() {
    let project = TempDir::new().unwrap();
    write_file(
        project.path(),
        "src/parser.py",
        "def parser_x():\n    return parse_tokens()\n",
    );
    write_file(
        project.path(),
        "tests/test_parser.py",
        "def test_parser_x():\n    assert parser_x() is not None\n",
    );

    let store_dir = TempDir::new().unwrap();
    let config = Config::default();
    let store = Store::new(store_dir.path().to_path_buf());
    let indexer = Indexer::new(&config, &store);
    let index = indexer.index_project(project.path()).unwrap();
    store.save_index(&index).unwrap();

    let session_id = "sess-1";
    let first_query = "what does the parser do?";
    let first_result = retrieve_context(first_query, &index, &config, &NoDenseSearch);
    assert!(first_result.top_files.iter().any(|f| f.contains("parser")));
    store
        .save_session_turn(session_id, first_query, &first_result.context, &first_result.top_files)
        .unwrap();

    let history: Vec<SessionTurn> = store.load_session(session_id, 2).unwrap();
    let enriched = enrich_query("and its tests?", &history);
    assert_ne!(enriched, "and its tests?");

    let second_result = retrieve_context(&enriched, &index, &config, &NoDenseSearch);
    assert!(second_result.top_files.iter().any(|f| f.contains("test_parser")));
}

#[test]
fn clone_and_index_rejects_an_invalid_github_url_with_no_side_effects() {
    let store_dir = TempDir::new().unwrap();
    let config = Config::default();
    let store = Store::new(store_dir.path().to_path_buf());

    let err = clone::clone_and_index("not a url", &config, &store).unwrap_err();
    assert_eq!(err.kind_tag(), "InvalidUrl");
    assert!(store.list_projects().unwrap().is_empty());
    assert!(!store.repos_dir().exists() || fs::read_dir(store.repos_dir()).unwrap().next().is_none());
}

#[test]
fn project_id_is_deterministic_for_the_same_canonical_root() {
    let project = TempDir::new().unwrap();
    auth_project(project.path());
    let canonical = project.path().canonicalize().unwrap();
    assert_eq!(project_id(&canonical), project_id(&canonical));
}
