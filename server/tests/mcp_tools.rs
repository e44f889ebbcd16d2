//! Integration tests for the ten MCP tools via `dispatch_jsonrpc()`.
//!
//! Each test builds an `AppState` backed by a fresh temp-dir store, indexes a small fixture
//! project, then sends JSON-RPC `tools/call` requests and validates the responses.

mod helpers;

use helpers::{write_basic_project, TestHarness};
use serde_json::json;
use tempfile::TempDir;

#[test]
fn test_initialize_reports_protocol_and_tools_capability() {
    let h = TestHarness::new();
    let resp = h.initialize();
    assert_eq!(resp["result"]["protocolVersion"], "2025-06-18");
    assert_eq!(resp["result"]["serverInfo"]["name"], "codebase-qa-agent");
    assert!(resp["result"]["capabilities"]["tools"].is_object());
}

#[test]
fn test_tools_list_enumerates_all_ten_operations() {
    let h = TestHarness::new();
    let resp = h
        .dispatch(json!({ "jsonrpc": "2.0", "id": 1, "method": "tools/list" }))
        .unwrap();
    let tools = resp["result"]["tools"].as_array().unwrap();
    let names: Vec<&str> = tools.iter().map(|t| t["name"].as_str().unwrap()).collect();
    for expected in [
        "indexer.index_project",
        "indexer.update_index",
        "indexer.watch_project",
        "indexer.unwatch_project",
        "indexer.clone_and_index",
        "indexer.delete_project",
        "qa.answer_question",
        "qa.find_relevant_files",
        "qa.list_projects",
        "qa.get_file_content",
    ] {
        assert!(names.contains(&expected), "missing tool {expected} in {names:?}");
    }
}

#[test]
fn test_index_project_then_find_relevant_files() {
    let h = TestHarness::new();
    let project = TempDir::new().unwrap();
    write_basic_project(project.path());

    let (index_result, is_error) = h.call_tool(
        "indexer.index_project",
        json!({ "project_path": project.path().display().to_string() }),
    );
    assert!(!is_error, "index_project errored: {index_result}");
    assert_eq!(index_result["files_indexed"], 2);

    let (find_result, is_error) = h.call_tool(
        "qa.find_relevant_files",
        json!({
            "query": "how does authentication work?",
            "project_path": project.path().display().to_string(),
        }),
    );
    assert!(!is_error, "find_relevant_files errored: {find_result}");
    let files = find_result["files"].as_array().unwrap();
    assert_eq!(files.first().and_then(|f| f.as_str()), Some("src/main.py"));
    assert!(matches!(find_result["confidence"].as_str(), Some("high") | Some("medium")));
    let symbol_hits = find_result["symbol_hits"].as_array().unwrap();
    assert!(symbol_hits.iter().any(|h| h["symbol"] == "authenticate"));
}

#[test]
fn test_update_index_reports_deleted_file() {
    let h = TestHarness::new();
    let project = TempDir::new().unwrap();
    write_basic_project(project.path());

    let project_path = project.path().display().to_string();
    let (_, is_error) =
        h.call_tool("indexer.index_project", json!({ "project_path": project_path }));
    assert!(!is_error);

    std::fs::remove_file(project.path().join("src/util.py")).unwrap();
    std::thread::sleep(std::time::Duration::from_millis(10));

    let (update_result, is_error) =
        h.call_tool("indexer.update_index", json!({ "project_path": project_path.clone() }));
    assert!(!is_error, "update_index errored: {update_result}");
    assert_eq!(update_result["files_deleted"], 1);
    assert_eq!(update_result["deleted_files"][0], "src/util.py");

    let (find_result, _) = h.call_tool(
        "qa.find_relevant_files",
        json!({ "query": "helper", "project_path": project_path }),
    );
    assert!(find_result["files"].as_array().unwrap().is_empty());
}

#[test]
fn test_answer_question_then_follow_up_enriches_session() {
    let h = TestHarness::new();
    let project = TempDir::new().unwrap();
    write_basic_project(project.path());
    let project_path = project.path().display().to_string();
    h.call_tool("indexer.index_project", json!({ "project_path": project_path.clone() }));

    let (first, is_error) = h.call_tool(
        "qa.answer_question",
        json!({ "question": "how does authentication work?", "project_path": project_path.clone() }),
    );
    assert!(!is_error, "answer_question errored: {first}");
    let session_id = first["session_id"].as_str().unwrap().to_string();
    assert!(first["relevant_files"].as_array().unwrap().contains(&json!("src/main.py")));

    let (second, is_error) = h.call_tool(
        "qa.answer_question",
        json!({
            "question": "and its tests?",
            "session_id": session_id,
            "project_path": project_path,
        }),
    );
    assert!(!is_error, "follow-up answer_question errored: {second}");
    assert_eq!(second["session_id"], session_id);
}

#[test]
fn test_list_and_delete_project() {
    let h = TestHarness::new();
    let project = TempDir::new().unwrap();
    write_basic_project(project.path());
    let project_path = project.path().display().to_string();
    h.call_tool("indexer.index_project", json!({ "project_path": project_path }));

    let (listed, _) = h.call_tool("qa.list_projects", json!({}));
    assert_eq!(listed["total"], 1);
    let project_id = listed["projects"][0]["project_id"].as_str().unwrap().to_string();

    let (deleted, is_error) =
        h.call_tool("indexer.delete_project", json!({ "project_identifier": project_id }));
    assert!(!is_error);
    assert_eq!(deleted["deleted"], true);

    let (listed_after, _) = h.call_tool("qa.list_projects", json!({}));
    assert_eq!(listed_after["total"], 0);
}

#[test]
fn test_get_file_content_returns_symbols_and_keywords() {
    let h = TestHarness::new();
    let project = TempDir::new().unwrap();
    write_basic_project(project.path());
    let project_path = project.path().display().to_string();
    h.call_tool("indexer.index_project", json!({ "project_path": project_path.clone() }));

    let (content, is_error) = h.call_tool(
        "qa.get_file_content",
        json!({ "file_path": "src/main.py", "project_path": project_path }),
    );
    assert!(!is_error, "get_file_content errored: {content}");
    assert!(content["content"].as_str().unwrap().contains("def authenticate"));
    assert!(content["symbols"].as_array().unwrap().iter().any(|s| s == "authenticate"));
    assert_eq!(content["extension"], "py");
}

#[test]
fn test_clone_and_index_rejects_invalid_url_with_no_side_effects() {
    let h = TestHarness::new();
    let (result, is_error) =
        h.call_tool("indexer.clone_and_index", json!({ "github_url": "not a url" }));
    assert!(is_error);
    assert_eq!(result["error_kind"], "InvalidUrl");
}

#[test]
fn test_unknown_tool_returns_structured_error() {
    let h = TestHarness::new();
    let (result, is_error) = h.call_tool("bogus.tool", json!({}));
    assert!(is_error);
    assert!(result["error"].as_str().unwrap().contains("unknown tool"));
}

#[test]
fn test_watch_and_unwatch_project_round_trip() {
    let h = TestHarness::new();
    let project = TempDir::new().unwrap();
    write_basic_project(project.path());
    let project_path = project.path().display().to_string();

    let (watch_result, is_error) =
        h.call_tool("indexer.watch_project", json!({ "project_path": project_path.clone() }));
    assert!(!is_error, "watch_project errored: {watch_result}");
    assert_eq!(watch_result["watching"], true);

    let (unwatch_result, _) =
        h.call_tool("indexer.unwatch_project", json!({ "project_path": project_path }));
    assert_eq!(unwatch_result["stopped"], true);
}

#[test]
fn test_answer_question_without_index_returns_index_absent_error() {
    let h = TestHarness::new();
    let (result, is_error) =
        h.call_tool("qa.answer_question", json!({ "question": "what does this do?" }));
    assert!(is_error);
    assert_eq!(result["error_kind"], "IndexAbsent");
}
