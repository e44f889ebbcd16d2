//! Test harness for MCP tool integration tests.
//!
//! Builds an `AppState` backed by a fresh temp-dir store, dispatches JSON-RPC requests via
//! `dispatch_jsonrpc()` directly (no subprocess, no stdio).

use codebase_qa_server::mcp::dispatch_jsonrpc;
use codebase_qa_server::operations::AppState;
use codebase_qa_core::{Config, Store};
use serde_json::{json, Value};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

pub struct TestHarness {
    pub state: AppState,
    _store_dir: TempDir,
}

impl TestHarness {
    /// Build a harness with a fresh, empty store (no projects indexed yet).
    pub fn new() -> Self {
        let store_dir = TempDir::new().expect("failed to create temp store dir");
        let config = Config::default();
        let store = Store::new(store_dir.path().to_path_buf());
        TestHarness { state: AppState::new(config, store), _store_dir: store_dir }
    }

    /// Send a JSON-RPC request and return the response (`None` for notifications).
    pub fn dispatch(&self, msg: Value) -> Option<Value> {
        dispatch_jsonrpc(&self.state, &msg)
    }

    pub fn initialize(&self) -> Value {
        self.dispatch(json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "initialize",
            "params": { "protocolVersion": "2025-06-18" }
        }))
        .unwrap()
    }

    /// Call an MCP tool by name with the given arguments. Returns the tool's JSON payload
    /// (already parsed back out of the `content[0].text` envelope) and whether it was an error.
    pub fn call_tool(&self, tool: &str, arguments: Value) -> (Value, bool) {
        let resp = self
            .dispatch(json!({
                "jsonrpc": "2.0",
                "id": 2,
                "method": "tools/call",
                "params": { "name": tool, "arguments": arguments }
            }))
            .unwrap();
        let is_error = resp["result"]["isError"].as_bool().unwrap_or(false);
        let text = resp["result"]["content"][0]["text"].as_str().unwrap_or("{}");
        let payload: Value = serde_json::from_str(text).unwrap_or(Value::Null);
        (payload, is_error)
    }
}

/// Write a small fixture project to `dir` with one function-bearing file and one helper file.
pub fn write_basic_project(dir: &Path) {
    write(dir, "src/main.py", "def authenticate(user, password):\n    return user == password\n");
    write(dir, "src/util.py", "def helper():\n    return 1\n");
}

fn write(dir: &Path, rel: &str, contents: &str) {
    let path = dir.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, contents).unwrap();
}
