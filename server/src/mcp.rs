//! MCP stdio JSON-RPC server, per SPEC_FULL.md §6.
//!
//! The protocol handling here — `initialize`/`tools/list`/`tools/call`/`ping`, the `initialized`
//! gating before any other method is accepted, and the `notifications/*` no-response rule — is
//! the teacher's own stdio loop shape (its `dispatch_jsonrpc`/`run_mcp` pair in this same file).
//! What changes is everything downstream of `tools/call`: the teacher's nine `cs_*` tools backed
//! by a shared `Arc<RwLock<ServerState>>` become this system's ten `indexer.*`/`qa.*` tools,
//! backed by the synchronous `operations` module and a plain (non-shared) `AppState`, since this
//! loop reads one request, fully dispatches it to completion, and writes one response before
//! reading the next (§5's "cooperative event loop" — no concurrent request ever touches the
//! store at the same time, so no lock is needed around `AppState` itself).

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

use crate::operations::{self, AppState};

/// JSON-Schema tool catalog for the ten operations. Mirrors the teacher's `tool_definitions()`
/// shape (name/description/inputSchema triples) with this system's own tool names and schemas.
fn tool_definitions() -> Value {
    json!([
        {
            "name": "indexer.index_project",
            "description": "Build a fresh index for a project root, replacing any prior index for the same project.",
            "inputSchema": {
                "type": "object",
                "properties": { "project_path": { "type": "string" } },
                "required": ["project_path"]
            }
        },
        {
            "name": "indexer.update_index",
            "description": "Reconcile an existing project index with on-disk changes (new, changed, and deleted files).",
            "inputSchema": {
                "type": "object",
                "properties": { "project_path": { "type": "string" } },
                "required": ["project_path"]
            }
        },
        {
            "name": "indexer.watch_project",
            "description": "Start a debounced filesystem watcher on a project root that triggers incremental updates.",
            "inputSchema": {
                "type": "object",
                "properties": { "project_path": { "type": "string" } },
                "required": ["project_path"]
            }
        },
        {
            "name": "indexer.unwatch_project",
            "description": "Stop the active watcher, if any, for a project root.",
            "inputSchema": {
                "type": "object",
                "properties": { "project_path": { "type": "string" } },
                "required": ["project_path"]
            }
        },
        {
            "name": "indexer.clone_and_index",
            "description": "Clone a GitHub repository (full URL or owner/repo shorthand) and index it.",
            "inputSchema": {
                "type": "object",
                "properties": { "github_url": { "type": "string" } },
                "required": ["github_url"]
            }
        },
        {
            "name": "indexer.delete_project",
            "description": "Remove a project's stored index by project id, slug, or root path.",
            "inputSchema": {
                "type": "object",
                "properties": { "project_identifier": { "type": "string" } },
                "required": ["project_identifier"]
            }
        },
        {
            "name": "qa.answer_question",
            "description": "Retrieve relevant context for a natural-language question and return it with retrieval metadata. No language model is wired in; the 'answer' field carries the assembled context.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "question": { "type": "string" },
                    "session_id": { "type": "string" },
                    "project_path": { "type": "string" }
                },
                "required": ["question"]
            }
        },
        {
            "name": "qa.find_relevant_files",
            "description": "Rank project files against a query using keyword IDF, symbol matching, and optional dense similarity.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "query": { "type": "string" },
                    "project_path": { "type": "string" }
                },
                "required": ["query"]
            }
        },
        {
            "name": "qa.list_projects",
            "description": "List all indexed projects known to this store.",
            "inputSchema": { "type": "object", "properties": {} }
        },
        {
            "name": "qa.get_file_content",
            "description": "Read a previously indexed file's content along with its extracted symbols and keywords.",
            "inputSchema": {
                "type": "object",
                "properties": {
                    "file_path": { "type": "string" },
                    "project_path": { "type": "string" }
                },
                "required": ["file_path"]
            }
        }
    ])
}

fn dispatch_tool_call(state: &AppState, tool_name: &str, arguments: &Value) -> Value {
    match tool_name {
        "indexer.index_project" => operations::index_project(state, arguments),
        "indexer.update_index" => operations::update_index(state, arguments),
        "indexer.watch_project" => operations::watch_project(state, arguments),
        "indexer.unwatch_project" => operations::unwatch_project(state, arguments),
        "indexer.clone_and_index" => operations::clone_and_index(state, arguments),
        "indexer.delete_project" => operations::delete_project(state, arguments),
        "qa.answer_question" => operations::answer_question(state, arguments),
        "qa.find_relevant_files" => operations::find_relevant_files(state, arguments),
        "qa.list_projects" => operations::list_projects(state),
        "qa.get_file_content" => operations::get_file_content(state, arguments),
        _ => json!({ "error": format!("unknown tool '{tool_name}'"), "error_kind": "UnknownTool" }),
    }
}

/// Process one JSON-RPC request and return the response. Returns `None` for notifications.
/// The caller is responsible for `initialized`-gating before this is reached.
pub fn dispatch_jsonrpc(state: &AppState, msg: &Value) -> Option<Value> {
    let method = msg["method"].as_str().unwrap_or("");
    let id = msg.get("id").cloned();

    if id.is_none() || method.starts_with("notifications/") {
        return None;
    }

    let response = match method {
        "initialize" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": {
                "protocolVersion": "2025-06-18",
                "capabilities": { "tools": { "listChanged": false } },
                "serverInfo": { "name": "codebase-qa-agent", "version": env!("CARGO_PKG_VERSION") },
                "instructions": "Local code question answering. Call indexer.index_project on a project root first, then qa.answer_question or qa.find_relevant_files to retrieve relevant code."
            }
        }),
        "tools/list" => json!({
            "jsonrpc": "2.0",
            "id": id,
            "result": { "tools": tool_definitions() }
        }),
        "tools/call" => {
            let tool_name = msg["params"]["name"].as_str().unwrap_or("");
            let arguments = msg["params"].get("arguments").cloned().unwrap_or_else(|| json!({}));
            let result = dispatch_tool_call(state, tool_name, &arguments);
            let is_error = result.get("error").is_some();
            let text = serde_json::to_string_pretty(&result).unwrap_or_else(|_| result.to_string());
            json!({
                "jsonrpc": "2.0",
                "id": id,
                "result": {
                    "content": [{ "type": "text", "text": text }],
                    "isError": is_error
                }
            })
        }
        "ping" => json!({ "jsonrpc": "2.0", "id": id, "result": {} }),
        _ => json!({
            "jsonrpc": "2.0",
            "id": id,
            "error": { "code": -32601, "message": "Method not found" }
        }),
    };

    Some(response)
}

/// Run the MCP stdio server loop: read JSON-RPC from stdin, write responses to stdout.
pub fn run_mcp(state: AppState) {
    let stdin = io::stdin();
    let stdout = io::stdout();
    let reader = stdin.lock();
    let mut initialized = false;

    tracing::info!("MCP server ready");

    for line in reader.lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }

        let msg: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(_) => {
                let err = json!({ "jsonrpc": "2.0", "id": null, "error": { "code": -32700, "message": "Parse error" } });
                write_response(&stdout, &err);
                continue;
            }
        };

        let method = msg["method"].as_str().unwrap_or("");

        if method == "notifications/initialized" || method == "notifications/cancelled" {
            continue;
        }

        if !initialized && method != "initialize" && method != "ping" {
            if let Some(id) = msg.get("id").cloned() {
                let err = json!({
                    "jsonrpc": "2.0",
                    "id": id,
                    "error": { "code": -32002, "message": "Server not initialized. Send 'initialize' first." }
                });
                write_response(&stdout, &err);
            }
            continue;
        }

        if let Some(response) = dispatch_jsonrpc(&state, &msg) {
            if method == "initialize" {
                initialized = true;
            }
            write_response(&stdout, &response);
        }
    }
}

fn write_response(stdout: &io::Stdout, value: &Value) {
    let mut out = stdout.lock();
    let _ = writeln!(out, "{}", value);
    let _ = out.flush();
}
