//! Per-project durable SQLite store, plus a shared session log.
//!
//! Schema and replace-on-save semantics are grounded in the original Python `storage.py`
//! (`meta`/`files`/`chunks`/`symbols`/`keyword_files` tables, WAL journaling, corruption ->
//! delete-and-absent), redesigned per SPEC_FULL.md §4.3/§9 from one global `index.db` into one
//! file per project under `projects/<project_id>.db`, plus a separate shared `sessions.db`.
//! Connection and transaction handling follows the teacher's rusqlite idiom (`sqlite.rs`),
//! simplified to synchronous calls since this crate has no async runtime.

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{QaError, Result};
use crate::types::{
    Chunk, FileEntry, ProjectIndex, ProjectSummary, SessionTurn, SymbolKind, SymbolLocation,
};

const SCHEMA_VERSION: i64 = 1;

const PROJECT_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS meta (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS files (
    rel_path TEXT PRIMARY KEY,
    extension TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    last_modified REAL NOT NULL,
    keywords TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS chunks (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    rel_path TEXT NOT NULL REFERENCES files(rel_path) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    start_line INTEGER NOT NULL,
    end_line INTEGER NOT NULL,
    content TEXT NOT NULL,
    symbol_name TEXT
);

CREATE TABLE IF NOT EXISTS symbols (
    name TEXT NOT NULL,
    rel_path TEXT NOT NULL REFERENCES files(rel_path) ON DELETE CASCADE,
    line INTEGER NOT NULL,
    type TEXT NOT NULL,
    PRIMARY KEY (name, rel_path, line)
);

CREATE TABLE IF NOT EXISTS keyword_files (
    keyword TEXT NOT NULL,
    rel_path TEXT NOT NULL REFERENCES files(rel_path) ON DELETE CASCADE,
    PRIMARY KEY (keyword, rel_path)
);

CREATE TABLE IF NOT EXISTS embeddings (
    rel_path TEXT NOT NULL,
    chunk_index INTEGER NOT NULL,
    vector BLOB NOT NULL,
    PRIMARY KEY (rel_path, chunk_index)
);

CREATE INDEX IF NOT EXISTS idx_chunks_rel_path ON chunks(rel_path);
CREATE INDEX IF NOT EXISTS idx_symbols_name ON symbols(name);
CREATE INDEX IF NOT EXISTS idx_keyword_files_keyword ON keyword_files(keyword);
"#;

const SESSION_SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS turns (
    session_id TEXT NOT NULL,
    turn_index INTEGER NOT NULL,
    question TEXT NOT NULL,
    answer TEXT NOT NULL,
    relevant_files TEXT NOT NULL,
    created_at REAL NOT NULL,
    PRIMARY KEY (session_id, turn_index)
);
"#;

/// A chunk vector as persisted/loaded by `save_embeddings`/`load_embeddings`.
pub struct EmbeddingRow {
    pub rel_path: String,
    pub chunk_index: u32,
    pub vector: Vec<f32>,
}

#[derive(Clone)]
pub struct Store {
    base_dir: PathBuf,
}

impl Store {
    pub fn new(base_dir: PathBuf) -> Self {
        Store { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn projects_dir(&self) -> PathBuf {
        self.base_dir.join("projects")
    }

    pub fn repos_dir(&self) -> PathBuf {
        self.base_dir.join("repos")
    }

    fn project_db_path(&self, project_id: &str) -> PathBuf {
        self.projects_dir().join(format!("{project_id}.db"))
    }

    fn sessions_db_path(&self) -> PathBuf {
        self.base_dir.join("sessions.db")
    }

    fn open(path: &Path) -> rusqlite::Result<Connection> {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(conn)
    }

    // -- index persistence ---------------------------------------------------

    /// Atomically replace the project's stored index: delete all rows, then reinsert, in one
    /// transaction. On commit failure the prior state is preserved (the transaction rolls back).
    pub fn save_index(&self, index: &ProjectIndex) -> Result<()> {
        let path = self.project_db_path(&index.project_id);
        let mut conn = Self::open(&path).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        conn.execute_batch(PROJECT_SCHEMA)
            .map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;

        let tx = conn.transaction().map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        tx.execute("DELETE FROM chunks", []).map_err(sqlite_err)?;
        tx.execute("DELETE FROM symbols", []).map_err(sqlite_err)?;
        tx.execute("DELETE FROM keyword_files", []).map_err(sqlite_err)?;
        tx.execute("DELETE FROM files", []).map_err(sqlite_err)?;

        tx.execute(
            "INSERT OR REPLACE INTO meta VALUES ('schema_version', ?1)",
            params![SCHEMA_VERSION.to_string()],
        )
        .map_err(sqlite_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO meta VALUES ('project_root', ?1)",
            params![index.project_root],
        )
        .map_err(sqlite_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO meta VALUES ('indexed_at', ?1)",
            params![index.indexed_at.to_string()],
        )
        .map_err(sqlite_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO meta VALUES ('total_files', ?1)",
            params![index.total_files().to_string()],
        )
        .map_err(sqlite_err)?;
        tx.execute("INSERT OR REPLACE INTO meta VALUES ('slug', ?1)", params![index.slug])
            .map_err(sqlite_err)?;
        tx.execute(
            "INSERT OR REPLACE INTO meta VALUES ('project_id', ?1)",
            params![index.project_id],
        )
        .map_err(sqlite_err)?;

        for (rel_path, entry) in &index.file_index {
            let keywords_json =
                serde_json::to_string(&entry.keywords).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
            tx.execute(
                "INSERT INTO files VALUES (?1, ?2, ?3, ?4, ?5)",
                params![rel_path, entry.extension, entry.size_bytes, entry.last_modified, keywords_json],
            )
            .map_err(sqlite_err)?;

            for chunk in &entry.chunks {
                tx.execute(
                    "INSERT INTO chunks (rel_path, chunk_index, start_line, end_line, content, symbol_name)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![rel_path, chunk.chunk_index, chunk.start_line, chunk.end_line, chunk.content, chunk.symbol],
                )
                .map_err(sqlite_err)?;
            }
        }

        for (name, locations) in &index.symbol_map {
            for loc in locations {
                tx.execute(
                    "INSERT OR REPLACE INTO symbols VALUES (?1, ?2, ?3, ?4)",
                    params![name, loc.file, loc.line, loc.kind.as_str()],
                )
                .map_err(sqlite_err)?;
            }
        }

        for (keyword, rel_paths) in &index.keyword_map {
            for rel_path in rel_paths {
                tx.execute(
                    "INSERT OR REPLACE INTO keyword_files VALUES (?1, ?2)",
                    params![keyword, rel_path],
                )
                .map_err(sqlite_err)?;
            }
        }

        tx.commit().map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        Ok(())
    }

    /// Resolve `identifier` (project_id, or slug, or project root path; empty means "most
    /// recently indexed project"), verify schema version, and reconstruct the in-memory index.
    /// On any corruption the offending database file is deleted and `Ok(None)` is returned.
    pub fn load_index(&self, identifier: &str) -> Result<Option<ProjectIndex>> {
        let Some(project_id) = self.resolve_project_id(identifier)? else {
            return Ok(None);
        };
        let path = self.project_db_path(&project_id);
        if !path.exists() {
            return Ok(None);
        }

        match self.load_index_from_path(&path) {
            Ok(Some(index)) => Ok(Some(index)),
            Ok(None) => {
                let _ = std::fs::remove_file(&path);
                Ok(None)
            }
            Err(_) => {
                let _ = std::fs::remove_file(&path);
                Ok(None)
            }
        }
    }

    fn load_index_from_path(&self, path: &Path) -> rusqlite::Result<Option<ProjectIndex>> {
        let conn = Self::open(path)?;

        let schema_version: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key='schema_version'", [], |r| r.get(0))
            .optional()?;
        let Some(schema_version) = schema_version else { return Ok(None) };
        if schema_version.parse::<i64>().unwrap_or(-1) != SCHEMA_VERSION {
            return Ok(None);
        }

        let project_root: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key='project_root'", [], |r| r.get(0))
            .optional()?;
        let indexed_at: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key='indexed_at'", [], |r| r.get(0))
            .optional()?;
        let slug: Option<String> =
            conn.query_row("SELECT value FROM meta WHERE key='slug'", [], |r| r.get(0)).optional()?;
        let project_id: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key='project_id'", [], |r| r.get(0))
            .optional()?;

        let (Some(project_root), Some(indexed_at), Some(slug), Some(project_id)) =
            (project_root, indexed_at, slug, project_id)
        else {
            return Ok(None);
        };
        let Ok(indexed_at) = indexed_at.parse::<f64>() else { return Ok(None) };

        let mut index = ProjectIndex {
            project_root,
            project_id,
            slug,
            indexed_at,
            ..Default::default()
        };

        let mut files_stmt = conn.prepare(
            "SELECT rel_path, extension, size_bytes, last_modified, keywords FROM files",
        )?;
        let file_rows = files_stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, u64>(2)?,
                r.get::<_, f64>(3)?,
                r.get::<_, String>(4)?,
            ))
        })?;

        let mut chunks_stmt = conn.prepare(
            "SELECT chunk_index, start_line, end_line, content, symbol_name FROM chunks
             WHERE rel_path = ?1 ORDER BY chunk_index",
        )?;
        let mut symbols_stmt = conn.prepare("SELECT name FROM symbols WHERE rel_path = ?1")?;

        for row in file_rows {
            let (rel_path, extension, size_bytes, last_modified, keywords_json) = row?;
            let keywords: Vec<String> = serde_json::from_str(&keywords_json).map_err(|_| {
                rusqlite::Error::FromSqlConversionFailure(
                    0,
                    rusqlite::types::Type::Text,
                    "invalid keywords JSON".into(),
                )
            })?;

            let chunks: Vec<Chunk> = chunks_stmt
                .query_map(params![rel_path], |r| {
                    Ok(Chunk {
                        chunk_index: r.get(0)?,
                        start_line: r.get(1)?,
                        end_line: r.get(2)?,
                        content: r.get(3)?,
                        symbol: r.get(4)?,
                    })
                })?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            let symbols: Vec<String> = symbols_stmt
                .query_map(params![rel_path], |r| r.get::<_, String>(0))?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            index.file_index.insert(
                rel_path,
                FileEntry { extension, size_bytes, last_modified, keywords, chunks, symbols },
            );
        }

        let mut keyword_stmt = conn.prepare("SELECT keyword, rel_path FROM keyword_files")?;
        let keyword_rows = keyword_stmt.query_map([], |r| {
            Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?))
        })?;
        for row in keyword_rows {
            let (keyword, rel_path) = row?;
            index.keyword_map.entry(keyword).or_default().push(rel_path);
        }

        let mut symbol_stmt = conn.prepare("SELECT name, rel_path, line, type FROM symbols")?;
        let symbol_rows = symbol_stmt.query_map([], |r| {
            Ok((
                r.get::<_, String>(0)?,
                r.get::<_, String>(1)?,
                r.get::<_, u32>(2)?,
                r.get::<_, String>(3)?,
            ))
        })?;
        for row in symbol_rows {
            let (name, rel_path, line, kind_str) = row?;
            let kind = kind_str.parse::<SymbolKind>().unwrap_or(SymbolKind::Type);
            index.symbol_map.entry(name).or_default().push(SymbolLocation { file: rel_path, line, kind });
        }

        Ok(Some(index))
    }

    /// Enumerate known projects. Entries whose meta is unreadable are silently omitted.
    pub fn list_projects(&self) -> Result<Vec<ProjectSummary>> {
        let dir = self.projects_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut summaries = Vec::new();
        let entries = std::fs::read_dir(&dir).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("db") {
                continue;
            }
            if let Ok(Some(summary)) = self.read_summary(&path) {
                summaries.push(summary);
            }
        }
        summaries.sort_by(|a, b| b.indexed_at.partial_cmp(&a.indexed_at).unwrap_or(std::cmp::Ordering::Equal));
        Ok(summaries)
    }

    fn read_summary(&self, path: &Path) -> rusqlite::Result<Option<ProjectSummary>> {
        let conn = Self::open(path)?;
        let project_id: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key='project_id'", [], |r| r.get(0))
            .optional()?;
        let slug: Option<String> =
            conn.query_row("SELECT value FROM meta WHERE key='slug'", [], |r| r.get(0)).optional()?;
        let project_root: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key='project_root'", [], |r| r.get(0))
            .optional()?;
        let indexed_at: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key='indexed_at'", [], |r| r.get(0))
            .optional()?;
        let total_files: Option<String> = conn
            .query_row("SELECT value FROM meta WHERE key='total_files'", [], |r| r.get(0))
            .optional()?;

        let (Some(project_id), Some(slug), Some(project_root), Some(indexed_at), Some(total_files)) =
            (project_id, slug, project_root, indexed_at, total_files)
        else {
            return Ok(None);
        };

        Ok(Some(ProjectSummary {
            project_id,
            slug,
            project_root,
            indexed_at: indexed_at.parse().unwrap_or(0.0),
            total_files: total_files.parse().unwrap_or(0),
        }))
    }

    /// Remove the matching project database. Returns whether anything matched.
    pub fn delete_project(&self, identifier: &str) -> Result<bool> {
        let Some(project_id) = self.resolve_project_id(identifier)? else { return Ok(false) };
        let path = self.project_db_path(&project_id);
        if !path.exists() {
            return Ok(false);
        }
        std::fs::remove_file(&path).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        let wal = path.with_extension("db-wal");
        let shm = path.with_extension("db-shm");
        let _ = std::fs::remove_file(wal);
        let _ = std::fs::remove_file(shm);
        Ok(true)
    }

    /// Resolve `identifier` (project_id, slug, or project root path; empty = most recent) to a
    /// concrete `project_id`, or `None` if nothing matches.
    pub fn resolve(&self, identifier: &str) -> Result<Option<ProjectSummary>> {
        let Some(project_id) = self.resolve_project_id(identifier)? else { return Ok(None) };
        let path = self.project_db_path(&project_id);
        if !path.exists() {
            return Ok(None);
        }
        self.read_summary(&path).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })
    }

    fn resolve_project_id(&self, identifier: &str) -> Result<Option<String>> {
        if identifier.is_empty() {
            let projects = self.list_projects()?;
            return Ok(projects.into_iter().next().map(|p| p.project_id));
        }

        let candidate_path = self.project_db_path(identifier);
        if candidate_path.exists() {
            return Ok(Some(identifier.to_string()));
        }

        for summary in self.list_projects()? {
            if summary.slug == identifier || summary.project_root == identifier {
                return Ok(Some(summary.project_id));
            }
        }
        Ok(None)
    }

    // -- embeddings -----------------------------------------------------------

    pub fn save_embeddings(&self, project_id: &str, rows: &[EmbeddingRow]) -> Result<()> {
        let path = self.project_db_path(project_id);
        let mut conn = Self::open(&path).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        conn.execute_batch(PROJECT_SCHEMA).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;

        let tx = conn.transaction().map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        tx.execute("DELETE FROM embeddings", []).map_err(sqlite_err)?;
        for row in rows {
            let blob = vector_to_blob(&row.vector);
            tx.execute(
                "INSERT OR REPLACE INTO embeddings VALUES (?1, ?2, ?3)",
                params![row.rel_path, row.chunk_index, blob],
            )
            .map_err(sqlite_err)?;
        }
        tx.commit().map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        Ok(())
    }

    pub fn load_embeddings(&self, project_id: &str) -> Result<Vec<EmbeddingRow>> {
        let path = self.project_db_path(project_id);
        if !path.exists() {
            return Ok(Vec::new());
        }
        let conn = Self::open(&path).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        let mut stmt = conn
            .prepare("SELECT rel_path, chunk_index, vector FROM embeddings")
            .map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        let rows = stmt
            .query_map([], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, u32>(1)?, r.get::<_, Vec<u8>>(2)?))
            })
            .map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;

        let mut out = Vec::new();
        for row in rows {
            let (rel_path, chunk_index, blob) = row.map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
            out.push(EmbeddingRow { rel_path, chunk_index, vector: blob_to_vector(&blob) });
        }
        Ok(out)
    }

    // -- sessions (shared across projects) -------------------------------------

    pub fn save_session_turn(
        &self,
        session_id: &str,
        question: &str,
        answer: &str,
        relevant_files: &[String],
    ) -> Result<u32> {
        let path = self.sessions_db_path();
        let mut conn = Self::open(&path).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        conn.execute_batch(SESSION_SCHEMA).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;

        let tx = conn.transaction().map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        let next_index: i64 = tx
            .query_row(
                "SELECT COALESCE(MAX(turn_index) + 1, 0) FROM turns WHERE session_id = ?1",
                params![session_id],
                |r| r.get(0),
            )
            .map_err(sqlite_err)?;

        let files_json =
            serde_json::to_string(relevant_files).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        let created_at = now_seconds();
        tx.execute(
            "INSERT INTO turns VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![session_id, next_index, question, answer, files_json, created_at],
        )
        .map_err(sqlite_err)?;
        tx.commit().map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        Ok(next_index as u32)
    }

    pub fn load_session(&self, session_id: &str, max_turns: usize) -> Result<Vec<SessionTurn>> {
        let path = self.sessions_db_path();
        if !path.exists() {
            return Ok(Vec::new());
        }
        let conn = Self::open(&path).map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        let _ = conn.execute_batch(SESSION_SCHEMA);

        let mut stmt = conn
            .prepare(
                "SELECT turn_index, question, answer, relevant_files, created_at FROM turns
                 WHERE session_id = ?1 ORDER BY turn_index DESC LIMIT ?2",
            )
            .map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
        let rows = stmt
            .query_map(params![session_id, max_turns as i64], |r| {
                let files_json: String = r.get(3)?;
                Ok((
                    r.get::<_, u32>(0)?,
                    r.get::<_, String>(1)?,
                    r.get::<_, String>(2)?,
                    files_json,
                    r.get::<_, f64>(4)?,
                ))
            })
            .map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;

        let mut turns = Vec::new();
        for row in rows {
            let (turn_index, question, answer, files_json, created_at) =
                row.map_err(|e| QaError::StoreCorrupt { reason: e.to_string() })?;
            let relevant_files: Vec<String> = serde_json::from_str(&files_json).unwrap_or_default();
            turns.push(SessionTurn { turn_index, question, answer, relevant_files, created_at });
        }
        turns.reverse();
        Ok(turns)
    }
}

fn sqlite_err(e: rusqlite::Error) -> QaError {
    QaError::StoreCorrupt { reason: e.to_string() }
}

fn now_seconds() -> f64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn blob_to_vector(blob: &[u8]) -> Vec<f32> {
    blob.chunks_exact(4).map(|c| f32::from_le_bytes([c[0], c[1], c[2], c[3]])).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_index(project_id: &str) -> ProjectIndex {
        let mut file_index = BTreeMap::new();
        file_index.insert(
            "src/main.rs".to_string(),
            FileEntry {
                extension: "rs".to_string(),
                size_bytes: 42,
                last_modified: 100.0,
                keywords: vec!["main".to_string()],
                chunks: vec![Chunk {
                    chunk_index: 0,
                    start_line: 1,
                    end_line: 3,
                    content: "fn main() {}".to_string(),
                    symbol: Some("main".to_string()),
                }],
                symbols: vec!["main".to_string()],
            },
        );

        let mut symbol_map = BTreeMap::new();
        symbol_map.insert(
            "main".to_string(),
            vec![SymbolLocation { file: "src/main.rs".to_string(), line: 1, kind: SymbolKind::Function }],
        );

        let mut keyword_map = BTreeMap::new();
        keyword_map.insert("main".to_string(), vec!["src/main.rs".to_string()]);

        ProjectIndex {
            project_root: "/tmp/widgets".to_string(),
            project_id: project_id.to_string(),
            slug: "widgets".to_string(),
            indexed_at: 1000.0,
            file_index,
            keyword_map,
            symbol_map,
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        let index = sample_index("widgets_abc123def456");
        store.save_index(&index).unwrap();

        let loaded = store.load_index("widgets_abc123def456").unwrap().unwrap();
        assert_eq!(loaded.project_root, "/tmp/widgets");
        assert_eq!(loaded.total_files(), 1);
        assert_eq!(loaded.file_index["src/main.rs"].keywords, vec!["main".to_string()]);
        assert_eq!(loaded.symbol_map["main"][0].line, 1);
    }

    #[test]
    fn resolve_by_slug_and_root() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        store.save_index(&sample_index("widgets_abc123def456")).unwrap();

        assert_eq!(store.resolve("widgets").unwrap().unwrap().project_id, "widgets_abc123def456");
        assert_eq!(store.resolve("/tmp/widgets").unwrap().unwrap().project_id, "widgets_abc123def456");
        assert!(store.resolve("nonexistent").unwrap().is_none());
    }

    #[test]
    fn empty_identifier_resolves_most_recent() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        let mut older = sample_index("a_111111111111");
        older.indexed_at = 10.0;
        let mut newer = sample_index("b_222222222222");
        newer.indexed_at = 20.0;
        store.save_index(&older).unwrap();
        store.save_index(&newer).unwrap();

        let resolved = store.resolve("").unwrap().unwrap();
        assert_eq!(resolved.project_id, "b_222222222222");
    }

    #[test]
    fn schema_mismatch_treated_as_absent_and_file_removed() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        let path = store.project_db_path("stale_000000000000");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        let conn = Connection::open(&path).unwrap();
        conn.execute_batch(PROJECT_SCHEMA).unwrap();
        conn.execute(
            "INSERT OR REPLACE INTO meta VALUES ('schema_version', '999')",
            [],
        )
        .unwrap();
        drop(conn);

        let loaded = store.load_index("stale_000000000000").unwrap();
        assert!(loaded.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn corrupt_database_is_deleted_and_returns_absent() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        let path = store.project_db_path("broken_000000000000");
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(&path, b"not a sqlite file at all").unwrap();

        let loaded = store.load_index("broken_000000000000").unwrap();
        assert!(loaded.is_none());
        assert!(!path.exists());
    }

    #[test]
    fn delete_project_removes_file_and_reports_match() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        store.save_index(&sample_index("widgets_abc123def456")).unwrap();

        assert!(store.delete_project("widgets").unwrap());
        assert!(store.load_index("widgets_abc123def456").unwrap().is_none());
        assert!(!store.delete_project("widgets").unwrap());
    }

    #[test]
    fn list_projects_sorted_most_recent_first() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        let mut older = sample_index("a_111111111111");
        older.indexed_at = 10.0;
        let mut newer = sample_index("b_222222222222");
        newer.indexed_at = 20.0;
        store.save_index(&older).unwrap();
        store.save_index(&newer).unwrap();

        let projects = store.list_projects().unwrap();
        assert_eq!(projects[0].project_id, "b_222222222222");
        assert_eq!(projects[1].project_id, "a_111111111111");
    }

    #[test]
    fn embeddings_round_trip() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        store.save_index(&sample_index("widgets_abc123def456")).unwrap();

        let rows = vec![EmbeddingRow {
            rel_path: "src/main.rs".to_string(),
            chunk_index: 0,
            vector: vec![0.1, 0.2, 0.3],
        }];
        store.save_embeddings("widgets_abc123def456", &rows).unwrap();
        let loaded = store.load_embeddings("widgets_abc123def456").unwrap();
        assert_eq!(loaded.len(), 1);
        assert!((loaded[0].vector[0] - 0.1).abs() < 1e-6);
    }

    #[test]
    fn session_turns_append_with_dense_monotonic_index() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());

        let i0 = store.save_session_turn("s1", "q1", "a1", &["f1.rs".to_string()]).unwrap();
        let i1 = store.save_session_turn("s1", "q2", "a2", &[]).unwrap();
        assert_eq!(i0, 0);
        assert_eq!(i1, 1);

        let turns = store.load_session("s1", 10).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].question, "q1");
        assert_eq!(turns[1].question, "q2");
    }

    #[test]
    fn load_session_respects_max_turns_keeping_chronological_order() {
        let dir = TempDir::new().unwrap();
        let store = Store::new(dir.path().to_path_buf());
        for i in 0..5 {
            store.save_session_turn("s1", &format!("q{i}"), &format!("a{i}"), &[]).unwrap();
        }
        let turns = store.load_session("s1", 2).unwrap();
        assert_eq!(turns.len(), 2);
        assert_eq!(turns[0].question, "q3");
        assert_eq!(turns[1].question, "q4");
    }
}
