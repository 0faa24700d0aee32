//! The on-disk code index: a SQLite-backed function-name → file-path lookup table plus
//! the stored call-edge table the source-derivation agent traverses. Built once per
//! `validate`/`index` run by walking the codebase and chunking every recognized file;
//! looked up repeatedly afterward without touching the filesystem again.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use chrono::Utc;
use rusqlite::{params, Connection};

use trustbot_profiles::LanguageProfile;

use crate::chunker::chunk_codebase;
use crate::error::IndexError;

#[derive(Debug, Clone, Default)]
pub struct IndexStats {
    pub functions: usize,
    pub files: usize,
    pub duration_seconds: f64,
}

#[derive(Debug, Clone)]
pub struct IndexedFunction {
    pub function_name: String,
    pub file_path: String,
    pub language: String,
    pub class_name: String,
}

#[derive(Debug, Clone)]
pub struct IndexedEdge {
    pub caller: String,
    pub callee: String,
    pub confidence: f64,
}

/// A SQLite-backed index from function name to file path, built by chunking the whole
/// codebase once and queried repeatedly by the source-derivation agent. Rows whose
/// `(function_name, file_path)` pair repeats (a Delphi `interface` forward declaration
/// followed by its `implementation` body) are reconciled rather than duplicated: the
/// later insert fills in `class_name` if the first row didn't have one.
pub struct CodeIndex {
    conn: Mutex<Connection>,
}

const SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS code_index (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        function_name TEXT NOT NULL,
        file_path TEXT NOT NULL,
        language TEXT NOT NULL,
        class_name TEXT,
        last_indexed TEXT,
        UNIQUE(function_name, file_path)
    )";

const CALL_EDGES_SCHEMA: &str = "
    CREATE TABLE IF NOT EXISTS call_edges (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        caller TEXT NOT NULL,
        callee TEXT NOT NULL,
        confidence REAL DEFAULT 1.0,
        UNIQUE(caller, callee)
    )";

impl CodeIndex {
    pub fn open(path: &Path) -> Result<Self, IndexError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, IndexError> {
        let conn = Connection::open_in_memory()?;
        Self::init_schema(&conn)?;
        Ok(Self { conn: Mutex::new(conn) })
    }

    /// Drops the `code_index` table if it still carries the single-column
    /// `function_name TEXT PRIMARY KEY` schema from before a function could appear once
    /// per file it's defined in, then (re)creates both tables under the current schema.
    fn init_schema(conn: &Connection) -> Result<(), IndexError> {
        let existing: Option<String> = conn
            .query_row("SELECT sql FROM sqlite_master WHERE type='table' AND name='code_index'", [], |row| row.get(0))
            .ok();
        if let Some(sql) = existing {
            if sql.contains("function_name TEXT PRIMARY KEY") {
                tracing::info!("migrating code_index to the (function_name, file_path) uniqueness schema");
                conn.execute("DROP TABLE code_index", [])?;
            }
        }

        conn.execute(SCHEMA, [])?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_function_name ON code_index(function_name)", [])?;
        conn.execute("CREATE INDEX IF NOT EXISTS idx_file_path ON code_index(file_path)", [])?;
        conn.execute(CALL_EDGES_SCHEMA, [])?;
        Ok(())
    }

    /// Rebuilds the index from scratch: chunks every file `profiles` recognizes under
    /// `root` and inserts one row per named chunk. A chunk whose `(function_name,
    /// file_path)` pair already exists updates the existing row's `class_name` instead of
    /// erroring, but only when the existing row has none — this is how a Delphi
    /// `interface` declaration and its `implementation` body end up as a single indexed
    /// entry with the class name attached.
    pub fn build(&self, root: &Path, profiles: &HashMap<String, LanguageProfile>) -> Result<IndexStats, IndexError> {
        if !root.exists() {
            return Err(IndexError::RootNotFound(root.display().to_string()));
        }

        let started = std::time::Instant::now();
        let chunks = chunk_codebase(root, profiles);

        let mut conn = self.conn.lock().expect("code index mutex poisoned");
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM code_index", [])?;

        let now = Utc::now().to_rfc3339();
        let mut functions = 0usize;
        let mut files: std::collections::HashSet<&str> = std::collections::HashSet::new();

        for chunk in &chunks {
            files.insert(chunk.file_path.as_str());
            let name = if !chunk.function_name.is_empty() && !chunk.function_name.starts_with('<') {
                chunk.function_name.as_str()
            } else if !chunk.class_name.is_empty() {
                chunk.class_name.as_str()
            } else {
                continue
            };

            let inserted = tx.execute(
                "INSERT INTO code_index (function_name, file_path, language, class_name, last_indexed)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![name, chunk.file_path, chunk.language, chunk.class_name, now],
            );

            match inserted {
                Ok(_) => functions += 1,
                Err(rusqlite::Error::SqliteFailure(e, _)) if e.code == rusqlite::ErrorCode::ConstraintViolation => {
                    if !chunk.class_name.is_empty() {
                        tx.execute(
                            "UPDATE code_index SET class_name = ?1
                             WHERE function_name = ?2 AND file_path = ?3
                               AND (class_name IS NULL OR class_name = '')",
                            params![chunk.class_name, name, chunk.file_path],
                        )?;
                    }
                }
                Err(other) => return Err(other.into()),
            }
        }

        tx.commit()?;
        let duration_seconds = started.elapsed().as_secs_f64();
        tracing::info!(functions, files = files.len(), duration_seconds, "code index built");

        Ok(IndexStats { functions, files: files.len(), duration_seconds })
    }

    /// Resolves a function name to its file path, trying an exact match first and a
    /// case-insensitive one on a miss.
    pub fn lookup(&self, function_name: &str) -> Result<Option<String>, IndexError> {
        let conn = self.conn.lock().expect("code index mutex poisoned");
        let name = function_name.trim();
        let exact: Option<String> = conn
            .query_row("SELECT file_path FROM code_index WHERE function_name = ?1", params![name], |row| row.get(0))
            .ok();
        if exact.is_some() {
            return Ok(exact);
        }
        let ci: Option<String> = conn
            .query_row("SELECT file_path FROM code_index WHERE LOWER(function_name) = LOWER(?1)", params![name], |row| row.get(0))
            .ok();
        Ok(ci)
    }

    pub fn lookup_all(&self, function_names: &[String]) -> Result<HashMap<String, Option<String>>, IndexError> {
        let mut result = HashMap::new();
        for name in function_names {
            result.insert(name.clone(), self.lookup(name)?);
        }
        Ok(result)
    }

    /// Returns every indexed row matching `function_name` (exact match only) — used by
    /// the source-derivation agent to resolve which file and class a callee lives in
    /// before chunking that file to find its own outgoing calls.
    pub fn find(&self, function_name: &str) -> Result<Vec<IndexedFunction>, IndexError> {
        let conn = self.conn.lock().expect("code index mutex poisoned");
        let mut stmt = conn.prepare(
            "SELECT function_name, file_path, language, class_name FROM code_index WHERE function_name = ?1",
        )?;
        let rows = stmt.query_map(params![function_name.trim()], |row| {
            Ok(IndexedFunction {
                function_name: row.get(0)?,
                file_path: row.get(1)?,
                language: row.get(2)?,
                class_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(IndexError::from)
    }

    /// Replaces the stored call-edge table wholesale with `edges`.
    pub fn store_edges(&self, edges: &[(String, String, f64)]) -> Result<usize, IndexError> {
        let mut conn = self.conn.lock().expect("code index mutex poisoned");
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM call_edges", [])?;
        let mut count = 0;
        for (caller, callee, confidence) in edges {
            let inserted = tx.execute(
                "INSERT INTO call_edges (caller, callee, confidence) VALUES (?1, ?2, ?3)",
                params![caller, callee, confidence],
            );
            if inserted.is_ok() {
                count += 1;
            }
        }
        tx.commit()?;
        Ok(count)
    }

    pub fn get_edges(&self) -> Result<Vec<IndexedEdge>, IndexError> {
        let conn = self.conn.lock().expect("code index mutex poisoned");
        let mut stmt = conn.prepare("SELECT caller, callee, confidence FROM call_edges")?;
        let rows = stmt.query_map([], |row| {
            Ok(IndexedEdge { caller: row.get(0)?, callee: row.get(1)?, confidence: row.get(2)? })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(IndexError::from)
    }

    /// Returns the outgoing edges for a single caller — narrower than [`Self::get_edges`],
    /// used where only one function's callees are needed rather than the whole table.
    pub fn edges_from(&self, caller_name: &str) -> Result<Vec<IndexedEdge>, IndexError> {
        let conn = self.conn.lock().expect("code index mutex poisoned");
        let mut stmt = conn.prepare("SELECT caller, callee, confidence FROM call_edges WHERE caller = ?1")?;
        let rows = stmt.query_map(params![caller_name.trim()], |row| {
            Ok(IndexedEdge { caller: row.get(0)?, callee: row.get(1)?, confidence: row.get(2)? })
        })?;
        rows.collect::<Result<Vec<_>, _>>().map_err(IndexError::from)
    }

    /// Enumerates every indexed function, optionally restricted to those whose file path
    /// starts with `prefix` — the backing for project-scope filtering.
    pub fn list(&self, prefix: Option<&str>) -> Result<Vec<IndexedFunction>, IndexError> {
        let conn = self.conn.lock().expect("code index mutex poisoned");
        let map_row = |row: &rusqlite::Row| {
            Ok(IndexedFunction {
                function_name: row.get(0)?,
                file_path: row.get(1)?,
                language: row.get(2)?,
                class_name: row.get::<_, Option<String>>(3)?.unwrap_or_default(),
            })
        };
        match prefix {
            Some(prefix) => {
                let mut stmt = conn.prepare(
                    "SELECT function_name, file_path, language, class_name FROM code_index WHERE file_path LIKE ?1 ESCAPE '\\'",
                )?;
                let like_pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
                let rows = stmt.query_map(params![like_pattern], map_row)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(IndexError::from)
            }
            None => {
                let mut stmt = conn.prepare("SELECT function_name, file_path, language, class_name FROM code_index")?;
                let rows = stmt.query_map([], map_row)?;
                rows.collect::<Result<Vec<_>, _>>().map_err(IndexError::from)
            }
        }
    }

    pub fn db_path(path: &Path) -> PathBuf {
        path.join(".trustbot").join("code_index.db")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use trustbot_profiles::seed_profile;

    fn profiles() -> HashMap<String, LanguageProfile> {
        HashMap::from([("python".to_string(), seed_profile("python").unwrap())])
    }

    #[test]
    fn builds_index_from_codebase_and_looks_up_function() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def foo():\n    pass\n\ndef bar():\n    foo()\n").unwrap();

        let index = CodeIndex::open_in_memory().unwrap();
        let stats = index.build(dir.path(), &profiles()).unwrap();
        assert_eq!(stats.functions, 2);
        assert_eq!(index.lookup("foo").unwrap().as_deref(), Some("a.py"));
    }

    #[test]
    fn lookup_falls_back_to_case_insensitive_match() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("a.py"), "def Foo():\n    pass\n").unwrap();

        let index = CodeIndex::open_in_memory().unwrap();
        index.build(dir.path(), &profiles()).unwrap();
        assert_eq!(index.lookup("foo").unwrap().as_deref(), Some("a.py"));
    }

    #[test]
    fn forward_declaration_then_implementation_merges_into_one_row_with_class_name() {
        let dir = tempdir().unwrap();
        std::fs::write(
            dir.path().join("unit1.pas"),
            "unit Unit1;\ninterface\nprocedure DoThing;\nimplementation\nprocedure TForm1.DoThing;\nbegin\nend;\n",
        )
        .unwrap();
        let profiles = HashMap::from([("delphi".to_string(), seed_profile("delphi").unwrap())]);

        let index = CodeIndex::open_in_memory().unwrap();
        index.build(dir.path(), &profiles).unwrap();
        let rows = index.find("DoThing").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].class_name, "TForm1");
    }

    #[test]
    fn store_and_get_edges_round_trips() {
        let index = CodeIndex::open_in_memory().unwrap();
        let stored = index
            .store_edges(&[("Main".to_string(), "Helper".to_string(), 0.9)])
            .unwrap();
        assert_eq!(stored, 1);
        let edges = index.get_edges().unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].caller, "Main");
    }

    #[test]
    fn list_filters_by_file_path_prefix() {
        let dir = tempdir().unwrap();
        std::fs::create_dir(dir.path().join("pkg_a")).unwrap();
        std::fs::create_dir(dir.path().join("pkg_b")).unwrap();
        std::fs::write(dir.path().join("pkg_a/a.py"), "def foo():\n    pass\n").unwrap();
        std::fs::write(dir.path().join("pkg_b/b.py"), "def bar():\n    pass\n").unwrap();

        let index = CodeIndex::open_in_memory().unwrap();
        index.build(dir.path(), &profiles()).unwrap();

        assert_eq!(index.list(None).unwrap().len(), 2);
        let scoped = index.list(Some("pkg_a")).unwrap();
        assert_eq!(scoped.len(), 1);
        assert_eq!(scoped[0].function_name, "foo");
    }

    #[test]
    fn edges_from_returns_only_the_given_caller() {
        let index = CodeIndex::open_in_memory().unwrap();
        index
            .store_edges(&[
                ("Main".to_string(), "Helper".to_string(), 0.9),
                ("Other".to_string(), "Helper".to_string(), 0.9),
            ])
            .unwrap();
        let edges = index.edges_from("Main").unwrap();
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].callee, "Helper");
    }

    #[test]
    fn build_errors_on_missing_root() {
        let index = CodeIndex::open_in_memory().unwrap();
        let missing = PathBuf::from("/nonexistent/path/for/trustbot/tests");
        assert!(index.build(&missing, &profiles()).is_err());
    }
}
