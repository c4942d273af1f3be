// 🗜️ Archive-backed storage
// One SQLite file holds every blob of the container (WAL for crash recovery).
// The connection sits behind a mutex so read-only passes can share one archive.

use super::{nesting_conflict, validate_path, Storage};
use crate::error::{ContainerError, OperationContext, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct ArchiveStorage {
    conn: Mutex<Connection>,
}

impl ArchiveStorage {
    /// Open (and create if missing) an archive file.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let conn = Connection::open(path).op_context(|| format!("opening archive {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")
            .op_context(|| "enabling WAL mode".to_string())?;
        Self::from_connection(conn)
    }

    /// Archive living only in memory, used by tests and dry runs.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().op_context(|| "opening in-memory archive".to_string())?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        setup_archive(&conn)?;
        Ok(ArchiveStorage { conn: Mutex::new(conn) })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panicking statement leaves no half-applied state behind in SQLite
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn contains(conn: &Connection, path: &str) -> Result<bool> {
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM entries WHERE path = ?1",
            params![path],
            |row| row.get(0),
        )
        .op_context(|| format!("checking {}", path))?;
    Ok(count > 0)
}

fn has_children(conn: &Connection, path: &str) -> Result<bool> {
    let prefix = format!("{}/", path);
    let count: i64 = conn
        .query_row(
            "SELECT COUNT(*) FROM entries WHERE substr(path, 1, length(?1)) = ?1",
            params![prefix],
            |row| row.get(0),
        )
        .op_context(|| format!("checking below {}", path))?;
    Ok(count > 0)
}

fn setup_archive(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS entries (
            path TEXT PRIMARY KEY NOT NULL,
            content BLOB NOT NULL,
            written_at DATETIME DEFAULT CURRENT_TIMESTAMP
        )",
        [],
    )
    .op_context(|| "creating entries table".to_string())?;
    Ok(())
}

impl Storage for ArchiveStorage {
    fn read(&self, path: &str) -> Result<Vec<u8>> {
        validate_path(path)?;
        self.conn()
            .query_row(
                "SELECT content FROM entries WHERE path = ?1",
                params![path],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
            .op_context(|| format!("reading {}", path))?
            .ok_or_else(|| ContainerError::not_found(path))
    }

    fn write(&mut self, path: &str, content: &[u8]) -> Result<()> {
        validate_path(path)?;
        let conn = self.conn();
        nesting_conflict(path, |parent| contains(&conn, parent), has_children(&conn, path)?)?;
        conn.execute(
            "INSERT OR REPLACE INTO entries (path, content) VALUES (?1, ?2)",
            params![path, content],
        )
        .op_context(|| format!("writing {}", path))?;
        Ok(())
    }

    fn remove(&mut self, path: &str) -> Result<()> {
        validate_path(path)?;
        let removed = self
            .conn()
            .execute("DELETE FROM entries WHERE path = ?1", params![path])
            .op_context(|| format!("removing {}", path))?;
        if removed == 0 {
            return Err(ContainerError::not_found(path));
        }
        Ok(())
    }

    fn exists(&self, path: &str) -> Result<bool> {
        validate_path(path)?;
        contains(&self.conn(), path)
    }

    fn list_paths(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn
            .prepare("SELECT path FROM entries ORDER BY path")
            .op_context(|| "listing archive entries".to_string())?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .op_context(|| "listing archive entries".to_string())?;

        let mut paths = Vec::new();
        for row in rows {
            paths.push(row.op_context(|| "listing archive entries".to_string())?);
        }
        Ok(paths)
    }
}
