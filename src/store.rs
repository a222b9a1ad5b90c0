use std::path::Path;

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};

use crate::model::Document;
use crate::util::{ensure_directory, now_utc_string};

pub const DB_SCHEMA_VERSION: &str = "0.1.0";

/// SQLite-backed store of extracted documents, keyed by path.
pub struct DocumentStore {
    connection: Connection,
}

impl DocumentStore {
    pub fn open(db_path: &Path) -> Result<Self> {
        if let Some(parent) = db_path.parent() {
            ensure_directory(parent)?;
        }
        let connection = Connection::open(db_path)
            .with_context(|| format!("failed to open {}", db_path.display()))?;
        configure_connection(&connection)?;
        Self::with_connection(connection)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let connection =
            Connection::open_in_memory().context("failed to open in-memory database")?;
        Self::with_connection(connection)
    }

    fn with_connection(connection: Connection) -> Result<Self> {
        ensure_schema(&connection)?;
        Ok(Self { connection })
    }

    /// Inserts the document or replaces the row stored under the same path.
    pub fn put(&self, document: &Document) -> Result<()> {
        self.connection
            .execute(
                "
                INSERT INTO papers (path, text, layout, sha256, indexed_at)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(path) DO UPDATE SET
                  text = excluded.text,
                  layout = excluded.layout,
                  sha256 = excluded.sha256,
                  indexed_at = excluded.indexed_at
                ",
                params![
                    document.path,
                    document.text,
                    document.layout,
                    document.content_hash,
                    now_utc_string()
                ],
            )
            .with_context(|| format!("failed to store document {}", document.path))?;
        Ok(())
    }

    /// All documents in insertion order.
    pub fn get_all(&self) -> Result<Vec<Document>> {
        let mut statement = self
            .connection
            .prepare("SELECT path, text, layout, sha256 FROM papers ORDER BY id")
            .context("failed to prepare document query")?;

        let rows = statement
            .query_map([], |row| {
                Ok(Document {
                    path: row.get(0)?,
                    text: row.get(1)?,
                    layout: row.get(2)?,
                    content_hash: row.get(3)?,
                })
            })
            .context("failed to query documents")?;

        let mut documents = Vec::new();
        for row in rows {
            documents.push(row.context("failed to decode document row")?);
        }
        Ok(documents)
    }

    /// Path of a stored document with this content hash, if any.
    pub fn path_for_hash(&self, content_hash: &str) -> Result<Option<String>> {
        self.connection
            .query_row(
                "SELECT path FROM papers WHERE sha256 = ?1 ORDER BY id LIMIT 1",
                params![content_hash],
                |row| row.get(0),
            )
            .optional()
            .context("failed to look up content hash")
    }

    /// Deletes the row stored under `path`; returns whether one existed.
    pub fn remove(&self, path: &str) -> Result<bool> {
        let deleted = self
            .connection
            .execute("DELETE FROM papers WHERE path = ?1", params![path])
            .with_context(|| format!("failed to remove document {path}"))?;
        Ok(deleted > 0)
    }

    pub fn count(&self) -> Result<i64> {
        let count = self
            .connection
            .query_row("SELECT COUNT(*) FROM papers", [], |row| row.get(0))?;
        Ok(count)
    }

    pub fn distinct_hash_count(&self) -> Result<i64> {
        let count = self.connection.query_row(
            "SELECT COUNT(DISTINCT sha256) FROM papers",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    pub fn schema_version(&self) -> Result<Option<String>> {
        self.connection
            .query_row(
                "SELECT value FROM metadata WHERE key = 'schema_version'",
                [],
                |row| row.get(0),
            )
            .optional()
            .context("failed to read schema version")
    }
}

fn configure_connection(connection: &Connection) -> Result<()> {
    connection
        .pragma_update(None, "journal_mode", "WAL")
        .context("failed to set journal_mode=WAL")?;
    connection
        .pragma_update(None, "synchronous", "NORMAL")
        .context("failed to set synchronous=NORMAL")?;
    Ok(())
}

fn ensure_schema(connection: &Connection) -> Result<()> {
    connection
        .execute_batch(
            "
            CREATE TABLE IF NOT EXISTS metadata (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS papers (
              id INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL,
              path TEXT NOT NULL UNIQUE,
              text TEXT NOT NULL,
              layout TEXT NOT NULL,
              sha256 CHAR(64) NOT NULL,
              indexed_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS papers_sha256_idx ON papers(sha256);
            ",
        )
        .context("failed to create schema")?;

    connection
        .execute(
            "INSERT INTO metadata(key, value) VALUES('schema_version', ?1)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![DB_SCHEMA_VERSION],
        )
        .context("failed to record schema version")?;

    Ok(())
}
