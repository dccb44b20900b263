//! SQLite Store
//!
//! Persistence for catalogue items and generated documents:
//! - Connection pooling via r2d2 for concurrent workers
//! - WAL mode for read/write concurrency
//! - Bulk-replace semantics for an outline's derived items
//! - Append semantics for documents and their source references

use std::path::Path;
use std::str::FromStr;

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::params;
use uuid::Uuid;

use super::DocumentStore;
use crate::types::{DocError, GeneratedArtifact, PendingItem, Result};

const SCHEMA: &str = include_str!("schema.sql");

/// Pool sizing for the store
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_size: u32,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self { max_size: 8 }
    }
}

/// SQLite-backed document store
pub struct SqliteStore {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteStore {
    /// Open (or create) the store at `path`
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::open_with(path, PoolConfig::default())
    }

    pub fn open_with(path: impl AsRef<Path>, config: PoolConfig) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path).with_init(|conn| {
            conn.execute_batch(
                "PRAGMA journal_mode = WAL;
                 PRAGMA synchronous = NORMAL;
                 PRAGMA foreign_keys = ON;",
            )
        });
        let pool = Pool::builder()
            .max_size(config.max_size)
            .build(manager)
            .map_err(|e| DocError::Storage(format!("failed to build pool: {e}")))?;

        let store = Self { pool };
        store.conn()?.execute_batch(SCHEMA)?;
        Ok(store)
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        self.pool
            .get()
            .map_err(|e| DocError::Storage(format!("failed to get connection: {e}")))
    }

    /// Fetch one document by item id (mainly for tests and reporting)
    pub fn document_for_item(&self, item_id: Uuid) -> Result<Option<GeneratedArtifact>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, item_id, title, content, summary, metadata, created_at
             FROM documents WHERE item_id = ?1",
        )?;
        let mut rows = stmt.query(params![item_id.to_string()])?;
        let Some(row) = rows.next()? else {
            return Ok(None);
        };
        let id: String = row.get(0)?;
        let item: String = row.get(1)?;
        let metadata: String = row.get(5)?;
        let created_at: String = row.get(6)?;
        Ok(Some(GeneratedArtifact {
            id: parse_uuid(&id)?,
            item_id: parse_uuid(&item)?,
            title: row.get(2)?,
            content: row.get(3)?,
            summary: row.get(4)?,
            metadata: serde_json::from_str(&metadata)?,
            source_files: Vec::new(),
            created_at: created_at
                .parse()
                .map_err(|e| DocError::Storage(format!("bad created_at: {e}")))?,
        }))
    }
}

fn parse_uuid(s: &str) -> Result<Uuid> {
    Uuid::from_str(s).map_err(|e| DocError::Storage(format!("bad uuid '{s}': {e}")))
}

impl DocumentStore for SqliteStore {
    fn replace_outline_items(&self, scope: &str, items: &[PendingItem]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM catalogue_items WHERE scope = ?1", params![scope])?;
        for item in items {
            tx.execute(
                "INSERT INTO catalogue_items
                 (id, scope, name, title, authoring_prompt, parent_id, ord, completed)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                params![
                    item.id.to_string(),
                    item.scope,
                    item.name,
                    item.title,
                    item.authoring_prompt,
                    item.parent_id.map(|id| id.to_string()),
                    item.order,
                    item.completed,
                ],
            )?;
        }
        tx.commit()?;
        Ok(items.len())
    }

    fn pending_items(&self, scope: &str) -> Result<Vec<PendingItem>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, scope, name, title, authoring_prompt, parent_id, ord, completed
             FROM catalogue_items WHERE scope = ?1 AND completed = 0 ORDER BY ord",
        )?;
        let rows = stmt.query_map(params![scope], |row| {
            let id: String = row.get(0)?;
            let parent: Option<String> = row.get(5)?;
            Ok((
                id,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
                row.get::<_, String>(3)?,
                row.get::<_, String>(4)?,
                parent,
                row.get::<_, i64>(6)?,
                row.get::<_, bool>(7)?,
            ))
        })?;

        let mut items = Vec::new();
        for row in rows {
            let (id, scope, name, title, authoring_prompt, parent, order, completed) = row?;
            items.push(PendingItem {
                id: parse_uuid(&id)?,
                scope,
                name,
                title,
                authoring_prompt,
                parent_id: parent.as_deref().map(parse_uuid).transpose()?,
                order,
                completed,
            });
        }
        Ok(items)
    }

    fn insert_artifact(&self, artifact: &GeneratedArtifact) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO documents (id, item_id, title, content, summary, metadata, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                artifact.id.to_string(),
                artifact.item_id.to_string(),
                artifact.title,
                artifact.content,
                artifact.summary,
                serde_json::to_string(&artifact.metadata)?,
                artifact.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn append_source_refs(&self, document_id: Uuid, files: &[String]) -> Result<()> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        for file in files {
            tx.execute(
                "INSERT INTO document_sources (document_id, file_path) VALUES (?1, ?2)",
                params![document_id.to_string(), file],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn mark_completed(&self, item_id: Uuid) -> Result<()> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE catalogue_items SET completed = 1 WHERE id = ?1",
            params![item_id.to_string()],
        )?;
        if updated == 0 {
            return Err(DocError::Storage(format!(
                "mark_completed: no catalogue item with id {item_id}"
            )));
        }
        Ok(())
    }
}
