// ABOUTME: SQLite-backed single logical table holding every record category under a (category, id) key.
// ABOUTME: Rows keep the typed record as a JSON body plus an indexed parent_id column for child lookups.

use std::path::{Path, PathBuf};

use rusqlite::{Connection, OptionalExtension, Params, params};
use serde_json::{Map, Value};
use tally_core::{Category, Record, RecordKey};

use crate::error::{StoreError, StoreResult};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS records (
        category TEXT NOT NULL,
        id TEXT NOT NULL,
        parent_id TEXT,
        body TEXT NOT NULL,
        PRIMARY KEY (category, id)
    );

    CREATE INDEX IF NOT EXISTS records_parent_id ON records (parent_id);";

// Log ids are numeric surrogates stored as text; they sort as numbers.

/// The persistent table. Not thread-safe on its own; the engine actor owns it.
pub struct RecordTable {
    conn: Connection,
    path: Option<PathBuf>,
}

impl RecordTable {
    /// Open or create the table in a database file.
    pub fn open(path: &Path) -> StoreResult<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn,
            path: Some(path.to_path_buf()),
        })
    }

    /// Open a private in-memory table.
    pub fn open_in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self { conn, path: None })
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn get(&self, category: Category, id: &str) -> StoreResult<Option<Record>> {
        fetch(&self.conn, category, id)
    }

    /// Insert a record that must not exist yet.
    pub fn insert(&mut self, mut record: Record) -> StoreResult<RecordKey> {
        assign_log_id(&self.conn, &mut record)?;
        if fetch(&self.conn, record.category(), record.id())?.is_some() {
            return Err(StoreError::DuplicateKey(record.key()));
        }
        write_row(&self.conn, &record)?;
        Ok(record.key())
    }

    /// Insert or overwrite a record.
    pub fn put(&mut self, mut record: Record) -> StoreResult<RecordKey> {
        assign_log_id(&self.conn, &mut record)?;
        write_row(&self.conn, &record)?;
        Ok(record.key())
    }

    /// Upsert many records in one transaction. Nothing is written if any row fails.
    pub fn bulk_put(&mut self, records: Vec<Record>) -> StoreResult<Vec<RecordKey>> {
        let tx = self.conn.transaction()?;
        let mut keys = Vec::with_capacity(records.len());
        for mut record in records {
            assign_log_id(&tx, &mut record)?;
            write_row(&tx, &record)?;
            keys.push(record.key());
        }
        tx.commit()?;
        Ok(keys)
    }

    /// Merge `changes` over an existing record. When the merged record carries
    /// a different id, the old key is removed and the new one inserted in the
    /// same transaction; a collision with an existing key leaves everything
    /// untouched.
    pub fn update(
        &mut self,
        category: Category,
        id: &str,
        changes: &Map<String, Value>,
    ) -> StoreResult<Record> {
        let tx = self.conn.transaction()?;
        let existing = fetch(&tx, category, id)?
            .ok_or_else(|| StoreError::NotFound(RecordKey::new(category, id)))?;
        let merged = existing.merged(changes)?;

        if merged.id() != id {
            if fetch(&tx, category, merged.id())?.is_some() {
                return Err(StoreError::DuplicateKey(merged.key()));
            }
            tx.execute(
                "DELETE FROM records WHERE category = ?1 AND id = ?2",
                params![category.as_str(), id],
            )?;
        }
        write_row(&tx, &merged)?;
        tx.commit()?;
        Ok(merged)
    }

    /// Delete one record. Returns false when it did not exist.
    pub fn delete(&mut self, category: Category, id: &str) -> StoreResult<bool> {
        let removed = self.conn.execute(
            "DELETE FROM records WHERE category = ?1 AND id = ?2",
            params![category.as_str(), id],
        )?;
        Ok(removed > 0)
    }

    /// Delete several records of one category, returning how many existed.
    pub fn bulk_delete(&mut self, category: Category, ids: &[String]) -> StoreResult<usize> {
        let tx = self.conn.transaction()?;
        let mut removed = 0;
        {
            let mut stmt = tx.prepare("DELETE FROM records WHERE category = ?1 AND id = ?2")?;
            for id in ids {
                removed += stmt.execute(params![category.as_str(), id])?;
            }
        }
        tx.commit()?;
        Ok(removed)
    }

    pub fn clear_category(&mut self, category: Category) -> StoreResult<usize> {
        let removed = self.conn.execute(
            "DELETE FROM records WHERE category = ?1",
            params![category.as_str()],
        )?;
        Ok(removed)
    }

    pub fn list_category(&self, category: Category) -> StoreResult<Vec<Record>> {
        query_records(
            &self.conn,
            "SELECT body FROM records WHERE category = ?1
             ORDER BY CASE WHEN category = 'LOG' THEN CAST(id AS INTEGER) END ASC, id ASC",
            params![category.as_str()],
        )
    }

    /// Every record, of any category, whose parent_id equals `parent_id`.
    pub fn list_by_parent(&self, parent_id: &str) -> StoreResult<Vec<Record>> {
        query_records(
            &self.conn,
            "SELECT body FROM records WHERE parent_id = ?1
             ORDER BY category ASC, CASE WHEN category = 'LOG' THEN CAST(id AS INTEGER) END ASC, id ASC",
            params![parent_id],
        )
    }

    pub fn list_all(&self) -> StoreResult<Vec<Record>> {
        query_records(
            &self.conn,
            "SELECT body FROM records
             ORDER BY category ASC, CASE WHEN category = 'LOG' THEN CAST(id AS INTEGER) END ASC, id ASC",
            [],
        )
    }

    pub fn count(&self, category: Category) -> StoreResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE category = ?1",
            params![category.as_str()],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    /// Close the connection, returning the backing file path if there is one.
    pub fn close(self) -> StoreResult<Option<PathBuf>> {
        let RecordTable { conn, path } = self;
        conn.close().map_err(|(_, e)| StoreError::StorageIo(e))?;
        Ok(path)
    }
}

fn fetch(conn: &Connection, category: Category, id: &str) -> StoreResult<Option<Record>> {
    let body: Option<String> = conn
        .query_row(
            "SELECT body FROM records WHERE category = ?1 AND id = ?2",
            params![category.as_str(), id],
            |row| row.get(0),
        )
        .optional()?;
    body.map(|b| decode(&b)).transpose()
}

fn query_records<P: Params>(conn: &Connection, sql: &str, params: P) -> StoreResult<Vec<Record>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, |row| row.get::<_, String>(0))?;

    let mut records = Vec::new();
    for row in rows {
        records.push(decode(&row?)?);
    }
    Ok(records)
}

fn decode(body: &str) -> StoreResult<Record> {
    let value: Value = serde_json::from_str(body)?;
    Ok(Record::from_value(value)?)
}

fn write_row(conn: &Connection, record: &Record) -> StoreResult<()> {
    let body = record.to_value()?.to_string();
    conn.execute(
        "INSERT INTO records (category, id, parent_id, body)
         VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(category, id) DO UPDATE SET
            parent_id = excluded.parent_id,
            body = excluded.body",
        params![
            record.category().as_str(),
            record.id(),
            record.parent_id(),
            body,
        ],
    )?;
    Ok(())
}

/// Give a LOG record with a blank id the next surrogate id.
fn assign_log_id(conn: &Connection, record: &mut Record) -> StoreResult<()> {
    if record.category() != Category::Log || !record.id().is_empty() {
        return Ok(());
    }
    let max: i64 = conn.query_row(
        "SELECT COALESCE(MAX(CAST(id AS INTEGER)), 0) FROM records WHERE category = ?1",
        params![Category::Log.as_str()],
        |row| row.get(0),
    )?;
    record.assign_log_id((max + 1).to_string());
    Ok(())
}
