use std::fs;
use std::path::Path;

use log::debug;
use rusqlite::{params, Connection, OptionalExtension};

use crate::{Error, Gateway, Result};

/// File name of the database inside a data directory.
pub const DATABASE_FILE: &str = "celerix.sqlite";

const COUNTER_TABLE: &str = "celerix_autonum";

/// SQLite-backed storage for one collection.
///
/// Every collection owns a table of `(key, value)` rows. All collections in the same
/// data directory share one database file and one counter table for autonum.
pub struct Persistence {
    conn: Connection,
    table: String,
}

impl Persistence {
    /// Opens (or creates) the collection table inside `dir`.
    ///
    /// If the directory does not exist, it will be created.
    pub fn open<P: AsRef<Path>>(dir: P, table: &str) -> Result<Self> {
        let dir = dir.as_ref();
        if !dir.exists() {
            fs::create_dir_all(dir)?;
        }
        let conn = Connection::open(dir.join(DATABASE_FILE))?;
        conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
        Self::init(conn, table)
    }

    /// Opens a private in-memory database.
    pub fn in_memory(table: &str) -> Result<Self> {
        Self::init(Connection::open_in_memory()?, table)
    }

    fn init(conn: Connection, table: &str) -> Result<Self> {
        validate_table_name(table)?;
        conn.execute_batch(&format!(
            "CREATE TABLE IF NOT EXISTS \"{table}\" (
                key TEXT PRIMARY KEY NOT NULL,
                value TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS {COUNTER_TABLE} (
                collection TEXT PRIMARY KEY NOT NULL,
                lastnum INTEGER NOT NULL
            );"
        ))?;
        debug!("Opened table {}", table);
        Ok(Self {
            conn,
            table: table.to_string(),
        })
    }
}

fn validate_table_name(table: &str) -> Result<()> {
    let valid = !table.is_empty()
        && table != COUNTER_TABLE
        && table
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if valid {
        Ok(())
    } else {
        Err(Error::Argument(format!("invalid collection name `{}`", table)))
    }
}

impl Gateway for Persistence {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT value FROM \"{}\" WHERE key = ?1", self.table))?;
        Ok(stmt.query_row(params![key], |row| row.get(0)).optional()?)
    }

    fn put(&self, key: &str, raw: &str) -> Result<()> {
        // Upsert keeps the rowid, so scans stay in first-insertion order.
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO \"{}\" (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            self.table
        ))?;
        stmt.execute(params![key, raw])?;
        Ok(())
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("DELETE FROM \"{}\" WHERE key = ?1", self.table))?;
        Ok(stmt.execute(params![key])? > 0)
    }

    fn clear(&self) -> Result<usize> {
        Ok(self
            .conn
            .execute(&format!("DELETE FROM \"{}\"", self.table), [])?)
    }

    fn count(&self) -> Result<usize> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT COUNT(*) FROM \"{}\"", self.table))?;
        let count: i64 = stmt.query_row([], |row| row.get(0))?;
        Ok(count as usize)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare_cached(&format!("SELECT key FROM \"{}\" ORDER BY rowid", self.table))?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(keys)
    }

    fn rows(&self) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT key, value FROM \"{}\" ORDER BY rowid",
            self.table
        ))?;
        let rows = stmt
            .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok(rows)
    }

    fn sample(&self, n: usize) -> Result<Vec<(String, String)>> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "SELECT key, value FROM \"{}\" ORDER BY RANDOM() LIMIT ?1",
            self.table
        ))?;
        let rows = stmt
            .query_map(params![n as i64], |row| Ok((row.get(0)?, row.get(1)?)))?
            .collect::<rusqlite::Result<Vec<(String, String)>>>()?;
        Ok(rows)
    }

    fn next_counter(&self, name: &str) -> Result<u64> {
        let mut stmt = self.conn.prepare_cached(&format!(
            "INSERT INTO {COUNTER_TABLE} (collection, lastnum) VALUES (?1, 1)
             ON CONFLICT(collection) DO UPDATE SET lastnum = lastnum + 1
             RETURNING lastnum"
        ))?;
        let next: i64 = stmt.query_row(params![name], |row| row.get(0))?;
        Ok(next as u64)
    }
}
