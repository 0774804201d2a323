//! Destination store abstraction and the SQLite implementation.
//!
//! The sync pipeline only needs a handful of operations from its destination:
//! run a statement, bulk-insert rows through one parameterised statement, and
//! delimit a transaction. [`Store`] captures that surface; [`Connector`] hands
//! out a fresh connection for every unit so no transaction outlives its unit.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::debug;
use rusqlite::{Connection, params_from_iter, types::Value as SqlValue};

use crate::data::{Cell, Value};

pub trait Store {
    fn begin(&mut self) -> Result<()>;
    fn execute(&mut self, sql: &str) -> Result<()>;
    /// Runs `sql` once per row, binding the row's cells positionally.
    fn execute_many(&mut self, sql: &str, rows: &[Vec<Cell>]) -> Result<usize>;
    fn commit(&mut self) -> Result<()>;
    fn rollback(&mut self) -> Result<()>;
}

pub trait Connector {
    fn connect(&self) -> Result<Box<dyn Store>>;
    fn describe(&self) -> String;
}

pub struct SqliteStore {
    conn: Connection,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self> {
        let conn =
            Connection::open(path).with_context(|| format!("Opening SQLite database {path:?}"))?;
        Ok(Self { conn })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Store for SqliteStore {
    fn begin(&mut self) -> Result<()> {
        self.conn
            .execute_batch("BEGIN")
            .context("Starting transaction")
    }

    fn execute(&mut self, sql: &str) -> Result<()> {
        debug!("SQL: {sql}");
        self.conn
            .execute_batch(sql)
            .with_context(|| format!("Executing statement: {sql}"))
    }

    fn execute_many(&mut self, sql: &str, rows: &[Vec<Cell>]) -> Result<usize> {
        debug!("SQL x{}: {sql}", rows.len());
        let mut stmt = self
            .conn
            .prepare(sql)
            .with_context(|| format!("Preparing statement: {sql}"))?;
        let mut affected = 0usize;
        for (row_idx, row) in rows.iter().enumerate() {
            affected += stmt
                .execute(params_from_iter(row.iter().map(to_sql_value)))
                .with_context(|| format!("Inserting row {}", row_idx + 1))?;
        }
        Ok(affected)
    }

    fn commit(&mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .context("Committing transaction")
    }

    fn rollback(&mut self) -> Result<()> {
        self.conn
            .execute_batch("ROLLBACK")
            .context("Rolling back transaction")
    }
}

fn to_sql_value(cell: &Cell) -> SqlValue {
    match cell {
        None => SqlValue::Null,
        Some(Value::Text(s)) => SqlValue::Text(s.clone()),
        Some(Value::Integer(i)) => SqlValue::Integer(*i),
        Some(Value::Float(f)) => SqlValue::Real(*f),
        Some(Value::Decimal(d)) => SqlValue::Text(d.normalize().to_string()),
        Some(Value::Date(d)) => SqlValue::Text(d.format("%Y-%m-%d").to_string()),
    }
}

/// Opens the SQLite database file at `path` once per unit.
#[derive(Debug, Clone)]
pub struct SqliteConnector {
    path: PathBuf,
}

impl SqliteConnector {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Connector for SqliteConnector {
    fn connect(&self) -> Result<Box<dyn Store>> {
        Ok(Box::new(SqliteStore::open(&self.path)?))
    }

    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }
}
