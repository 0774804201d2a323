#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use rusqlite::Connection;
use sheet_sync::config::SyncConfig;
use tempfile::{TempDir, tempdir};

/// Returns the absolute path to a fixture under `tests/data`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("data")
        .join(name)
}

/// Scratch directory with a `data/` input folder and a database path, cleaned up on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    pub fn new() -> Self {
        let temp_dir = tempdir().expect("temp dir");
        fs::create_dir(temp_dir.path().join("data")).expect("create data dir");
        Self { temp_dir }
    }

    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp_dir.path().join("data")
    }

    pub fn database(&self) -> PathBuf {
        self.temp_dir.path().join("sync.db")
    }

    /// Writes `contents` into the data directory and returns the path.
    pub fn write_input(&self, name: &str, contents: &str) -> PathBuf {
        self.write_input_bytes(name, contents.as_bytes())
    }

    /// Copies a checked-in fixture into the data directory.
    pub fn copy_fixture(&self, name: &str) -> PathBuf {
        let path = self.data_dir().join(name);
        fs::copy(fixture_path(name), &path).expect("copy fixture");
        path
    }

    pub fn write_input_bytes(&self, name: &str, contents: &[u8]) -> PathBuf {
        let path = self.data_dir().join(name);
        let mut file = File::create(&path).expect("create input file");
        file.write_all(contents).expect("write input file contents");
        path
    }

    /// Configuration keyed on `Key` with `Revenue` as the only money column.
    pub fn config(&self) -> SyncConfig {
        SyncConfig {
            data_dir: self.data_dir(),
            database: self.database(),
            key_column: "Key".to_string(),
            money_columns: vec!["Revenue".to_string()],
            ..SyncConfig::default()
        }
    }

    pub fn open_database(&self) -> Connection {
        Connection::open(self.database()).expect("open sqlite database")
    }
}

/// Mixed-quality accounts sheet: one duplicate key, one non-numeric key, one
/// key-only row, one row without a key.
pub const ACCOUNTS_CSV: &str = "\
Key,Name,Revenue,Joined
1,Alice,\"$1,200.50\",2024/01/05
2,Bob,(300),2024/02/10
2,Dup,5,2024/03/01
x,Bad,7,2024/03/02
3,,,
,Ghost,1,2024/01/01
";

pub fn table_sql(conn: &Connection, table: &str) -> Option<String> {
    conn.query_row(
        "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
        [table],
        |row| row.get(0),
    )
    .ok()
}

pub fn table_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
        .expect("prepare table listing");
    stmt.query_map([], |row| row.get(0))
        .expect("query table listing")
        .collect::<Result<Vec<String>, _>>()
        .expect("collect table names")
}

pub fn account_rows(conn: &Connection, table: &str) -> Vec<(i64, Option<String>, Option<f64>, Option<String>)> {
    let sql = format!(
        "SELECT \"Key\", \"Name\", \"Revenue\", \"Joined\" FROM \"{table}\" ORDER BY \"Key\""
    );
    let mut stmt = conn.prepare(&sql).expect("prepare select");
    stmt.query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))
        .expect("query rows")
        .collect::<Result<Vec<_>, _>>()
        .expect("collect rows")
}
