//! SQLite backend.
//!
//! Parameters:
//! - `db`: logical database name (mandatory),
//! - `path`: database file, defaults to the value of `db`,
//! - `busy_timeout`: milliseconds to wait on a locked database,
//! - `create`: `0` to refuse creating a missing file (default `1`).

use std::path::{Path, PathBuf};
use std::time::Duration;

use rusqlite::{Connection, OpenFlags};
use tracing::debug;

use super::{Backend, BackendConnection, BackendError, ConnectionParams};

/// Opens connections to a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    path: PathBuf,
    busy_timeout: Option<Duration>,
    create: bool,
}

impl SqliteBackend {
    /// Creates a backend for the given file.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            busy_timeout: None,
            create: true,
        }
    }

    /// Builds a backend from connection parameters.
    pub fn from_params(params: &ConnectionParams) -> Result<Self, BackendError> {
        let path = params.get("path").unwrap_or(params.database());
        let mut backend = Self::new(path);

        if let Some(raw) = params.get("busy_timeout") {
            let millis: u64 = raw
                .parse()
                .map_err(|_| BackendError::InvalidParameter(format!("busy_timeout={raw}")))?;
            backend.busy_timeout = Some(Duration::from_millis(millis));
        }

        if let Some(raw) = params.get("create") {
            backend.create = match raw {
                "1" | "true" => true,
                "0" | "false" => false,
                _ => return Err(BackendError::InvalidParameter(format!("create={raw}"))),
            };
        }

        Ok(backend)
    }

    /// Database file path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Backend for SqliteBackend {
    type Connection = SqliteConnection;

    fn connect(&mut self) -> Result<Self::Connection, BackendError> {
        let mut flags = OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX;
        if self.create {
            flags |= OpenFlags::SQLITE_OPEN_CREATE;
        }

        let conn = Connection::open_with_flags(&self.path, flags)
            .map_err(|e| BackendError::Connect(format!("{}: {e}", self.path.display())))?;

        if let Some(timeout) = self.busy_timeout {
            conn.busy_timeout(timeout)
                .map_err(|e| BackendError::Connect(e.to_string()))?;
        }

        debug!(path = %self.path.display(), "opened sqlite database");
        Ok(SqliteConnection { conn })
    }
}

/// A live SQLite connection in autocommit mode.
pub struct SqliteConnection {
    conn: Connection,
}

impl BackendConnection for SqliteConnection {
    fn execute(&mut self, statement: &[u8]) -> Result<(), BackendError> {
        let sql = std::str::from_utf8(statement)
            .map_err(|e| BackendError::Execute(format!("statement is not valid UTF-8: {e}")))?;
        self.conn
            .execute_batch(sql)
            .map_err(|e| BackendError::Execute(e.to_string()))
    }

    fn close(self) -> Result<(), BackendError> {
        self.conn
            .close()
            .map_err(|(_, e)| BackendError::Close(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn count_rows(path: &Path) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM t", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn executes_statements() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("shop.db");
        let mut backend = SqliteBackend::new(&path);

        let mut conn = backend.connect().unwrap();
        conn.execute(b"CREATE TABLE t (v INTEGER)").unwrap();
        conn.execute(b"INSERT INTO t VALUES (1)").unwrap();
        conn.execute(b"INSERT INTO t VALUES (2)").unwrap();
        conn.close().unwrap();

        assert_eq!(count_rows(&path), 2);
    }

    #[test]
    fn failing_statement_reports_execute_error() {
        let dir = TempDir::new().unwrap();
        let mut backend = SqliteBackend::new(dir.path().join("x.db"));
        let mut conn = backend.connect().unwrap();

        assert!(matches!(
            conn.execute(b"INSERT INTO missing VALUES (1)"),
            Err(BackendError::Execute(_))
        ));
        assert!(matches!(
            conn.execute(&[0xFF, 0xFE]),
            Err(BackendError::Execute(_))
        ));
    }

    #[test]
    fn unreachable_file_reports_connect_error() {
        let dir = TempDir::new().unwrap();
        let mut backend = SqliteBackend::new(dir.path().join("no-such-dir").join("x.db"));
        assert!(matches!(backend.connect(), Err(BackendError::Connect(_))));
    }

    #[test]
    fn create_flag_is_honoured() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.db");
        let params: ConnectionParams = format!("db=absent path={} create=0", path.display())
            .parse()
            .unwrap();
        let mut backend = SqliteBackend::from_params(&params).unwrap();
        assert!(backend.connect().is_err());
        assert!(!path.exists());
    }

    #[test]
    fn params_select_path_and_timeout() {
        let params: ConnectionParams = "db=shop busy_timeout=250".parse().unwrap();
        let backend = SqliteBackend::from_params(&params).unwrap();
        assert_eq!(backend.path(), Path::new("shop"));
        assert_eq!(backend.busy_timeout, Some(Duration::from_millis(250)));

        let params: ConnectionParams = "db=shop busy_timeout=soon".parse().unwrap();
        assert!(matches!(
            SqliteBackend::from_params(&params),
            Err(BackendError::InvalidParameter(_))
        ));
    }
}
