use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params_from_iter};
use tokio::sync::OnceCell;
use tracing::{debug, info, warn};

use crate::config::{JournalMode, StoreSection};
use crate::error::{GatehouseError, StoreError};
use crate::types::StoreStats;

use super::schema;
use super::serializer::{UnitOfWork, WriteSerializer};

/// Outcome of a single `execute` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Execution {
    pub last_insert_id: i64,
    pub rows_affected: u64,
}

/// Handle on the single `SQLite` connection.
///
/// Owns the [`WriteSerializer`] that admits one transaction at a time, so a
/// fresh store always starts with a fresh, empty write queue.
///
/// Reads outside [`Store::run_exclusive`] share the connection with the
/// in-flight transaction and can observe its uncommitted rows.
#[derive(Debug)]
pub struct Store {
    conn: Mutex<Connection>,
    db_path: Option<PathBuf>,
    writer: WriteSerializer,
}

impl Store {
    /// Open (or create) a store at the given path with default settings.
    pub fn open(path: &Path) -> crate::error::Result<Self> {
        Self::open_with(&StoreSection {
            path: path.to_path_buf(),
            ..StoreSection::default()
        })
    }

    /// Open (or create) a store as described by the `[store]` config section.
    pub fn open_with(config: &StoreSection) -> crate::error::Result<Self> {
        if let Some(parent) = config.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(StoreError::Io)?;
            }
        }
        let conn = Connection::open(&config.path).map_err(StoreError::Sqlite)?;
        Self::initialize(
            &conn,
            Some(config.journal_mode),
            Duration::from_millis(config.busy_timeout_ms),
        )?;
        info!(path = %config.path.display(), "Opened gatehouse store");
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: Some(config.path.clone()),
            writer: WriteSerializer::new(),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> crate::error::Result<Self> {
        let conn = Connection::open_in_memory().map_err(StoreError::Sqlite)?;
        Self::initialize(&conn, None, Duration::from_millis(0))?;
        Ok(Self {
            conn: Mutex::new(conn),
            db_path: None,
            writer: WriteSerializer::new(),
        })
    }

    fn initialize(
        conn: &Connection,
        journal_mode: Option<JournalMode>,
        busy_timeout: Duration,
    ) -> Result<(), StoreError> {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;

        // Journal mode is advisory; in-memory databases ignore it.
        if let Some(mode) = journal_mode {
            match conn.pragma_update_and_check(None, "journal_mode", mode.as_str(), |row| {
                row.get::<_, String>(0)
            }) {
                Ok(active) if active.eq_ignore_ascii_case(mode.as_str()) => {}
                Ok(active) => {
                    warn!(requested = mode.as_str(), active = %active, "Journal mode not applied");
                }
                Err(err) => warn!(requested = mode.as_str(), %err, "Failed to set journal mode"),
            }
        }

        // Check existing tables first so a stale file fails with a readable
        // message instead of an index-creation error.
        Self::validate_schema(conn)?;
        conn.execute_batch(schema::SCHEMA_SQL)?;
        Self::validate_schema(conn)
    }

    /// Reject database files whose tables predate the current column layout.
    /// Tables that do not exist yet are skipped.
    fn validate_schema(conn: &Connection) -> Result<(), StoreError> {
        for (table, required) in schema::REQUIRED_COLUMNS {
            let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
            let names = stmt
                .query_map([], |row| row.get::<_, String>(1))?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            if names.is_empty() {
                continue;
            }
            let missing: Vec<&str> = required
                .iter()
                .copied()
                .filter(|col| !names.iter().any(|n| n == col))
                .collect();
            if !missing.is_empty() {
                return Err(StoreError::SchemaMismatch(format!(
                    "table \"{table}\" missing columns: {}. Delete the database file and restart to recreate it.",
                    missing.join(", ")
                )));
            }
        }
        Ok(())
    }

    /// Location of the database file, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    pub fn serializer(&self) -> &WriteSerializer {
        &self.writer
    }

    /// Run `work` inside an exclusive transaction, after every earlier
    /// caller has finished.
    pub async fn run_exclusive<W: UnitOfWork>(&self, work: W) -> crate::error::Result<W::Output> {
        self.writer.run(self, work).await
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> rusqlite::Result<T>,
    ) -> crate::error::Result<T> {
        let conn = self.conn.lock().map_err(|_| StoreError::Poisoned)?;
        f(&conn).map_err(|e| GatehouseError::Store(StoreError::Sqlite(e)))
    }

    /// Synchronous raw statement, for drop paths that cannot await.
    pub(crate) fn exec_now(&self, sql: &str) -> crate::error::Result<()> {
        self.with_conn(|conn| conn.execute_batch(sql))
    }

    // ── Primitives ─────────────────────────────────────────────────

    /// Raw statement without parameters (BEGIN/COMMIT/ROLLBACK/PRAGMA).
    pub async fn exec(&self, sql: &str) -> crate::error::Result<()> {
        tokio::task::yield_now().await;
        self.exec_now(sql)
    }

    /// Parameterized write.
    pub async fn execute(&self, sql: &str, params: &[Value]) -> crate::error::Result<Execution> {
        tokio::task::yield_now().await;
        self.with_conn(|conn| {
            let changed = conn.execute(sql, params_from_iter(params))?;
            Ok(Execution {
                last_insert_id: conn.last_insert_rowid(),
                rows_affected: changed as u64,
            })
        })
    }

    /// Parameterized read mapping every row through `map`.
    pub async fn query<T, F>(
        &self,
        sql: &str,
        params: &[Value],
        map: F,
    ) -> crate::error::Result<Vec<T>>
    where
        F: FnMut(&Row<'_>) -> rusqlite::Result<T>,
    {
        tokio::task::yield_now().await;
        self.with_conn(|conn| {
            let mut stmt = conn.prepare_cached(sql)?;
            let rows = stmt
                .query_map(params_from_iter(params), map)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })
    }

    /// Parameterized read of at most one row.
    pub async fn query_opt<T, F>(
        &self,
        sql: &str,
        params: &[Value],
        map: F,
    ) -> crate::error::Result<Option<T>>
    where
        F: FnOnce(&Row<'_>) -> rusqlite::Result<T>,
    {
        tokio::task::yield_now().await;
        self.with_conn(|conn| conn.query_row(sql, params_from_iter(params), map).optional())
    }

    /// `SELECT COUNT(*)` over a whole table.
    pub async fn count(&self, table: &str) -> crate::error::Result<u64> {
        let n = self
            .query_opt(&format!("SELECT COUNT(*) FROM {table}"), &[], |row| {
                row.get::<_, i64>(0)
            })
            .await?
            .unwrap_or(0);
        Ok(u64::try_from(n).unwrap_or(0))
    }

    // ── Metrics ────────────────────────────────────────────────────

    /// Row counts per table plus the database file size.
    pub async fn stats(&self) -> crate::error::Result<StoreStats> {
        let stats = StoreStats {
            menus: self.count("menu").await?,
            permissions: self.count("permission").await?,
            roles: self.count("role").await?,
            role_menus: self.count("role_menu").await?,
            role_permissions: self.count("role_permission").await?,
            db_size_bytes: self
                .db_path
                .as_ref()
                .and_then(|p| std::fs::metadata(p).ok())
                .map_or(0, |m| m.len()),
        };
        debug!(?stats, "Collected store stats");
        Ok(stats)
    }
}

/// Opens the [`Store`] on first access and hands out the same handle afterwards.
#[derive(Debug)]
pub struct LazyStore {
    config: StoreSection,
    cell: OnceCell<Arc<Store>>,
}

impl LazyStore {
    pub fn new(config: StoreSection) -> Self {
        Self {
            config,
            cell: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &StoreSection {
        &self.config
    }

    /// The shared store, opening it if this is the first call.
    pub async fn get(&self) -> crate::error::Result<Arc<Store>> {
        self.cell
            .get_or_try_init(|| async { Store::open_with(&self.config).map(Arc::new) })
            .await
            .map(Arc::clone)
    }
}

// ── Row helpers ────────────────────────────────────────────────────

/// Current time in the stored text format (`%Y-%m-%dT%H:%M:%fZ`).
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Read an RFC 3339 text column as `DateTime<Utc>`.
pub(crate) fn timestamp_column(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            let idx = row.as_ref().column_index(column).unwrap_or(0);
            rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e))
        })
}

/// Owned text parameter.
pub(crate) fn text(value: &str) -> Value {
    Value::Text(value.to_owned())
}

/// Owned nullable text parameter.
pub(crate) fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn in_memory_store_enforces_foreign_keys() {
        let store = Store::in_memory().unwrap();
        let err = store
            .execute(
                "INSERT INTO role_menu (role_id, menu_id) VALUES (?1, ?2)",
                &[Value::Integer(1), Value::Integer(1)],
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn execute_reports_insert_id_and_changes() {
        let store = Store::in_memory().unwrap();
        let first = store
            .execute(
                "INSERT INTO role (name, code) VALUES (?1, ?2)",
                &[text("Admin"), text("admin")],
            )
            .await
            .unwrap();
        assert_eq!(first.rows_affected, 1);
        assert!(first.last_insert_id > 0);

        let none = store
            .execute(
                "UPDATE role SET name = ?1 WHERE code = ?2",
                &[text("x"), text("missing")],
            )
            .await
            .unwrap();
        assert_eq!(none.rows_affected, 0);
    }

    #[tokio::test]
    async fn query_maps_typed_rows() {
        let store = Store::in_memory().unwrap();
        for code in ["a", "b", "c"] {
            store
                .execute(
                    "INSERT INTO role (name, code) VALUES (?1, ?1)",
                    &[text(code)],
                )
                .await
                .unwrap();
        }
        let codes: Vec<String> = store
            .query("SELECT code FROM role ORDER BY code DESC", &[], |row| {
                row.get(0)
            })
            .await
            .unwrap();
        assert_eq!(codes, vec!["c", "b", "a"]);

        let missing: Option<String> = store
            .query_opt(
                "SELECT code FROM role WHERE id = ?1",
                &[Value::Integer(999)],
                |row| row.get(0),
            )
            .await
            .unwrap();
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn created_at_defaults_to_parseable_timestamp() {
        let store = Store::in_memory().unwrap();
        store
            .execute(
                "INSERT INTO role (name, code) VALUES ('Ops', 'ops')",
                &[],
            )
            .await
            .unwrap();
        let created = store
            .query_opt("SELECT created_at FROM role", &[], |row| {
                timestamp_column(row, "created_at")
            })
            .await
            .unwrap()
            .unwrap();
        assert!(Utc::now().signed_duration_since(created).num_seconds() < 60);
    }

    #[tokio::test]
    async fn open_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/data/acl.db");
        let store = Store::open(&path).unwrap();
        assert_eq!(store.path(), Some(path.as_path()));
        assert!(path.exists());
        let stats = store.stats().await.unwrap();
        assert_eq!(stats.menus, 0);
        assert!(stats.db_size_bytes > 0);
    }

    #[test]
    fn rejects_database_with_stale_columns() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch(
                "CREATE TABLE menu (id INTEGER PRIMARY KEY, name TEXT NOT NULL, code TEXT UNIQUE);",
            )
            .unwrap();
        }
        let err = Store::open(&path).unwrap_err();
        assert!(
            matches!(err, GatehouseError::Store(StoreError::SchemaMismatch(ref m)) if m.contains("parent_id")),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn reopening_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("acl.db");
        drop(Store::open(&path).unwrap());
        assert!(Store::open(&path).is_ok());
    }

    #[tokio::test]
    async fn lazy_store_opens_once() {
        let dir = tempfile::tempdir().unwrap();
        let lazy = LazyStore::new(StoreSection {
            path: dir.path().join("lazy.db"),
            ..StoreSection::default()
        });
        let a = lazy.get().await.unwrap();
        let b = lazy.get().await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[tokio::test]
    async fn configured_journal_mode_is_applied() {
        let dir = tempfile::tempdir().unwrap();
        for (mode, expected) in [(JournalMode::Delete, "delete"), (JournalMode::Wal, "wal")] {
            let store = Store::open_with(&StoreSection {
                path: dir.path().join(format!("{expected}.db")),
                journal_mode: mode,
                ..StoreSection::default()
            })
            .unwrap();
            let active = store
                .query_opt("PRAGMA journal_mode", &[], |row| row.get::<_, String>(0))
                .await
                .unwrap();
            assert_eq!(active.as_deref(), Some(expected));
        }
    }
}
