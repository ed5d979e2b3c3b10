use super::schema::{table_for, Dialect, SqlValue, TableSpec};
use super::{CommitPolicy, Store};
use crate::error::StoreError;
use crate::models::{EntityKind, SchemaVariant};
use rusqlite::types::{ToSqlOutput, Value, ValueRef};
use rusqlite::{params_from_iter, Connection, ToSql};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, warn};

impl ToSql for SqlValue<'_> {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            SqlValue::Integer(Some(v)) => ToSqlOutput::Owned(Value::Integer(*v)),
            SqlValue::Text(Some(s)) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            SqlValue::Boolean(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            SqlValue::Integer(None) | SqlValue::Text(None) => ToSqlOutput::Owned(Value::Null),
        })
    }
}

/// SQLite-backed store
pub struct SqliteStore {
    conn: Connection,
    policy: CommitPolicy,
    pending: usize,
    tables: HashSet<EntityKind>,
    statements: HashMap<&'static str, String>,
}

impl SqliteStore {
    pub fn open(path: &Path, policy: CommitPolicy) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
        debug!("Opened SQLite database at {}", path.display());
        Ok(Self::with_connection(conn, policy))
    }

    pub fn open_in_memory(policy: CommitPolicy) -> Result<Self, StoreError> {
        Ok(Self::with_connection(Connection::open_in_memory()?, policy))
    }

    fn with_connection(conn: Connection, policy: CommitPolicy) -> Self {
        Self {
            conn,
            policy,
            pending: 0,
            tables: HashSet::new(),
            statements: HashMap::new(),
        }
    }

    /// Underlying connection, for inspection.
    pub fn connection(&self) -> &Connection {
        &self.conn
    }
}

impl Store for SqliteStore {
    fn create_schema(&mut self, variant: SchemaVariant) -> Result<(), StoreError> {
        for &kind in variant.kinds() {
            let table = table_for(kind);
            self.conn.execute_batch(&table.create_sql(Dialect::Sqlite))?;
            self.statements
                .insert(table.name, table.upsert_sql(Dialect::Sqlite));
            self.tables.insert(kind);
        }
        debug!("Created {} tables for the {} schema", variant.kinds().len(), variant);
        Ok(())
    }

    fn upsert_row(
        &mut self,
        table: &'static TableSpec,
        values: &[SqlValue<'_>],
    ) -> Result<(), StoreError> {
        let sql = self
            .statements
            .get(table.name)
            .ok_or(StoreError::NoTable(table.kind))?;

        let batching = matches!(self.policy, CommitPolicy::Batch(_));
        if batching && self.pending == 0 {
            self.conn.execute_batch("BEGIN")?;
        }

        let result = self
            .conn
            .prepare_cached(sql)
            .and_then(|mut stmt| stmt.execute(params_from_iter(values.iter())));

        if let Err(e) = result {
            if batching && self.pending == 0 {
                // Nothing else in this transaction; release it.
                if let Err(rollback) = self.conn.execute_batch("ROLLBACK") {
                    warn!("Failed to roll back empty batch: {}", rollback);
                }
            }
            return Err(e.into());
        }

        if batching {
            self.pending += 1;
            if self.pending >= self.policy.batch_size() {
                self.flush()?;
            }
        }
        Ok(())
    }

    fn flush(&mut self) -> Result<(), StoreError> {
        if self.pending > 0 {
            self.conn.execute_batch("COMMIT")?;
            debug!("Committed batch of {} records", self.pending);
            self.pending = 0;
        }
        Ok(())
    }

    fn pending(&self) -> usize {
        self.pending
    }

    fn tables(&self) -> &HashSet<EntityKind> {
        &self.tables
    }

    fn count(&mut self, kind: EntityKind) -> Result<u64, StoreError> {
        if !self.tables.contains(&kind) {
            return Err(StoreError::NoTable(kind));
        }
        let sql = format!("SELECT COUNT(*) FROM {}", table_for(kind).name);
        let n: i64 = self.conn.query_row(&sql, [], |row| row.get(0))?;
        Ok(n as u64)
    }
}

impl Drop for SqliteStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to commit pending records on close: {}", e);
        }
    }
}
