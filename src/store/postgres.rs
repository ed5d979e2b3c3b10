//! PostgreSQL backend
//!
//! sqlx is async; the loader is a single sequential stream, so the store owns a
//! current-thread tokio runtime and blocks on each statement.

use super::schema::{table_for, Dialect, SqlValue, TableSpec};
use super::{CommitPolicy, Store};
use crate::config::PostgresConfig;
use crate::error::StoreError;
use crate::models::{EntityKind, SchemaVariant};
use sqlx::{Connection, PgConnection};
use std::collections::{HashMap, HashSet};
use tokio::runtime::{Builder, Runtime};
use tracing::{debug, warn};

/// Taken before every batched upsert; re-declaring it replaces the previous one.
const ROW_SAVEPOINT: &str = "SAVEPOINT row_upsert";

pub struct PostgresStore {
    runtime: Runtime,
    conn: Option<PgConnection>,
    policy: CommitPolicy,
    pending: usize,
    tables: HashSet<EntityKind>,
    statements: HashMap<&'static str, String>,
}

impl PostgresStore {
    pub fn connect(config: &PostgresConfig, policy: CommitPolicy) -> Result<Self, StoreError> {
        let store = Self::connect_url(&config.connection_url(), policy)?;
        debug!("Connected to PostgreSQL at {}:{}/{}", config.host, config.port, config.name);
        Ok(store)
    }

    pub fn connect_url(url: &str, policy: CommitPolicy) -> Result<Self, StoreError> {
        let runtime = Builder::new_current_thread().enable_all().build()?;
        let conn = runtime.block_on(PgConnection::connect(url))?;
        Ok(Self {
            runtime,
            conn: Some(conn),
            policy,
            pending: 0,
            tables: HashSet::new(),
            statements: HashMap::new(),
        })
    }

    /// Undo a rejected row without losing the rest of the open batch.
    ///
    /// A failed statement poisons the whole PostgreSQL transaction, so the
    /// batch is rewound to the savepoint taken before the row. An empty batch
    /// is rolled back outright.
    fn discard_failed_row(&mut self) {
        let sql = if self.pending == 0 {
            "ROLLBACK"
        } else {
            "ROLLBACK TO SAVEPOINT row_upsert"
        };
        if let Err(e) = self.execute(sql) {
            warn!("Failed to discard rejected row: {}", e);
        }
    }

    fn execute(&mut self, sql: &str) -> Result<(), StoreError> {
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("connection closed".to_string()))?;
        self.runtime.block_on(sqlx::query(sql).execute(conn))?;
        Ok(())
    }
}

impl Store for PostgresStore {
    fn create_schema(&mut self, variant: SchemaVariant) -> Result<(), StoreError> {
        for &kind in variant.kinds() {
            let table = table_for(kind);
            self.execute(&table.create_sql(Dialect::Postgres))?;
            self.statements
                .insert(table.name, table.upsert_sql(Dialect::Postgres));
            self.tables.insert(kind);
        }
        Ok(())
    }

    fn upsert_row(
        &mut self,
        table: &'static TableSpec,
        values: &[SqlValue<'_>],
    ) -> Result<(), StoreError> {
        let batching = matches!(self.policy, CommitPolicy::Batch(_));
        let opening = batching && self.pending == 0;

        let sql = self
            .statements
            .get(table.name)
            .ok_or(StoreError::NoTable(table.kind))?;
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("connection closed".to_string()))?;

        let mut query = sqlx::query(sql);
        for value in values {
            query = match *value {
                SqlValue::Integer(v) => query.bind(v),
                SqlValue::Text(v) => query.bind(v),
                SqlValue::Boolean(v) => query.bind(v),
            };
        }
        let result = self.runtime.block_on(async {
            if opening {
                sqlx::query("BEGIN").execute(&mut *conn).await?;
            }
            if batching {
                sqlx::query(ROW_SAVEPOINT).execute(&mut *conn).await?;
            }
            query.execute(&mut *conn).await
        });

        if let Err(e) = result {
            if batching {
                self.discard_failed_row();
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
            self.execute("COMMIT")?;
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
        let conn = self
            .conn
            .as_mut()
            .ok_or_else(|| StoreError::Unavailable("connection closed".to_string()))?;
        let n: i64 = self
            .runtime
            .block_on(sqlx::query_scalar(&sql).fetch_one(conn))?;
        Ok(n as u64)
    }
}

impl Drop for PostgresStore {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            warn!("Failed to commit pending records on close: {}", e);
        }
        if let Some(conn) = self.conn.take() {
            if let Err(e) = self.runtime.block_on(conn.close()) {
                warn!("Failed to close PostgreSQL connection: {}", e);
            }
        }
    }
}
