//! Persistence layer
//!
//! A [`Store`] owns one database connection for the lifetime of a run and
//! writes typed records as idempotent upserts keyed by `Id`. Re-ingesting a
//! record with the same key overwrites the stored row instead of failing.
//!
//! ## Backends
//!
//! - [`sqlite::SqliteStore`] - embedded file or in-memory database (default)
//! - `postgres::PostgresStore` - PostgreSQL via sqlx, behind the `postgres` feature
//!
//! ## Commit Policy
//!
//! With [`CommitPolicy::PerRecord`] every upsert is its own transaction, so a
//! crash loses at most the line in flight. [`CommitPolicy::Batch`] groups `n`
//! upserts per transaction; [`Store::pending`] reports how many writes are not
//! yet durable, and [`Store::flush`] commits them.

pub mod schema;
pub mod sqlite;

#[cfg(feature = "postgres")]
pub mod postgres;

use crate::config::{DatabaseBackend, DatabaseConfig};
use crate::error::StoreError;
use crate::models::*;
use schema::{row_values, table_for, SqlValue, TableSpec};
use std::collections::HashSet;

pub use schema::Dialect;

/// How upserts are grouped into transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CommitPolicy {
    #[default]
    PerRecord,
    Batch(usize),
}

impl CommitPolicy {
    pub fn from_batch_size(size: usize) -> Self {
        if size <= 1 {
            CommitPolicy::PerRecord
        } else {
            CommitPolicy::Batch(size)
        }
    }

    pub fn batch_size(&self) -> usize {
        match self {
            CommitPolicy::PerRecord => 1,
            CommitPolicy::Batch(n) => *n,
        }
    }
}

/// Durable, keyed storage for typed records.
///
/// Backends implement the row-level primitives; the per-kind operations are
/// provided on top of them.
pub trait Store {
    /// Create the tables of `variant` if they do not exist yet.
    fn create_schema(&mut self, variant: SchemaVariant) -> Result<(), StoreError>;

    /// Insert or overwrite one row of `table`. `values` follow the column order.
    fn upsert_row(&mut self, table: &'static TableSpec, values: &[SqlValue<'_>])
        -> Result<(), StoreError>;

    /// Commit writes that are not yet durable.
    fn flush(&mut self) -> Result<(), StoreError>;

    /// Number of upserts waiting for a commit.
    fn pending(&self) -> usize;

    /// Tables this store has created.
    fn tables(&self) -> &HashSet<EntityKind>;

    fn count(&mut self, kind: EntityKind) -> Result<u64, StoreError>;

    fn upsert(&mut self, record: &Record) -> Result<(), StoreError> {
        let kind = record.kind();
        if !self.tables().contains(&kind) {
            return Err(StoreError::NoTable(kind));
        }
        self.upsert_row(table_for(kind), &row_values(record))
    }

    fn upsert_post(&mut self, post: &Post) -> Result<(), StoreError> {
        self.upsert(&Record::Post(post.clone()))
    }

    fn upsert_comment(&mut self, comment: &Comment) -> Result<(), StoreError> {
        self.upsert(&Record::Comment(comment.clone()))
    }

    fn upsert_user(&mut self, user: &User) -> Result<(), StoreError> {
        self.upsert(&Record::User(user.clone()))
    }

    fn upsert_vote(&mut self, vote: &Vote) -> Result<(), StoreError> {
        self.upsert(&Record::Vote(vote.clone()))
    }

    fn upsert_tag(&mut self, tag: &Tag) -> Result<(), StoreError> {
        self.upsert(&Record::Tag(tag.clone()))
    }

    fn upsert_post_link(&mut self, link: &PostLink) -> Result<(), StoreError> {
        self.upsert(&Record::PostLink(link.clone()))
    }
}

/// Open the configured backend and create the tables of `variant`.
pub fn open_store(
    config: &DatabaseConfig,
    variant: SchemaVariant,
    policy: CommitPolicy,
) -> Result<Box<dyn Store>, StoreError> {
    let mut store: Box<dyn Store> = match config.backend {
        DatabaseBackend::Sqlite => Box::new(sqlite::SqliteStore::open(&config.sqlite_path, policy)?),
        #[cfg(feature = "postgres")]
        DatabaseBackend::Postgres => {
            Box::new(postgres::PostgresStore::connect(&config.postgres, policy)?)
        }
        #[cfg(not(feature = "postgres"))]
        DatabaseBackend::Postgres => {
            return Err(StoreError::Unavailable(
                "built without the `postgres` feature".to_string(),
            ))
        }
    };
    store.create_schema(variant)?;
    Ok(store)
}
