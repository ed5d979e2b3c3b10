//! Stack Exchange Dump Loader
//!
//! A streaming loader that moves Stack Exchange data dumps (one XML element per
//! line) into a relational database, one record at a time, with idempotent
//! upserts and resumable progress.
//!
//! ## Core Features
//!
//! - **Streaming**: Lines are read, transformed and committed one at a time;
//!   memory use does not grow with the dump size
//! - **Idempotent writes**: Every record is an upsert keyed by `Id`, so re-running
//!   a file (or part of it) converges to the same table state
//! - **Resumable**: Start at any line, or seek straight to a saved checkpoint
//! - **Rich text**: HTML bodies are converted to Markdown; anything the converter
//!   cannot handle is stored as decoded text with the record's Error flag set
//! - **Two schemas**: The six-table primary layout, or a question/answer layout
//!   with tag synonyms
//!
//! ## Architecture Overview
//!
//! - [`extractor`] - Pulls the attribute map out of a dump line
//! - [`transform`] - Entity decoding, text cleaning, HTML to Markdown, tag lists
//! - [`dispatch`] - Turns an attribute map into a typed [`models::Record`]
//! - [`store`] - Upserts into SQLite (or PostgreSQL with the `postgres` feature)
//! - [`reader`] - Byte-counting line reader and progress gate
//! - [`checkpoint`] - Saved resume points
//! - [`pipeline`] - Runs one file end to end and reports the outcome
//! - [`config`] - Layered configuration with environment overrides
//! - [`logging`] - Structured logging with JSON and pretty-print formats
//!
//! ## Main Entry Point
//!
//! ```rust,no_run
//! use stackdump_loader::config::IngestConfig;
//! use stackdump_loader::models::{EntityKind, SchemaVariant};
//! use stackdump_loader::pipeline::{IngestOptions, Ingestor};
//! use stackdump_loader::store::sqlite::SqliteStore;
//! use stackdump_loader::store::{CommitPolicy, Store};
//!
//! # fn example() -> anyhow::Result<()> {
//! let settings = IngestConfig::default();
//! let mut store = SqliteStore::open("so.db".as_ref(), CommitPolicy::PerRecord)?;
//! store.create_schema(SchemaVariant::Primary)?;
//!
//! let options = IngestOptions::new("inputs/Posts.xml", EntityKind::Posts);
//! let report = Ingestor::new(&mut store, &settings).run(&options)?;
//! println!("{} lines processed", report.lines_processed);
//! # Ok(())
//! # }
//! ```

pub mod checkpoint;
pub mod config;
pub mod dispatch;
pub mod display;
pub mod error;
pub mod extractor;
pub mod file_discovery;
pub mod logging;
pub mod models;
pub mod pipeline;
pub mod reader;
pub mod store;
pub mod transform;

pub use error::{DispatchError, IngestError, StoreError, StreamError};
pub use pipeline::{IngestOptions, IngestReport, Ingestor, RunFailure};
