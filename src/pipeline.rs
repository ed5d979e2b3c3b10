//! Ingestion pipeline
//!
//! Drives one run: open the dump, position the reader, then for every line
//! extract, dispatch, and upsert before reading the next one. The run ends at
//! end of file or at the first fatal fault; either way the caller gets an
//! [`IngestReport`] with the number of lines processed.
//!
//! ## Fault Handling
//!
//! | Condition          | Outcome                                          |
//! |--------------------|--------------------------------------------------|
//! | no record on line  | counted as a non-record line                     |
//! | rich-text fallback | record stored with its Error flag set            |
//! | unknown kind       | fatal                                            |
//! | store rejection    | fatal, or counted and skipped under `skip`       |
//! | read failure       | fatal                                            |
//!
//! Pending writes are committed on every exit path, and the final checkpoint
//! points just past the last line whose outcome is durable.

use crate::checkpoint::Checkpoint;
use crate::config::{FaultPolicy, IngestConfig};
use crate::dispatch::{Dispatched, Dispatcher};
use crate::error::{CheckpointError, DispatchError, IngestError};
use crate::extractor::extract;
use crate::models::{EntityKind, SchemaVariant};
use crate::reader::{DumpReader, Line, ProgressGate, RunState};
use crate::store::Store;
use crate::transform::FieldTransformer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

/// Where a run starts reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPosition {
    /// 1-based line number; earlier lines are read and discarded
    Line(u64),
    /// Seek to the offset stored in the checkpoint file
    Resume,
}

impl Default for StartPosition {
    fn default() -> Self {
        StartPosition::Line(1)
    }
}

#[derive(Debug, Clone)]
pub struct IngestOptions {
    pub path: PathBuf,
    pub kind: EntityKind,
    pub start: StartPosition,
    pub checkpoint_path: Option<PathBuf>,
}

impl IngestOptions {
    pub fn new(path: impl Into<PathBuf>, kind: EntityKind) -> Self {
        Self {
            path: path.into(),
            kind,
            start: StartPosition::default(),
            checkpoint_path: None,
        }
    }

    pub fn start_line(mut self, line: u64) -> Self {
        self.start = StartPosition::Line(line);
        self
    }

    pub fn resume(mut self) -> Self {
        self.start = StartPosition::Resume;
        self
    }

    pub fn with_checkpoint(mut self, path: impl AsRef<Path>) -> Self {
        self.checkpoint_path = Some(path.as_ref().to_path_buf());
        self
    }
}

/// Outcome of a run, complete or not
#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub run_id: Uuid,
    pub source: PathBuf,
    pub kind: EntityKind,
    pub schema: SchemaVariant,
    pub state: RunState,
    /// First line this run read
    pub start_line: u64,
    /// Lines read after positioning, record-bearing or not
    pub lines_processed: u64,
    pub records_committed: u64,
    /// Committed records whose rich text fell back to the raw value
    pub records_flagged: u64,
    pub non_record_lines: u64,
    /// Rows that belong to another kind of the same dump
    pub filtered: u64,
    /// Records rejected by the store under the `skip` policy
    pub failed: u64,
    pub bytes_skipped: u64,
    pub bytes_consumed: u64,
    pub total_bytes: u64,
    pub started_at: DateTime<Utc>,
    pub elapsed_seconds: f64,
}

impl IngestReport {
    fn new(run_id: Uuid, options: &IngestOptions, schema: SchemaVariant) -> Self {
        Self {
            run_id,
            source: options.path.clone(),
            kind: options.kind,
            schema,
            state: RunState::Idle,
            start_line: 1,
            lines_processed: 0,
            records_committed: 0,
            records_flagged: 0,
            non_record_lines: 0,
            filtered: 0,
            failed: 0,
            bytes_skipped: 0,
            bytes_consumed: 0,
            total_bytes: 0,
            started_at: Utc::now(),
            elapsed_seconds: 0.0,
        }
    }

    pub fn percent(&self) -> u8 {
        crate::reader::progress(self.bytes_consumed, self.total_bytes)
    }
}

/// A run that ended on a fatal fault
#[derive(Debug, Error)]
#[error("run aborted after {lines} lines: {error}", lines = .report.lines_processed)]
pub struct RunFailure {
    pub report: IngestReport,
    #[source]
    pub error: IngestError,
}

/// Reader position just past a fully handled line
#[derive(Debug, Clone, Copy)]
struct SafePoint {
    next_line: u64,
    byte_offset: u64,
}

impl SafePoint {
    fn of(reader: &DumpReader) -> Self {
        Self {
            next_line: reader.next_line_number(),
            byte_offset: reader.bytes_consumed(),
        }
    }
}

struct Run<'a> {
    report: IngestReport,
    checkpoint_path: Option<&'a Path>,
    base_lines: u64,
    base_committed: u64,
    pending_flagged: u64,
    /// Last position whose outcome is durable
    safe: SafePoint,
    /// Last position whose line was handled, durable or not
    processed: SafePoint,
    clock: Instant,
}

pub struct Ingestor<'a> {
    store: &'a mut dyn Store,
    settings: &'a IngestConfig,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a mut dyn Store, settings: &'a IngestConfig) -> Self {
        Self { store, settings }
    }

    pub fn run(&mut self, options: &IngestOptions) -> Result<IngestReport, RunFailure> {
        self.run_with_progress(options, |_| {})
    }

    /// Run the pipeline, calling `on_progress` whenever the integer percentage
    /// of the file consumed increases.
    pub fn run_with_progress<F>(
        &mut self,
        options: &IngestOptions,
        mut on_progress: F,
    ) -> Result<IngestReport, RunFailure>
    where
        F: FnMut(u8),
    {
        let run_id = Uuid::new_v4();
        let span = info_span!(
            "ingest",
            %run_id,
            file = %options.path.display(),
            kind = %options.kind
        );
        let _enter = span.enter();

        let mut run = Run {
            report: IngestReport::new(run_id, options, self.settings.schema),
            checkpoint_path: options.checkpoint_path.as_deref(),
            base_lines: 0,
            base_committed: 0,
            pending_flagged: 0,
            safe: SafePoint { next_line: 1, byte_offset: 0 },
            processed: SafePoint { next_line: 1, byte_offset: 0 },
            clock: Instant::now(),
        };

        let dispatcher = match Dispatcher::new(
            self.settings.schema,
            options.kind,
            FieldTransformer::new(self.settings.max_markup_depth),
        ) {
            Ok(d) => d,
            Err(e) => {
                error!("Run kind rejected: {}", e);
                return Err(run.fail(unknown_kind(e)));
            }
        };

        let mut reader = match DumpReader::open(&options.path) {
            Ok(r) => r,
            Err(e) => {
                error!("Failed to open dump: {}", e);
                return Err(run.fail(e.into()));
            }
        };
        run.report.state = reader.state();
        run.report.total_bytes = reader.total_bytes();

        if let Err(e) = self.position(&mut reader, options, &mut run) {
            reader.abort();
            run.sync(&reader);
            error!("Failed to position reader: {}", e);
            return Err(run.fail(e));
        }
        run.safe = SafePoint::of(&reader);
        run.processed = run.safe;
        run.report.start_line = run.safe.next_line;

        info!(
            start_line = run.report.start_line,
            total_bytes = run.report.total_bytes,
            schema = %self.settings.schema,
            "Starting ingest"
        );

        let mut gate = ProgressGate::new();
        if let Some(pct) = gate.update(reader.bytes_consumed(), reader.total_bytes()) {
            on_progress(pct);
        }

        let interval = self.settings.checkpoint_interval.max(1);
        let mut checkpoint_due = false;
        let outcome = loop {
            let line = match reader.next() {
                Some(Ok(line)) => line,
                Some(Err(e)) => break Err(IngestError::from(e)),
                None => break Ok(()),
            };
            if let Err(e) = self.process_line(&dispatcher, &line, &mut run) {
                reader.abort();
                break Err(e);
            }
            run.report.lines_processed += 1;

            run.processed = SafePoint::of(&reader);
            if self.store.pending() == 0 {
                run.safe = run.processed;
            }

            if let Some(pct) = gate.update(reader.bytes_consumed(), reader.total_bytes()) {
                on_progress(pct);
            }

            if run.report.lines_processed % interval == 0 {
                checkpoint_due = true;
            }
            // Only a commit boundary is a safe resume point
            if checkpoint_due && self.store.pending() == 0 {
                run.save_checkpoint(options.kind);
                checkpoint_due = false;
            }
        };

        let outcome = match self.store.flush() {
            Ok(()) => {
                run.safe = run.processed;
                run.promote_pending();
                outcome
            }
            Err(e) if outcome.is_ok() => {
                reader.abort();
                Err(IngestError::persistence(run.processed.next_line, e))
            }
            Err(e) => {
                warn!("Failed to commit pending records after fault: {}", e);
                outcome
            }
        };

        run.sync(&reader);
        run.report.records_committed -= self.store.pending() as u64;
        run.save_checkpoint(options.kind);

        match outcome {
            Ok(()) => {
                info!(
                    lines = run.report.lines_processed,
                    committed = run.report.records_committed,
                    flagged = run.report.records_flagged,
                    "Ingest completed"
                );
                Ok(run.finish())
            }
            Err(e) => {
                error!(
                    lines = run.report.lines_processed,
                    committed = run.report.records_committed,
                    "Ingest aborted: {}",
                    e
                );
                Err(run.fail(e))
            }
        }
    }

    fn position(
        &mut self,
        reader: &mut DumpReader,
        options: &IngestOptions,
        run: &mut Run<'_>,
    ) -> Result<(), IngestError> {
        match options.start {
            StartPosition::Line(line) if line > 1 => {
                run.report.bytes_skipped = reader.skip(line - 1)?;
            }
            StartPosition::Line(_) => {}
            StartPosition::Resume => {
                let path = options.checkpoint_path.as_deref().ok_or_else(|| {
                    CheckpointError::Mismatch("resume requested without a checkpoint path".into())
                })?;
                let checkpoint = Checkpoint::load(path)?;
                checkpoint.validate(&options.path, options.kind, reader.total_bytes())?;
                reader.seek_to(checkpoint.byte_offset, checkpoint.next_line)?;
                run.report.bytes_skipped = checkpoint.byte_offset;
                run.base_lines = checkpoint.lines_processed;
                run.base_committed = checkpoint.records_committed;
                info!(
                    next_line = checkpoint.next_line,
                    byte_offset = checkpoint.byte_offset,
                    previous_run = %checkpoint.run_id,
                    "Resuming from checkpoint"
                );
            }
        }
        Ok(())
    }

    fn process_line(
        &mut self,
        dispatcher: &Dispatcher,
        line: &Line,
        run: &mut Run<'_>,
    ) -> Result<(), IngestError> {
        let Some(row) = extract(&line.text) else {
            run.report.non_record_lines += 1;
            return Ok(());
        };

        let record = match dispatcher.dispatch(&row) {
            Ok(Dispatched::Record(record)) => record,
            Ok(Dispatched::Filtered { kind, post_type_id }) => {
                debug!(line = line.number, %kind, post_type_id, "Row filtered");
                run.report.filtered += 1;
                return Ok(());
            }
            Err(e @ DispatchError::UnknownKind(_)) => return Err(unknown_kind(e)),
            Err(e) => return self.reject(line.number, e, run),
        };

        match self.store.upsert(&record) {
            Ok(()) => {
                debug!(line = line.number, id = record.id(), "Record upserted");
                run.report.records_committed += 1;
                if record.has_error_flag() {
                    warn!(
                        line = line.number,
                        id = record.id(),
                        "Rich text stored unconverted"
                    );
                    run.pending_flagged += 1;
                }
                if self.store.pending() == 0 {
                    run.promote_pending();
                }
                Ok(())
            }
            Err(e) => self.reject(line.number, e, run),
        }
    }

    /// Apply the fault policy to a record the store cannot accept.
    fn reject(
        &self,
        line: u64,
        err: impl std::fmt::Display,
        run: &mut Run<'_>,
    ) -> Result<(), IngestError> {
        match self.settings.on_persistence_fault {
            FaultPolicy::Abort => Err(IngestError::persistence(line, err)),
            FaultPolicy::Skip => {
                warn!(line, "Skipping record: {}", err);
                run.report.failed += 1;
                Ok(())
            }
        }
    }
}

fn unknown_kind(e: DispatchError) -> IngestError {
    match e {
        DispatchError::UnknownKind(name) => IngestError::UnknownKind(name),
        other => IngestError::UnknownKind(other.to_string()),
    }
}

impl Run<'_> {
    fn sync(&mut self, reader: &DumpReader) {
        self.report.state = reader.state();
        self.report.bytes_consumed = reader.bytes_consumed();
    }

    fn promote_pending(&mut self) {
        self.report.records_flagged += self.pending_flagged;
        self.pending_flagged = 0;
    }

    fn save_checkpoint(&self, kind: EntityKind) {
        let Some(path) = self.checkpoint_path else {
            return;
        };
        let lines_done = self.safe.next_line.saturating_sub(self.report.start_line);
        let checkpoint = Checkpoint {
            source_path: self.report.source.clone(),
            kind,
            next_line: self.safe.next_line,
            byte_offset: self.safe.byte_offset,
            lines_processed: self.base_lines + lines_done,
            records_committed: self.base_committed + self.report.records_committed,
            run_id: self.report.run_id,
            saved_at: Utc::now(),
        };
        match checkpoint.save(path) {
            Ok(()) => debug!(next_line = checkpoint.next_line, "Checkpoint saved"),
            Err(e) => warn!("Failed to save checkpoint: {}", e),
        }
    }

    fn finish(mut self) -> IngestReport {
        self.report.elapsed_seconds = self.clock.elapsed().as_secs_f64();
        self.report
    }

    fn fail(self, error: IngestError) -> RunFailure {
        RunFailure {
            report: self.finish(),
            error,
        }
    }
}
