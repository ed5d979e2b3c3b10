//! End-to-end pipeline tests against real SQLite files

mod common;

use common::*;
use rusqlite::types::Value;
use stackdump_loader::checkpoint::Checkpoint;
use stackdump_loader::config::{FaultPolicy, IngestConfig};
use stackdump_loader::error::IngestError;
use stackdump_loader::models::{EntityKind, SchemaVariant};
use stackdump_loader::pipeline::{IngestOptions, Ingestor};
use stackdump_loader::reader::RunState;
use stackdump_loader::store::{CommitPolicy, Store};
use std::fs;
use tempfile::TempDir;

fn comment_rows(range: std::ops::RangeInclusive<i64>) -> Vec<String> {
    range.map(|id| comment_row(id, id * 10, "nice &amp; clear")).collect()
}

#[test]
fn test_rerun_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &comment_rows(1..=20));
    let settings = settings(SchemaVariant::Primary);
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);
    let options = IngestOptions::new(&dump, EntityKind::Comments);

    let first = Ingestor::new(&mut store, &settings).run(&options).unwrap();
    let after_first = dump_table(&store, "comments");
    let second = Ingestor::new(&mut store, &settings).run(&options).unwrap();
    let after_second = dump_table(&store, "comments");

    assert_eq!(first.records_committed, 20);
    assert_eq!(second.records_committed, 20);
    assert_eq!(after_first.len(), 20);
    assert_eq!(after_first, after_second);
    assert_eq!(second.state, RunState::Completed);
}

#[test]
fn test_start_line_matches_full_run_suffix() {
    let dir = TempDir::new().unwrap();
    // Lines: 1 declaration, 2 <comments>, 3..=12 ids 1..=10, 13 </comments>
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &comment_rows(1..=10));
    let settings = settings(SchemaVariant::Primary);

    let mut full = open_store(&dir.path().join("full.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);
    Ingestor::new(&mut full, &settings)
        .run(&IngestOptions::new(&dump, EntityKind::Comments))
        .unwrap();

    let mut partial = open_store(&dir.path().join("partial.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);
    let report = Ingestor::new(&mut partial, &settings)
        .run(&IngestOptions::new(&dump, EntityKind::Comments).start_line(7))
        .unwrap();

    // Line 7 holds id 5
    let expected: Vec<Vec<Value>> = dump_table(&full, "comments")
        .into_iter()
        .filter(|row| matches!(row[0], Value::Integer(id) if id >= 5))
        .collect();
    assert_eq!(dump_table(&partial, "comments"), expected);
    assert_eq!(report.start_line, 7);
    assert_eq!(report.lines_processed, 7);
    assert_eq!(report.records_committed, 6);
}

#[test]
fn test_bytes_skipped_plus_streamed_equals_file_size() {
    let dir = TempDir::new().unwrap();
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &comment_rows(1..=8));
    let size = fs::metadata(&dump).unwrap().len();
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);

    let report = Ingestor::new(&mut store, &settings(SchemaVariant::Primary))
        .run(&IngestOptions::new(&dump, EntityKind::Comments).start_line(5))
        .unwrap();

    assert!(report.bytes_skipped > 0);
    assert_eq!(report.total_bytes, size);
    assert_eq!(report.bytes_consumed, size);
    assert_eq!(report.percent(), 100);
}

#[test]
fn test_unknown_kind_aborts_after_committed_rows() {
    let dir = TempDir::new().unwrap();
    let mut rows = comment_rows(1..=3);
    rows.push(r#"<question Id="99" Title="wrong dump" />"#.to_string());
    rows.push(comment_row(4, 40, "never reached"));
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &rows);
    let checkpoint_path = dir.path().join("cp.json");
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);

    let failure = Ingestor::new(&mut store, &settings(SchemaVariant::Primary))
        .run(&IngestOptions::new(&dump, EntityKind::Comments).with_checkpoint(&checkpoint_path))
        .unwrap_err();

    assert!(matches!(failure.error, IngestError::UnknownKind(ref name) if name == "question"));
    assert_eq!(failure.report.state, RunState::Aborted);
    // declaration, container and three rows; the offending line does not count
    assert_eq!(failure.report.lines_processed, 5);
    assert_eq!(failure.report.records_committed, 3);
    assert_eq!(ids(&store, "comments"), vec![1, 2, 3]);

    let checkpoint = Checkpoint::load(&checkpoint_path).unwrap();
    assert_eq!(checkpoint.lines_processed, failure.report.lines_processed);
}

#[test]
fn test_missing_attributes_use_per_field_defaults() {
    let dir = TempDir::new().unwrap();
    let comments = write_dump(
        dir.path(),
        "Comments.xml",
        "comments",
        &[r#"<row Id="1" Text="bare" />"#.to_string()],
    );
    let posts = write_dump(
        dir.path(),
        "Posts.xml",
        "posts",
        &[r#"<row Id="2" PostTypeId="1" Body="" />"#.to_string()],
    );
    let settings = settings(SchemaVariant::Primary);
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);

    Ingestor::new(&mut store, &settings)
        .run(&IngestOptions::new(&comments, EntityKind::Comments))
        .unwrap();
    Ingestor::new(&mut store, &settings)
        .run(&IngestOptions::new(&posts, EntityKind::Posts))
        .unwrap();

    let (post_id, score, user_id, error): (i64, i64, i64, bool) = store
        .connection()
        .query_row("SELECT PostId, Score, UserId, Error FROM comments WHERE Id = 1", [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?, r.get(3)?))
        })
        .unwrap();
    assert_eq!((post_id, score, user_id, error), (0, 0, 0, false));

    let (score, body, error): (Option<i64>, Option<String>, bool) = store
        .connection()
        .query_row("SELECT Score, Body, Error FROM posts WHERE Id = 2", [], |r| {
            Ok((r.get(0)?, r.get(1)?, r.get(2)?))
        })
        .unwrap();
    assert_eq!(score, None);
    assert_eq!(body, None);
    assert!(!error);
}

#[test]
fn test_rich_text_conversion_and_fallback() {
    let dir = TempDir::new().unwrap();
    let dump = write_dump(
        dir.path(),
        "Posts.xml",
        "posts",
        &[
            post_row(1, 1, "&lt;p&gt;Hello &lt;strong&gt;world&lt;/strong&gt;&lt;/p&gt;"),
            post_row(
                2,
                1,
                "&lt;div&gt;&lt;div&gt;&lt;div&gt;deep&lt;/div&gt;&lt;/div&gt;&lt;/div&gt;",
            ),
        ],
    );
    let settings = IngestConfig {
        max_markup_depth: 2,
        ..settings(SchemaVariant::Primary)
    };
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);

    let report = Ingestor::new(&mut store, &settings)
        .run(&IngestOptions::new(&dump, EntityKind::Posts))
        .unwrap();
    assert_eq!(report.records_committed, 2);
    assert_eq!(report.records_flagged, 1);

    let row = |id: i64| -> (String, bool, String) {
        store
            .connection()
            .query_row("SELECT Body, Error, Tags FROM posts WHERE Id = ?1", [id], |r| {
                Ok((r.get(0)?, r.get(1)?, r.get(2)?))
            })
            .unwrap()
    };

    let (body, error, tags) = row(1);
    assert_eq!(body.trim(), "Hello **world**");
    assert!(!error);
    assert_eq!(tags, "rust, sqlite");

    let (body, error, _) = row(2);
    assert_eq!(body, "<div><div><div>deep</div></div></div>");
    assert!(error);
}

#[test]
fn test_checkpoint_written_on_abort_points_at_faulting_line() {
    let dir = TempDir::new().unwrap();
    let mut rows = comment_rows(1..=4);
    rows.push(r#"<badge Id="1" />"#.to_string());
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &rows);
    let checkpoint_path = dir.path().join("comments.checkpoint.json");
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);

    let failure = Ingestor::new(&mut store, &settings(SchemaVariant::Primary))
        .run(&IngestOptions::new(&dump, EntityKind::Comments).with_checkpoint(&checkpoint_path))
        .unwrap_err();
    assert!(matches!(failure.error, IngestError::UnknownKind(_)));

    let checkpoint = Checkpoint::load(&checkpoint_path).unwrap();
    // Rows occupy lines 3..=6, the bad element is line 7
    assert_eq!(checkpoint.next_line, 7);
    assert_eq!(checkpoint.records_committed, 4);
    assert_eq!(checkpoint.kind, EntityKind::Comments);
    assert_eq!(checkpoint.run_id, failure.report.run_id);
}

#[test]
fn test_resume_seeks_past_processed_prefix() {
    let dir = TempDir::new().unwrap();
    let rows = comment_rows(1..=5);
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &rows);
    let first_size = fs::metadata(&dump).unwrap().len();
    let checkpoint_path = dir.path().join("state").join("comments.json");
    let settings = IngestConfig {
        checkpoint_interval: 2,
        ..settings(SchemaVariant::Primary)
    };
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);
    let options = IngestOptions::new(&dump, EntityKind::Comments).with_checkpoint(&checkpoint_path);

    let first = Ingestor::new(&mut store, &settings).run(&options).unwrap();
    assert_eq!(first.lines_processed, 8);

    let saved = Checkpoint::load(&checkpoint_path).unwrap();
    assert_eq!(saved.byte_offset, first_size);
    assert_eq!(saved.next_line, 9);

    // The dump grows; a resume only reads the new lines
    let mut content = fs::read_to_string(&dump).unwrap();
    content.push_str(&comment_row(6, 60, "appended"));
    content.push('\n');
    content.push_str(&comment_row(7, 70, "appended"));
    content.push('\n');
    fs::write(&dump, content).unwrap();

    let resumed = Ingestor::new(&mut store, &settings)
        .run(&options.clone().resume())
        .unwrap();
    assert_eq!(resumed.start_line, 9);
    assert_eq!(resumed.bytes_skipped, first_size);
    assert_eq!(resumed.lines_processed, 2);
    assert_eq!(resumed.records_committed, 2);
    assert_eq!(ids(&store, "comments"), (1..=7).collect::<Vec<_>>());

    let saved = Checkpoint::load(&checkpoint_path).unwrap();
    assert_eq!(saved.lines_processed, 10);
    assert_eq!(saved.records_committed, 7);
}

#[test]
fn test_resume_rejects_checkpoint_for_another_kind() {
    let dir = TempDir::new().unwrap();
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &comment_rows(1..=2));
    let checkpoint_path = dir.path().join("cp.json");
    let settings = settings(SchemaVariant::Primary);
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);

    Ingestor::new(&mut store, &settings)
        .run(&IngestOptions::new(&dump, EntityKind::Comments).with_checkpoint(&checkpoint_path))
        .unwrap();

    let failure = Ingestor::new(&mut store, &settings)
        .run(
            &IngestOptions::new(&dump, EntityKind::Votes)
                .with_checkpoint(&checkpoint_path)
                .resume(),
        )
        .unwrap_err();
    assert!(matches!(failure.error, IngestError::Checkpoint(_)));
    assert_eq!(failure.report.lines_processed, 0);
}

#[test]
fn test_question_answer_schema_filters_by_post_type() {
    let dir = TempDir::new().unwrap();
    let dump = write_dump(
        dir.path(),
        "Posts.xml",
        "posts",
        &[
            post_row(1, 1, "&lt;p&gt;Q1&lt;/p&gt;"),
            r#"<row Id="2" PostTypeId="2" ParentId="1" Body="&lt;p&gt;A1&lt;/p&gt;" />"#.to_string(),
            post_row(3, 1, "&lt;p&gt;Q2&lt;/p&gt;"),
        ],
    );
    let settings = settings(SchemaVariant::QuestionAnswer);
    let mut store = open_store(&dir.path().join("qa.db"), SchemaVariant::QuestionAnswer, CommitPolicy::PerRecord);

    let questions = Ingestor::new(&mut store, &settings)
        .run(&IngestOptions::new(&dump, EntityKind::Questions))
        .unwrap();
    let answers = Ingestor::new(&mut store, &settings)
        .run(&IngestOptions::new(&dump, EntityKind::Answers))
        .unwrap();

    assert_eq!(questions.records_committed, 2);
    assert_eq!(questions.filtered, 1);
    assert_eq!(answers.records_committed, 1);
    assert_eq!(answers.filtered, 2);
    assert_eq!(ids(&store, "questions"), vec![1, 3]);
    assert_eq!(ids(&store, "answers"), vec![2]);

    let parent: i64 = store
        .connection()
        .query_row("SELECT ParentId FROM answers WHERE Id = 2", [], |r| r.get(0))
        .unwrap();
    assert_eq!(parent, 1);
}

#[test]
fn test_run_kind_outside_schema_fails_before_reading() {
    let dir = TempDir::new().unwrap();
    let dump = write_dump(dir.path(), "Posts.xml", "posts", &[post_row(1, 1, "x")]);
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);

    let failure = Ingestor::new(&mut store, &settings(SchemaVariant::Primary))
        .run(&IngestOptions::new(&dump, EntityKind::Questions))
        .unwrap_err();
    assert!(matches!(failure.error, IngestError::UnknownKind(_)));
    assert_eq!(failure.report.lines_processed, 0);
    assert_eq!(failure.report.state, RunState::Idle);
}

#[test]
fn test_batch_commit_flushes_on_completion_and_abort() {
    let dir = TempDir::new().unwrap();
    let settings = IngestConfig {
        commit_batch: 3,
        ..settings(SchemaVariant::Primary)
    };

    let complete = write_dump(dir.path(), "Comments.xml", "comments", &comment_rows(1..=7));
    let mut store = open_store(&dir.path().join("a.db"), SchemaVariant::Primary, CommitPolicy::Batch(3));
    let report = Ingestor::new(&mut store, &settings)
        .run(&IngestOptions::new(&complete, EntityKind::Comments))
        .unwrap();
    assert_eq!(report.records_committed, 7);
    assert_eq!(store.pending(), 0);
    assert_eq!(store.count(EntityKind::Comments).unwrap(), 7);

    let mut rows = comment_rows(1..=4);
    rows.push(r#"<tagsynonym Id="1" />"#.to_string());
    let aborted = write_dump(dir.path(), "Broken.xml", "comments", &rows);
    let mut store = open_store(&dir.path().join("b.db"), SchemaVariant::Primary, CommitPolicy::Batch(3));
    let failure = Ingestor::new(&mut store, &settings)
        .run(&IngestOptions::new(&aborted, EntityKind::Comments))
        .unwrap_err();
    assert_eq!(failure.report.records_committed, 4);
    assert_eq!(ids(&store, "comments"), vec![1, 2, 3, 4]);
}

#[test]
fn test_fault_policy_abort_and_skip() {
    let dir = TempDir::new().unwrap();
    let rows = vec![
        comment_row(1, 10, "ok"),
        r#"<row Id="2" PostId="twenty" Text="bad" />"#.to_string(),
        comment_row(3, 30, "ok"),
    ];
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &rows);

    let mut store = open_store(&dir.path().join("abort.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);
    let failure = Ingestor::new(&mut store, &settings(SchemaVariant::Primary))
        .run(&IngestOptions::new(&dump, EntityKind::Comments))
        .unwrap_err();
    assert!(matches!(failure.error, IngestError::Persistence { line: 4, .. }));
    assert_eq!(failure.report.lines_processed, 3);
    assert_eq!(ids(&store, "comments"), vec![1]);

    let skip = IngestConfig {
        on_persistence_fault: FaultPolicy::Skip,
        ..settings(SchemaVariant::Primary)
    };
    let mut store = open_store(&dir.path().join("skip.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);
    let report = Ingestor::new(&mut store, &skip)
        .run(&IngestOptions::new(&dump, EntityKind::Comments))
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.records_committed, 2);
    assert_eq!(ids(&store, "comments"), vec![1, 3]);
}

/// Make the store itself refuse comments with a negative score.
fn reject_negative_scores(store: &stackdump_loader::store::sqlite::SqliteStore) {
    store
        .connection()
        .execute_batch(
            "CREATE TRIGGER reject_negative_score BEFORE INSERT ON comments \
             WHEN NEW.Score < 0 BEGIN SELECT RAISE(ABORT, 'negative score'); END;",
        )
        .unwrap();
}

#[test]
fn test_store_rejection_inside_batch_keeps_pending_rows() {
    let dir = TempDir::new().unwrap();
    let rows = vec![
        comment_row(1, 10, "ok"),
        comment_row(2, 20, "ok"),
        r#"<row Id="3" PostId="30" Score="-1" Text="rejected" />"#.to_string(),
        comment_row(4, 40, "ok"),
    ];
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &rows);
    let batched = IngestConfig {
        commit_batch: 10,
        ..settings(SchemaVariant::Primary)
    };

    let checkpoint_path = dir.path().join("abort.json");
    let mut store = open_store(&dir.path().join("abort.db"), SchemaVariant::Primary, CommitPolicy::Batch(10));
    reject_negative_scores(&store);
    let failure = Ingestor::new(&mut store, &batched)
        .run(&IngestOptions::new(&dump, EntityKind::Comments).with_checkpoint(&checkpoint_path))
        .unwrap_err();
    assert!(matches!(failure.error, IngestError::Persistence { line: 5, .. }));
    assert_eq!(failure.report.records_committed, 2);
    assert_eq!(store.pending(), 0);
    assert_eq!(ids(&store, "comments"), vec![1, 2]);
    let checkpoint = Checkpoint::load(&checkpoint_path).unwrap();
    assert_eq!(checkpoint.next_line, 5);
    assert_eq!(checkpoint.records_committed, 2);

    let skip = IngestConfig {
        on_persistence_fault: FaultPolicy::Skip,
        ..batched
    };
    let mut store = open_store(&dir.path().join("skip.db"), SchemaVariant::Primary, CommitPolicy::Batch(10));
    reject_negative_scores(&store);
    let report = Ingestor::new(&mut store, &skip)
        .run(&IngestOptions::new(&dump, EntityKind::Comments))
        .unwrap();
    assert_eq!(report.failed, 1);
    assert_eq!(report.records_committed, 3);
    assert_eq!(ids(&store, "comments"), vec![1, 2, 4]);
}

#[test]
fn test_progress_reports_only_increases() {
    let dir = TempDir::new().unwrap();
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &comment_rows(1..=300));
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);

    let mut seen = Vec::new();
    let report = Ingestor::new(&mut store, &settings(SchemaVariant::Primary))
        .run_with_progress(&IngestOptions::new(&dump, EntityKind::Comments), |pct| seen.push(pct))
        .unwrap();

    assert!(seen.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(seen.first(), Some(&0));
    assert_eq!(seen.last(), Some(&100));
    assert!(seen.len() <= 101);
    assert_eq!(report.lines_processed, 303);
}

#[test]
fn test_start_line_past_end_completes_empty() {
    let dir = TempDir::new().unwrap();
    let dump = write_dump(dir.path(), "Comments.xml", "comments", &comment_rows(1..=2));
    let mut store = open_store(&dir.path().join("so.db"), SchemaVariant::Primary, CommitPolicy::PerRecord);

    let report = Ingestor::new(&mut store, &settings(SchemaVariant::Primary))
        .run(&IngestOptions::new(&dump, EntityKind::Comments).start_line(1000))
        .unwrap();
    assert_eq!(report.lines_processed, 0);
    assert_eq!(report.state, RunState::Completed);
    assert_eq!(store.count(EntityKind::Comments).unwrap(), 0);
}
