#![allow(dead_code)]

use rusqlite::types::Value;
use stackdump_loader::config::IngestConfig;
use stackdump_loader::models::SchemaVariant;
use stackdump_loader::store::sqlite::SqliteStore;
use stackdump_loader::store::{CommitPolicy, Store};
use std::fs;
use std::path::{Path, PathBuf};

pub const DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Write a dump with the usual declaration and container element around `rows`.
pub fn write_dump(dir: &Path, name: &str, container: &str, rows: &[String]) -> PathBuf {
    let mut content = format!("{}\n<{}>\n", DECLARATION, container);
    for row in rows {
        content.push_str("  ");
        content.push_str(row);
        content.push('\n');
    }
    content.push_str(&format!("</{}>\n", container));
    write_raw(dir, name, &content)
}

pub fn write_raw(dir: &Path, name: &str, content: &str) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, content).unwrap();
    path
}

pub fn comment_row(id: i64, post_id: i64, text: &str) -> String {
    format!(
        r#"<row Id="{}" PostId="{}" Score="1" Text="{}" CreationDate="2011-05-01T10:00:00.000" UserId="7" ContentLicense="CC BY-SA 3.0" />"#,
        id, post_id, text
    )
}

pub fn post_row(id: i64, post_type: i64, body: &str) -> String {
    format!(
        r#"<row Id="{}" PostTypeId="{}" CreationDate="2010-01-01T00:00:00.000" Score="5" Body="{}" Title="Post {}" Tags="&lt;rust&gt;&lt;sqlite&gt;" />"#,
        id, post_type, body, id
    )
}

pub fn settings(schema: SchemaVariant) -> IngestConfig {
    IngestConfig {
        schema,
        ..Default::default()
    }
}

pub fn open_store(path: &Path, schema: SchemaVariant, policy: CommitPolicy) -> SqliteStore {
    let mut store = SqliteStore::open(path, policy).unwrap();
    store.create_schema(schema).unwrap();
    store
}

/// Every row of `table`, ordered by Id, as plain values for comparison.
pub fn dump_table(store: &SqliteStore, table: &str) -> Vec<Vec<Value>> {
    let sql = format!("SELECT * FROM {} ORDER BY Id", table);
    let mut stmt = store.connection().prepare(&sql).unwrap();
    let columns = stmt.column_count();
    let rows = stmt
        .query_map([], |row| {
            (0..columns)
                .map(|i| row.get::<_, Value>(i))
                .collect::<Result<Vec<_>, _>>()
        })
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    rows
}

pub fn ids(store: &SqliteStore, table: &str) -> Vec<i64> {
    let sql = format!("SELECT Id FROM {} ORDER BY Id", table);
    let mut stmt = store.connection().prepare(&sql).unwrap();
    let rows = stmt
        .query_map([], |row| row.get(0))
        .unwrap()
        .map(|r| r.unwrap())
        .collect();
    rows
}
