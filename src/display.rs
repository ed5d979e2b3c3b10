//! Terminal output
//!
//! Human-readable colored output for interactive runs and structured JSON for
//! scripts. Progress is drawn with an `indicatif` bar fed by the pipeline's
//! progress gate, so it only redraws when the integer percentage moves.
//!
//! ## Key Types
//!
//! - [`IngestProgress`] - 0-100 progress bar for one run (silent in quiet mode)
//! - [`DisplayManager`] - run summaries, failures, file listings and DDL
//!
//! ## JSON Output
//!
//! With `--json` the run report is printed as one object:
//! ```json
//! {
//!   "status": "completed",
//!   "report": { "kind": "Posts", "lines_processed": 1204, "records_committed": 1198, ... }
//! }
//! ```
//! A failed run adds an `"error"` string and uses `"status": "aborted"`.

use crate::file_discovery::DumpFile;
use crate::pipeline::{IngestReport, RunFailure};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};

pub struct IngestProgress {
    bar: Option<ProgressBar>,
}

impl IngestProgress {
    pub fn new(label: &str, quiet: bool) -> Self {
        let bar = if quiet {
            None
        } else {
            let pb = ProgressBar::new(100);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            pb.set_message(label.to_string());
            Some(pb)
        };
        Self { bar }
    }

    pub fn update(&self, percent: u8) {
        if let Some(ref pb) = self.bar {
            pb.set_position(u64::from(percent));
        }
    }

    pub fn finish(&self, report: &IngestReport) {
        if let Some(ref pb) = self.bar {
            pb.finish_with_message(format!("{} lines", report.lines_processed));
        }
    }

    pub fn abandon(&self) {
        if let Some(ref pb) = self.bar {
            pb.abandon_with_message("aborted");
        }
    }
}

pub struct DisplayManager;

impl Default for DisplayManager {
    fn default() -> Self {
        Self::new()
    }
}

impl DisplayManager {
    pub fn new() -> Self {
        Self
    }

    pub fn display_report(&self, report: &IngestReport, json_output: bool) {
        if json_output {
            self.print_json(serde_json::json!({
                "status": "completed",
                "report": report,
            }));
            return;
        }

        println!("\n{}", "=".repeat(60).bright_cyan());
        println!(
            "{} {} {}",
            "Ingest complete:".bright_white().bold(),
            report.kind.to_string().bright_yellow(),
            format!("({})", report.source.display()).dimmed()
        );
        println!("{}", "=".repeat(60).bright_cyan());
        self.print_counts(report);
    }

    pub fn display_failure(&self, failure: &RunFailure, json_output: bool) {
        let report = &failure.report;
        if json_output {
            self.print_json(serde_json::json!({
                "status": "aborted",
                "error": failure.error.to_string(),
                "report": report,
            }));
            return;
        }

        eprintln!("\n{} {}", "Ingest aborted:".bright_red().bold(), failure.error);
        eprintln!(
            "{} {} lines processed before the fault",
            "→".bright_red(),
            report.lines_processed.to_string().bright_white().bold()
        );
        self.print_counts(report);
    }

    fn print_counts(&self, report: &IngestReport) {
        let row = |label: &str, value: String| println!("  {:<22} {}", label, value);

        row("Run ID:", report.run_id.to_string().dimmed().to_string());
        row("Schema:", report.schema.to_string());
        row("Start line:", report.start_line.to_string());
        row("Lines processed:", report.lines_processed.to_string().bright_white().bold().to_string());
        row("Records committed:", report.records_committed.to_string().bright_green().to_string());
        if report.records_flagged > 0 {
            row("Flagged (raw text):", report.records_flagged.to_string().yellow().to_string());
        }
        row("Non-record lines:", report.non_record_lines.to_string());
        if report.filtered > 0 {
            row("Filtered:", report.filtered.to_string());
        }
        if report.failed > 0 {
            row("Failed (skipped):", report.failed.to_string().bright_red().to_string());
        }
        row(
            "Bytes:",
            format!(
                "{} / {} ({}%)",
                report.bytes_consumed,
                report.total_bytes,
                report.percent()
            ),
        );
        row("Elapsed:", format!("{:.1}s", report.elapsed_seconds));
    }

    pub fn display_files(&self, files: &[DumpFile], json_output: bool) {
        if json_output {
            let entries: Vec<_> = files
                .iter()
                .map(|f| {
                    serde_json::json!({
                        "path": f.path,
                        "size": f.size,
                        "kind": f.kind_hint,
                    })
                })
                .collect();
            self.print_json(serde_json::json!({ "files": entries }));
            return;
        }

        if files.is_empty() {
            println!("{}", "No dump files found".yellow());
            return;
        }

        for (i, file) in files.iter().enumerate() {
            let kind = file
                .kind_hint
                .map(|k| k.to_string())
                .unwrap_or_else(|| "?".to_string());
            println!(
                "{:>3}. {} {} {}",
                i + 1,
                file.path.display().to_string().bright_white(),
                format!("[{kind}]").bright_yellow(),
                format_size(file.size).dimmed()
            );
        }
    }

    pub fn display_schema(&self, statements: &[String]) {
        for sql in statements {
            println!("{};\n", sql);
        }
    }

    fn print_json(&self, value: serde_json::Value) {
        match serde_json::to_string_pretty(&value) {
            Ok(json_str) => println!("{}", json_str),
            Err(e) => eprintln!("Error serializing output to JSON: {}", e),
        }
    }
}

fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KB", "MB", "GB"];
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{} {}", bytes, UNITS[0])
    } else {
        format!("{:.1} {}", size, UNITS[unit])
    }
}
