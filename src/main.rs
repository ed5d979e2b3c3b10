use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use stackdump_loader::config::{Config, DatabaseBackend, FaultPolicy};
use stackdump_loader::display::{DisplayManager, IngestProgress};
use stackdump_loader::file_discovery::{find_dump_files, kind_from_file_name, read_first_record};
use stackdump_loader::logging::init_logging;
use stackdump_loader::models::{EntityKind, SchemaVariant};
use stackdump_loader::pipeline::{IngestOptions, Ingestor};
use stackdump_loader::store::schema::table_for;
use stackdump_loader::store::{open_store, CommitPolicy, Dialect};

#[derive(Parser)]
#[command(name = "stackdump-loader")]
#[command(about = "Stream Stack Exchange XML dumps into a relational database")]
#[command(version)]
struct Cli {
    /// Config file (defaults to stackdump-loader.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load one dump file into its table
    Ingest {
        /// Dump file, e.g. inputs/Posts.xml
        file: PathBuf,
        /// Entity kind of the file (inferred from the file name when omitted)
        #[arg(long, value_enum, ignore_case = true)]
        kind: Option<EntityKind>,
        /// First line to process; earlier lines are skipped
        #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
        start_line: Option<u64>,
        /// Continue from the saved checkpoint
        #[arg(long, requires = "checkpoint", conflicts_with = "start_line")]
        resume: bool,
        /// Checkpoint file to save progress to (and resume from)
        #[arg(long)]
        checkpoint: Option<PathBuf>,
        /// Schema variant
        #[arg(long, value_enum)]
        schema: Option<SchemaVariant>,
        /// SQLite database file
        #[arg(long)]
        db: Option<PathBuf>,
        /// Records per commit
        #[arg(long)]
        batch: Option<usize>,
        /// What to do when the database rejects a record
        #[arg(long, value_enum)]
        on_fault: Option<FaultPolicy>,
        /// Output the run report as JSON
        #[arg(long)]
        json: bool,
        /// Hide the progress bar
        #[arg(long, short)]
        quiet: bool,
    },
    /// List dump files in the input folder
    List {
        /// Folder to search (defaults to INPUT_FOLDER)
        folder: Option<PathBuf>,
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },
    /// Show the first record of a dump file
    Peek {
        file: PathBuf,
    },
    /// Print the table definitions for the configured database
    Schema {
        #[arg(long, value_enum)]
        schema: Option<SchemaVariant>,
    },
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let mut config = Config::load(cli.config.as_deref())?;
    let display = DisplayManager::new();

    match cli.command {
        Commands::Ingest {
            file,
            kind,
            start_line,
            resume,
            checkpoint,
            schema,
            db,
            batch,
            on_fault,
            json,
            quiet,
        } => {
            if let Some(schema) = schema {
                config.ingest.schema = schema;
            }
            if let Some(db) = db {
                config.database.backend = DatabaseBackend::Sqlite;
                config.database.sqlite_path = db;
            }
            if let Some(batch) = batch {
                config.ingest.commit_batch = batch;
            }
            if let Some(policy) = on_fault {
                config.ingest.on_persistence_fault = policy;
            }
            config.validate()?;
            let _guard = init_logging(&config.logging, &config.paths.log_directory)?;

            let kind = kind
                .or_else(|| kind_from_file_name(&file))
                .ok_or_else(|| {
                    anyhow!("Cannot tell the kind of {}; pass --kind", file.display())
                })?;

            let mut options = IngestOptions::new(&file, kind);
            if let Some(path) = checkpoint {
                options = options.with_checkpoint(path);
            }
            options = match (resume, start_line) {
                (true, _) => options.resume(),
                (false, Some(line)) => options.start_line(line),
                (false, None) => options,
            };

            let mut store = open_store(
                &config.database,
                config.ingest.schema,
                CommitPolicy::from_batch_size(config.ingest.commit_batch),
            )
            .context("Failed to open database")?;

            let progress = IngestProgress::new(kind.name(), quiet || json);
            let mut ingestor = Ingestor::new(store.as_mut(), &config.ingest);
            match ingestor.run_with_progress(&options, |pct| progress.update(pct)) {
                Ok(report) => {
                    progress.finish(&report);
                    display.display_report(&report, json);
                    Ok(ExitCode::SUCCESS)
                }
                Err(failure) => {
                    progress.abandon();
                    display.display_failure(&failure, json);
                    Ok(ExitCode::FAILURE)
                }
            }
        }
        Commands::List { folder, json } => {
            config.validate()?;
            let _guard = init_logging(&config.logging, &config.paths.log_directory)?;
            let folder = folder.unwrap_or_else(|| config.paths.input_folder.clone());
            let files = find_dump_files(&folder)?;
            display.display_files(&files, json);
            Ok(ExitCode::SUCCESS)
        }
        Commands::Peek { file } => {
            match read_first_record(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?
            {
                Some((line, text)) => println!("{}: {}", line, text),
                None => println!("No record found in {}", file.display()),
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Schema { schema } => {
            let variant = schema.unwrap_or(config.ingest.schema);
            let dialect = match config.database.backend {
                DatabaseBackend::Sqlite => Dialect::Sqlite,
                DatabaseBackend::Postgres => Dialect::Postgres,
            };
            let statements: Vec<String> = variant
                .kinds()
                .iter()
                .map(|&kind| table_for(kind).create_sql(dialect))
                .collect();
            display.display_schema(&statements);
            Ok(ExitCode::SUCCESS)
        }
    }
}
