//! relstore CLI - inspect and edit a relational object store from the shell

use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use relstore::config::{self, RelstoreConfig};
use relstore::ui::{self, VariableRow};
use relstore::{Database, OpenMode, Options, Value};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser)]
#[command(name = "relstore")]
#[command(version = "0.0.1")]
#[command(about = "Relational object store - named values persisted as objects and items")]
#[command(long_about = r#"
relstore keeps named values (scalars, lists, tuples, dicts and ndarrays) in a
three-table SQLite schema with scalar deduplication and reference-counted
deletion.

Example usage:
  relstore init
  relstore set config '{"retries": 3, "hosts": ["a", "b"]}'
  relstore get config --pretty
  relstore check
"#)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to the config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Path to the database file (overrides the config)
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a relstore.toml with the given settings
    Init {
        /// Overwrite an existing config
        #[arg(short, long)]
        force: bool,

        /// Never reuse freed ids
        #[arg(long)]
        no_compact: bool,

        /// Array size above which indexing skips the position grid
        #[arg(long)]
        threshold: Option<usize>,
    },

    /// List variables with their types
    List,

    /// Print a variable as JSON
    Get {
        name: String,

        /// Pretty-print the JSON
        #[arg(short, long)]
        pretty: bool,
    },

    /// Bind a variable to a JSON value
    Set { name: String, json: String },

    /// Delete a variable and everything only it references
    Del { name: String },

    /// Show row counts
    Stats,

    /// Report integrity problems
    Check,

    /// Repair integrity problems
    Fix,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_config_path);
    let mut settings = config::load_config(Some(&config_path))?.unwrap_or_default();
    if let Some(database) = &cli.database {
        settings.database = Some(database.display().to_string());
    }

    match cli.command {
        Commands::Init { force, no_compact, threshold } => {
            let settings = RelstoreConfig {
                compact_ids: Some(!no_compact),
                indexing_threshold: threshold.or(settings.indexing_threshold),
                ..settings
            };
            config::write_config(&config_path, &settings, force)?;
            config::ensure_db_dir(&settings.database_path())?;
            ui::created(&config_path.display().to_string());
            ui::info("Database", &settings.database_path().display().to_string());
        }

        Commands::List => {
            let db = open(&settings, true)?;
            let mut rows = Vec::new();
            for name in db.names()? {
                let Some(id) = db.id_of(&name)? else {
                    continue;
                };
                rows.push(VariableRow {
                    tag: db.get(&name)?.type_tag()?,
                    refs: db.ref_count(id)?,
                    name,
                    id,
                });
            }
            if rows.is_empty() {
                println!("{}", ui::muted("(no variables)"));
            } else {
                println!("{}", ui::variables_table(&rows));
            }
        }

        Commands::Get { name, pretty } => {
            let db = open(&settings, true)?;
            let json = db.value(&name)?.to_json();
            let text = if pretty {
                serde_json::to_string_pretty(&json)?
            } else {
                serde_json::to_string(&json)?
            };
            println!("{}", text);
        }

        Commands::Set { name, json } => {
            let db = open(&settings, false)?;
            let parsed: serde_json::Value =
                serde_json::from_str(&json).with_context(|| format!("invalid JSON for {}", name))?;
            db.set(&name, Value::from_json(parsed))?;
            ui::success(&format!("{} set", ui::name(&name)));
        }

        Commands::Del { name } => {
            let db = open(&settings, false)?;
            db.delete(&name)?;
            ui::success(&format!("{} deleted", ui::name(&name)));
        }

        Commands::Stats => {
            let db = open(&settings, true)?;
            ui::header(&settings.database_path().display().to_string());
            println!("{}", ui::stats_table(&db.stats()?));
        }

        Commands::Check => {
            let db = open(&settings, true)?;
            let report = db.check()?;
            if report.is_clean() {
                ui::success("No integrity problems");
                return Ok(());
            }

            ui::section(" Integrity problems ");
            let ids = |ids: &[i64]| ids.iter().map(i64::to_string).collect::<Vec<_>>().join(", ");
            if !report.dangling.is_empty() {
                ui::problem("dangling ids", &ids(&report.dangling));
            }
            if !report.orphans.is_empty() {
                ui::problem("orphan objects", &ids(&report.orphans));
            }
            if !report.orphan_items.is_empty() {
                ui::problem("items of missing parents", &ids(&report.orphan_items));
            }
            if !report.sparse_sequences.is_empty() {
                ui::problem("sparse sequences", &ids(&report.sparse_sequences));
            }
            if !report.duplicate_scalars.is_empty() {
                let pairs: Vec<String> = report
                    .duplicate_scalars
                    .iter()
                    .map(|(dup, canonical)| format!("{} -> {}", dup, canonical))
                    .collect();
                ui::problem("duplicate scalars", &pairs.join(", "));
            }
            ui::warn(&format!("{} problems found; run `relstore fix` to repair", report.problem_count()));
            std::process::exit(1);
        }

        Commands::Fix => {
            let db = open(&settings, false)?;
            let removed = db.fix()?;
            let report = db.check()?;
            ui::removed(removed);
            if report.is_clean() {
                ui::repaired("Store is consistent");
            } else {
                ui::error(&format!("{} problems remain", report.problem_count()));
                std::process::exit(1);
            }
        }
    }

    Ok(())
}

/// Open the configured database; read-only commands never create or modify it
fn open(settings: &RelstoreConfig, read_only: bool) -> anyhow::Result<Database> {
    let path = settings.database_path();
    let mut options: Options = settings.options();
    if read_only {
        options.mode = OpenMode::Read;
    } else {
        config::ensure_db_dir(&path)?;
        if options.mode == OpenMode::Read {
            anyhow::bail!("{} is configured read-only", path.display());
        }
    }
    Database::open_with(&path, options).with_context(|| format!("failed to open {}", path.display()))
}
