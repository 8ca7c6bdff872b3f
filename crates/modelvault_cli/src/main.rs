//! Command-line front end for the model persistence engine.
//!
//! # Responsibility
//! - Wire config, logging, the SQLite database and a filesystem host into a
//!   `PersistenceEngine` for one command.
//! - Keep output line-oriented and deterministic for scripting.

use clap::{Parser, Subcommand, ValueEnum};
use log::info;
use modelvault_core::db::open_db;
use modelvault_core::{
    select_file_bridge, ConflictResolution, DirectoryHost, DiskSaveOutcome, EngineConfig,
    FileHost, ImportReport, InMemoryWorkingCopy, ModelId, ModelMetadata, PersistenceEngine,
    SqliteModelRegistry, SqliteModelStore,
};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

type CliResult = Result<(), Box<dyn Error>>;

#[derive(Parser, Debug)]
#[command(name = "modelvault")]
#[command(version, about = "Local-first storage and file sync for graph models", long_about = None)]
struct Cli {
    /// Engine config file (TOML); a missing file means defaults
    #[arg(long, global = true, env = "MODELVAULT_CONFIG", default_value = "modelvault.toml")]
    config: PathBuf,

    /// Overrides `data_dir` from the config file
    #[arg(long, global = true, env = "MODELVAULT_DATA_DIR")]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Check that the core library links
    Ping,
    /// List registered models in registration order
    List,
    /// Create an empty model
    New { name: String },
    /// Import a model file
    Import {
        file: PathBuf,
        /// How to settle a conflict with a locally modified model
        #[arg(long, value_enum)]
        resolve: Option<ResolveArg>,
    },
    /// Write a model to an external file
    Export { id: String, file: PathBuf },
    /// Show metadata and unsaved state of a model
    Status { id: String },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum ResolveArg {
    KeepLocal,
    AdoptIncoming,
    KeepBoth,
}

impl From<ResolveArg> for ConflictResolution {
    fn from(value: ResolveArg) -> Self {
        match value {
            ResolveArg::KeepLocal => Self::KeepLocal,
            ResolveArg::AdoptIncoming => Self::AdoptIncoming,
            ResolveArg::KeepBoth => Self::KeepBoth,
        }
    }
}

fn main() {
    let cli = Cli::parse();
    if let Err(err) = run(cli) {
        eprintln!("error: {err}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> CliResult {
    if let Commands::Ping = cli.command {
        println!("modelvault_core ping={}", modelvault_core::ping());
        println!("modelvault_core version={}", modelvault_core::core_version());
        return Ok(());
    }

    let mut config = EngineConfig::load(&cli.config)?;
    if let Some(data_dir) = cli.data_dir {
        config.data_dir = data_dir;
    }
    if let Err(err) = modelvault_core::init_logging_from_config(&config) {
        eprintln!("warning: logging disabled: {err}");
    }

    let conn = open_db(config.database_path())?;
    let host: Arc<dyn FileHost> = match &cli.command {
        Commands::Export { file, .. } => Arc::new(DirectoryHost::with_save_target(file)),
        _ => Arc::new(DirectoryHost::default()),
    };
    let mut engine = PersistenceEngine::new(
        SqliteModelRegistry::try_new(&conn)?,
        SqliteModelStore::try_new(&conn)?.with_quota(config.max_payload_bytes),
        select_file_bridge(host, &config.export_extension),
    )
    .with_default_model_name(config.default_model_name.clone());
    let mut working = InMemoryWorkingCopy::default();

    info!("event=cli_command module=cli status=start command={:?}", cli.command);
    match cli.command {
        Commands::Ping => Ok(()),
        Commands::List => {
            for model in engine.list_models()? {
                print_model(&model);
            }
            Ok(())
        }
        Commands::New { name } => {
            let opened = engine.create_model(&name, &mut working)?;
            print_model(&opened.metadata);
            Ok(())
        }
        Commands::Import { file, resolve } => {
            import_file(&mut engine, &mut working, &file, resolve)
        }
        Commands::Export { id, file } => {
            engine.open_model(&parse_id(&id)?, &mut working)?;
            match engine.save_to_disk(&working)? {
                DiskSaveOutcome::Saved(metadata) => {
                    println!("saved {} -> {}", metadata.id, file.display());
                    Ok(())
                }
                DiskSaveOutcome::Cancelled => Err("export cancelled".into()),
            }
        }
        Commands::Status { id } => {
            let opened = engine.open_model(&parse_id(&id)?, &mut working)?;
            print_model(&opened.metadata);
            for change in opened.migration_changes {
                println!("migration: {change}");
            }
            Ok(())
        }
    }
}

fn import_file(
    engine: &mut PersistenceEngine<SqliteModelRegistry<'_>, SqliteModelStore<'_>>,
    working: &mut InMemoryWorkingCopy,
    file: &Path,
    resolve: Option<ResolveArg>,
) -> CliResult {
    let bytes = std::fs::read(file)?;
    let filename = file
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    match engine.import_bytes(&bytes, filename.as_deref(), working)? {
        ImportReport::Loaded { model, disposition } => {
            println!("import {disposition:?}");
            print_model(&model.metadata);
            Ok(())
        }
        ImportReport::Conflict(conflict) => {
            let Some(resolution) = resolve else {
                return Err(format!(
                    "model {} has local changes that differ from the file; rerun with --resolve",
                    conflict.model_id()
                )
                .into());
            };
            let model = engine.resolve_conflict(resolution.into(), working)?;
            println!("import resolved={}", ConflictResolution::from(resolution).as_str());
            print_model(&model.metadata);
            Ok(())
        }
        ImportReport::Cancelled => Err("import cancelled".into()),
    }
}

fn parse_id(value: &str) -> Result<ModelId, Box<dyn Error>> {
    ModelId::parse(value).ok_or_else(|| "model id cannot be empty".into())
}

fn print_model(model: &ModelMetadata) {
    println!(
        "{}\t{}\thash={}\tunsaved={}",
        model.id,
        model.name,
        model.content_hash.short(),
        model.has_unsaved_changes()
    );
}
