mod menu;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use console::style;
use dialoguer::Confirm;
use dsprune::app::{App, Settings};
use dsprune::config::{Config, Credentials, Environment};
use dsprune::datasource::DataSourceId;
use dsprune::selection::{CountryScope, Criterion};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Instant;
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// List, delete, back up and restore Redash data sources
#[derive(Parser, Debug)]
#[command(name = "dsprune", version, about, long_about = None)]
struct Args {
    /// Environment to act on (prompted for in interactive mode)
    #[arg(short, long, value_enum, global = true)]
    env: Option<Environment>,

    /// Maximum number of concurrent API requests
    #[arg(short, long, global = true)]
    concurrency: Option<usize>,

    /// Directory where snapshots are written and read
    #[arg(long, global = true)]
    backup_dir: Option<PathBuf>,

    /// Per-request timeout in seconds (connection tests can be slow)
    #[arg(long, global = true, value_name = "SECS")]
    timeout: Option<u64>,

    /// Log level for debugging
    #[arg(long, value_enum, default_value = "off", global = true)]
    log_level: LogLevel,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every data source
    List,

    /// Select data sources, back them up, then delete them
    Delete {
        #[command(subcommand)]
        by: SelectBy,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,

        /// Only show what would be deleted
        #[arg(long)]
        dry_run: bool,
    },

    /// Recreate the data sources stored in a backup file
    Restore {
        /// File name inside the backup directory, or a path
        file: String,

        /// Do not ask for confirmation
        #[arg(short, long)]
        yes: bool,
    },

    /// List backup files, newest first
    Backups,
}

#[derive(Subcommand, Debug)]
enum SelectBy {
    /// Data sources whose options.dbname matches a database name
    Name {
        /// Database name without country prefix
        name: String,

        /// all, br, co, mx or exact
        #[arg(long, default_value = "all")]
        scope: CountryScope,
    },

    /// Data sources whose connection test fails
    FailedTest,

    /// Data sources with the given ids
    Ids {
        #[arg(required = true)]
        ids: Vec<DataSourceId>,
    },
}

impl SelectBy {
    fn criterion(&self) -> dsprune::Result<Criterion> {
        match self {
            SelectBy::Name { name, scope } => Criterion::by_database_name(name, *scope),
            SelectBy::FailedTest => Ok(Criterion::ByFailedHealthCheck),
            SelectBy::Ids { ids } => Criterion::by_ids(ids.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogLevel {
    Off,
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    fn to_tracing_level(self) -> Option<Level> {
        match self {
            LogLevel::Off => None,
            LogLevel::Error => Some(Level::ERROR),
            LogLevel::Warn => Some(Level::WARN),
            LogLevel::Info => Some(Level::INFO),
            LogLevel::Debug => Some(Level::DEBUG),
            LogLevel::Trace => Some(Level::TRACE),
        }
    }
}

fn setup_logging(level: LogLevel) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let Some(tracing_level) = level.to_tracing_level() else {
        return Ok(None);
    };

    let log_path = get_log_path();

    if let Some(parent) = log_path.parent() {
        let _ = std::fs::create_dir_all(parent);
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("Failed to open log file {:?}", log_path))?;

    let (non_blocking, guard) = tracing_appender::non_blocking(file);

    tracing_subscriber::fmt()
        .with_max_level(tracing_level)
        .with_writer(non_blocking.with_max_level(tracing_level))
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(true)
        .with_line_number(true)
        .init();

    tracing::info!("dsprune started with log level: {:?}", level);
    tracing::info!("Log file: {:?}", log_path);

    Ok(Some(guard))
}

fn get_log_path() -> PathBuf {
    if let Some(config_dir) = dirs::config_dir() {
        return config_dir.join("dsprune").join("dsprune.log");
    }
    if let Some(home) = dirs::home_dir() {
        return home.join(".dsprune").join("dsprune.log");
    }
    PathBuf::from("dsprune.log")
}

#[tokio::main]
async fn main() -> ExitCode {
    // Credentials may come from a .env file in the working directory
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    if let Err(err) = run(args).await {
        eprintln!("{} {:#}", style("Error:").red().bold(), err);
        return ExitCode::from(1);
    }
    ExitCode::SUCCESS
}

async fn run(args: Args) -> Result<()> {
    let _log_guard = setup_logging(args.log_level)?;

    let mut config = Config::load();
    let settings = Settings::resolve(&config, args.concurrency, args.backup_dir.clone(), args.timeout);

    let Some(command) = args.command else {
        return menu::run(&mut config, &settings).await;
    };

    if let Command::Backups = command {
        return list_backups(&settings);
    }

    let environment = args
        .env
        .or(config.last_environment)
        .context("No environment given. Use --env development|production")?;
    let credentials = Credentials::from_env(environment)?;
    let app = App::new(&credentials, &settings)?;

    let start = Instant::now();
    let result = match command {
        Command::List => list(&app).await,
        Command::Delete { by, yes, dry_run } => delete(&app, &by, yes, dry_run).await,
        Command::Restore { file, yes } => restore(&app, &file, yes).await,
        Command::Backups => Ok(()),
    };
    app.close();
    tracing::info!("Finished in {:.2?}", start.elapsed());

    result
}

async fn list(app: &App) -> Result<()> {
    let data_sources = app.list().await?;
    for data_source in &data_sources {
        println!(
            "{:>6}  {:<40}  {:<12}  {}",
            data_source.id,
            data_source.name,
            data_source.kind,
            data_source.dbname().unwrap_or("-")
        );
    }
    println!("{} data source(s) in {}", data_sources.len(), app.environment);
    Ok(())
}

async fn delete(app: &App, by: &SelectBy, yes: bool, dry_run: bool) -> Result<()> {
    let criterion = by.criterion()?;
    let selection = app.select(&criterion).await?;
    menu::print_selection(&selection);

    if selection.is_empty() {
        println!("No data sources match {}", criterion);
        return Ok(());
    }
    if dry_run {
        println!("Dry run: {} data source(s) would be deleted", selection.len());
        return Ok(());
    }
    if !yes && !confirm(&format!("Delete {} data source(s) in {}?", selection.len(), app.environment))? {
        return Ok(());
    }

    let outcome = app
        .delete(&selection.matched)
        .await
        .context("Delete aborted, nothing was removed without a backup")?;
    menu::print_delete_outcome(&outcome);

    if !outcome.report.is_complete() {
        bail!("{} delete(s) failed", outcome.report.failed.len());
    }
    Ok(())
}

async fn restore(app: &App, file: &str, yes: bool) -> Result<()> {
    let (path, data_sources) = app
        .load_snapshot(file)
        .with_context(|| format!("Cannot read backup {}", file))?;

    let prompt = format!(
        "Restore {} data source(s) from {} into {}?",
        data_sources.len(),
        path.display(),
        app.environment
    );
    if !yes && !confirm(&prompt)? {
        return Ok(());
    }

    let report = app.restore(&data_sources).await?;
    menu::print_report("created", &report);

    if !report.is_complete() {
        bail!("{} create(s) failed", report.failed.len());
    }
    Ok(())
}

fn list_backups(settings: &Settings) -> Result<()> {
    let store = dsprune::backup::BackupStore::new(&settings.backup_dir);
    let snapshots = store.list()?;

    if snapshots.is_empty() {
        println!("No backups in {}", store.dir().display());
    }
    for snapshot in snapshots {
        println!("{}  {} bytes", snapshot.file_name, snapshot.size);
    }
    Ok(())
}

fn confirm(prompt: &str) -> Result<bool> {
    Ok(Confirm::new().with_prompt(prompt).default(false).interact()?)
}
