// Agencies CLI - batch cleanup of the agency store

mod exit_codes;

use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand, ValueEnum};

use agency_cleanup::config::KeyMode;
use agency_cleanup::ingest::ingest;
use agency_cleanup::pipeline::{run, run_step, RunReport, Step, StepReport};
use agency_cleanup::summary::{summarize_store, StoreSummary};
use agency_cleanup::{CleanupConfig, CleanupError, RecordStore};
use agency_store::{json, SqliteStore};

use exit_codes::{cleanup_exit_code, EXIT_ERROR, EXIT_IO, EXIT_SUCCESS, EXIT_USAGE};

/// Looked up in the working directory when `--config` is not given.
const DEFAULT_CONFIG_FILE: &str = "cleanup.toml";

#[derive(Parser)]
#[command(name = "agencies")]
#[command(about = "Incremental cleanup for real-estate agency records")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// SQLite database (default: store.path from the config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Cleanup config file (TOML)
    #[arg(long, global = true, env = "AGENCIES_CONFIG")]
    config: Option<PathBuf>,

    /// Only log warnings and errors
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Create the database and its tables
    Init,

    /// Import agencies from a discovery response (fenced JSON, JSON array or numbered text)
    #[command(after_help = "\
Examples:
  agencies import response.md
  cat response.json | agencies import --json")]
    Import {
        /// Response file; stdin when omitted or '-'
        file: Option<PathBuf>,

        /// Print the import report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the full pipeline over pending records
    #[command(after_help = "\
Stages: names -> urls -> classify -> dedup -> archive -> mark cleaned.
All changes commit in one transaction; on failure every record stays pending.")]
    Run {
        /// Print the run report as JSON
        #[arg(long)]
        json: bool,

        /// Skip the snapshot refresh configured in [export]
        #[arg(long)]
        no_export: bool,
    },

    /// Strip ordinal prefixes and markdown from pending names
    Names {
        #[arg(long)]
        json: bool,
    },

    /// Repair pending websites (scheme, markdown, trailing punctuation)
    Urls {
        #[arg(long)]
        json: bool,
    },

    /// Classify pending records by region
    Classify {
        #[arg(long)]
        json: bool,
    },

    /// Merge duplicate pending records
    Dedup {
        /// Identity key (overrides dedup.key from the config)
        #[arg(long, value_enum)]
        key: Option<KeyArg>,

        #[arg(long)]
        json: bool,
    },

    /// Move pending records without website and phone to the archive table
    Archive {
        #[arg(long)]
        json: bool,
    },

    /// Write the main table as a JSON array
    Export {
        /// Output file ('-' for stdout; default: export.json from the config)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Show record counts by category and status
    Stats {
        #[arg(long)]
        json: bool,
    },

    /// Validate the config file, or print the defaults
    Config {
        /// Print the default config as TOML
        #[arg(long)]
        defaults: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum KeyArg {
    Name,
    NameAndDomain,
}

impl From<KeyArg> for KeyMode {
    fn from(arg: KeyArg) -> Self {
        match arg {
            KeyArg::Name => KeyMode::Name,
            KeyArg::NameAndDomain => KeyMode::NameAndDomain,
        }
    }
}

fn long_version() -> &'static str {
    if cfg!(debug_assertions) {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  agency-cleanup ",
            env!("CARGO_PKG_VERSION"),
            "\nbuild:   debug"
        )
    } else {
        concat!(
            env!("CARGO_PKG_VERSION"),
            "\nengine:  agency-cleanup ",
            env!("CARGO_PKG_VERSION"),
            "\nbuild:   release"
        )
    }
}

fn init_logging(quiet: bool) {
    let level = if quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_timestamp(None)
        .format_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.quiet);

    let result = match cli.command {
        None => {
            eprintln!("Usage: agencies <command> [options]");
            eprintln!("       agencies --help for more information");
            Ok(())
        }
        Some(Commands::Config { defaults: true }) => cmd_config_defaults(),
        Some(command) => load_config(cli.config.as_deref()).and_then(|config| {
            let db = cli.db.clone().unwrap_or_else(|| PathBuf::from(&config.store.path));
            dispatch(command, &db, config)
        }),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

fn dispatch(command: Commands, db: &Path, mut config: CleanupConfig) -> Result<(), CliError> {
    match command {
        Commands::Init => cmd_init(db),
        Commands::Import { file, json } => cmd_import(db, file, json),
        Commands::Run { json, no_export } => cmd_run(db, &config, json, no_export),
        Commands::Names { json } => cmd_step(db, &config, Step::Names, json),
        Commands::Urls { json } => cmd_step(db, &config, Step::Urls, json),
        Commands::Classify { json } => cmd_step(db, &config, Step::Classify, json),
        Commands::Dedup { key, json } => {
            if let Some(key) = key {
                config.dedup.key = key.into();
            }
            cmd_step(db, &config, Step::Dedup, json)
        }
        Commands::Archive { json } => cmd_step(db, &config, Step::Archive, json),
        Commands::Export { output } => cmd_export(db, &config, output),
        Commands::Stats { json } => cmd_stats(db, json),
        Commands::Config { .. } => cmd_config(&config),
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn args(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn io(msg: impl Into<String>) -> Self {
        Self { code: EXIT_IO, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<CleanupError> for CliError {
    fn from(err: CleanupError) -> Self {
        let hint = match &err {
            CleanupError::ConfigParse(_) | CleanupError::ConfigValidation(_) => {
                Some("`agencies config --defaults` prints a valid config".to_string())
            }
            CleanupError::Storage(_) => {
                Some("nothing was committed; check --db and that no other process holds the file".to_string())
            }
            CleanupError::Ingest(_) => Some("fix the ```json block or remove it to use the text parser".to_string()),
            CleanupError::Io(_) => None,
        };
        Self {
            code: cleanup_exit_code(&err),
            message: err.to_string(),
            hint,
        }
    }
}

// ============================================================================
// config
// ============================================================================

fn load_config(path: Option<&Path>) -> Result<CleanupConfig, CliError> {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => {
            let default = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !default.exists() {
                return Ok(CleanupConfig::default());
            }
            default
        }
    };
    let text = std::fs::read_to_string(&path)
        .map_err(|e| CliError::io(format!("{}: {e}", path.display())))?;
    let config = CleanupConfig::from_toml(&text)?;
    log::debug!("config: {}", path.display());
    Ok(config)
}

fn cmd_config_defaults() -> Result<(), CliError> {
    let text = CleanupConfig::default().to_toml()?;
    print!("{text}");
    Ok(())
}

fn cmd_config(config: &CleanupConfig) -> Result<(), CliError> {
    let labels: Vec<&str> = config.classify.regions.iter().map(|r| r.label.as_str()).collect();
    println!("config ok");
    println!("  regions:   {}", labels.join(", "));
    println!("  threshold: {}", config.classify.threshold);
    println!("  margin:    {}", config.classify.margin);
    println!("  dedup key: {:?}", config.dedup.key);
    Ok(())
}

// ============================================================================
// init / import
// ============================================================================

fn cmd_init(db: &Path) -> Result<(), CliError> {
    let store = SqliteStore::open(db)?;
    let summary = summarize_store(&store)?;
    println!(
        "{}: {} record(s), {} archived",
        db.display(),
        summary.total,
        summary.archived
    );
    Ok(())
}

fn cmd_import(db: &Path, file: Option<PathBuf>, json: bool) -> Result<(), CliError> {
    let text = match file {
        Some(path) if path.as_os_str() != "-" => std::fs::read_to_string(&path)
            .map_err(|e| CliError::io(format!("{}: {e}", path.display())))?,
        _ => {
            let mut buf = String::new();
            io::stdin()
                .read_to_string(&mut buf)
                .map_err(|e| CliError::io(format!("stdin: {e}")))?;
            buf
        }
    };
    if text.trim().is_empty() {
        return Err(CliError::args("discovery response is empty").with_hint("pass a file or pipe the response on stdin"));
    }

    let mut store = SqliteStore::open(db)?;
    let today = chrono::Local::now().date_naive();
    let report = ingest(&mut store, &text, today)?;

    if json {
        print_json(&report)?;
    } else {
        println!(
            "imported {} of {} parsed agencies ({} already known)",
            report.inserted.len(),
            report.parsed,
            report.skipped.len()
        );
    }
    Ok(())
}

// ============================================================================
// run / single steps
// ============================================================================

fn cmd_run(db: &Path, config: &CleanupConfig, json: bool, no_export: bool) -> Result<(), CliError> {
    let mut store = SqliteStore::open(db)?;
    let report = run(&mut store, config)?;

    if report.changed() && !no_export {
        if let Some(path) = &config.export.json {
            json::export(&store, Path::new(path))?;
        }
    }

    if json {
        print_json(&report)
    } else {
        print_run_report(&report);
        Ok(())
    }
}

fn print_run_report(report: &RunReport) {
    let c = &report.counts;
    if c.pending == 0 {
        println!("nothing pending");
        return;
    }
    println!("pending:             {}", c.pending);
    println!("names normalized:    {}", c.names_normalized);
    println!("websites repaired:   {}", c.websites_repaired);
    println!("categories changed:  {}", c.categories_changed);
    println!("duplicates removed:  {}", c.duplicates_removed);
    println!("archived:            {}", c.archived);
    println!("cleaned:             {}", c.cleaned);
    println!();
    print_summary_line("before", &report.before);
    print_summary_line("after", &report.after);
}

fn print_summary_line(label: &str, s: &StoreSummary) {
    println!("{label:<7} {} record(s), {} archived", s.total, s.archived);
}

fn cmd_step(db: &Path, config: &CleanupConfig, step: Step, json: bool) -> Result<(), CliError> {
    let mut store = SqliteStore::open(db)?;
    let report = run_step(&mut store, step, config)?;
    if json {
        print_json(&report)
    } else {
        print_step_report(&report);
        Ok(())
    }
}

fn print_step_report(report: &StepReport) {
    println!(
        "{}: {} of {} pending record(s) affected",
        report.step.name(),
        report.affected,
        report.pending
    );
    for group in &report.groups {
        println!(
            "  '{}': kept #{}, removed {:?}",
            group.key, group.winner_id, group.loser_ids
        );
    }
}

// ============================================================================
// export / stats
// ============================================================================

fn cmd_export(db: &Path, config: &CleanupConfig, output: Option<PathBuf>) -> Result<(), CliError> {
    let store = SqliteStore::open(db)?;
    let output = output
        .or_else(|| config.export.json.as_ref().map(PathBuf::from))
        .ok_or_else(|| {
            CliError::args("no output path").with_hint("pass --output <file> or set export.json in the config")
        })?;

    if output.as_os_str() == "-" {
        let records = store.fetch_all()?;
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        json::write_snapshot(&records, &mut handle)?;
        writeln!(handle).map_err(|e| CliError::io(e.to_string()))?;
    } else {
        let n = json::export(&store, &output)?;
        println!("exported {n} record(s) to {}", output.display());
    }
    Ok(())
}

fn cmd_stats(db: &Path, json: bool) -> Result<(), CliError> {
    let store = SqliteStore::open(db)?;
    let summary = summarize_store(&store)?;
    if json {
        return print_json(&summary);
    }

    println!("records:  {}", summary.total);
    println!("archived: {}", summary.archived);
    println!();
    println!("by type:");
    for (label, n) in summary.categories_by_count() {
        println!("  {label:<20} {n}");
    }
    println!("by status:");
    for (status, n) in &summary.by_status {
        println!("  {status:<20} {n}");
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), CliError> {
    let text = serde_json::to_string_pretty(value).map_err(|e| CliError {
        code: EXIT_ERROR,
        message: format!("cannot render JSON: {e}"),
        hint: None,
    })?;
    println!("{text}");
    Ok(())
}
