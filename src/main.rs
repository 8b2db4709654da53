//! cellfmt - command-line front end
//!
//! Loads a table, applies a JSON rule file and writes the rendered cells as
//! JSON or CSV.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand, ValueEnum};
use log::{LevelFilter, Log, Metadata, Record, info, warn};

use cellfmt::{FormatSession, OutputWriter, RenderedTable, RuleFile, Table, TableLoader};

/// cellfmt - declarative cell formatting for tabular data
#[derive(Parser)]
#[command(name = "cellfmt")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Log level when no -v flag is given (error, warn, info, debug, trace)
    #[arg(long, global = true, env = "CELLFMT_LOG", value_name = "LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a table through a rule file
    Render {
        /// Table to format (.csv, or .json as an array of columns)
        #[arg(short, long, value_name = "PATH")]
        data: PathBuf,

        /// JSON rule file; without it every cell gets its default display
        #[arg(short, long, value_name = "PATH")]
        rules: Option<PathBuf>,

        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Json)]
        output: OutputFormat,

        /// Write to this file instead of stdout
        #[arg(short, long, value_name = "PATH")]
        out: Option<PathBuf>,

        /// Override the text shown for unsubstituted missing cells
        #[arg(long)]
        missing_text: Option<String>,

        /// Fail when any cell could not be formatted
        #[arg(long)]
        strict: bool,
    },

    /// Validate a rule file against a table without rendering
    Check {
        #[arg(short, long, value_name = "PATH")]
        data: PathBuf,

        #[arg(short, long, value_name = "PATH")]
        rules: PathBuf,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

struct StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if self.enabled(record.metadata()) {
            eprintln!("[{:<5} {}] {}", record.level(), record.target(), record.args());
        }
    }

    fn flush(&self) {}
}

static LOGGER: StderrLogger = StderrLogger;

fn init_logging(verbose: u8, level: Option<&str>) -> Result<()> {
    let filter = match (verbose, level) {
        (0, Some(level)) => level
            .parse::<LevelFilter>()
            .map_err(|_| anyhow!("Invalid log level: {}", level))?,
        (0, None) => LevelFilter::Warn,
        (1, _) => LevelFilter::Info,
        (2, _) => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    log::set_logger(&LOGGER).map_err(|err| anyhow!("Failed to install logger: {}", err))?;
    log::set_max_level(filter);
    Ok(())
}

fn load_table(path: &Path) -> Result<Table> {
    let is_json = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    let table = if is_json {
        TableLoader::from_json_path(path)
    } else {
        TableLoader::from_csv_path(path)
    };
    table.with_context(|| format!("Failed to load table from {}", path.display()))
}

fn load_session(data: &Path, rules: Option<&Path>) -> Result<FormatSession> {
    let mut session = FormatSession::new(load_table(data)?);
    if let Some(rules) = rules {
        let rule_file =
            RuleFile::from_path(rules).with_context(|| format!("Failed to read rules from {}", rules.display()))?;
        rule_file
            .apply(&mut session)
            .with_context(|| format!("Invalid rule in {}", rules.display()))?;
    }
    Ok(session)
}

fn write_output(rendered: &RenderedTable, format: OutputFormat, out: Option<&Path>) -> Result<()> {
    match out {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            write_to(rendered, format, file)?;
            info!("Wrote {}", path.display());
        }
        None => write_to(rendered, format, io::stdout().lock())?,
    }
    Ok(())
}

fn write_to<W: io::Write>(rendered: &RenderedTable, format: OutputFormat, writer: W) -> Result<()> {
    match format {
        OutputFormat::Json => OutputWriter::write_json(rendered, writer)?,
        OutputFormat::Csv => OutputWriter::write_csv(rendered, writer)?,
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_level.as_deref())?;

    match cli.command {
        Commands::Render {
            data,
            rules,
            output,
            out,
            missing_text,
            strict,
        } => {
            let mut session = load_session(&data, rules.as_deref())?;
            if let Some(text) = missing_text {
                let mut options = session.options().clone();
                options.missing_text = text;
                session.set_options(options);
            }

            let rendered = session.render();
            if rendered.has_errors() {
                warn!("{} cells kept their raw display after errors", rendered.errors.len());
            }
            write_output(&rendered, output, out.as_deref())?;

            if strict && rendered.has_errors() {
                bail!("{} cells could not be formatted", rendered.errors.len());
            }
        }
        Commands::Check { data, rules } => {
            let session = load_session(&data, Some(rules.as_path()))?;
            println!(
                "{}: {} rules valid for {} rows x {} columns",
                rules.display(),
                session.rules().len(),
                session.table().row_count(),
                session.table().column_count()
            );
        }
    }

    Ok(())
}
