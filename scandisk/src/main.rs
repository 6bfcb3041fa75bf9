use std::env::VarError;
use std::path::PathBuf;

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use tracing_subscriber::EnvFilter;

use scandisk::config::DEFAULT_MAX_DEPTH;
use scandisk::{run_check, CheckOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Human,
    Json,
}

impl LogFormat {
    const ENV_KEY: &'static str = "SCANDISK_LOG_FORMAT";

    fn parse(raw: &str) -> Result<Self> {
        <Self as ValueEnum>::from_str(raw.trim(), true).map_err(|_| {
            anyhow::anyhow!(
                "invalid {key}={raw:?}; expected one of: human, json",
                key = Self::ENV_KEY
            )
        })
    }

    fn from_env() -> Result<Option<Self>> {
        match std::env::var(Self::ENV_KEY) {
            Ok(value) => Ok(Some(Self::parse(&value)?)),
            Err(VarError::NotPresent) => Ok(None),
            Err(VarError::NotUnicode(_)) => {
                bail!("{key} contains non-UTF-8 bytes", key = Self::ENV_KEY)
            }
        }
    }
}

fn default_env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
}

/// Logs go to stderr; stdout carries the report.
fn init_logging(log_format_override: Option<LogFormat>) -> Result<()> {
    let format = log_format_override
        .or(LogFormat::from_env()?)
        .unwrap_or(LogFormat::Human);

    match format {
        LogFormat::Human => tracing_subscriber::fmt()
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .compact()
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize human logger: {err}"))?,
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .flatten_event(true)
            .with_env_filter(default_env_filter())
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_level(true)
            .try_init()
            .map_err(|err| anyhow::anyhow!("failed to initialize JSON logger: {err}"))?,
    }
    Ok(())
}

#[derive(Parser)]
#[command(name = "scandisk", about = "Check and repair a FAT12 disk image")]
struct Cli {
    /// Path to the FAT12 image
    image: PathBuf,

    /// Report what would be repaired without writing to the image
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Deepest directory nesting to descend into
    #[arg(long, default_value_t = DEFAULT_MAX_DEPTH)]
    max_depth: usize,

    /// Log output format (`human` or `json`).
    ///
    /// Precedence: `--log-format` > `SCANDISK_LOG_FORMAT` > `human`.
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
}

fn main() {
    let cli = Cli::parse();
    if let Err(error) = init_logging(cli.log_format) {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }

    let options = CheckOptions {
        dry_run: cli.dry_run,
        max_depth: cli.max_depth,
    };
    let status = run_check(&cli.image, &options);
    std::process::exit(status.code());
}
