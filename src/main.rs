//! healthsync CLI
//!
//! Runs one incremental sync against Health Planet:
//! - Log in and obtain an access token
//! - Fetch measurements window by window
//! - Write rows as CSV or JSON lines
//! - Persist the checkpoint for the next run

use anyhow::Context;
use clap::{Parser, Subcommand};
use healthsync::config::{generate_default_config, Config};
use healthsync::*;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "healthsync")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Incremental Health Planet measurement sync")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in, fetch new measurements and advance the checkpoint
    Run {
        /// Emit rows but leave the checkpoint untouched
        #[arg(long)]
        preview: bool,
        /// Metric family (innerscan, sphygmomanometer)
        #[arg(long)]
        family: Option<MetricFamily>,
        /// Output file (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Output format (csv, jsonl)
        #[arg(short, long)]
        format: Option<String>,
    },

    /// Print the column schema
    Columns {
        /// Metric family (innerscan, sphygmomanometer)
        #[arg(long)]
        family: Option<MetricFamily>,
        /// Display language (ja, en, raw)
        #[arg(long)]
        lang: Option<String>,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };

    init_logging(&config.logging);

    match cli.command {
        Commands::Run {
            preview,
            family,
            output,
            format,
        } => {
            if let Some(family) = family {
                config.sync.family = family;
            }
            if let Some(output) = output {
                config.output.path = Some(output.to_string_lossy().to_string());
            }
            if let Some(format) = format {
                config.output.format = format;
            }
            config.sync.preview |= preview;

            run(&config).await?;
        }

        Commands::Columns { family, lang } => {
            let family = family.unwrap_or(config.sync.family);
            let lang = lang.map(|l| Language::from_selector(&l)).unwrap_or(config.language());

            for column in family.schema(lang) {
                println!("{}\t{}\t{}", column.index, column.name, column.column_type);
            }
        }

        Commands::Config { output } => {
            let content = generate_default_config();
            match output {
                Some(path) => {
                    std::fs::write(&path, content)
                        .with_context(|| format!("writing {}", path.display()))?;
                    eprintln!("Wrote default config to {}", path.display());
                }
                None => print!("{}", content),
            }
        }
    }

    Ok(())
}

async fn run(config: &Config) -> anyhow::Result<()> {
    let credentials = config.credentials()?;
    let family = config.sync.family;
    let columns = family.schema(config.language());
    let tz = config.timezone()?;
    let timeout = Duration::from_secs(config.sync.request_timeout_secs);

    let store = CheckpointStore::new(&config.output.state_file);
    let checkpoint = match store.load()? {
        Some(stored) => Some(stored),
        None => config.last_date()?,
    };
    let now = chrono::Utc::now().with_timezone(&tz).naive_local();

    let login = ReqwestTransport::new(&config.sync.base_url, timeout)?;
    let token = Authenticator::new(login, credentials, &config.sync.base_url, family)
        .with_redirect_uri(&config.sync.redirect_uri)
        .authenticate()
        .await
        .context("login failed")?;

    let api = HealthPlanetApi::new(
        ReqwestTransport::new(&config.sync.base_url, timeout)?,
        token,
        family,
    );
    let engine = SyncEngine::new(api).with_preview(config.sync.preview);

    let out: Box<dyn Write> = match &config.output.path {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("creating {}", path))?,
        )),
        None => Box::new(std::io::stdout()),
    };
    let mut sink: Box<dyn RowSink> = match config.output.format.as_str() {
        "csv" => Box::new(CsvSink::new(out, &columns)),
        "jsonl" | "json" => Box::new(JsonLinesSink::new(out, &columns)),
        other => anyhow::bail!("unknown output format: {}", other),
    };

    let outcome = engine
        .run(checkpoint, now, sink.as_mut())
        .await
        .context("sync failed")?;

    match outcome.checkpoint {
        Some(next) => {
            store.save(&next)?;
            eprintln!(
                "Synced {} rows in {} windows; next last_date = {}",
                outcome.rows_emitted, outcome.windows, next
            );
        }
        None => eprintln!(
            "Synced {} rows in {} windows; checkpoint unchanged",
            outcome.rows_emitted, outcome.windows
        ),
    }

    Ok(())
}

fn init_logging(logging: &LoggingConfig) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("healthsync={}", logging.level)));

    // Logs go to stderr; stdout may carry rows
    if logging.format == "json" {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}
