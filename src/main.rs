/// Command-line entry point for the index mirror
use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::io::Write;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use indexsync::{
    config::load_config,
    time::TradeDate,
    Config, DailyRecord, SyncEngine, SyncError, UpdateOutcome,
};

#[derive(Debug, Parser)]
#[command(name = "indexsync", about = "Local mirror of daily index data")]
struct Cli {
    /// Path to the TOML configuration (falls back to $CONFIG_PATH, then config.toml)
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Fetch the full history of every watched index
    Init,
    /// Append trading days after the latest stored date
    Update {
        /// Index code, defaults to the configured benchmark
        #[arg(long)]
        code: Option<String>,
    },
    /// Print daily records, backfilling gaps first
    Daily {
        code: String,
        #[arg(long)]
        start: Option<TradeDate>,
        #[arg(long)]
        end: Option<TradeDate>,
        #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

fn init_logging(config: &Config) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("indexsync={},warn", config.log_level)));

    if config.log_format == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
}

fn write_records(records: &[DailyRecord], format: OutputFormat) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, records)?;
            writeln!(out)?;
        }
        OutputFormat::Csv | OutputFormat::Table => {
            // Union of provider columns, in stable order
            let mut columns: Vec<&str> = Vec::new();
            for record in records {
                for name in record.fields.keys() {
                    if !columns.contains(&name.as_str()) {
                        columns.push(name.as_str());
                    }
                }
            }
            columns.sort_unstable();

            let delimiter = if matches!(format, OutputFormat::Csv) { b',' } else { b'\t' };
            let mut writer = csv::WriterBuilder::new().delimiter(delimiter).from_writer(out);

            let mut header = vec!["ts_code", "trade_date"];
            header.extend(columns.iter().copied());
            writer.write_record(&header)?;

            for record in records {
                let mut row = vec![record.instrument_code.clone(), record.trade_date.to_string()];
                for name in &columns {
                    row.push(match record.field(name) {
                        Some(serde_json::Value::String(s)) => s.clone(),
                        Some(serde_json::Value::Null) | None => String::new(),
                        Some(other) => other.to_string(),
                    });
                }
                writer.write_record(&row)?;
            }
            writer.flush()?;
        }
    }

    Ok(())
}

async fn run(cli: Cli, config: Config) -> anyhow::Result<()> {
    let engine = SyncEngine::from_config(&config)
        .await
        .context("Failed to set up sync engine")?;

    match cli.command {
        Command::Init => {
            let report = engine.initialize_all().await;
            for entry in &report.instruments {
                match &entry.error {
                    None => info!("{}: fetched {}, stored {}", entry.code, entry.fetched, entry.inserted),
                    Some(e) => error!("{}: {}", entry.code, e),
                }
            }
            if !report.is_complete() {
                anyhow::bail!("{} indices failed to initialize", report.failures().count());
            }
        }
        Command::Update { code } => {
            let outcome = engine.update_daily(code.as_deref()).await?;
            info!(outcome = outcome.as_str(), "Update finished");
            match &outcome {
                UpdateOutcome::Fetched { from, fetched, inserted } => {
                    info!("Fetched {} rows from {}, stored {}", fetched, from, inserted)
                }
                UpdateOutcome::NotYetDue { next } => info!("Next trading date {} is not due yet", next),
                UpdateOutcome::NoPriorData => info!("No data stored yet, run `indexsync init` first"),
                UpdateOutcome::Reinitialized(report) => {
                    info!("Re-initialized, stored {} rows", report.total_inserted())
                }
            }
        }
        Command::Daily { code, start, end, format } => {
            let records = engine.get_daily(&code, start, end).await?;
            write_records(&records, format)?;
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .clone()
        .or_else(|| std::env::var("CONFIG_PATH").ok())
        .unwrap_or_else(|| "config.toml".to_string());

    let config = load_config(&config_path).with_context(|| format!("Loading {}", config_path))?;
    init_logging(&config);

    if let Err(e) = run(cli, config).await {
        match e.downcast_ref::<SyncError>() {
            Some(sync) if sync.is_caller_error() => error!("Invalid request: {}", sync),
            Some(sync) => error!(error_code = sync.error_code(), "{:#}", e),
            None => error!("{:#}", e),
        }
        return Err(e);
    }

    Ok(())
}
