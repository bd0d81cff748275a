//! CLI definition and dispatch.

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::terminal_feed_adapter::TerminalFeedAdapter;
use crate::domain::error::SmartExpertError;
use crate::domain::ingest_config::{
    IngestConfig, build_broker_config, build_ingest_config, process_env,
};
use crate::domain::ingestion::{PairOutcome, SweepReport, run_sweep};
use crate::domain::market::{Symbol, Timeframe};
use crate::domain::risk::{RiskEngine, TradeRequest};
use crate::domain::risk_settings::RiskParameter;
use crate::ports::candle_store_port::CandleStore;
use crate::ports::config_port::ConfigPort;
use crate::ports::risk_settings_port::RiskSettingsStore;

#[derive(Parser, Debug)]
#[command(
    name = "smartexpert",
    about = "Candle ingestion and risk-sized trade planning"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the schema and seed reference data and default risk settings
    Init {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Pull the configured symbol × timeframe matrix from the broker terminal
    Ingest {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        timeframe: Option<String>,
    },
    /// Show the stored candle range per pair
    Info {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        symbol: Option<String>,
        #[arg(long)]
        timeframe: Option<String>,
    },
    /// Print close-price series for a timeframe as CSV
    Closes {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        timeframe: String,
    },
    /// List stored risk settings and the effective values
    Settings {
        #[arg(short, long)]
        config: PathBuf,
    },
    /// Update one risk setting
    SetSetting {
        #[arg(short, long)]
        config: PathBuf,
        name: String,
        #[arg(allow_hyphen_values = true)]
        value: String,
    },
    /// Size a long trade from balance, entry price and ATR
    Plan {
        #[arg(short, long)]
        config: PathBuf,
        #[arg(long)]
        balance: f64,
        #[arg(long)]
        entry: f64,
        #[arg(long)]
        atr: f64,
        #[arg(long, default_value_t = 0)]
        open_positions: u32,
    },
}

/// Install the stderr log subscriber. `RUST_LOG` overrides the default filter.
pub fn init_logging() {
    use tracing_subscriber::EnvFilter;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("smartexpert=info")),
        )
        .with_writer(std::io::stderr)
        .init();
}

pub fn run(cli: Cli) -> ExitCode {
    let result = match cli.command {
        Command::Init { config } => run_init(&config),
        Command::Ingest {
            config,
            symbol,
            timeframe,
        } => run_ingest(&config, symbol.as_deref(), timeframe.as_deref()),
        Command::Info {
            config,
            symbol,
            timeframe,
        } => run_info(&config, symbol.as_deref(), timeframe.as_deref()),
        Command::Closes { config, timeframe } => run_closes(&config, &timeframe),
        Command::Settings { config } => run_settings(&config),
        Command::SetSetting {
            config,
            name,
            value,
        } => run_set_setting(&config, &name, &value),
        Command::Plan {
            config,
            balance,
            entry,
            atr,
            open_positions,
        } => run_plan(
            &config,
            TradeRequest {
                balance,
                entry_price: entry,
                atr,
                open_positions,
            },
        ),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{e}");
            eprintln!("error: {e}");
            (&e).into()
        }
    }
}

pub fn load_config(path: &Path) -> Result<FileConfigAdapter, SmartExpertError> {
    tracing::debug!("loading config from {}", path.display());
    FileConfigAdapter::from_file(path).map_err(|e| SmartExpertError::ConfigParse {
        file: path.display().to_string(),
        reason: e.to_string(),
    })
}

/// A storage backend that serves both the candle and the settings paths.
pub trait Storage: CandleStore + RiskSettingsStore {
    /// Create tables and seed reference rows. Safe to repeat.
    fn prepare(&self) -> Result<(), SmartExpertError>;

    fn candles(&self) -> &dyn CandleStore;

    fn risk_settings(&self) -> &dyn RiskSettingsStore;
}

#[cfg(feature = "sqlite")]
impl Storage for crate::adapters::sqlite_adapter::SqliteAdapter {
    fn prepare(&self) -> Result<(), SmartExpertError> {
        self.initialize_schema()?;
        self.seed_reference_data()?;
        Ok(())
    }

    fn candles(&self) -> &dyn CandleStore {
        self
    }

    fn risk_settings(&self) -> &dyn RiskSettingsStore {
        self
    }
}

#[cfg(feature = "postgres")]
impl Storage for crate::adapters::postgres_adapter::PostgresAdapter {
    fn prepare(&self) -> Result<(), SmartExpertError> {
        self.initialize_schema()?;
        self.seed_reference_data()?;
        Ok(())
    }

    fn candles(&self) -> &dyn CandleStore {
        self
    }

    fn risk_settings(&self) -> &dyn RiskSettingsStore {
        self
    }
}

/// Postgres when built with it and `[postgres] connection_string` is set,
/// otherwise SQLite.
pub fn open_storage(config: &dyn ConfigPort) -> Result<Box<dyn Storage>, SmartExpertError> {
    #[cfg(feature = "postgres")]
    {
        if config.get_string("postgres", "connection_string").is_some() {
            use crate::adapters::postgres_adapter::PostgresAdapter;
            tracing::debug!("using postgres storage");
            return Ok(Box::new(PostgresAdapter::from_config(config)?));
        }
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;
        tracing::debug!("using sqlite storage");
        Ok(Box::new(SqliteAdapter::from_config(config)?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        Err(SmartExpertError::ConfigMissing {
            section: "postgres".into(),
            key: "connection_string".into(),
        })
    }
}

fn run_init(config_path: &Path) -> Result<ExitCode, SmartExpertError> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    storage.prepare()?;
    let seeded = storage.ensure_defaults()?;
    println!("database ready ({} default risk settings added)", seeded);
    Ok(ExitCode::SUCCESS)
}

/// Apply `--symbol` / `--timeframe` overrides; unknown names fail before any I/O.
pub fn resolve_matrix(
    config: &dyn ConfigPort,
    symbol: Option<&str>,
    timeframe: Option<&str>,
) -> Result<IngestConfig, SmartExpertError> {
    let ingest = build_ingest_config(config)?;
    let symbol = symbol.map(str::parse::<Symbol>).transpose()?;
    let timeframe = timeframe.map(str::parse::<Timeframe>).transpose()?;
    Ok(ingest.restrict(symbol, timeframe))
}

fn run_ingest(
    config_path: &Path,
    symbol: Option<&str>,
    timeframe: Option<&str>,
) -> Result<ExitCode, SmartExpertError> {
    // Stage 1: configuration, validated in full before touching the broker or the store
    let config = load_config(config_path)?;
    let ingest = resolve_matrix(&config, symbol, timeframe)?;
    let broker = build_broker_config(&config, process_env)?;

    // Stage 2: storage
    let storage = open_storage(&config)?;
    storage.prepare()?;

    // Stage 3: sweep
    let feed = TerminalFeedAdapter::new(broker.terminal_dir.clone());
    let report = run_sweep(&feed, &broker.credentials, storage.candles(), &ingest)?;
    print_report(&report);

    Ok(sweep_exit_code(&report))
}

/// Nonzero only when every pair failed.
pub fn sweep_exit_code(report: &SweepReport) -> ExitCode {
    if !report.pairs.is_empty() && report.succeeded() == 0 {
        let first = report.pairs.iter().find_map(|p| match &p.outcome {
            PairOutcome::Failed { error } => Some(error),
            PairOutcome::Stored { .. } => None,
        });
        if let Some(err) = first {
            return err.into();
        }
    }
    ExitCode::SUCCESS
}

fn print_report(report: &SweepReport) {
    for pair in &report.pairs {
        match &pair.outcome {
            PairOutcome::Stored { fetched, inserted } => println!(
                "{} {}: {} fetched, {} new",
                pair.symbol, pair.timeframe, fetched, inserted
            ),
            PairOutcome::Failed { error } => {
                println!("{} {}: FAILED ({})", pair.symbol, pair.timeframe, error)
            }
        }
    }
    println!(
        "{} pairs stored, {} failed, {} candles inserted",
        report.succeeded(),
        report.failed(),
        report.inserted()
    );
}

fn run_info(
    config_path: &Path,
    symbol: Option<&str>,
    timeframe: Option<&str>,
) -> Result<ExitCode, SmartExpertError> {
    let config = load_config(config_path)?;
    let matrix = resolve_matrix(&config, symbol, timeframe)?;
    let storage = open_storage(&config)?;

    for (symbol, timeframe) in matrix.pairs() {
        match storage.data_range(symbol, timeframe)? {
            Some((first, last, count)) => {
                println!("{} {}: {} bars, {} to {}", symbol, timeframe, count, first, last)
            }
            None => println!("{} {}: no data", symbol, timeframe),
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn run_closes(config_path: &Path, timeframe: &str) -> Result<ExitCode, SmartExpertError> {
    let timeframe: Timeframe = timeframe.parse()?;
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    let series = storage.read_close_series(timeframe)?;

    let csv_err = |e: csv::Error| SmartExpertError::Io(e.to_string());
    let mut wtr = csv::Writer::from_writer(std::io::stdout());
    wtr.write_record(["symbol", "time", "close"]).map_err(csv_err)?;
    for (name, points) in &series {
        for (time, close) in points {
            wtr.write_record([
                name.as_str(),
                &time.format("%Y-%m-%d %H:%M:%S").to_string(),
                &close.to_string(),
            ])
            .map_err(csv_err)?;
        }
    }
    wtr.flush()?;
    Ok(ExitCode::SUCCESS)
}

fn run_settings(config_path: &Path) -> Result<ExitCode, SmartExpertError> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    storage.prepare()?;

    let rows = storage.list()?;
    if rows.is_empty() {
        println!("no stored risk settings (defaults apply)");
    }
    for row in &rows {
        let updated = row
            .updated_at
            .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<26} {:<8} {}  {}",
            row.name,
            row.value,
            updated,
            row.description.as_deref().unwrap_or("")
        );
    }

    let engine = RiskEngine::from_store(storage.risk_settings())?;
    println!("\neffective:");
    for param in RiskParameter::ALL {
        println!("{:<26} {}", param.name(), engine.settings().get(param));
    }
    Ok(ExitCode::SUCCESS)
}

fn run_set_setting(
    config_path: &Path,
    name: &str,
    value: &str,
) -> Result<ExitCode, SmartExpertError> {
    let param: RiskParameter = name.parse()?;
    param.validate(value)?;
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    storage.prepare()?;
    storage.set(param, value)?;
    println!("{} = {}", param, value.trim());
    Ok(ExitCode::SUCCESS)
}

fn run_plan(config_path: &Path, request: TradeRequest) -> Result<ExitCode, SmartExpertError> {
    let config = load_config(config_path)?;
    let storage = open_storage(&config)?;
    storage.prepare()?;
    let engine = RiskEngine::from_store(storage.risk_settings())?;

    let result = engine.plan_trade(&request);
    println!("volume:      {:.2}", result.volume);
    println!("stop loss:   {}", result.stop_loss);
    println!("take profit: {}", result.take_profit);
    println!(
        "admission:   {} ({})",
        if result.admission.allowed {
            "allowed"
        } else {
            "denied"
        },
        result.admission.reason
    );
    Ok(ExitCode::SUCCESS)
}
