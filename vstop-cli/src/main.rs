//! VStop CLI — replay bar files through the signal engine.
//!
//! Commands:
//! - `replay` — feed CSV bars through one engine per symbol, print signals as
//!   JSON lines on stdout, persist per-symbol state after every bar
//! - `check-config` — validate a TOML engine config and print the effective values
//!
//! Logs go to stderr; filter with `RUST_LOG` (default `info`).

use anyhow::{bail, Context, Result};
use chrono::NaiveDateTime;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use vstop_core::persistence::{JsonStateStore, StateStore};
use vstop_core::{Bar, EngineConfig, SignalEngine, Universe};

#[derive(Parser)]
#[command(
    name = "vstop",
    about = "VStop — trailing-stop signal engine for intraday option entries"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay CSV bars (symbol,timestamp,open,high,low,close) through the engine.
    Replay {
        /// Bar files, each ordered by timestamp per symbol.
        #[arg(long = "bars", required = true, num_args = 1..)]
        bars: Vec<PathBuf>,

        /// Path to a TOML engine config. Defaults to built-in parameters.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Directory of per-symbol state snapshots. Without it, state is not persisted.
        #[arg(long)]
        state_dir: Option<PathBuf>,

        /// Ignore existing snapshots and start every symbol cold.
        #[arg(long, default_value_t = false)]
        fresh: bool,
    },
    /// Validate a TOML engine config and print the effective values.
    CheckConfig {
        /// Path to the TOML config file.
        path: PathBuf,
    },
}

fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();

    match cli.command {
        Commands::Replay {
            bars,
            config,
            state_dir,
            fresh,
        } => run_replay(&bars, config.as_deref(), state_dir, fresh),
        Commands::CheckConfig { path } => run_check_config(&path),
    }
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    match path {
        Some(path) => EngineConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(EngineConfig::default()),
    }
}

fn run_check_config(path: &Path) -> Result<()> {
    let config = load_config(Some(path))?;
    print!("{}", config.to_toml_string()?);
    Ok(())
}

/// One CSV row. Timestamps are parsed separately to accept both
/// `2024-07-01 09:15:00` and `2024-07-01T09:15:00`.
#[derive(Debug, Deserialize)]
struct BarRow {
    symbol: String,
    timestamp: String,
    open: f64,
    high: f64,
    low: f64,
    close: f64,
}

const TIMESTAMP_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M"];

fn parse_timestamp(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    TIMESTAMP_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .with_context(|| format!("unrecognised timestamp '{raw}'"))
}

fn read_bars<R: std::io::Read>(reader: R, source: &str) -> Result<Vec<Bar>> {
    let mut rdr = csv::ReaderBuilder::new().trim(csv::Trim::All).from_reader(reader);
    let mut bars = Vec::new();
    for (line, row) in rdr.deserialize::<BarRow>().enumerate() {
        let row = row.with_context(|| format!("{source}: row {}", line + 1))?;
        let timestamp =
            parse_timestamp(&row.timestamp).with_context(|| format!("{source}: row {}", line + 1))?;
        bars.push(Bar::new(
            row.symbol, timestamp, row.open, row.high, row.low, row.close,
        ));
    }
    Ok(bars)
}

fn read_bar_file(path: &Path) -> Result<Vec<Bar>> {
    let file =
        std::fs::File::open(path).with_context(|| format!("opening bars {}", path.display()))?;
    read_bars(file, &path.display().to_string())
}

/// Per-symbol bars in file order. Concatenates across files.
fn group_by_symbol(bars: Vec<Bar>) -> BTreeMap<String, Vec<Bar>> {
    let mut grouped: BTreeMap<String, Vec<Bar>> = BTreeMap::new();
    for bar in bars {
        grouped.entry(bar.symbol.clone()).or_default().push(bar);
    }
    grouped
}

/// Split a symbol's bars at the snapshot: bars up to and including
/// `last_timestamp` are history, the rest are live.
fn split_at_snapshot(bars: Vec<Bar>, last: Option<NaiveDateTime>) -> (Vec<Bar>, Vec<Bar>) {
    match last {
        Some(last) => bars.into_iter().partition(|b| b.timestamp <= last),
        None => (Vec::new(), bars),
    }
}

fn run_replay(
    files: &[PathBuf],
    config_path: Option<&Path>,
    state_dir: Option<PathBuf>,
    fresh: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let store = state_dir.map(JsonStateStore::new);

    let mut all = Vec::new();
    for path in files {
        all.extend(read_bar_file(path)?);
    }
    if all.is_empty() {
        bail!("no bars in {} file(s)", files.len());
    }

    let mut universe = Universe::new(config.clone())?;
    let mut live: Vec<Vec<Bar>> = Vec::new();

    for (symbol, bars) in group_by_symbol(all) {
        let snapshot = match (&store, fresh) {
            (Some(store), false) => store
                .load(&symbol)
                .with_context(|| format!("loading state for {symbol}"))?,
            _ => None,
        };

        let pending = match snapshot {
            Some(snapshot) => {
                let (history, pending) = split_at_snapshot(bars, snapshot.last_timestamp);
                let engine = SignalEngine::resume(config.clone(), snapshot, history)
                    .with_context(|| format!("resuming {symbol}"))?;
                universe.insert(engine);
                pending
            }
            None => bars,
        };

        for (round, bar) in pending.into_iter().enumerate() {
            if live.len() <= round {
                live.push(Vec::new());
            }
            live[round].push(bar);
        }
    }

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut signals = 0usize;
    let mut rejected = 0usize;

    // Round k holds every symbol's k-th pending bar, so each symbol keeps its
    // file order and state is saved after every bar.
    for batch in live {
        for symbol_cycles in universe.process_batch(batch)? {
            for result in &symbol_cycles.results {
                match result {
                    Ok(cycle) => {
                        if let Some(signal) = cycle.signal() {
                            serde_json::to_writer(&mut out, signal)?;
                            writeln!(out)?;
                            signals += 1;
                        }
                    }
                    Err(_) => rejected += 1,
                }
            }

            if let (Some(store), Some(engine)) =
                (&store, universe.engine(&symbol_cycles.symbol))
            {
                store
                    .save(&engine.snapshot())
                    .with_context(|| format!("saving state for {}", symbol_cycles.symbol))?;
            }
        }
    }
    out.flush()?;

    if rejected > 0 {
        warn!(rejected, "malformed bars were skipped");
    }
    for engine in universe.engines() {
        info!(
            symbol = engine.symbol(),
            bars_seen = engine.bars_seen(),
            last = ?engine.last_timestamp(),
            "replay finished"
        );
    }
    info!(signals, symbols = universe.len(), "replay complete");
    Ok(())
}
