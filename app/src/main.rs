// In app/src/main.rs

use anyhow::{Context, Result};
use api_client::simulated::synthetic_series;
use api_client::{CandlePeriod, SimulatedGateway, SimulationParams};
use app_config::{Settings, SimulationConfig};
use backtester::Backtester;
use chrono::{TimeZone, Utc};
use clap::{Parser, Subcommand};
use engine::Engine;
use execution::{SimulatedExecutor, SimulationSettings};
use itertools::Itertools;
use rayon::prelude::*;
use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::prelude::*;

// --- Command-Line Interface Definition ---

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = "A multi-source crossover signal and risk engine for listed equities.")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Runs the engine against the simulated market until Ctrl-C.
    Run {
        /// Stop on its own after this many seconds.
        #[arg(long)]
        duration_secs: Option<u64>,
    },

    /// Replays synthetic history for the whole universe and prints a performance report.
    Backtest {
        /// Bars per instrument (defaults to `simulation.backtest_bars`).
        #[arg(long)]
        bars: Option<usize>,

        /// Base seed for the generated series (defaults to `simulation.seed`).
        #[arg(long)]
        seed: Option<u64>,

        /// Emit the result as JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Prints the validated settings and the live/poll split.
    Config,
}

// --- Main Application Entry Point ---

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if it exists.
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    let settings = app_config::load_settings().context("failed to load settings")?;

    let level = settings.app.log_level.parse().unwrap_or(tracing::Level::INFO);
    let fmt_layer = tracing_subscriber::fmt::layer().with_filter(
        tracing_subscriber::filter::Targets::new()
            .with_target("api_client::simulated", tracing::Level::WARN)
            .with_default(level),
    );
    tracing_subscriber::registry().with(fmt_layer).init();

    tracing::info!(environment = %settings.app.environment, "Starting signal engine.");

    match cli.command {
        Commands::Run { duration_secs } => run_app(settings, duration_secs).await?,
        Commands::Backtest { bars, seed, json } => handle_backtest(settings, bars, seed, json).await?,
        Commands::Config => print_config(&settings)?,
    }

    tracing::info!("Signal engine has finished successfully.");
    Ok(())
}

fn simulation_params(config: &SimulationConfig, seed: u64) -> SimulationParams {
    SimulationParams {
        seed,
        volatility_pct: config.volatility_pct,
        spike_probability: config.spike_probability,
    }
}

// --- "Run" Subcommand Logic ---

async fn run_app(settings: Settings, duration_secs: Option<u64>) -> Result<()> {
    let universe = settings.instruments();
    let gateway = Arc::new(SimulatedGateway::new(
        &universe,
        simulation_params(&settings.simulation, settings.simulation.seed),
    ));
    let shutdown = CancellationToken::new();
    let ticker = gateway.spawn_ticker(
        Duration::from_millis(settings.simulation.tick_interval_ms),
        shutdown.clone(),
    );

    let engine = Engine::new(settings, gateway.clone())?;
    let engine_handle = tokio::spawn({
        let token = shutdown.clone();
        async move { engine.run(token).await }
    });

    match duration_secs {
        Some(secs) => tokio::select! {
            _ = tokio::time::sleep(Duration::from_secs(secs)) => {
                tracing::info!(secs, "Run duration elapsed.");
            }
            result = tokio::signal::ctrl_c() => {
                result?;
                tracing::info!("Interrupt received.");
            }
        },
        None => {
            tokio::signal::ctrl_c().await?;
            tracing::info!("Interrupt received.");
        }
    }

    tracing::info!("Shutting down...");
    shutdown.cancel();
    engine_handle.await??;
    ticker.await?;
    Ok(())
}

// --- "Backtest" Subcommand Logic ---

async fn handle_backtest(settings: Settings, bars: Option<usize>, seed: Option<u64>, json: bool) -> Result<()> {
    let universe = settings.instruments();
    let bars = bars.unwrap_or(settings.simulation.backtest_bars);
    let seed = seed.unwrap_or(settings.simulation.seed);
    let period = CandlePeriod::Minutes(settings.batch.candle_period_minutes);
    let start = Utc
        .with_ymd_and_hms(2025, 1, 2, 0, 0, 0)
        .single()
        .context("invalid backtest start time")?;

    tracing::info!(instruments = universe.len(), bars, seed, %period, "Generating synthetic history.");
    let series: BTreeMap<_, _> = universe
        .par_iter()
        .enumerate()
        .map(|(i, instrument)| {
            let params = simulation_params(&settings.simulation, seed.wrapping_add(i as u64));
            let start_price = Decimal::from(10_000 + 2_500 * (i as i64 % 16));
            (instrument.code.clone(), synthetic_series(&params, start_price, start, period, bars))
        })
        .collect();

    let executor = SimulatedExecutor::new(SimulationSettings {
        slippage_pct: settings.simulation.slippage_pct,
    })?;
    let pipeline = engine::assemble_pipeline(&settings, Arc::new(executor))?;
    let result = Backtester::new(Arc::new(pipeline)).run(series).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    } else {
        backtester::print_report(&result);
    }
    Ok(())
}

// --- "Config" Subcommand Logic ---

fn print_config(settings: &Settings) -> Result<()> {
    println!("{}", toml::to_string_pretty(settings)?);

    let split = engine::partition(&settings.instruments(), settings.resilience.max_live_instruments);
    println!("# live ({}): {}", split.live.len(), split.live.iter().map(|i| &i.code).join(", "));
    println!("# poll ({}): {}", split.poll.len(), split.poll.iter().map(|i| &i.code).join(", "));
    Ok(())
}
