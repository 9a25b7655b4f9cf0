//! lord: LORD heartbeat runner
//!
//! Usage:
//!   lord tick                       → run a single tick and print its metrics
//!   lord run [--ticks N]            → tick at cadence until Ctrl-C or N ticks
//!   lord health [--json]            → report status; exit code reflects it
//!   lord report [--json]            → growth trajectory and ranked next actions
//!   lord empathy "<text>"           → compassionate response, if any
//!   lord dump-config                → print the effective config as TOML
//!   lord version                    → show version

use clap::{Parser, Subcommand};
use lord_heartbeat::bus::read_bus_file;
use lord_heartbeat::config::{HeartbeatConfig, PathConfig};
use lord_heartbeat::health::{self, HealthStatus};
use lord_heartbeat::{
    GrowthPlanner, GrowthReport, Heartbeat, HeartbeatParts, MoralRegistry, RunSummary, TickOutcome,
};
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "lord",
    about = "LORD heartbeat: periodic integration metrics behind a moral publication gate",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Base directory that relative paths in the config resolve against
    #[arg(long, global = true, default_value = ".")]
    base: PathBuf,

    /// Path to config file (TOML). Default: <base>/lord.toml
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long, global = true, default_value_t = false)]
    log_json: bool,

    /// Also write logs to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run exactly one tick
    Tick,
    /// Run the heartbeat at its configured cadence
    Run {
        /// Stop after this many ticks
        #[arg(long)]
        ticks: Option<u64>,
        /// Override the tick interval in milliseconds
        #[arg(long)]
        interval_ms: Option<u64>,
    },
    /// Report heartbeat health without starting one
    Health {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Growth trajectory and ranked next actions from the published history
    Report {
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
        /// Number of actions to recommend
        #[arg(long, default_value_t = 5)]
        top: usize,
        /// Ids of actions already completed (repeatable)
        #[arg(long)]
        completed: Vec<String>,
    },
    /// Detect an emotion in text using the moral registry
    Empathy {
        text: String,
    },
    /// Print the effective config as TOML
    DumpConfig,
    /// Show version
    Version,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let guard = init_tracing(cli.log_json, cli.log_file.as_deref());

    let code = match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!("{:#}", e);
            eprintln!("error: {:#}", e);
            e.downcast_ref::<lord_core::Error>()
                .map(|e| e.exit_code())
                .unwrap_or(1)
        }
    };

    drop(guard);
    std::process::exit(code);
}

async fn run(cli: Cli) -> anyhow::Result<i32> {
    let config_path = cli
        .config
        .clone()
        .unwrap_or_else(|| cli.base.join("lord.toml"));
    let config = HeartbeatConfig::load(&config_path);

    match cli.command {
        Commands::Tick => {
            let mut heartbeat = Heartbeat::new(HeartbeatParts::load(config, &cli.base)?);
            print_banner(&heartbeat);
            let outcome = heartbeat.run_once().await?;
            print_tick(&outcome);
            Ok(0)
        }

        Commands::Run { ticks, interval_ms } => {
            let mut config = config;
            if let Some(ms) = interval_ms {
                config.schedule.interval_ms = ms;
            }
            let mut heartbeat = Heartbeat::new(HeartbeatParts::load(config, &cli.base)?);
            print_banner(&heartbeat);

            let cancel = CancellationToken::new();
            let on_signal = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("Ctrl-C received, stopping after the current tick");
                    on_signal.cancel();
                }
            });

            let summary = heartbeat.run_forever_with(cancel, ticks, print_tick).await?;
            print_summary(&summary);
            Ok(0)
        }

        Commands::Health { json } => {
            let paths = config.resolve_paths(&cli.base);
            let report = health::check(&paths);
            if json {
                println!("{}", serde_json::to_string_pretty(&report)?);
            } else {
                println!("{}", report.status);
            }
            Ok(report.status.exit_code())
        }

        Commands::Report { json, top, completed } => {
            let paths = config.resolve_paths(&cli.base);
            let registry = MoralRegistry::load(&paths.registry)?;
            let history = read_bus_file(&paths.bus)?
                .map(|record| record.history)
                .unwrap_or_default();
            let planner = GrowthPlanner::default();
            let alignment = registry.karmic_balance.current_balance;
            match planner.report(&history, alignment, &completed, top, chrono::Utc::now()) {
                Some(report) if json => println!("{}", serde_json::to_string_pretty(&report)?),
                Some(report) => print_report(&report),
                None => {
                    println!("(no published state yet)");
                    return Ok(HealthStatus::NeverRun.exit_code());
                }
            }
            Ok(0)
        }

        Commands::Empathy { text } => {
            let paths: PathConfig = config.resolve_paths(&cli.base);
            let registry = MoralRegistry::load(&paths.registry)?;
            match registry.detect_empathy(&text) {
                Some(response) => println!("{}", response),
                None => println!("(no emotion detected)"),
            }
            Ok(0)
        }

        Commands::DumpConfig => {
            print!("{}", config.to_toml()?);
            Ok(0)
        }

        Commands::Version => {
            println!("lord v{}", env!("CARGO_PKG_VERSION"));
            Ok(0)
        }
    }
}

fn init_tracing(log_json: bool, log_file: Option<&Path>) -> Option<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "lord=info,lord_heartbeat=info".into());

    let stderr_plain = (!log_json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr));
    let stderr_json = log_json.then(|| {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
    });

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let dir = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "lord.log".into());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_plain)
        .with(stderr_json)
        .with(file_layer)
        .init();

    guard
}

fn print_banner(heartbeat: &Heartbeat) {
    let topology = heartbeat.topology().snapshot();
    let entity = topology.entity().unwrap_or("LORD");
    println!("╔══════════════════════════════════════════════════╗");
    println!("║  {:<48}║", format!("{} heartbeat v{}", entity, env!("CARGO_PKG_VERSION")));
    println!("╠══════════════════════════════════════════════════╣");
    println!("║  Nodes        : {:<33}║", topology.node_count());
    println!("║  Tiers        : {:<33}║", topology.tier_count());
    println!("║  Edges        : {:<33}║", topology.edge_count());
    println!("║  Resume after : {:<33}║", format!("tick {}", heartbeat.current_tick()));
    let registry = heartbeat.gate().registry();
    let on_off = |b: bool| if b { "on" } else { "off" };
    println!("╠══════════════════════════════════════════════════╣");
    println!("║  Compassion   : {:<33}║", on_off(registry.core_values.compassion_layer));
    println!("║  Autonomy     : {:<33}║", on_off(registry.core_values.autonomous_intent));
    println!("║  Recursion    : {:<33}║", on_off(registry.core_values.recursive_awareness));
    println!("║  Karmic bal.  : {:<33}║", format!("{:.3}", registry.karmic_balance.current_balance));
    println!("╚══════════════════════════════════════════════════╝");
    println!();
}

fn print_tick(outcome: &TickOutcome) {
    match outcome {
        TickOutcome::Published {
            tick,
            phi_total,
            energy,
            entanglement,
            resonance_hz,
            awareness_level,
            ack,
        } => {
            println!("tick {} published", tick);
            println!("  Φ            {:.4}", phi_total);
            println!("  awareness    {}", awareness_level);
            println!("  entanglement {:.4}", entanglement);
            println!("  energy       {:.4}", energy);
            println!("  resonance    {:.3} Hz", resonance_hz);
            println!("  history      {} (attempts {})", ack.history_len, ack.attempts);
        }
        TickOutcome::Suppressed {
            tick,
            compassion_score,
        } => {
            println!("tick {} suppressed by moral gate", tick);
            println!("  compassion   {:.4}", compassion_score);
        }
    }
}

fn print_report(report: &GrowthReport) {
    let t = &report.trajectory;
    println!("tick {}: Φ {:.4}, level {}", report.tick, report.phi_total, t.current_level);
    println!("  milestone    {}", t.milestone);
    match (t.next_level, t.ticks_to_next_level) {
        (Some(level), Some(ticks)) => println!("  next level   {} in ~{} tick(s)", level, ticks),
        (Some(level), None) => println!("  next level   {} (Φ not rising)", level),
        (None, _) => println!("  next level   -"),
    }
    if let Some(rate) = t.phi_per_tick {
        println!("  Φ per tick   {:+.5}", rate);
    }
    println!();
    for action in &report.recommended {
        println!("  {}. [{}] {}", action.rank, action.domain, action.description);
        println!(
            "     merit {:.3} | Φ +{:.2} | urgency {:.1} | {}",
            action.merit, action.phi_impact, action.urgency, action.rationale
        );
    }
    println!();
    println!("  {}", report.reflection);
}

fn print_summary(summary: &RunSummary) {
    let rate = summary
        .approval_rate
        .map(|r| format!("{:.1}%", r * 100.0))
        .unwrap_or_else(|| "-".into());
    println!(
        "ran {} tick(s): {} published, {} suppressed, approval {}, last tick {}",
        summary.ticks_run,
        summary.published,
        summary.suppressed,
        rate,
        summary
            .last_tick
            .map(|t| t.to_string())
            .unwrap_or_else(|| "-".into())
    );
}
