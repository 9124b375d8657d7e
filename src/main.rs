//! loadvisor CLI: run, validate, and serve simulations.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use tokio_util::sync::CancellationToken;

use loadvisor::events::{Bus, Event, EventKind};
use loadvisor::pool::MAX_WORKERS;
use loadvisor::simulation::{Simulation, SimulationOutcome};
use loadvisor::subscribers::{LogLevel, LogWriter, SubscriberSet};
use loadvisor::{config, control, shutdown};

#[derive(Parser)]
#[command(name = "loadvisor", version, about = "Declarative HTTP load-simulation harness")]
struct Cli {
    /// Verbose output (implies --log-level trace)
    #[arg(long, global = true)]
    verbose: bool,

    /// Minimum log level to print
    #[arg(long, value_enum, global = true)]
    log_level: Option<LevelArg>,

    /// Disable ANSI colour in log output
    #[arg(long, global = true)]
    no_color: bool,

    /// Path to a CLI defaults file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum LevelArg {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LevelArg {
    fn to_level(self) -> LogLevel {
        match self {
            LevelArg::Trace => LogLevel::Trace,
            LevelArg::Debug => LogLevel::Debug,
            LevelArg::Info => LogLevel::Info,
            LevelArg::Warn => LogLevel::Warn,
            LevelArg::Error => LogLevel::Error,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TransportArg {
    Stdio,
    Tcp,
}

#[derive(Subcommand)]
enum Command {
    /// Execute a simulation
    Run {
        /// Path to the simulation configuration file
        file: Option<PathBuf>,

        /// Path to the simulation configuration file (flag form)
        #[arg(long, short = 'p', default_value = "simulation.json")]
        path: PathBuf,

        /// Dry run without making external requests
        #[arg(long)]
        dry: bool,

        /// Worker ceiling for the simulation pool
        #[arg(long, short = 'w')]
        workers: Option<usize>,

        /// Whole-simulation deadline in seconds
        #[arg(long, short = 't')]
        timeout: Option<u64>,
    },

    /// Validate a simulation configuration without executing it
    Validate {
        /// Path to the simulation configuration file
        file: PathBuf,
    },

    /// Start the control-plane server
    Mcp {
        /// Port to listen on (TCP transport only)
        #[arg(long, short = 'p', default_value_t = 3000)]
        port: u16,

        /// Transport protocol
        #[arg(long, short = 't', value_enum, default_value = "stdio")]
        transport: TransportArg,
    },

    /// Show version information
    Version,
}

/// Optional defaults loaded from `--config`.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
struct CliDefaults {
    #[serde(default)]
    verbose: bool,
    #[serde(default)]
    no_color: bool,
    log_level: Option<String>,
    workers: Option<usize>,
}

impl CliDefaults {
    fn load(path: Option<&PathBuf>) -> anyhow::Result<Self> {
        let Some(path) = path else {
            return Ok(Self::default());
        };
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }
}

fn effective_level(cli: &Cli, defaults: &CliDefaults) -> LogLevel {
    if cli.verbose || defaults.verbose {
        return LogLevel::Trace;
    }
    if let Some(level) = cli.log_level {
        return level.to_level();
    }
    match &defaults.log_level {
        Some(name) => LogLevel::parse(name),
        None => LogLevel::Info,
    }
}

fn wire_logging(level: LogLevel, color: bool) -> Bus {
    let bus = Bus::default();
    let subs = Arc::new(SubscriberSet::new(
        vec![Arc::new(LogWriter::from_env(level, color)) as Arc<dyn loadvisor::Subscribe>],
        bus.clone(),
    ));
    subs.listen(&bus);
    // The set's workers are detached; keep it alive for the process lifetime.
    std::mem::forget(subs);
    bus
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let defaults = CliDefaults::load(cli.config.as_ref())?;
    let level = effective_level(&cli, &defaults);
    let color = !cli.no_color && !defaults.no_color;

    match cli.command {
        Command::Run {
            ref file,
            ref path,
            dry,
            workers,
            timeout,
        } => {
            let path = file.clone().unwrap_or_else(|| path.clone());
            let workers = workers.or(defaults.workers).unwrap_or(10);
            run(path, dry, workers, timeout, level, color).await
        }
        Command::Validate { ref file } => validate(file),
        Command::Mcp { port, transport } => mcp(port, transport, level, color).await,
        Command::Version => {
            version(cli.verbose);
            Ok(())
        }
    }
}

async fn run(
    path: PathBuf,
    dry: bool,
    workers: usize,
    timeout: Option<u64>,
    level: LogLevel,
    color: bool,
) -> anyhow::Result<()> {
    let cfg = config::load(&path)?;
    let problems = cfg.validate();
    if !problems.is_empty() {
        for p in &problems {
            eprintln!("error: {p}");
        }
        bail!("{} validation error(s) in {}", problems.len(), path.display());
    }

    let bus = wire_logging(level, color);
    let token = CancellationToken::new();
    let sim = Simulation::from_config(&cfg, dry, token.clone(), bus.clone())
        .with_pool_ceiling(workers.clamp(2, MAX_WORKERS));

    let outcome = {
        let sim_fut = sim.start();
        tokio::pin!(sim_fut);

        let cancel_on = async {
            let deadline = async {
                match timeout {
                    Some(secs) => tokio::time::sleep(Duration::from_secs(secs)).await,
                    None => std::future::pending().await,
                }
            };
            tokio::select! {
                _ = deadline => {}
                _ = shutdown::wait_for_shutdown_signal() => {}
            }
        };
        tokio::pin!(cancel_on);

        let mut armed = true;
        loop {
            tokio::select! {
                outcome = &mut sim_fut => break outcome,
                _ = &mut cancel_on, if armed => {
                    armed = false;
                    bus.publish(Event::now(EventKind::ShutdownRequested));
                    token.cancel();
                }
            }
        }
    };

    // Give the log fan-out a beat to drain before the process exits.
    tokio::time::sleep(Duration::from_millis(100)).await;

    match outcome {
        SimulationOutcome::Completed => Ok(()),
        SimulationOutcome::Cancelled => Err(anyhow!("simulation '{}' was cancelled", sim.name())),
        SimulationOutcome::Failed => Err(anyhow!("simulation '{}' failed", sim.name())),
    }
}

fn validate(file: &PathBuf) -> anyhow::Result<()> {
    let cfg = config::load(file)?;
    let problems = cfg.validate();
    if !problems.is_empty() {
        for p in &problems {
            eprintln!("error: {p}");
        }
        bail!("{} validation error(s) in {}", problems.len(), file.display());
    }
    println!("{} is valid", file.display());
    Ok(())
}

async fn mcp(port: u16, transport: TransportArg, level: LogLevel, color: bool) -> anyhow::Result<()> {
    let bus = wire_logging(level, color);
    let api = Arc::new(control::ControlApi::new(bus.clone()));
    let token = CancellationToken::new();

    {
        let bus = bus.clone();
        let token = token.clone();
        tokio::spawn(async move {
            let _ = shutdown::wait_for_shutdown_signal().await;
            bus.publish(Event::now(EventKind::ShutdownRequested));
            token.cancel();
        });
    }

    let served = match transport {
        TransportArg::Stdio => control::transport::serve_stdio(Arc::clone(&api), token.clone()).await,
        TransportArg::Tcp => control::transport::serve_tcp(Arc::clone(&api), port, token.clone()).await,
    };

    api.shutdown().await;
    served.context("control-plane transport failed")
}

fn version(verbose: bool) {
    let version = env!("CARGO_PKG_VERSION");
    if verbose {
        println!("loadvisor version information:");
        println!("  Version:    {version}");
        println!(
            "  Git Commit: {}",
            option_env!("LOADVISOR_GIT_COMMIT").unwrap_or("unknown")
        );
        println!(
            "  Build Date: {}",
            option_env!("LOADVISOR_BUILD_DATE").unwrap_or("unknown")
        );
        println!(
            "  OS/Arch:    {}/{}",
            std::env::consts::OS,
            std::env::consts::ARCH
        );
    } else {
        println!("loadvisor {version}");
    }
}
