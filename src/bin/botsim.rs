//! botsim CLI binary.
//!
//! Synthetic-agent traffic simulator for a social/matching service.
//!
//! # Commands
//!
//! - `run` - Drive the agent population until Ctrl-C
//! - `config` - Print the effective configuration as TOML
//! - `roster` - Show the population that `run` would drive

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use botsim::{
    activity::{ActivitySink, JsonlSink, MemorySink, NullSink, TracingSink},
    agent::{Population, Roster},
    config::{Config, SinkKind},
    service::{HttpService, ScriptedService, ServiceApi},
    supervisor::Supervisor,
    BiasPolicy, VERSION,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;

/// Calls and messages retained by the dry-run stand-in
const DRY_RUN_HISTORY: usize = 1024;

#[derive(Parser)]
#[command(name = "botsim")]
#[command(version = VERSION)]
#[command(about = "Synthetic-agent traffic simulator for a social matching service", long_about = None)]
struct Cli {
    /// Config file (default: <config dir>/botsim/config.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Drive the agent population until interrupted
    Run {
        #[command(flatten)]
        overrides: Overrides,

        /// Run against an in-memory stand-in instead of the service
        #[arg(long)]
        dry_run: bool,

        /// Human profiles in the dry-run stand-in
        #[arg(long, default_value = "30")]
        humans: usize,
    },

    /// Print the effective configuration as TOML
    Config {
        #[command(flatten)]
        overrides: Overrides,
    },

    /// List the agents a run would drive
    Roster {
        #[command(flatten)]
        overrides: Overrides,

        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Flags that override the config file and environment.
#[derive(Args, Default)]
struct Overrides {
    /// Service base URL
    #[arg(short, long)]
    server: Option<String>,

    /// Number of agents
    #[arg(short, long)]
    bots: Option<usize>,

    /// Agents allowed in session at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Roster file (TOML or JSON)
    #[arg(long)]
    roster: Option<PathBuf>,

    /// Selector policy (favor_popular, favor_underexposed)
    #[arg(long)]
    policy: Option<BiasPolicy>,

    /// Seed for reproducible agent behavior
    #[arg(long)]
    seed: Option<u64>,

    /// Activity sink (tracing, jsonl, memory, none)
    #[arg(long)]
    activity: Option<SinkKind>,

    /// Activity log file; implies the jsonl sink
    #[arg(long)]
    activity_log: Option<PathBuf>,
}

impl Overrides {
    fn apply(self, config: &mut Config) {
        if let Some(server) = self.server {
            config.service.base_url = server;
        }
        if let Some(bots) = self.bots {
            config.population.size = bots;
        }
        if let Some(concurrency) = self.concurrency {
            config.scheduler.concurrency = concurrency;
        }
        if let Some(roster) = self.roster {
            config.population.roster = Some(roster);
        }
        if let Some(policy) = self.policy {
            config.behavior.selector_policy = policy;
        }
        if let Some(seed) = self.seed {
            config.population.seed = Some(seed);
        }
        if let Some(sink) = self.activity {
            config.activity.sink = sink;
        }
        if let Some(path) = self.activity_log {
            config.activity.sink = SinkKind::Jsonl;
            config.activity.path = Some(path);
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);

    match cli.command {
        Commands::Run {
            overrides,
            dry_run,
            humans,
        } => {
            let config = load_config(cli.config.as_deref(), overrides)?;
            cmd_run(config, dry_run, humans)
        },
        Commands::Config { overrides } => {
            let config = load_config(cli.config.as_deref(), overrides)?;
            print!("{}", config.to_toml()?);
            Ok(())
        },
        Commands::Roster { overrides, json } => {
            let config = load_config(cli.config.as_deref(), overrides)?;
            cmd_roster(&config, json)
        },
    }
}

fn init_logging(verbose: bool, json: bool) {
    let log_level = if verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    if json {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

fn load_config(path: Option<&Path>, overrides: Overrides) -> anyhow::Result<Config> {
    let mut config = Config::load(path)?;
    overrides.apply(&mut config);
    config.validate()?;
    Ok(config)
}

fn load_population(config: &Config) -> anyhow::Result<Population> {
    let roster = match &config.population.roster {
        Some(path) => Roster::from_file(path)?,
        None => Roster::generated(config.population.size),
    };
    let population = Population::assign(
        &roster,
        config.population.size,
        config.population.night_shift_every,
        &config.service.default_password,
    )?;
    Ok(population)
}

/// Activity sink plus the concrete handles that need attention at exit.
struct Sinks {
    sink: Arc<dyn ActivitySink>,
    jsonl: Option<Arc<JsonlSink>>,
    memory: Option<Arc<MemorySink>>,
}

async fn build_sinks(config: &Config) -> anyhow::Result<Sinks> {
    let mut sinks = Sinks {
        sink: Arc::new(TracingSink),
        jsonl: None,
        memory: None,
    };
    match config.activity.sink {
        SinkKind::Tracing => {},
        SinkKind::None => sinks.sink = Arc::new(NullSink),
        SinkKind::Memory => {
            let memory = Arc::new(MemorySink::with_capacity(config.activity.buffer));
            sinks.sink = memory.clone();
            sinks.memory = Some(memory);
        },
        SinkKind::Jsonl => {
            let path = config
                .activity
                .path
                .as_ref()
                .context("activity.path is required for the jsonl sink")?;
            let jsonl = Arc::new(JsonlSink::open(path, config.activity.buffer).await?);
            tracing::info!("Writing activity records to {}", jsonl.path().display());
            sinks.sink = jsonl.clone();
            sinks.jsonl = Some(jsonl);
        },
    }
    Ok(sinks)
}

fn build_service(
    config: &Config,
    population: &Population,
    dry_run: bool,
    humans: usize,
) -> anyhow::Result<Arc<dyn ServiceApi>> {
    if dry_run {
        tracing::info!("Dry run: using scripted service with {} human profiles", humans);
        let accounts = population
            .agents()
            .iter()
            .map(|a| (a.id.0, a.username.clone(), a.password.clone()));
        let service = ScriptedService::populated(accounts, humans)
            .with_history(DRY_RUN_HISTORY)
            .with_latency(Duration::from_millis(50));
        return Ok(Arc::new(service));
    }

    let service = HttpService::new(config.http_config())?
        .with_known_bots(population.agents().iter().map(|a| a.id.0));
    tracing::info!("Target service: {}", service.base_url());
    Ok(Arc::new(service))
}

fn cmd_run(config: Config, dry_run: bool, humans: usize) -> anyhow::Result<()> {
    let population = load_population(&config)?;
    let service = build_service(&config, &population, dry_run, humans)?;

    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let sinks = build_sinks(&config).await?;

        let supervisor = Supervisor::new(
            population,
            service,
            sinks.sink.clone(),
            config.sim_settings(),
            config.scheduler.concurrency,
        )
        .with_seed(config.population.seed)
        .with_stats_interval(Duration::from_secs(config.scheduler.stats_interval_secs.max(1)));

        let shutdown = supervisor.shutdown();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Shutdown requested, letting agents finish their sessions");
                shutdown.trigger();
            }
        });

        let summary = supervisor.run().await;

        if let Some(jsonl) = &sinks.jsonl {
            jsonl.close().await;
        }
        if let Some(memory) = &sinks.memory {
            tracing::info!(
                "Buffered {} activity records ({} dropped)",
                memory.records().len(),
                memory.dropped()
            );
        }

        println!("{}", serde_json::to_string_pretty(&summary)?);
        Ok::<_, anyhow::Error>(())
    })
}

#[derive(Serialize)]
struct RosterRow<'a> {
    index: usize,
    id: i64,
    username: &'a str,
    pattern: &'static str,
    night_shift: bool,
}

fn cmd_roster(config: &Config, json: bool) -> anyhow::Result<()> {
    let population = load_population(config)?;
    let rows: Vec<RosterRow<'_>> = population
        .agents()
        .iter()
        .map(|a| RosterRow {
            index: a.index,
            id: a.id.0,
            username: &a.username,
            pattern: a.pattern.name(),
            night_shift: a.night_shift,
        })
        .collect();

    if json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
        return Ok(());
    }

    println!("{:<6} {:<8} {:<24} {:<10} NIGHT", "INDEX", "ID", "USERNAME", "PATTERN");
    for row in &rows {
        println!(
            "{:<6} {:<8} {:<24} {:<10} {}",
            row.index,
            row.id,
            row.username,
            row.pattern,
            if row.night_shift { "yes" } else { "" }
        );
    }
    println!(
        "\n{} agents, {} night-shift",
        population.len(),
        population.night_shift_count()
    );
    Ok(())
}
