//! evotrial CLI - evolutionary parameter trials against an optimizer.

mod course;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use evotrial_core::{
    Agent, ColorDistance, DistanceTraveled, Namespace, ParameterSet, Position, Rgb,
};
use evotrial_optimizer::{HttpOptimizerClient, InMemoryOptimizer, OptimizerClient};
use evotrial_trial::{
    DrawOutcome, SyncMode, TickOutcome, TrialConfig, TrialController, TrialNotice, TrialRunner,
    TrialStats,
};

use course::{Course, RunResult, RUNNER_PARAMETERS, SPAWN};

#[derive(Parser)]
#[command(name = "evotrial")]
#[command(about = "Evolutionary parameter trials against an optimizer service", long_about = None)]
struct Cli {
    /// Debug logging (overridden by RUST_LOG)
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Optimizer service base URL; in-process optimizer when omitted
    #[arg(long, global = true)]
    server: Option<String>,

    /// Trial configuration file (JSON)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Re-evaluation interval in seconds
    #[arg(long, global = true)]
    interval: Option<f64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Check optimizer connectivity
    Status,
    /// Erase a namespace's history
    Clear {
        /// Namespace
        namespace: String,
    },
    /// Color convergence: boxes evolve towards a target color
    Color {
        /// Draw from a pre-fetched batch instead of querying live
        #[arg(long)]
        cached: bool,
        /// Batch size for cached mode
        #[arg(long)]
        batch: Option<usize>,
        /// Number of boxes
        #[arg(long, default_value = "4")]
        agents: usize,
        /// Ticks before a box gives up
        #[arg(long, default_value = "50")]
        max_ticks: u64,
        /// Target color as R,G,B in [0, 1]
        #[arg(long, default_value = "1,0,0")]
        target: String,
    },
    /// Obstacle course: runners evolve until one reaches the finish
    Course {
        /// Attempts before giving up
        #[arg(long, default_value = "200")]
        attempts: u32,
        /// Finish line position
        #[arg(long, default_value = "40")]
        finish: f64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let mut config = match &cli.config {
        Some(path) => TrialConfig::from_json_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => TrialConfig::default(),
    };
    if let Some(secs) = cli.interval {
        config.interval = Duration::try_from_secs_f64(secs)
            .map_err(|e| anyhow!("Invalid interval {}: {}", secs, e))?;
    }

    match cli.command {
        Commands::Status => {
            let client = connect(cli.server.as_deref(), &config, InMemoryOptimizer::new())?;
            if client.has_connectivity().await {
                println!("Optimizer reachable");
            } else {
                println!("Optimizer unreachable");
            }
        }
        Commands::Clear { namespace } => {
            let client = connect(cli.server.as_deref(), &config, InMemoryOptimizer::new())?;
            let namespace = Namespace::new(namespace)?;
            client.clear_history(&namespace).await?;
            println!("Cleared history for {}", namespace);
        }
        Commands::Color { cached, batch, agents, max_ticks, target } => {
            if cached {
                config.mode = SyncMode::Cached;
            }
            if let Some(size) = batch {
                config.batch_size = size;
            }
            let target = parse_rgb(&target)?;
            let client = connect(cli.server.as_deref(), &config, InMemoryOptimizer::new())?;
            run_color(client, config, agents, max_ticks, target).await?;
        }
        Commands::Course { attempts, finish } => {
            if config.mode == SyncMode::Cached {
                bail!("The course demo runs live trials only");
            }
            let client = connect(cli.server.as_deref(), &config, course::runner_optimizer())?;
            run_course(client, config, attempts, Course::new(finish)).await?;
        }
    }

    Ok(())
}

fn connect(
    server: Option<&str>,
    config: &TrialConfig,
    local: InMemoryOptimizer,
) -> Result<Arc<dyn OptimizerClient>> {
    match server {
        Some(url) => {
            let client = HttpOptimizerClient::new(url, config.exchange_timeout)?;
            info!("Using optimizer service at {}", client.base_url());
            Ok(Arc::new(client))
        }
        None => {
            info!("Using in-process optimizer");
            Ok(Arc::new(local))
        }
    }
}

fn parse_rgb(s: &str) -> Result<Rgb> {
    let channels = s
        .split(',')
        .map(|c| c.trim().parse::<f64>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .with_context(|| format!("Invalid color {:?}", s))?;
    match channels.as_slice() {
        [r, g, b] => Ok(Rgb::new(*r, *g, *b)),
        _ => bail!("Expected R,G,B, got {:?}", s),
    }
}

/// One box per agent; each box shows the color of its parameters.
async fn run_color(
    client: Arc<dyn OptimizerClient>,
    config: TrialConfig,
    agents: usize,
    max_ticks: u64,
    target: Rgb,
) -> Result<()> {
    let mut boxes = Vec::with_capacity(agents);
    for index in 0..agents {
        let agent = box_agent()?;
        // Only the first box resets shared history
        let clear = index == 0 && config.clear_history_on_start;
        let config = config.clone().with_clear_history_on_start(clear);
        let controller = TrialController::builder(agent, ColorDistance::new(), target)
            .with_config(config)
            .start(client.clone())
            .await?;
        boxes.push(tokio::spawn(drive_box(controller, max_ticks)));
    }

    let mut converged = 0;
    for (index, handle) in boxes.into_iter().enumerate() {
        let (color, reached, stats) = handle.await?;
        if reached {
            converged += 1;
        }
        println!(
            "Box {}: {} ({:.3}, {:.3}, {:.3}) after {} ticks, {} submissions",
            index,
            if reached { "CONVERGED" } else { "GAVE UP" },
            color.r,
            color.g,
            color.b,
            stats.ticks,
            stats.submissions,
        );
    }
    println!("{}/{} boxes reached the target", converged, agents);
    Ok(())
}

/// A mid-grey box declaring its color channels.
fn box_agent() -> Result<Agent<Rgb>> {
    let params = ParameterSet::new([("red", 0.5), ("green", 0.5), ("blue", 0.5)])?;
    let color = Rgb::from_parameters(&params);
    Ok(Agent::new(Namespace::new("Box")?, params, color))
}

/// Keep a box's displayed color in step with its parameters until it
/// converges or runs out of ticks.
async fn drive_box(
    controller: TrialController<ColorDistance>,
    max_ticks: u64,
) -> (Rgb, bool, TrialStats) {
    let cached = controller.mode() == SyncMode::Cached;
    let (runner, mut notices) = TrialRunner::spawn(controller);
    let shared = runner.controller();

    {
        let mut controller = shared.lock().await;
        refresh_box(&mut controller, cached).await;
    }

    let mut ticks = 0;
    let mut reached = false;
    while let Some(notice) = notices.recv().await {
        match notice {
            TrialNotice::Tick(TickOutcome::Concluded { .. }) => {
                reached = true;
                break;
            }
            TrialNotice::Tick(TickOutcome::Continued { .. }) => {
                ticks += 1;
                if ticks >= max_ticks {
                    break;
                }
                let mut controller = shared.lock().await;
                if refresh_box(&mut controller, cached).await == Some(DrawOutcome::Exhausted) {
                    warn!("Box {} ran out of cached candidates", controller.agent().id);
                }
            }
            _ => {}
        }
    }

    let color = shared.lock().await.agent().state;
    let stats = runner.shutdown().await;
    (color, reached, stats)
}

/// Draw the next cached candidate (cached boxes only), then show the color
/// of the parameters the box now holds. Callers hold the controller lock
/// across both steps.
async fn refresh_box(
    controller: &mut TrialController<ColorDistance>,
    cached: bool,
) -> Option<DrawOutcome> {
    let drawn = if cached {
        Some(controller.trigger_draw().await)
    } else {
        None
    };
    let color = Rgb::from_parameters(&controller.agent().params);
    controller.set_state(color);
    drawn
}

/// Attempts run back to back; every crash hands over to a successor.
async fn run_course(
    client: Arc<dyn OptimizerClient>,
    config: TrialConfig,
    attempts: u32,
    course: Course,
) -> Result<()> {
    let agent = Agent::new(
        Namespace::new("Runner")?,
        ParameterSet::new(RUNNER_PARAMETERS)?,
        SPAWN,
    );
    let finish_line = Position::new(course.finish(), 0.0);
    let mut controller = TrialController::builder(agent, DistanceTraveled, finish_line)
        .with_config(config)
        .start(client)
        .await?;

    let mut best = 0.0_f64;
    for attempt in 1..=attempts {
        let params = controller.agent().params.clone();
        match course.run(&params) {
            RunResult::Finished => {
                controller.set_state(finish_line);
                let conclusion = controller.on_success().await;
                if conclusion.map_or(true, |c| !c.submitted) {
                    warn!("Final score was not recorded by the optimizer");
                }
                println!(
                    "Generation {} finished the course on attempt {} with {}",
                    controller.agent().generation,
                    attempt,
                    params
                );
                return Ok(());
            }
            RunResult::Crashed(at) => {
                best = best.max(at.x.abs());
                controller.set_state(at);
                if let Some(succession) = controller.on_failure().await {
                    info!(
                        "Attempt {} crashed at x={:.2}; generation {} tries {}",
                        attempt, at.x, succession.generation, succession.params
                    );
                }
            }
        }
    }

    println!(
        "No runner finished in {} attempts (best distance {:.2}, {} successors)",
        attempts,
        best,
        controller.stats().successors
    );
    Ok(())
}
