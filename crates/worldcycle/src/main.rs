mod config;
mod local_host;
mod settings;

use std::path::PathBuf;
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use glam::IVec3;
use worldcycle_core::scheduler::{detect_runtime_model, for_model, Ticks};
use worldcycle_core::{
    find_safe_spawn, Collaborators, Dimension, FsWorldStorage, HostCapabilities, Initiator,
    PlayerRoster, ResetOutcome, ResetPhase, ResetService, RuntimeModel, Scheduler, WorldHost,
    WorldInfo, WorldPoolManager,
};

use crate::config::AppConfig;
use crate::local_host::{LocalHost, NoiseTerrain};
use crate::settings::RonSettingsStore;

/// Upper bound for waiting on a full reset
const RESET_TIMEOUT: Duration = Duration::from_secs(600);

/// Ticks allowed for queued teleports to land before exiting
const SETTLE_TICKS: Ticks = 5;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (RON), layered over the compiled defaults
    #[arg(long, default_value = "worldcycle.ron")]
    config: PathBuf,

    /// Directory holding the worlds (overrides host.world_root)
    #[arg(long)]
    root: Option<PathBuf>,

    /// Simulated players to connect before running the command
    #[arg(long)]
    players: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Tear down and rebuild the worlds, or rotate the pool on a fixed-world host
    Reset {
        /// Seed for the new worlds (random if omitted)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Rotate the world pool
    Rotate {
        /// Number of rotations
        #[arg(long, default_value = "1")]
        times: usize,

        /// Cool-down in ticks before a retired slot is rebuilt
        #[arg(long)]
        cooldown: Option<Ticks>,

        /// Stay until retired slots have been rebuilt
        #[arg(long)]
        wait: bool,
    },

    /// Show the state of the world pool
    Stats,

    /// Search generated terrain for a safe spawn point
    Spawn {
        #[arg(long, allow_hyphen_values = true)]
        x: i32,

        #[arg(long, allow_hyphen_values = true)]
        z: i32,

        /// Terrain seed (defaults to the last reset's seed)
        #[arg(long)]
        seed: Option<u64>,
    },
}

/// Everything a command needs, wired together
struct Runtime {
    config: AppConfig,
    scheduler: Arc<dyn Scheduler>,
    host: Arc<LocalHost>,
    settings: Arc<RonSettingsStore>,
    deps: Collaborators,
}

impl Runtime {
    fn start(config: AppConfig) -> Result<Self> {
        let model = detect_runtime_model(|| match config.runtime.model() {
            Some(model) => model,
            None => probe_runtime_model(),
        });
        let scheduler =
            for_model(model, &config.core.scheduler).context("Failed to start scheduler")?;

        let root = &config.host.world_root;
        let storage = Arc::new(
            FsWorldStorage::new(root)
                .with_context(|| format!("Failed to open world root {:?}", root))?,
        );
        let capabilities = HostCapabilities {
            region_threading: model == RuntimeModel::RegionThreaded,
            dynamic_worlds: config.host.dynamic_worlds,
        };
        let host = Arc::new(LocalHost::new(
            storage.clone(),
            scheduler.clone(),
            capabilities,
            config.core.reset.holding_area.world.clone(),
        ));
        let settings = Arc::new(RonSettingsStore::open(
            root.join(&config.host.settings_file),
        )?);

        let deps = Collaborators {
            scheduler: scheduler.clone(),
            host: host.clone(),
            storage,
            roster: host.clone(),
            broadcaster: host.clone(),
            settings: settings.clone(),
        };

        Ok(Self {
            config,
            scheduler,
            host,
            settings,
            deps,
        })
    }

    /// Load the base world set, creating whatever is missing
    fn prepare_world_set(&self) -> Result<WorldInfo> {
        let base = &self.config.core.reset.base_world;
        let seed = self.settings.last_seed().unwrap_or_else(rand::random);
        let mut overworld = None;

        for dimension in Dimension::ALL {
            let name = dimension.world_name(base);
            let info = self
                .host
                .load_world(&name)
                .or_else(|| {
                    let settings = self.deps.world_settings(seed, dimension);
                    self.host.create_world(&name, &settings)
                })
                .with_context(|| format!("Failed to prepare world '{}'", name))?;
            if dimension == Dimension::Overworld {
                overworld = Some(info);
            }
        }

        overworld.with_context(|| format!("World set '{}' has no base world", base))
    }

    fn pool(&self) -> Result<WorldPoolManager> {
        let pool = WorldPoolManager::new(self.deps.clone(), self.config.core.pool.clone());
        for warning in pool.warnings() {
            log::warn!("[POOL] {}", warning);
        }
        pool.initialize_pool()
            .context("Failed to initialize world pool")?;
        Ok(pool)
    }

    fn connect_players(&self, world: &WorldInfo) {
        let count = self.config.host.simulated_players;
        if count > 0 {
            self.host.connect_players(count, world);
            log::info!("{} simulated players joined '{}'", count, world.name);
        }
    }

    /// Block until the authoritative clock has advanced `ticks` ticks
    fn wait_ticks(&self, ticks: Ticks) {
        let target = self.scheduler.current_tick() + ticks;
        let tick = Duration::from_millis(self.config.core.scheduler.tick_millis.max(1));
        while self.scheduler.current_tick() < target {
            std::thread::sleep(tick);
        }
    }

    fn print_players(&self) {
        for player in self.host.online_players() {
            let Some(location) = self.host.location(player) else {
                continue;
            };
            println!(
                "  {} in '{}' at ({:.1}, {:.1}, {:.1}), {:?}",
                player,
                location.world,
                location.position.x,
                location.position.y,
                location.position.z,
                self.host.game_mode(player).unwrap_or_default()
            );
        }
    }

    fn print_worlds(&self) {
        for report in self.host.world_reports() {
            println!(
                "  {:<24} seed {:<20} spawn ({}, {}, {})  chunks {} ({} pinned)",
                report.info.name,
                report.info.seed,
                report.info.spawn.x,
                report.info.spawn.y,
                report.info.spawn.z,
                report.loaded_chunks,
                report.forced_chunks
            );
        }
    }
}

/// Region threading pays off only with enough cores to give regions their own threads
fn probe_runtime_model() -> RuntimeModel {
    let cores = std::thread::available_parallelism().map_or(1, |n| n.get());
    if cores >= 4 {
        RuntimeModel::RegionThreaded
    } else {
        RuntimeModel::GlobalLoop
    }
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();
    let mut config = AppConfig::load(&args.config)?;
    if let Some(root) = args.root {
        config.host.world_root = root;
    }
    if let Some(players) = args.players {
        config.host.simulated_players = players;
    }
    if let Command::Rotate {
        cooldown: Some(ticks),
        ..
    } = args.command
    {
        config.core.pool.regeneration_delay_ticks = ticks;
    }

    log::info!("Starting worldcycle in {:?}", config.host.world_root);
    let runtime = Runtime::start(config)?;
    let result = match args.command {
        Command::Reset { seed } => run_reset(&runtime, seed),
        Command::Rotate { times, wait, .. } => run_rotate(&runtime, times, wait),
        Command::Stats => run_stats(&runtime),
        Command::Spawn { x, z, seed } => run_spawn(&runtime, x, z, seed),
    };

    runtime.scheduler.shutdown();
    result
}

fn run_reset(runtime: &Runtime, seed: Option<u64>) -> Result<()> {
    let service = ResetService::new(runtime.deps.clone(), &runtime.config.core);

    let world = match service.pool() {
        Some(pool) => {
            pool.initialize_pool()
                .context("Failed to initialize world pool")?;
            if seed.is_some() {
                log::warn!("Pool rotation ignores --seed; slots keep their own seeds");
            }
            pool.get_current_world()?
        }
        None => runtime.prepare_world_set()?,
    };
    runtime.connect_players(&world);

    let outcome = match (seed, service.orchestrator()) {
        (Some(seed), Some(orchestrator)) => {
            orchestrator.begin_full_reset_with_seed(Initiator::Console, seed)?;
            ResetOutcome::Started
        }
        _ => service.begin_full_reset(Initiator::Console)?,
    };

    match outcome {
        ResetOutcome::Started => {
            let started = Instant::now();
            let tick = Duration::from_millis(runtime.config.core.scheduler.tick_millis.max(1));
            while service.is_reset_in_progress() {
                if started.elapsed() > RESET_TIMEOUT {
                    bail!(
                        "Reset still in the '{}' phase after {:?}",
                        service.current_phase(),
                        RESET_TIMEOUT
                    );
                }
                std::thread::sleep(tick);
            }

            let last = service.orchestrator().and_then(|o| o.last_outcome());
            if last != Some(ResetPhase::Complete) {
                bail!("Reset did not complete (ended as {:?})", last);
            }
            println!("Reset complete in {:.1?}", started.elapsed());
        }
        ResetOutcome::Rotated(info) => {
            runtime.wait_ticks(SETTLE_TICKS);
            println!("Rotated to '{}' (seed {})", info.name, info.seed);
        }
    }

    for message in runtime.host.broadcasts() {
        println!("  > {}", message);
    }
    runtime.print_worlds();
    runtime.print_players();
    Ok(())
}

fn run_rotate(runtime: &Runtime, times: usize, wait: bool) -> Result<()> {
    let pool = runtime.pool()?;
    let current = pool.get_current_world()?;
    runtime.connect_players(&current);

    for _ in 0..times {
        let next = pool.rotate_to_next_world()?;
        pool.send_everyone_to(&next);
        println!("Rotated to '{}' (seed {})", next.name, next.seed);
    }
    runtime.wait_ticks(SETTLE_TICKS);

    if wait {
        let delay = runtime.config.core.pool.regeneration_delay_ticks;
        log::info!("Waiting {} ticks for retired slots to be rebuilt", delay);
        runtime.wait_ticks(delay + SETTLE_TICKS);
    } else if times > 0 {
        log::info!(
            "Exiting before the cool-down; retired slots keep their worlds until the next rebuild"
        );
    }

    print_pool(&pool);
    runtime.print_players();
    Ok(())
}

fn run_stats(runtime: &Runtime) -> Result<()> {
    let pool = runtime.pool()?;
    print_pool(&pool);
    Ok(())
}

fn print_pool(pool: &WorldPoolManager) {
    let stats = pool.get_pool_stats();
    println!(
        "Pool of {} ({} loaded), current slot {} '{}'",
        stats.pool_size, stats.materialized, stats.current_index, stats.current_name
    );
    for slot in pool.slots() {
        let seed = slot
            .seed
            .map_or_else(|| "-".to_string(), |seed| seed.to_string());
        let marker = if slot.in_use {
            "*"
        } else if slot.rebuilding {
            "~"
        } else {
            " "
        };
        println!("  {} {:<20} seed {}", marker, slot.name, seed);
    }
}

fn run_spawn(runtime: &Runtime, x: i32, z: i32, seed: Option<u64>) -> Result<()> {
    let seed = seed
        .or_else(|| runtime.settings.last_seed())
        .unwrap_or_else(rand::random);
    let terrain = NoiseTerrain::new(seed);
    let start = IVec3::new(x, runtime.config.core.reset.base_point.y, z);
    let search = runtime.config.core.spawn.clone();

    // Terrain reads belong on the region that owns the start column
    let (tx, rx) = mpsc::channel();
    runtime.scheduler.run_at_region(
        move || {
            let _ = tx.send(find_safe_spawn(&terrain, start, &search));
        },
        start,
    );
    let spawn = rx
        .recv_timeout(RESET_TIMEOUT)
        .context("Spawn search did not finish")?;

    println!(
        "Seed {}: spawn at ({}, {}, {}) with score {}",
        seed, spawn.position.x, spawn.position.y, spawn.position.z, spawn.score
    );
    Ok(())
}
