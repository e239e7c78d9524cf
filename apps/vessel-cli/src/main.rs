use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;
use vessel_affinity::{
    AffinityScheduler, RegionConfig, RegionScheduler, SingleOwnerScheduler, run_sync_at_entity,
};
use vessel_capture::{Coordinator, Outcome, Summary, VesselConfig};
use vessel_common::{BlockFace, BlockPos, EntityId, Location, Profession};
use vessel_kernel::item::BUCKET;
use vessel_kernel::{BlockKind, HostWorld, ItemStack, MerchantRecipe, SpawnReason};

#[derive(Parser)]
#[command(name = "vessel-cli", about = "CLI tool for merchant vessels")]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// YAML configuration file; defaults apply when absent
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print version and codec info
    Info,
    /// Print the effective configuration as YAML
    Config,
    /// Decode a container payload and print the snapshot it holds
    Decode {
        /// The payload string stored on a filled container
        payload: String,
    },
    /// Capture a merchant and release it again in an in-memory world
    Demo {
        #[arg(short, long, value_enum, default_value = "single")]
        topology: TopologyArg,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum TopologyArg {
    Single,
    Regions,
}

const WAIT: Duration = Duration::from_secs(5);

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    let config = match &cli.config {
        Some(path) => VesselConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => VesselConfig::default(),
    };

    match cli.command {
        Commands::Info => {
            println!("vessel-cli v{}", env!("CARGO_PKG_VERSION"));
            println!(
                "codec: schema={} (reads {}..={})",
                vessel_persist::SCHEMA_VERSION,
                vessel_persist::LEGACY_SCHEMA_VERSION,
                vessel_persist::SCHEMA_VERSION
            );
            println!("container: {:?}", config.container_name);
            println!(
                "cooldowns: actor={}ms location={}ms",
                config.actor_cooldown_ms, config.location_cooldown_ms
            );
        }
        Commands::Config => {
            print!("{}", config.to_yaml()?);
        }
        Commands::Decode { payload } => {
            let decoded = vessel_persist::decode_document(payload.trim())?;
            println!("{}", serde_json::to_string_pretty(&decoded.snapshot)?);
            println!("schema: {}", decoded.schema);
            if decoded.is_complete() {
                println!("complete: yes");
            } else {
                println!("complete: no (missing {})", decoded.missing.join(", "));
            }
            println!("summary: {}", Summary::of(EntityId::new(), &decoded.snapshot));
        }
        Commands::Demo { topology } => demo(config, topology)?,
    }

    Ok(())
}

fn demo(config: VesselConfig, topology: TopologyArg) -> anyhow::Result<()> {
    let world = Arc::new(HostWorld::new());
    let ground = BlockPos::new("world", 6, 63, 0);
    world.set_block(ground.clone(), BlockKind::Stone)?;

    let actor = world.add_actor("demo", Location::new("world", 0.5, 64.0, 0.5));
    world.with_actor_mut(actor, |a| {
        a.set_operator(true);
        a.inventory.set_held_item(Some(ItemStack::new(BUCKET, 1)));
    })?;
    let merchant = world.spawn_merchant(
        Location::new("world", 2.5, 64.0, 0.5),
        SpawnReason::Natural,
    )?;
    world.with_merchant_mut(merchant, |m| {
        m.set_profession(Profession::Librarian);
        m.set_level(2)?;
        m.set_experience(40)?;
        m.set_custom_name(Some("Ada".to_string()));
        m.set_recipes(vec![
            MerchantRecipe::new(
                vec![ItemStack::new("paper", 24)],
                ItemStack::new("emerald", 1),
                16,
            ),
            MerchantRecipe::new(
                vec![ItemStack::new("emerald", 9), ItemStack::new("book", 1)],
                ItemStack::new("bookshelf", 1),
                12,
            ),
        ])
    })??;

    let scheduler: Arc<dyn AffinityScheduler> = match topology {
        TopologyArg::Single => Arc::new(SingleOwnerScheduler::start(world.clone(), 2)?),
        TopologyArg::Regions => Arc::new(RegionScheduler::start(
            world.clone(),
            RegionConfig::default(),
        )?),
    };
    let owner = Arc::clone(&scheduler);
    world.install_affinity_check(move |l: &Location| owner.owns_location(l));
    for event in world.drain_events() {
        tracing::debug!(?event, "setup event");
    }

    let coordinator = Coordinator::start(world.clone(), scheduler.clone(), config)?;
    let result = run_demo(&world, &scheduler, &coordinator, actor, merchant, ground);
    println!("status: {}", coordinator.status());

    world.clear_affinity_check();
    coordinator.shutdown();
    result
}

fn run_demo(
    world: &Arc<HostWorld>,
    scheduler: &Arc<dyn AffinityScheduler>,
    coordinator: &Arc<Coordinator>,
    actor: EntityId,
    merchant: EntityId,
    ground: BlockPos,
) -> anyhow::Result<()> {
    let outcome = coordinator.capture_blocking(actor, merchant);
    println!("capture: {outcome}");
    if !outcome.is_committed() {
        return Ok(());
    }

    let w = Arc::clone(world);
    let held = run_sync_at_entity(&**scheduler, actor, WAIT, move || {
        w.with_actor(actor, |a| a.inventory.held_item().cloned())
    })??
    .context("actor is not holding the filled container")?;
    for line in &held.meta.lore {
        println!("  {line}");
    }

    let spawn = ground.relative(BlockFace::Up).center();
    let outcome = coordinator.release_blocking(actor, held, spawn);
    println!("release: {outcome}");
    if let Outcome::Committed(summary) = &outcome {
        let w = Arc::clone(world);
        let id = summary.entity;
        let name = run_sync_at_entity(&**scheduler, id, WAIT, move || {
            w.with_merchant(id, |m| m.custom_name().map(str::to_string))
        })??;
        println!("restored {id} named {}", name.as_deref().unwrap_or("-"));
    }

    let w = Arc::clone(world);
    let messages = run_sync_at_entity(&**scheduler, actor, WAIT, move || {
        w.with_actor_mut(actor, |a| a.take_messages())
    })??;
    for message in messages {
        println!("> {message}");
    }
    Ok(())
}
