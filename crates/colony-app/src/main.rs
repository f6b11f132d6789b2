use anyhow::Result;
use colony_core::{ColonyConfig, Pheromone, World};
use tracing::{info, warn};

mod worldgen;

const ROWS: usize = 10;
const COLUMNS: usize = 10;
const TICKS: u64 = 2_000;

fn main() -> Result<()> {
    init_tracing();
    let mut world = bootstrap_world()?;
    info!(
        ants = world.ant_count(),
        rows = world.grid().rows(),
        columns = world.grid().columns(),
        "starting colony simulation"
    );

    for _ in 0..TICKS {
        let events = world.step();
        if events.births > 0 || events.hatched > 0 || events.deaths > 0 {
            info!(
                tick = events.tick.0,
                births = events.births,
                hatched = events.hatched,
                deaths = events.deaths,
                "colony changed"
            );
        }
    }

    if let Some(summary) = world.history().last() {
        info!(
            tick = summary.tick.0,
            ants = summary.ant_count,
            eggs = summary.eggs,
            carrying = summary.carrying,
            "simulation complete"
        );
    } else {
        warn!("simulation produced no summaries");
    }
    Ok(())
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn bootstrap_world() -> Result<World> {
    let config = ColonyConfig {
        rng_seed: Some(0xC010_4A17_u64),
        ..ColonyConfig::default()
    };
    let blocks = worldgen::split_in_half(ROWS, COLUMNS, config.food_full);
    let cell_height = config.world_height / ROWS as f32;
    let mut placements = worldgen::starting_diggers(4, cell_height);
    // one forager so the surface cache gets hauled underground once trails
    // are painted
    if let Some(last) = placements.last_mut() {
        last.following = Pheromone::MoveFood;
    }
    let world = World::from_terrain(config, blocks, &placements)?;
    Ok(world)
}
