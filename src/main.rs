use std::path::Path;

use anyhow::Context;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use stride::config;
use stride::morphology::MorphologyParams;
use stride::population::Population;
use stride::sandbox::Sandbox;
use stride::save_load;

const CHECKPOINT_PATH: &str = "stride_checkpoint.bin";
const BEST_BRAIN_PATH: &str = "stride_best.json";
const MORPHOLOGY_PATH: &str = "stride_morphology.json";

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    if let Err(err) = run() {
        error!("{err:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let mut world = Sandbox::new(config::ARENA_WIDTH, config::GROUND_Y);
    let mut pop = initial_population()?;
    pop.attach_all(&mut world)?;

    while pop.generation() <= config::DRIVER_GENERATIONS {
        pop.run_episode(&mut world, config::EPISODE_TICKS)?;

        let best = pop.best();
        if pop.stats.all_time_best.map_or(true, |b| best.score > b) {
            match save_load::save_controller(best.brain(), BEST_BRAIN_PATH) {
                Ok(()) => info!(score = best.score, "saved best controller to {BEST_BRAIN_PATH}"),
                Err(e) => error!("saving best controller failed: {e}"),
            }
        }

        let summary = pop.evolve(&mut world)?;

        if summary.generation % config::AUTOSAVE_INTERVAL_GENERATIONS == 0 {
            match save_load::save_to_file(&pop, CHECKPOINT_PATH) {
                Ok(()) => info!(generation = pop.generation(), "autosaved to {CHECKPOINT_PATH}"),
                Err(e) => error!("autosave failed: {e}"),
            }
        }
    }

    info!(
        best = ?pop.stats.all_time_best,
        generation = pop.stats.all_time_best_generation,
        "run finished"
    );
    Ok(())
}

fn initial_population() -> anyhow::Result<Population> {
    if Path::new(CHECKPOINT_PATH).exists() {
        let pop = save_load::load_from_file(CHECKPOINT_PATH)
            .with_context(|| format!("loading {CHECKPOINT_PATH}"))?;
        info!(generation = pop.generation(), "resumed from {CHECKPOINT_PATH}");
        return Ok(pop);
    }

    let params = if Path::new(MORPHOLOGY_PATH).exists() {
        let json = std::fs::read_to_string(MORPHOLOGY_PATH)?;
        serde_json::from_str::<MorphologyParams>(&json)
            .with_context(|| format!("parsing {MORPHOLOGY_PATH}"))?
    } else {
        MorphologyParams::default()
    };
    let morphology = params.resolve(config::ARENA_WIDTH, config::ARENA_HEIGHT)?;
    Ok(Population::new(
        config::POPULATION_SIZE,
        morphology,
        config::DRIVER_SEED,
    )?)
}
