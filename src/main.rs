mod cli;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use clap::Parser;
use log::{info, warn};
use rand::Rng;

use circle_collision::{
    backend::{BackendKind, ScalarBackend, SimdBackend, SimulationStep},
    stats::SimulationStats,
    HeadlessBridge, ParticleStore, Simulation,
};

fn main() -> anyhow::Result<()> {
    env_logger::builder()
        .filter_level(log::LevelFilter::Info)
        .parse_default_env()
        .init();

    // Collect Arguments
    let args = cli::Args::parse();

    let seed = args.seed.unwrap_or_else(|| rand::thread_rng().gen());
    let config = args.config(seed);
    info!("Seed {seed}");
    info!("{config:?}");

    let store = ParticleStore::spawn(&config)?;
    let tokio_rt = tokio::runtime::Runtime::new()?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = stop.clone();
        tokio_rt.spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Interrupted, stopping after the current tick");
                stop.store(true, Ordering::Relaxed);
            }
        });
    }

    let mut bridge = HeadlessBridge::new(config.bounds, stop).with_report_every(args.report_every);
    if let Some(dt) = args.time_step {
        bridge = bridge.with_time_step(dt)?;
    }
    if let Some(framerate) = args.framerate {
        bridge = bridge.with_framerate(framerate);
    }
    if let Some(attractor) = args.attractor() {
        if !args.backend.applies_interaction() {
            warn!("Only the gpu backend applies the attractor");
        }
        bridge = bridge.with_attractor(attractor);
    }

    match args.backend {
        BackendKind::Scalar => run(
            ScalarBackend::new(&config, args.threads)?,
            store,
            &mut bridge,
            args.ticks,
        ),
        BackendKind::Simd => run(SimdBackend::new(&config)?, store, &mut bridge, args.ticks),
        #[cfg(feature = "gpu")]
        BackendKind::Gpu => {
            let backend =
                tokio_rt.block_on(circle_collision::backend::GpuBackend::new(&config, &store))?;
            run(backend, store, &mut bridge, args.ticks)
        }
    }

    Ok(())
}

fn run<B: SimulationStep>(
    backend: B,
    store: ParticleStore,
    bridge: &mut HeadlessBridge,
    max_ticks: Option<u64>,
) {
    let mut sim = Simulation::new(store, backend);
    let started = std::time::Instant::now();
    let ticks = sim.run(bridge, max_ticks);
    let elapsed = started.elapsed().as_secs_f32();

    info!(
        "Ran {ticks} ticks in {elapsed:.2}s ({:.1} ticks/s)",
        ticks as f32 / elapsed.max(f32::EPSILON)
    );
    info!("Final state: {}", SimulationStats::gather(sim.store()));
}
