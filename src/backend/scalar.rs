use glam::Vec2;
use log::info;
use rayon::prelude::*;

use super::SimulationStep;
use crate::{
    config::SimulationConfig,
    error::Result,
    grid::SpatialGrid,
    kernel::{self, Snapshot, TickInput},
    particle::ParticleStore,
};

/// Fork-join over a fixed pool of workers.
///
/// Each phase splits the particle range into one contiguous slice per worker.
/// A worker only writes its own slice and only reads the grid and the
/// snapshot, so returning from `install` is the only barrier needed.
pub struct ScalarBackend {
    pool: rayon::ThreadPool,
    grid: SpatialGrid,
    restitution: f32,

    contacts: Vec<u32>,
    next_positions: Vec<Vec2>,
    next_velocities: Vec<Vec2>,
}

impl ScalarBackend {
    /// `threads == 0` lets rayon pick one worker per core.
    pub fn new(config: &SimulationConfig, threads: usize) -> Result<Self> {
        config.validate()?;

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|i| format!("collision-{i}"))
            .build()?;

        info!(
            "Scalar backend running on {} workers",
            pool.current_num_threads()
        );

        Ok(Self {
            pool,
            grid: SpatialGrid::new(config.cell_size(), config.bounds),
            restitution: config.restitution,

            contacts: Vec::with_capacity(config.particles),
            next_positions: Vec::with_capacity(config.particles),
            next_velocities: Vec::with_capacity(config.particles),
        })
    }

    pub fn workers(&self) -> usize {
        self.pool.current_num_threads()
    }
}

impl SimulationStep for ScalarBackend {
    const NAME: &'static str = "scalar";

    fn step(&mut self, store: &mut ParticleStore, input: &TickInput) {
        let Self {
            pool,
            grid,
            restitution,
            contacts,
            next_positions,
            next_velocities,
        } = self;

        let n = store.len();
        let slice_len = n.div_ceil(pool.current_num_threads()).max(1);

        grid.fit_radius(store.max_radius(), input.bounds);
        grid.rebuild(store.positions(), input.bounds);
        let grid = &*grid;
        let snapshot = Snapshot::of(store);

        contacts.resize(n, 0);
        pool.install(|| {
            contacts
                .par_chunks_mut(slice_len)
                .enumerate()
                .for_each(|(slice, counts)| {
                    let start = slice * slice_len;
                    for (offset, count) in counts.iter_mut().enumerate() {
                        let i = start + offset;
                        let neighbors = grid.neighborhood(snapshot.positions[i]);
                        *count = kernel::count_contacts(i, &snapshot, neighbors);
                    }
                });
        });

        next_positions.resize(n, Vec2::ZERO);
        next_velocities.resize(n, Vec2::ZERO);
        let contacts = &*contacts;
        let restitution = *restitution;
        pool.install(|| {
            next_positions
                .par_chunks_mut(slice_len)
                .zip(next_velocities.par_chunks_mut(slice_len))
                .enumerate()
                .for_each(|(slice, (positions, velocities))| {
                    let start = slice * slice_len;
                    for (offset, (position, velocity)) in
                        positions.iter_mut().zip(velocities.iter_mut()).enumerate()
                    {
                        let i = start + offset;
                        let neighbors = grid.neighborhood(snapshot.positions[i]);
                        (*position, *velocity) =
                            kernel::advance(i, &snapshot, contacts, neighbors, input, restitution);
                    }
                });
        });

        store.swap_motion(next_positions, next_velocities);
    }
}
