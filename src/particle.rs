use std::collections::HashMap;

use glam::{IVec2, Vec2, Vec3};
use log::debug;
use rand::{rngs::StdRng, Rng, SeedableRng};

use crate::{
    config::SimulationConfig,
    error::{Result, SimError},
};

/// A single circle, only used to build or inspect a [`ParticleStore`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Particle {
    pub position: Vec2,
    pub velocity: Vec2,
    pub color: Vec3,
    pub radius: f32,
}

/// Structure-of-arrays state for every particle.
///
/// A particle is identified by its index, all four arrays always have the same
/// length and that length never changes after construction.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParticleStore {
    positions: Vec<Vec2>,
    velocities: Vec<Vec2>,
    colors: Vec<Vec3>,
    radii: Vec<f32>,
}

impl ParticleStore {
    pub fn from_particles(particles: impl IntoIterator<Item = Particle>) -> Self {
        let mut store = Self::default();
        for particle in particles {
            store.push(particle);
        }
        store
    }

    /// Places `config.particles` non-overlapping circles uniformly inside the
    /// bounds.
    pub fn spawn(config: &SimulationConfig) -> Result<Self> {
        config.validate()?;

        let mut rng = StdRng::seed_from_u64(config.seed);
        let mut store = Self::with_capacity(config.particles);

        // Buckets are only used during placement, the simulation grid is
        // rebuilt from scratch every tick.
        let cell_size = config.cell_size();
        let mut buckets: HashMap<IVec2, Vec<usize>> = HashMap::new();
        let bounds = config.bounds;

        for _ in 0..config.particles {
            let mut placed = false;

            for _ in 0..config.spawn_attempts {
                let radius = rng.gen_range(config.min_radius..=config.max_radius);
                let position = Vec2::new(
                    rng.gen_range(radius..=bounds.right - radius),
                    rng.gen_range(radius..=bounds.bottom - radius),
                );

                let cell = (position / cell_size).floor().as_ivec2();
                if store.overlaps_any(&buckets, cell, position, radius) {
                    continue;
                }

                let speed = rng.gen_range(config.min_speed..=config.max_speed);
                let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                let color = Vec3::new(
                    rng.gen_range(0.2..=1.0),
                    rng.gen_range(0.2..=1.0),
                    rng.gen_range(0.2..=1.0),
                );

                buckets.entry(cell).or_default().push(store.len());
                store.push(Particle {
                    position,
                    velocity: Vec2::from_angle(angle) * speed,
                    color,
                    radius,
                });
                placed = true;
                break;
            }

            if !placed {
                return Err(SimError::SpawnFailed {
                    placed: store.len(),
                    requested: config.particles,
                });
            }
        }

        debug!(
            "Spawned {} particles with seed {}",
            store.len(),
            config.seed
        );
        Ok(store)
    }

    fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
            colors: Vec::with_capacity(capacity),
            radii: Vec::with_capacity(capacity),
        }
    }

    fn push(&mut self, particle: Particle) {
        self.positions.push(particle.position);
        self.velocities.push(particle.velocity);
        self.colors.push(particle.color);
        self.radii.push(particle.radius);
    }

    fn overlaps_any(
        &self,
        buckets: &HashMap<IVec2, Vec<usize>>,
        cell: IVec2,
        position: Vec2,
        radius: f32,
    ) -> bool {
        for dy in -1..=1 {
            for dx in -1..=1 {
                let Some(bucket) = buckets.get(&(cell + IVec2::new(dx, dy))) else {
                    continue;
                };

                for &other in bucket {
                    let reach = radius + self.radii[other];
                    if position.distance_squared(self.positions[other]) < reach * reach {
                        return true;
                    }
                }
            }
        }

        false
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<Particle> {
        Some(Particle {
            position: *self.positions.get(index)?,
            velocity: self.velocities[index],
            color: self.colors[index],
            radius: self.radii[index],
        })
    }

    pub fn positions(&self) -> &[Vec2] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vec2] {
        &self.velocities
    }

    pub fn colors(&self) -> &[Vec3] {
        &self.colors
    }

    pub fn radii(&self) -> &[f32] {
        &self.radii
    }

    pub fn max_radius(&self) -> f32 {
        self.radii.iter().copied().fold(0.0, f32::max)
    }

    /// Mutable motion state, used by backends that write results back in place.
    pub(crate) fn motion_mut(&mut self) -> (&mut [Vec2], &mut [Vec2]) {
        (&mut self.positions, &mut self.velocities)
    }

    /// Swaps in a freshly computed motion state, handing the old one back as
    /// scratch space for the next tick.
    pub(crate) fn swap_motion(&mut self, positions: &mut Vec<Vec2>, velocities: &mut Vec<Vec2>) {
        debug_assert_eq!(positions.len(), self.len());
        debug_assert_eq!(velocities.len(), self.len());

        std::mem::swap(&mut self.positions, positions);
        std::mem::swap(&mut self.velocities, velocities);
    }
}
