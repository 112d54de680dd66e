use std::fmt;

use glam::Vec2;

use crate::{kernel::mass, particle::ParticleStore};

/// Aggregate view of the particles, reported by the frame bridge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulationStats {
    pub center_of_mass: Vec2,
    pub avg_velocity: Vec2,
    pub min_position: Vec2,
    pub max_position: Vec2,
    pub max_speed: f32,
    /// Accumulated in f64, the sum over large stores loses too much in f32
    pub kinetic_energy: f64,
}

impl SimulationStats {
    pub fn gather(store: &ParticleStore) -> Self {
        let mut total_mass = 0.0f64;
        let mut weighted = [0.0f64; 2];
        let mut velocity_sum = [0.0f64; 2];
        let mut min_position = Vec2::splat(f32::INFINITY);
        let mut max_position = Vec2::splat(f32::NEG_INFINITY);
        let mut max_speed = 0.0f32;
        let mut kinetic_energy = 0.0f64;

        let particles = store
            .positions()
            .iter()
            .zip(store.velocities())
            .zip(store.radii());

        for ((&position, &velocity), &radius) in particles {
            let m = mass(radius) as f64;
            total_mass += m;
            weighted[0] += position.x as f64 * m;
            weighted[1] += position.y as f64 * m;
            velocity_sum[0] += velocity.x as f64;
            velocity_sum[1] += velocity.y as f64;

            min_position = min_position.min(position);
            max_position = max_position.max(position);
            max_speed = max_speed.max(velocity.length());
            kinetic_energy += 0.5 * m * velocity.length_squared() as f64;
        }

        if store.is_empty() {
            return Self {
                center_of_mass: Vec2::ZERO,
                avg_velocity: Vec2::ZERO,
                min_position: Vec2::ZERO,
                max_position: Vec2::ZERO,
                max_speed: 0.0,
                kinetic_energy: 0.0,
            };
        }

        let n = store.len() as f64;
        Self {
            center_of_mass: Vec2::new(
                (weighted[0] / total_mass) as f32,
                (weighted[1] / total_mass) as f32,
            ),
            avg_velocity: Vec2::new((velocity_sum[0] / n) as f32, (velocity_sum[1] / n) as f32),
            min_position,
            max_position,
            max_speed,
            kinetic_energy,
        }
    }
}

impl fmt::Display for SimulationStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "com ({:.1}, {:.1}) avg velocity ({:.2}, {:.2}) max speed {:.2} energy {:.1}",
            self.center_of_mass.x,
            self.center_of_mass.y,
            self.avg_velocity.x,
            self.avg_velocity.y,
            self.max_speed,
            self.kinetic_energy,
        )
    }
}
