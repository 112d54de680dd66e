use glam::Vec2;

use crate::error::{Result, SimError};

/// Reflecting walls of the simulation, the origin is always `(0, 0)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub right: f32,
    pub bottom: f32,
}

impl Bounds {
    pub fn new(right: f32, bottom: f32) -> Self {
        Self { right, bottom }
    }

    pub fn size(&self) -> Vec2 {
        Vec2::new(self.right, self.bottom)
    }

    pub fn validate(&self) -> Result<()> {
        let ok = |v: f32| v.is_finite() && v > 0.0;
        if ok(self.right) && ok(self.bottom) {
            Ok(())
        } else {
            Err(SimError::DegenerateBounds {
                right: self.right,
                bottom: self.bottom,
            })
        }
    }

    /// Whether a circle lies fully inside, with some slack for rounding.
    pub fn contains_circle(&self, position: Vec2, radius: f32, tolerance: f32) -> bool {
        position.x - radius >= -tolerance
            && position.y - radius >= -tolerance
            && position.x + radius <= self.right + tolerance
            && position.y + radius <= self.bottom + tolerance
    }
}

/// Startup configuration, fixed for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub particles: usize,
    pub bounds: Bounds,
    pub min_radius: f32,
    pub max_radius: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    /// Velocity kept after hitting a wall, `1.0` is perfectly elastic
    pub restitution: f32,
    /// Placement tries per particle before spawning gives up
    pub spawn_attempts: u32,
    pub seed: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            particles: 1000,
            bounds: Bounds::new(800.0, 600.0),
            min_radius: 2.0,
            max_radius: 4.0,
            min_speed: 0.0,
            max_speed: 60.0,
            restitution: 1.0,
            spawn_attempts: 1000,
            seed: 0,
        }
    }
}

impl SimulationConfig {
    pub fn validate(&self) -> Result<()> {
        if self.particles == 0 {
            return Err(SimError::ZeroParticles);
        }

        self.bounds.validate()?;

        if !(self.min_radius.is_finite() && self.max_radius.is_finite())
            || self.min_radius <= 0.0
            || self.min_radius > self.max_radius
        {
            return Err(SimError::InvalidRadius {
                min: self.min_radius,
                max: self.max_radius,
            });
        }

        let diameter = self.max_radius * 2.0;
        if diameter > self.bounds.right || diameter > self.bounds.bottom {
            return Err(SimError::RadiusExceedsBounds {
                radius: self.max_radius,
                right: self.bounds.right,
                bottom: self.bounds.bottom,
            });
        }

        if !(self.min_speed.is_finite() && self.max_speed.is_finite())
            || self.min_speed < 0.0
            || self.min_speed > self.max_speed
        {
            return Err(SimError::InvalidSpeed {
                min: self.min_speed,
                max: self.max_speed,
            });
        }

        if !(0.0..=1.0).contains(&self.restitution) {
            return Err(SimError::InvalidRestitution(self.restitution));
        }

        if self.spawn_attempts == 0 {
            return Err(SimError::ZeroSpawnAttempts);
        }

        Ok(())
    }

    /// Edge length of a broad-phase cell, every overlapping pair ends up in
    /// neighbouring cells.
    pub fn cell_size(&self) -> f32 {
        self.max_radius * 2.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        SimulationConfig::default().validate().unwrap();
    }

    #[test]
    fn rejects_zero_particles() {
        let config = SimulationConfig {
            particles: 0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(SimError::ZeroParticles)));
    }

    #[test]
    fn rejects_degenerate_bounds() {
        for bounds in [
            Bounds::new(0.0, 600.0),
            Bounds::new(800.0, -1.0),
            Bounds::new(f32::NAN, 600.0),
            Bounds::new(800.0, f32::INFINITY),
        ] {
            let config = SimulationConfig {
                bounds,
                ..Default::default()
            };
            assert!(
                matches!(config.validate(), Err(SimError::DegenerateBounds { .. })),
                "{bounds:?} accepted"
            );
        }
    }

    #[test]
    fn rejects_bad_radii() {
        let inverted = SimulationConfig {
            min_radius: 5.0,
            max_radius: 1.0,
            ..Default::default()
        };
        assert!(matches!(
            inverted.validate(),
            Err(SimError::InvalidRadius { .. })
        ));

        let zero = SimulationConfig {
            min_radius: 0.0,
            ..Default::default()
        };
        assert!(matches!(zero.validate(), Err(SimError::InvalidRadius { .. })));

        let huge = SimulationConfig {
            min_radius: 100.0,
            max_radius: 350.0,
            ..Default::default()
        };
        assert!(matches!(
            huge.validate(),
            Err(SimError::RadiusExceedsBounds { .. })
        ));
    }

    #[test]
    fn rejects_bad_speed_and_restitution() {
        let speed = SimulationConfig {
            min_speed: 10.0,
            max_speed: 1.0,
            ..Default::default()
        };
        assert!(matches!(speed.validate(), Err(SimError::InvalidSpeed { .. })));

        let restitution = SimulationConfig {
            restitution: 1.5,
            ..Default::default()
        };
        assert!(matches!(
            restitution.validate(),
            Err(SimError::InvalidRestitution(_))
        ));
    }

    #[test]
    fn circle_containment() {
        let bounds = Bounds::new(10.0, 10.0);
        assert!(bounds.contains_circle(Vec2::new(1.0, 9.0), 1.0, 0.0));
        assert!(!bounds.contains_circle(Vec2::new(0.5, 5.0), 1.0, 0.0));
        assert!(!bounds.contains_circle(Vec2::new(5.0, 9.5), 1.0, 0.0));
    }
}
