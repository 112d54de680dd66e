use clap::Parser;
use glam::Vec2;

use circle_collision::{
    backend::BackendKind,
    config::{Bounds, SimulationConfig},
};

/// A Circle Collision Particle Simulation
#[derive(Parser, Debug)]
#[command()]
pub struct Args {
    /// Total Particles
    #[arg(default_value_t = 1000)]
    pub particles: usize,

    /// Strategy used to advance the simulation
    #[arg(short, long, value_enum, default_value_t = BackendKind::Scalar)]
    pub backend: BackendKind,

    /// Width of the simulation area
    #[arg(long, default_value_t = 800.0)]
    pub width: f32,

    /// Height of the simulation area
    #[arg(long, default_value_t = 600.0)]
    pub height: f32,

    #[arg(long, default_value_t = 2.0)]
    pub min_radius: f32,

    #[arg(long, default_value_t = 4.0)]
    pub max_radius: f32,

    #[arg(long, default_value_t = 0.0)]
    pub min_speed: f32,

    #[arg(long, default_value_t = 60.0)]
    pub max_speed: f32,

    /// Velocity kept after hitting a wall
    #[arg(short, long, default_value_t = 1.0)]
    pub restitution: f32,

    /// Worker threads for the scalar backend, 0 uses one per core
    #[arg(short, long, default_value_t = 0)]
    pub threads: usize,

    /// Spawn seed, random if not given
    #[arg(short, long)]
    pub seed: Option<u64>,

    /// Stop after this many ticks
    ///
    /// if not given the simulation runs until interrupted
    #[arg(long)]
    pub ticks: Option<u64>,

    /// The framerate the simulation will run at
    ///
    /// if not given the simulation will run as fast as possible
    #[arg(short, long)]
    pub framerate: Option<u32>,

    /// Fixed time step in seconds instead of the measured frame time
    #[arg(long)]
    pub time_step: Option<f32>,

    /// Hold the pointer down at this point for the whole run (gpu only)
    #[arg(long, num_args = 2, value_names = ["X", "Y"])]
    pub attract: Option<Vec<f32>>,

    /// Log statistics every this many ticks, 0 disables them
    #[arg(long, default_value_t = 600)]
    pub report_every: u64,
}

impl Args {
    pub fn config(&self, seed: u64) -> SimulationConfig {
        SimulationConfig {
            particles: self.particles,
            bounds: Bounds::new(self.width, self.height),
            min_radius: self.min_radius,
            max_radius: self.max_radius,
            min_speed: self.min_speed,
            max_speed: self.max_speed,
            restitution: self.restitution,
            seed,
            ..Default::default()
        }
    }

    pub fn attractor(&self) -> Option<Vec2> {
        match self.attract.as_deref() {
            Some(&[x, y]) => Some(Vec2::new(x, y)),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_config_defaults() {
        let args = Args::try_parse_from(["circle_collision"]).unwrap();
        let config = args.config(0);
        let default = SimulationConfig::default();

        assert_eq!(args.backend, BackendKind::Scalar);
        assert_eq!(config.particles, default.particles);
        assert_eq!(config.bounds, default.bounds);
        assert_eq!(config.min_radius, default.min_radius);
        assert_eq!(config.max_radius, default.max_radius);
        assert_eq!(config.max_speed, default.max_speed);
        assert_eq!(config.restitution, default.restitution);
        assert_eq!(args.report_every, 600);
        assert!(args.attractor().is_none());
    }

    #[test]
    fn parses_run_options() {
        let args = Args::try_parse_from([
            "circle_collision",
            "250",
            "--backend",
            "simd",
            "--width",
            "320",
            "--attract",
            "10",
            "20",
            "--ticks",
            "50",
            "--seed",
            "9",
        ])
        .unwrap();

        assert_eq!(args.particles, 250);
        assert_eq!(args.backend, BackendKind::Simd);
        assert_eq!(args.width, 320.0);
        assert_eq!(args.attractor(), Some(Vec2::new(10.0, 20.0)));
        assert_eq!(args.ticks, Some(50));
        assert_eq!(args.seed, Some(9));
    }

    #[test]
    fn attract_needs_two_values() {
        assert!(Args::try_parse_from(["circle_collision", "--attract", "10"]).is_err());
    }
}
