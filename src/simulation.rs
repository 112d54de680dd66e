use log::{debug, info};

use crate::{
    backend::SimulationStep,
    bridge::FrameBridge,
    kernel::TickInput,
    particle::ParticleStore,
};

/// Owns the particles and the strategy that advances them.
pub struct Simulation<B> {
    store: ParticleStore,
    backend: B,
    tick: u64,
}

impl<B: SimulationStep> Simulation<B> {
    pub fn new(store: ParticleStore, backend: B) -> Self {
        info!(
            "Simulating {} particles with the {} backend",
            store.len(),
            B::NAME
        );

        Self {
            store,
            backend,
            tick: 0,
        }
    }

    /// Advances one tick and returns its number, starting at 1.
    pub fn tick(&mut self, input: &TickInput) -> u64 {
        self.backend.step(&mut self.store, input);
        self.tick += 1;
        self.tick
    }

    /// Ticks until the bridge closes or `max_ticks` more ticks have run.
    /// Returns the number of ticks run by this call.
    pub fn run<F: FrameBridge>(&mut self, bridge: &mut F, max_ticks: Option<u64>) -> u64 {
        let start = self.tick;

        while max_ticks.map_or(true, |max| self.tick - start < max) {
            let Some(input) = bridge.next_tick() else {
                debug!("Frame bridge closed after tick {}", self.tick);
                break;
            };

            let tick = self.tick(&input);
            bridge.present(tick, &self.store);
        }

        self.tick - start
    }

    pub fn store(&self) -> &ParticleStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn ticks(&self) -> u64 {
        self.tick
    }

    pub fn into_store(self) -> ParticleStore {
        self.store
    }
}

#[cfg(test)]
mod tests {
    use glam::{Vec2, Vec3};

    use super::*;
    use crate::{
        backend::ScalarBackend,
        config::{Bounds, SimulationConfig},
        particle::Particle,
    };

    /// Hands out a fixed number of ticks and records what it was shown.
    struct Scripted {
        remaining: usize,
        input: TickInput,
        presented: Vec<(u64, Vec2)>,
    }

    impl FrameBridge for Scripted {
        fn next_tick(&mut self) -> Option<TickInput> {
            self.remaining = self.remaining.checked_sub(1)?;
            Some(self.input)
        }

        fn present(&mut self, tick: u64, store: &ParticleStore) {
            self.presented.push((tick, store.positions()[0]));
        }
    }

    fn single() -> (Simulation<ScalarBackend>, Bounds) {
        let bounds = Bounds::new(100.0, 100.0);
        let config = SimulationConfig {
            particles: 1,
            bounds,
            ..Default::default()
        };
        let store = ParticleStore::from_particles([Particle {
            position: Vec2::new(50.0, 50.0),
            velocity: Vec2::new(1.0, 0.0),
            color: Vec3::ONE,
            radius: 2.0,
        }]);
        let backend = ScalarBackend::new(&config, 1).unwrap();
        (Simulation::new(store, backend), bounds)
    }

    #[test]
    fn runs_until_bridge_closes() {
        let (mut sim, bounds) = single();
        let mut bridge = Scripted {
            remaining: 3,
            input: TickInput::new(1.0, bounds),
            presented: Vec::new(),
        };

        assert_eq!(sim.run(&mut bridge, None), 3);
        assert_eq!(
            bridge.presented,
            vec![
                (1, Vec2::new(51.0, 50.0)),
                (2, Vec2::new(52.0, 50.0)),
                (3, Vec2::new(53.0, 50.0)),
            ]
        );
        assert_eq!(sim.ticks(), 3);
    }

    #[test]
    fn stops_at_tick_budget() {
        let (mut sim, bounds) = single();
        let mut bridge = Scripted {
            remaining: 100,
            input: TickInput::new(1.0, bounds),
            presented: Vec::new(),
        };

        assert_eq!(sim.run(&mut bridge, Some(4)), 4);
        assert_eq!(sim.run(&mut bridge, Some(2)), 2);
        assert_eq!(sim.ticks(), 6);
        assert_eq!(bridge.remaining, 94);
        assert_eq!(sim.store().positions()[0], Vec2::new(56.0, 50.0));
    }

    #[test]
    fn zero_budget_runs_nothing() {
        let (mut sim, bounds) = single();
        let mut bridge = Scripted {
            remaining: 10,
            input: TickInput::new(1.0, bounds),
            presented: Vec::new(),
        };

        assert_eq!(sim.run(&mut bridge, Some(0)), 0);
        assert!(bridge.presented.is_empty());
        assert_eq!(bridge.remaining, 10);
    }
}
