//! The seam between the simulation and whatever drives and shows it.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use glam::Vec2;
use log::{info, trace};

use crate::{
    config::Bounds,
    error::{Result, SimError},
    framepace::Framepacer,
    kernel::{Interaction, TickInput},
    particle::ParticleStore,
    stats::SimulationStats,
};

/// Longest step a measured frame time may produce.
pub const MAX_TIME_STEP: f32 = 1.0 / 30.0;

/// Supplies the per-tick input and receives each finished tick.
pub trait FrameBridge {
    /// `None` once the frame source has closed.
    fn next_tick(&mut self) -> Option<TickInput>;

    fn present(&mut self, tick: u64, store: &ParticleStore);
}

/// Runs without a window: fixed bounds, a stop flag instead of a close button
/// and periodic statistics in the log instead of pixels.
pub struct HeadlessBridge {
    bounds: Bounds,
    time_step: Option<f32>,
    attractor: Option<Vec2>,
    frametime_limit: f32,
    report_every: u64,
    stop: Arc<AtomicBool>,

    pacer: Framepacer,
    started: bool,
}

impl HeadlessBridge {
    pub fn new(bounds: Bounds, stop: Arc<AtomicBool>) -> Self {
        Self {
            bounds,
            time_step: None,
            attractor: None,
            frametime_limit: 0.0,
            report_every: 0,
            stop,

            pacer: Framepacer::new(),
            started: false,
        }
    }

    /// Use `dt` for every tick instead of the measured frame time.
    pub fn with_time_step(mut self, dt: f32) -> Result<Self> {
        if !(dt.is_finite() && dt > 0.0) {
            return Err(SimError::InvalidTimeStep(dt));
        }

        self.time_step = Some(dt);
        Ok(self)
    }

    /// Hold the pointer down at `position` for the whole run.
    pub fn with_attractor(mut self, position: Vec2) -> Self {
        self.attractor = Some(position);
        self
    }

    pub fn with_framerate(mut self, framerate: u32) -> Self {
        self.frametime_limit = if framerate == 0 {
            0.0
        } else {
            1.0 / framerate as f32
        };
        self
    }

    /// Log statistics every `ticks` ticks, zero disables reporting.
    pub fn with_report_every(mut self, ticks: u64) -> Self {
        self.report_every = ticks;
        self
    }

    fn time_step(&self) -> f32 {
        self.time_step
            .unwrap_or_else(|| self.pacer.last_frametime().min(MAX_TIME_STEP))
    }
}

impl FrameBridge for HeadlessBridge {
    fn next_tick(&mut self) -> Option<TickInput> {
        if self.stop.load(Ordering::Relaxed) {
            return None;
        }

        if self.started {
            self.pacer.end_frame(self.frametime_limit);
        }
        self.pacer.begin_frame();
        self.started = true;

        let mut input = TickInput::new(self.time_step(), self.bounds);
        input.interaction = self.attractor.map(|position| Interaction {
            position,
            active: true,
        });

        Some(input)
    }

    fn present(&mut self, tick: u64, store: &ParticleStore) {
        trace!("Tick {tick} took {:.3}ms", self.pacer.frametime() * 1000.0);

        if self.report_every != 0 && tick % self.report_every == 0 {
            info!("Tick {tick}: {}", SimulationStats::gather(store));
        }
    }
}
