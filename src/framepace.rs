use std::time::{Duration, Instant};

/// Measures the time between ticks and optionally holds each one to a
/// target length.
pub struct Framepacer {
    instants: [Instant; 2],
    current: usize,
}

impl Framepacer {
    pub fn new() -> Self {
        Self {
            instants: [Instant::now(); 2],
            current: 0,
        }
    }

    /// Seconds since the current frame began.
    pub fn frametime(&self) -> f32 {
        self.instants[self.current].elapsed().as_secs_f32()
    }

    /// Seconds between the starts of the previous two frames.
    pub fn last_frametime(&self) -> f32 {
        self.instants[self.current]
            .saturating_duration_since(self.instants[self.next()])
            .as_secs_f32()
    }

    pub fn begin_frame(&mut self) {
        self.current = self.next();
        self.instants[self.current] = Instant::now();
    }

    /// Sleeps until `limit_frametime` seconds have passed since
    /// `begin_frame`. Zero or non-finite limits return immediately.
    pub fn end_frame(&self, limit_frametime: f32) {
        if limit_frametime > f32::EPSILON && limit_frametime.is_finite() {
            const ACCURACY: f32 = 0.0001; // 100 microseconds
            let sleep_time = limit_frametime - self.frametime() - ACCURACY;

            if sleep_time > 0.0 {
                std::thread::sleep(Duration::from_secs_f32(sleep_time));
            }

            while self.frametime() < limit_frametime {
                std::thread::yield_now();
            }
        }
    }

    fn next(&self) -> usize {
        (self.current + 1) % 2
    }
}

impl Default for Framepacer {
    fn default() -> Self {
        Self::new()
    }
}
