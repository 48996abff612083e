use std::time::{Duration, Instant};

/// Longest step handed to the simulation; hitches beyond this are absorbed.
pub const MAX_FRAME_DELTA: f32 = 0.1;

pub struct FrameClock {
    last: Instant,
    delta: Duration,
    frame_index: u64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self { last: Instant::now(), delta: Duration::ZERO, frame_index: 0 }
    }

    pub fn tick(&mut self) -> f32 {
        let now = Instant::now();
        self.delta = now - self.last;
        self.last = now;
        self.frame_index += 1;
        self.delta_seconds()
    }

    /// Frame delta clamped to `MAX_FRAME_DELTA`.
    pub fn delta_seconds(&self) -> f32 {
        self.delta.as_secs_f32().min(MAX_FRAME_DELTA)
    }

    pub fn raw_delta(&self) -> Duration {
        self.delta
    }

    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }
}

impl Default for FrameClock {
    fn default() -> Self {
        Self::new()
    }
}
