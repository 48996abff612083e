use bytemuck::{Pod, Zeroable};
use std::ops::Range;

use crate::config::AnimationConfig;

/// Per-item animated channels as laid out in the target and current storage buffers.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AnimatedStateGpu {
    /// Linear RGB emissive tint; `w` is unused.
    pub emissive: [f32; 4],
    pub hover_z: f32,
    pub unavailable: f32,
    pub _pad: [f32; 2],
}

impl AnimatedStateGpu {
    pub fn new(hover_z: f32, emissive: [f32; 3], unavailable: f32) -> Self {
        Self { emissive: [emissive[0], emissive[1], emissive[2], 0.0], hover_z, unavailable, _pad: [0.0; 2] }
    }
}

/// Uniform block for the approach kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct AnimationParamsGpu {
    pub dt: f32,
    pub hover_speed: f32,
    pub tint_speed: f32,
    pub count: u32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnimationSpeeds {
    pub hover: f32,
    pub tint: f32,
}

impl From<&AnimationConfig> for AnimationSpeeds {
    fn from(config: &AnimationConfig) -> Self {
        Self { hover: config.hover_speed.max(0.0), tint: config.tint_speed.max(0.0) }
    }
}

/// `current = mix(current, target, min(1, dt * speed))` with independent hover and tint speeds.
/// Mirrors `cs_main` in `animated_state.wgsl`.
pub fn approach(current: &AnimatedStateGpu, target: &AnimatedStateGpu, dt: f32, speeds: AnimationSpeeds) -> AnimatedStateGpu {
    let hover_k = (dt * speeds.hover).clamp(0.0, 1.0);
    let tint_k = (dt * speeds.tint).clamp(0.0, 1.0);
    let mix = |a: f32, b: f32, k: f32| a + (b - a) * k;
    let mut next = *current;
    next.hover_z = mix(current.hover_z, target.hover_z, hover_k);
    for channel in 0..4 {
        next.emissive[channel] = mix(current.emissive[channel], target.emissive[channel], tint_k);
    }
    next.unavailable = mix(current.unavailable, target.unavailable, tint_k);
    next
}

pub struct PerInstanceAnimatedState {
    targets: Vec<AnimatedStateGpu>,
    current: Vec<AnimatedStateGpu>,
    dirty_targets: Option<Range<usize>>,
    speeds: AnimationSpeeds,
    settle_seconds: f32,
    since_change: f32,
}

impl PerInstanceAnimatedState {
    pub fn new(count: usize, speeds: AnimationSpeeds, settle_seconds: f32) -> Self {
        Self {
            targets: vec![AnimatedStateGpu::default(); count],
            current: vec![AnimatedStateGpu::default(); count],
            dirty_targets: None,
            speeds,
            settle_seconds: settle_seconds.max(0.0),
            since_change: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn speeds(&self) -> AnimationSpeeds {
        self.speeds
    }

    pub fn target(&self, index: usize) -> Option<&AnimatedStateGpu> {
        self.targets.get(index)
    }

    /// CPU view of the current values. Only advanced by `step_cpu`; with a GPU attached
    /// the authoritative copy lives in the current buffer.
    pub fn current(&self, index: usize) -> Option<&AnimatedStateGpu> {
        self.current.get(index)
    }

    pub fn targets(&self) -> &[AnimatedStateGpu] {
        &self.targets
    }

    pub fn currents(&self) -> &[AnimatedStateGpu] {
        &self.current
    }

    /// Records a new target. Returns false (and marks nothing dirty) when unchanged.
    pub fn set_target(&mut self, index: usize, target: AnimatedStateGpu) -> bool {
        let Some(slot) = self.targets.get_mut(index) else {
            return false;
        };
        if *slot == target {
            return false;
        }
        *slot = target;
        self.dirty_targets = Some(match self.dirty_targets.take() {
            Some(range) => range.start.min(index)..range.end.max(index + 1),
            None => index..index + 1,
        });
        self.since_change = 0.0;
        true
    }

    /// Jumps current values to their targets, used once at build time.
    pub fn snap_to_targets(&mut self) {
        self.current.copy_from_slice(&self.targets);
    }

    /// Writes the changed target range into `buffer`. Returns whether a write happened.
    pub fn write_dirty_targets(&mut self, queue: &wgpu::Queue, buffer: &wgpu::Buffer) -> bool {
        let Some(range) = self.dirty_targets.take() else {
            return false;
        };
        let offset = (range.start * std::mem::size_of::<AnimatedStateGpu>()) as wgpu::BufferAddress;
        queue.write_buffer(buffer, offset, bytemuck::cast_slice(&self.targets[range]));
        true
    }

    /// Drops the dirty marker without a GPU write (headless frames).
    pub fn clear_dirty_targets(&mut self) {
        self.dirty_targets = None;
    }

    /// Advances the settle clock. Returns whether the kernel still has work this frame.
    pub fn tick(&mut self, dt: f32) -> bool {
        let active = self.needs_dispatch();
        self.since_change += dt.max(0.0);
        active
    }

    /// False once no target changed for `settle_seconds`; current values have converged.
    pub fn needs_dispatch(&self) -> bool {
        !self.targets.is_empty() && self.since_change < self.settle_seconds
    }

    pub fn params(&self, dt: f32) -> AnimationParamsGpu {
        AnimationParamsGpu {
            dt: dt.max(0.0),
            hover_speed: self.speeds.hover,
            tint_speed: self.speeds.tint,
            count: self.targets.len() as u32,
        }
    }

    /// Runs the approach kernel over every instance on the CPU.
    pub fn step_cpu(&mut self, dt: f32) {
        let speeds = self.speeds;
        for (current, target) in self.current.iter_mut().zip(self.targets.iter()) {
            *current = approach(current, target, dt, speeds);
        }
    }
}
