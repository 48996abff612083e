use glam::{Vec2, Vec3};

use crate::config::MovementConfig;

const MAX_SUBSTEPS: u32 = 256;
const FALLBACK_STEP: f32 = 0.05;
const ESCAPE_DIRECTIONS: u32 = 32;
const MAX_ESCAPE_RINGS: u32 = 1024;

/// Axis-aligned rectangle on the floor plane; `x` is world X and `y` is world Z.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleZone {
    pub min: Vec2,
    pub max: Vec2,
}

impl ObstacleZone {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    /// Strictly inside the zone grown by `margin` on every side.
    pub fn blocks(&self, point: Vec2, margin: f32) -> bool {
        point.x > self.min.x - margin
            && point.x < self.max.x + margin
            && point.y > self.min.y - margin
            && point.y < self.max.y + margin
    }
}

/// Walkable floor rectangle, same axes as `ObstacleZone`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoomBounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl RoomBounds {
    pub fn new(a: Vec2, b: Vec2) -> Self {
        Self { min: a.min(b), max: a.max(b) }
    }

    pub fn clamp(&self, point: Vec2, margin: f32) -> Vec2 {
        let clamp_axis = |value: f32, lo: f32, hi: f32| {
            if lo + margin <= hi - margin {
                value.clamp(lo + margin, hi - margin)
            } else {
                (lo + hi) * 0.5
            }
        };
        Vec2::new(clamp_axis(point.x, self.min.x, self.max.x), clamp_axis(point.y, self.min.y, self.max.y))
    }
}

/// Movement request for one frame, in the viewer's yaw frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MovementIntent {
    /// +1 forward, -1 backward.
    pub forward: f32,
    /// +1 right, -1 left.
    pub strafe: f32,
    pub sprint: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MoveOutcome {
    Free,
    Slid,
    Blocked,
}

pub struct CollisionAwareMovementController {
    position: Vec2,
    velocity: Vec2,
    eye_height: f32,
    room: RoomBounds,
    zones: Vec<ObstacleZone>,
    acceleration: f32,
    max_speed: f32,
    sprint_multiplier: f32,
    friction: f32,
    margin: f32,
}

impl CollisionAwareMovementController {
    pub fn new(config: &MovementConfig, spawn: Vec2, room: RoomBounds, zones: Vec<ObstacleZone>) -> Self {
        let margin = config.collision_margin.max(0.0);
        let mut controller = Self {
            position: room.clamp(spawn, margin),
            velocity: Vec2::ZERO,
            eye_height: config.eye_height,
            room,
            zones,
            acceleration: config.acceleration.max(0.0),
            max_speed: config.max_speed.max(0.0),
            sprint_multiplier: config.sprint_multiplier.max(1.0),
            friction: config.friction.clamp(0.0, 1.0),
            margin,
        };
        let requested = controller.position;
        match controller.nearest_clear(requested) {
            Some(clear) if clear != requested => {
                log::warn!("[movement] spawn {requested} is inside an obstacle; moved to {clear}");
                controller.position = clear;
            }
            Some(_) => {}
            None => log::warn!("[movement] no clear floor around spawn {requested}"),
        }
        controller
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn eye(&self) -> Vec3 {
        Vec3::new(self.position.x, self.eye_height, self.position.y)
    }

    pub fn velocity(&self) -> Vec2 {
        self.velocity
    }

    pub fn margin(&self) -> f32 {
        self.margin
    }

    pub fn zones(&self) -> &[ObstacleZone] {
        &self.zones
    }

    pub fn room(&self) -> RoomBounds {
        self.room
    }

    pub fn is_blocked(&self, point: Vec2) -> bool {
        self.zones.iter().any(|zone| zone.blocks(point, self.margin))
    }

    /// Closest walkable point to `point`, searched on rings of growing radius.
    pub fn nearest_clear(&self, point: Vec2) -> Option<Vec2> {
        let point = self.room.clamp(point, self.margin);
        if !self.is_blocked(point) {
            return Some(point);
        }
        let step = if self.margin > 0.0 { self.margin * 0.5 } else { FALLBACK_STEP };
        let reach = (self.room.max - self.room.min).length();
        let rings = ((reach / step).ceil() as u32).clamp(1, MAX_ESCAPE_RINGS);
        for ring in 1..=rings {
            let radius = step * ring as f32;
            let mut best: Option<Vec2> = None;
            for k in 0..ESCAPE_DIRECTIONS {
                let (sin, cos) = (std::f32::consts::TAU * k as f32 / ESCAPE_DIRECTIONS as f32).sin_cos();
                let candidate = self.room.clamp(point + Vec2::new(cos, sin) * radius, self.margin);
                if self.is_blocked(candidate) {
                    continue;
                }
                if best.map_or(true, |b| candidate.distance_squared(point) < b.distance_squared(point)) {
                    best = Some(candidate);
                }
            }
            if best.is_some() {
                return best;
            }
        }
        None
    }

    /// Moves the viewpoint directly. Rejected when the point is inside an expanded zone.
    pub fn teleport(&mut self, point: Vec2) -> bool {
        let clamped = self.room.clamp(point, self.margin);
        if self.is_blocked(clamped) {
            return false;
        }
        self.position = clamped;
        self.velocity = Vec2::ZERO;
        true
    }

    /// Integrates one frame of movement and resolves it against the obstacle zones.
    pub fn tick(&mut self, intent: &MovementIntent, yaw_radians: f32, dt: f32) -> MoveOutcome {
        let dt = dt.max(0.0);
        let (sin, cos) = yaw_radians.sin_cos();
        let forward = Vec2::new(-sin, -cos);
        let right = Vec2::new(cos, -sin);
        let mut wish = forward * intent.forward + right * intent.strafe;
        if wish.length_squared() > 1.0 {
            wish = wish.normalize();
        }
        self.velocity += wish * self.acceleration * dt;
        self.velocity *= self.friction.powf(dt * 60.0);
        let speed_cap = if intent.sprint { self.max_speed * self.sprint_multiplier } else { self.max_speed };
        self.velocity = self.velocity.clamp_length_max(speed_cap);

        let start = self.position;
        let target = self.room.clamp(start + self.velocity * dt, self.margin);
        let delta = target - start;
        if delta.length_squared() <= f32::EPSILON * f32::EPSILON {
            return MoveOutcome::Free;
        }
        let max_step = if self.margin > 0.0 { self.margin } else { FALLBACK_STEP };
        let steps = ((delta.length() / max_step).ceil() as u32).clamp(1, MAX_SUBSTEPS);
        let step = delta / steps as f32;

        let mut outcome = MoveOutcome::Free;
        for _ in 0..steps {
            let (next, step_outcome) = self.resolve_step(self.position, self.position + step);
            self.position = next;
            outcome = outcome.max(step_outcome);
            if step_outcome == MoveOutcome::Blocked {
                break;
            }
        }
        outcome
    }

    fn resolve_step(&mut self, from: Vec2, to: Vec2) -> (Vec2, MoveOutcome) {
        if !self.is_blocked(to) {
            return (to, MoveOutcome::Free);
        }
        let along_x = Vec2::new(to.x, from.y);
        let along_z = Vec2::new(from.x, to.y);
        let x_first = (to.x - from.x).abs() >= (to.y - from.y).abs();
        let attempts = if x_first { [(along_x, true), (along_z, false)] } else { [(along_z, false), (along_x, true)] };
        for (candidate, moves_x) in attempts {
            if candidate != from && !self.is_blocked(candidate) {
                if moves_x {
                    self.velocity.y = 0.0;
                } else {
                    self.velocity.x = 0.0;
                }
                return (candidate, MoveOutcome::Slid);
            }
        }
        self.velocity = Vec2::ZERO;
        (from, MoveOutcome::Blocked)
    }
}
