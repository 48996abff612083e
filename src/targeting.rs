use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::config::{SelectionConfig, TargetingConfig};
use crate::instance::{ChunkId, InstanceChunk, ItemId, ObjectId, OwnerId};
use crate::picking::{Aabb, Ray};
use crate::selection::{RawTarget, SelectionChange, SelectionHysteresisFilter};

/// Interactive prop with its own identity (service counter, kiosk).
#[derive(Debug, Clone, PartialEq)]
pub struct NamedObject {
    pub id: ObjectId,
    pub name: String,
    pub bounds: Aabb,
}

/// Nearest thing along the targeting ray.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum HitKind {
    Item { id: ItemId, owner: OwnerId, chunk: ChunkId, index: usize },
    NamedObject { id: ObjectId },
    #[default]
    None,
}

impl HitKind {
    pub fn item(&self) -> Option<ItemId> {
        match self {
            HitKind::Item { id, .. } => Some(*id),
            _ => None,
        }
    }

    pub fn named_object(&self) -> Option<ObjectId> {
        match self {
            HitKind::NamedObject { id } => Some(*id),
            _ => None,
        }
    }

    fn raw_target(&self) -> RawTarget<ItemId> {
        match self {
            HitKind::Item { id, .. } => RawTarget::Candidate(*id),
            HitKind::NamedObject { .. } => RawTarget::Elsewhere,
            HitKind::None => RawTarget::Nothing,
        }
    }
}

/// State published once per targeting tick.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TargetingSnapshot {
    pub raw: HitKind,
    pub stable_item: Option<ItemId>,
    pub named_object: Option<ObjectId>,
    pub tick: u64,
}

/// Single-writer, many-reader cell. Readers may observe a snapshot one tick old.
#[derive(Debug, Clone, Default)]
pub struct SharedTargeting {
    snapshot: Arc<RwLock<TargetingSnapshot>>,
    version: Arc<AtomicU64>,
}

impl SharedTargeting {
    fn publish(&self, snapshot: TargetingSnapshot) {
        let mut guard = self.snapshot.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = snapshot;
        self.version.fetch_add(1, Ordering::Release);
    }

    pub fn read(&self) -> TargetingSnapshot {
        *self.snapshot.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }

    pub fn stable_selection(&self) -> Option<ItemId> {
        self.read().stable_item
    }

    pub fn targeted_named_object(&self) -> Option<ObjectId> {
        self.read().named_object
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetingTick {
    pub raw: HitKind,
    pub selection_change: Option<SelectionChange<ItemId>>,
    pub named_change: Option<(Option<ObjectId>, Option<ObjectId>)>,
}

pub struct RaycastTargetingController {
    interval: f32,
    max_range: f32,
    accumulator: f32,
    since_tick: f32,
    filter: SelectionHysteresisFilter<ItemId>,
    named_objects: Vec<NamedObject>,
    named_target: Option<ObjectId>,
    last_raw: HitKind,
    shared: SharedTargeting,
    ticks: u64,
}

impl RaycastTargetingController {
    pub fn new(targeting: &TargetingConfig, selection: &SelectionConfig, named_objects: Vec<NamedObject>) -> Self {
        let interval = targeting.interval_seconds.max(0.0);
        Self {
            interval,
            max_range: targeting.max_range.max(0.0),
            // First update runs a tick immediately.
            accumulator: interval,
            since_tick: 0.0,
            filter: SelectionHysteresisFilter::new(selection.select_delay, selection.deselect_delay),
            named_objects,
            named_target: None,
            last_raw: HitKind::None,
            shared: SharedTargeting::default(),
            ticks: 0,
        }
    }

    pub fn max_range(&self) -> f32 {
        self.max_range
    }

    pub fn named_objects(&self) -> &[NamedObject] {
        &self.named_objects
    }

    pub fn filter(&self) -> &SelectionHysteresisFilter<ItemId> {
        &self.filter
    }

    /// Reader handle for consumers outside the frame loop.
    pub fn shared(&self) -> SharedTargeting {
        self.shared.clone()
    }

    pub fn stable_selection(&self) -> Option<ItemId> {
        self.filter.stable()
    }

    pub fn targeted_named_object(&self) -> Option<ObjectId> {
        self.named_target
    }

    pub fn last_raw(&self) -> HitKind {
        self.last_raw
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks
    }

    /// Nearest item or named object along `ray` within range. Both categories compete
    /// on distance.
    pub fn resolve(&self, ray: &Ray, chunks: &[InstanceChunk]) -> HitKind {
        let mut best = HitKind::None;
        let mut best_distance = self.max_range;
        for chunk in chunks {
            if let Some(hit) = chunk.raycast(ray, best_distance) {
                if let Some((id, owner)) = chunk.lookup(hit.index) {
                    best_distance = hit.distance;
                    best = HitKind::Item { id, owner, chunk: chunk.id(), index: hit.index };
                }
            }
        }
        for object in &self.named_objects {
            if let Some(distance) = object.bounds.hit(ray) {
                if distance < best_distance {
                    best_distance = distance;
                    best = HitKind::NamedObject { id: object.id };
                }
            }
        }
        best
    }

    /// Advances the throttle clock and runs a targeting tick when it is due.
    pub fn update(&mut self, dt: f32, ray: Option<&Ray>, chunks: &[InstanceChunk]) -> Option<TargetingTick> {
        let dt = dt.max(0.0);
        self.accumulator += dt;
        self.since_tick += dt;
        if self.accumulator < self.interval {
            return None;
        }
        let elapsed = std::mem::take(&mut self.since_tick);
        // Leftover time carries into the next interval; a long frame still owes only one tick.
        self.accumulator =
            if self.interval > 0.0 { (self.accumulator - self.interval) % self.interval } else { 0.0 };
        let raw = ray.map(|ray| self.resolve(ray, chunks)).unwrap_or_default();
        Some(self.apply(raw, elapsed))
    }

    /// Feeds one raw hit through the hysteresis filter and publishes the result.
    pub fn apply(&mut self, raw: HitKind, elapsed: f32) -> TargetingTick {
        self.ticks += 1;
        self.last_raw = raw;
        let selection_change = self.filter.update_raw(raw.raw_target(), elapsed);
        let named = raw.named_object();
        let named_change = (named != self.named_target).then_some((self.named_target, named));
        self.named_target = named;
        self.shared.publish(TargetingSnapshot {
            raw,
            stable_item: self.filter.stable(),
            named_object: self.named_target,
            tick: self.ticks,
        });
        TargetingTick { raw, selection_change, named_change }
    }
}
