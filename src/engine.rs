use anyhow::{Context, Result};
use glam::{Vec2, Vec3};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::atlas::{ImageSource, ImageStreamer, SlotEvent};
use crate::camera3d::FirstPersonView;
use crate::config::{AnimationConfig, AppConfig};
use crate::events::{ActivationTarget, EngineEvent, EventBus};
use crate::instance::{build_chunks, AnimatedStateGpu, ChunkBuildSettings, ChunkLayouts, InstanceChunk, ItemId, ObjectId, OwnerId};
use crate::movement::{CollisionAwareMovementController, MoveOutcome, MovementIntent};
use crate::renderer::ItemPass;
use crate::scene::SceneLayout;
use crate::targeting::{RaycastTargetingController, SharedTargeting};

/// Availability and rental state owned outside the engine.
pub trait AvailabilitySource: Send + Sync {
    fn is_owner_unavailable(&self, owner: OwnerId) -> bool;
    fn is_owner_held_by_viewer(&self, owner: OwnerId) -> bool;

    /// Bumped whenever any answer may have changed.
    fn version(&self) -> u64 {
        0
    }
}

#[derive(Debug, Default)]
struct AvailabilitySets {
    unavailable: HashSet<OwnerId>,
    held: HashSet<OwnerId>,
}

/// In-memory availability, used by the demo shell and tests.
#[derive(Debug, Default)]
pub struct StaticAvailability {
    sets: RwLock<AvailabilitySets>,
    version: AtomicU64,
}

impl StaticAvailability {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, owner: OwnerId, unavailable: bool) {
        let mut sets = self.sets.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let changed = if unavailable { sets.unavailable.insert(owner) } else { sets.unavailable.remove(&owner) };
        if changed {
            self.version.fetch_add(1, Ordering::Release);
        }
    }

    pub fn set_held(&self, owner: OwnerId, held: bool) {
        let mut sets = self.sets.write().unwrap_or_else(|poisoned| poisoned.into_inner());
        let changed = if held { sets.held.insert(owner) } else { sets.held.remove(&owner) };
        if changed {
            self.version.fetch_add(1, Ordering::Release);
        }
    }

    /// Checks an owner out to the viewer, or returns it. Returns the new held state.
    pub fn toggle_held(&self, owner: OwnerId) -> bool {
        let held = !self.is_owner_held_by_viewer(owner);
        self.set_held(owner, held);
        self.set_unavailable(owner, held);
        held
    }
}

impl AvailabilitySource for StaticAvailability {
    fn is_owner_unavailable(&self, owner: OwnerId) -> bool {
        self.sets.read().unwrap_or_else(|poisoned| poisoned.into_inner()).unavailable.contains(&owner)
    }

    fn is_owner_held_by_viewer(&self, owner: OwnerId) -> bool {
        self.sets.read().unwrap_or_else(|poisoned| poisoned.into_inner()).held.contains(&owner)
    }

    fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

/// Input for one frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameIntent {
    pub movement: MovementIntent,
    /// Mouse motion in pixels since the previous frame.
    pub look_delta: Vec2,
    pub activate: bool,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub draw_calls: u32,
    pub dispatches: u32,
    pub uploads: u32,
    pub streams_issued: u32,
    pub target_writes: u32,
    pub targeting_ran: bool,
    pub move_outcome: MoveOutcome,
    pub activated: Option<ActivationTarget>,
}

impl Default for FrameReport {
    fn default() -> Self {
        Self {
            draw_calls: 0,
            dispatches: 0,
            uploads: 0,
            streams_issued: 0,
            target_writes: 0,
            targeting_ran: false,
            move_outcome: MoveOutcome::Free,
            activated: None,
        }
    }
}

/// Owns every chunk and runs the per-frame order: movement, look, throttled targeting,
/// hysteresis, target writes, animation, streaming, flush.
pub struct ShowroomEngine {
    chunks: Vec<InstanceChunk>,
    item_index: HashMap<ItemId, (usize, usize)>,
    streamer: ImageStreamer,
    availability: Arc<dyn AvailabilitySource>,
    availability_version: u64,
    movement: CollisionAwareMovementController,
    view: FirstPersonView,
    targeting: RaycastTargetingController,
    events: EventBus,
    animation: AnimationConfig,
    streams_per_frame: usize,
    look_sensitivity: f32,
    queue: Option<wgpu::Queue>,
    layouts: Option<ChunkLayouts>,
    dispatch_pending: Vec<bool>,
}

impl ShowroomEngine {
    pub fn new(
        config: &AppConfig,
        layout: &SceneLayout,
        source: Arc<dyn ImageSource>,
        availability: Arc<dyn AvailabilitySource>,
    ) -> Result<Self> {
        let settings = ChunkBuildSettings {
            parent: layout.item_parent(),
            half_extents: Vec3::from_array(config.items.half_extents),
            atlas: config.atlas.clone(),
            animation: config.animation.clone(),
        };
        let chunks = build_chunks(layout.item_records(), &settings).context("Building item chunks")?;
        let mut events = EventBus::default();
        let mut item_index = HashMap::new();
        for (chunk_idx, chunk) in chunks.iter().enumerate() {
            for (index, item) in chunk.items().iter().enumerate() {
                item_index.insert(item.id, (chunk_idx, index));
            }
            events.push(EngineEvent::ChunkBuilt {
                chunk: chunk.id(),
                items: chunk.len(),
                slots: chunk.assignment().slot_count(),
            });
        }
        log::info!(
            "[engine] {} items in {} chunk(s), {} atlas slots in use",
            item_index.len(),
            chunks.len(),
            chunks.iter().map(InstanceChunk::slots_used).sum::<usize>()
        );

        let streamer = ImageStreamer::new(source, config.atlas.worker_threads, config.atlas.queue_depth)?;
        let movement = CollisionAwareMovementController::new(
            &config.movement,
            layout.spawn_position(),
            layout.room_bounds(),
            layout.obstacle_zones(),
        );
        let view = FirstPersonView::new(movement.eye(), layout.spawn_yaw());
        let targeting = RaycastTargetingController::new(&config.targeting, &config.selection, layout.named_objects());
        let dispatch_pending = vec![false; chunks.len()];
        let mut engine = Self {
            chunks,
            item_index,
            streamer,
            availability_version: availability.version(),
            availability,
            movement,
            view,
            targeting,
            events,
            animation: config.animation.clone(),
            streams_per_frame: config.atlas.streams_per_frame as usize,
            look_sensitivity: config.movement.look_sensitivity,
            queue: None,
            layouts: None,
            dispatch_pending,
        };
        engine.refresh_all_targets();
        for chunk in &mut engine.chunks {
            chunk.animated_mut().snap_to_targets();
        }
        Ok(engine)
    }

    /// Creates GPU resources for every chunk. Returns the layouts the item pipelines
    /// are built against.
    pub fn attach_gpu(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<&ChunkLayouts> {
        let layouts = ChunkLayouts::new(device);
        for chunk in &mut self.chunks {
            chunk.attach_gpu(device, queue, &layouts)?;
        }
        self.queue = Some(queue.clone());
        log::info!("[engine] attached {} chunk(s) to the GPU", self.chunks.len());
        Ok(self.layouts.insert(layouts))
    }

    pub fn layouts(&self) -> Option<&ChunkLayouts> {
        self.layouts.as_ref()
    }

    pub fn update(&mut self, dt: f32, intent: &FrameIntent) -> FrameReport {
        let dt = dt.max(0.0);
        let mut report = FrameReport::default();

        report.move_outcome = self.movement.tick(&intent.movement, self.view.yaw_radians, dt);
        self.view.eye = self.movement.eye();
        self.view.look(intent.look_delta, self.look_sensitivity);

        let mut touched: Vec<ItemId> = Vec::new();
        let ray = self.view.center_ray();
        if let Some(tick) = self.targeting.update(dt, ray.as_ref(), &self.chunks) {
            report.targeting_ran = true;
            if let Some(change) = tick.selection_change {
                log::debug!("[engine] selection {:?} -> {:?}", change.previous, change.current);
                touched.extend(change.previous);
                touched.extend(change.current);
                self.events.push(EngineEvent::SelectionChanged { previous: change.previous, current: change.current });
            }
            if let Some((previous, current)) = tick.named_change {
                self.events.push(EngineEvent::NamedTargetChanged { previous, current });
            }
        }

        let version = self.availability.version();
        if version != self.availability_version {
            self.availability_version = version;
            report.target_writes += self.refresh_all_targets();
        } else {
            for id in touched {
                if self.refresh_item_target(id) {
                    report.target_writes += 1;
                }
            }
        }

        if intent.activate {
            report.activated = self.activation_target();
            if let Some(target) = report.activated {
                self.events.push(EngineEvent::Activated { target });
            }
        }

        for (chunk, pending) in self.chunks.iter_mut().zip(self.dispatch_pending.iter_mut()) {
            let target_buffer = chunk.gpu().map(|gpu| gpu.target_buffer().clone());
            match (self.queue.as_ref(), target_buffer) {
                (Some(queue), Some(target_buffer)) => {
                    let animated = chunk.animated_mut();
                    animated.write_dirty_targets(queue, &target_buffer);
                    *pending = animated.tick(dt);
                    if *pending {
                        let params = animated.params(dt);
                        if let Some(gpu) = chunk.gpu() {
                            gpu.write_params(queue, &params);
                        }
                        report.dispatches += 1;
                    }
                }
                _ => {
                    let animated = chunk.animated_mut();
                    animated.clear_dirty_targets();
                    if animated.tick(dt) {
                        animated.step_cpu(dt);
                        report.dispatches += 1;
                    }
                    *pending = false;
                }
            }
        }

        let mut budget = self.streams_per_frame;
        for chunk in &mut self.chunks {
            if budget == 0 {
                break;
            }
            let issued = chunk.atlas_mut().issue_pending(&self.streamer, budget);
            budget -= issued;
            report.streams_issued += issued as u32;
        }

        for chunk in &mut self.chunks {
            let chunk_id = chunk.id();
            for event in chunk.atlas_mut().poll_completions() {
                self.events.push(match event {
                    SlotEvent::Loaded { slot, image_ref } => EngineEvent::SlotLoaded { chunk: chunk_id, slot, image_ref },
                    SlotEvent::Failed { slot, image_ref, reason } => {
                        EngineEvent::SlotFailed { chunk: chunk_id, slot, image_ref, reason }
                    }
                });
            }
            if chunk.atlas_mut().flush() {
                report.uploads += 1;
            }
        }

        report.draw_calls = self.chunks.iter().filter(|chunk| !chunk.is_empty()).count() as u32;
        report
    }

    /// Records one compute dispatch per unsettled chunk, then one instanced draw per chunk.
    pub fn encode(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        pass: &ItemPass,
        color: &wgpu::TextureView,
        depth: &wgpu::TextureView,
    ) -> u32 {
        {
            let mut compute = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("Animated State Pass"),
                timestamp_writes: None,
            });
            for (chunk, pending) in self.chunks.iter().zip(self.dispatch_pending.iter()) {
                if let (true, Some(gpu)) = (*pending, chunk.gpu()) {
                    pass.dispatch(&mut compute, gpu);
                }
            }
        }
        let mut render = pass.begin(encoder, color, depth);
        let mut draws = 0;
        for chunk in &self.chunks {
            if let Some(gpu) = chunk.gpu() {
                pass.draw(&mut render, gpu);
                draws += 1;
            }
        }
        draws
    }

    /// Recomputes the target rule for every item. Returns how many targets changed.
    fn refresh_all_targets(&mut self) -> u32 {
        let selected = self.targeting.stable_selection();
        let mut writes = 0;
        for chunk in &mut self.chunks {
            for index in 0..chunk.len() {
                let Some(item) = chunk.items().get(index) else {
                    continue;
                };
                let target = item_target(item.id, item.owner_id, item.hover_offset, selected, self.availability.as_ref(), &self.animation);
                if chunk.set_target(index, target) {
                    writes += 1;
                }
            }
        }
        writes
    }

    fn refresh_item_target(&mut self, id: ItemId) -> bool {
        let Some(&(chunk_idx, index)) = self.item_index.get(&id) else {
            return false;
        };
        let selected = self.targeting.stable_selection();
        let Some(chunk) = self.chunks.get_mut(chunk_idx) else {
            return false;
        };
        let Some(item) = chunk.items().get(index) else {
            return false;
        };
        let target = item_target(item.id, item.owner_id, item.hover_offset, selected, self.availability.as_ref(), &self.animation);
        chunk.set_target(index, target)
    }

    /// Stable item first, then the targeted named object.
    pub fn activation_target(&self) -> Option<ActivationTarget> {
        if let Some(id) = self.targeting.stable_selection() {
            if let Some(owner) = self.owner_of(id) {
                return Some(ActivationTarget::Item { id, owner });
            }
        }
        self.targeting.targeted_named_object().map(|id| ActivationTarget::NamedObject { id })
    }

    pub fn owner_of(&self, id: ItemId) -> Option<OwnerId> {
        let &(chunk_idx, index) = self.item_index.get(&id)?;
        self.chunks.get(chunk_idx)?.lookup(index).map(|(_, owner)| owner)
    }

    /// Current animated values for `id` as seen by the CPU.
    pub fn animated_state(&self, id: ItemId) -> Option<(AnimatedStateGpu, AnimatedStateGpu)> {
        let &(chunk_idx, index) = self.item_index.get(&id)?;
        let animated = self.chunks.get(chunk_idx)?.animated();
        Some((*animated.current(index)?, *animated.target(index)?))
    }

    pub fn stable_selection(&self) -> Option<ItemId> {
        self.targeting.stable_selection()
    }

    pub fn targeted_named_object(&self) -> Option<ObjectId> {
        self.targeting.targeted_named_object()
    }

    pub fn shared_targeting(&self) -> SharedTargeting {
        self.targeting.shared()
    }

    pub fn targeting(&self) -> &RaycastTargetingController {
        &self.targeting
    }

    pub fn view(&self) -> &FirstPersonView {
        &self.view
    }

    pub fn movement(&self) -> &CollisionAwareMovementController {
        &self.movement
    }

    /// Moves the viewer and sets its orientation. False when `position` is blocked.
    pub fn place_viewer(&mut self, position: Vec2, yaw_radians: f32, pitch_radians: f32) -> bool {
        if !self.movement.teleport(position) {
            return false;
        }
        self.view.eye = self.movement.eye();
        self.view.yaw_radians = yaw_radians;
        self.view.pitch_radians = pitch_radians;
        true
    }

    pub fn chunks(&self) -> &[InstanceChunk] {
        &self.chunks
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        self.events.drain()
    }

    /// Tears down every chunk; completions still in flight are dropped.
    pub fn shutdown(&mut self) {
        for chunk in &mut self.chunks {
            chunk.dispose();
        }
    }
}

impl Drop for ShowroomEngine {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn item_target(
    id: ItemId,
    owner: OwnerId,
    hover_offset: f32,
    selected: Option<ItemId>,
    availability: &dyn AvailabilitySource,
    animation: &AnimationConfig,
) -> AnimatedStateGpu {
    let is_selected = selected == Some(id);
    let held = availability.is_owner_held_by_viewer(owner);
    let unavailable = availability.is_owner_unavailable(owner) && !held;
    let hover = if is_selected { hover_offset } else { 0.0 };
    let emissive = if held {
        animation.rented_tint
    } else if is_selected {
        animation.selection_tint
    } else {
        [0.0; 3]
    };
    AnimatedStateGpu::new(hover, emissive, if unavailable { 1.0 } else { 0.0 })
}
