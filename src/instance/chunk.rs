use anyhow::{Context, Result};
use glam::{Mat4, Vec3};

use super::animated_state::{AnimatedStateGpu, AnimationSpeeds, PerInstanceAnimatedState};
use super::gpu::{ChunkGpu, ChunkLayouts, ItemInstanceGpu};
use super::item::{ChunkId, ItemId, ItemRecord, OwnerId};
use crate::atlas::{partition_by_capacity, AtlasSlotAllocator, SlotAssignment, TextureAtlasManager};
use crate::config::{AnimationConfig, AtlasConfig};
use crate::picking::{ray_hit_obb, Aabb, Ray};

/// Shared inputs for building every chunk of a scene.
#[derive(Debug, Clone)]
pub struct ChunkBuildSettings {
    /// Offset applied to every item transform (shelf unit, room origin).
    pub parent: Mat4,
    pub half_extents: Vec3,
    pub atlas: AtlasConfig,
    pub animation: AnimationConfig,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChunkHit {
    pub index: usize,
    pub distance: f32,
}

/// One instanced draw: items, their atlas, and their animated state.
pub struct InstanceChunk {
    id: ChunkId,
    items: Vec<ItemRecord>,
    placements: Vec<Mat4>,
    instances: Vec<ItemInstanceGpu>,
    bounds: Aabb,
    half_extents: Vec3,
    assignment: SlotAssignment,
    atlas: TextureAtlasManager,
    animated: PerInstanceAnimatedState,
    gpu: Option<ChunkGpu>,
}

impl InstanceChunk {
    pub fn build(id: ChunkId, items: Vec<ItemRecord>, settings: &ChunkBuildSettings) -> Result<Self> {
        let allocator = AtlasSlotAllocator::new(settings.atlas.capacity);
        let assignment = allocator.allocate(&items).with_context(|| format!("Allocating atlas slots for {id}"))?;
        let mut atlas = TextureAtlasManager::new(format!("Atlas {id}"), &settings.atlas);
        atlas.adopt_assignment(&assignment)?;

        let half_extents = settings.half_extents.abs();
        let mut placements = Vec::with_capacity(items.len());
        let mut instances = Vec::with_capacity(items.len());
        let mut bounds = Aabb::EMPTY;
        for (index, item) in items.iter().enumerate() {
            let placement = settings.parent * item.transform.matrix();
            let layer = assignment.item_slots[index];
            instances.push(ItemInstanceGpu::new(placement, half_extents, item.fallback_color, layer));
            bounds = bounds.union(&Aabb::of_box(&placement, half_extents));
            placements.push(placement);
        }
        let animated = PerInstanceAnimatedState::new(
            items.len(),
            AnimationSpeeds::from(&settings.animation),
            settings.animation.settle_seconds,
        );
        Ok(Self {
            id,
            items,
            placements,
            instances,
            bounds,
            half_extents,
            assignment,
            atlas,
            animated,
            gpu: None,
        })
    }

    pub fn id(&self) -> ChunkId {
        self.id
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn items(&self) -> &[ItemRecord] {
        &self.items
    }

    pub fn instances(&self) -> &[ItemInstanceGpu] {
        &self.instances
    }

    pub fn bounds(&self) -> Aabb {
        self.bounds
    }

    pub fn assignment(&self) -> &SlotAssignment {
        &self.assignment
    }

    pub fn slots_used(&self) -> usize {
        self.assignment.slots_used()
    }

    /// Draw-time instance index back to the item's identity.
    pub fn lookup(&self, hit_index: usize) -> Option<(ItemId, OwnerId)> {
        self.items.get(hit_index).map(|item| (item.id, item.owner_id))
    }

    /// Nearest item box along `ray` within `max_range`.
    pub fn raycast(&self, ray: &Ray, max_range: f32) -> Option<ChunkHit> {
        match self.bounds.hit(ray) {
            Some(distance) if distance <= max_range => {}
            _ => return None,
        }
        let mut best: Option<ChunkHit> = None;
        for (index, placement) in self.placements.iter().enumerate() {
            let Some(distance) = ray_hit_obb(ray, placement, self.half_extents) else {
                continue;
            };
            if distance > max_range {
                continue;
            }
            if best.map_or(true, |hit| distance < hit.distance) {
                best = Some(ChunkHit { index, distance });
            }
        }
        best
    }

    pub fn atlas(&self) -> &TextureAtlasManager {
        &self.atlas
    }

    pub fn atlas_mut(&mut self) -> &mut TextureAtlasManager {
        &mut self.atlas
    }

    pub fn animated(&self) -> &PerInstanceAnimatedState {
        &self.animated
    }

    pub fn animated_mut(&mut self) -> &mut PerInstanceAnimatedState {
        &mut self.animated
    }

    pub fn set_target(&mut self, index: usize, target: AnimatedStateGpu) -> bool {
        self.animated.set_target(index, target)
    }

    pub fn gpu(&self) -> Option<&ChunkGpu> {
        self.gpu.as_ref()
    }

    /// Creates the atlas texture and the chunk's buffers. Static instance data is
    /// uploaded here and never rewritten.
    pub fn attach_gpu(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, layouts: &ChunkLayouts) -> Result<()> {
        self.atlas.attach_gpu(device, queue)?;
        let view = self.atlas.view().with_context(|| format!("Atlas view missing for {}", self.id))?;
        let gpu = ChunkGpu::new(device, layouts, &self.id.to_string(), &self.instances, &self.animated, view)?;
        self.animated.clear_dirty_targets();
        self.gpu = Some(gpu);
        Ok(())
    }

    /// Releases the atlas, the instance buffer, and the animated-state buffers together.
    pub fn dispose(&mut self) {
        self.atlas.dispose();
        if let Some(gpu) = self.gpu.take() {
            gpu.destroy();
        }
    }
}

/// Splits `items` so each group's distinct images fit the atlas capacity, then builds
/// one chunk per group.
pub fn build_chunks(items: Vec<ItemRecord>, settings: &ChunkBuildSettings) -> Result<Vec<InstanceChunk>> {
    let groups = partition_by_capacity(items, settings.atlas.capacity)?;
    groups
        .into_iter()
        .enumerate()
        .map(|(index, group)| InstanceChunk::build(ChunkId(index as u32), group, settings))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::instance::ItemTransform;

    fn settings(capacity: u32) -> ChunkBuildSettings {
        ChunkBuildSettings {
            parent: Mat4::IDENTITY,
            half_extents: Vec3::new(0.1, 0.1, 0.02),
            atlas: AtlasConfig { capacity, slot_size: 2, ..AtlasConfig::default() },
            animation: AnimationConfig::default(),
        }
    }

    fn row(count: u32) -> Vec<ItemRecord> {
        (0..count)
            .map(|i| {
                ItemRecord::new(ItemId(i), OwnerId(100 + i), ItemTransform::from_yaw(Vec3::new(i as f32 * 0.5, 1.0, -2.0), 0.0))
                    .with_image(format!("img-{}.png", i % 3))
            })
            .collect()
    }

    #[test]
    fn raycast_finds_nearest_and_resolves_owner() {
        let chunk = InstanceChunk::build(ChunkId(0), row(4), &settings(16)).expect("build");
        let ray = Ray::new(Vec3::new(1.0, 1.0, 0.0), Vec3::NEG_Z).expect("ray");
        let hit = chunk.raycast(&ray, 5.0).expect("hit");
        assert_eq!(chunk.lookup(hit.index), Some((ItemId(2), OwnerId(102))));
        assert!((hit.distance - 1.98).abs() < 1e-4);
        assert!(chunk.raycast(&ray, 1.5).is_none(), "out of range");
    }

    #[test]
    fn instances_carry_atlas_layers() {
        let chunk = InstanceChunk::build(ChunkId(0), row(6), &settings(16)).expect("build");
        let layers: Vec<u32> = chunk.instances().iter().map(|i| i.layer).collect();
        assert_eq!(layers, vec![1, 2, 3, 1, 2, 3]);
        assert_eq!(chunk.atlas().slot_count(), 4);
        assert_eq!(chunk.atlas().pending_streams(), 3);
    }

    #[test]
    fn builder_splits_by_capacity() {
        let chunks = build_chunks(row(9), &settings(3)).expect("build");
        assert_eq!(chunks.len(), 2);
        for chunk in &chunks {
            assert!(chunk.assignment().slot_count() <= 3);
        }
        assert_eq!(chunks.iter().map(InstanceChunk::len).sum::<usize>(), 9);
    }
}
