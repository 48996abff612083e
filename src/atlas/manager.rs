use anyhow::{bail, Result};
use std::collections::VecDeque;
use std::ops::Range;
use std::sync::mpsc;
use std::sync::Arc;

use super::allocator::{SlotAssignment, SlotLoadState, FALLBACK_SLOT};
use super::streaming::{AtlasLiveness, ImageStreamer, StreamCompletion, StreamJob};
use crate::config::AtlasConfig;

pub const ATLAS_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[derive(Debug, Clone, PartialEq)]
pub enum SlotEvent {
    Loaded { slot: u32, image_ref: Arc<str> },
    Failed { slot: u32, image_ref: Arc<str>, reason: String },
}

struct AtlasGpu {
    device: wgpu::Device,
    queue: wgpu::Queue,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    layers: u32,
}

/// One texture array plus its CPU staging copy.
///
/// Every slot is one array layer of `slot_size` square RGBA8 pixels. The staging copy
/// always mirrors what the GPU should hold; `flush` publishes the changed layer runs.
pub struct TextureAtlasManager {
    label: String,
    slot_size: u32,
    fallback_pixel: [u8; 4],
    slot_count: u32,
    staging: Vec<u8>,
    slot_states: Vec<SlotLoadState>,
    /// Sorted, disjoint, non-adjacent runs of changed layers.
    dirty_layers: Vec<Range<u32>>,
    pending: VecDeque<(Arc<str>, u32)>,
    in_flight: usize,
    liveness: Arc<AtlasLiveness>,
    completion_tx: mpsc::Sender<StreamCompletion>,
    completion_rx: mpsc::Receiver<StreamCompletion>,
    gpu: Option<AtlasGpu>,
    upload_count: u64,
}

impl TextureAtlasManager {
    pub fn new(label: impl Into<String>, config: &AtlasConfig) -> Self {
        let (completion_tx, completion_rx) = mpsc::channel();
        Self {
            label: label.into(),
            slot_size: config.slot_size.max(1),
            fallback_pixel: config.fallback_color,
            slot_count: 0,
            staging: Vec::new(),
            slot_states: Vec::new(),
            dirty_layers: Vec::new(),
            pending: VecDeque::new(),
            in_flight: 0,
            liveness: Arc::new(AtlasLiveness::new()),
            completion_tx,
            completion_rx,
            gpu: None,
            upload_count: 0,
        }
    }

    fn slot_bytes(&self) -> usize {
        (self.slot_size as usize) * (self.slot_size as usize) * 4
    }

    /// Sizes the atlas for `slot_count` layers and fills every layer with the fallback
    /// colour in a single pass. Jobs issued before this call are invalidated.
    pub fn initialize(&mut self, slot_count: u32) -> Result<()> {
        if slot_count == 0 {
            bail!("Atlas '{}' needs at least the fallback slot", self.label);
        }
        if self.liveness.is_disposed() {
            bail!("Atlas '{}' was disposed", self.label);
        }
        self.liveness.advance();
        self.slot_count = slot_count;
        let pixels_per_slot = (self.slot_size as usize) * (self.slot_size as usize);
        self.staging = self.fallback_pixel.repeat(pixels_per_slot * slot_count as usize);
        self.slot_states = vec![SlotLoadState::Empty; slot_count as usize];
        self.slot_states[FALLBACK_SLOT as usize] = SlotLoadState::Loaded;
        self.pending.clear();
        self.in_flight = 0;
        self.dirty_layers = vec![0..slot_count];
        if let Some(gpu) = self.gpu.take() {
            let device = gpu.device.clone();
            let queue = gpu.queue.clone();
            drop(gpu);
            self.attach_gpu(&device, &queue)?;
        }
        Ok(())
    }

    /// Initialises for `assignment` and queues one stream per image slot.
    pub fn adopt_assignment(&mut self, assignment: &SlotAssignment) -> Result<()> {
        self.initialize(assignment.slot_count())?;
        self.pending.extend(assignment.stream_requests());
        Ok(())
    }

    /// Creates the texture array and uploads the current staging contents once.
    pub fn attach_gpu(&mut self, device: &wgpu::Device, queue: &wgpu::Queue) -> Result<()> {
        let layers = self.slot_count.max(1);
        let max_layers = device.limits().max_texture_array_layers;
        if layers > max_layers {
            bail!(
                "Atlas '{}' needs {layers} layers but the device allows {max_layers}",
                self.label
            );
        }
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(self.label.as_str()),
            size: wgpu::Extent3d {
                width: self.slot_size,
                height: self.slot_size,
                depth_or_array_layers: layers,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: ATLAS_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Atlas Array View"),
            format: Some(ATLAS_FORMAT),
            dimension: Some(wgpu::TextureViewDimension::D2Array),
            aspect: wgpu::TextureAspect::All,
            base_mip_level: 0,
            mip_level_count: Some(1),
            base_array_layer: 0,
            array_layer_count: Some(layers),
            ..Default::default()
        });
        self.gpu = Some(AtlasGpu { device: device.clone(), queue: queue.clone(), texture, view, layers });
        if self.slot_count > 0 {
            self.dirty_layers = vec![0..self.slot_count];
            self.flush();
        }
        log::info!("[atlas] {} attached: {} layers of {}px", self.label, layers, self.slot_size);
        Ok(())
    }

    pub fn view(&self) -> Option<&wgpu::TextureView> {
        self.gpu.as_ref().map(|gpu| &gpu.view)
    }

    /// Queues `image_ref` for `slot_index`; the job is issued by `issue_pending`.
    pub fn queue_stream(&mut self, image_ref: Arc<str>, slot_index: u32) {
        self.pending.push_back((image_ref, slot_index));
    }

    /// Hands one fetch/decode job to the worker pool without blocking. Returns false
    /// when the slot is invalid, already streaming, or the pool is saturated.
    pub fn stream_image_into_slot(&mut self, image_ref: Arc<str>, slot_index: u32, streamer: &ImageStreamer) -> bool {
        if slot_index == FALLBACK_SLOT || slot_index >= self.slot_count {
            return false;
        }
        if self.slot_states[slot_index as usize] == SlotLoadState::Loading {
            return false;
        }
        let job = StreamJob {
            image_ref,
            slot: slot_index,
            generation: self.liveness.generation(),
            slot_size: self.slot_size,
            liveness: Arc::clone(&self.liveness),
            reply: self.completion_tx.clone(),
        };
        match streamer.submit(job) {
            Ok(()) => {
                self.slot_states[slot_index as usize] = SlotLoadState::Loading;
                self.in_flight += 1;
                true
            }
            Err(_) => false,
        }
    }

    /// Issues up to `budget` queued streams. Returns how many were handed to workers.
    pub fn issue_pending(&mut self, streamer: &ImageStreamer, budget: usize) -> usize {
        let mut issued = 0;
        while issued < budget {
            let Some((image_ref, slot)) = self.pending.pop_front() else {
                break;
            };
            if self.stream_image_into_slot(Arc::clone(&image_ref), slot, streamer) {
                issued += 1;
            } else if slot < self.slot_count && self.slot_states[slot as usize] == SlotLoadState::Empty {
                self.pending.push_front((image_ref, slot));
                break;
            }
        }
        issued
    }

    /// Applies finished streams to the staging copy. Completions from an earlier
    /// generation or a disposed atlas are dropped.
    pub fn poll_completions(&mut self) -> Vec<SlotEvent> {
        let mut events = Vec::new();
        while let Ok(completion) = self.completion_rx.try_recv() {
            if !self.liveness.accepts(completion.generation) || completion.slot >= self.slot_count {
                log::debug!(
                    "[atlas] {} dropped stale completion for '{}' (slot {})",
                    self.label,
                    completion.image_ref,
                    completion.slot
                );
                continue;
            }
            self.in_flight = self.in_flight.saturating_sub(1);
            let slot = completion.slot;
            let expected = self.slot_bytes();
            let pixels = completion.pixels.and_then(|pixels| {
                if pixels.len() == expected {
                    Ok(pixels)
                } else {
                    Err(anyhow::anyhow!("decoded {} bytes, expected {expected}", pixels.len()))
                }
            });
            match pixels {
                Ok(pixels) => {
                    let start = slot as usize * expected;
                    self.staging[start..start + expected].copy_from_slice(&pixels);
                    self.slot_states[slot as usize] = SlotLoadState::Loaded;
                    self.mark_dirty(slot);
                    events.push(SlotEvent::Loaded { slot, image_ref: completion.image_ref });
                }
                Err(err) => {
                    log::warn!("[atlas] {} slot {slot} stays at fallback: {err:#}", self.label);
                    self.slot_states[slot as usize] = SlotLoadState::Failed;
                    events.push(SlotEvent::Failed {
                        slot,
                        image_ref: completion.image_ref,
                        reason: format!("{err:#}"),
                    });
                }
            }
        }
        events
    }

    fn mark_dirty(&mut self, layer: u32) {
        let runs = &mut self.dirty_layers;
        let at = runs.partition_point(|run| run.end < layer);
        match runs.get_mut(at) {
            Some(run) if run.start <= layer + 1 => {
                run.start = run.start.min(layer);
                run.end = run.end.max(layer + 1);
                if runs.get(at + 1).is_some_and(|next| next.start <= runs[at].end) {
                    let next = runs.remove(at + 1);
                    runs[at].end = runs[at].end.max(next.end);
                }
            }
            _ => runs.insert(at, layer..layer + 1),
        }
    }

    /// Publishes every layer changed since the previous flush, one texture write per
    /// contiguous run so untouched layers between them are never re-sent.
    /// Returns whether anything was published.
    pub fn flush(&mut self) -> bool {
        let runs = std::mem::take(&mut self.dirty_layers);
        if runs.is_empty() {
            return false;
        }
        for range in &runs {
            self.write_layers(range);
        }
        self.upload_count += 1;
        log::debug!("[atlas] {} flushed {} layer runs {:?}", self.label, runs.len(), runs);
        true
    }

    fn write_layers(&self, range: &Range<u32>) {
        if let Some(gpu) = self.gpu.as_ref() {
            let end = range.end.min(gpu.layers);
            if range.start < end {
                let slot_bytes = self.slot_bytes();
                let bytes = &self.staging[range.start as usize * slot_bytes..end as usize * slot_bytes];
                gpu.queue.write_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &gpu.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d { x: 0, y: 0, z: range.start },
                        aspect: wgpu::TextureAspect::All,
                    },
                    bytes,
                    wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(4 * self.slot_size),
                        rows_per_image: Some(self.slot_size),
                    },
                    wgpu::Extent3d {
                        width: self.slot_size,
                        height: self.slot_size,
                        depth_or_array_layers: end - range.start,
                    },
                );
            }
        }
    }

    /// Staged RGBA8 texel at (`x`, `y`) of `slot`, with `y = 0` the bottom row.
    pub fn sample(&self, slot: u32, x: u32, y: u32) -> Option<[u8; 4]> {
        if slot >= self.slot_count || x >= self.slot_size || y >= self.slot_size {
            return None;
        }
        let offset = self.slot_bytes() * slot as usize + ((y * self.slot_size + x) as usize) * 4;
        let texel = self.staging.get(offset..offset + 4)?;
        Some([texel[0], texel[1], texel[2], texel[3]])
    }

    pub fn slot_state(&self, slot: u32) -> Option<SlotLoadState> {
        self.slot_states.get(slot as usize).copied()
    }

    pub fn slot_count(&self) -> u32 {
        self.slot_count
    }

    pub fn slot_size(&self) -> u32 {
        self.slot_size
    }

    pub fn is_dirty(&self) -> bool {
        !self.dirty_layers.is_empty()
    }

    pub fn pending_streams(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    pub fn upload_count(&self) -> u64 {
        self.upload_count
    }

    /// True once every image slot reached `Loaded` or `Failed`.
    pub fn is_settled(&self) -> bool {
        self.pending.is_empty()
            && self.slot_states.iter().all(|state| matches!(state, SlotLoadState::Loaded | SlotLoadState::Failed))
    }

    pub fn is_disposed(&self) -> bool {
        self.liveness.is_disposed()
    }

    /// Releases the GPU texture; completions still in flight are discarded.
    pub fn dispose(&mut self) {
        self.liveness.dispose();
        self.pending.clear();
        self.in_flight = 0;
        self.dirty_layers.clear();
        if let Some(gpu) = self.gpu.take() {
            gpu.texture.destroy();
        }
    }
}

impl Drop for TextureAtlasManager {
    fn drop(&mut self) {
        self.liveness.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn atlas(slot_size: u32) -> TextureAtlasManager {
        let config = AtlasConfig { slot_size, fallback_color: [10, 20, 30, 255], ..AtlasConfig::default() };
        TextureAtlasManager::new("test atlas", &config)
    }

    #[test]
    fn initialize_fills_every_slot_with_fallback() {
        let mut manager = atlas(4);
        manager.initialize(5).expect("init");
        for slot in 0..5 {
            for (x, y) in [(0, 0), (3, 3), (1, 2)] {
                assert_eq!(manager.sample(slot, x, y), Some([10, 20, 30, 255]));
            }
        }
        assert_eq!(manager.sample(5, 0, 0), None);
        assert!(manager.is_dirty());
        assert!(manager.flush());
        assert!(!manager.flush(), "second flush has nothing to publish");
        assert_eq!(manager.upload_count(), 1);
    }

    #[test]
    fn stale_completion_is_ignored() {
        let mut manager = atlas(2);
        manager.initialize(2).expect("init");
        let old_generation = manager.liveness.generation();
        manager.initialize(2).expect("reinit");
        manager.flush();
        manager
            .completion_tx
            .send(StreamCompletion {
                image_ref: Arc::from("late.png"),
                slot: 1,
                generation: old_generation,
                pixels: Ok(vec![255; 16]),
            })
            .expect("send");
        assert!(manager.poll_completions().is_empty());
        assert_eq!(manager.sample(1, 0, 0), Some([10, 20, 30, 255]));
        assert!(!manager.is_dirty());
    }

    #[test]
    fn completion_marks_only_its_layer_dirty() {
        let mut manager = atlas(2);
        manager.initialize(4).expect("init");
        manager.flush();
        let generation = manager.liveness.generation();
        manager
            .completion_tx
            .send(StreamCompletion { image_ref: Arc::from("a"), slot: 2, generation, pixels: Ok(vec![200; 16]) })
            .expect("send");
        let events = manager.poll_completions();
        assert_eq!(events, vec![SlotEvent::Loaded { slot: 2, image_ref: Arc::from("a") }]);
        assert_eq!(manager.dirty_layers, vec![2..3]);
        assert_eq!(manager.slot_state(2), Some(SlotLoadState::Loaded));
        assert_eq!(manager.sample(2, 1, 1), Some([200; 4]));
        assert_eq!(manager.sample(1, 1, 1), Some([10, 20, 30, 255]));
    }

    #[test]
    fn distant_layers_flush_as_separate_runs() {
        let mut manager = atlas(2);
        manager.initialize(10).expect("init");
        manager.flush();
        for slot in [7, 1, 3, 2] {
            manager.mark_dirty(slot);
        }
        assert_eq!(manager.dirty_layers, vec![1..4, 7..8]);
        manager.mark_dirty(5);
        manager.mark_dirty(4);
        assert_eq!(manager.dirty_layers, vec![1..6, 7..8]);
        manager.mark_dirty(6);
        assert_eq!(manager.dirty_layers, vec![1..8]);
        manager.mark_dirty(3);
        assert_eq!(manager.dirty_layers, vec![1..8], "already dirty");
        assert!(manager.flush());
        assert!(!manager.is_dirty());
        assert_eq!(manager.upload_count(), 2);
    }

    #[test]
    fn wrong_sized_pixels_fail_the_slot() {
        let mut manager = atlas(2);
        manager.initialize(2).expect("init");
        let generation = manager.liveness.generation();
        manager
            .completion_tx
            .send(StreamCompletion { image_ref: Arc::from("a"), slot: 1, generation, pixels: Ok(vec![1; 3]) })
            .expect("send");
        let events = manager.poll_completions();
        assert!(matches!(events.as_slice(), [SlotEvent::Failed { slot: 1, .. }]));
        assert_eq!(manager.slot_state(1), Some(SlotLoadState::Failed));
        assert_eq!(manager.sample(1, 0, 0), Some([10, 20, 30, 255]));
    }

    #[test]
    fn disposed_atlas_drops_completions() {
        let mut manager = atlas(2);
        manager.initialize(2).expect("init");
        let generation = manager.liveness.generation();
        manager.dispose();
        manager
            .completion_tx
            .send(StreamCompletion { image_ref: Arc::from("a"), slot: 1, generation, pixels: Ok(vec![9; 16]) })
            .expect("send");
        assert!(manager.poll_completions().is_empty());
        assert!(manager.initialize(2).is_err());
    }
}
