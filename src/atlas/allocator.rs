use anyhow::{bail, Result};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::instance::ItemRecord;

/// Slot reserved for items without imagery and for failed loads.
pub const FALLBACK_SLOT: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlotLoadState {
    Empty,
    Loading,
    Loaded,
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AtlasSlot {
    pub slot_index: u32,
    /// Array layer holding this slot's pixels.
    pub layer: u32,
    pub image_ref: Option<Arc<str>>,
    pub ref_count: u32,
    pub load_state: SlotLoadState,
}

impl AtlasSlot {
    fn new(slot_index: u32, image_ref: Option<Arc<str>>) -> Self {
        Self { slot_index, layer: slot_index, image_ref, ref_count: 0, load_state: SlotLoadState::Empty }
    }
}

/// Result of mapping an ordered item list onto atlas slots.
#[derive(Debug, Clone)]
pub struct SlotAssignment {
    /// Slot index per item, in input order.
    pub item_slots: Vec<u32>,
    pub slots: Vec<AtlasSlot>,
    /// Reverse map used to issue streaming requests.
    pub image_slots: HashMap<Arc<str>, u32>,
}

impl SlotAssignment {
    pub fn slot_count(&self) -> u32 {
        self.slots.len() as u32
    }

    /// Slots referenced by at least one item.
    pub fn slots_used(&self) -> usize {
        self.slots.iter().filter(|slot| slot.ref_count > 0).count()
    }

    /// Streaming work in slot order: every slot that carries an image.
    pub fn stream_requests(&self) -> Vec<(Arc<str>, u32)> {
        self.slots
            .iter()
            .filter_map(|slot| slot.image_ref.as_ref().map(|image| (Arc::clone(image), slot.slot_index)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AtlasSlotAllocator {
    capacity: u32,
}

impl AtlasSlotAllocator {
    pub fn new(capacity: u32) -> Self {
        Self { capacity }
    }

    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Number of slots `items` would need: one per distinct image plus the fallback slot.
    pub fn required_slots(items: &[ItemRecord]) -> u32 {
        let distinct: HashSet<&str> = items.iter().filter_map(|item| item.image_ref.as_deref()).collect();
        distinct.len() as u32 + 1
    }

    pub fn fits(&self, items: &[ItemRecord]) -> bool {
        Self::required_slots(items) <= self.capacity
    }

    pub fn allocate(&self, items: &[ItemRecord]) -> Result<SlotAssignment> {
        let required = Self::required_slots(items);
        if required > self.capacity {
            bail!(
                "{} distinct images need {} atlas slots but capacity is {}; partition the items first",
                required - 1,
                required,
                self.capacity
            );
        }
        let mut slots = vec![AtlasSlot::new(FALLBACK_SLOT, None)];
        let mut image_slots: HashMap<Arc<str>, u32> = HashMap::new();
        let mut item_slots = Vec::with_capacity(items.len());
        for item in items {
            let slot_index = match item.image_ref.as_ref() {
                None => FALLBACK_SLOT,
                Some(image) => match image_slots.get(image) {
                    Some(&existing) => existing,
                    None => {
                        let next = slots.len() as u32;
                        slots.push(AtlasSlot::new(next, Some(Arc::clone(image))));
                        image_slots.insert(Arc::clone(image), next);
                        next
                    }
                },
            };
            slots[slot_index as usize].ref_count += 1;
            item_slots.push(slot_index);
        }
        Ok(SlotAssignment { item_slots, slots, image_slots })
    }
}

/// Splits an item population into groups that each fit one atlas of `capacity` slots.
///
/// Whole image groups move together so an image is never duplicated across chunks.
/// Items without imagery stay in the first group. Input order is preserved within
/// each group.
pub fn partition_by_capacity(items: Vec<ItemRecord>, capacity: u32) -> Result<Vec<Vec<ItemRecord>>> {
    if items.is_empty() {
        return Ok(Vec::new());
    }
    let per_chunk_images = capacity.saturating_sub(1) as usize;
    let has_images = items.iter().any(|item| item.image_ref.is_some());
    if has_images && per_chunk_images == 0 {
        bail!("Atlas capacity {capacity} leaves no room for images beside the fallback slot");
    }

    let mut image_group: HashMap<Arc<str>, usize> = HashMap::new();
    let mut distinct = 0usize;
    for item in &items {
        if let Some(image) = item.image_ref.as_ref() {
            if !image_group.contains_key(image) {
                image_group.insert(Arc::clone(image), distinct / per_chunk_images);
                distinct += 1;
            }
        }
    }
    let group_count = if distinct == 0 { 1 } else { (distinct + per_chunk_images - 1) / per_chunk_images };
    let mut groups: Vec<Vec<ItemRecord>> = (0..group_count).map(|_| Vec::new()).collect();
    for item in items {
        let group = match item.image_ref.as_ref() {
            Some(image) => image_group.get(image).copied().unwrap_or(0),
            None => 0,
        };
        groups[group].push(item);
    }
    Ok(groups)
}
