use std::fmt;
use std::sync::Arc;

use crate::instance::{ChunkId, ItemId, ObjectId, OwnerId};

/// What an activation input resolved to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivationTarget {
    Item { id: ItemId, owner: OwnerId },
    NamedObject { id: ObjectId },
}

#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SelectionChanged { previous: Option<ItemId>, current: Option<ItemId> },
    NamedTargetChanged { previous: Option<ObjectId>, current: Option<ObjectId> },
    Activated { target: ActivationTarget },
    SlotLoaded { chunk: ChunkId, slot: u32, image_ref: Arc<str> },
    SlotFailed { chunk: ChunkId, slot: u32, image_ref: Arc<str>, reason: String },
    ChunkBuilt { chunk: ChunkId, items: usize, slots: u32 },
}

struct OptionalId<T>(Option<T>);

impl<T: fmt::Display> fmt::Display for OptionalId<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(id) => write!(f, "{id}"),
            None => f.write_str("none"),
        }
    }
}

impl fmt::Display for EngineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineEvent::SelectionChanged { previous, current } => {
                write!(f, "SelectionChanged {} -> {}", OptionalId(*previous), OptionalId(*current))
            }
            EngineEvent::NamedTargetChanged { previous, current } => {
                write!(f, "NamedTargetChanged {} -> {}", OptionalId(*previous), OptionalId(*current))
            }
            EngineEvent::Activated { target: ActivationTarget::Item { id, owner } } => {
                write!(f, "Activated {id} ({owner})")
            }
            EngineEvent::Activated { target: ActivationTarget::NamedObject { id } } => {
                write!(f, "Activated {id}")
            }
            EngineEvent::SlotLoaded { chunk, slot, image_ref } => {
                write!(f, "SlotLoaded {chunk} slot={slot} image={image_ref}")
            }
            EngineEvent::SlotFailed { chunk, slot, image_ref, reason } => {
                write!(f, "SlotFailed {chunk} slot={slot} image={image_ref}: {reason}")
            }
            EngineEvent::ChunkBuilt { chunk, items, slots } => {
                write!(f, "ChunkBuilt {chunk} items={items} slots={slots}")
            }
        }
    }
}

#[derive(Debug, Default)]
pub struct EventBus {
    events: Vec<EngineEvent>,
}

impl EventBus {
    pub fn push(&mut self, event: EngineEvent) {
        self.events.push(event);
    }

    pub fn drain(&mut self) -> Vec<EngineEvent> {
        self.events.drain(..).collect()
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}
