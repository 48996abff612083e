pub mod allocator;
pub mod manager;
pub mod streaming;

pub use allocator::{partition_by_capacity, AtlasSlot, AtlasSlotAllocator, SlotAssignment, SlotLoadState, FALLBACK_SLOT};
pub use manager::{SlotEvent, TextureAtlasManager, ATLAS_FORMAT};
pub use streaming::{decode_into_slot, AtlasLiveness, DirectoryImageSource, ImageSource, ImageStreamer, ProceduralImageSource};
