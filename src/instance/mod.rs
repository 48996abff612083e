pub mod animated_state;
pub mod chunk;
pub mod gpu;
pub mod item;

pub use animated_state::{approach, AnimatedStateGpu, AnimationParamsGpu, AnimationSpeeds, PerInstanceAnimatedState};
pub use chunk::{build_chunks, ChunkBuildSettings, ChunkHit, InstanceChunk};
pub use gpu::{ChunkGpu, ChunkLayouts, ItemInstanceGpu, ItemVertex};
pub use item::{ChunkId, ItemId, ItemRecord, ItemTransform, ObjectId, OwnerId};
