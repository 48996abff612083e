use glam::{Mat4, Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

macro_rules! id_newtype {
    ($name:ident, $label:literal) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($label, "#{}"), self.0)
            }
        }
    };
}

id_newtype!(ItemId, "item");
id_newtype!(OwnerId, "owner");
id_newtype!(ObjectId, "object");
id_newtype!(ChunkId, "chunk");

/// World placement of an item. Immutable once the item is placed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ItemTransform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl ItemTransform {
    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }

    pub fn from_yaw(position: Vec3, yaw_radians: f32) -> Self {
        Self { position, rotation: Quat::from_rotation_y(yaw_radians) }
    }

    /// Rigid placement matrix (no scale).
    pub fn matrix(&self) -> Mat4 {
        Mat4::from_rotation_translation(self.rotation.normalize(), self.position)
    }
}

impl Default for ItemTransform {
    fn default() -> Self {
        Self { position: Vec3::ZERO, rotation: Quat::IDENTITY }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ItemRecord {
    pub id: ItemId,
    pub owner_id: OwnerId,
    pub transform: ItemTransform,
    /// Identity used to deduplicate imagery; items without one use the fallback slot.
    pub image_ref: Option<Arc<str>>,
    pub fallback_color: [f32; 4],
    /// Signed distance along the item's local +Z the item travels while selected.
    pub hover_offset: f32,
}

impl ItemRecord {
    pub fn new(id: ItemId, owner_id: OwnerId, transform: ItemTransform) -> Self {
        Self {
            id,
            owner_id,
            transform,
            image_ref: None,
            fallback_color: [0.55, 0.55, 0.58, 1.0],
            hover_offset: 0.04,
        }
    }

    pub fn with_image(mut self, image_ref: impl Into<Arc<str>>) -> Self {
        self.image_ref = Some(image_ref.into());
        self
    }

    pub fn with_fallback_color(mut self, color: [f32; 4]) -> Self {
        self.fallback_color = color;
        self
    }

    pub fn with_hover_offset(mut self, offset: f32) -> Self {
        self.hover_offset = offset;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_display_with_kind_prefix() {
        assert_eq!(ItemId(7).to_string(), "item#7");
        assert_eq!(OwnerId(3).to_string(), "owner#3");
        assert_eq!(ObjectId(1).to_string(), "object#1");
    }

    #[test]
    fn yaw_transform_rotates_local_z() {
        let transform = ItemTransform::from_yaw(Vec3::new(1.0, 0.0, 0.0), std::f32::consts::FRAC_PI_2);
        let facing = transform.matrix().transform_vector3(Vec3::Z);
        assert!((facing - Vec3::X).length() < 1e-5, "facing {facing:?}");
    }
}
