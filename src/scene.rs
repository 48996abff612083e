use anyhow::{bail, Context, Result};
use glam::{Mat4, Vec2, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

use crate::instance::{ItemId, ItemRecord, ItemTransform, ObjectId, OwnerId};
use crate::movement::{ObstacleZone, RoomBounds};
use crate::picking::Aabb;
use crate::targeting::NamedObject;

/// Prefix of image refs produced by `SceneLayout::demo`.
pub const DEMO_IMAGE_PREFIX: &str = "covers/cover-";

const SHELF_WIDTH: f32 = 2.4;
const SHELF_DEPTH: f32 = 0.4;
const SHELF_LEVELS: [f32; 4] = [0.55, 0.95, 1.35, 1.75];
const ITEMS_PER_LEVEL: usize = 11;
const ITEM_SPACING: f32 = 0.2;
const SHELF_COLUMNS: usize = 3;
const SHELF_COLUMN_PITCH: f32 = 4.0;
const SHELF_ROW_PITCH: f32 = 2.5;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq)]
pub struct Vec3Data {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl From<Vec3> for Vec3Data {
    fn from(value: Vec3) -> Self {
        Self { x: value.x, y: value.y, z: value.z }
    }
}

impl From<Vec3Data> for Vec3 {
    fn from(value: Vec3Data) -> Self {
        Vec3::new(value.x, value.y, value.z)
    }
}

/// Floor-plane rectangle; `min`/`max` are `[x, z]`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct RectData {
    pub min: [f32; 2],
    pub max: [f32; 2],
}

impl RectData {
    fn around(center_x: f32, center_z: f32, half_x: f32, half_z: f32) -> Self {
        Self { min: [center_x - half_x, center_z - half_z], max: [center_x + half_x, center_z + half_z] }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SpawnData {
    pub position: [f32; 2],
    #[serde(default)]
    pub yaw_degrees: f32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NamedObjectData {
    pub id: ObjectId,
    pub name: String,
    pub center: Vec3Data,
    pub half_extents: Vec3Data,
    /// Also blocks movement.
    #[serde(default = "default_true")]
    pub solid: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemData {
    pub id: ItemId,
    pub owner: OwnerId,
    pub position: Vec3Data,
    #[serde(default)]
    pub yaw_degrees: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_color: Option<[f32; 4]>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hover_offset: Option<f32>,
}

const fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SceneLayout {
    pub room: RectData,
    pub spawn: SpawnData,
    #[serde(default)]
    pub obstacles: Vec<RectData>,
    #[serde(default)]
    pub named_objects: Vec<NamedObjectData>,
    #[serde(default)]
    pub items: Vec<ItemData>,
    /// Offset applied to every item transform.
    #[serde(default)]
    pub item_origin: Vec3Data,
}

impl SceneLayout {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = fs::read(path).with_context(|| format!("Reading scene file {}", path.display()))?;
        let layout = serde_json::from_slice::<SceneLayout>(&bytes)
            .with_context(|| format!("Parsing scene file {}", path.display()))?;
        layout.validate().with_context(|| format!("Validating scene file {}", path.display()))?;
        Ok(layout)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Creating scene directory {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json.as_bytes()).with_context(|| format!("Writing scene file {}", path.display()))?;
        Ok(())
    }

    /// Rejects duplicate item ids and a spawn point inside an obstacle footprint.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::with_capacity(self.items.len());
        for item in &self.items {
            if !seen.insert(item.id) {
                bail!("Duplicate {}", item.id);
            }
        }
        let spawn = self.spawn_position();
        if let Some(zone) = self.obstacle_zones().iter().find(|zone| zone.blocks(spawn, 0.0)) {
            bail!("Spawn point {spawn} is inside obstacle {:?}..{:?}", zone.min, zone.max);
        }
        Ok(())
    }

    /// Rows of shelf units facing +Z with `item_count` items spread across them.
    /// The first `distinct_images` owners carry a cover image; a tenth as many more
    /// owners have none. Deterministic for a given `seed`.
    pub fn demo(seed: u64, item_count: usize, distinct_images: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let per_unit = SHELF_LEVELS.len() * ITEMS_PER_LEVEL;
        let units = item_count.div_ceil(per_unit).max(1);
        let rows = units.div_ceil(SHELF_COLUMNS);
        let first_row_z = -4.0;
        let last_row_z = first_row_z + (rows - 1) as f32 * SHELF_ROW_PITCH;
        let room = RectData { min: [-6.5, first_row_z - 1.5], max: [6.5, last_row_z + 4.0] };

        let mut obstacles = Vec::with_capacity(units + 1);
        let mut unit_centers = Vec::with_capacity(units);
        for unit in 0..units {
            let column = unit % SHELF_COLUMNS;
            let row = unit / SHELF_COLUMNS;
            let cx = (column as f32 - (SHELF_COLUMNS as f32 - 1.0) * 0.5) * SHELF_COLUMN_PITCH;
            let cz = first_row_z + row as f32 * SHELF_ROW_PITCH;
            obstacles.push(RectData::around(cx, cz, SHELF_WIDTH * 0.5, SHELF_DEPTH * 0.5));
            unit_centers.push((cx, cz));
        }

        let counter_center = Vec3::new(-4.5, 0.5, last_row_z + 2.0);
        let counter_half = Vec3::new(1.0, 0.5, 0.3);
        let named_objects = vec![NamedObjectData {
            id: ObjectId(1),
            name: "service counter".to_string(),
            center: counter_center.into(),
            half_extents: counter_half.into(),
            solid: true,
        }];

        let imageless_owners = if distinct_images == 0 { 1 } else { (distinct_images / 10).max(1) };
        let owner_count = distinct_images + imageless_owners;
        let mut palette: Vec<[f32; 4]> = Vec::with_capacity(owner_count);
        for _ in 0..owner_count {
            palette.push([rng.gen_range(0.3..0.9), rng.gen_range(0.3..0.9), rng.gen_range(0.3..0.9), 1.0]);
        }

        let mut items = Vec::with_capacity(item_count);
        for index in 0..item_count {
            let unit = index / per_unit;
            let within = index % per_unit;
            let level = within / ITEMS_PER_LEVEL;
            let slot = within % ITEMS_PER_LEVEL;
            let (cx, cz) = unit_centers[unit];
            let x = cx - (ITEMS_PER_LEVEL as f32 - 1.0) * 0.5 * ITEM_SPACING + slot as f32 * ITEM_SPACING;
            let z = cz + SHELF_DEPTH * 0.5 - 0.04;
            let owner = if index < owner_count { index } else { rng.gen_range(0..owner_count) };
            let image = (owner < distinct_images).then(|| format!("{DEMO_IMAGE_PREFIX}{owner:03}.png"));
            items.push(ItemData {
                id: ItemId(index as u32),
                owner: OwnerId(owner as u32),
                position: Vec3Data { x, y: SHELF_LEVELS[level], z },
                yaw_degrees: rng.gen_range(-4.0..4.0),
                image,
                fallback_color: Some(palette[owner]),
                hover_offset: None,
            });
        }

        Self {
            room,
            spawn: SpawnData { position: [0.0, last_row_z + 3.2], yaw_degrees: 0.0 },
            obstacles,
            named_objects,
            items,
            item_origin: Vec3Data::default(),
        }
    }

    pub fn room_bounds(&self) -> RoomBounds {
        RoomBounds::new(Vec2::from_array(self.room.min), Vec2::from_array(self.room.max))
    }

    pub fn spawn_position(&self) -> Vec2 {
        Vec2::from_array(self.spawn.position)
    }

    pub fn spawn_yaw(&self) -> f32 {
        self.spawn.yaw_degrees.to_radians()
    }

    /// Obstacles plus the floor footprint of every solid named object.
    pub fn obstacle_zones(&self) -> Vec<ObstacleZone> {
        let mut zones: Vec<ObstacleZone> = self
            .obstacles
            .iter()
            .map(|rect| ObstacleZone::new(Vec2::from_array(rect.min), Vec2::from_array(rect.max)))
            .collect();
        for object in self.named_objects.iter().filter(|object| object.solid) {
            let center = Vec3::from(object.center);
            let half = Vec3::from(object.half_extents).abs();
            zones.push(ObstacleZone::new(
                Vec2::new(center.x - half.x, center.z - half.z),
                Vec2::new(center.x + half.x, center.z + half.z),
            ));
        }
        zones
    }

    pub fn named_objects(&self) -> Vec<NamedObject> {
        self.named_objects
            .iter()
            .map(|object| {
                let center = Vec3::from(object.center);
                let half = Vec3::from(object.half_extents).abs();
                NamedObject { id: object.id, name: object.name.clone(), bounds: Aabb::new(center - half, center + half) }
            })
            .collect()
    }

    pub fn item_parent(&self) -> Mat4 {
        Mat4::from_translation(self.item_origin.into())
    }

    pub fn item_records(&self) -> Vec<ItemRecord> {
        self.items
            .iter()
            .map(|item| {
                let transform = ItemTransform::from_yaw(item.position.into(), item.yaw_degrees.to_radians());
                let mut record = ItemRecord::new(item.id, item.owner, transform);
                if let Some(image) = item.image.as_deref() {
                    record = record.with_image(image);
                }
                if let Some(color) = item.fallback_color {
                    record = record.with_fallback_color(color);
                }
                if let Some(offset) = item.hover_offset {
                    record = record.with_hover_offset(offset);
                }
                record
            })
            .collect()
    }

    pub fn distinct_images(&self) -> usize {
        self.items.iter().filter_map(|item| item.image.as_deref()).collect::<HashSet<_>>().len()
    }
}
