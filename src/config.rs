use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub vsync: bool,
    pub fullscreen: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AtlasConfig {
    /// Upper bound on slots per atlas; clamped to the device layer limit at runtime.
    #[serde(default = "AtlasConfig::default_capacity")]
    pub capacity: u32,
    #[serde(default = "AtlasConfig::default_slot_size")]
    pub slot_size: u32,
    #[serde(default = "AtlasConfig::default_fallback_color")]
    pub fallback_color: [u8; 4],
    #[serde(default = "AtlasConfig::default_streams_per_frame")]
    pub streams_per_frame: u32,
    #[serde(default = "AtlasConfig::default_worker_threads")]
    pub worker_threads: usize,
    #[serde(default = "AtlasConfig::default_queue_depth")]
    pub queue_depth: usize,
    /// Root directory image refs are resolved against.
    #[serde(default = "AtlasConfig::default_image_root")]
    pub image_root: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectionConfig {
    #[serde(default = "SelectionConfig::default_select_delay")]
    pub select_delay: f32,
    #[serde(default = "SelectionConfig::default_deselect_delay")]
    pub deselect_delay: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TargetingConfig {
    #[serde(default = "TargetingConfig::default_interval_seconds")]
    pub interval_seconds: f32,
    #[serde(default = "TargetingConfig::default_max_range")]
    pub max_range: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnimationConfig {
    #[serde(default = "AnimationConfig::default_hover_speed")]
    pub hover_speed: f32,
    #[serde(default = "AnimationConfig::default_tint_speed")]
    pub tint_speed: f32,
    #[serde(default = "AnimationConfig::default_selection_tint")]
    pub selection_tint: [f32; 3],
    #[serde(default = "AnimationConfig::default_rented_tint")]
    pub rented_tint: [f32; 3],
    #[serde(default = "AnimationConfig::default_settle_seconds")]
    pub settle_seconds: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MovementConfig {
    #[serde(default = "MovementConfig::default_acceleration")]
    pub acceleration: f32,
    #[serde(default = "MovementConfig::default_max_speed")]
    pub max_speed: f32,
    #[serde(default = "MovementConfig::default_sprint_multiplier")]
    pub sprint_multiplier: f32,
    /// Fraction of velocity kept per 60 Hz frame.
    #[serde(default = "MovementConfig::default_friction")]
    pub friction: f32,
    #[serde(default = "MovementConfig::default_collision_margin")]
    pub collision_margin: f32,
    #[serde(default = "MovementConfig::default_eye_height")]
    pub eye_height: f32,
    #[serde(default = "MovementConfig::default_look_sensitivity")]
    pub look_sensitivity: f32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ItemsConfig {
    #[serde(default = "ItemsConfig::default_half_extents")]
    pub half_extents: [f32; 3],
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default)]
    pub atlas: AtlasConfig,
    #[serde(default)]
    pub selection: SelectionConfig,
    #[serde(default)]
    pub targeting: TargetingConfig,
    #[serde(default)]
    pub animation: AnimationConfig,
    #[serde(default)]
    pub movement: MovementConfig,
    #[serde(default)]
    pub items: ItemsConfig,
    /// Scene layout file; the generated demo shelf is used when absent.
    #[serde(default)]
    pub scene: Option<PathBuf>,
}

#[derive(Debug, Clone, Default)]
pub struct AppConfigOverrides {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub vsync: Option<bool>,
    pub scene: Option<PathBuf>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self { title: "Shelfwalk".to_string(), width: 1280, height: 720, vsync: true, fullscreen: false }
    }
}

impl AtlasConfig {
    const fn default_capacity() -> u32 {
        2048
    }

    const fn default_slot_size() -> u32 {
        128
    }

    const fn default_fallback_color() -> [u8; 4] {
        [96, 96, 104, 255]
    }

    const fn default_streams_per_frame() -> u32 {
        3
    }

    const fn default_worker_threads() -> usize {
        2
    }

    const fn default_queue_depth() -> usize {
        64
    }

    fn default_image_root() -> PathBuf {
        PathBuf::from("assets/images")
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            capacity: Self::default_capacity(),
            slot_size: Self::default_slot_size(),
            fallback_color: Self::default_fallback_color(),
            streams_per_frame: Self::default_streams_per_frame(),
            worker_threads: Self::default_worker_threads(),
            queue_depth: Self::default_queue_depth(),
            image_root: Self::default_image_root(),
        }
    }
}

impl SelectionConfig {
    const fn default_select_delay() -> f32 {
        0.05
    }

    const fn default_deselect_delay() -> f32 {
        0.3
    }
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self { select_delay: Self::default_select_delay(), deselect_delay: Self::default_deselect_delay() }
    }
}

impl TargetingConfig {
    const fn default_interval_seconds() -> f32 {
        0.05
    }

    const fn default_max_range() -> f32 {
        3.0
    }
}

impl Default for TargetingConfig {
    fn default() -> Self {
        Self { interval_seconds: Self::default_interval_seconds(), max_range: Self::default_max_range() }
    }
}

impl AnimationConfig {
    const fn default_hover_speed() -> f32 {
        12.5
    }

    const fn default_tint_speed() -> f32 {
        8.0
    }

    const fn default_selection_tint() -> [f32; 3] {
        [0.18, 0.16, 0.05]
    }

    const fn default_rented_tint() -> [f32; 3] {
        [0.02, 0.12, 0.25]
    }

    const fn default_settle_seconds() -> f32 {
        1.0
    }
}

impl Default for AnimationConfig {
    fn default() -> Self {
        Self {
            hover_speed: Self::default_hover_speed(),
            tint_speed: Self::default_tint_speed(),
            selection_tint: Self::default_selection_tint(),
            rented_tint: Self::default_rented_tint(),
            settle_seconds: Self::default_settle_seconds(),
        }
    }
}

impl MovementConfig {
    const fn default_acceleration() -> f32 {
        60.0
    }

    const fn default_max_speed() -> f32 {
        2.6
    }

    const fn default_sprint_multiplier() -> f32 {
        1.8
    }

    const fn default_friction() -> f32 {
        0.82
    }

    const fn default_collision_margin() -> f32 {
        0.3
    }

    const fn default_eye_height() -> f32 {
        1.6
    }

    const fn default_look_sensitivity() -> f32 {
        0.0025
    }
}

impl Default for MovementConfig {
    fn default() -> Self {
        Self {
            acceleration: Self::default_acceleration(),
            max_speed: Self::default_max_speed(),
            sprint_multiplier: Self::default_sprint_multiplier(),
            friction: Self::default_friction(),
            collision_margin: Self::default_collision_margin(),
            eye_height: Self::default_eye_height(),
            look_sensitivity: Self::default_look_sensitivity(),
        }
    }
}

impl ItemsConfig {
    const fn default_half_extents() -> [f32; 3] {
        [0.08, 0.11, 0.02]
    }
}

impl Default for ItemsConfig {
    fn default() -> Self {
        Self { half_extents: Self::default_half_extents() }
    }
}

impl AppConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes =
            fs::read(path).with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        Ok(cfg)
    }

    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        match Self::load(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                log::warn!("[config] {err:#}. Falling back to defaults.");
                Self::default()
            }
        }
    }

    pub fn apply_overrides(&mut self, overrides: &AppConfigOverrides) {
        if let Some(width) = overrides.width {
            self.window.width = width;
        }
        if let Some(height) = overrides.height {
            self.window.height = height;
        }
        if let Some(vsync) = overrides.vsync {
            self.window.vsync = vsync;
        }
        if let Some(scene) = overrides.scene.as_ref() {
            self.scene = Some(scene.clone());
        }
    }

    /// Caps the atlas capacity at what the device can address. Returns the new capacity.
    pub fn clamp_atlas_capacity(&mut self, max_texture_array_layers: u32) -> u32 {
        let limit = max_texture_array_layers.max(2);
        if self.atlas.capacity > limit {
            log::warn!(
                "[config] atlas capacity {} exceeds device limit {limit}; clamping",
                self.atlas.capacity
            );
            self.atlas.capacity = limit;
        }
        self.atlas.capacity
    }
}

impl AppConfigOverrides {
    pub fn is_empty(&self) -> bool {
        self.width.is_none() && self.height.is_none() && self.vsync.is_none() && self.scene.is_none()
    }

    pub fn applied_fields(&self) -> Vec<&'static str> {
        let mut fields = Vec::new();
        if self.width.is_some() {
            fields.push("width");
        }
        if self.height.is_some() {
            fields.push("height");
        }
        if self.vsync.is_some() {
            fields.push("vsync");
        }
        if self.scene.is_some() {
            fields.push("scene");
        }
        fields
    }
}
