use shelfwalk::config::AppConfig;
use shelfwalk::instance::ItemId;
use shelfwalk::scene::{RectData, SceneLayout, SpawnData, Vec3Data};
use std::io::Write;
use tempfile::{tempdir, NamedTempFile};

#[test]
fn partial_config_keeps_defaults_for_missing_fields() {
    let mut temp = NamedTempFile::new().expect("temp config");
    write!(temp, r#"{{"window":{{"width":800}},"selection":{{"deselect_delay":0.5}}}}"#).expect("write config");

    let config = AppConfig::load(temp.path()).expect("load");
    let defaults = AppConfig::default();
    assert_eq!(config.window.width, 800);
    assert_eq!(config.window.height, defaults.window.height);
    assert_eq!(config.selection.deselect_delay, 0.5);
    assert_eq!(config.selection.select_delay, defaults.selection.select_delay);
    assert_eq!(config.atlas.capacity, defaults.atlas.capacity);
    assert!(config.scene.is_none());
}

#[test]
fn missing_config_falls_back_to_defaults() {
    let dir = tempdir().expect("temp dir");
    let config = AppConfig::load_or_default(dir.path().join("absent.json"));
    assert_eq!(config.atlas.slot_size, AppConfig::default().atlas.slot_size);
}

#[test]
fn shipped_config_parses() {
    let config = AppConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/app.json")).expect("config/app.json");
    assert!(config.atlas.capacity >= 2);
    assert!(config.selection.deselect_delay >= config.selection.select_delay);
}

#[test]
fn capacity_clamps_to_device_limit() {
    let mut config = AppConfig::default();
    config.atlas.capacity = 4096;
    assert_eq!(config.clamp_atlas_capacity(256), 256);
    assert_eq!(config.clamp_atlas_capacity(2048), 256, "never raised");
}

#[test]
fn scene_round_trips_through_disk() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("scenes/demo.json");
    let layout = SceneLayout::demo(5, 90, 12);
    layout.save(&path).expect("save");
    let loaded = SceneLayout::load(&path).expect("load");
    assert_eq!(loaded, layout);
    assert_eq!(loaded.distinct_images(), 12);
    assert_eq!(loaded.item_records().len(), 90);
}

#[test]
fn duplicate_item_ids_are_rejected() {
    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("dupes.json");
    let mut layout = SceneLayout::demo(5, 20, 4);
    layout.items[3].id = ItemId(0);
    layout.save(&path).expect("save");
    let err = SceneLayout::load(&path).expect_err("duplicate ids");
    assert!(format!("{err:#}").contains("Duplicate"));
}

#[test]
fn spawn_inside_obstacle_is_rejected() {
    let layout = SceneLayout {
        room: RectData { min: [-4.0, -4.0], max: [4.0, 4.0] },
        spawn: SpawnData { position: [0.0, 0.0], yaw_degrees: 0.0 },
        obstacles: vec![RectData { min: [-1.0, -1.0], max: [1.0, 1.0] }],
        named_objects: Vec::new(),
        items: Vec::new(),
        item_origin: Vec3Data::default(),
    };
    let err = layout.validate().expect_err("spawn inside obstacle");
    assert!(format!("{err:#}").contains("Spawn point"));

    let dir = tempdir().expect("temp dir");
    let path = dir.path().join("boxed_in.json");
    layout.save(&path).expect("save");
    assert!(SceneLayout::load(&path).is_err());

    let clear = SceneLayout { spawn: SpawnData { position: [0.0, 2.5], yaw_degrees: 0.0 }, ..layout };
    clear.validate().expect("spawn clear of obstacle");
}
