use anyhow::{anyhow, Result};
use glam::Vec2;
use image::{ImageFormat, Rgba, RgbaImage};
use shelfwalk::atlas::{ImageSource, ProceduralImageSource};
use shelfwalk::config::AppConfig;
use shelfwalk::events::{ActivationTarget, EngineEvent};
use shelfwalk::instance::{ItemId, ObjectId, OwnerId};
use shelfwalk::scene::{ItemData, NamedObjectData, RectData, SceneLayout, SpawnData, Vec3Data};
use shelfwalk::{FrameIntent, ShowroomEngine, StaticAvailability};
use std::io::Cursor;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DT: f32 = 1.0 / 60.0;

struct SingleImage(Vec<u8>);

impl ImageSource for SingleImage {
    fn fetch_image_bytes(&self, image_ref: &str) -> Result<Vec<u8>> {
        if image_ref == "red.png" {
            Ok(self.0.clone())
        } else {
            Err(anyhow!("no image '{image_ref}'"))
        }
    }
}

fn red_png() -> Vec<u8> {
    let img = RgbaImage::from_pixel(8, 8, Rgba([255, 0, 0, 255]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png).expect("encode png");
    bytes.into_inner()
}

fn item(id: u32, owner: u32, x: f32, image: &str) -> ItemData {
    ItemData {
        id: ItemId(id),
        owner: OwnerId(owner),
        position: Vec3Data { x, y: 1.6, z: 0.5 },
        yaw_degrees: 0.0,
        image: Some(image.to_string()),
        fallback_color: None,
        hover_offset: None,
    }
}

/// Viewer at the origin of +Z looking down -Z at item 1, a second item off to the
/// side and a counter further right.
fn small_room() -> SceneLayout {
    SceneLayout {
        room: RectData { min: [-5.0, -5.0], max: [5.0, 5.0] },
        spawn: SpawnData { position: [0.0, 2.0], yaw_degrees: 0.0 },
        obstacles: Vec::new(),
        named_objects: vec![NamedObjectData {
            id: ObjectId(9),
            name: "counter".to_string(),
            center: Vec3Data { x: 3.0, y: 1.0, z: 0.0 },
            half_extents: Vec3Data { x: 0.5, y: 1.0, z: 0.3 },
            solid: true,
        }],
        items: vec![item(1, 10, 0.0, "red.png"), item(2, 20, 1.5, "missing.png")],
        item_origin: Vec3Data::default(),
    }
}

fn small_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.atlas.slot_size = 4;
    config
}

fn run_frames(engine: &mut ShowroomEngine, frames: usize) {
    for _ in 0..frames {
        engine.update(DT, &FrameIntent::default());
    }
}

#[test]
fn headless_frames_settle_streams_and_select() {
    let availability = Arc::new(StaticAvailability::new());
    let mut engine =
        ShowroomEngine::new(&small_config(), &small_room(), Arc::new(SingleImage(red_png())), availability.clone())
            .expect("engine");
    assert_eq!(engine.chunks().len(), 1);

    let report = engine.update(DT, &FrameIntent::default());
    assert_eq!(report.draw_calls, 1);
    assert!(report.targeting_ran);
    assert_eq!(engine.stable_selection(), Some(ItemId(1)), "neutral filter selects on first tick");
    let shared = engine.shared_targeting();
    let reader = std::thread::spawn(move || (shared.version(), shared.stable_selection()));
    let (version, seen) = reader.join().expect("reader thread");
    assert!(version >= 1);
    assert_eq!(seen, Some(ItemId(1)));

    let mut events = engine.drain_events();
    let deadline = Instant::now() + Duration::from_secs(10);
    while !engine.chunks()[0].atlas().is_settled() {
        assert!(Instant::now() < deadline, "streams did not settle");
        engine.update(DT, &FrameIntent::default());
        events.extend(engine.drain_events());
        std::thread::sleep(Duration::from_millis(1));
    }
    assert!(events.iter().any(|event| matches!(event, EngineEvent::ChunkBuilt { items: 2, .. })));
    assert!(events.iter().any(|event| matches!(event, EngineEvent::SelectionChanged { current: Some(ItemId(1)), .. })));
    assert!(events.iter().any(|event| matches!(event, EngineEvent::SlotLoaded { .. })));
    assert!(events.iter().any(|event| matches!(event, EngineEvent::SlotFailed { .. })));

    run_frames(&mut engine, 90);
    let (current, target) = engine.animated_state(ItemId(1)).expect("item 1");
    assert!(target.hover_z > 0.0);
    assert!((current.hover_z - target.hover_z).abs() < 1e-3, "hover converged: {current:?}");
    let (_, other) = engine.animated_state(ItemId(2)).expect("item 2");
    assert_eq!(other.hover_z, 0.0);
}

#[test]
fn availability_changes_reach_targets() {
    let availability = Arc::new(StaticAvailability::new());
    let config = small_config();
    let mut engine =
        ShowroomEngine::new(&config, &small_room(), Arc::new(ProceduralImageSource::default()), availability.clone())
            .expect("engine");
    engine.update(DT, &FrameIntent::default());

    availability.set_unavailable(OwnerId(20), true);
    let report = engine.update(DT, &FrameIntent::default());
    assert!(report.target_writes >= 1);
    assert_eq!(engine.animated_state(ItemId(2)).expect("item 2").1.unavailable, 1.0);

    availability.toggle_held(OwnerId(10));
    engine.update(DT, &FrameIntent::default());
    let (_, target) = engine.animated_state(ItemId(1)).expect("item 1");
    assert_eq!(&target.emissive[..3], &config.animation.rented_tint[..]);
    assert_eq!(target.unavailable, 0.0);
}

#[test]
fn activation_prefers_item_then_named_object() {
    let mut engine = ShowroomEngine::new(
        &small_config(),
        &small_room(),
        Arc::new(ProceduralImageSource::default()),
        Arc::new(StaticAvailability::new()),
    )
    .expect("engine");
    let activate = FrameIntent { activate: true, ..FrameIntent::default() };
    let report = engine.update(DT, &activate);
    assert_eq!(report.activated, Some(ActivationTarget::Item { id: ItemId(1), owner: OwnerId(10) }));

    assert!(engine.place_viewer(Vec2::new(3.0, 2.0), 0.0, 0.0));
    run_frames(&mut engine, 10);
    assert_eq!(engine.stable_selection(), None);
    assert_eq!(engine.targeted_named_object(), Some(ObjectId(9)));
    let report = engine.update(DT, &activate);
    assert_eq!(report.activated, Some(ActivationTarget::NamedObject { id: ObjectId(9) }));
    assert!(engine.drain_events().iter().any(|event| matches!(event, EngineEvent::Activated { .. })));
}

#[test]
fn viewer_cannot_be_placed_inside_counter() {
    let mut engine = ShowroomEngine::new(
        &small_config(),
        &small_room(),
        Arc::new(ProceduralImageSource::default()),
        Arc::new(StaticAvailability::new()),
    )
    .expect("engine");
    assert!(!engine.place_viewer(Vec2::new(3.0, 0.0), 0.0, 0.0));
    assert_eq!(engine.movement().position(), Vec2::new(0.0, 2.0));
}
