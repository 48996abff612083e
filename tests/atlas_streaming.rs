use anyhow::{anyhow, Result};
use image::{ImageFormat, Rgba, RgbaImage};
use shelfwalk::atlas::{ImageSource, ImageStreamer, SlotEvent, SlotLoadState, TextureAtlasManager};
use shelfwalk::config::AtlasConfig;
use std::collections::HashMap;
use std::io::Cursor;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const FALLBACK: [u8; 4] = [9, 9, 9, 255];

struct MemorySource {
    images: HashMap<String, Vec<u8>>,
    delay: Duration,
}

impl ImageSource for MemorySource {
    fn fetch_image_bytes(&self, image_ref: &str) -> Result<Vec<u8>> {
        thread::sleep(self.delay);
        self.images.get(image_ref).cloned().ok_or_else(|| anyhow!("no image '{image_ref}'"))
    }
}

fn solid_png(color: [u8; 4]) -> Vec<u8> {
    let img = RgbaImage::from_pixel(16, 24, Rgba(color));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png).expect("encode png");
    bytes.into_inner()
}

fn source(delay: Duration) -> Arc<MemorySource> {
    let mut images = HashMap::new();
    images.insert("red.png".to_string(), solid_png([255, 0, 0, 255]));
    images.insert("green.png".to_string(), solid_png([0, 255, 0, 255]));
    images.insert("broken.png".to_string(), b"not an image".to_vec());
    Arc::new(MemorySource { images, delay })
}

fn atlas() -> TextureAtlasManager {
    let config = AtlasConfig { slot_size: 8, fallback_color: FALLBACK, ..AtlasConfig::default() };
    TextureAtlasManager::new("stream test", &config)
}

fn pump_until_settled(manager: &mut TextureAtlasManager, streamer: &ImageStreamer) -> Vec<SlotEvent> {
    let deadline = Instant::now() + Duration::from_secs(10);
    let mut events = Vec::new();
    while !manager.is_settled() {
        assert!(Instant::now() < deadline, "streams did not settle");
        manager.issue_pending(streamer, 2);
        events.extend(manager.poll_completions());
        thread::sleep(Duration::from_millis(2));
    }
    events
}

#[test]
fn streams_land_in_their_slots() {
    let streamer = ImageStreamer::new(source(Duration::ZERO), 2, 8).expect("workers");
    let mut manager = atlas();
    manager.initialize(5).expect("init");
    manager.flush();
    manager.queue_stream(Arc::from("red.png"), 1);
    manager.queue_stream(Arc::from("green.png"), 2);
    manager.queue_stream(Arc::from("broken.png"), 3);
    manager.queue_stream(Arc::from("missing.png"), 4);

    let events = pump_until_settled(&mut manager, &streamer);
    assert_eq!(events.len(), 4);
    assert_eq!(manager.slot_state(1), Some(SlotLoadState::Loaded));
    assert_eq!(manager.slot_state(3), Some(SlotLoadState::Failed));
    assert_eq!(manager.slot_state(4), Some(SlotLoadState::Failed));
    assert_eq!(manager.sample(1, 3, 3), Some([255, 0, 0, 255]));
    assert_eq!(manager.sample(2, 0, 7), Some([0, 255, 0, 255]));
    assert_eq!(manager.sample(3, 4, 4), Some(FALLBACK), "failed decode keeps fallback");
    assert_eq!(manager.sample(4, 4, 4), Some(FALLBACK));
    assert_eq!(manager.sample(0, 0, 0), Some(FALLBACK));

    assert!(manager.flush());
    assert!(!manager.flush());
}

#[test]
fn frame_budget_limits_issued_streams() {
    let streamer = ImageStreamer::new(source(Duration::from_millis(20)), 1, 16).expect("workers");
    let mut manager = atlas();
    manager.initialize(4).expect("init");
    for slot in 1..4 {
        manager.queue_stream(Arc::from("red.png"), slot);
    }
    assert_eq!(manager.issue_pending(&streamer, 1), 1);
    assert_eq!(manager.pending_streams(), 2);
    assert_eq!(manager.in_flight(), 1);
}

#[test]
fn reinitialize_drops_inflight_streams() {
    let streamer = ImageStreamer::new(source(Duration::from_millis(40)), 1, 8).expect("workers");
    let mut manager = atlas();
    manager.initialize(2).expect("init");
    manager.queue_stream(Arc::from("red.png"), 1);
    assert_eq!(manager.issue_pending(&streamer, 4), 1);
    manager.initialize(2).expect("reinit");
    manager.flush();

    thread::sleep(Duration::from_millis(200));
    assert!(manager.poll_completions().is_empty());
    assert_eq!(manager.sample(1, 0, 0), Some(FALLBACK));
    assert!(!manager.is_dirty());
}

#[test]
fn disposed_atlas_ignores_completions() {
    let streamer = ImageStreamer::new(source(Duration::from_millis(40)), 1, 8).expect("workers");
    let mut manager = atlas();
    manager.initialize(2).expect("init");
    manager.queue_stream(Arc::from("green.png"), 1);
    manager.issue_pending(&streamer, 1);
    manager.dispose();

    thread::sleep(Duration::from_millis(200));
    assert!(manager.poll_completions().is_empty());
    assert!(manager.is_disposed());
    assert!(manager.initialize(2).is_err());
}
