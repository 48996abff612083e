use anyhow::{anyhow, Context, Result};
use image::imageops::FilterType;
use image::{ImageFormat, Rgba, RgbaImage};
use std::collections::hash_map::DefaultHasher;
use std::fs;
use std::hash::{Hash, Hasher};
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

/// Supplies encoded image bytes for an image identity (URL, path, catalog key).
pub trait ImageSource: Send + Sync {
    fn fetch_image_bytes(&self, image_ref: &str) -> Result<Vec<u8>>;
}

/// Resolves image refs as paths relative to a root directory.
pub struct DirectoryImageSource {
    root: PathBuf,
}

impl DirectoryImageSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn resolve(&self, image_ref: &str) -> PathBuf {
        let path = Path::new(image_ref);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }
}

impl ImageSource for DirectoryImageSource {
    fn fetch_image_bytes(&self, image_ref: &str) -> Result<Vec<u8>> {
        let path = self.resolve(image_ref);
        fs::read(&path).with_context(|| format!("Reading image {}", path.display()))
    }
}

/// Synthesises a distinct cover for every ref: two-tone gradient with a title band.
/// Serves scenes whose imagery is not on disk.
pub struct ProceduralImageSource {
    width: u32,
    height: u32,
}

impl ProceduralImageSource {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width: width.max(1), height: height.max(1) }
    }
}

impl Default for ProceduralImageSource {
    fn default() -> Self {
        Self::new(96, 128)
    }
}

impl ImageSource for ProceduralImageSource {
    fn fetch_image_bytes(&self, image_ref: &str) -> Result<Vec<u8>> {
        let mut hasher = DefaultHasher::new();
        image_ref.hash(&mut hasher);
        let seed = hasher.finish().to_le_bytes();
        let top = [seed[0], seed[1], seed[2]];
        let bottom = [seed[3], seed[4], seed[5]];
        let band_row = self.height / 4 + u32::from(seed[6]) % (self.height / 2).max(1);
        let band_height = (self.height / 10).max(1);
        let height = self.height;
        let cover = RgbaImage::from_fn(self.width, self.height, |_, y| {
            if y >= band_row && y < band_row + band_height {
                return Rgba([240, 236, 228, 255]);
            }
            let t = y as f32 / (height.max(2) - 1) as f32;
            let channel = |i: usize| (top[i] as f32 * (1.0 - t) + bottom[i] as f32 * t) as u8;
            Rgba([channel(0), channel(1), channel(2), 255])
        });
        let mut bytes = Cursor::new(Vec::new());
        cover
            .write_to(&mut bytes, ImageFormat::Png)
            .with_context(|| format!("Encoding procedural cover '{image_ref}'"))?;
        Ok(bytes.into_inner())
    }
}

/// Shared between an atlas and the jobs it has in flight.
///
/// Workers consult it to skip work for a disposed or re-initialised atlas; the atlas
/// consults it again before applying a completion.
#[derive(Debug, Default)]
pub struct AtlasLiveness {
    disposed: AtomicBool,
    generation: AtomicU64,
}

impl AtlasLiveness {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Invalidates every job issued under the previous generation.
    pub fn advance(&self) -> u64 {
        self.generation.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }

    pub fn accepts(&self, generation: u64) -> bool {
        !self.is_disposed() && self.generation() == generation
    }
}

pub struct StreamJob {
    pub image_ref: Arc<str>,
    pub slot: u32,
    pub generation: u64,
    pub slot_size: u32,
    pub liveness: Arc<AtlasLiveness>,
    pub reply: mpsc::Sender<StreamCompletion>,
}

pub struct StreamCompletion {
    pub image_ref: Arc<str>,
    pub slot: u32,
    pub generation: u64,
    /// RGBA8 pixels, `slot_size * slot_size * 4` bytes, bottom row first.
    pub pixels: Result<Vec<u8>>,
}

/// Fixed pool of fetch/decode threads fed through bounded per-worker queues.
pub struct ImageStreamer {
    senders: Vec<mpsc::SyncSender<StreamJob>>,
    next_sender: AtomicUsize,
}

impl ImageStreamer {
    pub fn new(source: Arc<dyn ImageSource>, worker_count: usize, queue_depth: usize) -> Result<Self> {
        let worker_count = worker_count.max(1);
        let mut senders = Vec::with_capacity(worker_count);
        for index in 0..worker_count {
            let (tx, rx) = mpsc::sync_channel::<StreamJob>(queue_depth.max(1));
            let worker_source = Arc::clone(&source);
            thread::Builder::new()
                .name(format!("image-stream-{index}"))
                .spawn(move || {
                    while let Ok(job) = rx.recv() {
                        run_stream_job(worker_source.as_ref(), job);
                    }
                })
                .map_err(|err| anyhow!("Failed to spawn image stream worker {index}: {err}"))?;
            senders.push(tx);
        }
        Ok(Self { senders, next_sender: AtomicUsize::new(0) })
    }

    pub fn worker_count(&self) -> usize {
        self.senders.len()
    }

    /// Hands the job to the first worker with queue space. A saturated pool returns the
    /// job so the caller can retry on a later frame.
    pub fn submit(&self, job: StreamJob) -> std::result::Result<(), StreamJob> {
        let len = self.senders.len();
        if len == 0 {
            return Err(job);
        }
        let mut job = job;
        let start = self.next_sender.fetch_add(1, Ordering::Relaxed) % len;
        for offset in 0..len {
            let idx = (start + offset) % len;
            match self.senders[idx].try_send(job) {
                Ok(()) => return Ok(()),
                Err(mpsc::TrySendError::Full(returned)) | Err(mpsc::TrySendError::Disconnected(returned)) => {
                    job = returned;
                }
            }
        }
        Err(job)
    }
}

fn run_stream_job(source: &dyn ImageSource, job: StreamJob) {
    if !job.liveness.accepts(job.generation) {
        return;
    }
    let pixels = source
        .fetch_image_bytes(&job.image_ref)
        .and_then(|bytes| decode_into_slot(&bytes, job.slot_size))
        .with_context(|| format!("Streaming '{}' into slot {}", job.image_ref, job.slot));
    // The atlas may be gone by now; its receiver going away is the cancellation signal.
    let _ = job.reply.send(StreamCompletion {
        image_ref: job.image_ref,
        slot: job.slot,
        generation: job.generation,
        pixels,
    });
}

/// Decodes `bytes`, scales to cover a `slot_size` square, centre-crops, and flips rows
/// so the first stored row is the bottom of the picture.
pub fn decode_into_slot(bytes: &[u8], slot_size: u32) -> Result<Vec<u8>> {
    if slot_size == 0 {
        return Err(anyhow!("Atlas slot size must be non-zero"));
    }
    let decoded = image::load_from_memory(bytes).context("Decoding image bytes")?;
    let fitted = decoded.resize_to_fill(slot_size, slot_size, FilterType::Triangle);
    Ok(fitted.flipv().to_rgba8().into_raw())
}
