use anyhow::{Context, Result};
use std::sync::Arc;
use winit::application::ApplicationHandler;
use winit::event::{DeviceEvent, WindowEvent};
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::{CursorGrabMode, WindowId};

use crate::atlas::{DirectoryImageSource, ImageSource, ProceduralImageSource};
use crate::cli::CliOverrides;
use crate::config::AppConfig;
use crate::engine::{AvailabilitySource, ShowroomEngine, StaticAvailability};
use crate::events::{ActivationTarget, EngineEvent};
use crate::input::{Input, InputEvent, DEFAULT_INPUT_PATH};
use crate::renderer::Renderer;
use crate::scene::SceneLayout;
use crate::time::FrameClock;

const DEMO_SEED: u64 = 7;
const DEMO_ITEMS: usize = 520;
const DEMO_IMAGES: usize = 50;

pub fn run(cli: CliOverrides) -> Result<()> {
    let mut config = AppConfig::load_or_default(cli.config_path());
    let overrides = cli.into_config_overrides();
    if !overrides.is_empty() {
        log::info!("[config] command line overrides: {}", overrides.applied_fields().join(", "));
    }
    config.apply_overrides(&overrides);
    let (layout, source) = load_scene(&config)?;
    let event_loop = EventLoop::new().context("Failed to create winit event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);
    let mut app = App::new(config, layout, source);
    event_loop.run_app(&mut app).context("Event loop execution failed")?;
    Ok(())
}

/// The configured scene with covers from disk, or the demo shelves with generated covers.
pub fn load_scene(config: &AppConfig) -> Result<(SceneLayout, Arc<dyn ImageSource>)> {
    match config.scene.as_ref() {
        Some(path) => {
            let layout = SceneLayout::load(path)?;
            log::info!("[app] scene {} with {} items", path.display(), layout.items.len());
            Ok((layout, Arc::new(DirectoryImageSource::new(config.atlas.image_root.clone()))))
        }
        None => {
            log::info!("[app] no scene configured; generating demo shelves");
            Ok((SceneLayout::demo(DEMO_SEED, DEMO_ITEMS, DEMO_IMAGES), Arc::new(ProceduralImageSource::default())))
        }
    }
}

pub struct App {
    config: AppConfig,
    layout: SceneLayout,
    source: Arc<dyn ImageSource>,
    availability: Arc<StaticAvailability>,
    renderer: Renderer,
    engine: Option<ShowroomEngine>,
    input: Input,
    time: FrameClock,
    cursor_captured: bool,
    should_close: bool,
}

impl App {
    pub fn new(config: AppConfig, layout: SceneLayout, source: Arc<dyn ImageSource>) -> Self {
        let renderer = Renderer::new(&config.window);
        Self {
            config,
            layout,
            source,
            availability: Arc::new(StaticAvailability::new()),
            renderer,
            engine: None,
            input: Input::from_config(DEFAULT_INPUT_PATH),
            time: FrameClock::new(),
            cursor_captured: false,
            should_close: false,
        }
    }

    fn init_engine(&mut self) -> Result<()> {
        if self.engine.is_some() {
            return Ok(());
        }
        let max_layers = self.renderer.max_texture_array_layers()?;
        self.config.clamp_atlas_capacity(max_layers);
        let availability: Arc<dyn AvailabilitySource> = self.availability.clone();
        let mut engine = ShowroomEngine::new(&self.config, &self.layout, self.source.clone(), availability)?;
        self.renderer.attach(&mut engine)?;
        self.engine = Some(engine);
        Ok(())
    }

    fn set_cursor_captured(&mut self, captured: bool) {
        let Some(window) = self.renderer.window() else {
            return;
        };
        let result = if captured {
            window
                .set_cursor_grab(CursorGrabMode::Locked)
                .or_else(|_| window.set_cursor_grab(CursorGrabMode::Confined))
        } else {
            window.set_cursor_grab(CursorGrabMode::None)
        };
        match result {
            Ok(()) => {
                window.set_cursor_visible(!captured);
                self.cursor_captured = captured;
            }
            Err(err) => log::warn!("[input] cursor grab failed: {err}"),
        }
    }

    fn handle_activation(&self, target: ActivationTarget) {
        match target {
            ActivationTarget::Item { id, owner } => {
                let held = self.availability.toggle_held(owner);
                log::info!("[app] {id} ({owner}) {}", if held { "checked out" } else { "returned" });
            }
            ActivationTarget::NamedObject { id } => {
                let name = self.layout.named_objects.iter().find(|object| object.id == id).map(|object| object.name.as_str());
                log::info!("[app] activated {}", name.unwrap_or("unnamed object"));
            }
        }
    }

    fn frame(&mut self) {
        let dt = self.time.tick();
        if self.input.take_release_cursor() && self.cursor_captured {
            self.set_cursor_captured(false);
        }
        if !self.cursor_captured && self.input.take_left_click() {
            self.set_cursor_captured(true);
        }
        let intent = self.input.take_frame_intent(self.cursor_captured);
        let Some(engine) = self.engine.as_mut() else {
            return;
        };
        let report = engine.update(dt, &intent);
        let events = engine.drain_events();
        for event in &events {
            match event {
                EngineEvent::SlotFailed { .. } => log::warn!("[app] {event}"),
                _ => log::debug!("[app] {event}"),
            }
        }
        if let Some(target) = report.activated {
            self.handle_activation(target);
        }
        if let Some(engine) = self.engine.as_ref() {
            if let Err(err) = self.renderer.render(engine) {
                log::warn!("[renderer] frame skipped: {err:#}");
            }
        }
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(err) = self.renderer.ensure_window(event_loop) {
            log::error!("Renderer initialization error: {err:?}");
            self.should_close = true;
            return;
        }
        if let Err(err) = self.init_engine() {
            log::error!("Engine initialization error: {err:?}");
            self.should_close = true;
        }
    }

    fn window_event(&mut self, _event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match &event {
            WindowEvent::CloseRequested => self.should_close = true,
            WindowEvent::Resized(size) => self.renderer.resize(*size),
            WindowEvent::Focused(false) => {
                self.input.release_all();
                self.set_cursor_captured(false);
            }
            _ => {}
        }
        self.input.push(InputEvent::from_window_event(&event));
    }

    fn device_event(&mut self, _event_loop: &ActiveEventLoop, _device: winit::event::DeviceId, event: DeviceEvent) {
        self.input.push(InputEvent::from_device_event(&event));
    }

    fn about_to_wait(&mut self, event_loop: &ActiveEventLoop) {
        if self.should_close {
            if let Some(engine) = self.engine.as_mut() {
                engine.shutdown();
            }
            event_loop.exit();
            return;
        }
        self.frame();
    }
}
