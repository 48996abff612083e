mod item_pass;
mod window_surface;

pub use item_pass::ItemPass;
pub use window_surface::{SurfaceFrame, WindowSurface};

use anyhow::{Context, Result};
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::Window;

use crate::config::WindowConfig;
use crate::engine::ShowroomEngine;

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Owns the surface and the item pipelines; the engine owns everything per-chunk.
pub struct Renderer {
    surface: WindowSurface,
    item_pass: Option<ItemPass>,
}

impl Renderer {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self { surface: WindowSurface::new(window_cfg), item_pass: None }
    }

    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        self.surface.ensure_window(event_loop)
    }

    pub fn window(&self) -> Option<&Window> {
        self.surface.window()
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.surface.size()
    }

    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.surface.resize(new_size);
    }

    /// Layer limit the atlas capacity must respect on this device.
    pub fn max_texture_array_layers(&self) -> Result<u32> {
        Ok(self.surface.device()?.limits().max_texture_array_layers)
    }

    /// Creates the engine's GPU resources and the pipelines that draw them.
    pub fn attach(&mut self, engine: &mut ShowroomEngine) -> Result<()> {
        let format = self.surface.surface_format()?;
        let (device, queue) = self.surface.device_and_queue()?;
        let layouts = engine.attach_gpu(device, queue)?;
        self.item_pass = Some(ItemPass::new(device, format, layouts));
        Ok(())
    }

    /// Records and submits one frame. Returns the number of instanced draws.
    pub fn render(&mut self, engine: &ShowroomEngine) -> Result<u32> {
        let item_pass = self.item_pass.as_ref().context("Item pipelines not created")?;
        let frame = self.surface.acquire_surface_frame()?;
        let (device, queue) = self.surface.device_and_queue()?;
        let depth = self.surface.depth_view()?;
        let view = engine.view();
        item_pass.write_camera(queue, view.view_projection(self.surface.size()), view.eye);

        let mut encoder =
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("Frame Encoder") });
        let draws = engine.encode(&mut encoder, item_pass, frame.view(), depth);
        queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(draws)
    }
}
