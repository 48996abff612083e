use crate::config::WindowConfig;
use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use winit::dpi::PhysicalSize;
use winit::event_loop::ActiveEventLoop;
use winit::window::{Fullscreen, Window};

use super::DEPTH_FORMAT;

/// Acquired swapchain image plus the view the item pass renders into.
#[derive(Debug)]
pub struct SurfaceFrame {
    texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

impl SurfaceFrame {
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn present(self) {
        self.texture.present();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SurfaceErrorAction {
    Reconfigure,
    SkipFrame,
    Fatal,
}

/// GPU objects tied to the window: device, queue, swapchain, depth target.
struct SurfaceState {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    depth_view: wgpu::TextureView,
}

pub struct WindowSurface {
    window: Option<Arc<Window>>,
    state: Option<SurfaceState>,
    size: PhysicalSize<u32>,
    title: String,
    vsync: bool,
    fullscreen: bool,
}

impl WindowSurface {
    pub fn new(window_cfg: &WindowConfig) -> Self {
        Self {
            window: None,
            state: None,
            size: PhysicalSize::new(window_cfg.width, window_cfg.height),
            title: window_cfg.title.clone(),
            vsync: window_cfg.vsync,
            fullscreen: window_cfg.fullscreen,
        }
    }

    /// Creates the window and its device on first resume; later calls are no-ops.
    pub fn ensure_window(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        if self.window.is_some() {
            return Ok(());
        }
        let mut attrs = Window::default_attributes().with_title(self.title.clone()).with_inner_size(self.size);
        if self.fullscreen {
            attrs = attrs.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }
        let window = Arc::new(event_loop.create_window(attrs).context("Failed to create window")?);
        let state = pollster::block_on(self.create_state(&window))?;
        self.size = PhysicalSize::new(state.config.width, state.config.height);
        self.state = Some(state);
        self.window = Some(window);
        Ok(())
    }

    fn state(&self) -> Result<&SurfaceState> {
        self.state.as_ref().context("GPU surface not initialized")
    }

    pub fn device_and_queue(&self) -> Result<(&wgpu::Device, &wgpu::Queue)> {
        let state = self.state()?;
        Ok((&state.device, &state.queue))
    }

    pub fn device(&self) -> Result<&wgpu::Device> {
        Ok(&self.state()?.device)
    }

    pub fn depth_view(&self) -> Result<&wgpu::TextureView> {
        Ok(&self.state()?.depth_view)
    }

    pub fn surface_format(&self) -> Result<wgpu::TextureFormat> {
        Ok(self.state()?.config.format)
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.size
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    /// Reconfigures the swapchain and depth target. A zero-sized window (minimised)
    /// keeps the old configuration until it is restored.
    pub fn resize(&mut self, new_size: PhysicalSize<u32>) {
        self.size = new_size;
        if new_size.width == 0 || new_size.height == 0 {
            return;
        }
        if let Some(state) = self.state.as_mut() {
            state.config.width = new_size.width;
            state.config.height = new_size.height;
            state.surface.configure(&state.device, &state.config);
            state.depth_view = create_depth_view(&state.device, new_size);
            log::debug!("[renderer] surface resized to {}x{}", new_size.width, new_size.height);
        }
    }

    pub fn acquire_surface_frame(&mut self) -> Result<SurfaceFrame> {
        let state = self.state()?;
        match state.surface.get_current_texture() {
            Ok(texture) => {
                let view = texture.texture.create_view(&wgpu::TextureViewDescriptor::default());
                Ok(SurfaceFrame { texture, view })
            }
            Err(err) => Err(self.handle_surface_error(&err)),
        }
    }

    /// Recovers what can be recovered and reports why the frame was skipped.
    fn handle_surface_error(&mut self, error: &wgpu::SurfaceError) -> anyhow::Error {
        match surface_error_action(error) {
            SurfaceErrorAction::Reconfigure => {
                self.resize(self.size);
                anyhow!("Surface lost or outdated; reconfigured")
            }
            SurfaceErrorAction::SkipFrame => anyhow!("Surface acquisition timed out"),
            SurfaceErrorAction::Fatal => anyhow!("Surface failed: {error}"),
        }
    }

    async fn create_state(&self, window: &Arc<Window>) -> Result<SurfaceState> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window.clone()).context("Failed to create WGPU surface")?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("Failed to request WGPU adapter")?;
        let info = adapter.get_info();
        log::info!("[renderer] adapter: {} ({:?})", info.name, info.backend);
        let (device, queue) = request_device(&adapter).await?;

        let caps = surface.get_capabilities(&adapter);
        let format = choose_surface_format(&caps.formats).context("Surface reports no formats")?;
        let size = window.inner_size();
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: select_present_mode(self.vsync, &caps.present_modes),
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        let depth_view = create_depth_view(&device, PhysicalSize::new(config.width, config.height));
        Ok(SurfaceState { surface, device, queue, config, depth_view })
    }
}

/// Requests the adapter's full limits so the atlas can use every array layer it offers.
async fn request_device(adapter: &wgpu::Adapter) -> Result<(wgpu::Device, wgpu::Queue)> {
    let device_desc = wgpu::DeviceDescriptor {
        label: Some("Shelfwalk Device"),
        required_features: wgpu::Features::empty(),
        required_limits: adapter.limits(),
        experimental_features: wgpu::ExperimentalFeatures::default(),
        memory_hints: wgpu::MemoryHints::default(),
        trace: wgpu::Trace::default(),
    };
    adapter.request_device(&device_desc).await.context("Failed to request WGPU device")
}

fn create_depth_view(device: &wgpu::Device, size: PhysicalSize<u32>) -> wgpu::TextureView {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Depth Texture"),
        size: wgpu::Extent3d { width: size.width.max(1), height: size.height.max(1), depth_or_array_layers: 1 },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    });
    texture.create_view(&wgpu::TextureViewDescriptor::default())
}

fn select_present_mode(vsync: bool, modes: &[wgpu::PresentMode]) -> wgpu::PresentMode {
    if vsync {
        return wgpu::PresentMode::Fifo;
    }
    [wgpu::PresentMode::Mailbox, wgpu::PresentMode::Immediate]
        .into_iter()
        .find(|mode| modes.contains(mode))
        .unwrap_or(wgpu::PresentMode::Fifo)
}

fn choose_surface_format(formats: &[wgpu::TextureFormat]) -> Option<wgpu::TextureFormat> {
    formats.iter().copied().find(|f| f.is_srgb()).or_else(|| formats.first().copied())
}

fn surface_error_action(error: &wgpu::SurfaceError) -> SurfaceErrorAction {
    match error {
        wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigure,
        wgpu::SurfaceError::Timeout => SurfaceErrorAction::SkipFrame,
        wgpu::SurfaceError::OutOfMemory | wgpu::SurfaceError::Other => SurfaceErrorAction::Fatal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn present_mode_respects_vsync_flag() {
        let modes = [wgpu::PresentMode::Immediate, wgpu::PresentMode::Fifo];
        assert_eq!(select_present_mode(false, &modes), wgpu::PresentMode::Immediate);
        assert_eq!(select_present_mode(true, &modes), wgpu::PresentMode::Fifo);
        assert_eq!(select_present_mode(false, &[wgpu::PresentMode::Fifo]), wgpu::PresentMode::Fifo);
    }

    #[test]
    fn surface_errors_map_to_recovery() {
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Lost), SurfaceErrorAction::Reconfigure);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Outdated), SurfaceErrorAction::Reconfigure);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::Timeout), SurfaceErrorAction::SkipFrame);
        assert_eq!(surface_error_action(&wgpu::SurfaceError::OutOfMemory), SurfaceErrorAction::Fatal);
    }

    #[test]
    fn lost_surface_without_device_only_records_size() {
        let mut surface = WindowSurface::new(&WindowConfig::default());
        let err = surface.handle_surface_error(&wgpu::SurfaceError::Lost);
        assert!(err.to_string().contains("reconfigured"));
        assert_eq!(surface.size(), PhysicalSize::new(1280, 720));
        assert!(surface.acquire_surface_frame().is_err(), "no surface yet");
    }

    #[test]
    fn surface_format_prefers_srgb() {
        let formats = [wgpu::TextureFormat::Bgra8Unorm, wgpu::TextureFormat::Bgra8UnormSrgb];
        assert_eq!(choose_surface_format(&formats), Some(wgpu::TextureFormat::Bgra8UnormSrgb));
        assert_eq!(choose_surface_format(&[]), None);
    }
}
