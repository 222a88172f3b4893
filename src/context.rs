use std::sync::Arc;

use anyhow::Context as _;
use winit::{dpi::PhysicalSize, window::Window};

use crate::{
    camera::{Camera, CameraResources, OrbitControls, Projection},
    config::SceneConfig,
    data_structures::texture,
    pipelines::BindGroupLayouts,
};

/// Window size bookkeeping.
///
/// `width` and `height` are logical (CSS) pixels. The drawing buffer uses the
/// OS scale factor capped at `max_pixel_ratio`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub scale_factor: f64,
    pub max_pixel_ratio: f64,
}

impl Viewport {
    pub fn new(size: PhysicalSize<u32>, scale_factor: f64, max_pixel_ratio: f64) -> Self {
        let mut viewport = Self {
            width: 1.0,
            height: 1.0,
            scale_factor: 1.0,
            max_pixel_ratio,
        };
        viewport.resize(size, scale_factor);
        viewport
    }

    pub fn resize(&mut self, size: PhysicalSize<u32>, scale_factor: f64) {
        let scale_factor = if scale_factor > 0.0 { scale_factor } else { 1.0 };
        let logical = size.to_logical::<f64>(scale_factor);
        self.width = logical.width;
        self.height = logical.height;
        self.scale_factor = scale_factor;
    }

    pub fn pixel_ratio(&self) -> f64 {
        self.scale_factor.min(self.max_pixel_ratio)
    }

    /// Drawing buffer size in physical pixels, never zero.
    pub fn surface_size(&self) -> [u32; 2] {
        let ratio = self.pixel_ratio();
        [
            ((self.width * ratio).round() as u32).max(1),
            ((self.height * ratio).round() as u32).max(1),
        ]
    }

    pub fn aspect(&self) -> f32 {
        if self.height > 0.0 {
            (self.width / self.height) as f32
        } else {
            1.0
        }
    }
}

#[derive(Debug)]
pub struct Context {
    pub(crate) window: Arc<Window>,
    pub(crate) depth_texture: texture::Texture,
    pub surface: wgpu::Surface<'static>,
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub config: wgpu::SurfaceConfiguration,
    pub camera: CameraResources,
    pub projection: Projection,
    pub viewport: Viewport,
    pub layouts: BindGroupLayouts,
    pub clear_colour: wgpu::Color,
}

impl Context {
    pub async fn new(window: Arc<Window>, scene: &SceneConfig) -> anyhow::Result<Self> {
        let viewport = Viewport::new(window.inner_size(), window.scale_factor(), scene.max_pixel_ratio);
        let [width, height] = viewport.surface_size();

        log::info!("WGPU setup");
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            #[cfg(not(target_arch = "wasm32"))]
            backends: wgpu::Backends::PRIMARY,
            #[cfg(target_arch = "wasm32")]
            backends: wgpu::Backends::GL,
            ..Default::default()
        });

        let surface = instance
            .create_surface(window.clone())
            .context("creating the window surface")?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .context("no suitable GPU adapter")?;
        log::info!("adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: None,
                required_features: wgpu::Features::empty(),
                // WebGL doesn't support all of wgpu's features
                required_limits: if cfg!(target_arch = "wasm32") {
                    wgpu::Limits::downlevel_webgl2_defaults()
                } else {
                    wgpu::Limits::default()
                },
                ..Default::default()
            })
            .await
            .context("requesting the GPU device")?;

        let surface_caps = surface.get_capabilities(&adapter);
        // Shaders write linear colour and rely on an sRGB surface for encoding
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .context("the surface supports no formats")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: surface_caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: surface_caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);
        log::info!("surface {:?} {}x{}", surface_format, width, height);

        let layouts = BindGroupLayouts::new(&device);

        let camera_config = &scene.camera;
        let fovy = cgmath::Deg(camera_config.fovy_degrees);
        let projection = Projection::new(
            viewport.width as f32,
            viewport.height as f32,
            fovy,
            camera_config.near,
            camera_config.far,
        );
        let camera = Camera::new(camera_config.position, camera_config.target);
        let controls = OrbitControls::new(fovy, camera_config.enable_damping, camera_config.damping_factor);
        let camera = CameraResources::new(&device, &layouts.camera, camera, controls, &projection);

        let depth_texture = texture::Texture::create_depth_texture(&device, [width, height], "depth_texture");

        Ok(Self {
            window,
            depth_texture,
            surface,
            device,
            queue,
            config,
            camera,
            projection,
            viewport,
            layouts,
            clear_colour: scene.clear_colour,
        })
    }

    pub fn window(&self) -> &Window {
        &self.window
    }

    /// Applies a new window size or scale factor. Zero sized windows
    /// (minimised) are ignored.
    pub fn resize(&mut self, size: PhysicalSize<u32>, scale_factor: f64) {
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.viewport.resize(size, scale_factor);
        let [width, height] = self.viewport.surface_size();
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);
        self.projection
            .resize(self.viewport.width as f32, self.viewport.height as f32);
        self.depth_texture =
            texture::Texture::create_depth_texture(&self.device, [width, height], "depth_texture");
        log::debug!(
            "resized to {}x{} logical, {}x{} drawing buffer",
            self.viewport.width,
            self.viewport.height,
            width,
            height
        );
    }

    /// Re-applies the current surface configuration, e.g. after the surface was lost.
    pub fn reconfigure(&mut self) {
        self.surface.configure(&self.device, &self.config);
    }
}
