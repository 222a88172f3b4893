//! Headless GPU setup and texture readback.

use std::{iter, time::Duration};

use envmap_rings::{
    SceneConfig,
    camera::{Camera, CameraResources, OrbitControls, Projection},
    data_structures::texture::Texture,
    pipelines::BindGroupLayouts,
};
use futures::executor::block_on;

/// Format of the offscreen frames.
pub const OUTPUT_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

/// A device without a window or surface.
pub struct Headless {
    pub device: wgpu::Device,
    pub queue: wgpu::Queue,
    pub layouts: BindGroupLayouts,
}

impl Headless {
    pub fn new() -> Self {
        block_on(async {
            let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
                backends: wgpu::Backends::all(),
                ..Default::default()
            });
            let adapter = instance
                .request_adapter(&wgpu::RequestAdapterOptions {
                    power_preference: wgpu::PowerPreference::default(),
                    compatible_surface: None,
                    force_fallback_adapter: false,
                })
                .await
                .expect("Integration tests need a GPU adapter.");
            let (device, queue) = adapter
                .request_device(&wgpu::DeviceDescriptor {
                    label: Some("Integration Test Device"),
                    required_limits: wgpu::Limits::downlevel_defaults(),
                    ..Default::default()
                })
                .await
                .expect("Failed to create the test device.");
            let layouts = BindGroupLayouts::new(&device);
            Self {
                device,
                queue,
                layouts,
            }
        })
    }

    /// The main camera of `config` looking at a square frame of `size`.
    pub fn main_camera(&self, config: &SceneConfig, size: u32) -> CameraResources {
        let camera = &config.camera;
        let fovy = cgmath::Deg(camera.fovy_degrees);
        let projection = Projection::new(size as f32, size as f32, fovy, camera.near, camera.far);
        CameraResources::new(
            &self.device,
            &self.layouts.camera,
            Camera::new(camera.position, camera.target),
            OrbitControls::new(fovy, camera.enable_damping, camera.damping_factor),
            &projection,
        )
    }

    /// Colour and depth textures standing in for the window surface.
    pub fn offscreen(&self, size: u32) -> (wgpu::Texture, wgpu::TextureView, Texture) {
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Golden Image Test Output Texture"),
            size: wgpu::Extent3d {
                width: size,
                height: size,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OUTPUT_FORMAT,
            usage: wgpu::TextureUsages::COPY_SRC | wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let depth = Texture::create_depth_texture(&self.device, [size, size], "test depth texture");
        (texture, view, depth)
    }

    pub fn encoder(&self) -> wgpu::CommandEncoder {
        self.device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Test Encoder"),
            })
    }

    pub fn submit(&self, encoder: wgpu::CommandEncoder) {
        self.queue.submit(iter::once(encoder.finish()));
    }

    /// Copies one layer and mip of `texture` to the CPU, rows without padding.
    pub fn read_texture(
        &self,
        texture: &wgpu::Texture,
        layer: u32,
        mip_level: u32,
        bytes_per_pixel: u32,
    ) -> Vec<u8> {
        let width = (texture.width() >> mip_level).max(1);
        let height = (texture.height() >> mip_level).max(1);
        let row = width * bytes_per_pixel;
        // Buffer rows have to be 256 byte aligned
        let padded_row = row.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT) * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let output_buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Buffer"),
            size: (padded_row * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self.encoder();
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level,
                origin: wgpu::Origin3d { x: 0, y: 0, z: layer },
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output_buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.submit(encoder);

        let (tx, rx) = futures::channel::oneshot::channel();
        let buffer_slice = output_buffer.slice(..);
        buffer_slice.map_async(wgpu::MapMode::Read, move |result| {
            tx.send(result).unwrap();
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(3)),
            })
            .unwrap();
        block_on(rx).unwrap().unwrap();

        let pixels = {
            let data = buffer_slice.get_mapped_range();
            data.chunks(padded_row as usize)
                .flat_map(|padded| padded[..row as usize].iter().copied())
                .collect()
        };
        output_buffer.unmap();
        pixels
    }
}

/// Splits Rgba16Float bytes into texels of raw half-float bits.
///
/// Positive half floats order like their bit patterns, so comparisons on the
/// bits work for non-negative colours.
pub fn half_texels(bytes: &[u8]) -> Vec<[u16; 4]> {
    bytes
        .chunks_exact(8)
        .map(|t| {
            [
                u16::from_le_bytes([t[0], t[1]]),
                u16::from_le_bytes([t[2], t[3]]),
                u16::from_le_bytes([t[4], t[5]]),
                u16::from_le_bytes([t[6], t[7]]),
            ]
        })
        .collect()
}
