//! Scene background drawn from an equirectangular environment image.
//!
//! A single triangle covers the screen; the fragment shader turns each pixel
//! back into a view direction and looks it up in the panorama. Blurriness
//! selects a coarser mip level, intensity scales the result.

use wgpu::util::DeviceExt;

use crate::{
    data_structures::texture::Texture,
    pipelines::{
        BindGroupLayouts,
        basic::{depth_state, mk_render_pipeline, primitive_state},
    },
};

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct BackgroundUniform {
    pub intensity: f32,
    /// 0 is sharp, 1 samples the coarsest mip.
    pub blurriness: f32,
    pub max_lod: f32,
    _padding: f32,
}

impl BackgroundUniform {
    pub fn new(intensity: f32, blurriness: f32, mip_level_count: u32) -> Self {
        Self {
            intensity,
            blurriness,
            max_lod: mip_level_count.saturating_sub(1) as f32,
            _padding: 0.0,
        }
    }

    /// Mip level sampled for the current blurriness.
    pub fn lod(&self) -> f32 {
        self.blurriness.clamp(0.0, 1.0) * self.max_lod
    }
}

#[derive(Debug)]
pub struct Background {
    pub uniform: BackgroundUniform,
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    #[allow(unused)]
    texture: Texture,
}

impl Background {
    pub fn new(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        texture: Texture,
        intensity: f32,
        blurriness: f32,
    ) -> Self {
        let uniform = BackgroundUniform::new(intensity, blurriness, texture.texture.mip_level_count());
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Background Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &layouts.background,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&texture.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&texture.sampler),
                },
            ],
            label: Some("background_bind_group"),
        });
        Self {
            uniform,
            buffer,
            bind_group,
            texture,
        }
    }

    pub fn set_intensity(&mut self, intensity: f32) {
        self.uniform.intensity = intensity;
    }

    pub fn set_blurriness(&mut self, blurriness: f32) {
        self.uniform.blurriness = blurriness;
    }

    pub fn write_to_buffer(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }

    /// Expects the background pipeline to be set.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>, camera_bind_group: &wgpu::BindGroup) {
        render_pass.set_bind_group(0, &self.bind_group, &[]);
        render_pass.set_bind_group(1, camera_bind_group, &[]);
        render_pass.draw(0..3, 0..1);
    }
}

/// Draws behind everything: no depth writes, always passes the depth test.
pub fn mk_background_pipeline(
    device: &wgpu::Device,
    layouts: &BindGroupLayouts,
    color_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Background Pipeline Layout"),
        bind_group_layouts: &[&layouts.background, &layouts.camera],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Background Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("background.wgsl").into()),
    };

    mk_render_pipeline(
        device,
        "Background Pipeline",
        &render_pipeline_layout,
        color_format,
        Some(wgpu::BlendState::REPLACE),
        Some(depth_state(false, wgpu::CompareFunction::Always)),
        primitive_state(wgpu::FrontFace::Ccw, None),
        &[],
        shader,
    )
}
