//! Render pipelines and the bind group layouts they share.
//!
//! - `basic`: the generic pipeline builder and the unlit pipeline
//! - `standard`: environment lit, skinned metal/roughness shading
//! - `background`: equirectangular environment drawn behind everything
//! - `downsample`: mip chain generation for the captured cube map
//! - `panel`: the debug panel overlay
//!
//! The scene pipelines exist twice: once for the window surface and once for
//! the cube capture, which renders into a half-float target through a mirrored
//! projection and therefore sees front faces wound clockwise.

pub mod background;
pub mod basic;
pub mod downsample;
pub mod panel;
pub mod standard;

fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

fn texture_entry(binding: u32, view_dimension: wgpu::TextureViewDimension) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            multisampled: false,
            view_dimension,
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
        },
        count: None,
    }
}

fn sampler_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
        count: None,
    }
}

/// Layouts of every bind group in the renderer.
#[derive(Debug)]
pub struct BindGroupLayouts {
    /// Material uniform, base colour and metallic-roughness textures.
    pub material: wgpu::BindGroupLayout,
    pub camera: wgpu::BindGroupLayout,
    /// Captured cube map, its sampler and mip count.
    pub environment: wgpu::BindGroupLayout,
    /// Joint palette of one mesh node.
    pub skin: wgpu::BindGroupLayout,
    /// Background uniform and equirectangular texture.
    pub background: wgpu::BindGroupLayout,
    /// Source mip for the downsample pass.
    pub downsample: wgpu::BindGroupLayout,
}

impl BindGroupLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        use wgpu::TextureViewDimension::{Cube, D2};
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let both = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;

        let material = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                uniform_entry(0, fragment),
                texture_entry(1, D2),
                sampler_entry(2),
                texture_entry(3, D2),
                sampler_entry(4),
            ],
            label: Some("material_bind_group_layout"),
        });
        let camera = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[uniform_entry(0, both)],
            label: Some("camera_bind_group_layout"),
        });
        let environment = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[texture_entry(0, Cube), sampler_entry(1), uniform_entry(2, fragment)],
            label: Some("environment_bind_group_layout"),
        });
        let skin = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[uniform_entry(0, wgpu::ShaderStages::VERTEX)],
            label: Some("skin_bind_group_layout"),
        });
        let background = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[uniform_entry(0, fragment), texture_entry(1, D2), sampler_entry(2)],
            label: Some("background_bind_group_layout"),
        });
        let downsample = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[texture_entry(0, D2), sampler_entry(1)],
            label: Some("downsample_bind_group_layout"),
        });

        Self {
            material,
            camera,
            environment,
            skin,
            background,
            downsample,
        }
    }
}

/// The pipelines scene objects are drawn with, for one kind of target.
#[derive(Debug)]
pub struct ScenePipelines {
    pub background: wgpu::RenderPipeline,
    pub unlit: wgpu::RenderPipeline,
    pub lit: wgpu::RenderPipeline,
}

/// Builds the scene pipelines for `color_format`. `mirrored` targets flip the
/// winding of every triangle.
pub fn mk_scene_pipelines(
    device: &wgpu::Device,
    layouts: &BindGroupLayouts,
    color_format: wgpu::TextureFormat,
    mirrored: bool,
) -> ScenePipelines {
    let front_face = if mirrored {
        wgpu::FrontFace::Cw
    } else {
        wgpu::FrontFace::Ccw
    };
    ScenePipelines {
        background: background::mk_background_pipeline(device, layouts, color_format),
        unlit: basic::mk_unlit_pipeline(device, layouts, color_format, front_face),
        lit: standard::mk_standard_pipeline(device, layouts, color_format, front_face),
    }
}
