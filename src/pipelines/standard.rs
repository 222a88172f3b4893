use crate::{
    data_structures::{
        instance::InstanceRaw,
        model::{self, Vertex},
    },
    pipelines::{
        BindGroupLayouts,
        basic::{depth_state, mk_render_pipeline, primitive_state},
    },
};

/// Environment lit metal/roughness shading with skinning.
///
/// Culling is left to the shader, which discards back faces of single sided
/// materials and flips the normal for double sided ones.
pub fn mk_standard_pipeline(
    device: &wgpu::Device,
    layouts: &BindGroupLayouts,
    color_format: wgpu::TextureFormat,
    front_face: wgpu::FrontFace,
) -> wgpu::RenderPipeline {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Standard Pipeline Layout"),
        bind_group_layouts: &[
            &layouts.material,
            &layouts.camera,
            &layouts.environment,
            &layouts.skin,
        ],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Standard Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("standard.wgsl").into()),
    };

    mk_render_pipeline(
        device,
        "Standard Pipeline",
        &render_pipeline_layout,
        color_format,
        Some(wgpu::BlendState::REPLACE),
        Some(depth_state(true, wgpu::CompareFunction::Less)),
        primitive_state(front_face, None),
        &[model::ModelVertex::desc(), InstanceRaw::desc()],
        shader,
    )
}
