//! Regenerates the mip chain of a cube target after its faces were drawn.
//!
//! Every face is handled as an independent 2D image: mip `n` is rendered by
//! bilinearly sampling mip `n - 1` with a fullscreen triangle.

use crate::{
    data_structures::texture::CubeTarget,
    pipelines::{BindGroupLayouts, basic::primitive_state, basic::mk_render_pipeline},
};

#[derive(Debug)]
pub struct Downsampler {
    pipeline: wgpu::RenderPipeline,
    // [face][source mip]
    bind_groups: Vec<Vec<wgpu::BindGroup>>,
}

impl Downsampler {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, target: &CubeTarget) -> Self {
        let pipeline = mk_downsample_pipeline(device, layouts, CubeTarget::FORMAT);
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("downsample sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let sources = target.mip_level_count.saturating_sub(1) as usize;
        let bind_groups = (0..6)
            .map(|face| {
                (0..sources)
                    .map(|mip| {
                        device.create_bind_group(&wgpu::BindGroupDescriptor {
                            layout: &layouts.downsample,
                            entries: &[
                                wgpu::BindGroupEntry {
                                    binding: 0,
                                    resource: wgpu::BindingResource::TextureView(target.face_view(face, mip)),
                                },
                                wgpu::BindGroupEntry {
                                    binding: 1,
                                    resource: wgpu::BindingResource::Sampler(&sampler),
                                },
                            ],
                            label: Some("downsample_bind_group"),
                        })
                    })
                    .collect()
            })
            .collect();

        Self { pipeline, bind_groups }
    }

    /// Records one pass per face and mip below the base level.
    pub fn generate(&self, encoder: &mut wgpu::CommandEncoder, target: &CubeTarget) {
        for (face, sources) in self.bind_groups.iter().enumerate() {
            for (mip, bind_group) in sources.iter().enumerate() {
                let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                    label: Some("Downsample Pass"),
                    color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                        view: target.face_view(face, mip + 1),
                        resolve_target: None,
                        depth_slice: None,
                        ops: wgpu::Operations {
                            load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                            store: wgpu::StoreOp::Store,
                        },
                    })],
                    depth_stencil_attachment: None,
                    occlusion_query_set: None,
                    timestamp_writes: None,
                });
                pass.set_pipeline(&self.pipeline);
                pass.set_bind_group(0, bind_group, &[]);
                pass.draw(0..3, 0..1);
            }
        }
    }
}

fn mk_downsample_pipeline(
    device: &wgpu::Device,
    layouts: &BindGroupLayouts,
    color_format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Downsample Pipeline Layout"),
        bind_group_layouts: &[&layouts.downsample],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Downsample Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("downsample.wgsl").into()),
    };

    mk_render_pipeline(
        device,
        "Downsample Pipeline",
        &render_pipeline_layout,
        color_format,
        Some(wgpu::BlendState::REPLACE),
        None,
        primitive_state(wgpu::FrontFace::Ccw, None),
        &[],
        shader,
    )
}
