//! Overlay for the debug panel: flat coloured quads in normalised device
//! coordinates, alpha blended over the finished scene.

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::pipelines::basic::{depth_state, mk_render_pipeline, primitive_state};

#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct PanelVertex {
    pub position: [f32; 2],
    pub color: [f32; 4],
}

impl PanelVertex {
    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<PanelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 2]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

/// GPU side of the panel. The vertex buffer grows when the panel needs more
/// quads than it was created for.
#[derive(Debug)]
pub struct PanelOverlay {
    pipeline: wgpu::RenderPipeline,
    vertex_buffer: wgpu::Buffer,
    capacity: usize,
    len: u32,
}

impl PanelOverlay {
    pub fn new(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> Self {
        let capacity = 64;
        Self {
            pipeline: mk_panel_pipeline(device, color_format),
            vertex_buffer: mk_vertex_buffer(device, capacity),
            capacity,
            len: 0,
        }
    }

    pub fn upload(&mut self, device: &wgpu::Device, queue: &wgpu::Queue, vertices: &[PanelVertex]) {
        if vertices.len() > self.capacity {
            self.capacity = vertices.len().next_power_of_two();
            self.vertex_buffer = mk_vertex_buffer(device, self.capacity);
        }
        if !vertices.is_empty() {
            queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(vertices));
        }
        self.len = vertices.len() as u32;
    }

    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>) {
        if self.len == 0 {
            return;
        }
        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.draw(0..self.len, 0..1);
    }
}

fn mk_vertex_buffer(device: &wgpu::Device, capacity: usize) -> wgpu::Buffer {
    device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("Panel Vertex Buffer"),
        contents: bytemuck::cast_slice(&vec![PanelVertex::zeroed(); capacity]),
        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
    })
}

fn mk_panel_pipeline(device: &wgpu::Device, color_format: wgpu::TextureFormat) -> wgpu::RenderPipeline {
    let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Panel Pipeline Layout"),
        bind_group_layouts: &[],
        push_constant_ranges: &[],
    });

    let shader = wgpu::ShaderModuleDescriptor {
        label: Some("Panel Shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("panel.wgsl").into()),
    };

    // Drawn in the main pass, so the depth format has to match
    mk_render_pipeline(
        device,
        "Panel Pipeline",
        &render_pipeline_layout,
        color_format,
        Some(wgpu::BlendState {
            color: wgpu::BlendComponent::OVER,
            alpha: wgpu::BlendComponent::OVER,
        }),
        Some(depth_state(false, wgpu::CompareFunction::Always)),
        primitive_state(wgpu::FrontFace::Ccw, None),
        &[PanelVertex::desc()],
        shader,
    )
}
