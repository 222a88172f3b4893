//! Meshes, materials and models on the GPU.

use std::ops::Range;

use wgpu::util::DeviceExt;

use crate::data_structures::{geometry::Geometry, texture::Texture};

pub trait Vertex {
    fn desc() -> wgpu::VertexBufferLayout<'static>;
}

/// Vertex layout shared by every mesh in the scene.
///
/// Rigid meshes bind all their weight to joint 0, which holds the world matrix
/// of the node the mesh hangs on.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ModelVertex {
    pub position: [f32; 3],
    pub tex_coords: [f32; 2],
    pub normal: [f32; 3],
    pub joints: [u32; 4],
    pub weights: [f32; 4],
}

impl ModelVertex {
    pub const fn rigid() -> Self {
        Self {
            position: [0.0; 3],
            tex_coords: [0.0; 2],
            normal: [0.0, 1.0, 0.0],
            joints: [0; 4],
            weights: [1.0, 0.0, 0.0, 0.0],
        }
    }
}

impl Vertex for ModelVertex {
    fn desc() -> wgpu::VertexBufferLayout<'static> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<ModelVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 3]>() as wgpu::BufferAddress,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x2,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 5]>() as wgpu::BufferAddress,
                    shader_location: 2,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 8]>() as wgpu::BufferAddress,
                    shader_location: 3,
                    format: wgpu::VertexFormat::Uint32x4,
                },
                wgpu::VertexAttribute {
                    offset: mem::size_of::<[f32; 12]>() as wgpu::BufferAddress,
                    shader_location: 4,
                    format: wgpu::VertexFormat::Float32x4,
                },
            ],
        }
    }
}

#[derive(Debug)]
pub struct Mesh {
    pub name: String,
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub num_elements: u32,
    pub material: usize,
}

impl Mesh {
    pub fn from_geometry(device: &wgpu::Device, name: &str, geometry: &Geometry, material: usize) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Vertex Buffer", name)),
            contents: bytemuck::cast_slice(&geometry.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Index Buffer", name)),
            contents: bytemuck::cast_slice(&geometry.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            name: name.to_string(),
            vertex_buffer,
            index_buffer,
            num_elements: geometry.indices.len() as u32,
            material,
        }
    }
}

/// Which shading model a material is drawn with.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MaterialKind {
    /// Environment lit metal/roughness shading; reacts to `envMapIntensity`.
    Standard,
    /// Flat colour, unaffected by the environment.
    Basic,
}

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub base_color: [f32; 4],
    pub emissive: [f32; 3],
    /// Fragments with a lower alpha are discarded. Zero keeps everything.
    pub alpha_cutoff: f32,
    pub metallic: f32,
    pub roughness: f32,
    pub env_map_intensity: f32,
    /// 1.0 shades back faces with a flipped normal, 0.0 discards them.
    pub double_sided: f32,
}

impl MaterialUniform {
    pub fn basic(color: [f32; 3]) -> Self {
        Self {
            base_color: [color[0], color[1], color[2], 1.0],
            ..Default::default()
        }
    }

    /// Applies `intensity` if a `kind` material reacts to the environment.
    /// Returns whether the value changed.
    pub fn set_env_map_intensity(&mut self, kind: MaterialKind, intensity: f32) -> bool {
        if kind != MaterialKind::Standard || self.env_map_intensity == intensity {
            return false;
        }
        self.env_map_intensity = intensity;
        true
    }
}

impl Default for MaterialUniform {
    fn default() -> Self {
        Self {
            base_color: [1.0; 4],
            emissive: [0.0; 3],
            alpha_cutoff: 0.0,
            metallic: 1.0,
            roughness: 1.0,
            env_map_intensity: 1.0,
            double_sided: 0.0,
        }
    }
}

#[derive(Debug)]
pub struct Material {
    pub name: String,
    pub kind: MaterialKind,
    pub uniform: MaterialUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    #[allow(unused)]
    base_color: Texture,
    #[allow(unused)]
    metallic_roughness: Texture,
}

impl Material {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        name: &str,
        kind: MaterialKind,
        uniform: MaterialUniform,
        base_color: Texture,
        metallic_roughness: Texture,
    ) -> Self {
        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Material Buffer", name)),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&base_color.view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&base_color.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(&metallic_roughness.view),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::Sampler(&metallic_roughness.sampler),
                },
            ],
            label: Some(name),
        });

        Self {
            name: name.to_string(),
            kind,
            uniform,
            buffer,
            bind_group,
            base_color,
            metallic_roughness,
        }
    }

    /// Sets the environment intensity of standard materials. Returns whether
    /// the uniform changed and needs to be written.
    pub fn set_env_map_intensity(&mut self, intensity: f32) -> bool {
        self.uniform.set_env_map_intensity(self.kind, intensity)
    }

    pub fn write_to_buffer(&self, queue: &wgpu::Queue) {
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}

#[derive(Debug, Default)]
pub struct Model {
    pub meshes: Vec<Mesh>,
    pub materials: Vec<Material>,
}

impl Model {
    /// Sets `envMapIntensity` on every standard material and uploads the
    /// changed ones.
    pub fn update_all_materials(&mut self, queue: &wgpu::Queue, env_map_intensity: f32) {
        for material in self.materials.iter_mut() {
            if material.set_env_map_intensity(env_map_intensity) {
                material.write_to_buffer(queue);
            }
        }
    }
}

pub trait DrawModel {
    fn draw_mesh_instanced(
        &mut self,
        mesh: &Mesh,
        material: &Material,
        instances: Range<u32>,
        camera_bind_group: &wgpu::BindGroup,
    );
}

impl DrawModel for wgpu::RenderPass<'_> {
    fn draw_mesh_instanced(
        &mut self,
        mesh: &Mesh,
        material: &Material,
        instances: Range<u32>,
        camera_bind_group: &wgpu::BindGroup,
    ) {
        self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
        self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        self.set_bind_group(0, &material.bind_group, &[]);
        self.set_bind_group(1, camera_bind_group, &[]);
        self.draw_indexed(0..mesh.num_elements, 0, instances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_map_intensity_only_reaches_standard_materials() {
        let mut standard = MaterialUniform::default();
        assert!(standard.set_env_map_intensity(MaterialKind::Standard, 0.5));
        assert_eq!(standard.env_map_intensity, 0.5);
        // Unchanged values need no upload
        assert!(!standard.set_env_map_intensity(MaterialKind::Standard, 0.5));

        let mut ring = MaterialUniform::basic([10.0, 2.0, 2.0]);
        assert!(!ring.set_env_map_intensity(MaterialKind::Basic, 0.5));
        assert_eq!(ring, MaterialUniform::basic([10.0, 2.0, 2.0]));
    }
}
