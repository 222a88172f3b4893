//! A glTF model on the GPU together with its animation rig.
//!
//! [`AnimatedModel`] owns the uploaded meshes and materials, the node
//! hierarchy, skins, clips and the mixer playing them. Every node that draws
//! a mesh gets a joint palette: the skinning matrices of its skin, or a single
//! matrix with the node's own transform for rigid meshes. The vertex shader
//! blends the palette by the vertex weights, so rigid and skinned meshes share
//! one pipeline.

use std::{collections::HashMap, ops::Range};

use cgmath::SquareMatrix;
use wgpu::util::DeviceExt;

use crate::{
    data_structures::{
        geometry::Geometry,
        instance::{Instance, InstanceRaw},
        mixer::AnimationMixer,
        model::{DrawModel, Material, MaterialKind, MaterialUniform, Mesh, Model},
        scene_graph::{NodeId, SceneGraph},
        texture::Texture,
    },
    layers::Layers,
    pipelines::BindGroupLayouts,
    resources::{ModelData, Skin, animation::AnimationClip},
};

/// Joints per palette; must match the skin array in the lit shader.
pub const MAX_JOINTS: usize = 128;

const PALETTE_SIZE: wgpu::BufferAddress =
    (MAX_JOINTS * std::mem::size_of::<[[f32; 4]; 4]>()) as wgpu::BufferAddress;

/// Skinning matrices for the mesh at `node`, relative to the model root.
pub fn joint_palette(graph: &SceneGraph, skin: Option<&Skin>, node: NodeId) -> Vec<cgmath::Matrix4<f32>> {
    match skin {
        Some(skin) => skin
            .joints
            .iter()
            .take(MAX_JOINTS)
            .zip(skin.inverse_bind_matrices.iter())
            .map(|(&joint, inverse_bind)| {
                graph
                    .world_transform(joint)
                    .unwrap_or_else(cgmath::Matrix4::identity)
                    * inverse_bind
            })
            .collect(),
        None => vec![
            graph
                .world_transform(node)
                .unwrap_or_else(cgmath::Matrix4::identity),
        ],
    }
}

/// A scene node that draws meshes, with its joint palette on the GPU.
#[derive(Debug)]
pub struct NodeDraw {
    pub node: NodeId,
    /// Indices into [`Model::meshes`].
    pub meshes: Range<usize>,
    pub skin: Option<usize>,
    pub joint_buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    palette: Vec<[[f32; 4]; 4]>,
}

#[derive(Debug)]
pub struct AnimatedModel {
    pub name: String,
    pub model: Model,
    pub graph: SceneGraph,
    pub skins: Vec<Skin>,
    pub clips: Vec<AnimationClip>,
    pub mixer: AnimationMixer,
    /// Placement of the whole model in the world.
    pub root: Instance,
    pub instance_buffer: wgpu::Buffer,
    pub draws: Vec<NodeDraw>,
    pub layers: Layers,
}

impl AnimatedModel {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &BindGroupLayouts,
        name: &str,
        data: ModelData,
        root: Instance,
    ) -> Self {
        let ModelData {
            meshes: mesh_data,
            materials: material_data,
            images,
            graph,
            mut skins,
            clips,
        } = data;

        for skin in skins.iter_mut() {
            if skin.joints.len() > MAX_JOINTS {
                log::warn!(
                    "skin {} of {} has {} joints, only the first {} are used",
                    skin.name,
                    name,
                    skin.joints.len(),
                    MAX_JOINTS
                );
                skin.joints.truncate(MAX_JOINTS);
                skin.inverse_bind_matrices.truncate(MAX_JOINTS);
            }
        }

        // Textures are shared between materials; colour maps are sRGB, data maps linear
        let mut textures: HashMap<(usize, bool), Texture> = HashMap::new();
        let white = Texture::solid(device, queue, [255; 4], true, "white texture");
        let mut texture_for = |image: Option<usize>, linear: bool| -> Texture {
            let Some(idx) = image else {
                return white.clone();
            };
            let Some(Some(img)) = images.get(idx) else {
                return white.clone();
            };
            textures
                .entry((idx, linear))
                .or_insert_with(|| {
                    Texture::from_image(
                        device,
                        queue,
                        img,
                        Some(&format!("{} image {}", name, idx)),
                        linear,
                        false,
                    )
                })
                .clone()
        };

        let mut materials: Vec<Material> = material_data
            .iter()
            .map(|data| {
                let uniform = MaterialUniform {
                    base_color: data.base_color_factor,
                    emissive: data.emissive_factor,
                    alpha_cutoff: data.alpha_cutoff.unwrap_or(0.0),
                    metallic: data.metallic_factor,
                    roughness: data.roughness_factor,
                    env_map_intensity: 1.0,
                    double_sided: if data.double_sided { 1.0 } else { 0.0 },
                };
                Material::new(
                    device,
                    &layouts.material,
                    &data.name,
                    MaterialKind::Standard,
                    uniform,
                    texture_for(data.base_color_texture, false),
                    texture_for(data.metallic_roughness_texture, true),
                )
            })
            .collect();

        let mut default_material = None;
        let mut meshes = Vec::new();
        let mut mesh_ranges = Vec::with_capacity(mesh_data.len());
        for data in &mesh_data {
            let start = meshes.len();
            for (idx, primitive) in data.primitives.iter().enumerate() {
                let material = match primitive.material {
                    Some(material) if material < materials.len() => material,
                    _ => *default_material.get_or_insert_with(|| {
                        materials.push(Material::new(
                            device,
                            &layouts.material,
                            "default",
                            MaterialKind::Standard,
                            MaterialUniform::default(),
                            white.clone(),
                            white.clone(),
                        ));
                        materials.len() - 1
                    }),
                };
                let geometry = Geometry {
                    vertices: primitive.vertices.clone(),
                    indices: primitive.indices.clone(),
                };
                meshes.push(Mesh::from_geometry(
                    device,
                    &format!("{} {}", data.name, idx),
                    &geometry,
                    material,
                ));
            }
            mesh_ranges.push(start..meshes.len());
        }

        let mut draws = Vec::new();
        graph.traverse(|id, node| {
            let Some(range) = node.mesh.and_then(|mesh| mesh_ranges.get(mesh)) else {
                return;
            };
            let skin = node.skin.filter(|&skin| skin < skins.len());
            let skinned_data = node
                .mesh
                .and_then(|mesh| mesh_data.get(mesh))
                .is_some_and(|mesh| mesh.primitives.iter().any(|p| p.skinned));
            if skinned_data && skin.is_none() {
                log::warn!("node {} has skinning attributes but no skin", node.name);
            }

            let joint_buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("{} joint buffer", node.name)),
                size: PALETTE_SIZE,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(&format!("{} joint bind group", node.name)),
                layout: &layouts.skin,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: joint_buffer.as_entire_binding(),
                }],
            });
            draws.push(NodeDraw {
                node: id,
                meshes: range.clone(),
                skin,
                joint_buffer,
                bind_group,
                palette: Vec::new(),
            });
        });

        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Instance Buffer", name)),
            contents: bytemuck::cast_slice(&[root.to_raw()]),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        log::info!(
            "model {}: {} meshes, {} materials, {} nodes, {} skins, {} clips",
            name,
            meshes.len(),
            materials.len(),
            graph.len(),
            skins.len(),
            clips.len()
        );

        let mut model = Self {
            name: name.to_string(),
            model: Model { meshes, materials },
            graph,
            skins,
            clips,
            mixer: AnimationMixer::new(),
            root,
            instance_buffer,
            draws,
            layers: Layers::default(),
        };
        model.update(0.0);
        model
    }

    /// Starts the first clip, looping. Returns false when the model has none.
    pub fn play_first_clip(&mut self) -> bool {
        match self.clips.first() {
            Some(clip) => {
                log::info!("playing clip {} ({:.2}s) on {}", clip.name, clip.duration, self.name);
                self.mixer.clip_action(0).play();
                true
            }
            None => {
                log::warn!("model {} has no animations, showing its rest pose", self.name);
                false
            }
        }
    }

    /// Advances the animation and refreshes the joint palettes.
    pub fn update(&mut self, delta: f32) {
        if !self.clips.is_empty() {
            self.mixer.update(delta, &self.clips, &mut self.graph);
        }
        self.graph.update_world_transforms(&cgmath::Matrix4::identity());
        for draw in self.draws.iter_mut() {
            let skin = draw.skin.and_then(|skin| self.skins.get(skin));
            draw.palette = joint_palette(&self.graph, skin, draw.node)
                .into_iter()
                .map(Into::into)
                .collect();
        }
    }

    pub fn write_to_buffers(&self, queue: &wgpu::Queue) {
        queue.write_buffer(
            &self.instance_buffer,
            0,
            bytemuck::cast_slice::<InstanceRaw, u8>(&[self.root.to_raw()]),
        );
        for draw in &self.draws {
            queue.write_buffer(&draw.joint_buffer, 0, bytemuck::cast_slice(&draw.palette));
        }
    }

    pub fn update_all_materials(&mut self, queue: &wgpu::Queue, env_map_intensity: f32) {
        self.model.update_all_materials(queue, env_map_intensity);
    }

    /// Expects the lit pipeline and the environment bind group to be set.
    pub fn draw(&self, render_pass: &mut wgpu::RenderPass<'_>, camera_bind_group: &wgpu::BindGroup) {
        render_pass.set_vertex_buffer(1, self.instance_buffer.slice(..));
        for draw in &self.draws {
            render_pass.set_bind_group(3, &draw.bind_group, &[]);
            for mesh in &self.model.meshes[draw.meshes.clone()] {
                match self.model.materials.get(mesh.material) {
                    Some(material) => {
                        render_pass.draw_mesh_instanced(mesh, material, 0..1, camera_bind_group)
                    }
                    None => log::warn!("mesh {} references missing material {}", mesh.name, mesh.material),
                }
            }
        }
    }
}
