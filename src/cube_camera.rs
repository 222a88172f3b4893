//! Dynamic environment capture.
//!
//! A [`CubeCamera`] renders the scene six times from one point, once per cube
//! face, into a half-float [`CubeTarget`]. The faces follow the wgpu cube
//! order `+X, -X, +Y, -Y, +Z, -Z`. Each face looks along its axis with a 90°
//! square frustum; the projection is mirrored horizontally because cube map
//! texel space is left-handed when seen from the inside.

use cgmath::{Matrix4, Point3, Vector3};
use wgpu::util::DeviceExt;

use crate::{
    camera::{CameraUniform, OPENGL_TO_WGPU_MATRIX},
    config::CubeCaptureConfig,
    data_structures::texture::CubeTarget,
    layers::Layers,
    pipelines::BindGroupLayouts,
};

/// Viewing direction and up vector of every face, in cube order.
pub const FACES: [([f32; 3], [f32; 3]); 6] = [
    ([1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ([0.0, 1.0, 0.0], [0.0, 0.0, -1.0]),
    ([0.0, -1.0, 0.0], [0.0, 0.0, 1.0]),
    ([0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
    ([0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
];

/// View-projection of cube face `face` seen from `position`.
pub fn face_view_proj(position: Point3<f32>, face: usize, near: f32, far: f32) -> Matrix4<f32> {
    let (direction, up) = FACES[face % 6];
    let view = Matrix4::look_at_rh(position, position + Vector3::from(direction), Vector3::from(up));
    let projection = Matrix4::from_nonuniform_scale(-1.0, 1.0, 1.0)
        * OPENGL_TO_WGPU_MATRIX
        * cgmath::perspective(cgmath::Deg(90.0), 1.0, near, far);
    projection * view
}

/// Samples shaders need to pick mip levels of the capture.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct EnvironmentUniform {
    pub max_lod: f32,
    _padding: [f32; 3],
}

impl EnvironmentUniform {
    pub fn new(mip_level_count: u32) -> Self {
        Self {
            max_lod: mip_level_count.saturating_sub(1) as f32,
            _padding: [0.0; 3],
        }
    }
}

// The capture point is fixed, so face uniforms are written once
#[derive(Debug)]
struct FaceCamera {
    #[allow(unused)]
    buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
}

#[derive(Debug)]
pub struct CubeCamera {
    pub layers: Layers,
    pub target: CubeTarget,
    faces: Vec<FaceCamera>,
    #[allow(unused)]
    environment_buffer: wgpu::Buffer,
    environment_bind_group: wgpu::BindGroup,
}

impl CubeCamera {
    pub fn new(device: &wgpu::Device, layouts: &BindGroupLayouts, config: &CubeCaptureConfig) -> Self {
        let position = Point3::from(config.position);
        let target = CubeTarget::new(device, config.resolution, "cube render target");

        let faces = (0..6)
            .map(|face| {
                let uniform = CameraUniform::from_view_proj(
                    position,
                    face_view_proj(position, face, config.near, config.far),
                );
                let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Cube Face {} Buffer", face)),
                    contents: bytemuck::cast_slice(&[uniform]),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                });
                let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                    layout: &layouts.camera,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                    label: Some("cube_face_bind_group"),
                });
                FaceCamera { buffer, bind_group }
            })
            .collect();

        let environment_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Environment Buffer"),
            contents: bytemuck::cast_slice(&[EnvironmentUniform::new(target.mip_level_count)]),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let environment_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &layouts.environment,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&target.cube_view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&target.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: environment_buffer.as_entire_binding(),
                },
            ],
            label: Some("environment_bind_group"),
        });

        log::info!(
            "cube camera at {:?}: {}px, {} mips, layer {}",
            config.position,
            target.resolution,
            target.mip_level_count,
            config.layer
        );

        Self {
            layers: Layers::only(config.layer),
            target,
            faces,
            environment_buffer,
            environment_bind_group,
        }
    }

    pub fn face_bind_group(&self, face: usize) -> &wgpu::BindGroup {
        &self.faces[face].bind_group
    }

    /// The captured cube, its sampler and mip count for lit shading.
    pub fn environment_bind_group(&self) -> &wgpu::BindGroup {
        &self.environment_bind_group
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cgmath::{InnerSpace, Vector4};

    fn project(m: &Matrix4<f32>, p: Vector3<f32>) -> Vector3<f32> {
        let clip = m * Vector4::new(p.x, p.y, p.z, 1.0);
        clip.truncate() / clip.w
    }

    // Texel axes of every face: +u grows to the right, +v grows downwards.
    const UV_AXES: [([f32; 3], [f32; 3]); 6] = [
        ([0.0, 0.0, -1.0], [0.0, -1.0, 0.0]),
        ([0.0, 0.0, 1.0], [0.0, -1.0, 0.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, -1.0, 0.0]),
    ];

    #[test]
    fn face_directions_land_in_the_face_centre() {
        let origin = Point3::new(0.0, 0.0, 0.0);
        for (face, (direction, _)) in FACES.iter().enumerate() {
            let m = face_view_proj(origin, face, 0.1, 100.0);
            let ndc = project(&m, Vector3::from(*direction) * 5.0);
            assert!(ndc.x.abs() < 1e-5 && ndc.y.abs() < 1e-5, "face {} centre {:?}", face, ndc);
            assert!(ndc.z > 0.0 && ndc.z < 1.0);
        }
    }

    #[test]
    fn texel_axes_match_screen_axes() {
        let origin = Point3::new(0.0, 0.0, 0.0);
        for face in 0..6 {
            let m = face_view_proj(origin, face, 0.1, 100.0);
            let forward = Vector3::from(FACES[face].0) * 5.0;
            let u = Vector3::from(UV_AXES[face].0);
            let v = Vector3::from(UV_AXES[face].1);
            let right = project(&m, forward + u);
            let down = project(&m, forward + v);
            assert!(right.x > 0.1 && right.y.abs() < 1e-5, "face {} u {:?}", face, right);
            assert!(down.y < -0.1 && down.x.abs() < 1e-5, "face {} v {:?}", face, down);
        }
    }

    #[test]
    fn faces_are_square_quarter_turn_frusta() {
        let m = face_view_proj(Point3::new(1.0, 2.0, 3.0), 4, 0.1, 100.0);
        // 45° off axis hits the frustum edge
        let edge = project(&m, Vector3::new(1.0, 2.0, 3.0) + Vector3::new(-1.0, 0.0, 1.0).normalize());
        assert!((edge.x.abs() - 1.0).abs() < 1e-4);
    }

    #[test]
    fn environment_lod_covers_the_chain() {
        assert_eq!(EnvironmentUniform::new(9).max_lod, 8.0);
        assert_eq!(std::mem::size_of::<EnvironmentUniform>(), 16);
    }
}
