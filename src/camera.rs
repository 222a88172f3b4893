//! Camera, projection and orbit controls.
//!
//! The camera looks from an eye position at a target. [`OrbitControls`] moves
//! the eye on a sphere around the target from mouse input: left drag orbits,
//! right drag pans and the wheel dollies. With damping enabled the motion eases
//! out over the following frames, so [`OrbitControls::update`] has to run every
//! frame.

use std::f32::consts::{PI, TAU};

use cgmath::*;
use wgpu::util::DeviceExt;

use crate::layers::Layers;

#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Keeps the polar angle off the poles where the look-at basis degenerates.
const POLE_EPSILON: f32 = 1e-6;

#[derive(Clone, Debug, PartialEq)]
pub struct Camera {
    pub position: Point3<f32>,
    pub target: Point3<f32>,
    pub up: Vector3<f32>,
}

impl Camera {
    pub fn new<P: Into<Point3<f32>>, T: Into<Point3<f32>>>(position: P, target: T) -> Self {
        Self {
            position: position.into(),
            target: target.into(),
            up: Vector3::unit_y(),
        }
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_at_rh(self.position, self.target, self.up)
    }

    /// Camera right and up axes in world space.
    pub fn basis(&self) -> (Vector3<f32>, Vector3<f32>) {
        let forward = (self.target - self.position).normalize();
        let right = forward.cross(self.up).normalize();
        (right, right.cross(forward))
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Projection {
    aspect: f32,
    pub fovy: Rad<f32>,
    pub znear: f32,
    pub zfar: f32,
}

impl Projection {
    pub fn new<F: Into<Rad<f32>>>(width: f32, height: f32, fovy: F, znear: f32, zfar: f32) -> Self {
        let mut projection = Self {
            aspect: 1.0,
            fovy: fovy.into(),
            znear,
            zfar,
        };
        projection.resize(width, height);
        projection
    }

    /// Aspect from a logical size; degenerate sizes keep the previous aspect.
    pub fn resize(&mut self, width: f32, height: f32) {
        if width > 0.0 && height > 0.0 {
            self.aspect = width / height;
        }
    }

    pub fn aspect(&self) -> f32 {
        self.aspect
    }

    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    pub view_position: [f32; 4],
    pub view_proj: [[f32; 4]; 4],
    /// Unprojects clip space positions, used by the background.
    pub inv_view_proj: [[f32; 4]; 4],
}

impl Default for CameraUniform {
    fn default() -> Self {
        Self::new()
    }
}

impl CameraUniform {
    pub fn new() -> Self {
        Self {
            view_position: [0.0; 4],
            view_proj: Matrix4::identity().into(),
            inv_view_proj: Matrix4::identity().into(),
        }
    }

    pub fn update_view_proj(&mut self, camera: &Camera, projection: &Projection) {
        *self = Self::from_view_proj(camera.position, projection.calc_matrix() * camera.calc_matrix());
    }

    pub fn from_view_proj(eye: Point3<f32>, view_proj: Matrix4<f32>) -> Self {
        Self {
            view_position: eye.to_homogeneous().into(),
            view_proj: view_proj.into(),
            inv_view_proj: view_proj.invert().unwrap_or_else(Matrix4::identity).into(),
        }
    }
}

/// Spherical coordinates with +Y as the pole: `phi` from +Y, `theta` around
/// Y starting at +Z.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Spherical {
    pub radius: f32,
    pub phi: f32,
    pub theta: f32,
}

impl Spherical {
    pub fn from_vector(v: Vector3<f32>) -> Self {
        let radius = v.magnitude();
        if radius == 0.0 {
            return Self {
                radius,
                phi: 0.0,
                theta: 0.0,
            };
        }
        Self {
            radius,
            theta: v.x.atan2(v.z),
            phi: (v.y / radius).clamp(-1.0, 1.0).acos(),
        }
    }

    pub fn to_vector(&self) -> Vector3<f32> {
        let sin_phi_radius = self.phi.sin() * self.radius;
        Vector3::new(
            sin_phi_radius * self.theta.sin(),
            self.phi.cos() * self.radius,
            sin_phi_radius * self.theta.cos(),
        )
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum DragState {
    None,
    Rotate,
    Pan,
}

#[derive(Clone, Debug)]
pub struct OrbitControls {
    pub enable_damping: bool,
    pub damping_factor: f32,
    pub rotate_speed: f32,
    pub pan_speed: f32,
    pub zoom_speed: f32,
    pub min_distance: f32,
    pub max_distance: f32,
    pub min_polar_angle: f32,
    pub max_polar_angle: f32,
    fovy: Rad<f32>,
    spherical_delta: Spherical,
    pan_offset: Vector3<f32>,
    scale: f32,
    state: DragState,
    cursor: Option<(f64, f64)>,
}

impl OrbitControls {
    pub fn new<F: Into<Rad<f32>>>(fovy: F, enable_damping: bool, damping_factor: f32) -> Self {
        Self {
            enable_damping,
            damping_factor,
            rotate_speed: 1.0,
            pan_speed: 1.0,
            zoom_speed: 1.0,
            min_distance: 0.0,
            max_distance: f32::INFINITY,
            min_polar_angle: 0.0,
            max_polar_angle: PI,
            fovy: fovy.into(),
            spherical_delta: Spherical {
                radius: 0.0,
                phi: 0.0,
                theta: 0.0,
            },
            pan_offset: Vector3::zero(),
            scale: 1.0,
            state: DragState::None,
            cursor: None,
        }
    }

    pub fn rotate_left(&mut self, angle: f32) {
        self.spherical_delta.theta -= angle;
    }

    pub fn rotate_up(&mut self, angle: f32) {
        self.spherical_delta.phi -= angle;
    }

    /// Moves the target along the camera axes, in world units.
    pub fn pan_by(&mut self, camera: &Camera, right: f32, up: f32) {
        let (right_axis, up_axis) = camera.basis();
        self.pan_offset += right_axis * right + up_axis * up;
    }

    pub fn dolly_in(&mut self, scale: f32) {
        self.scale *= scale;
    }

    pub fn dolly_out(&mut self, scale: f32) {
        self.scale /= scale;
    }

    fn zoom_scale(&self) -> f32 {
        0.95f32.powf(self.zoom_speed)
    }

    pub fn process_mouse_button(&mut self, button: winit::event::MouseButton, pressed: bool) {
        use winit::event::MouseButton;
        self.state = match (button, pressed) {
            (MouseButton::Left, true) => DragState::Rotate,
            (MouseButton::Right, true) | (MouseButton::Middle, true) => DragState::Pan,
            (_, false) => DragState::None,
            (_, true) => self.state,
        };
    }

    /// Cursor position and window height in the same (physical) units.
    pub fn process_cursor_moved(&mut self, x: f64, y: f64, height: f32, camera: &Camera) {
        let previous = self.cursor.replace((x, y));
        let Some((px, py)) = previous else {
            return;
        };
        let (dx, dy) = ((x - px) as f32, (y - py) as f32);
        let height = height.max(1.0);
        match self.state {
            DragState::Rotate => {
                self.rotate_left(TAU * dx * self.rotate_speed / height);
                self.rotate_up(TAU * dy * self.rotate_speed / height);
            }
            DragState::Pan => {
                let target_distance =
                    (camera.position - camera.target).magnitude() * (self.fovy.0 / 2.0).tan();
                let right = -2.0 * dx * self.pan_speed * target_distance / height;
                let up = 2.0 * dy * self.pan_speed * target_distance / height;
                self.pan_by(camera, right, up);
            }
            DragState::None => {}
        }
    }

    pub fn process_scroll(&mut self, delta: &winit::event::MouseScrollDelta) {
        let amount = match delta {
            winit::event::MouseScrollDelta::LineDelta(_, y) => *y,
            winit::event::MouseScrollDelta::PixelDelta(position) => position.y as f32,
        };
        if amount > 0.0 {
            self.dolly_in(self.zoom_scale());
        } else if amount < 0.0 {
            self.dolly_out(self.zoom_scale());
        }
    }

    pub fn cursor_left(&mut self) {
        self.cursor = None;
        self.state = DragState::None;
    }

    /// Applies pending input to `camera`. Returns whether the camera moved.
    pub fn update(&mut self, camera: &mut Camera) -> bool {
        let offset = camera.position - camera.target;
        let mut spherical = Spherical::from_vector(offset);

        let factor = if self.enable_damping { self.damping_factor } else { 1.0 };
        spherical.theta += self.spherical_delta.theta * factor;
        spherical.phi += self.spherical_delta.phi * factor;

        let min_polar = self.min_polar_angle.max(POLE_EPSILON);
        let max_polar = self.max_polar_angle.min(PI - POLE_EPSILON).max(min_polar);
        spherical.phi = spherical.phi.clamp(min_polar, max_polar);
        spherical.radius = (spherical.radius * self.scale).clamp(self.min_distance, self.max_distance);

        camera.target += self.pan_offset * factor;
        let position = camera.target + spherical.to_vector();
        let moved = (position - camera.position).magnitude2() > 1e-8;
        camera.position = position;

        if self.enable_damping {
            self.spherical_delta.theta *= 1.0 - self.damping_factor;
            self.spherical_delta.phi *= 1.0 - self.damping_factor;
            self.pan_offset *= 1.0 - self.damping_factor;
        } else {
            self.spherical_delta.theta = 0.0;
            self.spherical_delta.phi = 0.0;
            self.pan_offset = Vector3::zero();
        }
        self.scale = 1.0;
        moved
    }
}

#[derive(Debug)]
pub struct CameraResources {
    pub camera: Camera,
    pub controls: OrbitControls,
    pub uniform: CameraUniform,
    pub buffer: wgpu::Buffer,
    pub bind_group: wgpu::BindGroup,
    pub layers: Layers,
}

impl CameraResources {
    pub fn new(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        camera: Camera,
        controls: OrbitControls,
        projection: &Projection,
    ) -> Self {
        let mut uniform = CameraUniform::new();
        uniform.update_view_proj(&camera, projection);

        let buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: buffer.as_entire_binding(),
            }],
            label: Some("camera_bind_group"),
        });

        Self {
            camera,
            controls,
            uniform,
            buffer,
            bind_group,
            layers: Layers::default(),
        }
    }

    pub fn write_to_buffer(&mut self, queue: &wgpu::Queue, projection: &Projection) {
        self.uniform.update_view_proj(&self.camera, projection);
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(&[self.uniform]));
    }
}
