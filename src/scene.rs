//! The demo scene.
//!
//! [`Scene`] owns everything that is drawn: the environment background, the
//! two rings, the cube camera that captures them and the animated model that
//! reflects the capture. [`Scene::tick`] advances one frame and uploads the
//! changed uniforms; [`Scene::renders`] hands the drawables to the renderer.

use std::f32::consts::PI;

use wgpu::util::DeviceExt;
use winit::keyboard::Key;

use crate::{
    clock::{Clock, FrameTime},
    config::{RingConfig, SceneConfig},
    context::Context,
    cube_camera::CubeCamera,
    data_structures::{
        animated_model::AnimatedModel,
        geometry,
        instance::{Instance, InstanceRaw, euler_xyz},
        model::{Material, MaterialKind, MaterialUniform, Mesh, Model},
        texture::Texture,
    },
    debug::{DebugPanel, Tunable},
    layers::Layers,
    pipelines::{BindGroupLayouts, background::Background},
    render::{Instanced, Render},
    resources::ModelData,
};

/// Orientation of a ring `elapsed` seconds in: every Euler axis turned by
/// `π · elapsed · spin`.
pub fn ring_rotation(spin: f32, elapsed: f32) -> cgmath::Quaternion<f32> {
    let angle = PI * elapsed * spin;
    euler_xyz(angle, angle, angle)
}

/// A glowing torus spinning around its centre.
#[derive(Debug)]
pub struct Ring {
    pub model: Model,
    pub instance: Instance,
    pub spin: f32,
    pub layers: Layers,
    instance_buffer: wgpu::Buffer,
}

impl Ring {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &BindGroupLayouts,
        config: &RingConfig,
        name: &str,
    ) -> Self {
        let geometry = geometry::torus(
            config.radius,
            config.tube,
            config.radial_segments,
            config.tubular_segments,
        );
        let white = Texture::solid(device, queue, [255; 4], true, "ring texture");
        let material = Material::new(
            device,
            &layouts.material,
            name,
            MaterialKind::Basic,
            MaterialUniform::basic(config.color),
            white.clone(),
            white,
        );
        let model = Model {
            meshes: vec![Mesh::from_geometry(device, name, &geometry, 0)],
            materials: vec![material],
        };

        let instance = Instance::new()
            .with_position(config.position)
            .with_rotation(euler_xyz(PI / 2.0, 0.0, 0.0));
        let instance_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{} Instance Buffer", name)),
            contents: bytemuck::cast_slice::<InstanceRaw, u8>(&[instance.to_raw()]),
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
        });

        Self {
            model,
            instance,
            spin: config.spin,
            // Seen by the main camera and by the cube capture
            layers: Layers::default().with(1),
            instance_buffer,
        }
    }

    pub fn update(&mut self, elapsed: f32) {
        self.instance.rotation = ring_rotation(self.spin, elapsed);
    }

    pub fn write_to_buffer(&self, queue: &wgpu::Queue) {
        queue.write_buffer(
            &self.instance_buffer,
            0,
            bytemuck::cast_slice::<InstanceRaw, u8>(&[self.instance.to_raw()]),
        );
    }

    pub fn render(&self) -> Render<'_> {
        Render::Unlit(Instanced {
            instance: &self.instance_buffer,
            model: &self.model,
            amount: 1,
            layers: self.layers,
        })
    }
}

/// The loaded inputs of a [`Scene`], with failed loads already replaced.
#[derive(Debug)]
pub struct SceneAssets {
    pub environment: image::DynamicImage,
    pub model: Option<ModelData>,
}

impl SceneAssets {
    /// Neutral grey shown when the environment map cannot be loaded.
    pub const FALLBACK_ENVIRONMENT: [u8; 4] = [128, 128, 128, 255];

    /// A missing environment image falls back to a 1x1 grey map, a missing
    /// model leaves the rings on their own. Both failures are logged.
    pub fn from_loaded(
        environment: anyhow::Result<image::DynamicImage>,
        model: anyhow::Result<ModelData>,
    ) -> Self {
        let environment = environment.unwrap_or_else(|e| {
            log::error!("environment map unavailable, using a neutral background: {:#}", e);
            image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
                1,
                1,
                image::Rgba(Self::FALLBACK_ENVIRONMENT),
            ))
        });
        let model = model
            .map_err(|e| log::error!("model unavailable, showing the rings only: {:#}", e))
            .ok();
        Self { environment, model }
    }
}

#[derive(Debug)]
pub struct Scene {
    pub title: String,
    pub clock: Clock,
    pub background: Background,
    pub rings: Vec<Ring>,
    pub cube_camera: CubeCamera,
    pub model: Option<AnimatedModel>,
    pub panel: DebugPanel,
}

impl Scene {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layouts: &BindGroupLayouts,
        config: &SceneConfig,
        assets: SceneAssets,
    ) -> Self {
        let environment_texture = Texture::from_image(
            device,
            queue,
            &assets.environment,
            Some("environment map"),
            false,
            true,
        );
        let background = Background::new(
            device,
            layouts,
            environment_texture,
            config.tunables.background_intensity,
            config.tunables.background_blurriness,
        );

        let rings = config
            .rings
            .iter()
            .enumerate()
            .map(|(i, ring)| Ring::new(device, queue, layouts, ring, &format!("ring {}", i + 1)))
            .collect();

        let cube_camera = CubeCamera::new(device, layouts, &config.cube_capture);

        let model = assets.model.map(|data| {
            let root = Instance::new()
                .with_position(config.model_position)
                .with_uniform_scale(config.model_scale);
            let mut model = AnimatedModel::new(device, queue, layouts, &config.model, data, root);
            model.play_first_clip();
            model
        });

        let panel = DebugPanel::new(&config.tunables);
        let mut scene = Self {
            title: config.title.clone(),
            clock: Clock::start(),
            background,
            rings,
            cube_camera,
            model,
            panel,
        };
        scene.update_all_materials(queue, config.tunables.env_map_intensity);
        scene
    }

    /// Sets `envMapIntensity` on every environment lit material.
    pub fn update_all_materials(&mut self, queue: &wgpu::Queue, env_map_intensity: f32) {
        for ring in self.rings.iter_mut() {
            ring.model.update_all_materials(queue, env_map_intensity);
        }
        if let Some(model) = self.model.as_mut() {
            model.update_all_materials(queue, env_map_intensity);
        }
    }

    pub fn apply_tunable(&mut self, queue: &wgpu::Queue, tunable: Tunable, value: f32) {
        log::info!("{} = {:.3}", tunable.name(), value);
        match tunable {
            Tunable::EnvMapIntensity => self.update_all_materials(queue, value),
            Tunable::BackgroundBlurriness => {
                self.background.set_blurriness(value);
                self.background.write_to_buffer(queue);
            }
            Tunable::BackgroundIntensity => {
                self.background.set_intensity(value);
                self.background.write_to_buffer(queue);
            }
        }
    }

    /// Routes a key to the debug panel. Returns whether the panel changed
    /// and the window title should be refreshed.
    pub fn handle_key(&mut self, queue: &wgpu::Queue, key: &Key) -> bool {
        let before = self.panel.title(&self.title);
        if let Some((tunable, value)) = self.panel.handle_key(key) {
            self.apply_tunable(queue, tunable, value);
        }
        self.panel.title(&self.title) != before
    }

    pub fn window_title(&self) -> String {
        self.panel.title(&self.title)
    }

    /// Advances one frame: clock, rings, animation, orbit controls, then
    /// uploads everything that moved.
    pub fn tick(&mut self, ctx: &mut Context) -> FrameTime {
        let frame = self.clock.tick();

        for ring in self.rings.iter_mut() {
            ring.update(frame.elapsed);
            ring.write_to_buffer(&ctx.queue);
        }

        if let Some(model) = self.model.as_mut() {
            model.update(frame.delta);
            model.write_to_buffers(&ctx.queue);
        }

        let camera = &mut ctx.camera;
        camera.controls.update(&mut camera.camera);
        camera.write_to_buffer(&ctx.queue, &ctx.projection);

        frame
    }

    pub fn renders(&self) -> Render<'_> {
        let mut renders = vec![Render::Background(&self.background)];
        renders.extend(self.rings.iter().map(Ring::render));
        if let Some(model) = &self.model {
            renders.push(Render::Lit(model));
        }
        Render::Composed(renders)
    }
}
