//! Render composition and pipeline batching.
//!
//! Scene objects describe themselves as a [`Render`]. Before a camera draws,
//! the render tree is flattened into [`Batches`], keeping only what the
//! camera's [`Layers`] can see, so each pipeline is bound once per pass.
//!
//! # Key types
//!
//! - [`Render<'a>`] describes what to draw and with which pipeline
//! - [`Instanced<'a>`] is a model drawn with an instance buffer (the rings)
//! - [`Renderer`] owns the pipelines and records the cube capture, the main
//!   pass and the panel overlay
//!
//! The background is not subject to layers: every camera draws it.

use std::iter;

use crate::{
    context::Context,
    cube_camera::CubeCamera,
    data_structures::{
        animated_model::AnimatedModel,
        model::{DrawModel, Model},
        texture::CubeTarget,
    },
    layers::Layers,
    pipelines::{
        BindGroupLayouts, ScenePipelines,
        background::Background,
        downsample::Downsampler,
        mk_scene_pipelines,
        panel::{PanelOverlay, PanelVertex},
    },
};

/// A model drawn `amount` times from an instance buffer.
pub struct Instanced<'a> {
    pub instance: &'a wgpu::Buffer,
    pub model: &'a Model,
    pub amount: u32,
    pub layers: Layers,
}

/// Specifies how a scene object should be rendered.
///
/// - `Background` draws an equirectangular background behind everything
/// - `Unlit` renders flat coloured meshes
/// - `Lit` renders an animated model shaded by the captured environment
/// - `Composed` renders all of its children
pub enum Render<'a> {
    Background(&'a Background),
    Unlit(Instanced<'a>),
    Lit(&'a AnimatedModel),
    Composed(Vec<Render<'a>>),
}

/// Draw lists for one camera, one per pipeline.
#[derive(Default)]
pub struct Batches<'a> {
    pub backgrounds: Vec<&'a Background>,
    pub unlits: Vec<Instanced<'a>>,
    pub lits: Vec<&'a AnimatedModel>,
}

impl<'a> Render<'a> {
    /// Sorts `self` into `batches`, dropping objects `layers` cannot see.
    pub fn batch(self, layers: &Layers, batches: &mut Batches<'a>) {
        match self {
            Render::Background(background) => batches.backgrounds.push(background),
            Render::Unlit(instanced) => {
                if instanced.amount == 0 {
                    log::warn!("you attempted to render something with zero instances");
                } else if instanced.layers.test(layers) {
                    batches.unlits.push(instanced);
                }
            }
            Render::Lit(model) => {
                if model.layers.test(layers) {
                    batches.lits.push(model);
                }
            }
            Render::Composed(renders) => renders
                .into_iter()
                .for_each(|render| render.batch(layers, batches)),
        }
    }

    pub fn into_batches(self, layers: &Layers) -> Batches<'a> {
        let mut batches = Batches::default();
        self.batch(layers, &mut batches);
        batches
    }
}

/// Records every batch in pipeline order: background, unlit, lit.
///
/// Lit batches need `environment`; without one they are skipped.
pub fn draw_scene(
    render_pass: &mut wgpu::RenderPass<'_>,
    pipelines: &ScenePipelines,
    batches: &Batches<'_>,
    camera_bind_group: &wgpu::BindGroup,
    environment: Option<&wgpu::BindGroup>,
) {
    if !batches.backgrounds.is_empty() {
        render_pass.set_pipeline(&pipelines.background);
        for background in &batches.backgrounds {
            background.draw(render_pass, camera_bind_group);
        }
    }

    if !batches.unlits.is_empty() {
        render_pass.set_pipeline(&pipelines.unlit);
        for instanced in &batches.unlits {
            render_pass.set_vertex_buffer(1, instanced.instance.slice(..));
            for mesh in &instanced.model.meshes {
                match instanced.model.materials.get(mesh.material) {
                    Some(material) => {
                        render_pass.draw_mesh_instanced(mesh, material, 0..instanced.amount, camera_bind_group)
                    }
                    None => log::warn!("mesh {} references missing material {}", mesh.name, mesh.material),
                }
            }
        }
    }

    if batches.lits.is_empty() {
        return;
    }
    let Some(environment) = environment else {
        log::trace!("no environment bound, skipping {} lit models", batches.lits.len());
        return;
    };
    render_pass.set_pipeline(&pipelines.lit);
    render_pass.set_bind_group(2, environment, &[]);
    for model in &batches.lits {
        model.draw(render_pass, camera_bind_group);
    }
}

/// Where a frame is drawn to and with which camera.
pub struct FrameTarget<'a> {
    pub view: &'a wgpu::TextureView,
    pub depth: &'a wgpu::TextureView,
    pub camera_bind_group: &'a wgpu::BindGroup,
    pub clear_colour: wgpu::Color,
}

/// Owns every pipeline and records a frame.
#[derive(Debug)]
pub struct Renderer {
    main: ScenePipelines,
    capture: ScenePipelines,
    downsampler: Downsampler,
    panel: PanelOverlay,
}

impl Renderer {
    pub fn new(ctx: &Context, cube_camera: &CubeCamera) -> Self {
        let renderer = Self::for_format(&ctx.device, &ctx.layouts, ctx.config.format, cube_camera);
        log::info!("pipelines ready for {:?}", ctx.config.format);
        renderer
    }

    /// Builds the pipelines for targets of `color_format`, e.g. an offscreen
    /// texture instead of the window surface.
    pub fn for_format(
        device: &wgpu::Device,
        layouts: &BindGroupLayouts,
        color_format: wgpu::TextureFormat,
        cube_camera: &CubeCamera,
    ) -> Self {
        Self {
            main: mk_scene_pipelines(device, layouts, color_format, false),
            capture: mk_scene_pipelines(device, layouts, CubeTarget::FORMAT, true),
            downsampler: Downsampler::new(device, layouts, &cube_camera.target),
            panel: PanelOverlay::new(device, color_format),
        }
    }

    pub fn upload_panel(&mut self, ctx: &Context, vertices: &[PanelVertex]) {
        self.panel.upload(&ctx.device, &ctx.queue, vertices);
    }

    /// Renders the six cube faces from `cube_camera` and regenerates their
    /// mip chains.
    pub fn capture_environment(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        cube_camera: &CubeCamera,
        batches: &Batches<'_>,
        clear_colour: wgpu::Color,
    ) {
        let target = &cube_camera.target;
        for face in 0..6 {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Cube Capture Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target.face_view(face, 0),
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(clear_colour),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &target.depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Discard,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });
            // The capture is being written, so nothing may sample it here
            draw_scene(
                &mut render_pass,
                &self.capture,
                batches,
                cube_camera.face_bind_group(face),
                None,
            );
        }
        self.downsampler.generate(encoder, target);
    }

    /// Records cube capture, main pass and panel into `encoder`.
    pub fn record_frame(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &FrameTarget<'_>,
        cube_camera: &CubeCamera,
        capture: &Batches<'_>,
        main: &Batches<'_>,
    ) {
        self.capture_environment(encoder, cube_camera, capture, target.clear_colour);

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target.view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(target.clear_colour),
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: target.depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Clear(1.0),
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            occlusion_query_set: None,
            timestamp_writes: None,
        });

        draw_scene(
            &mut render_pass,
            &self.main,
            main,
            target.camera_bind_group,
            Some(cube_camera.environment_bind_group()),
        );
        self.panel.draw(&mut render_pass);
    }

    /// Records and presents one frame on the window surface.
    pub fn render(
        &self,
        ctx: &Context,
        cube_camera: &CubeCamera,
        capture: &Batches<'_>,
        main: &Batches<'_>,
    ) -> Result<(), wgpu::SurfaceError> {
        let output = ctx.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = ctx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        let target = FrameTarget {
            view: &view,
            depth: &ctx.depth_texture.view,
            camera_bind_group: &ctx.camera.bind_group,
            clear_colour: ctx.clear_colour,
        };
        self.record_frame(&mut encoder, &target, cube_camera, capture, main);

        ctx.queue.submit(iter::once(encoder.finish()));
        output.present();
        Ok(())
    }
}
