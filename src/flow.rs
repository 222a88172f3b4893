//! Application event loop.
//!
//! [`App`] implements winit's `ApplicationHandler`. On `resumed` it creates
//! the window and the GPU [`Context`], loads the environment image and the
//! model concurrently and assembles the [`Scene`] and the [`Renderer`]. On
//! native targets this happens synchronously on a tokio runtime; on the web
//! the setup runs through `spawn_local` and arrives back in the event loop as
//! [`FlowEvent::Initialized`].
//!
//! # Lifecycle
//!
//! Every frame (`RedrawRequested`):
//! 1. the scene ticks: clock, rings, animation mixer, orbit controls, uniforms
//! 2. the cube camera captures the layer 1 objects and rebuilds its mips
//! 3. the main camera renders background, rings and model
//! 4. the debug panel is drawn on top, the frame is presented
//! 5. the next frame is requested

use std::{fmt::Debug, sync::Arc};

use winit::{
    application::ApplicationHandler,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{Key, NamedKey},
    window::Window,
};

use crate::{
    config::SceneConfig,
    context::Context,
    render::Renderer,
    resources,
    scene::{Scene, SceneAssets},
};

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::JsCast;

/// The page must provide `<canvas class="webgl">`.
#[cfg(target_arch = "wasm32")]
const CANVAS_SELECTOR: &str = "canvas.webgl";

/// Everything that exists once the window and the GPU are ready.
#[derive(Debug)]
pub struct AppState {
    pub(crate) ctx: Context,
    scene: Scene,
    renderer: Renderer,
    is_surface_configured: bool,
}

impl AppState {
    async fn new(window: Arc<Window>, config: SceneConfig) -> anyhow::Result<Self> {
        let ctx = Context::new(window, &config).await?;
        let assets = load_assets(&config).await;
        let scene = Scene::new(&ctx.device, &ctx.queue, &ctx.layouts, &config, assets);
        let renderer = Renderer::new(&ctx, &scene.cube_camera);
        ctx.window().set_title(&scene.window_title());
        log::info!("scene ready");
        Ok(Self {
            ctx,
            scene,
            renderer,
            is_surface_configured: !cfg!(target_arch = "wasm32"),
        })
    }

    fn resize(&mut self, size: winit::dpi::PhysicalSize<u32>, scale_factor: f64) {
        if size.width > 0 && size.height > 0 {
            self.ctx.resize(size, scale_factor);
            self.is_surface_configured = true;
        }
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        // invoke main render loop
        self.ctx.window.request_redraw();

        // Rendering requires the surface to be configured
        if !self.is_surface_configured {
            return Ok(());
        }

        self.scene.tick(&mut self.ctx);

        let vertices = self.scene.panel.vertices(
            self.ctx.viewport.width as f32,
            self.ctx.viewport.height as f32,
        );
        self.renderer.upload_panel(&self.ctx, &vertices);

        let capture = self
            .scene
            .renders()
            .into_batches(&self.scene.cube_camera.layers);
        let main = self.scene.renders().into_batches(&self.ctx.camera.layers);
        self.renderer
            .render(&self.ctx, &self.scene.cube_camera, &capture, &main)
    }

    fn handle_key(&mut self, event: &KeyEvent) {
        if event.state != ElementState::Pressed {
            return;
        }
        if self.scene.handle_key(&self.ctx.queue, &event.logical_key) {
            self.ctx.window().set_title(&self.scene.window_title());
        }
    }
}

/// Loads the environment image and the model side by side. Failures are
/// logged and replaced, see [`SceneAssets::from_loaded`].
async fn load_assets(config: &SceneConfig) -> SceneAssets {
    let environment_path = config.environment_map_path();
    let model_path = config.model_path();
    log::info!("loading {} and {}", environment_path, model_path);

    let (environment, model) = futures::join!(
        resources::load_image(&environment_path),
        resources::load_model_data(&model_path),
    );
    SceneAssets::from_loaded(environment, model)
}

pub(crate) enum FlowEvent {
    #[allow(dead_code)]
    Initialized(Box<AppState>),
    #[allow(dead_code)]
    Exit,
}

impl Debug for FlowEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Initialized(_) => f.write_str("Initialized"),
            Self::Exit => f.write_str("Exit"),
        }
    }
}

pub struct App {
    #[cfg(not(target_arch = "wasm32"))]
    async_runtime: tokio::runtime::Runtime,
    #[allow(dead_code)]
    proxy: winit::event_loop::EventLoopProxy<FlowEvent>,
    config: SceneConfig,
    state: Option<AppState>,
    // Setup failure reported by `run` once the loop has exited
    error: Option<anyhow::Error>,
}

impl App {
    fn new(event_loop: &EventLoop<FlowEvent>, config: SceneConfig) -> anyhow::Result<Self> {
        let proxy = event_loop.create_proxy();
        #[cfg(not(target_arch = "wasm32"))]
        let async_runtime = tokio::runtime::Runtime::new()?;
        Ok(Self {
            #[cfg(not(target_arch = "wasm32"))]
            async_runtime,
            proxy,
            config,
            state: None,
            error: None,
        })
    }
}

impl ApplicationHandler<FlowEvent> for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.state.is_some() {
            return;
        }

        #[allow(unused_mut)]
        let mut window_attributes = Window::default_attributes().with_title(self.config.title.clone());

        #[cfg(target_arch = "wasm32")]
        {
            use winit::platform::web::WindowAttributesExtWebSys;

            let canvas = wgpu::web_sys::window()
                .and_then(|window| window.document())
                .and_then(|document| document.query_selector(CANVAS_SELECTOR).ok().flatten());
            window_attributes = match canvas {
                Some(canvas) => window_attributes.with_canvas(Some(canvas.unchecked_into())),
                None => {
                    log::warn!("no {} on the page, appending a new canvas", CANVAS_SELECTOR);
                    window_attributes.with_append(true)
                }
            };
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("cannot create the window: {}", e);
                self.error = Some(e.into());
                event_loop.exit();
                return;
            }
        };

        let init_future = AppState::new(window, self.config.clone());

        #[cfg(not(target_arch = "wasm32"))]
        {
            match self.async_runtime.block_on(init_future) {
                Ok(state) => {
                    state.ctx.window().request_redraw();
                    self.state = Some(state);
                }
                Err(e) => {
                    log::error!("App initialization failed: {:#}", e);
                    self.error = Some(e);
                    event_loop.exit();
                }
            }
        }

        #[cfg(target_arch = "wasm32")]
        {
            let proxy = self.proxy.clone();
            wasm_bindgen_futures::spawn_local(async move {
                match init_future.await {
                    Ok(state) => {
                        if proxy.send_event(FlowEvent::Initialized(Box::new(state))).is_err() {
                            log::error!("the event loop closed before the scene was ready");
                        }
                    }
                    Err(e) => {
                        log::error!("App initialization failed: {:#}", e);
                        let _ = proxy.send_event(FlowEvent::Exit);
                    }
                }
            });
        }
    }

    fn user_event(&mut self, event_loop: &ActiveEventLoop, event: FlowEvent) {
        match event {
            FlowEvent::Initialized(state) => {
                // This is the message from our wasm `spawn_local`
                let mut state = *state;
                let size = state.ctx.window().inner_size();
                let scale_factor = state.ctx.window().scale_factor();
                state.resize(size, scale_factor);
                state.ctx.window().request_redraw();
                self.state = Some(state);
            }
            FlowEvent::Exit => event_loop.exit(),
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        let state = match &mut self.state {
            Some(state) => state,
            None => return,
        };

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => {
                let scale_factor = state.ctx.window().scale_factor();
                state.resize(size, scale_factor);
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                let size = state.ctx.window().inner_size();
                state.resize(size, scale_factor);
            }
            WindowEvent::ModifiersChanged(modifiers) => {
                state.scene.panel.set_modifiers(modifiers.state());
            }
            WindowEvent::KeyboardInput { event, .. } => {
                if event.state.is_pressed() && event.logical_key == Key::Named(NamedKey::Escape) {
                    event_loop.exit();
                } else {
                    state.handle_key(&event);
                }
            }
            WindowEvent::MouseInput {
                state: button_state,
                button,
                ..
            } => {
                state
                    .ctx
                    .camera
                    .controls
                    .process_mouse_button(button, button_state.is_pressed());
            }
            WindowEvent::CursorMoved { position, .. } => {
                let height = state.ctx.window().inner_size().height as f32;
                let camera = &mut state.ctx.camera;
                camera
                    .controls
                    .process_cursor_moved(position.x, position.y, height, &camera.camera);
            }
            WindowEvent::CursorLeft { .. } => state.ctx.camera.controls.cursor_left(),
            WindowEvent::MouseWheel { delta, .. } => {
                state.ctx.camera.controls.process_scroll(&delta);
            }
            WindowEvent::RedrawRequested => match state.render() {
                Ok(()) => (),
                // Reconfigure the surface if it's lost or outdated
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::warn!("surface lost or outdated, reconfiguring");
                    state.ctx.reconfigure();
                }
                Err(e) => {
                    log::error!("Unable to render {}", e);
                }
            },
            _ => {}
        }
    }
}

/// Opens the window and runs the demo until it is closed.
pub fn run(config: SceneConfig) -> anyhow::Result<()> {
    #[cfg(not(target_arch = "wasm32"))]
    {
        if let Err(e) = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init() {
            println!("Warning: Could not initialize logger: {}", e);
        };
    }

    #[cfg(target_arch = "wasm32")]
    {
        if let Err(e) = console_log::init_with_level(log::Level::Info) {
            web_sys::console::warn_1(&format!("Could not initialize logger: {}", e).into());
        }
    }

    let event_loop: EventLoop<FlowEvent> = EventLoop::with_user_event().build()?;

    let mut app = App::new(&event_loop, config)?;

    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

#[cfg(all(test, not(target_arch = "wasm32")))]
mod tests {
    use super::*;

    #[test]
    fn missing_assets_leave_a_runnable_scene() {
        let config = SceneConfig {
            assets_root: "does/not/exist".to_string(),
            ..SceneConfig::default()
        };
        let runtime = tokio::runtime::Runtime::new().unwrap();
        let assets = runtime.block_on(load_assets(&config));
        assert!(assets.model.is_none());
        assert_eq!(
            image::GenericImageView::get_pixel(&assets.environment, 0, 0),
            image::Rgba(SceneAssets::FALLBACK_ENVIRONMENT)
        );
    }
}
