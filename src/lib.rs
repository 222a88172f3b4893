//! envmap-rings
//!
//! A small real-time scene for native targets and the web: an equirectangular
//! environment as background, an animated glTF model that reflects a cube map
//! captured every frame, and two emissive rings spinning around it. Orbit
//! controls move the camera, a keyboard driven debug panel tunes the
//! environment.
//!
//! High-level modules
//! - `camera`: camera, projection, orbit controls and the camera uniform
//! - `clock`: frame timing
//! - `config`: every constant of the scene
//! - `context`: window, GPU device and surface, viewport bookkeeping
//! - `cube_camera`: six-face environment capture
//! - `data_structures`: meshes, materials, instances, scene graph, mixer
//! - `debug`: the tunables and their panel
//! - `flow`: the winit event loop
//! - `layers`: camera/object visibility masks
//! - `pipelines`: bind group layouts, render pipelines and shaders
//! - `render`: render composition, batching and frame recording
//! - `resources`: asset loading and glTF decoding
//! - `scene`: the rings, the model and the per-frame update
//!

pub mod camera;
pub mod clock;
pub mod config;
pub mod context;
pub mod cube_camera;
pub mod data_structures;
pub mod debug;
pub mod flow;
pub mod layers;
pub mod pipelines;
pub mod render;
pub mod resources;
pub mod scene;

pub use config::SceneConfig;

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

/// Entry point of the web build.
#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub fn run_web() -> Result<(), JsValue> {
    flow::run(SceneConfig::from_env()).map_err(|e| JsValue::from_str(&format!("{:#}", e)))
}
