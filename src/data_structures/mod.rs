//! Scene data: GPU models and textures, instances, the node hierarchy and
//! its animation.
//!
//! - `model` contains mesh and material definitions, GPU resources for 3D models
//! - `animated_model` pairs a model with its scene graph, skins and mixer
//! - `texture` contains the GPU texture wrapper and the cube render target
//! - `instance` holds per-instance transformation data
//! - `geometry` builds procedural meshes
//! - `scene_graph` enables hierarchical scene organization
//! - `mixer` plays and blends animation clips

pub mod animated_model;
pub mod geometry;
pub mod instance;
pub mod mixer;
pub mod model;
pub mod scene_graph;
pub mod texture;
