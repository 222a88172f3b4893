//! Scene configuration.
//!
//! Every constant of the demo lives in [`SceneConfig`]: asset locations, model
//! placement, ring definitions, camera and cube-capture settings and the
//! defaults of the debug panel tunables. [`SceneConfig::default`] reproduces
//! the reference scene, [`SceneConfig::from_env`] additionally lets the asset
//! root be overridden at runtime.

/// Environment variable that overrides [`SceneConfig::assets_root`] on native targets.
pub const ASSETS_ENV_VAR: &str = "ENVMAP_RINGS_ASSETS";

#[derive(Clone, Debug)]
pub struct SceneConfig {
    pub title: String,
    /// Directory (native) or URL path (web) all asset file names are relative to.
    pub assets_root: String,
    /// Equirectangular image used as background and captured into the environment.
    pub environment_map: String,
    pub model: String,
    pub model_position: [f32; 3],
    pub model_scale: f32,
    pub rings: Vec<RingConfig>,
    pub cube_capture: CubeCaptureConfig,
    pub camera: CameraConfig,
    pub tunables: TunableDefaults,
    /// Upper bound for the device pixel ratio used for the drawing buffer.
    pub max_pixel_ratio: f64,
    pub clear_colour: wgpu::Color,
}

/// A decorative torus spinning around its centre.
#[derive(Clone, Debug, PartialEq)]
pub struct RingConfig {
    pub radius: f32,
    pub tube: f32,
    pub radial_segments: u32,
    pub tubular_segments: u32,
    /// Linear RGB, values above one are intentional.
    pub color: [f32; 3],
    pub position: [f32; 3],
    /// Rotation per second on every Euler axis, in multiples of pi.
    pub spin: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CubeCaptureConfig {
    pub resolution: u32,
    pub position: [f32; 3],
    pub near: f32,
    pub far: f32,
    /// The only layer the cube camera renders.
    pub layer: u32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CameraConfig {
    pub fovy_degrees: f32,
    pub near: f32,
    pub far: f32,
    pub position: [f32; 3],
    pub target: [f32; 3],
    pub enable_damping: bool,
    pub damping_factor: f32,
}

#[derive(Clone, Debug, PartialEq)]
pub struct TunableDefaults {
    pub env_map_intensity: f32,
    pub background_blurriness: f32,
    pub background_intensity: f32,
}

impl Default for TunableDefaults {
    fn default() -> Self {
        Self {
            env_map_intensity: 0.5,
            background_blurriness: 0.03,
            background_intensity: 1.15,
        }
    }
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            fovy_degrees: 75.0,
            near: 0.1,
            far: 100.0,
            position: [0.0, 5.0, -10.0],
            target: [0.0, 3.5, 0.0],
            enable_damping: true,
            damping_factor: 0.05,
        }
    }
}

impl Default for CubeCaptureConfig {
    fn default() -> Self {
        Self {
            resolution: 256,
            position: [0.0, 0.0, 0.0],
            near: 0.1,
            far: 100.0,
            layer: 1,
        }
    }
}

impl RingConfig {
    fn shield(radius: f32, spin: f32) -> Self {
        Self {
            radius,
            tube: 0.2,
            radial_segments: 16,
            tubular_segments: 100,
            color: [10.0, 2.0, 2.0],
            position: [0.0, 3.0, 0.0],
            spin,
        }
    }
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            title: "envmap-rings".to_string(),
            assets_root: "assets".to_string(),
            environment_map: "environmentMaps/2/warm.jpg".to_string(),
            model: "models/3/scene.gltf".to_string(),
            model_position: [0.0, 3.0, 0.0],
            model_scale: 1.7,
            rings: vec![RingConfig::shield(4.0, 0.2), RingConfig::shield(5.0, -0.2)],
            cube_capture: CubeCaptureConfig::default(),
            camera: CameraConfig::default(),
            tunables: TunableDefaults::default(),
            max_pixel_ratio: 2.0,
            clear_colour: wgpu::Color::BLACK,
        }
    }
}

impl SceneConfig {
    /// The default configuration with the asset root taken from
    /// [`ASSETS_ENV_VAR`] when it is set.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        #[cfg(not(target_arch = "wasm32"))]
        if let Ok(root) = std::env::var(ASSETS_ENV_VAR) {
            if !root.trim().is_empty() {
                config.assets_root = root;
            }
        }
        config
    }

    pub fn asset_path(&self, file_name: &str) -> String {
        let root = self.assets_root.trim_end_matches('/');
        let file_name = file_name.trim_start_matches('/');
        if root.is_empty() {
            file_name.to_string()
        } else {
            format!("{}/{}", root, file_name)
        }
    }

    pub fn environment_map_path(&self) -> String {
        self.asset_path(&self.environment_map)
    }

    pub fn model_path(&self) -> String {
        self.asset_path(&self.model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_scene_matches_reference_layout() {
        let config = SceneConfig::default();
        assert_eq!(config.rings.len(), 2);
        assert_eq!(config.rings[0].radius, 4.0);
        assert_eq!(config.rings[1].radius, 5.0);
        assert_eq!(config.rings[0].spin, -config.rings[1].spin);
        assert_eq!(config.cube_capture.resolution, 256);
        assert_eq!(config.camera.position, [0.0, 5.0, -10.0]);
        assert_eq!(config.camera.target[1], 3.5);
        assert_eq!(config.tunables, TunableDefaults::default());
    }

    #[test]
    fn asset_paths_are_joined_with_single_separator() {
        let mut config = SceneConfig::default();
        assert_eq!(
            config.environment_map_path(),
            "assets/environmentMaps/2/warm.jpg"
        );
        config.assets_root = "/srv/static/".to_string();
        assert_eq!(config.asset_path("/models/3/scene.gltf"), "/srv/static/models/3/scene.gltf");
        config.assets_root = String::new();
        assert_eq!(config.asset_path("a.png"), "a.png");
    }
}
