#[cfg(feature = "integration-tests")]
mod common;

/// Side length of the offscreen frames.
#[cfg(feature = "integration-tests")]
const SIZE: u32 = 256;

/// Half-float bits of the ring colour (10, 2, 2, 1).
#[cfg(feature = "integration-tests")]
const RING_TEXEL: [u16; 4] = [0x4900, 0x4000, 0x4000, 0x3C00];

/// Half-float bits of opaque black.
#[cfg(feature = "integration-tests")]
const BLACK_TEXEL: [u16; 4] = [0x0000, 0x0000, 0x0000, 0x3C00];

#[test]
#[cfg(feature = "integration-tests")]
fn should_render_clear_colour() {
    use common::gpu::Headless;
    use envmap_rings::{
        SceneConfig,
        cube_camera::CubeCamera,
        render::{Batches, FrameTarget, Renderer},
    };

    let gpu = Headless::new();
    let config = SceneConfig::default();
    let cube_camera = CubeCamera::new(&gpu.device, &gpu.layouts, &config.cube_capture);
    let renderer = Renderer::for_format(&gpu.device, &gpu.layouts, common::gpu::OUTPUT_FORMAT, &cube_camera);
    let camera = gpu.main_camera(&config, SIZE);
    let (texture, view, depth) = gpu.offscreen(SIZE);

    let empty = Batches::default();
    let mut encoder = gpu.encoder();
    renderer.record_frame(
        &mut encoder,
        &FrameTarget {
            view: &view,
            depth: &depth.view,
            camera_bind_group: &camera.bind_group,
            clear_colour: wgpu::Color::WHITE,
        },
        &cube_camera,
        &empty,
        &empty,
    );
    gpu.submit(encoder);

    let pixels = gpu.read_texture(&texture, 0, 0, 4);
    assert_eq!(pixels.len(), (SIZE * SIZE * 4) as usize);
    for pixel in pixels.chunks_exact(4) {
        assert_eq!(pixel, [255, 255, 255, 255]);
    }
}

#[test]
#[cfg(feature = "integration-tests")]
fn cube_capture_sees_the_ring_but_not_the_model() {
    use std::f32::consts::PI;

    use common::gpu::{Headless, half_texels};
    use envmap_rings::{
        SceneConfig,
        config::RingConfig,
        cube_camera::CubeCamera,
        data_structures::{
            animated_model::AnimatedModel,
            instance::{Instance, euler_xyz},
        },
        layers::Layers,
        render::{FrameTarget, Render, Renderer},
        resources::parse_model_data,
        scene::Ring,
    };
    use futures::executor::block_on;

    let gpu = Headless::new();
    let config = SceneConfig::default();
    let cube_camera = CubeCamera::new(&gpu.device, &gpu.layouts, &config.cube_capture);
    let renderer = Renderer::for_format(&gpu.device, &gpu.layouts, common::gpu::OUTPUT_FORMAT, &cube_camera);
    let camera = gpu.main_camera(&config, SIZE);
    let (_texture, view, depth) = gpu.offscreen(SIZE);

    // Centred on the capture point, so the ring crosses the middle of the +X face
    let ring_config = RingConfig {
        position: [0.0; 3],
        ..config.rings[0].clone()
    };
    let ring = Ring::new(&gpu.device, &gpu.queue, &gpu.layouts, &ring_config, "ring");

    // Facing the capture point from inside the +X face
    let data = block_on(parse_model_data(&common::glb::sliding_triangle(), "triangle.glb")).expect("valid glb");
    let root = Instance::new()
        .with_position([2.0, -1.5, -0.75])
        .with_rotation(euler_xyz(0.0, -PI / 2.0, 0.0))
        .with_uniform_scale(1.5);
    let model = AnimatedModel::new(&gpu.device, &gpu.queue, &gpu.layouts, "triangle", data, root);
    model.write_to_buffers(&gpu.queue);

    let renders = || Render::Composed(vec![ring.render(), Render::Lit(&model)]);
    let capture = renders().into_batches(&cube_camera.layers);
    let main = renders().into_batches(&Layers::default());
    assert_eq!(capture.unlits.len(), 1);
    assert!(capture.lits.is_empty());
    assert_eq!(main.unlits.len(), 1);
    assert_eq!(main.lits.len(), 1);

    let mut encoder = gpu.encoder();
    renderer.record_frame(
        &mut encoder,
        &FrameTarget {
            view: &view,
            depth: &depth.view,
            camera_bind_group: &camera.bind_group,
            clear_colour: wgpu::Color::BLACK,
        },
        &cube_camera,
        &capture,
        &main,
    );
    gpu.submit(encoder);

    let target = &cube_camera.target;
    let face = half_texels(&gpu.read_texture(&target.texture, 0, 0, 8));
    assert_eq!(face.len(), (target.resolution * target.resolution) as usize);
    for texel in &face {
        assert!(*texel == BLACK_TEXEL || *texel == RING_TEXEL, "unexpected texel {:04x?}", texel);
    }
    let centre = (target.resolution / 2 * target.resolution + target.resolution / 2) as usize;
    assert_eq!(face[centre], RING_TEXEL);

    // The last mip averages the whole face
    let average = half_texels(&gpu.read_texture(&target.texture, 0, target.mip_level_count - 1, 8));
    assert_eq!(average.len(), 1);
    let [red, green, _, _] = average[0];
    assert!(green > 0 && red > green, "face average {:04x?}", average[0]);
}

#[test]
#[cfg(feature = "integration-tests")]
fn scene_without_assets_still_renders() {
    use common::gpu::Headless;
    use envmap_rings::{
        SceneConfig,
        render::{FrameTarget, Renderer},
        scene::{Scene, SceneAssets},
    };

    let gpu = Headless::new();
    let config = SceneConfig::default();
    let assets = SceneAssets::from_loaded(
        Err(anyhow::anyhow!("warm.jpg not found")),
        Err(anyhow::anyhow!("scene.gltf not found")),
    );
    let scene = Scene::new(&gpu.device, &gpu.queue, &gpu.layouts, &config, assets);
    assert!(scene.model.is_none());

    let renderer = Renderer::for_format(&gpu.device, &gpu.layouts, common::gpu::OUTPUT_FORMAT, &scene.cube_camera);
    let camera = gpu.main_camera(&config, SIZE);
    let (texture, view, depth) = gpu.offscreen(SIZE);

    let capture = scene.renders().into_batches(&scene.cube_camera.layers);
    let main = scene.renders().into_batches(&camera.layers);
    assert_eq!(main.backgrounds.len(), 1);
    assert_eq!(main.unlits.len(), 2);
    assert!(main.lits.is_empty());

    let mut encoder = gpu.encoder();
    renderer.record_frame(
        &mut encoder,
        &FrameTarget {
            view: &view,
            depth: &depth.view,
            camera_bind_group: &camera.bind_group,
            clear_colour: wgpu::Color::BLACK,
        },
        &scene.cube_camera,
        &capture,
        &main,
    );
    gpu.submit(encoder);

    // The top left corner looks above the rings onto the grey fallback
    let pixels = gpu.read_texture(&texture, 0, 0, 4);
    let corner = &pixels[..4];
    assert!(corner[0] > 0, "corner {:?}", corner);
    assert_eq!(corner[0], corner[1]);
    assert_eq!(corner[1], corner[2]);
}

#[test]
#[cfg(feature = "integration-tests")]
fn env_map_intensity_reaches_the_model_but_not_the_rings() {
    use common::gpu::Headless;
    use envmap_rings::{
        SceneConfig,
        data_structures::model::MaterialKind,
        debug::Tunable,
        resources::parse_model_data,
        scene::{Scene, SceneAssets},
    };
    use futures::executor::block_on;

    let gpu = Headless::new();
    let config = SceneConfig::default();
    let data = block_on(parse_model_data(&common::glb::sliding_triangle(), "triangle.glb"));
    let assets = SceneAssets::from_loaded(Err(anyhow::anyhow!("warm.jpg not found")), data);
    let mut scene = Scene::new(&gpu.device, &gpu.queue, &gpu.layouts, &config, assets);

    let model_intensities = |scene: &Scene| -> Vec<f32> {
        let model = scene.model.as_ref().expect("model loaded");
        model
            .model
            .materials
            .iter()
            .map(|material| {
                assert_eq!(material.kind, MaterialKind::Standard);
                material.uniform.env_map_intensity
            })
            .collect()
    };
    let initial = model_intensities(&scene);
    assert!(!initial.is_empty());
    assert!(initial.iter().all(|v| *v == config.tunables.env_map_intensity));

    scene.apply_tunable(&gpu.queue, Tunable::EnvMapIntensity, 0.25);
    assert!(model_intensities(&scene).iter().all(|v| *v == 0.25));
    for ring in &scene.rings {
        for material in &ring.model.materials {
            assert_eq!(material.kind, MaterialKind::Basic);
            assert_eq!(material.uniform.env_map_intensity, 1.0);
        }
    }
}
