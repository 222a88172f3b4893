//! Asset loading: raw bytes, images and glTF models.
//!
//! Loading is split in two steps. [`load_model_data`] and [`parse_model_data`]
//! decode a glTF/GLB file into plain CPU data ([`ModelData`]) that does not
//! depend on a GPU, and [`crate::data_structures::animated_model`] turns that
//! data into buffers, materials and an animation rig.

use anyhow::{Context, bail};
use cgmath::SquareMatrix;

use crate::{
    data_structures::{
        geometry::compute_normals,
        instance::Instance,
        model::ModelVertex,
        scene_graph::{NodeId, SceneGraph, SceneNode},
        texture::decode_image,
    },
    resources::animation::{AnimationClip, Channel, Keyframes},
};

pub mod animation;

#[cfg(target_arch = "wasm32")]
fn format_url(file_name: &str) -> anyhow::Result<reqwest::Url> {
    let window = web_sys::window().context("no window")?;
    let href = window
        .location()
        .href()
        .map_err(|_| anyhow::anyhow!("page location is not readable"))?;
    let base = reqwest::Url::parse(&href)?;
    Ok(base.join(file_name)?)
}

/// Reads a whole file: from disk on native, over HTTP relative to the page on
/// the web.
pub async fn load_binary(file_name: &str) -> anyhow::Result<Vec<u8>> {
    #[cfg(target_arch = "wasm32")]
    let data = {
        let url = format_url(file_name)?;
        let response = reqwest::get(url).await?.error_for_status()?;
        response.bytes().await?.to_vec()
    };
    #[cfg(not(target_arch = "wasm32"))]
    let data = tokio::fs::read(file_name)
        .await
        .with_context(|| format!("reading {}", file_name))?;

    Ok(data)
}

pub async fn load_image(file_name: &str) -> anyhow::Result<image::DynamicImage> {
    let bytes = load_binary(file_name).await?;
    decode_image(&bytes, extension(file_name)).with_context(|| format!("decoding {}", file_name))
}

fn extension(file_name: &str) -> Option<&str> {
    let name = file_name.rsplit('/').next()?;
    name.rsplit_once('.').map(|(_, ext)| ext)
}

/// Resolves a relative, percent-encoded glTF URI against the directory of
/// the model file.
fn resolve_uri(model_path: &str, uri: &str) -> anyhow::Result<String> {
    let uri = urlencoding::decode(uri).with_context(|| format!("{} is not a valid UTF-8 URI", uri))?;
    Ok(match model_path.rsplit_once('/') {
        Some((dir, _)) => format!("{}/{}", dir, uri),
        None => uri.into_owned(),
    })
}

#[derive(Clone, Debug)]
pub struct PrimitiveData {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
    pub material: Option<usize>,
    /// Whether the vertices carry joint indices and weights.
    pub skinned: bool,
}

#[derive(Clone, Debug)]
pub struct MeshData {
    pub name: String,
    pub primitives: Vec<PrimitiveData>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MaterialData {
    pub name: String,
    pub base_color_factor: [f32; 4],
    /// Index into [`ModelData::images`].
    pub base_color_texture: Option<usize>,
    pub metallic_factor: f32,
    pub roughness_factor: f32,
    pub metallic_roughness_texture: Option<usize>,
    pub emissive_factor: [f32; 3],
    /// Set for alpha-masked materials.
    pub alpha_cutoff: Option<f32>,
    pub double_sided: bool,
}

impl Default for MaterialData {
    fn default() -> Self {
        Self {
            name: "default".to_string(),
            base_color_factor: [1.0; 4],
            base_color_texture: None,
            metallic_factor: 1.0,
            roughness_factor: 1.0,
            metallic_roughness_texture: None,
            emissive_factor: [0.0; 3],
            alpha_cutoff: None,
            double_sided: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Skin {
    pub name: String,
    pub joints: Vec<NodeId>,
    pub inverse_bind_matrices: Vec<cgmath::Matrix4<f32>>,
}

/// A decoded glTF file.
#[derive(Debug, Default)]
pub struct ModelData {
    pub meshes: Vec<MeshData>,
    pub materials: Vec<MaterialData>,
    /// Decoded images; `None` where decoding failed.
    pub images: Vec<Option<image::DynamicImage>>,
    pub graph: SceneGraph,
    pub skins: Vec<Skin>,
    pub clips: Vec<AnimationClip>,
}

pub async fn load_model_data(file_name: &str) -> anyhow::Result<ModelData> {
    let bytes = load_binary(file_name).await?;
    parse_model_data(&bytes, file_name).await
}

/// Decodes a `.gltf` or `.glb` file. External buffers and images are loaded
/// relative to `file_name`.
pub async fn parse_model_data(bytes: &[u8], file_name: &str) -> anyhow::Result<ModelData> {
    let gltf = gltf::Gltf::from_slice(bytes).with_context(|| format!("parsing {}", file_name))?;

    let mut buffers: Vec<Vec<u8>> = Vec::new();
    for buffer in gltf.buffers() {
        let data = match buffer.source() {
            gltf::buffer::Source::Bin => gltf
                .blob
                .clone()
                .with_context(|| format!("{} references a missing binary chunk", file_name))?,
            gltf::buffer::Source::Uri(uri) if uri.starts_with("data:") => {
                bail!("{}: embedded data URIs are not supported", file_name)
            }
            gltf::buffer::Source::Uri(uri) => load_binary(&resolve_uri(file_name, uri)?).await?,
        };
        if data.len() < buffer.length() {
            bail!(
                "{}: buffer {} holds {} bytes, expected {}",
                file_name,
                buffer.index(),
                data.len(),
                buffer.length()
            );
        }
        buffers.push(data);
    }

    let images = load_images(&gltf, &buffers, file_name).await?;
    let materials = gltf.materials().map(read_material).collect();

    let mut meshes = Vec::new();
    for mesh in gltf.meshes() {
        let name = mesh.name().unwrap_or("unnamed_mesh").to_string();
        let primitives = mesh
            .primitives()
            .filter_map(|primitive| read_primitive(&primitive, &buffers, &name))
            .collect();
        meshes.push(MeshData { name, primitives });
    }

    let graph = read_graph(&gltf);
    let skins = gltf.skins().map(|skin| read_skin(&skin, &buffers)).collect();
    let clips = gltf
        .animations()
        .map(|animation| read_animation(&animation, &buffers))
        .collect();

    Ok(ModelData {
        meshes,
        materials,
        images,
        graph,
        skins,
        clips,
    })
}

async fn load_images(
    gltf: &gltf::Gltf,
    buffers: &[Vec<u8>],
    file_name: &str,
) -> anyhow::Result<Vec<Option<image::DynamicImage>>> {
    let mut images = Vec::new();
    for image in gltf.images() {
        let decoded = match image.source() {
            gltf::image::Source::View { view, mime_type } => {
                let start = view.offset();
                let bytes = buffers
                    .get(view.buffer().index())
                    .and_then(|buffer| buffer.get(start..start + view.length()))
                    .with_context(|| format!("image {} points outside its buffer", image.index()))?;
                decode_image(bytes, mime_type.split('/').last())
            }
            gltf::image::Source::Uri { uri, .. } if uri.starts_with("data:") => {
                bail!("{}: embedded data URIs are not supported", file_name)
            }
            gltf::image::Source::Uri { uri, mime_type } => match resolve_uri(file_name, uri) {
                Ok(path) => {
                    let format = mime_type
                        .and_then(|mime| mime.split('/').last())
                        .or_else(|| extension(&path));
                    match load_binary(&path).await {
                        Ok(bytes) => decode_image(&bytes, format),
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            },
        };
        match decoded {
            Ok(img) => images.push(Some(img)),
            Err(e) => {
                log::error!("image {} of {} could not be loaded: {:#}", image.index(), file_name, e);
                images.push(None);
            }
        }
    }
    Ok(images)
}

fn read_material(material: gltf::Material) -> MaterialData {
    let pbr = material.pbr_metallic_roughness();
    let image_of = |info: Option<gltf::texture::Info>| {
        info.map(|info| {
            if info.tex_coord() != 0 {
                log::warn!(
                    "material {:?} uses texture coordinate set {}, only set 0 is read",
                    material.name(),
                    info.tex_coord()
                );
            }
            info.texture().source().index()
        })
    };
    let alpha_cutoff = match material.alpha_mode() {
        gltf::material::AlphaMode::Mask => Some(material.alpha_cutoff().unwrap_or(0.5)),
        gltf::material::AlphaMode::Opaque => None,
        gltf::material::AlphaMode::Blend => {
            log::debug!("material {:?} is blended, drawing it opaque", material.name());
            None
        }
    };

    MaterialData {
        name: material
            .name()
            .map(str::to_string)
            .unwrap_or_else(|| format!("material_{}", material.index().unwrap_or(0))),
        base_color_factor: pbr.base_color_factor(),
        base_color_texture: image_of(pbr.base_color_texture()),
        metallic_factor: pbr.metallic_factor(),
        roughness_factor: pbr.roughness_factor(),
        metallic_roughness_texture: image_of(pbr.metallic_roughness_texture()),
        emissive_factor: material.emissive_factor(),
        alpha_cutoff,
        double_sided: material.double_sided(),
    }
}

fn read_primitive(
    primitive: &gltf::Primitive,
    buffers: &[Vec<u8>],
    mesh_name: &str,
) -> Option<PrimitiveData> {
    if primitive.mode() != gltf::mesh::Mode::Triangles {
        log::warn!(
            "skipping {:?} primitive {} of mesh {}",
            primitive.mode(),
            primitive.index(),
            mesh_name
        );
        return None;
    }
    let reader = primitive.reader(|buffer| buffers.get(buffer.index()).map(|b| b.as_slice()));

    let Some(positions) = reader.read_positions() else {
        log::warn!("primitive {} of mesh {} has no positions", primitive.index(), mesh_name);
        return None;
    };
    let mut vertices: Vec<ModelVertex> = positions
        .map(|position| ModelVertex {
            position,
            ..ModelVertex::rigid()
        })
        .collect();

    if let Some(tex_coords) = reader.read_tex_coords(0) {
        for (vertex, tex_coords) in vertices.iter_mut().zip(tex_coords.into_f32()) {
            vertex.tex_coords = tex_coords;
        }
    }

    let joints = reader.read_joints(0);
    let weights = reader.read_weights(0);
    let skinned = joints.is_some() && weights.is_some();
    if let (Some(joints), Some(weights)) = (joints, weights) {
        for (vertex, (joints, weights)) in vertices
            .iter_mut()
            .zip(joints.into_u16().zip(weights.into_f32()))
        {
            let sum: f32 = weights.iter().sum();
            if sum > 0.0 {
                vertex.joints = joints.map(u32::from);
                vertex.weights = weights.map(|w| w / sum);
            }
        }
    }

    let indices: Vec<u32> = match reader.read_indices() {
        Some(indices) => indices.into_u32().collect(),
        None => (0..vertices.len() as u32).collect(),
    };
    if let Some(&bad) = indices.iter().find(|&&i| i as usize >= vertices.len()) {
        log::warn!(
            "primitive {} of mesh {} indexes vertex {} of {}, skipping it",
            primitive.index(),
            mesh_name,
            bad,
            vertices.len()
        );
        return None;
    }

    match reader.read_normals() {
        Some(normals) => {
            for (vertex, normal) in vertices.iter_mut().zip(normals) {
                vertex.normal = normal;
            }
        }
        None => compute_normals(&mut vertices, &indices),
    }

    if primitive.morph_targets().next().is_some() {
        log::debug!("ignoring morph targets of mesh {}", mesh_name);
    }

    Some(PrimitiveData {
        vertices,
        indices,
        material: primitive.material().index(),
        skinned,
    })
}

fn read_graph(gltf: &gltf::Gltf) -> SceneGraph {
    let mut graph = SceneGraph::new();
    for node in gltf.nodes() {
        let (translation, rotation, scale) = node.transform().decomposed();
        let local = Instance {
            position: translation.into(),
            rotation: cgmath::Quaternion::new(rotation[3], rotation[0], rotation[1], rotation[2]),
            scale: scale.into(),
        };
        let mut scene_node = SceneNode::new(
            node.name()
                .map(str::to_string)
                .unwrap_or_else(|| format!("node_{}", node.index())),
            local,
        );
        scene_node.mesh = node.mesh().map(|mesh| mesh.index());
        scene_node.skin = node.skin().map(|skin| skin.index());
        graph.add_node(scene_node);
    }
    for node in gltf.nodes() {
        for child in node.children() {
            graph.add_child(node.index(), child.index());
        }
    }

    let scene = gltf.default_scene().or_else(|| gltf.scenes().next());
    match scene {
        Some(scene) => scene.nodes().for_each(|node| graph.add_root(node.index())),
        // No scene: every parentless node is a root
        None => {
            let parentless: Vec<NodeId> = (0..graph.len())
                .filter(|&id| graph.nodes[id].parent.is_none())
                .collect();
            parentless.into_iter().for_each(|id| graph.add_root(id));
        }
    }
    graph
}

fn read_skin(skin: &gltf::Skin, buffers: &[Vec<u8>]) -> Skin {
    let joints: Vec<NodeId> = skin.joints().map(|joint| joint.index()).collect();
    let reader = skin.reader(|buffer| buffers.get(buffer.index()).map(|b| b.as_slice()));
    let mut inverse_bind_matrices: Vec<cgmath::Matrix4<f32>> = reader
        .read_inverse_bind_matrices()
        .map(|matrices| matrices.map(cgmath::Matrix4::from).collect())
        .unwrap_or_default();
    // Missing matrices are identity
    inverse_bind_matrices.resize(joints.len(), cgmath::Matrix4::identity());
    Skin {
        name: skin.name().unwrap_or("skin").to_string(),
        joints,
        inverse_bind_matrices,
    }
}

fn read_animation(animation: &gltf::Animation, buffers: &[Vec<u8>]) -> AnimationClip {
    let name = animation
        .name()
        .map(str::to_string)
        .unwrap_or_else(|| format!("animation_{}", animation.index()));
    let mut channels = Vec::new();
    for (idx, channel) in animation.channels().enumerate() {
        let reader = channel.reader(|buffer| buffers.get(buffer.index()).map(|b| b.as_slice()));
        let Some(timestamps) = reader.read_inputs().map(|inputs| inputs.collect::<Vec<f32>>()) else {
            log::warn!("channel {} of {} has no timestamps", idx, name);
            continue;
        };
        let keyframes = match reader.read_outputs() {
            Some(gltf::animation::util::ReadOutputs::Translations(values)) => {
                Keyframes::Translation(values.map(Into::into).collect())
            }
            Some(gltf::animation::util::ReadOutputs::Rotations(values)) => Keyframes::Rotation(
                values
                    .into_f32()
                    .map(|r| cgmath::Quaternion::new(r[3], r[0], r[1], r[2]))
                    .collect(),
            ),
            Some(gltf::animation::util::ReadOutputs::Scales(values)) => {
                Keyframes::Scale(values.map(Into::into).collect())
            }
            Some(gltf::animation::util::ReadOutputs::MorphTargetWeights(_)) => {
                log::debug!("skipping morph target weights in {}", name);
                continue;
            }
            None => {
                log::warn!("channel {} of {} has no keyframes", idx, name);
                continue;
            }
        };
        channels.push(Channel {
            node: channel.target().node().index(),
            interpolation: channel.sampler().interpolation().into(),
            timestamps,
            keyframes,
        });
    }
    AnimationClip::new(name, channels)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_uris_resolve_next_to_the_model() {
        assert_eq!(
            resolve_uri("assets/models/3/scene.gltf", "scene.bin").unwrap(),
            "assets/models/3/scene.bin"
        );
        assert_eq!(resolve_uri("scene.gltf", "scene.bin").unwrap(), "scene.bin");
    }

    #[test]
    fn escaped_uris_are_decoded() {
        assert_eq!(
            resolve_uri("assets/models/3/scene.gltf", "textures/Material%20Base.png").unwrap(),
            "assets/models/3/textures/Material Base.png"
        );
        assert_eq!(
            resolve_uri("models/caf%C3%A9/scene.gltf", "caf%C3%A9.bin").unwrap(),
            "models/caf%C3%A9/café.bin"
        );
        // A lone continuation byte is not UTF-8
        assert!(resolve_uri("scene.gltf", "bad%FF.bin").is_err());
    }

    #[test]
    fn extensions_come_from_the_file_name() {
        assert_eq!(extension("assets/environmentMaps/2/warm.jpg"), Some("jpg"));
        assert_eq!(extension("assets.d/noext"), None);
    }

    #[test]
    fn data_uris_are_rejected() {
        let gltf = br#"{"asset":{"version":"2.0"},"buffers":[{"byteLength":4,"uri":"data:application/octet-stream;base64,AAAAAA=="}]}"#;
        let err = futures::executor::block_on(parse_model_data(gltf, "inline.gltf")).unwrap_err();
        assert!(err.to_string().contains("data URIs"));
    }
}
