//! GPU textures and texture creation utilities.
//!
//! This module provides [`Texture`], a wrapper around a WGPU texture with its
//! default view and sampler, and [`CubeTarget`], the half-float cube map the
//! environment capture renders into.

use anyhow::*;
use image::{GenericImageView, ImageFormat, RgbaImage, imageops::FilterType, load_from_memory_with_format};

/// A GPU texture with a view and sampler.
#[derive(Clone, Debug)]
pub struct Texture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
}

impl Texture {
    /// Standard depth buffer texture format (32-bit float).
    pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

    /// Create a depth texture for depth-testing during rendering.
    ///
    /// # Arguments
    ///
    /// * `size` is [width, height] of the texture in pixels
    /// * `label` is used as a debug label for the GPU resource
    pub fn create_depth_texture(device: &wgpu::Device, size: [u32; 2], label: &str) -> Self {
        let size = wgpu::Extent3d {
            width: size[0].max(1),
            height: size[1].max(1),
            depth_or_array_layers: 1,
        };
        let desc = wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[Self::DEPTH_FORMAT],
        };
        let texture = device.create_texture(&desc);
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            compare: Some(wgpu::CompareFunction::LessEqual),
            lod_min_clamp: 0.0,
            lod_max_clamp: 100.0,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }

    /// A 1x1 texture of a single colour.
    ///
    /// Materials without a texture bind a white one so the shaders never have
    /// to branch on missing maps.
    pub fn solid(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        rgba: [u8; 4],
        linear: bool,
        label: &str,
    ) -> Texture {
        let img = image::DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, image::Rgba(rgba)));
        Self::upload(device, queue, vec![img.to_rgba8()], Some(label), linear, wgpu::AddressMode::Repeat)
    }

    /// Uploads `img`, optionally with a full mip chain generated on the CPU.
    ///
    /// Images larger than the device limit are scaled down first.
    pub fn from_image(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        img: &image::DynamicImage,
        label: Option<&str>,
        linear: bool,
        with_mips: bool,
    ) -> Self {
        let max = device.limits().max_texture_dimension_2d;
        let rgba = fit_to_limit(img, max).to_rgba8();
        let levels = if with_mips {
            mip_chain(rgba)
        } else {
            vec![rgba]
        };
        // Equirectangular maps wrap horizontally only
        let address_mode_v = if with_mips {
            wgpu::AddressMode::ClampToEdge
        } else {
            wgpu::AddressMode::Repeat
        };
        Self::upload(device, queue, levels, label, linear, address_mode_v)
    }

    fn upload(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        levels: Vec<RgbaImage>,
        label: Option<&str>,
        linear: bool,
        address_mode_v: wgpu::AddressMode,
    ) -> Self {
        let (width, height) = levels[0].dimensions();
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let format = if linear {
            wgpu::TextureFormat::Rgba8Unorm
        } else {
            wgpu::TextureFormat::Rgba8UnormSrgb
        };
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label,
            size,
            mip_level_count: levels.len() as u32,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });

        for (mip_level, level) in levels.iter().enumerate() {
            let (w, h) = level.dimensions();
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    aspect: wgpu::TextureAspect::All,
                    texture: &texture,
                    mip_level: mip_level as u32,
                    origin: wgpu::Origin3d::ZERO,
                },
                level,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(4 * w),
                    rows_per_image: Some(h),
                },
                wgpu::Extent3d {
                    width: w,
                    height: h,
                    depth_or_array_layers: 1,
                },
            );
        }

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v,
            address_mode_w: wgpu::AddressMode::Repeat,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        Self {
            texture,
            view,
            sampler,
        }
    }
}

pub fn decode_image(bytes: &[u8], format: Option<&str>) -> Result<image::DynamicImage> {
    let img = match format.and_then(ImageFormat::from_extension) {
        None => image::load_from_memory(bytes)?,
        Some(fmt) => load_from_memory_with_format(bytes, fmt)?,
    };
    Ok(img)
}

/// Number of mip levels down to 1x1.
pub fn mip_level_count(width: u32, height: u32) -> u32 {
    32 - width.max(height).max(1).leading_zeros()
}

/// `img` followed by successively halved copies down to 1x1.
pub fn mip_chain(img: RgbaImage) -> Vec<RgbaImage> {
    let (width, height) = img.dimensions();
    let count = mip_level_count(width, height) as usize;
    let mut levels = Vec::with_capacity(count);
    levels.push(img);
    while levels.len() < count {
        let (w, h) = levels[levels.len() - 1].dimensions();
        let next = image::imageops::resize(
            &levels[levels.len() - 1],
            (w / 2).max(1),
            (h / 2).max(1),
            FilterType::Triangle,
        );
        levels.push(next);
    }
    levels
}

fn fit_to_limit(img: &image::DynamicImage, max: u32) -> image::DynamicImage {
    let (width, height) = img.dimensions();
    if width <= max && height <= max {
        return img.clone();
    }
    log::warn!(
        "texture of {}x{} exceeds the device limit of {}, scaling it down",
        width,
        height,
        max
    );
    img.resize(max, max, FilterType::Triangle)
}

/// Half-float cube map with a full mip chain that is rendered to every frame.
///
/// Face order follows wgpu: +X, -X, +Y, -Y, +Z, -Z.
#[derive(Debug)]
pub struct CubeTarget {
    pub texture: wgpu::Texture,
    pub resolution: u32,
    pub mip_level_count: u32,
    /// Cube view over all faces and mips, for sampling.
    pub cube_view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    /// Depth buffer shared by the six face passes.
    pub depth: Texture,
    // [face][mip]
    face_views: Vec<Vec<wgpu::TextureView>>,
}

impl CubeTarget {
    pub const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba16Float;

    pub fn new(device: &wgpu::Device, resolution: u32, label: &str) -> Self {
        let resolution = resolution.max(1);
        let mip_level_count = mip_level_count(resolution, resolution);
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size: wgpu::Extent3d {
                width: resolution,
                height: resolution,
                depth_or_array_layers: 6,
            },
            mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let cube_view = texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some(&format!("{} cube view", label)),
            format: Some(Self::FORMAT),
            dimension: Some(wgpu::TextureViewDimension::Cube),
            aspect: wgpu::TextureAspect::All,
            base_mip_level: 0,
            mip_level_count: None,
            base_array_layer: 0,
            array_layer_count: Some(6),
            ..Default::default()
        });

        let face_views = (0..6)
            .map(|face| {
                (0..mip_level_count)
                    .map(|mip| {
                        texture.create_view(&wgpu::TextureViewDescriptor {
                            label: Some(&format!("{} face {} mip {}", label, face, mip)),
                            format: Some(Self::FORMAT),
                            dimension: Some(wgpu::TextureViewDimension::D2),
                            aspect: wgpu::TextureAspect::All,
                            base_mip_level: mip,
                            mip_level_count: Some(1),
                            base_array_layer: face,
                            array_layer_count: Some(1),
                            ..Default::default()
                        })
                    })
                    .collect()
            })
            .collect();

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} sampler", label)),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let depth = Texture::create_depth_texture(device, [resolution, resolution], "cube depth texture");

        Self {
            texture,
            resolution,
            mip_level_count,
            cube_view,
            sampler,
            depth,
            face_views,
        }
    }

    pub fn face_view(&self, face: usize, mip: usize) -> &wgpu::TextureView {
        &self.face_views[face][mip]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mip_counts() {
        assert_eq!(mip_level_count(256, 256), 9);
        assert_eq!(mip_level_count(2048, 1024), 12);
        assert_eq!(mip_level_count(1, 1), 1);
        assert_eq!(mip_level_count(0, 0), 1);
        assert_eq!(mip_level_count(3, 1), 2);
    }

    #[test]
    fn mip_chain_halves_down_to_one_pixel() {
        let img = RgbaImage::from_pixel(8, 2, image::Rgba([200, 100, 50, 255]));
        let chain = mip_chain(img);
        let sizes: Vec<_> = chain.iter().map(|level| level.dimensions()).collect();
        assert_eq!(sizes, vec![(8, 2), (4, 1), (2, 1), (1, 1)]);
        // A constant image stays constant at every level
        assert_eq!(chain[3].get_pixel(0, 0), &image::Rgba([200, 100, 50, 255]));
    }

    #[test]
    fn decoding_garbage_is_an_error() {
        assert!(decode_image(&[1, 2, 3, 4], None).is_err());
        assert!(decode_image(&[1, 2, 3, 4], Some("png")).is_err());
    }
}
