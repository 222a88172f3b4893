//! Procedural geometry.

use std::f32::consts::TAU;

use cgmath::InnerSpace;

use crate::data_structures::model::ModelVertex;

/// CPU-side triangle list.
#[derive(Clone, Debug, Default)]
pub struct Geometry {
    pub vertices: Vec<ModelVertex>,
    pub indices: Vec<u32>,
}

/// A torus around the Z axis, lying in the XY plane.
///
/// `radius` is the distance from the centre to the middle of the tube,
/// `tube` the tube radius. The grid has `radial_segments + 1` rings of
/// `tubular_segments + 1` vertices so that the seams carry their own uvs.
pub fn torus(radius: f32, tube: f32, radial_segments: u32, tubular_segments: u32) -> Geometry {
    let radial_segments = radial_segments.max(3);
    let tubular_segments = tubular_segments.max(3);

    let mut vertices =
        Vec::with_capacity(((radial_segments + 1) * (tubular_segments + 1)) as usize);
    for j in 0..=radial_segments {
        for i in 0..=tubular_segments {
            let u = i as f32 / tubular_segments as f32 * TAU;
            let v = j as f32 / radial_segments as f32 * TAU;

            let position = cgmath::Vector3::new(
                (radius + tube * v.cos()) * u.cos(),
                (radius + tube * v.cos()) * u.sin(),
                tube * v.sin(),
            );
            let centre = cgmath::Vector3::new(radius * u.cos(), radius * u.sin(), 0.0);
            let normal = (position - centre).normalize();

            vertices.push(ModelVertex {
                position: position.into(),
                tex_coords: [
                    i as f32 / tubular_segments as f32,
                    j as f32 / radial_segments as f32,
                ],
                normal: normal.into(),
                ..ModelVertex::rigid()
            });
        }
    }

    let stride = tubular_segments + 1;
    let mut indices = Vec::with_capacity((radial_segments * tubular_segments * 6) as usize);
    for j in 1..=radial_segments {
        for i in 1..=tubular_segments {
            let a = stride * j + i - 1;
            let b = stride * (j - 1) + i - 1;
            let c = stride * (j - 1) + i;
            let d = stride * j + i;
            indices.extend_from_slice(&[a, b, d, b, c, d]);
        }
    }

    Geometry { vertices, indices }
}

/// Smooth per-vertex normals from triangle faces, for meshes that ship without.
pub fn compute_normals(vertices: &mut [ModelVertex], indices: &[u32]) {
    let mut sums = vec![cgmath::Vector3::new(0.0f32, 0.0, 0.0); vertices.len()];
    for tri in indices.chunks_exact(3) {
        let (a, b, c) = (tri[0] as usize, tri[1] as usize, tri[2] as usize);
        if a >= vertices.len() || b >= vertices.len() || c >= vertices.len() {
            continue;
        }
        let p0: cgmath::Vector3<f32> = vertices[a].position.into();
        let p1: cgmath::Vector3<f32> = vertices[b].position.into();
        let p2: cgmath::Vector3<f32> = vertices[c].position.into();
        // Area weighted
        let face = (p1 - p0).cross(p2 - p0);
        sums[a] += face;
        sums[b] += face;
        sums[c] += face;
    }
    for (vertex, sum) in vertices.iter_mut().zip(sums) {
        vertex.normal = if sum.magnitude2() > 0.0 {
            sum.normalize().into()
        } else {
            [0.0, 1.0, 0.0]
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn torus_grid_sizes() {
        let geometry = torus(4.0, 0.2, 16, 100);
        assert_eq!(geometry.vertices.len(), 17 * 101);
        assert_eq!(geometry.indices.len(), 16 * 100 * 6);
        let max = *geometry.indices.iter().max().unwrap() as usize;
        assert!(max < geometry.vertices.len());
    }

    #[test]
    fn torus_vertices_sit_on_the_tube_surface() {
        let (radius, tube) = (5.0, 0.2);
        let geometry = torus(radius, tube, 16, 100);
        for vertex in &geometry.vertices {
            let [x, y, z] = vertex.position;
            let ring_distance = (x * x + y * y).sqrt() - radius;
            let tube_distance = (ring_distance * ring_distance + z * z).sqrt();
            assert!((tube_distance - tube).abs() < 1e-4);

            let n: cgmath::Vector3<f32> = vertex.normal.into();
            assert!((n.magnitude() - 1.0).abs() < 1e-4);
            assert_eq!(vertex.weights, [1.0, 0.0, 0.0, 0.0]);
        }
    }

    #[test]
    fn torus_triangles_face_outwards() {
        let geometry = torus(4.0, 0.2, 16, 100);
        for tri in geometry.indices.chunks_exact(3).take(200) {
            let v = |i: u32| -> cgmath::Vector3<f32> {
                geometry.vertices[i as usize].position.into()
            };
            let face = (v(tri[1]) - v(tri[0])).cross(v(tri[2]) - v(tri[0]));
            let normal: cgmath::Vector3<f32> = geometry.vertices[tri[0] as usize].normal.into();
            assert!(face.dot(normal) >= 0.0);
        }
    }

    #[test]
    fn computed_normals_follow_winding() {
        let mut vertices = vec![
            ModelVertex {
                position: [0.0, 0.0, 0.0],
                ..ModelVertex::rigid()
            },
            ModelVertex {
                position: [1.0, 0.0, 0.0],
                ..ModelVertex::rigid()
            },
            ModelVertex {
                position: [0.0, 1.0, 0.0],
                ..ModelVertex::rigid()
            },
            ModelVertex {
                position: [9.0, 9.0, 9.0],
                ..ModelVertex::rigid()
            },
        ];
        compute_normals(&mut vertices, &[0, 1, 2]);
        for vertex in &vertices[..3] {
            assert_eq!(vertex.normal, [0.0, 0.0, 1.0]);
        }
        // Unreferenced vertices get a neutral up normal
        assert_eq!(vertices[3].normal, [0.0, 1.0, 0.0]);
    }
}
