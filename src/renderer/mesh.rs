//! Vertex format, procedural geometry and uploaded meshes

use bytemuck::{Pod, Zeroable};
use glam::Vec3;

use super::backend::{MeshHandle, RenderBackend};
use crate::error::RenderResult;

/// Vertex with position, normal, and UV coordinates
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
    pub uv: [f32; 2],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 3] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3, 2 => Float32x2];

    pub const fn new(position: [f32; 3], normal: [f32; 3], uv: [f32; 2]) -> Self {
        Self {
            position,
            normal,
            uv,
        }
    }

    /// Buffer layout shared by every program
    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// CPU-side geometry, ready to upload
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn new(vertices: Vec<Vertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Unit cube centered at the origin, outward normals
    pub fn cube() -> Self {
        // (normal, u axis, v axis) per face
        let faces = [
            (Vec3::Z, Vec3::X, Vec3::Y),
            (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
            (Vec3::Y, Vec3::X, Vec3::NEG_Z),
            (Vec3::NEG_Y, Vec3::X, Vec3::Z),
            (Vec3::X, Vec3::NEG_Z, Vec3::Y),
            (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        ];
        let mut data = Self::default();
        for (normal, u, v) in faces {
            let base = data.vertices.len() as u32;
            for (du, dv) in [(0.0, 0.0), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
                let p = normal * 0.5 + u * (du - 0.5) + v * (dv - 0.5);
                data.vertices
                    .push(Vertex::new(p.into(), normal.into(), [du, 1.0 - dv]));
            }
            data.indices
                .extend_from_slice(&[base, base + 1, base + 2, base + 2, base + 3, base]);
        }
        data
    }

    /// Square pyramid of unit base and height centered at the origin, flat-shaded
    pub fn pyramid() -> Self {
        let h = 0.5;
        let base = [
            Vec3::new(-h, -h, h),
            Vec3::new(h, -h, h),
            Vec3::new(h, -h, -h),
            Vec3::new(-h, -h, -h),
        ];
        let apex = Vec3::new(0.0, h, 0.0);

        let mut data = Self::default();
        let mut push_triangle = |a: Vec3, b: Vec3, c: Vec3, uvs: [[f32; 2]; 3]| {
            let normal = (b - a).cross(c - a).normalize();
            let first = data.vertices.len() as u32;
            for (p, uv) in [a, b, c].into_iter().zip(uvs) {
                data.vertices.push(Vertex::new(p.into(), normal.into(), uv));
            }
            data.indices.extend_from_slice(&[first, first + 1, first + 2]);
        };

        for i in 0..4 {
            push_triangle(base[i], base[(i + 1) % 4], apex, [[0.0, 1.0], [1.0, 1.0], [0.5, 0.0]]);
        }
        push_triangle(base[0], base[3], base[2], [[0.0, 1.0], [0.0, 0.0], [1.0, 0.0]]);
        push_triangle(base[2], base[1], base[0], [[1.0, 0.0], [1.0, 1.0], [0.0, 1.0]]);
        data
    }

    /// Plane on the XZ axis facing +Y; UVs repeat `uv_scale` times
    pub fn plane(size: f32, uv_scale: f32) -> Self {
        let half = size / 2.0;
        let n = [0.0, 1.0, 0.0];
        let vertices = vec![
            Vertex::new([-half, 0.0, half], n, [0.0, uv_scale]),
            Vertex::new([half, 0.0, half], n, [uv_scale, uv_scale]),
            Vertex::new([half, 0.0, -half], n, [uv_scale, 0.0]),
            Vertex::new([-half, 0.0, -half], n, [0.0, 0.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// UV sphere
    pub fn sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let mut data = Self::default();

        for ring in 0..=rings {
            let phi = std::f32::consts::PI * ring as f32 / rings as f32;
            for segment in 0..=segments {
                let theta = std::f32::consts::TAU * segment as f32 / segments as f32;
                let normal = Vec3::new(phi.sin() * theta.cos(), phi.cos(), phi.sin() * theta.sin());
                data.vertices.push(Vertex::new(
                    (normal * radius).into(),
                    normal.into(),
                    [segment as f32 / segments as f32, ring as f32 / rings as f32],
                ));
            }
        }

        let stride = segments + 1;
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                data.indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        data
    }

    /// Two triangles covering clip space, uv (0,0) at the top left
    pub fn fullscreen_quad() -> Self {
        let n = [0.0, 0.0, 1.0];
        let vertices = vec![
            Vertex::new([-1.0, -1.0, 0.0], n, [0.0, 1.0]),
            Vertex::new([1.0, -1.0, 0.0], n, [1.0, 1.0]),
            Vertex::new([1.0, 1.0, 0.0], n, [1.0, 0.0]),
            Vertex::new([-1.0, 1.0, 0.0], n, [0.0, 0.0]),
        ];
        Self::new(vertices, vec![0, 1, 2, 2, 3, 0])
    }

    /// Flat `resolution` x `resolution` quad grid over [0, 1]² on XZ.
    ///
    /// Terrain patches are instances of this grid displaced by the height map.
    pub fn patch_grid(resolution: u32) -> Self {
        let res = resolution.max(1);
        let stride = res + 1;
        let mut data = Self::default();
        for z in 0..=res {
            for x in 0..=res {
                let (u, v) = (x as f32 / res as f32, z as f32 / res as f32);
                data.vertices
                    .push(Vertex::new([u, 0.0, v], [0.0, 1.0, 0.0], [u, v]));
            }
        }
        for z in 0..res {
            for x in 0..res {
                let a = z * stride + x;
                let b = a + stride;
                data.indices.extend_from_slice(&[a, b, a + 1, a + 1, b, b + 1]);
            }
        }
        data
    }

    /// Reverse triangle winding so the inside faces the viewer
    #[must_use]
    pub fn flip_winding(mut self) -> Self {
        for tri in self.indices.chunks_exact_mut(3) {
            tri.swap(1, 2);
        }
        self
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    /// Send to the backend
    pub fn upload<B: RenderBackend + ?Sized>(&self, backend: &mut B, label: &str) -> RenderResult<Mesh> {
        let handle = backend.create_mesh(label, &self.vertices, &self.indices)?;
        Ok(Mesh {
            handle,
            index_count: self.index_count(),
        })
    }
}

/// Geometry living on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mesh {
    pub handle: MeshHandle,
    pub index_count: u32,
}

impl Mesh {
    pub fn destroy<B: RenderBackend + ?Sized>(self, backend: &mut B) -> RenderResult<()> {
        backend.destroy_mesh(self.handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_indices_in_range(data: &MeshData) {
        let n = data.vertices.len() as u32;
        assert!(data.indices.iter().all(|&i| i < n));
        assert_eq!(data.indices.len() % 3, 0);
    }

    #[test]
    fn test_cube_faces_wind_outward() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.index_count(), 36);
        assert_indices_in_range(&cube);

        for tri in cube.indices.chunks(3) {
            let p = |i: u32| Vec3::from(cube.vertices[i as usize].position);
            let face_normal = (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]));
            let normal = Vec3::from(cube.vertices[tri[0] as usize].normal);
            assert!(face_normal.dot(normal) > 0.0);
        }
    }

    #[test]
    fn test_pyramid_faces_wind_outward() {
        let pyramid = MeshData::pyramid();
        assert_eq!(pyramid.index_count(), 18);
        assert_indices_in_range(&pyramid);
        for tri in pyramid.indices.chunks(3) {
            let p = |i: u32| Vec3::from(pyramid.vertices[i as usize].position);
            let centroid = (p(tri[0]) + p(tri[1]) + p(tri[2])) / 3.0;
            let normal = Vec3::from(pyramid.vertices[tri[0] as usize].normal);
            // the origin sits inside, so outward normals point away from it
            assert!(normal.dot(centroid) > 0.0);
        }
    }

    #[test]
    fn test_sphere_and_grid_indices() {
        let sphere = MeshData::sphere(1.0, 16, 8);
        assert_indices_in_range(&sphere);
        for v in &sphere.vertices {
            assert!((Vec3::from(v.position).length() - 1.0).abs() < 1e-5);
        }

        let grid = MeshData::patch_grid(4);
        assert_eq!(grid.vertices.len(), 25);
        assert_eq!(grid.index_count(), 4 * 4 * 6);
        assert_indices_in_range(&grid);
    }

    #[test]
    fn test_fullscreen_quad_spans_clip_space() {
        let quad = MeshData::fullscreen_quad();
        let top_left = quad.vertices.iter().find(|v| v.position[0] < 0.0 && v.position[1] > 0.0);
        assert_eq!(top_left.map(|v| v.uv), Some([0.0, 0.0]));
    }
}
