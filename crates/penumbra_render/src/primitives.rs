//! Built-in meshes
//!
//! Triangles wind counter-clockwise seen from outside. The skybox cube is
//! position-only and meant to be seen from inside.

use glam::{Vec2, Vec3};

use crate::device::{MeshId, RenderDevice, Vertex};
use crate::error::Result;

/// Vertices and triangle indices ready for upload
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u32>,
}

impl MeshData {
    pub fn upload(&self, device: &mut dyn RenderDevice) -> Result<MeshId> {
        Ok(device.create_mesh(&self.vertices, &self.indices)?)
    }

    pub fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn push_quad(&mut self, corners: [Vec3; 4], normal: Vec3, uv_scale: f32) {
        let base = self.vertices.len() as u32;
        let uvs = [
            Vec2::new(0.0, 0.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(0.0, 1.0),
        ];
        for (corner, uv) in corners.iter().zip(uvs) {
            self.vertices.push(vertex(*corner, uv * uv_scale, normal));
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    /// Add a flat triangle, flipped if needed so its normal points away from `centre`
    fn push_triangle(&mut self, mut corners: [Vec3; 3], mut uvs: [Vec2; 3], centre: Vec3) {
        let edges = (corners[1] - corners[0], corners[2] - corners[0]);
        let mut normal = edges.0.cross(edges.1).normalize_or_zero();
        let face_centre = (corners[0] + corners[1] + corners[2]) / 3.0;
        if normal.dot(face_centre - centre) < 0.0 {
            corners.swap(1, 2);
            uvs.swap(1, 2);
            normal = -normal;
        }
        let base = self.vertices.len() as u32;
        for (corner, uv) in corners.iter().zip(uvs) {
            self.vertices.push(vertex(*corner, uv, normal));
        }
        self.indices.extend_from_slice(&[base, base + 1, base + 2]);
    }
}

fn vertex(position: Vec3, uv: Vec2, normal: Vec3) -> Vertex {
    Vertex::new(position.to_array(), uv.to_array(), normal.to_array())
}

/// Axis-aligned cube of edge `size` centred on the origin
pub fn cube(size: f32) -> MeshData {
    let h = size * 0.5;
    // (normal, right, up) with right × up = normal
    let faces = [
        (Vec3::X, Vec3::NEG_Z, Vec3::Y),
        (Vec3::NEG_X, Vec3::Z, Vec3::Y),
        (Vec3::Y, Vec3::X, Vec3::NEG_Z),
        (Vec3::NEG_Y, Vec3::X, Vec3::Z),
        (Vec3::Z, Vec3::X, Vec3::Y),
        (Vec3::NEG_Z, Vec3::NEG_X, Vec3::Y),
    ];

    let mut mesh = MeshData::default();
    for (normal, right, up) in faces {
        let centre = normal * h;
        mesh.push_quad(
            [
                centre + (-right - up) * h,
                centre + (right - up) * h,
                centre + (right + up) * h,
                centre + (-right + up) * h,
            ],
            normal,
            1.0,
        );
    }
    mesh
}

/// Horizontal square of edge `size` facing +Y, texture repeated `uv_scale` times
pub fn plane(size: f32, uv_scale: f32) -> MeshData {
    let h = size * 0.5;
    let mut mesh = MeshData::default();
    mesh.push_quad(
        [
            Vec3::new(-h, 0.0, h),
            Vec3::new(h, 0.0, h),
            Vec3::new(h, 0.0, -h),
            Vec3::new(-h, 0.0, -h),
        ],
        Vec3::Y,
        uv_scale,
    );
    mesh
}

/// Square pyramid with its base on y = 0
pub fn pyramid(base: f32, height: f32) -> MeshData {
    let h = base * 0.5;
    let apex = Vec3::new(0.0, height, 0.0);
    let corners = [
        Vec3::new(-h, 0.0, h),
        Vec3::new(h, 0.0, h),
        Vec3::new(h, 0.0, -h),
        Vec3::new(-h, 0.0, -h),
    ];
    let centre = Vec3::new(0.0, height * 0.25, 0.0);

    let mut mesh = MeshData::default();
    for i in 0..4 {
        let (a, b) = (corners[i], corners[(i + 1) % 4]);
        mesh.push_triangle(
            [a, b, apex],
            [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(0.5, 1.0)],
            centre,
        );
    }
    let base_uvs = [Vec2::new(0.0, 0.0), Vec2::new(1.0, 0.0), Vec2::new(1.0, 1.0)];
    mesh.push_triangle([corners[0], corners[1], corners[2]], base_uvs, centre);
    mesh.push_triangle(
        [corners[0], corners[2], corners[3]],
        [Vec2::new(0.0, 0.0), Vec2::new(1.0, 1.0), Vec2::new(0.0, 1.0)],
        centre,
    );
    mesh
}

/// Unit cube for the skybox, positions only
pub fn skybox_cube() -> MeshData {
    const POSITIONS: [[f32; 3]; 8] = [
        [-1.0, 1.0, -1.0],
        [-1.0, -1.0, -1.0],
        [1.0, 1.0, -1.0],
        [1.0, -1.0, -1.0],
        [-1.0, 1.0, 1.0],
        [1.0, 1.0, 1.0],
        [-1.0, -1.0, 1.0],
        [1.0, -1.0, 1.0],
    ];
    const INDICES: [u32; 36] = [
        0, 1, 2, 2, 1, 3, // front
        2, 3, 5, 5, 3, 7, // right
        5, 7, 4, 4, 7, 6, // back
        4, 6, 0, 0, 6, 1, // left
        4, 0, 5, 5, 0, 2, // top
        1, 6, 3, 3, 6, 7, // bottom
    ];

    MeshData {
        vertices: POSITIONS
            .iter()
            .map(|&position| Vertex::new(position, [0.0; 2], [0.0; 3]))
            .collect(),
        indices: INDICES.to_vec(),
    }
}
