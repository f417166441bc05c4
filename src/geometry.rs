//! Procedural shapes for the ambient backdrop.
//!
//! The polyhedra are flat shaded: every face gets its own three vertices so
//! the normal is constant across it. The torus knot is smooth shaded.

use std::f32::consts::PI;

use glam::Vec3;

use crate::gpu::mesh::{MeshData, Vertex};

const WHITE: [f32; 3] = [1.0, 1.0, 1.0];

/// Build a flat-shaded solid from unit-sphere corners and triangle faces.
fn flat_polyhedron(corners: &[Vec3], faces: &[[usize; 3]], radius: f32) -> MeshData {
    let mut vertices = Vec::with_capacity(faces.len() * 3);
    let mut indices = Vec::with_capacity(faces.len() * 3);

    for face in faces {
        let [a, b, c] = face.map(|i| corners[i].normalize() * radius);
        let normal = (b - a).cross(c - a).normalize_or_zero();

        for p in [a, b, c] {
            indices.push(vertices.len() as u16);
            vertices.push(Vertex::new(p.to_array(), normal.to_array(), WHITE));
        }
    }

    MeshData { vertices, indices }
}

/// Regular icosahedron, 20 faces.
pub fn icosahedron(radius: f32) -> MeshData {
    let t = (1.0 + 5.0f32.sqrt()) / 2.0;

    let corners = [
        Vec3::new(-1.0, t, 0.0),
        Vec3::new(1.0, t, 0.0),
        Vec3::new(-1.0, -t, 0.0),
        Vec3::new(1.0, -t, 0.0),
        Vec3::new(0.0, -1.0, t),
        Vec3::new(0.0, 1.0, t),
        Vec3::new(0.0, -1.0, -t),
        Vec3::new(0.0, 1.0, -t),
        Vec3::new(t, 0.0, -1.0),
        Vec3::new(t, 0.0, 1.0),
        Vec3::new(-t, 0.0, -1.0),
        Vec3::new(-t, 0.0, 1.0),
    ];

    let faces = [
        [0, 11, 5], [0, 5, 1], [0, 1, 7], [0, 7, 10], [0, 10, 11],
        [1, 5, 9], [5, 11, 4], [11, 10, 2], [10, 7, 6], [7, 1, 8],
        [3, 9, 4], [3, 4, 2], [3, 2, 6], [3, 6, 8], [3, 8, 9],
        [4, 9, 5], [2, 4, 11], [6, 2, 10], [8, 6, 7], [9, 8, 1],
    ];

    flat_polyhedron(&corners, &faces, radius)
}

/// Regular octahedron, 8 faces.
pub fn octahedron(radius: f32) -> MeshData {
    let corners = [
        Vec3::X,
        Vec3::NEG_X,
        Vec3::Y,
        Vec3::NEG_Y,
        Vec3::Z,
        Vec3::NEG_Z,
    ];

    let faces = [
        [0, 2, 4], [0, 4, 3], [0, 3, 5], [0, 5, 2],
        [1, 2, 5], [1, 5, 3], [1, 3, 4], [1, 4, 2],
    ];

    flat_polyhedron(&corners, &faces, radius)
}

/// Point on the (p, q) torus knot curve at parameter `u`.
fn knot_point(u: f32, p: f32, q: f32, radius: f32) -> Vec3 {
    let cu = u.cos();
    let su = u.sin();
    let qu_over_p = q / p * u;
    let cs = qu_over_p.cos();

    Vec3::new(
        radius * (2.0 + cs) * 0.5 * cu,
        radius * (2.0 + cs) * su * 0.5,
        radius * qu_over_p.sin() * 0.5,
    )
}

/// A (2, 3) torus knot: a tube of radius `tube` swept along the knot curve.
///
/// `tubular_segments` runs along the curve, `radial_segments` around the tube.
pub fn torus_knot(radius: f32, tube: f32, tubular_segments: u32, radial_segments: u32) -> MeshData {
    let (p, q) = (2.0, 3.0);
    let mut vertices = Vec::with_capacity(((tubular_segments + 1) * (radial_segments + 1)) as usize);
    let mut indices = Vec::with_capacity((tubular_segments * radial_segments * 6) as usize);

    for i in 0..=tubular_segments {
        let u = i as f32 / tubular_segments as f32 * p * PI * 2.0;

        // Frenet-like frame from two nearby points on the curve
        let p1 = knot_point(u, p, q, radius);
        let p2 = knot_point(u + 0.01, p, q, radius);
        let tangent = p2 - p1;
        let mut normal = p2 + p1;
        let binormal = tangent.cross(normal).normalize_or_zero();
        normal = binormal.cross(tangent).normalize_or_zero();

        for j in 0..=radial_segments {
            let v = j as f32 / radial_segments as f32 * PI * 2.0;
            let cx = -tube * v.cos();
            let cy = tube * v.sin();

            let position = p1 + normal * cx + binormal * cy;
            let vertex_normal = (position - p1).normalize_or_zero();
            vertices.push(Vertex::new(position.to_array(), vertex_normal.to_array(), WHITE));
        }
    }

    for j in 1..=tubular_segments {
        for i in 1..=radial_segments {
            let a = (radial_segments + 1) * (j - 1) + (i - 1);
            let b = (radial_segments + 1) * j + (i - 1);
            let c = (radial_segments + 1) * j + i;
            let d = (radial_segments + 1) * (j - 1) + i;

            indices.extend_from_slice(&[a as u16, b as u16, d as u16]);
            indices.extend_from_slice(&[b as u16, c as u16, d as u16]);
        }
    }

    MeshData { vertices, indices }
}
