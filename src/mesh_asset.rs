//! External 3D assets for the detail viewer.
//!
//! Assets are Wavefront OBJ. Provided normals are used when every model has
//! them; otherwise normals are generated by area-weighted averaging of the
//! adjacent face normals.

use std::collections::HashMap;

use thiserror::Error;

use crate::gpu::mesh::{MeshData, Vertex};

/// Surface colour for assets, which carry no materials of their own.
const ASSET_COLOR: [f32; 3] = [0.82, 0.82, 0.86];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AssetError {
    #[error("failed to fetch asset: {0}")]
    Fetch(String),
    #[error("failed to parse OBJ: {0}")]
    Parse(String),
    #[error("OBJ contains no geometry")]
    Empty,
    #[error("OBJ has {0} vertices, more than 16-bit indices can address")]
    TooLarge(usize),
}

/// Axis-aligned bounding box for a mesh.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BoundingBox {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl BoundingBox {
    pub fn from_vertices(vertices: &[Vertex]) -> Self {
        if vertices.is_empty() {
            return Self::default();
        }

        let mut min = [f32::MAX; 3];
        let mut max = [f32::MIN; 3];

        for v in vertices {
            for i in 0..3 {
                min[i] = min[i].min(v.position[i]);
                max[i] = max[i].max(v.position[i]);
            }
        }

        Self { min, max }
    }

    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }

    pub fn size(&self) -> [f32; 3] {
        [
            self.max[0] - self.min[0],
            self.max[1] - self.min[1],
            self.max[2] - self.min[2],
        ]
    }
}

/// A loaded mesh asset with geometry data ready for upload.
#[derive(Debug, Clone)]
pub struct MeshAsset {
    pub name: String,
    pub mesh: MeshData,
    pub bounds: BoundingBox,
}

impl MeshAsset {
    pub fn new(name: impl Into<String>, mesh: MeshData) -> Self {
        let bounds = BoundingBox::from_vertices(&mesh.vertices);
        Self {
            name: name.into(),
            mesh,
            bounds,
        }
    }

    /// Parse a mesh asset from OBJ text. All models are merged into one mesh.
    pub fn from_obj(name: impl Into<String>, obj_content: &str) -> Result<Self, AssetError> {
        let mut cursor = std::io::Cursor::new(obj_content.as_bytes());

        let load_options = tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        };

        let (models, _materials) = tobj::load_obj_buf(&mut cursor, &load_options, |_| {
            Ok((vec![], HashMap::new()))
        })
        .map_err(|e| AssetError::Parse(e.to_string()))?;

        let mut positions: Vec<[f32; 3]> = Vec::new();
        let mut normals: Vec<[f32; 3]> = Vec::new();
        let mut indices: Vec<u32> = Vec::new();
        let mut has_normals = true;

        for model in &models {
            let mesh = &model.mesh;
            if mesh.positions.is_empty() {
                continue;
            }

            let offset = positions.len() as u32;
            let vertex_count = mesh.positions.len() / 3;
            let model_has_normals = mesh.normals.len() == mesh.positions.len();
            has_normals &= model_has_normals;

            for i in 0..vertex_count {
                positions.push([
                    mesh.positions[i * 3],
                    mesh.positions[i * 3 + 1],
                    mesh.positions[i * 3 + 2],
                ]);
                if model_has_normals {
                    normals.push([
                        mesh.normals[i * 3],
                        mesh.normals[i * 3 + 1],
                        mesh.normals[i * 3 + 2],
                    ]);
                }
            }

            indices.extend(mesh.indices.iter().map(|&idx| offset + idx));
        }

        if positions.is_empty() || indices.is_empty() {
            return Err(AssetError::Empty);
        }
        if positions.len() > u16::MAX as usize + 1 {
            return Err(AssetError::TooLarge(positions.len()));
        }

        let indices: Vec<u16> = indices.into_iter().map(|i| i as u16).collect();

        let normals = if has_normals && normals.len() == positions.len() {
            normals
        } else {
            compute_vertex_normals(&positions, &indices)
        };

        let vertices = positions
            .iter()
            .zip(normals.iter())
            .map(|(position, normal)| Vertex::new(*position, *normal, ASSET_COLOR))
            .collect();

        Ok(Self::new(name, MeshData { vertices, indices }))
    }

    pub fn triangle_count(&self) -> usize {
        self.mesh.triangle_count()
    }
}

/// Fetch and parse an OBJ asset over HTTP.
pub async fn fetch_obj(url: &str) -> Result<MeshAsset, AssetError> {
    log::info!("Loading asset {}", url);

    let response = reqwest::get(url)
        .await
        .map_err(|e| AssetError::Fetch(e.to_string()))?;
    if !response.status().is_success() {
        return Err(AssetError::Fetch(format!("HTTP {}", response.status().as_u16())));
    }
    let text = response
        .text()
        .await
        .map_err(|e| AssetError::Fetch(e.to_string()))?;

    MeshAsset::from_obj(url, &text)
}

/// Compute area-weighted vertex normals from face normals.
///
/// Each vertex accumulates the unnormalized cross product of every adjacent
/// triangle, so larger triangles weigh more.
fn compute_vertex_normals(positions: &[[f32; 3]], indices: &[u16]) -> Vec<[f32; 3]> {
    let mut normals = vec![glam::Vec3::ZERO; positions.len()];

    for tri in indices.chunks_exact(3) {
        let [i0, i1, i2] = [tri[0] as usize, tri[1] as usize, tri[2] as usize];
        if i0 >= positions.len() || i1 >= positions.len() || i2 >= positions.len() {
            continue;
        }

        let p0 = glam::Vec3::from_array(positions[i0]);
        let p1 = glam::Vec3::from_array(positions[i1]);
        let p2 = glam::Vec3::from_array(positions[i2]);
        let face_normal = (p1 - p0).cross(p2 - p0);

        for idx in [i0, i1, i2] {
            normals[idx] += face_normal;
        }
    }

    normals
        .into_iter()
        .map(|n| {
            if n.length() > 1e-6 {
                n.normalize().to_array()
            } else {
                // Degenerate, fall back to Y-up
                [0.0, 1.0, 0.0]
            }
        })
        .collect()
}
