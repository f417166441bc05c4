//! Scene graph for the ambient backdrop and the detail viewer.
//!
//! Entities are groups, meshes or point clouds. Any entity may have a parent
//! group; its world matrix is the parent chain applied to its own transform.
//! GPU resources are referenced by handle, never owned here.

use std::collections::HashMap;

use crate::gpu::{MaterialHandle, MeshHandle, PointsHandle};

/// Unique identifier for scene entities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub u64);

/// 3D position/vector.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn splat(v: f32) -> Self {
        Self { x: v, y: v, z: v }
    }
}

impl From<Vec3> for glam::Vec3 {
    fn from(v: Vec3) -> Self {
        glam::Vec3::new(v.x, v.y, v.z)
    }
}

/// Transform component for scene entities.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Vec3, // Euler angles in radians
    pub scale: Vec3,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec3::default(),
            rotation: Vec3::default(),
            scale: Vec3::splat(1.0),
        }
    }
}

impl Transform {
    /// Model = Translation * Rotation * Scale
    pub fn matrix(&self) -> glam::Mat4 {
        let translation = glam::Mat4::from_translation(self.position.into());
        let rotation = glam::Mat4::from_euler(
            glam::EulerRot::XYZ,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        );
        let scale = glam::Mat4::from_scale(self.scale.into());
        translation * rotation * scale
    }
}

/// A mesh instance: uploaded geometry plus a material.
#[derive(Debug, Clone)]
pub struct MeshInstance {
    pub mesh: MeshHandle,
    pub material: MaterialHandle,
    pub transform: Transform,
    pub visible: bool,
}

/// A field of points drawn with one size and a shared opacity.
#[derive(Debug, Clone)]
pub struct PointCloud {
    pub points: PointsHandle,
    pub size: f32,
    pub opacity: f32,
    pub additive: bool,
    pub transform: Transform,
    pub visible: bool,
}

#[derive(Debug, Clone)]
pub enum SceneEntity {
    Group(Transform),
    Mesh(MeshInstance),
    Points(PointCloud),
}

impl SceneEntity {
    pub fn transform(&self) -> &Transform {
        match self {
            SceneEntity::Group(t) => t,
            SceneEntity::Mesh(m) => &m.transform,
            SceneEntity::Points(p) => &p.transform,
        }
    }

    pub fn transform_mut(&mut self) -> &mut Transform {
        match self {
            SceneEntity::Group(t) => t,
            SceneEntity::Mesh(m) => &mut m.transform,
            SceneEntity::Points(p) => &mut p.transform,
        }
    }
}

#[derive(Debug)]
struct Node {
    entity: SceneEntity,
    parent: Option<EntityId>,
}

#[derive(Debug)]
pub struct SceneGraph {
    nodes: HashMap<EntityId, Node>,
    /// Entities that will be rendered, in insertion order.
    scene_entities: Vec<EntityId>,
    next_id: u64,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self {
            nodes: HashMap::new(),
            scene_entities: Vec::new(),
            next_id: 1,
        }
    }

    fn new_id(&mut self) -> EntityId {
        let id = EntityId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create an entity under `parent` and add it to the scene.
    pub fn insert(&mut self, entity: SceneEntity, parent: Option<EntityId>) -> EntityId {
        let id = self.new_id();
        self.nodes.insert(id, Node { entity, parent });
        self.scene_entities.push(id);
        id
    }

    pub fn create_group(&mut self, parent: Option<EntityId>) -> EntityId {
        self.insert(SceneEntity::Group(Transform::default()), parent)
    }

    /// Remove an entity. Children keep existing but lose their parent.
    pub fn destroy(&mut self, id: EntityId) -> bool {
        if self.nodes.remove(&id).is_none() {
            return false;
        }
        self.scene_entities.retain(|&e| e != id);
        for node in self.nodes.values_mut() {
            if node.parent == Some(id) {
                node.parent = None;
            }
        }
        true
    }

    pub fn get(&self, id: EntityId) -> Option<&SceneEntity> {
        self.nodes.get(&id).map(|n| &n.entity)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut SceneEntity> {
        self.nodes.get_mut(&id).map(|n| &mut n.entity)
    }

    pub fn transform_mut(&mut self, id: EntityId) -> Option<&mut Transform> {
        self.get_mut(id).map(SceneEntity::transform_mut)
    }

    pub fn parent(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// World matrix of an entity: parent chain applied to its local transform.
    pub fn world_matrix(&self, id: EntityId) -> glam::Mat4 {
        let mut matrix = glam::Mat4::IDENTITY;
        let mut current = Some(id);
        // Bounded by node count so a malformed chain cannot loop forever
        let mut remaining = self.nodes.len();

        while let (Some(cid), true) = (current, remaining > 0) {
            let Some(node) = self.nodes.get(&cid) else {
                break;
            };
            matrix = node.entity.transform().matrix() * matrix;
            current = node.parent;
            remaining -= 1;
        }
        matrix
    }

    pub fn scene_entities(&self) -> impl Iterator<Item = (EntityId, &SceneEntity)> {
        self.scene_entities
            .iter()
            .filter_map(|&id| self.nodes.get(&id).map(|n| (id, &n.entity)))
    }

    /// Visible mesh instances with their world matrices.
    pub fn meshes(&self) -> impl Iterator<Item = (EntityId, &MeshInstance)> {
        self.scene_entities().filter_map(|(id, entity)| match entity {
            SceneEntity::Mesh(mesh) if mesh.visible => Some((id, mesh)),
            _ => None,
        })
    }

    /// Visible point clouds.
    pub fn point_clouds(&self) -> impl Iterator<Item = (EntityId, &PointCloud)> {
        self.scene_entities().filter_map(|(id, entity)| match entity {
            SceneEntity::Points(cloud) if cloud.visible => Some((id, cloud)),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.scene_entities.clear();
    }
}

impl Default for SceneGraph {
    fn default() -> Self {
        Self::new()
    }
}
