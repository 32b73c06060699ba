//! Minimal transform hierarchy for networked entities.
//!
//! Simulation and rendering both write poses through this store: the
//! simulated root node, an optional interpolation-target child, and any
//! parent nodes an entity can be mounted on. World poses are composed from
//! local poses up the parent chain; scale is a local-only property and does
//! not participate in pose composition.

use std::collections::HashMap;

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

/// Identifier of a transform node in the local scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(u32);

impl EntityId {
    /// Returns the raw node index.
    pub const fn index(self) -> u32 {
        self.0
    }
}

/// Stable network reference to another networked entity.
///
/// Opaque to this crate; the resolver maps it to and from local scene nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NetRef(u64);

impl NetRef {
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for NetRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ref:{}", self.0)
    }
}

/// Position and rotation, without scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
}

impl Pose {
    pub fn identity() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
        }
    }

    pub fn new(position: Vector3<f32>, rotation: UnitQuaternion<f32>) -> Self {
        Self { position, rotation }
    }

    /// Composes `self * local`, treating `self` as the parent space.
    pub fn compose(&self, local: &Pose) -> Pose {
        Pose {
            position: self.position + self.rotation * local.position,
            rotation: self.rotation * local.rotation,
        }
    }

    /// Returns the inverse pose.
    pub fn inverse(&self) -> Pose {
        let rotation = self.rotation.inverse();
        Pose {
            position: -(rotation * self.position),
            rotation,
        }
    }
}

impl Default for Pose {
    fn default() -> Self {
        Self::identity()
    }
}

/// A single node in the hierarchy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformNode {
    pub local_position: Vector3<f32>,
    pub local_rotation: UnitQuaternion<f32>,
    pub local_scale: Vector3<f32>,
    parent: Option<EntityId>,
}

impl TransformNode {
    fn identity() -> Self {
        Self {
            local_position: Vector3::zeros(),
            local_rotation: UnitQuaternion::identity(),
            local_scale: Vector3::repeat(1.0),
            parent: None,
        }
    }

    pub fn local_pose(&self) -> Pose {
        Pose::new(self.local_position, self.local_rotation)
    }
}

/// Parent chains deeper than this are treated as broken (cycle guard).
const MAX_HIERARCHY_DEPTH: usize = 64;

/// Transform store for all nodes an entity interacts with.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Scene {
    nodes: HashMap<EntityId, TransformNode>,
    next: u32,
}

impl Scene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a new root-level node at the identity pose.
    pub fn spawn(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next += 1;
        self.nodes.insert(id, TransformNode::identity());
        id
    }

    /// Creates a new node parented under `parent`, at the identity local pose.
    pub fn spawn_child(&mut self, parent: EntityId) -> EntityId {
        let id = self.spawn();
        if let Some(node) = self.nodes.get_mut(&id) {
            node.parent = Some(parent);
        }
        id
    }

    /// Removes a node. Children keep their (now dangling) parent link and are
    /// treated as roots from then on.
    pub fn despawn(&mut self, id: EntityId) {
        self.nodes.remove(&id);
    }

    pub fn contains(&self, id: EntityId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn node(&self, id: EntityId) -> Option<&TransformNode> {
        self.nodes.get(&id)
    }

    pub fn parent_of(&self, id: EntityId) -> Option<EntityId> {
        self.nodes.get(&id).and_then(|n| n.parent)
    }

    /// Reparents a node, preserving its world pose.
    pub fn set_parent(&mut self, id: EntityId, parent: Option<EntityId>) {
        let world = self.world_pose(id);
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        node.parent = parent;
        if let Some(world) = world {
            self.set_world_pose(id, world);
        }
    }

    pub fn local_pose(&self, id: EntityId) -> Option<Pose> {
        self.nodes.get(&id).map(TransformNode::local_pose)
    }

    pub fn set_local_pose(&mut self, id: EntityId, pose: Pose) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.local_position = pose.position;
            node.local_rotation = pose.rotation;
        }
    }

    pub fn local_scale(&self, id: EntityId) -> Option<Vector3<f32>> {
        self.nodes.get(&id).map(|n| n.local_scale)
    }

    pub fn set_local_scale(&mut self, id: EntityId, scale: Vector3<f32>) {
        if let Some(node) = self.nodes.get_mut(&id) {
            node.local_scale = scale;
        }
    }

    /// World pose of a node, composed up the parent chain. Missing parents
    /// are treated as the identity (the node becomes a root).
    pub fn world_pose(&self, id: EntityId) -> Option<Pose> {
        let node = self.nodes.get(&id)?;
        let mut pose = node.local_pose();
        let mut parent = node.parent;
        let mut depth = 0;
        while let Some(parent_id) = parent {
            if depth >= MAX_HIERARCHY_DEPTH {
                break;
            }
            depth += 1;
            let Some(parent_node) = self.nodes.get(&parent_id) else {
                break;
            };
            pose = parent_node.local_pose().compose(&pose);
            parent = parent_node.parent;
        }
        Some(pose)
    }

    /// Writes a world pose by converting it into the node's parent space.
    pub fn set_world_pose(&mut self, id: EntityId, world: Pose) {
        let local = match self.parent_of(id).and_then(|p| self.world_pose(p)) {
            Some(parent_world) => parent_world.inverse().compose(&world),
            None => world,
        };
        self.set_local_pose(id, local);
    }
}
