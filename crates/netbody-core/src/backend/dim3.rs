//! 3D physics backend using `Rapier3D` with deterministic behavior.

use rapier3d::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::backend::{PHYSICS_DT, PhysicsBackend};
use crate::scene::Pose;
use crate::snapshot::{BodyFlags, BodySnapshot};

/// Default gravity vector (downward, in m/s²).
pub fn default_gravity() -> Vector {
    Vector::new(0.0, -9.81, 0.0)
}

/// Sleep thresholds used when judging recorded state instead of a live
/// body; mirror rapier's default activation values.
const STATE_SLEEP_LINVEL: f32 = 0.4;
const STATE_SLEEP_ANGVEL: f32 = 0.5;

/// Physics world containing all `Rapier3D` components for deterministic
/// simulation.
#[derive(Serialize, Deserialize)]
pub struct PhysicsWorld {
    pub rigid_body_set: RigidBodySet,
    pub collider_set: ColliderSet,
    pub integration_parameters: IntegrationParameters,
    #[serde(skip, default = "PhysicsPipeline::new")]
    pub physics_pipeline: PhysicsPipeline,
    pub island_manager: IslandManager,
    pub broad_phase: DefaultBroadPhase,
    pub narrow_phase: NarrowPhase,
    pub impulse_joint_set: ImpulseJointSet,
    pub multibody_joint_set: MultibodyJointSet,
    pub ccd_solver: CCDSolver,
    pub gravity: Vector,
    pub frame: u64,
}

impl Default for PhysicsWorld {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PhysicsWorld {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PhysicsWorld")
            .field("frame", &self.frame)
            .field("rigid_body_count", &self.rigid_body_set.len())
            .field("collider_count", &self.collider_set.len())
            .field("gravity", &self.gravity)
            .finish_non_exhaustive()
    }
}

impl PhysicsWorld {
    /// Creates a new physics world with default settings.
    pub fn new() -> Self {
        Self::with_gravity(default_gravity())
    }

    /// Creates a new physics world with custom gravity.
    pub fn with_gravity(gravity: Vector) -> Self {
        let integration_parameters = IntegrationParameters {
            dt: PHYSICS_DT,
            ..Default::default()
        };

        Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters,
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity,
            frame: 0,
        }
    }

    /// Advances the physics simulation by one fixed timestep.
    pub fn step(&mut self) {
        self.physics_pipeline.step(
            self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            &(),
            &(),
        );
        self.frame += 1;
    }

    /// Advances the physics simulation by multiple steps.
    pub fn step_n(&mut self, n: u32) {
        for _ in 0..n {
            self.step();
        }
    }

    /// Adds a rigid body to the world and returns its handle.
    pub fn add_rigid_body(&mut self, rigid_body: RigidBody) -> RigidBodyHandle {
        self.rigid_body_set.insert(rigid_body)
    }

    /// Adds a collider attached to a rigid body.
    pub fn add_collider(&mut self, collider: Collider, parent: RigidBodyHandle) -> ColliderHandle {
        self.collider_set
            .insert_with_parent(collider, parent, &mut self.rigid_body_set)
    }

    /// Adds a collider without a parent (static collider).
    pub fn add_static_collider(&mut self, collider: Collider) -> ColliderHandle {
        self.collider_set.insert(collider)
    }

    /// Removes a rigid body and its attached colliders.
    pub fn remove_rigid_body(&mut self, handle: RigidBodyHandle) {
        self.rigid_body_set.remove(
            handle,
            &mut self.island_manager,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            true,
        );
    }

    /// Gets an immutable reference to a rigid body.
    pub fn get_rigid_body(&self, handle: RigidBodyHandle) -> Option<&RigidBody> {
        self.rigid_body_set.get(handle)
    }

    /// Gets a mutable reference to a rigid body.
    pub fn get_rigid_body_mut(&mut self, handle: RigidBodyHandle) -> Option<&mut RigidBody> {
        self.rigid_body_set.get_mut(handle)
    }

    /// Computes a deterministic hash of the current physics state, used to
    /// verify that rollback re-application reproduces identical state.
    pub fn compute_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();

        self.frame.hash(&mut hasher);

        for (handle, body) in self.rigid_body_set.iter() {
            let (index, generation) = handle.into_raw_parts();
            index.hash(&mut hasher);
            generation.hash(&mut hasher);

            let pos = body.translation();
            hash_f32(pos.x, &mut hasher);
            hash_f32(pos.y, &mut hasher);
            hash_f32(pos.z, &mut hasher);

            let rot = body.rotation();
            hash_f32(rot.x, &mut hasher);
            hash_f32(rot.y, &mut hasher);
            hash_f32(rot.z, &mut hasher);
            hash_f32(rot.w, &mut hasher);

            let linvel = body.linvel();
            hash_f32(linvel.x, &mut hasher);
            hash_f32(linvel.y, &mut hasher);
            hash_f32(linvel.z, &mut hasher);

            let angvel = body.angvel();
            hash_f32(angvel.x, &mut hasher);
            hash_f32(angvel.y, &mut hasher);
            hash_f32(angvel.z, &mut hasher);
        }

        hasher.finish()
    }

    /// Returns the current simulation frame number.
    pub fn current_frame(&self) -> u64 {
        self.frame
    }

    /// Resets the physics world to its initial state.
    pub fn reset(&mut self) {
        *self = Self::with_gravity(self.gravity);
    }
}

/// Hashes a f32 value by converting to bits.
fn hash_f32(value: f32, hasher: &mut impl Hasher) {
    value.to_bits().hash(hasher);
}

impl PhysicsBackend for PhysicsWorld {
    type Handle = RigidBodyHandle;

    fn capture_pose(&self, handle: RigidBodyHandle) -> Option<Pose> {
        let body = self.rigid_body_set.get(handle)?;
        let t = body.translation();
        let q = body.rotation();
        Some(Pose::new(
            nalgebra::Vector3::new(t.x, t.y, t.z),
            nalgebra::UnitQuaternion::from_quaternion(nalgebra::Quaternion::new(
                q.w, q.x, q.y, q.z,
            )),
        ))
    }

    fn apply_pose(&mut self, handle: RigidBodyHandle, pose: &Pose) {
        let Some(body) = self.rigid_body_set.get_mut(handle) else {
            return;
        };
        body.set_translation(
            Vector::new(pose.position.x, pose.position.y, pose.position.z),
            false,
        );
        let q = pose.rotation.quaternion();
        body.set_rotation(
            Rotation::from_xyzw(q.coords.x, q.coords.y, q.coords.z, q.coords.w),
            false,
        );
    }

    fn capture_extras(&self, handle: RigidBodyHandle, snapshot: &mut BodySnapshot) {
        let Some(body) = self.rigid_body_set.get(handle) else {
            return;
        };
        let linvel = body.linvel();
        let angvel = body.angvel();
        snapshot.linear_velocity = nalgebra::Vector3::new(linvel.x, linvel.y, linvel.z);
        snapshot.angular_velocity = nalgebra::Vector3::new(angvel.x, angvel.y, angvel.z);
    }

    fn apply_extras(&mut self, handle: RigidBodyHandle, snapshot: &BodySnapshot) {
        let Some(body) = self.rigid_body_set.get_mut(handle) else {
            return;
        };
        let linvel = snapshot.linear_velocity;
        let angvel = snapshot.angular_velocity;
        body.set_linvel(Vector::new(linvel.x, linvel.y, linvel.z), false);
        body.set_angvel(Vector::new(angvel.x, angvel.y, angvel.z), false);
    }

    fn flags(&self, handle: RigidBodyHandle) -> BodyFlags {
        let mut flags = BodyFlags::empty();
        if let Some(body) = self.rigid_body_set.get(handle) {
            flags.set(BodyFlags::KINEMATIC, body.is_kinematic());
            flags.set(BodyFlags::SLEEPING, !body.is_kinematic() && body.is_sleeping());
        }
        flags
    }

    fn is_kinematic(&self, handle: RigidBodyHandle) -> bool {
        self.rigid_body_set
            .get(handle)
            .is_some_and(RigidBody::is_kinematic)
    }

    fn set_kinematic(&mut self, handle: RigidBodyHandle, kinematic: bool) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            let body_type = if kinematic {
                RigidBodyType::KinematicPositionBased
            } else {
                RigidBodyType::Dynamic
            };
            if body.body_type() != body_type {
                body.set_body_type(body_type, false);
            }
        }
    }

    fn locks(&self, handle: RigidBodyHandle) -> u8 {
        self.rigid_body_set
            .get(handle)
            .map_or(0, |body| body.locked_axes().bits())
    }

    fn set_locks(&mut self, handle: RigidBodyHandle, locks: u8) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.set_locked_axes(LockedAxes::from_bits_truncate(locks), false);
        }
    }

    fn is_sleeping(&self, handle: RigidBodyHandle) -> bool {
        self.rigid_body_set
            .get(handle)
            .is_some_and(RigidBody::is_sleeping)
    }

    fn force_sleep(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.sleep();
        }
    }

    fn force_wake(&mut self, handle: RigidBodyHandle) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.wake_up(true);
        }
    }

    fn below_sleep_thresholds(&self, handle: RigidBodyHandle) -> bool {
        let Some(body) = self.rigid_body_set.get(handle) else {
            return false;
        };
        let activation = body.activation();
        body.linvel().length() < activation.normalized_linear_threshold
            && body.angvel().length() < activation.angular_threshold
    }

    fn state_below_sleep_thresholds(&self, snapshot: &BodySnapshot) -> bool {
        snapshot.linear_velocity.norm() < STATE_SLEEP_LINVEL
            && snapshot.angular_velocity.norm() < STATE_SLEEP_ANGVEL
    }

    fn step(&mut self, dt: f32) {
        self.integration_parameters.dt = dt;
        PhysicsWorld::step(self);
    }
}
