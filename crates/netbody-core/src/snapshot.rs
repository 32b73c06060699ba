//! Networked rigidbody state records.
//!
//! A [`BodySnapshot`] is the wholesale-replaced record of one entity's pose
//! and rigidbody state for a single tick. The tick history of these records
//! is what rollback restores from and what rendering interpolates between.

use nalgebra::{UnitQuaternion, Vector3};
use serde::{Deserialize, Serialize};

use crate::scene::{NetRef, Pose};

/// Rigidbody state bits carried in a snapshot.
///
/// A body is either kinematic or dynamic; sleeping is only ever captured on
/// dynamic bodies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BodyFlags(u8);

impl BodyFlags {
    pub const KINEMATIC: BodyFlags = BodyFlags(1);
    pub const SLEEPING: BodyFlags = BodyFlags(1 << 1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn is_kinematic(self) -> bool {
        self.contains(Self::KINEMATIC)
    }

    pub const fn is_sleeping(self) -> bool {
        self.contains(Self::SLEEPING)
    }

    pub fn set(&mut self, flag: BodyFlags, on: bool) {
        if on {
            self.0 |= flag.0;
        } else {
            self.0 &= !flag.0;
        }
    }
}

impl std::ops::BitOr for BodyFlags {
    type Output = BodyFlags;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Teleport keys cycle through magnitudes 1..=KEY_LIMIT.
pub(crate) const TELEPORT_KEY_LIMIT: i8 = 30;

/// The networked snapshot of one entity's transform/rigidbody state.
///
/// Owned exclusively by the entity and replaced wholesale on every capture.
/// Positions and rotations are local-space; the teleport and full-precision
/// fields are only meaningful when their trigger conditions hold (a moving
/// teleport this tick, a sleeping body).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BodySnapshot {
    pub position: Vector3<f32>,
    pub rotation: UnitQuaternion<f32>,
    pub scale: Vector3<f32>,
    /// Direct parent, when mounted on another networked entity.
    pub parent: Option<NetRef>,
    /// Discontinuity marker. 0 = never teleported; positive = last teleport
    /// was an instantaneous snap, negative = motion-preserving. Magnitude
    /// cycles 1..=30 so adjacent snapshots always differ across a teleport.
    pub teleport_key: i8,
    /// Pre-teleport pose, the slide source for motion-preserving teleports.
    pub teleport_position: Vector3<f32>,
    pub teleport_rotation: UnitQuaternion<f32>,
    /// Uncompressed rest pose, captured only while sleeping. Sleeping bodies
    /// have no resimulation to correct quantization drift, so exact rest
    /// reproduction needs the raw values.
    pub full_precision_position: Vector3<f32>,
    pub full_precision_rotation: UnitQuaternion<f32>,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub flags: BodyFlags,
    /// Engine-specific axis-lock bitmask, passed through opaquely.
    pub locks: u8,
}

impl Default for BodySnapshot {
    fn default() -> Self {
        Self {
            position: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            scale: Vector3::repeat(1.0),
            parent: None,
            teleport_key: 0,
            teleport_position: Vector3::zeros(),
            teleport_rotation: UnitQuaternion::identity(),
            full_precision_position: Vector3::zeros(),
            full_precision_rotation: UnitQuaternion::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            flags: BodyFlags::empty(),
            locks: 0,
        }
    }
}

impl BodySnapshot {
    /// The regular (interpolatable) pose.
    pub fn pose(&self) -> Pose {
        Pose::new(self.position, self.rotation)
    }

    /// The pose rollback should restore: full-precision while sleeping,
    /// the regular fields otherwise.
    pub fn restore_pose(&self) -> Pose {
        if self.flags.is_sleeping() {
            Pose::new(self.full_precision_position, self.full_precision_rotation)
        } else {
            self.pose()
        }
    }

    /// Serializes the snapshot to bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        postcard::to_allocvec(self)
    }

    /// Deserializes a snapshot from bytes.
    pub fn from_bytes(data: &[u8]) -> Result<Self, postcard::Error> {
        postcard::from_bytes(data)
    }
}

/// Two historical snapshots bracketing the current render time.
#[derive(Debug, Clone, Copy)]
pub struct SnapshotPair<'a> {
    pub from: &'a BodySnapshot,
    pub to: &'a BodySnapshot,
    /// Blend factor in [0, 1] between `from` and `to`.
    pub alpha: f32,
}

/// A teleport waiting for the current tick's physics step.
///
/// Consumed exactly once; queueing another teleport before it fires
/// overwrites the payload rather than double-applying.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DeferredTeleport {
    pub position: Option<Vector3<f32>>,
    pub rotation: Option<UnitQuaternion<f32>>,
    pub moving: bool,
}
