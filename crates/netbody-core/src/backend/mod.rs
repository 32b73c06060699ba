//! Physics engine abstraction.
//!
//! The sync engine never touches an engine type directly; everything it
//! needs from the simulation is expressed as this capability trait,
//! implemented once per underlying engine. Reads on a dead handle return
//! `None`/defaults and writes no-op, so a despawned body degrades to
//! skipped work instead of a panic.

use crate::scene::Pose;
use crate::snapshot::{BodyFlags, BodySnapshot};

#[cfg(feature = "dim2")]
pub mod dim2;
#[cfg(feature = "dim3")]
pub mod dim3;

/// Fixed timestep for physics simulation (60Hz).
pub const PHYSICS_DT: f32 = 1.0 / 60.0;

/// Capture/apply primitives one physics engine must provide.
pub trait PhysicsBackend {
    /// Engine-side rigidbody handle.
    type Handle: Copy + std::fmt::Debug;

    /// World pose of the body, or `None` for a dead handle.
    fn capture_pose(&self, body: Self::Handle) -> Option<Pose>;
    fn apply_pose(&mut self, body: Self::Handle, pose: &Pose);

    /// Reads velocities (and any engine extras) into the snapshot.
    fn capture_extras(&self, body: Self::Handle, snapshot: &mut BodySnapshot);
    fn apply_extras(&mut self, body: Self::Handle, snapshot: &BodySnapshot);

    fn flags(&self, body: Self::Handle) -> BodyFlags;

    fn is_kinematic(&self, body: Self::Handle) -> bool;
    fn set_kinematic(&mut self, body: Self::Handle, kinematic: bool);

    /// Engine-specific axis-lock bitmask, opaque to the core.
    fn locks(&self, body: Self::Handle) -> u8;
    fn set_locks(&mut self, body: Self::Handle, locks: u8);

    fn is_sleeping(&self, body: Self::Handle) -> bool;
    fn force_sleep(&mut self, body: Self::Handle);
    fn force_wake(&mut self, body: Self::Handle);

    /// Whether the live body's dynamics are below the engine's sleep
    /// thresholds (a forced sleep would then be stable).
    fn below_sleep_thresholds(&self, body: Self::Handle) -> bool;

    /// Same test against a recorded snapshot instead of the live body.
    fn state_below_sleep_thresholds(&self, snapshot: &BodySnapshot) -> bool;

    /// Advances the simulation by one step of `dt` seconds.
    fn step(&mut self, dt: f32);
}
