//! Netbody Core Library
//!
//! Replicates the transform/rigidbody state of simulated entities across an
//! authoritative simulator and its observers in a tick-based,
//! rollback-capable simulation: snapshot capture after each tick, engine
//! reconciliation before rollback resimulation, smooth interpolation at
//! render time, and teleport disambiguation so discontinuities never smear
//! across frames.
//!
//! The physics engine is consumed through the [`backend::PhysicsBackend`]
//! trait; Rapier 3D and Rapier 2D implementations ship behind the `dim3`
//! (default) and `dim2` features.

#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::module_name_repetitions)]

pub mod backend;
pub mod body;
pub mod config;
pub mod context;
pub mod history;
pub mod scene;
pub mod snapshot;
pub mod stepper;

// NetworkedBody impls, split by lifecycle phase.
mod capture;
mod reconcile;
mod render;
mod teleport;

#[cfg(test)]
pub(crate) mod testkit;

pub use backend::{PHYSICS_DT, PhysicsBackend};
pub use body::NetworkedBody;
pub use config::{ConfigError, RenderPolicy, RenderThresholds, SyncConfig};
pub use context::{
    EntityResolver, Fault, FaultReporter, LogFaults, MapResolver, Role, SnapshotSource,
    SyncContext, TickInfo,
};
pub use history::SnapshotHistory;
pub use scene::{EntityId, NetRef, Pose, Scene, TransformNode};
pub use snapshot::{BodyFlags, BodySnapshot, DeferredTeleport, SnapshotPair};
pub use stepper::{PhysicsStepper, SimulateStages};
