//! Collaborator interfaces consumed by the sync engine.
//!
//! The tick scheduler, network layer and fault sinks all live outside this
//! crate; each operation borrows them for its duration through
//! [`SyncContext`]. There is no locking anywhere: the scheduler contract
//! guarantees strictly sequential phases.

use std::collections::HashMap;

use crate::backend::PhysicsBackend;
use crate::scene::{EntityId, NetRef, Scene};
use crate::snapshot::SnapshotPair;
use crate::stepper::PhysicsStepper;

/// Which side of the simulation this peer is for the entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The simulator whose captured state is canonical.
    Authority,
    /// A non-authoritative replica.
    Proxy,
}

impl Role {
    pub const fn is_authority(self) -> bool {
        matches!(self, Role::Authority)
    }

    pub const fn is_proxy(self) -> bool {
        matches!(self, Role::Proxy)
    }
}

/// Per-invocation facts supplied by the external tick scheduler.
#[derive(Debug, Clone, Copy)]
pub struct TickInfo {
    pub role: Role,
    /// True while replaying ticks after a rollback correction.
    pub resimulation: bool,
    /// True while the entity is included in simulation (as opposed to being
    /// a render-only replica).
    pub in_simulation: bool,
}

impl TickInfo {
    pub const fn authority() -> Self {
        Self {
            role: Role::Authority,
            resimulation: false,
            in_simulation: true,
        }
    }

    pub const fn proxy() -> Self {
        Self {
            role: Role::Proxy,
            resimulation: false,
            in_simulation: true,
        }
    }

    #[must_use]
    pub const fn resimulating(mut self) -> Self {
        self.resimulation = true;
        self
    }

    #[must_use]
    pub const fn render_only(mut self) -> Self {
        self.in_simulation = false;
        self
    }
}

/// Maps network references to local scene nodes and back.
///
/// Must be callable mid-tick; resolution failures are reported as faults,
/// never raised.
pub trait EntityResolver {
    fn find_entity(&self, reference: NetRef) -> Option<EntityId>;
    fn reference_of(&self, entity: EntityId) -> Option<NetRef>;
}

/// Table-backed resolver, sufficient for tests and single-scene drivers.
#[derive(Debug, Clone, Default)]
pub struct MapResolver {
    by_reference: HashMap<NetRef, EntityId>,
    by_entity: HashMap<EntityId, NetRef>,
}

impl MapResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, reference: NetRef, entity: EntityId) {
        self.by_reference.insert(reference, entity);
        self.by_entity.insert(entity, reference);
    }

    pub fn unregister(&mut self, reference: NetRef) {
        if let Some(entity) = self.by_reference.remove(&reference) {
            self.by_entity.remove(&entity);
        }
    }
}

impl EntityResolver for MapResolver {
    fn find_entity(&self, reference: NetRef) -> Option<EntityId> {
        self.by_reference.get(&reference).copied()
    }

    fn reference_of(&self, entity: EntityId) -> Option<NetRef> {
        self.by_entity.get(&entity).copied()
    }
}

/// Supplies the snapshot pair bracketing the current render frame.
pub trait SnapshotSource {
    fn snapshot_pair(&self) -> Option<SnapshotPair<'_>>;
}

/// Non-fatal conditions surfaced to the embedding application.
///
/// Every fault degrades to "use the last good pose" or "skip this frame";
/// none is fatal to the process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum Fault {
    #[error("parent entity {reference} does not exist locally")]
    ParentNotFound { reference: NetRef },
    #[error("no interpolation data for this frame")]
    MissingInterpolationData,
}

/// Sink for faults. Implementations may count, log, or escalate.
pub trait FaultReporter {
    fn report(&mut self, fault: Fault);
}

/// Default reporter: logs through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogFaults;

impl FaultReporter for LogFaults {
    fn report(&mut self, fault: Fault) {
        tracing::warn!("[body] {fault}");
    }
}

/// Everything a sync operation needs from the outside world, borrowed for
/// the duration of one call.
pub struct SyncContext<'a, B: PhysicsBackend> {
    pub backend: &'a mut B,
    pub scene: &'a mut Scene,
    pub resolver: &'a dyn EntityResolver,
    pub faults: &'a mut dyn FaultReporter,
    pub stepper: &'a mut PhysicsStepper,
}
