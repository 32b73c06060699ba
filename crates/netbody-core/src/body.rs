//! The networked rigidbody entity.
//!
//! One [`NetworkedBody`] shuttles state between the network layer and the
//! physics engine for a single entity: capture after simulation, engine
//! reset before rollback, interpolation at render time, and teleport
//! bookkeeping. The tick scheduler owns the phase ordering; this type owns
//! all per-entity state.

use crate::backend::PhysicsBackend;
use crate::config::{ConfigError, SyncConfig};
use crate::context::{SyncContext, TickInfo};
use crate::scene::{EntityId, NetRef, Scene};
use crate::snapshot::{BodySnapshot, DeferredTeleport};
use crate::stepper::SimulateStages;

pub struct NetworkedBody<B: PhysicsBackend> {
    pub(crate) handle: B::Handle,
    pub(crate) root: EntityId,
    /// Optional child node rendering writes instead of the root, decoupling
    /// the visible pose from the simulated one.
    pub(crate) target: Option<EntityId>,
    pub(crate) config: SyncConfig,
    pub(crate) snapshot: BodySnapshot,
    /// Visibility override derived from the parent entity during capture.
    pub(crate) aoi_override: Option<NetRef>,
    /// Whether this peer simulates forward ticks for proxies.
    pub(crate) client_prediction: bool,
    /// Render wrote the root transform since the last engine reset.
    pub(crate) root_dirty_from_render: bool,
    /// Render wrote the interpolation target since it was last recentered.
    pub(crate) target_dirty_from_render: bool,
    pub(crate) deferred_teleport: Option<DeferredTeleport>,
}

impl<B: PhysicsBackend> NetworkedBody<B> {
    /// Creates a body for an existing scene node and engine handle.
    pub fn new(root: EntityId, handle: B::Handle, config: SyncConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            handle,
            root,
            target: None,
            config,
            snapshot: BodySnapshot::default(),
            aoi_override: None,
            client_prediction: false,
            root_dirty_from_render: false,
            target_dirty_from_render: false,
            deferred_teleport: None,
        })
    }

    /// Creates the interpolation-target child node. Must be called at setup,
    /// before the body enters the tick loop.
    #[must_use]
    pub fn with_interpolation_target(mut self, scene: &mut Scene) -> Self {
        if self.config.sync_scale {
            tracing::warn!("[body] scale sync with an interpolation target is unreliable");
        }
        self.target = Some(scene.spawn_child(self.root));
        self
    }

    pub fn root(&self) -> EntityId {
        self.root
    }

    pub fn handle(&self) -> B::Handle {
        self.handle
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// The current networked record for this entity.
    pub fn snapshot(&self) -> &BodySnapshot {
        &self.snapshot
    }

    pub fn interpolation_target(&self) -> Option<EntityId> {
        self.target
    }

    /// Area-of-interest override derived from the parent, if any.
    pub fn aoi_override(&self) -> Option<NetRef> {
        self.aoi_override
    }

    pub fn is_client_predicted(&self) -> bool {
        self.client_prediction
    }

    /// One-time entry into the networked world.
    ///
    /// The authority seeds the record from the engine; proxies become
    /// kinematic and push the received record in. Prediction capability is
    /// derived from the stepper: a stepper that simulates forward ticks
    /// predicts proxies locally.
    pub fn spawn(&mut self, ctx: &mut SyncContext<'_, B>, ticks: TickInfo) {
        self.client_prediction = ctx.stepper.stages().contains(SimulateStages::FORWARD);

        if ticks.role.is_proxy() {
            ctx.backend.set_kinematic(self.handle, true);
        }

        if ticks.role.is_authority() {
            self.capture(ctx, ticks, false);
        } else {
            // Force the first engine push regardless of interpolation state.
            self.root_dirty_from_render = true;
            self.copy_to_engine(ctx, true);
            // Has to happen after the engine push, or the push would restore
            // the networked kinematic flag right back.
            if !ticks.in_simulation {
                ctx.backend.set_kinematic(self.handle, true);
            }
        }
        tracing::debug!(
            "[body] spawned root={} prediction={}",
            self.root.index(),
            self.client_prediction
        );
    }

    /// Bodies removed from simulation stop getting reconciliation calls and
    /// only render; making them kinematic keeps the engine from fighting
    /// the render writes.
    pub fn simulation_exit(&mut self, ctx: &mut SyncContext<'_, B>) {
        ctx.backend.set_kinematic(self.handle, true);
    }
}
