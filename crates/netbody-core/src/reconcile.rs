//! Reconciliation: networked record -> physics engine, at the right points
//! of the tick lifecycle.
//!
//! Rollback must always start from authoritative (or predicted) state, never
//! from a render-interpolated pose; the before-all-ticks hook undoes any
//! render-time writes before the first resimulation tick runs.

use nalgebra::Vector3;

use crate::backend::PhysicsBackend;
use crate::body::NetworkedBody;
use crate::context::{Fault, SyncContext, TickInfo};
use crate::scene::Pose;
use crate::snapshot::BodySnapshot;

impl<B: PhysicsBackend> NetworkedBody<B> {
    /// Runs once per scheduler invocation, before any of its ticks.
    pub fn before_all_ticks(&mut self, ctx: &mut SyncContext<'_, B>, ticks: TickInfo) {
        // Recenter the interpolation target; the root is about to become the
        // simulated pose again.
        if self.target_dirty_from_render {
            if let Some(target) = self.target {
                ctx.scene.set_local_pose(target, Pose::identity());
                if self.config.sync_scale {
                    ctx.scene.set_local_scale(target, Vector3::repeat(1.0));
                }
            }
            self.target_dirty_from_render = false;
        }

        // A dirty root always resets going into simulation; predicted
        // objects additionally reset at the start of every resimulation.
        if self.root_dirty_from_render || (self.client_prediction && ticks.resimulation) {
            self.copy_to_engine(ctx, ticks.resimulation);
        }
    }

    /// Replaces the record wholesale and pushes it into the engine.
    ///
    /// `full_reset` restores dynamics (velocities, locks, sleep) as well as
    /// the pose; without it only render-time transform changes are undone.
    pub fn apply(&mut self, ctx: &mut SyncContext<'_, B>, record: &BodySnapshot, full_reset: bool) {
        self.snapshot = *record;
        self.copy_to_engine(ctx, full_reset);
    }

    /// Runs every tick on proxies included in simulation, so interpolation
    /// history exists even where the authoritative record will differ.
    pub fn after_tick(&mut self, ctx: &mut SyncContext<'_, B>, ticks: TickInfo) {
        if ticks.role.is_proxy() && ticks.in_simulation {
            self.capture(ctx, ticks, true);
        }
    }

    /// Runs once after the last tick; the authority's canonical capture.
    pub fn after_all_ticks(&mut self, ctx: &mut SyncContext<'_, B>, ticks: TickInfo) {
        if !ticks.resimulation && ticks.role.is_authority() {
            self.capture(ctx, ticks, false);
        }
    }

    pub(crate) fn copy_to_engine(&mut self, ctx: &mut SyncContext<'_, B>, full_reset: bool) {
        let snapshot = self.snapshot;
        let mut is_parented = false;

        if self.config.sync_parent {
            let current_parent = ctx.scene.parent_of(self.root);
            if let Some(reference) = snapshot.parent {
                if let Some(found) = ctx.resolver.find_entity(reference) {
                    if current_parent != Some(found) {
                        ctx.scene.set_parent(self.root, Some(found));
                        if let Some(target) = self.target {
                            ctx.scene.set_local_pose(target, Pose::identity());
                        }
                    }
                } else {
                    ctx.faults.report(Fault::ParentNotFound { reference });
                }
                is_parented = true;
            } else if current_parent.is_some() {
                ctx.scene.set_parent(self.root, None);
            }
        }

        let networked_kinematic = snapshot.flags.is_kinematic();
        let networked_sleeping = snapshot.flags.is_sleeping();
        // Sleep conditions must be read before velocities are restored.
        let current_sleeping = ctx.backend.is_sleeping(self.handle);

        // A sleeping authority has valid uncompressed values.
        let pose = snapshot.restore_pose();

        // Local and networked state agree the body rests at this exact pose:
        // leave it alone rather than spuriously waking it.
        let at_recorded_pose = ctx.scene.local_pose(self.root) == Some(pose);
        let avoid_waking = !self.root_dirty_from_render
            && current_sleeping
            && networked_sleeping
            && at_recorded_pose;

        if networked_kinematic != ctx.backend.is_kinematic(self.handle) {
            ctx.backend.set_kinematic(self.handle, networked_kinematic);
        }

        if !avoid_waking {
            ctx.scene.set_local_pose(self.root, pose);
            // Recorded values are local space; only push them onto the body
            // when unparented (world == local).
            if !is_parented {
                ctx.backend.apply_pose(self.handle, &pose);
            }
            self.root_dirty_from_render = false;
        }

        if self.config.sync_scale {
            ctx.scene.set_local_scale(self.root, snapshot.scale);
        }

        // Extras and sleep handling only matter for prediction resets, not
        // when merely undoing interpolation writes.
        if full_reset && !networked_kinematic {
            ctx.backend.apply_extras(self.handle, &snapshot);
            ctx.backend.set_locks(self.handle, snapshot.locks);

            if avoid_waking {
                return;
            }

            if current_sleeping != networked_sleeping {
                if networked_sleeping {
                    // Forcing sleep on a body that still carries energy pops
                    // on the next contact; only do it once the engine agrees
                    // the body could sleep on its own.
                    if ctx.backend.below_sleep_thresholds(self.handle) {
                        ctx.backend.force_sleep(self.handle);
                    }
                } else {
                    ctx.backend.force_wake(self.handle);
                }
            }
        }
    }
}
