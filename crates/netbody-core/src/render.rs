//! Render-time interpolation between two historical snapshots.
//!
//! Interpolated poses are presentation only; they are never allowed to leak
//! back into simulation. Every write here marks the root or target dirty so
//! the next reconciliation pass can undo it.

use nalgebra::{UnitQuaternion, Vector3};

use crate::backend::PhysicsBackend;
use crate::body::NetworkedBody;
use crate::config::RenderPolicy;
use crate::context::{Fault, SnapshotSource, SyncContext, TickInfo};
use crate::scene::Pose;
use crate::snapshot::BodySnapshot;

/// Slerp with a fallback for (near-)antipodal rotations, where the shortest
/// arc is ambiguous and nalgebra refuses to pick one.
fn slerp(from: &UnitQuaternion<f32>, to: &UnitQuaternion<f32>, alpha: f32) -> UnitQuaternion<f32> {
    from.try_slerp(to, alpha, 1.0e-9)
        .unwrap_or(if alpha < 0.5 { *from } else { *to })
}

impl<B: PhysicsBackend> NetworkedBody<B> {
    /// Produces the rendered pose for this display frame.
    pub fn render(
        &mut self,
        ctx: &mut SyncContext<'_, B>,
        ticks: TickInfo,
        source: &dyn SnapshotSource,
    ) {
        if !self.config.interpolation {
            return;
        }
        if self.config.render_policy == RenderPolicy::Latest {
            return;
        }

        let Some(pair) = source.snapshot_pair() else {
            ctx.faults.report(Fault::MissingInterpolationData);
            return;
        };
        let mut fr: BodySnapshot = *pair.from;
        let to: BodySnapshot = *pair.to;
        let alpha = pair.alpha;

        let to_key = to.teleport_key;
        let teleport = fr.teleport_key != to_key;
        // Don't interpolate through instantaneous teleports: the destination
        // becomes both endpoints, so the jump lands in a single frame.
        if teleport && to_key >= 0 {
            fr = to;
        }

        let mut use_target = !ticks.in_simulation && self.target.is_some();

        if self.config.sync_parent {
            let current_parent = ctx.scene.parent_of(self.root);

            if let Some(reference) = fr.parent {
                let Some(found) = ctx.resolver.find_entity(reference) else {
                    ctx.faults.report(Fault::ParentNotFound { reference });
                    return;
                };

                if current_parent != Some(found) {
                    ctx.scene.set_parent(self.root, Some(found));
                    self.root_dirty_from_render = true;

                    // Moving by the root while parented: recorded poses are
                    // local space, the target only works in world space.
                    if let Some(target) = self.target {
                        ctx.scene.set_local_pose(target, Pose::identity());
                        if self.config.sync_scale {
                            ctx.scene.set_local_scale(target, Vector3::repeat(1.0));
                        }
                        self.target_dirty_from_render = false;
                    }
                }

                // A reparent inside this bracket means `from` and `to` are in
                // different spaces; snap to `from` instead of interpolating.
                if fr.parent != to.parent {
                    ctx.scene.set_local_pose(self.root, fr.pose());
                    if self.config.sync_scale {
                        ctx.scene.set_local_scale(self.root, fr.scale);
                    }
                    self.root_dirty_from_render = true;
                    return;
                }

                use_target = false;
            } else {
                if current_parent.is_some() {
                    ctx.scene.set_parent(self.root, None);
                    self.root_dirty_from_render = true;
                }
                if fr.parent != to.parent {
                    if use_target {
                        if let Some(target) = self.target {
                            // Unparented, so the target can move in world
                            // space safely.
                            ctx.scene.set_world_pose(target, fr.pose());
                            self.target_dirty_from_render = true;
                        }
                    } else {
                        ctx.scene.set_local_pose(self.root, fr.pose());
                        if self.config.sync_scale {
                            ctx.scene.set_local_scale(self.root, fr.scale);
                        }
                        self.root_dirty_from_render = true;
                    }
                    return;
                }
            }
        }

        let (position, rotation) = if teleport && to_key < 0 {
            // Moving teleport: slide from the pre-teleport pose toward the
            // recorded destination.
            (
                fr.position.lerp(&to.teleport_position, alpha),
                slerp(&fr.rotation, &to.teleport_rotation, alpha),
            )
        } else {
            (
                fr.position.lerp(&to.position, alpha),
                slerp(&fr.rotation, &to.rotation, alpha),
            )
        };

        if use_target && !ticks.in_simulation {
            if let Some(target) = self.target {
                ctx.scene
                    .set_world_pose(target, Pose::new(position, rotation));
                if self.config.sync_scale {
                    ctx.scene
                        .set_local_scale(target, fr.scale.lerp(&to.scale, alpha));
                }
                self.target_dirty_from_render = true;
            }
        } else {
            let scale = if self.config.sync_scale {
                fr.scale.lerp(&to.scale, alpha)
            } else {
                Vector3::repeat(1.0)
            };

            // The object is coming to rest: stop nudging it so the engine
            // can actually put it to sleep.
            if self.target.is_none()
                && !self.target_dirty_from_render
                && self.config.use_render_sleep_thresholds
                && self.below_render_thresholds(ctx, &fr, position, rotation, scale)
            {
                return;
            }

            ctx.scene
                .set_local_pose(self.root, Pose::new(position, rotation));
            if self.config.sync_scale {
                ctx.scene.set_local_scale(self.root, scale);
            }
            self.root_dirty_from_render = true;
        }
    }

    fn below_render_thresholds(
        &self,
        ctx: &SyncContext<'_, B>,
        fr: &BodySnapshot,
        position: Vector3<f32>,
        rotation: UnitQuaternion<f32>,
        scale: Vector3<f32>,
    ) -> bool {
        let thresholds = self.config.render_thresholds;
        let Some(current) = ctx.scene.world_pose(self.root) else {
            return false;
        };

        if thresholds.use_energy && !ctx.backend.state_below_sleep_thresholds(fr) {
            return false;
        }
        if thresholds.position > 0.0
            && (position - current.position).norm_squared() >= thresholds.position
        {
            return false;
        }
        if thresholds.rotation > 0.0 && rotation.angle_to(&current.rotation) >= thresholds.rotation
        {
            return false;
        }
        if thresholds.scale > 0.0 && self.config.sync_scale {
            let current_scale = ctx
                .scene
                .local_scale(self.root)
                .unwrap_or_else(|| Vector3::repeat(1.0));
            if (scale - current_scale).norm_squared() >= thresholds.scale {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{UnitQuaternion, Vector3};

    use crate::config::{RenderPolicy, RenderThresholds, SyncConfig};
    use crate::context::TickInfo;
    use crate::scene::{NetRef, Pose};
    use crate::snapshot::BodySnapshot;
    use crate::testkit::{Harness, PairSource};

    fn record_at(x: f32) -> BodySnapshot {
        BodySnapshot {
            position: Vector3::new(x, 0.0, 0.0),
            ..BodySnapshot::default()
        }
    }

    #[test]
    fn test_midpoint_interpolation_writes_root() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());

        let source = PairSource::new(record_at(0.0), record_at(10.0), 0.5);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::new(5.0, 0.0, 0.0)
        );
        assert!(body.root_dirty_from_render);
    }

    #[test]
    fn test_snap_teleport_never_blends() {
        // Record A at origin (key 1), teleport to x=10 (key 2, positive).
        // Rendering at alpha 0.5 must show exactly the destination, never
        // the midpoint.
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());

        let mut fr = record_at(0.0);
        fr.teleport_key = 1;
        let mut to = record_at(10.0);
        to.teleport_key = 2;

        let source = PairSource::new(fr, to, 0.5);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::new(10.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_snap_teleport_after_key_rollover_renders_destination_frame() {
        // Once the destination snapshot becomes `from`, the body renders at
        // the teleported position.
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());

        let mut fr = record_at(10.0);
        fr.teleport_key = 2;
        let mut to = record_at(10.0);
        to.teleport_key = 2;

        let source = PairSource::new(fr, to, 0.25);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::new(10.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_moving_teleport_slides_toward_teleport_source() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());

        let mut fr = record_at(0.0);
        fr.teleport_key = 3;
        // Destination snapshot: already at the teleport target x=100, but
        // carrying the pre-teleport simulated pose x=4 for sliding.
        let mut to = record_at(100.0);
        to.teleport_key = -4;
        to.teleport_position = Vector3::new(4.0, 0.0, 0.0);

        let source = PairSource::new(fr, to, 0.5);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::new(2.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_missing_pair_reports_fault() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());

        let source = PairSource::empty();
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        assert_eq!(
            harness.faults.seen,
            vec![crate::context::Fault::MissingInterpolationData]
        );
    }

    #[test]
    fn test_latest_policy_is_noop() {
        let mut harness = Harness::new();
        let config = SyncConfig {
            render_policy: RenderPolicy::Latest,
            ..SyncConfig::default()
        };
        let (mut body, _) = harness.body(config);

        let source = PairSource::new(record_at(0.0), record_at(10.0), 0.5);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::zeros()
        );
        assert!(!body.root_dirty_from_render);
    }

    #[test]
    fn test_reparent_in_bracket_snaps_to_from_pose() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body_with_target(SyncConfig::default());
        let target = body.interpolation_target().unwrap();

        let mount = harness.scene.spawn();
        let mount_ref = NetRef::new(11);
        harness.resolver.register(mount_ref, mount);

        let mut fr = record_at(1.0);
        fr.parent = Some(mount_ref);
        let to = record_at(5.0); // unparented on the other side

        let source = PairSource::new(fr, to, 0.5);
        let mut ctx = harness.ctx();
        // Not in simulation, so the target would normally be used.
        body.render(&mut ctx, TickInfo::proxy().render_only(), &source);

        // Root snapped to from's local pose under the new parent; the
        // interpolation target was recentered, not written.
        assert_eq!(harness.scene.parent_of(body.root()), Some(mount));
        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::new(1.0, 0.0, 0.0)
        );
        assert_eq!(harness.scene.local_pose(target).unwrap(), Pose::identity());
        assert!(body.root_dirty_from_render);
    }

    #[test]
    fn test_unresolvable_parent_aborts_frame() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());

        let mut fr = record_at(1.0);
        fr.parent = Some(NetRef::new(404));
        let mut to = record_at(5.0);
        to.parent = Some(NetRef::new(404));

        let source = PairSource::new(fr, to, 0.5);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::zeros()
        );
        assert_eq!(harness.faults.seen.len(), 1);
    }

    #[test]
    fn test_parented_interpolation_moves_root_in_local_space() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body_with_target(SyncConfig::default());
        let target = body.interpolation_target().unwrap();

        let mount = harness.scene.spawn();
        let mount_ref = NetRef::new(12);
        harness.resolver.register(mount_ref, mount);

        let mut fr = record_at(0.0);
        fr.parent = Some(mount_ref);
        let mut to = record_at(2.0);
        to.parent = Some(mount_ref);

        let source = PairSource::new(fr, to, 0.5);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy().render_only(), &source);

        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::new(1.0, 0.0, 0.0)
        );
        // Target stays untouched while parented.
        assert_eq!(harness.scene.local_pose(target).unwrap(), Pose::identity());
    }

    #[test]
    fn test_target_written_in_world_space_outside_simulation() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body_with_target(SyncConfig::default());
        let target = body.interpolation_target().unwrap();

        let source = PairSource::new(record_at(0.0), record_at(8.0), 0.25);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy().render_only(), &source);

        let world = harness.scene.world_pose(target).unwrap();
        assert_eq!(world.position, Vector3::new(2.0, 0.0, 0.0));
        assert!(body.target_dirty_from_render);
        // Root stays the simulated pose.
        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::zeros()
        );
    }

    #[test]
    fn test_mid_simulation_body_interpolates_root_despite_target() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body_with_target(SyncConfig::default());

        let source = PairSource::new(record_at(0.0), record_at(8.0), 0.25);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::new(2.0, 0.0, 0.0)
        );
        assert!(body.root_dirty_from_render);
    }

    #[test]
    fn test_sleep_thresholds_skip_write_near_rest() {
        let mut harness = Harness::new();
        let config = SyncConfig {
            use_render_sleep_thresholds: true,
            render_thresholds: RenderThresholds {
                use_energy: true,
                position: 0.01,
                rotation: 0.1,
                scale: 0.0,
            },
            ..SyncConfig::default()
        };
        let (mut body, _) = harness.body(config);

        // Rendered pose already sits at rest; snapshots barely move and
        // velocities are zero (below the mock's sleep thresholds).
        harness.scene.set_local_pose(
            body.root(),
            Pose::new(Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::identity()),
        );

        let source = PairSource::new(record_at(1.0), record_at(1.001), 0.5);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        // Write skipped, root left alone and not marked dirty.
        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            Vector3::new(1.0, 0.0, 0.0)
        );
        assert!(!body.root_dirty_from_render);
    }

    #[test]
    fn test_sleep_thresholds_do_not_skip_energetic_body() {
        let mut harness = Harness::new();
        let config = SyncConfig {
            use_render_sleep_thresholds: true,
            render_thresholds: RenderThresholds {
                use_energy: true,
                position: 0.01,
                rotation: 0.1,
                scale: 0.0,
            },
            ..SyncConfig::default()
        };
        let (mut body, _) = harness.body(config);

        harness.scene.set_local_pose(
            body.root(),
            Pose::new(Vector3::new(1.0, 0.0, 0.0), UnitQuaternion::identity()),
        );

        let mut fr = record_at(1.0);
        fr.linear_velocity = Vector3::new(5.0, 0.0, 0.0);
        let source = PairSource::new(fr, record_at(1.001), 0.5);
        let mut ctx = harness.ctx();
        body.render(&mut ctx, TickInfo::proxy(), &source);

        assert!(body.root_dirty_from_render);
    }
}
