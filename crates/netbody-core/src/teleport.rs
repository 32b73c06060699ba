//! Teleports: instantaneous repositioning without interpolation artifacts.
//!
//! A teleport must change the teleport key exactly once so the two
//! snapshots bracketing it always disagree, letting the renderer tell a
//! jump from continuous motion. Moving teleports additionally wait for the
//! current tick's physics step, so the last frame of legitimate simulated
//! displacement is captured as the slide source before the jump lands.

use nalgebra::{UnitQuaternion, Vector3};

use crate::backend::PhysicsBackend;
use crate::body::NetworkedBody;
use crate::context::{SyncContext, TickInfo};
use crate::scene::Pose;
use crate::snapshot::{DeferredTeleport, TELEPORT_KEY_LIMIT};

impl<B: PhysicsBackend> NetworkedBody<B> {
    /// Instantaneous teleport. Applies synchronously and is always legal,
    /// even outside simulation.
    pub fn teleport(
        &mut self,
        ctx: &mut SyncContext<'_, B>,
        position: Option<Vector3<f32>>,
        rotation: Option<UnitQuaternion<f32>>,
    ) {
        self.deferred_teleport = Some(DeferredTeleport {
            position,
            rotation,
            moving: false,
        });
        self.apply_deferred_teleport(ctx);
    }

    /// Motion-preserving teleport. Only meaningful while the entity is in
    /// simulation; defers until after this tick's physics step so the
    /// pre-teleport displacement is still simulated (applies immediately if
    /// the step already ran). Calling again before the deferred teleport
    /// fires replaces the payload.
    pub fn moving_teleport(
        &mut self,
        ctx: &mut SyncContext<'_, B>,
        ticks: TickInfo,
        position: Option<Vector3<f32>>,
        rotation: Option<UnitQuaternion<f32>>,
    ) {
        if !ticks.in_simulation {
            return;
        }

        self.deferred_teleport = Some(DeferredTeleport {
            position,
            rotation,
            moving: true,
        });
        if ctx.stepper.has_simulated_this_tick() {
            self.apply_deferred_teleport(ctx);
        } else {
            ctx.stepper.queue_after_step(self.root);
        }
    }

    /// Dispatch point for the stepper's after-step queue. At most one
    /// pending teleport is ever applied; stale queue entries no-op.
    pub fn flush_deferred_teleport(&mut self, ctx: &mut SyncContext<'_, B>) {
        self.apply_deferred_teleport(ctx);
    }

    fn apply_deferred_teleport(&mut self, ctx: &mut SyncContext<'_, B>) {
        let Some(pending) = self.deferred_teleport.take() else {
            return;
        };
        let Some(mut world) = ctx.scene.world_pose(self.root) else {
            return;
        };

        if pending.moving {
            // Running after the physics step, so this world pose is the
            // simulated result the renderer will slide from.
            self.snapshot.teleport_position = world.position;
            self.snapshot.teleport_rotation = world.rotation;
        }

        if let Some(position) = pending.position {
            world.position = position;
            self.snapshot.position = position;
        }
        if let Some(rotation) = pending.rotation {
            world.rotation = rotation;
            self.snapshot.rotation = rotation;
        }
        ctx.scene.set_world_pose(self.root, world);

        // Push only the requested channels onto the physics body; the other
        // channel keeps the engine's own value.
        if let Some(current) = ctx.backend.capture_pose(self.handle) {
            let pose = Pose::new(
                pending.position.unwrap_or(current.position),
                pending.rotation.unwrap_or(current.rotation),
            );
            ctx.backend.apply_pose(self.handle, &pose);
        }

        self.advance_teleport_key(pending.moving);
        tracing::debug!(
            "[teleport] root={} key={} moving={}",
            self.root.index(),
            self.snapshot.teleport_key,
            pending.moving
        );
    }

    fn advance_teleport_key(&mut self, moving: bool) {
        // Keeps the key well within one byte.
        let mut key = self.snapshot.teleport_key.abs() + 1;
        if key > TELEPORT_KEY_LIMIT {
            key = 1;
        }
        // Positive = instantaneous snap, negative = moving teleport.
        self.snapshot.teleport_key = if moving { -key } else { key };
    }
}

#[cfg(test)]
mod tests {
    use nalgebra::{UnitQuaternion, Vector3};

    use crate::backend::PHYSICS_DT;
    use crate::config::SyncConfig;
    use crate::context::TickInfo;
    use crate::scene::Pose;
    use crate::testkit::Harness;

    #[test]
    fn test_teleport_writes_everything_and_bumps_key() {
        let mut harness = Harness::new();
        let (mut body, handle) = harness.body(SyncConfig::default());

        let destination = Vector3::new(10.0, 0.0, 0.0);
        let mut ctx = harness.ctx();
        body.teleport(&mut ctx, Some(destination), None);

        assert_eq!(
            harness.scene.local_pose(body.root()).unwrap().position,
            destination
        );
        assert_eq!(harness.backend.bodies[handle].pose.position, destination);
        assert_eq!(body.snapshot().position, destination);
        assert_eq!(body.snapshot().teleport_key, 1);

        let mut ctx = harness.ctx();
        body.teleport(&mut ctx, Some(Vector3::new(20.0, 0.0, 0.0)), None);
        assert_eq!(body.snapshot().teleport_key, 2);
    }

    #[test]
    fn test_teleport_rotation_only_leaves_body_position() {
        let mut harness = Harness::new();
        let (mut body, handle) = harness.body(SyncConfig::default());
        harness.backend.bodies[handle].pose.position = Vector3::new(3.0, 0.0, 0.0);

        let spin = UnitQuaternion::from_axis_angle(&Vector3::z_axis(), 1.0);
        let mut ctx = harness.ctx();
        body.teleport(&mut ctx, None, Some(spin));

        let mock = &harness.backend.bodies[handle];
        assert_eq!(mock.pose.position, Vector3::new(3.0, 0.0, 0.0));
        assert!(mock.pose.rotation.angle_to(&spin) < 1.0e-6);
        assert_eq!(body.snapshot().position, Vector3::zeros());
    }

    #[test]
    fn test_moving_teleport_defers_until_after_step() {
        let mut harness = Harness::new();
        let (mut body, handle) = harness.body(SyncConfig::default());

        harness.stepper.begin_tick();
        let destination = Vector3::new(50.0, 0.0, 0.0);
        let mut ctx = harness.ctx();
        body.moving_teleport(&mut ctx, TickInfo::authority(), Some(destination), None);

        // Step has not run: nothing applied yet.
        assert_eq!(body.snapshot().teleport_key, 0);
        assert_eq!(harness.backend.bodies[handle].pose.position, Vector3::zeros());

        // Simulation moves the body, then the queued teleport fires.
        harness.backend.bodies[handle].pose.position = Vector3::new(0.4, 0.0, 0.0);
        harness.scene.set_local_pose(
            body.root(),
            Pose::new(Vector3::new(0.4, 0.0, 0.0), UnitQuaternion::identity()),
        );
        let fired = harness
            .stepper
            .simulate(&mut harness.backend, PHYSICS_DT, false);
        assert_eq!(fired, vec![body.root()]);

        let mut ctx = harness.ctx();
        body.flush_deferred_teleport(&mut ctx);

        assert_eq!(body.snapshot().teleport_key, -1);
        assert_eq!(
            body.snapshot().teleport_position,
            Vector3::new(0.4, 0.0, 0.0)
        );
        assert_eq!(body.snapshot().position, destination);
        assert_eq!(harness.backend.bodies[handle].pose.position, destination);
    }

    #[test]
    fn test_moving_teleport_applies_immediately_after_step() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());

        harness.stepper.begin_tick();
        let fired = harness
            .stepper
            .simulate(&mut harness.backend, PHYSICS_DT, false);
        assert!(fired.is_empty());

        let mut ctx = harness.ctx();
        body.moving_teleport(
            &mut ctx,
            TickInfo::authority(),
            Some(Vector3::new(5.0, 0.0, 0.0)),
            None,
        );
        assert_eq!(body.snapshot().teleport_key, -1);
    }

    #[test]
    fn test_moving_teleport_outside_simulation_is_noop() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());

        let mut ctx = harness.ctx();
        body.moving_teleport(
            &mut ctx,
            TickInfo::proxy().render_only(),
            Some(Vector3::new(5.0, 0.0, 0.0)),
            None,
        );
        assert_eq!(body.snapshot().teleport_key, 0);
        assert_eq!(body.snapshot().position, Vector3::zeros());
    }

    #[test]
    fn test_requeued_teleport_overwrites_payload_not_double_applies() {
        let mut harness = Harness::new();
        let (mut body, handle) = harness.body(SyncConfig::default());

        harness.stepper.begin_tick();
        let mut ctx = harness.ctx();
        body.moving_teleport(
            &mut ctx,
            TickInfo::authority(),
            Some(Vector3::new(1.0, 0.0, 0.0)),
            None,
        );
        let mut ctx = harness.ctx();
        body.moving_teleport(
            &mut ctx,
            TickInfo::authority(),
            Some(Vector3::new(2.0, 0.0, 0.0)),
            None,
        );

        let fired = harness
            .stepper
            .simulate(&mut harness.backend, PHYSICS_DT, false);
        // Queued twice, applied once with the latest payload.
        assert_eq!(fired.len(), 2);
        for _ in fired {
            let mut ctx = harness.ctx();
            body.flush_deferred_teleport(&mut ctx);
        }

        assert_eq!(body.snapshot().teleport_key, -1);
        assert_eq!(
            harness.backend.bodies[handle].pose.position,
            Vector3::new(2.0, 0.0, 0.0)
        );
    }

    #[test]
    fn test_key_cycles_through_thirty_and_keeps_sign() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());

        for expected in 1..=30 {
            let mut ctx = harness.ctx();
            body.teleport(&mut ctx, Some(Vector3::zeros()), None);
            assert_eq!(body.snapshot().teleport_key, expected);
        }

        // Wraps past the limit back to 1.
        let mut ctx = harness.ctx();
        body.teleport(&mut ctx, Some(Vector3::zeros()), None);
        assert_eq!(body.snapshot().teleport_key, 1);
    }

    #[test]
    fn test_moving_teleport_wraps_past_limit_to_negative_one() {
        let mut harness = Harness::new();
        let (mut body, _) = harness.body(SyncConfig::default());
        body.snapshot.teleport_key = 30;

        harness.stepper.begin_tick();
        harness
            .stepper
            .simulate(&mut harness.backend, PHYSICS_DT, false);

        let mut ctx = harness.ctx();
        body.moving_teleport(
            &mut ctx,
            TickInfo::authority(),
            Some(Vector3::new(1.0, 0.0, 0.0)),
            None,
        );
        assert_eq!(body.snapshot().teleport_key, -1);
    }
}
