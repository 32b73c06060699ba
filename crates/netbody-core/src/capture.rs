//! State capture: physics engine -> networked record.

use crate::backend::PhysicsBackend;
use crate::body::NetworkedBody;
use crate::context::{SyncContext, TickInfo};

impl<B: PhysicsBackend> NetworkedBody<B> {
    /// Captures the engine/transform state into the networked record.
    ///
    /// `predicted` captures exist only to feed interpolation history on
    /// proxies, so they skip the velocity extras; canonical captures carry
    /// them whenever someone will rewind this body (client prediction, or
    /// an authority whose root doubles as the render transform).
    pub fn capture(&mut self, ctx: &mut SyncContext<'_, B>, ticks: TickInfo, predicted: bool) {
        let flags = ctx.backend.flags(self.handle);

        if flags.is_kinematic() {
            // Physics is not authoritative for kinematic bodies.
            if let Some(pose) = ctx.scene.local_pose(self.root) {
                self.snapshot.position = pose.position;
                self.snapshot.rotation = pose.rotation;
            }
        } else {
            if let Some(pose) = ctx.backend.capture_pose(self.handle) {
                self.snapshot.position = pose.position;
                self.snapshot.rotation = pose.rotation;
            }
            let rewound_authority = self.target.is_none() && ticks.role.is_authority();
            if !predicted && (self.client_prediction || rewound_authority) {
                ctx.backend.capture_extras(self.handle, &mut self.snapshot);
            }
        }

        if self.config.sync_scale {
            if let Some(scale) = ctx.scene.local_scale(self.root) {
                self.snapshot.scale = scale;
            }
        }

        if self.config.sync_parent {
            let parent = ctx.scene.parent_of(self.root);
            self.aoi_override = match parent {
                Some(parent) if self.config.aoi_from_parent => ctx.resolver.reference_of(parent),
                _ => None,
            };
            // Only a parent that is itself a networked entity is a valid
            // mount; plain scene nodes are not recorded.
            self.snapshot.parent = parent.and_then(|p| ctx.resolver.reference_of(p));
        } else {
            self.aoi_override = None;
        }

        if flags.is_sleeping() {
            if let Some(pose) = ctx.scene.local_pose(self.root) {
                self.snapshot.full_precision_position = pose.position;
                self.snapshot.full_precision_rotation = pose.rotation;
            }
        }

        self.snapshot.flags = flags;
        self.snapshot.locks = ctx.backend.locks(self.handle);
    }
}
