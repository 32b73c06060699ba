//! Test doubles for exercising the sync engine without a physics engine.

use nalgebra::Vector3;

use crate::backend::PhysicsBackend;
use crate::body::NetworkedBody;
use crate::config::SyncConfig;
use crate::context::{Fault, FaultReporter, MapResolver, SnapshotSource, SyncContext};
use crate::scene::{Pose, Scene};
use crate::snapshot::{BodySnapshot, BodyFlags, SnapshotPair};
use crate::stepper::{PhysicsStepper, SimulateStages};

/// Velocity magnitude below which a mock body counts as sleep-eligible.
const MOCK_SLEEP_THRESHOLD_SQ: f32 = 1.0e-2;

/// Recorded state of one mock rigidbody, with write counters the tests
/// assert on.
#[derive(Debug, Clone)]
pub struct MockBody {
    pub pose: Pose,
    pub linear_velocity: Vector3<f32>,
    pub angular_velocity: Vector3<f32>,
    pub kinematic: bool,
    pub sleeping: bool,
    pub locks: u8,
    /// What `below_sleep_thresholds` reports for this body.
    pub below_thresholds: bool,
    pub pose_writes: u32,
    pub extras_writes: u32,
    pub wake_calls: u32,
    pub sleep_calls: u32,
}

impl MockBody {
    fn new() -> Self {
        Self {
            pose: Pose::identity(),
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            kinematic: false,
            sleeping: false,
            locks: 0,
            below_thresholds: true,
            pose_writes: 0,
            extras_writes: 0,
            wake_calls: 0,
            sleep_calls: 0,
        }
    }
}

/// In-memory physics backend; a step only counts invocations.
#[derive(Debug, Default)]
pub struct MockBackend {
    pub bodies: Vec<MockBody>,
    pub steps: u32,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_body(&mut self) -> usize {
        self.bodies.push(MockBody::new());
        self.bodies.len() - 1
    }
}

impl PhysicsBackend for MockBackend {
    type Handle = usize;

    fn capture_pose(&self, body: usize) -> Option<Pose> {
        self.bodies.get(body).map(|b| b.pose)
    }

    fn apply_pose(&mut self, body: usize, pose: &Pose) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.pose = *pose;
            b.pose_writes += 1;
        }
    }

    fn capture_extras(&self, body: usize, snapshot: &mut BodySnapshot) {
        if let Some(b) = self.bodies.get(body) {
            snapshot.linear_velocity = b.linear_velocity;
            snapshot.angular_velocity = b.angular_velocity;
        }
    }

    fn apply_extras(&mut self, body: usize, snapshot: &BodySnapshot) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.linear_velocity = snapshot.linear_velocity;
            b.angular_velocity = snapshot.angular_velocity;
            b.extras_writes += 1;
        }
    }

    fn flags(&self, body: usize) -> BodyFlags {
        let mut flags = BodyFlags::empty();
        if let Some(b) = self.bodies.get(body) {
            flags.set(BodyFlags::KINEMATIC, b.kinematic);
            flags.set(BodyFlags::SLEEPING, b.sleeping);
        }
        flags
    }

    fn is_kinematic(&self, body: usize) -> bool {
        self.bodies.get(body).is_some_and(|b| b.kinematic)
    }

    fn set_kinematic(&mut self, body: usize, kinematic: bool) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.kinematic = kinematic;
        }
    }

    fn locks(&self, body: usize) -> u8 {
        self.bodies.get(body).map_or(0, |b| b.locks)
    }

    fn set_locks(&mut self, body: usize, locks: u8) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.locks = locks;
        }
    }

    fn is_sleeping(&self, body: usize) -> bool {
        self.bodies.get(body).is_some_and(|b| b.sleeping)
    }

    fn force_sleep(&mut self, body: usize) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.sleeping = true;
            b.linear_velocity = Vector3::zeros();
            b.angular_velocity = Vector3::zeros();
            b.sleep_calls += 1;
        }
    }

    fn force_wake(&mut self, body: usize) {
        if let Some(b) = self.bodies.get_mut(body) {
            b.sleeping = false;
            b.wake_calls += 1;
        }
    }

    fn below_sleep_thresholds(&self, body: usize) -> bool {
        self.bodies.get(body).is_some_and(|b| b.below_thresholds)
    }

    fn state_below_sleep_thresholds(&self, snapshot: &BodySnapshot) -> bool {
        snapshot.linear_velocity.norm_squared() < MOCK_SLEEP_THRESHOLD_SQ
            && snapshot.angular_velocity.norm_squared() < MOCK_SLEEP_THRESHOLD_SQ
    }

    fn step(&mut self, _dt: f32) {
        self.steps += 1;
    }
}

/// Fault reporter that records everything it sees.
#[derive(Debug, Default)]
pub struct RecordingFaults {
    pub seen: Vec<Fault>,
}

impl FaultReporter for RecordingFaults {
    fn report(&mut self, fault: Fault) {
        self.seen.push(fault);
    }
}

/// Fixed snapshot pair for render tests.
pub struct PairSource {
    pair: Option<(BodySnapshot, BodySnapshot, f32)>,
}

impl PairSource {
    pub fn new(from: BodySnapshot, to: BodySnapshot, alpha: f32) -> Self {
        Self {
            pair: Some((from, to, alpha)),
        }
    }

    pub fn empty() -> Self {
        Self { pair: None }
    }
}

impl SnapshotSource for PairSource {
    fn snapshot_pair(&self) -> Option<SnapshotPair<'_>> {
        self.pair.as_ref().map(|(from, to, alpha)| SnapshotPair {
            from,
            to,
            alpha: *alpha,
        })
    }
}

/// Everything a sync-engine test needs, wired together.
pub struct Harness {
    pub backend: MockBackend,
    pub scene: Scene,
    pub resolver: MapResolver,
    pub faults: RecordingFaults,
    pub stepper: PhysicsStepper,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            backend: MockBackend::new(),
            scene: Scene::new(),
            resolver: MapResolver::new(),
            faults: RecordingFaults::default(),
            stepper: PhysicsStepper::new(SimulateStages::forward_and_resims())
                .expect("stages are non-empty"),
        }
    }

    /// Spawns a root node plus mock body and wraps them in a
    /// [`NetworkedBody`].
    pub fn body(&mut self, config: SyncConfig) -> (NetworkedBody<MockBackend>, usize) {
        let root = self.scene.spawn();
        let handle = self.backend.add_body();
        let body = NetworkedBody::new(root, handle, config).expect("valid test config");
        (body, handle)
    }

    /// Same, with an interpolation target attached.
    pub fn body_with_target(&mut self, config: SyncConfig) -> (NetworkedBody<MockBackend>, usize) {
        let root = self.scene.spawn();
        let handle = self.backend.add_body();
        let body = NetworkedBody::new(root, handle, config)
            .expect("valid test config")
            .with_interpolation_target(&mut self.scene);
        (body, handle)
    }

    pub fn ctx(&mut self) -> SyncContext<'_, MockBackend> {
        SyncContext {
            backend: &mut self.backend,
            scene: &mut self.scene,
            resolver: &self.resolver,
            faults: &mut self.faults,
            stepper: &mut self.stepper,
        }
    }
}
