//! Drives the physics step inside the tick and owns the step-boundary
//! callback queue.
//!
//! Deferred teleports are the only cross-phase handoff in this crate: a
//! one-shot FIFO keyed to the after-step boundary, drained exactly once per
//! step. This is deliberately not an event bus.

use crate::backend::PhysicsBackend;
use crate::config::ConfigError;
use crate::scene::EntityId;

/// Which passes the stepper simulates physics in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimulateStages(u8);

impl SimulateStages {
    /// Simulate on forward (non-resimulation) ticks. Required for client
    /// prediction.
    pub const FORWARD: SimulateStages = SimulateStages(1);
    /// Also simulate during rollback resimulation ticks.
    pub const RESIMULATIONS: SimulateStages = SimulateStages(1 << 1);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub fn forward_and_resims() -> Self {
        Self::FORWARD | Self::RESIMULATIONS
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }
}

impl std::ops::BitOr for SimulateStages {
    type Output = SimulateStages;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// Steps one physics backend per simulation tick.
#[derive(Debug)]
pub struct PhysicsStepper {
    stages: SimulateStages,
    dt_multiplier: f32,
    has_simulated_this_tick: bool,
    after_step: Vec<EntityId>,
}

impl PhysicsStepper {
    /// Fails when no stage is selected: such a stepper would never simulate,
    /// which is a configuration error, not a runtime condition.
    pub fn new(stages: SimulateStages) -> Result<Self, ConfigError> {
        if stages == SimulateStages::empty() {
            return Err(ConfigError::NoSimulateStages);
        }
        Ok(Self {
            stages,
            dt_multiplier: 1.0,
            has_simulated_this_tick: false,
            after_step: Vec::new(),
        })
    }

    /// Scales the simulated delta-time (slow motion / time compression).
    /// Values <= 0 suspend simulation entirely.
    #[must_use]
    pub fn with_dt_multiplier(mut self, multiplier: f32) -> Self {
        self.dt_multiplier = multiplier;
        self
    }

    pub fn stages(&self) -> SimulateStages {
        self.stages
    }

    /// True once [`Self::simulate`] has run for the current tick.
    pub fn has_simulated_this_tick(&self) -> bool {
        self.has_simulated_this_tick
    }

    /// Called by the scheduler at the start of every tick.
    pub fn begin_tick(&mut self) {
        self.has_simulated_this_tick = false;
    }

    /// Queues a one-shot callback for the entity, fired after the next step
    /// that actually runs.
    pub fn queue_after_step(&mut self, body: EntityId) {
        self.after_step.push(body);
    }

    /// Steps the backend if this pass is enabled, returning the drained
    /// after-step queue (in FIFO order) for the caller to dispatch. An empty
    /// vec means the step was skipped or nothing was queued; the queue is
    /// only drained when a step ran.
    pub fn simulate<B: PhysicsBackend>(
        &mut self,
        backend: &mut B,
        dt: f32,
        resimulation: bool,
    ) -> Vec<EntityId> {
        if self.dt_multiplier <= 0.0 {
            return Vec::new();
        }
        let stage = if resimulation {
            SimulateStages::RESIMULATIONS
        } else {
            SimulateStages::FORWARD
        };
        if !self.stages.contains(stage) {
            return Vec::new();
        }

        backend.step(dt * self.dt_multiplier);
        self.has_simulated_this_tick = true;
        std::mem::take(&mut self.after_step)
    }
}
