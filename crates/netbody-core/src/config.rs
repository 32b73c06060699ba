//! Per-entity synchronization configuration.
//!
//! Configuration problems are setup-time errors; nothing here is checked
//! again on the hot tick/render paths.

use serde::{Deserialize, Serialize};

/// How the entity should be presented between ticks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RenderPolicy {
    /// Blend between the two snapshots bracketing the render time.
    #[default]
    Interpolated,
    /// Show the latest simulated state; the renderer is a no-op.
    Latest,
}

/// Deltas below which render writes are skipped so a resting body can sleep.
///
/// `position` and `scale` compare squared magnitudes, `rotation` compares the
/// angle in radians. A zero disables that particular test.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RenderThresholds {
    /// Also require the `from` snapshot's velocities to be below the
    /// backend's sleep thresholds.
    pub use_energy: bool,
    pub position: f32,
    pub rotation: f32,
    pub scale: f32,
}

impl Default for RenderThresholds {
    fn default() -> Self {
        Self {
            use_energy: true,
            position: 1.0e-4,
            rotation: 0.01,
            scale: 1.0e-4,
        }
    }
}

/// Configuration for one networked body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Record and restore the direct parent when it is a networked entity.
    pub sync_parent: bool,
    /// Record and restore local scale.
    pub sync_scale: bool,
    /// Derive the area-of-interest override from the parent entity.
    pub aoi_from_parent: bool,
    /// Master switch; dedicated servers typically disable interpolation.
    pub interpolation: bool,
    pub render_policy: RenderPolicy,
    /// Enable the render sleep-threshold guard when interpolating the root
    /// transform directly.
    pub use_render_sleep_thresholds: bool,
    pub render_thresholds: RenderThresholds,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            sync_parent: true,
            sync_scale: false,
            aoi_from_parent: true,
            interpolation: true,
            render_policy: RenderPolicy::default(),
            use_render_sleep_thresholds: false,
            render_thresholds: RenderThresholds::default(),
        }
    }
}

impl SyncConfig {
    /// Validates the configuration. Called once at body construction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let t = &self.render_thresholds;
        for (field, value) in [
            ("position", t.position),
            ("rotation", t.rotation),
            ("scale", t.scale),
        ] {
            if value < 0.0 {
                return Err(ConfigError::NegativeThreshold { field, value });
            }
        }
        Ok(())
    }
}

/// Setup-time configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("render threshold `{field}` must be non-negative, got {value}")]
    NegativeThreshold { field: &'static str, value: f32 },
    #[error("physics stepper has no simulate stages selected and would never step")]
    NoSimulateStages,
}
