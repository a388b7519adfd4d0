//! Core simulation engine for the beeswarm installation.
//!
//! The engine animates a fixed population of bee agents that react to a
//! binary edge mask supplied by the vision pipeline and to gesture commands
//! supplied by the recognizer. Everything else (camera, rendering, audio,
//! inference) lives in collaborator processes; this crate only consumes a
//! mask plus commands once per tick and exposes read-only agent state.

use beeswarm_field::{GridError, GridGeometry};
use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod agent;
pub mod claim;
pub mod flow;
pub mod gesture;
pub mod swarm;
pub mod trace;

pub use agent::{BeeColumns, BeeState};
pub use claim::{ClaimSource, ClaimVariant, PersistentScoreField, StimulusField};
pub use flow::FlowField;
pub use gesture::{BoundingBox, GestureCommand, OverrideMode};
pub use swarm::{StateMix, SwarmController, TickSummary};
pub use trace::TraceCanvas;

pub(crate) const FULL_TURN: f32 = std::f32::consts::TAU;
pub(crate) const HALF_TURN: f32 = std::f32::consts::PI;

/// Wrap an angle into `(-π, π]`.
#[must_use]
pub fn wrap_signed_angle(mut angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    while angle <= -HALF_TURN {
        angle += FULL_TURN;
    }
    while angle > HALF_TURN {
        angle -= FULL_TURN;
    }
    angle
}

/// Wrap an angle into `[0, 2π)`.
#[must_use]
pub fn wrap_unsigned_angle(mut angle: f32) -> f32 {
    if angle.is_nan() {
        return 0.0;
    }
    while angle < 0.0 {
        angle += FULL_TURN;
    }
    while angle >= FULL_TURN {
        angle -= FULL_TURN;
    }
    angle
}

/// Wrap a coordinate into `[0, extent)`.
///
/// A coordinate that leaves the extent re-enters one gutter inside the
/// opposite edge, so a freshly wrapped agent cannot trip the exit test again
/// on the next step. Wildly out-of-range values (upstream miscalculation)
/// fold back into range rather than clamping to a boundary.
#[must_use]
pub fn wrap_coordinate(value: f32, extent: f32, gutter: f32) -> f32 {
    debug_assert!(extent > 0.0);
    if (0.0..extent).contains(&value) {
        return value;
    }
    let wrapped = if value < 0.0 {
        extent - gutter - (-value).rem_euclid(extent)
    } else {
        gutter + (value - extent).rem_euclid(extent)
    };
    wrapped.rem_euclid(extent)
}

/// Simulation clock: ticks processed since construction or the last reset.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Tick(pub u64);

impl Tick {
    /// Returns the next sequential tick.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }

    /// Resets the tick counter back to zero.
    #[must_use]
    pub const fn zero() -> Self {
        Self(0)
    }
}

/// Continuous 2D position in simulation space.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
}

impl Position {
    /// Construct a new position.
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Errors that can occur when constructing a swarm.
#[derive(Debug, Error)]
pub enum SwarmError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Indicates invalid grid parameters.
    #[error(transparent)]
    Grid(#[from] GridError),
}

/// Static configuration for a bee swarm.
///
/// Defaults carry the installation's production constants; hosts override
/// individual fields with struct update syntax.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SwarmConfig {
    /// Width of the simulation extent in world units.
    pub extent_width: u32,
    /// Height of the simulation extent in world units.
    pub extent_height: u32,
    /// Size of one stimulus cell in world units (must evenly divide the extent).
    pub stimulus_cell_size: u32,
    /// Number of bees spawned at construction.
    pub population: usize,
    /// Bee body radius; doubles as the wrap gutter.
    pub bee_radius: f32,
    /// Simulation timestep in seconds.
    pub dt: f32,
    /// Lower bound for resampled state timers, in seconds.
    pub timer_min: f32,
    /// Upper bound for resampled state timers, in seconds.
    pub timer_max: f32,
    /// Crawl speed range in world units per second.
    pub walk_speed_min: f32,
    pub walk_speed_max: f32,
    /// Flight speed range in world units per second.
    pub flight_speed_min: f32,
    pub flight_speed_max: f32,
    /// Maximum angular velocity in radians per second.
    pub spin_max: f32,
    /// Hard cap applied to the per-tick claim capacity.
    pub capacity_max: u32,
    /// Gesture commands below this confidence are ignored.
    pub min_confidence: f32,
    /// Per-tick multiplier applied to the trace canvas.
    pub trace_decay: f32,
    /// Canvas value above which a cell counts as drawn.
    pub trace_threshold: f32,
    /// Radius of the attract kernel, in stimulus cells.
    pub trace_kernel_radius: u32,
    /// Fraction of the angular gap closed when a flying bee samples the trace force.
    pub trace_blend: f32,
    /// Per-tick speed multiplier for bees following a trace.
    pub trace_speed_decay: f32,
    /// Sliding-window length K for the persistent-score variant.
    pub window_frames: usize,
    /// Fraction of K a cell's score must exceed to hold a claimant.
    pub window_avg_fraction: f32,
    /// Which claim source backs the stimulus grid.
    pub claim_variant: ClaimVariant,
    /// Optional RNG seed for reproducible runs.
    pub rng_seed: Option<u64>,
    /// Maximum number of recent tick summaries retained in-memory.
    pub history_capacity: usize,
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            extent_width: 1920,
            extent_height: 1080,
            stimulus_cell_size: 24,
            population: 8_000,
            bee_radius: 8.0,
            dt: 1.0 / 60.0,
            timer_min: 0.2,
            timer_max: 0.8,
            walk_speed_min: 8.0,
            walk_speed_max: 24.0,
            flight_speed_min: 120.0,
            flight_speed_max: 180.0,
            spin_max: HALF_TURN,
            capacity_max: 255,
            min_confidence: 0.1,
            trace_decay: 0.99,
            trace_threshold: 0.65,
            trace_kernel_radius: 6,
            trace_blend: 0.35,
            trace_speed_decay: 0.92,
            window_frames: 15,
            window_avg_fraction: 0.2,
            claim_variant: ClaimVariant::Instantaneous,
            rng_seed: None,
            history_capacity: 256,
        }
    }
}

impl SwarmConfig {
    /// Validates the configuration, returning the derived stimulus grid geometry.
    pub fn stimulus_geometry(&self) -> Result<GridGeometry, SwarmError> {
        let geometry =
            GridGeometry::from_extent(self.extent_width, self.extent_height, self.stimulus_cell_size)?;
        if self.population == 0 {
            return Err(SwarmError::InvalidConfig("population must be non-zero"));
        }
        if self.dt <= 0.0 {
            return Err(SwarmError::InvalidConfig("dt must be positive"));
        }
        let half_extent = (self.extent_width.min(self.extent_height) as f32) * 0.5;
        if self.bee_radius < 0.0 || self.bee_radius >= half_extent {
            return Err(SwarmError::InvalidConfig(
                "bee_radius must be non-negative and smaller than half the extent",
            ));
        }
        if self.timer_min <= 0.0 || self.timer_min > self.timer_max {
            return Err(SwarmError::InvalidConfig(
                "timer range must be positive and ordered",
            ));
        }
        if self.walk_speed_min < 0.0 || self.walk_speed_min > self.walk_speed_max {
            return Err(SwarmError::InvalidConfig(
                "walk speed range must be non-negative and ordered",
            ));
        }
        if self.flight_speed_min <= 0.0 || self.flight_speed_min > self.flight_speed_max {
            return Err(SwarmError::InvalidConfig(
                "flight speed range must be positive and ordered",
            ));
        }
        if self.spin_max <= 0.0 {
            return Err(SwarmError::InvalidConfig("spin_max must be positive"));
        }
        if self.capacity_max == 0 {
            return Err(SwarmError::InvalidConfig("capacity_max must be non-zero"));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(SwarmError::InvalidConfig(
                "min_confidence must be within [0, 1]",
            ));
        }
        if !(0.0..1.0).contains(&self.trace_decay)
            || !(0.0..1.0).contains(&self.trace_threshold)
            || !(0.0..=1.0).contains(&self.trace_blend)
            || !(0.0..=1.0).contains(&self.trace_speed_decay)
            || self.trace_blend == 0.0
            || self.trace_speed_decay == 0.0
        {
            return Err(SwarmError::InvalidConfig(
                "trace decay/threshold/blend parameters must lie in (0, 1)",
            ));
        }
        if self.trace_kernel_radius == 0 {
            return Err(SwarmError::InvalidConfig(
                "trace_kernel_radius must be non-zero",
            ));
        }
        if self.window_frames == 0 {
            return Err(SwarmError::InvalidConfig("window_frames must be non-zero"));
        }
        if !(0.0..1.0).contains(&self.window_avg_fraction) {
            return Err(SwarmError::InvalidConfig(
                "window_avg_fraction must be within [0, 1)",
            ));
        }
        if self.history_capacity == 0 {
            return Err(SwarmError::InvalidConfig(
                "history_capacity must be non-zero",
            ));
        }
        Ok(geometry)
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }

    /// Simulation extent as floats.
    #[must_use]
    pub fn extent(&self) -> (f32, f32) {
        (self.extent_width as f32, self.extent_height as f32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        let geometry = SwarmConfig::default().stimulus_geometry().expect("geometry");
        assert_eq!(geometry.cols(), 80);
        assert_eq!(geometry.rows(), 45);
    }

    #[test]
    fn config_rejects_bad_ranges() {
        let bad_timer = SwarmConfig {
            timer_min: 0.9,
            timer_max: 0.2,
            ..SwarmConfig::default()
        };
        assert!(bad_timer.stimulus_geometry().is_err());

        let bad_cell = SwarmConfig {
            stimulus_cell_size: 17,
            ..SwarmConfig::default()
        };
        assert!(bad_cell.stimulus_geometry().is_err());

        let bad_flight = SwarmConfig {
            flight_speed_min: 0.0,
            ..SwarmConfig::default()
        };
        assert!(bad_flight.stimulus_geometry().is_err());

        let bad_window = SwarmConfig {
            window_avg_fraction: 1.0,
            ..SwarmConfig::default()
        };
        assert!(bad_window.stimulus_geometry().is_err());
    }

    #[test]
    fn signed_wrap_covers_turns() {
        // 3π folds back to the half-turn boundary
        assert!((wrap_signed_angle(3.0 * HALF_TURN).abs() - HALF_TURN).abs() < 1e-4);
        assert_eq!(wrap_signed_angle(f32::NAN), 0.0);
        assert!((wrap_signed_angle(0.25) - 0.25).abs() < 1e-6);
        let wrapped = wrap_signed_angle(-5.0 * HALF_TURN);
        assert!(wrapped > -HALF_TURN - 1e-5 && wrapped <= HALF_TURN + 1e-5);
    }

    #[test]
    fn unsigned_wrap_stays_in_turn() {
        for angle in [-7.3_f32, -0.1, 0.0, 1.0, 6.3, 42.0] {
            let wrapped = wrap_unsigned_angle(angle);
            assert!((0.0..FULL_TURN).contains(&wrapped), "angle {angle} -> {wrapped}");
        }
    }

    #[test]
    fn coordinate_wrap_reenters_with_gutter() {
        let extent = 100.0;
        let gutter = 4.0;
        assert_eq!(wrap_coordinate(50.0, extent, gutter), 50.0);
        let left_exit = wrap_coordinate(-0.5, extent, gutter);
        assert!((left_exit - 95.5).abs() < 1e-4);
        let right_exit = wrap_coordinate(100.25, extent, gutter);
        assert!((right_exit - 4.25).abs() < 1e-4);
        // wildly out-of-range values still land inside the extent
        let wild = wrap_coordinate(-731.0, extent, gutter);
        assert!((0.0..extent).contains(&wild));
        let wild = wrap_coordinate(2_431.0, extent, gutter);
        assert!((0.0..extent).contains(&wild));
    }
}
