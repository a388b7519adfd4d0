//! Bee agents: dense column storage and the ambient behavior state machine.

use rand::Rng;
use rand::rngs::SmallRng;
use serde::{Deserialize, Serialize};

use crate::{
    FULL_TURN, Position, SwarmConfig, wrap_coordinate, wrap_signed_angle, wrap_unsigned_angle,
};

/// Discrete behavior mode of a bee.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum BeeState {
    /// Landed on stimulus, motionless.
    #[default]
    Idle,
    /// Walking along stimulus.
    Crawling,
    /// Airborne, steered by the flow field or an override.
    Flying,
    /// Launching; promotes to `Flying` once at flight speed.
    Accelerating,
}

/// Scalar fields for a single bee, used for snapshots and staged write-back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BeeRow {
    pub position: Position,
    pub heading: f32,
    pub speed: f32,
    pub spin: f32,
    pub state: BeeState,
    pub timer: f32,
}

/// Collection of per-bee columns for hot-path iteration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BeeColumns {
    positions: Vec<Position>,
    headings: Vec<f32>,
    speeds: Vec<f32>,
    spins: Vec<f32>,
    states: Vec<BeeState>,
    timers: Vec<f32>,
}

impl BeeColumns {
    /// Spawn the configured population with boundary-biased positions and
    /// random headings.
    #[must_use]
    pub fn spawn(config: &SwarmConfig, rng: &mut SmallRng) -> Self {
        let mut columns = Self {
            positions: Vec::with_capacity(config.population),
            headings: Vec::with_capacity(config.population),
            speeds: Vec::with_capacity(config.population),
            spins: Vec::with_capacity(config.population),
            states: Vec::with_capacity(config.population),
            timers: Vec::with_capacity(config.population),
        };
        for _ in 0..config.population {
            columns.push_spawned(config, rng);
        }
        columns
    }

    /// Replace every bee with a freshly spawned one.
    pub fn respawn(&mut self, config: &SwarmConfig, rng: &mut SmallRng) {
        self.positions.clear();
        self.headings.clear();
        self.speeds.clear();
        self.spins.clear();
        self.states.clear();
        self.timers.clear();
        for _ in 0..config.population {
            self.push_spawned(config, rng);
        }
    }

    fn push_spawned(&mut self, config: &SwarmConfig, rng: &mut SmallRng) {
        let (extent_w, extent_h) = config.extent();
        // Walk the top and left edges of the perimeter so the swarm enters
        // from the frame border rather than materialising mid-scene.
        let along = rng.random_range(0.0..extent_w + extent_h);
        let position = if along < extent_w {
            Position::new(along, 0.0)
        } else {
            Position::new(0.0, along - extent_w)
        };
        self.positions.push(position);
        self.headings.push(rng.random_range(0.0..FULL_TURN));
        self.speeds.push(0.0);
        self.spins.push(0.0);
        self.states.push(BeeState::Idle);
        self.timers.push(0.0);
    }

    /// Number of bees.
    #[must_use]
    pub fn len(&self) -> usize {
        self.positions.len()
    }

    /// Returns true when the population is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Immutable access to the positions column.
    #[must_use]
    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Immutable access to the headings column.
    #[must_use]
    pub fn headings(&self) -> &[f32] {
        &self.headings
    }

    /// Immutable access to the speeds column.
    #[must_use]
    pub fn speeds(&self) -> &[f32] {
        &self.speeds
    }

    /// Immutable access to the spins column.
    #[must_use]
    pub fn spins(&self) -> &[f32] {
        &self.spins
    }

    /// Immutable access to the states column.
    #[must_use]
    pub fn states(&self) -> &[BeeState] {
        &self.states
    }

    /// Immutable access to the timers column.
    #[must_use]
    pub fn timers(&self) -> &[f32] {
        &self.timers
    }

    /// Copy of the scalar fields at `index`.
    #[must_use]
    pub fn row(&self, index: usize) -> BeeRow {
        BeeRow {
            position: self.positions[index],
            heading: self.headings[index],
            speed: self.speeds[index],
            spin: self.spins[index],
            state: self.states[index],
            timer: self.timers[index],
        }
    }

    /// Serial write-back of a full set of per-bee results.
    pub(crate) fn apply(&mut self, rows: &[BeeRow]) {
        debug_assert_eq!(rows.len(), self.len());
        for (idx, row) in rows.iter().enumerate() {
            self.positions[idx] = row.position;
            self.headings[idx] = row.heading;
            self.speeds[idx] = row.speed;
            self.spins[idx] = row.spin;
            self.states[idx] = row.state;
            self.timers[idx] = row.timer;
        }
    }
}

fn sample_timer(config: &SwarmConfig, rng: &mut SmallRng) -> f32 {
    rng.random_range(config.timer_min..=config.timer_max)
}

fn land(bee: &mut BeeRow, config: &SwarmConfig, rng: &mut SmallRng) {
    bee.state = BeeState::Idle;
    bee.timer = sample_timer(config, rng);
    bee.speed = 0.0;
    bee.spin = 0.0;
}

/// Spin for an airborne bee: turn toward the flow heading when one is
/// available, otherwise spin uniformly at random.
fn flow_biased_spin(
    heading: f32,
    flow_heading: Option<f32>,
    spin_max: f32,
    rng: &mut SmallRng,
) -> f32 {
    match flow_heading {
        Some(target) => {
            let gap = wrap_signed_angle(target - heading);
            let magnitude = rng.random_range(0.0..=spin_max);
            if gap < 0.0 { -magnitude } else { magnitude }
        }
        None => rng.random_range(-spin_max..=spin_max),
    }
}

/// One ambient-mode evaluation for a single bee.
///
/// `claimed` is the outcome of the serial claim pass for this bee;
/// `flow_heading` is the flow field's heading at the bee's cell. The result
/// includes the position/heading integration for this tick.
pub(crate) fn ambient_step(
    mut bee: BeeRow,
    claimed: bool,
    flow_heading: Option<f32>,
    config: &SwarmConfig,
    rng: &mut SmallRng,
) -> BeeRow {
    if claimed {
        match bee.state {
            BeeState::Flying | BeeState::Accelerating => land(&mut bee, config, rng),
            BeeState::Crawling if bee.timer < 0.0 => land(&mut bee, config, rng),
            BeeState::Idle if bee.timer < 0.0 => {
                bee.state = BeeState::Crawling;
                bee.timer = sample_timer(config, rng);
                bee.speed = rng.random_range(config.walk_speed_min..=config.walk_speed_max);
                bee.spin = rng.random_range(-config.spin_max..=config.spin_max);
            }
            _ => bee.timer -= config.dt,
        }
    } else {
        match bee.state {
            BeeState::Flying if bee.timer < 0.0 => {
                bee.timer = sample_timer(config, rng);
                bee.speed = rng.random_range(config.flight_speed_min..=config.flight_speed_max);
                bee.spin = flow_biased_spin(bee.heading, flow_heading, config.spin_max, rng);
            }
            BeeState::Flying => bee.timer -= config.dt,
            BeeState::Accelerating => {
                if bee.speed >= config.flight_speed_min {
                    bee.state = BeeState::Flying;
                } else {
                    bee.speed = rng.random_range(config.flight_speed_min..=config.flight_speed_max);
                }
                bee.timer -= config.dt;
            }
            BeeState::Idle | BeeState::Crawling => {
                bee.state = BeeState::Accelerating;
                bee.timer = sample_timer(config, rng);
                bee.speed = rng.random_range(config.flight_speed_min..=config.flight_speed_max);
                bee.spin = flow_biased_spin(bee.heading, flow_heading, config.spin_max, rng);
            }
        }
    }
    integrate(&mut bee, config);
    bee
}

/// Advance position and heading by one timestep, wrapping at the extent.
pub(crate) fn integrate(bee: &mut BeeRow, config: &SwarmConfig) {
    let (extent_w, extent_h) = config.extent();
    let dx = bee.speed * bee.heading.cos() * config.dt;
    let dy = bee.speed * bee.heading.sin() * config.dt;
    bee.position.x = wrap_coordinate(bee.position.x + dx, extent_w, config.bee_radius);
    bee.position.y = wrap_coordinate(bee.position.y + dy, extent_h, config.bee_radius);
    bee.heading = wrap_unsigned_angle(bee.heading + bee.spin * config.dt);
}
