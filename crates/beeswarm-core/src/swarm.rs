//! Swarm controller: owns the bee columns and both fields, and runs the
//! per-tick pipeline.
//!
//! Each tick is a fixed sequence of stages. Claims are resolved by a serial
//! pass in ascending bee-index order; the behavior/integration phase then
//! runs data-parallel over the population with per-bee derived RNGs and
//! writes back serially, so a seeded run is reproducible regardless of how
//! the pool partitions the work. The flow field is rebuilt strictly after
//! the claim results are final and is read by the next tick's bees.

use std::collections::VecDeque;
use std::fmt;

use beeswarm_field::{EdgeMask, GridGeometry};
use rand::{Rng, SeedableRng, rngs::SmallRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::agent::{self, BeeColumns, BeeRow, BeeState};
use crate::claim::{ClaimSource, ClaimVariant, PersistentScoreField, StimulusField};
use crate::flow::FlowField;
use crate::gesture::{self, BoundingBox, GestureCommand, OverrideMode};
use crate::trace::TraceCanvas;
use crate::{SwarmConfig, SwarmError, Tick, wrap_signed_angle, wrap_unsigned_angle};

/// Fractions of the population in each behavior state; the audio collaborator
/// mixes its layers from these.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq)]
pub struct StateMix {
    pub idle: f32,
    pub crawling: f32,
    pub flying: f32,
    pub accelerating: f32,
}

/// Summary emitted after each tick and retained in a bounded history.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TickSummary {
    pub tick: Tick,
    pub population: usize,
    pub mix: StateMix,
    pub capacity: u32,
    pub active_edge_cells: u32,
    pub claimed: u32,
    pub override_active: bool,
}

/// The simulation: bee columns, claim source, flow field, and trace canvas,
/// advanced one tick at a time by the host frame loop.
pub struct SwarmController {
    config: SwarmConfig,
    geometry: GridGeometry,
    bees: BeeColumns,
    claim_source: Box<dyn ClaimSource>,
    density: Vec<u32>,
    flow: FlowField,
    trace: TraceCanvas,
    claimed_scratch: Vec<bool>,
    rng: SmallRng,
    tick: Tick,
    history: VecDeque<TickSummary>,
}

impl fmt::Debug for SwarmController {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SwarmController")
            .field("config", &self.config)
            .field("tick", &self.tick)
            .field("population", &self.bees.len())
            .finish()
    }
}

impl SwarmController {
    /// Instantiate a new swarm from the supplied configuration.
    pub fn new(config: SwarmConfig) -> Result<Self, SwarmError> {
        let geometry = config.stimulus_geometry()?;
        let mut rng = config.seeded_rng();
        let bees = BeeColumns::spawn(&config, &mut rng);
        let claim_source: Box<dyn ClaimSource> = match config.claim_variant {
            ClaimVariant::Instantaneous => {
                Box::new(StimulusField::new(&geometry, config.capacity_max)?)
            }
            ClaimVariant::Persistent => Box::new(PersistentScoreField::new(
                &geometry,
                config.window_frames,
                config.window_avg_fraction,
            )),
        };
        let density = vec![0; geometry.len()];
        let flow = FlowField::new(geometry);
        let trace = TraceCanvas::new(
            geometry,
            config.trace_decay,
            config.trace_threshold,
            config.trace_kernel_radius,
        )?;
        let claimed_scratch = vec![false; config.population];
        let history = VecDeque::with_capacity(config.history_capacity);
        Ok(Self {
            geometry,
            bees,
            claim_source,
            density,
            flow,
            trace,
            claimed_scratch,
            rng,
            tick: Tick::zero(),
            history,
            config,
        })
    }

    /// Execute one simulation tick, returning its summary.
    pub fn step(&mut self, mask: &EdgeMask<'_>, commands: &[GestureCommand]) -> TickSummary {
        let active_cells = mask.accumulate_density(&self.geometry, &mut self.density);
        let mask_cells = mask.width() * mask.height();
        self.claim_source
            .begin_tick(&self.density, mask_cells, active_cells, self.config.population);
        self.trace.fade();

        let mode = gesture::resolve_override(commands, self.config.min_confidence);
        let claimed = match mode {
            None => {
                self.trace.end_trace();
                self.stage_ambient_claims(mask)
            }
            Some(OverrideMode::Converge(_)) => {
                self.trace.end_trace();
                self.claim_source.clear();
                self.claimed_scratch.fill(false);
                0
            }
            Some(OverrideMode::Trace(bounding_box)) => {
                let (x, y) = bounding_box.center();
                self.trace.draw(x, y);
                let claimed = self.stage_trace_claims();
                let source = &self.claim_source;
                self.trace.rebuild_force(|cell| source.claims(cell));
                claimed
            }
        };

        match mode {
            None => self.stage_ambient_update(),
            Some(OverrideMode::Converge(bounding_box)) => {
                self.stage_converge_update(&bounding_box);
            }
            Some(OverrideMode::Trace(_)) => self.stage_trace_update(),
        }

        self.stage_flow(active_cells);
        self.tick = self.tick.next();
        self.stage_summary(active_cells, claimed, mode.is_some())
    }

    /// Reinitialize the population and clear both fields, the trace canvas,
    /// and the summary history.
    pub fn reset(&mut self) {
        debug!("resetting swarm population and fields");
        self.bees.respawn(&self.config, &mut self.rng);
        self.claim_source.reset();
        self.density.fill(0);
        self.flow.clear();
        self.trace.reset();
        self.claimed_scratch.fill(false);
        self.history.clear();
        self.tick = Tick::zero();
    }

    /// Serial claim pass for the ambient path, in ascending bee-index order.
    fn stage_ambient_claims(&mut self, mask: &EdgeMask<'_>) -> u32 {
        let (extent_w, extent_h) = self.config.extent();
        let mut claimed_count = 0;
        for idx in 0..self.bees.len() {
            let position = self.bees.positions()[idx];
            let on_stimulus = mask.sample(position.x, position.y, extent_w, extent_h);
            let claimed = self
                .geometry
                .cell_of(position.x, position.y)
                .is_some_and(|cell| self.claim_source.try_claim(cell, idx, on_stimulus));
            self.claimed_scratch[idx] = claimed;
            claimed_count += u32::from(claimed);
        }
        claimed_count
    }

    /// Serial claim pass for the trace override: drawn canvas cells stand in
    /// for edge stimulus.
    fn stage_trace_claims(&mut self) -> u32 {
        let mut claimed_count = 0;
        for idx in 0..self.bees.len() {
            let position = self.bees.positions()[idx];
            let claimed = self
                .geometry
                .cell_of(position.x, position.y)
                .is_some_and(|cell| {
                    self.trace.is_drawn(cell) && self.claim_source.try_claim(cell, idx, true)
                });
            self.claimed_scratch[idx] = claimed;
            claimed_count += u32::from(claimed);
        }
        claimed_count
    }

    /// Ambient behavior phase: parallel evaluation, serial write-back.
    fn stage_ambient_update(&mut self) {
        let tick_seed: u64 = self.rng.random();
        let config = &self.config;
        let geometry = self.geometry;
        let bees = &self.bees;
        let flow = &self.flow;
        let claimed = &self.claimed_scratch;
        let rows: Vec<BeeRow> = (0..bees.len())
            .into_par_iter()
            .map(|idx| {
                let mut rng = SmallRng::seed_from_u64(agent_seed(tick_seed, idx));
                let bee = bees.row(idx);
                let flow_heading = geometry
                    .cell_of(bee.position.x, bee.position.y)
                    .map(|cell| flow.heading_at(cell));
                agent::ambient_step(bee, claimed[idx], flow_heading, config, &mut rng)
            })
            .collect();
        self.bees.apply(&rows);
    }

    /// Converge override: the whole swarm flies toward the gesture center.
    fn stage_converge_update(&mut self, bounding_box: &BoundingBox) {
        let tick_seed: u64 = self.rng.random();
        let config = &self.config;
        let bees = &self.bees;
        let (center_x, center_y) = bounding_box.center();
        let orbit_radius = bounding_box.half_width();
        let rows: Vec<BeeRow> = (0..bees.len())
            .into_par_iter()
            .map(|idx| {
                let mut rng = SmallRng::seed_from_u64(agent_seed(tick_seed, idx));
                let mut bee = bees.row(idx);
                bee.state = BeeState::Flying;
                let dx = center_x - bee.position.x;
                let dy = center_y - bee.position.y;
                if dx * dx + dy * dy > orbit_radius * orbit_radius {
                    bee.speed =
                        rng.random_range(config.flight_speed_min..=config.flight_speed_max);
                    let desired = dy.atan2(dx);
                    let gap = wrap_signed_angle(desired - bee.heading);
                    let jitter =
                        rng.random_range(-0.25 * config.spin_max..=0.25 * config.spin_max);
                    bee.spin = (gap + jitter).clamp(-config.spin_max, config.spin_max);
                } else {
                    bee.speed = config.flight_speed_max;
                    bee.spin = rng.random_range(-0.25 * config.spin_max..=0.25 * config.spin_max);
                }
                agent::integrate(&mut bee, config);
                bee
            })
            .collect();
        self.bees.apply(&rows);
    }

    /// Trace override: claimed bees land as usual, flying bees follow the
    /// canvas force field, everyone else launches.
    fn stage_trace_update(&mut self) {
        let tick_seed: u64 = self.rng.random();
        let config = &self.config;
        let geometry = self.geometry;
        let bees = &self.bees;
        let flow = &self.flow;
        let trace = &self.trace;
        let claimed = &self.claimed_scratch;
        let rows: Vec<BeeRow> = (0..bees.len())
            .into_par_iter()
            .map(|idx| {
                let mut rng = SmallRng::seed_from_u64(agent_seed(tick_seed, idx));
                let mut bee = bees.row(idx);
                if claimed[idx] {
                    return agent::ambient_step(bee, true, None, config, &mut rng);
                }
                let cell = geometry.cell_of(bee.position.x, bee.position.y);
                if bee.state == BeeState::Flying
                    && let Some(cell) = cell
                {
                    let (force_x, force_y) = trace.force_at(cell);
                    if force_x * force_x + force_y * force_y > f32::EPSILON {
                        let target = force_y.atan2(force_x);
                        let gap = wrap_signed_angle(target - bee.heading);
                        bee.heading = wrap_unsigned_angle(bee.heading + gap * config.trace_blend);
                        bee.speed *= config.trace_speed_decay;
                        agent::integrate(&mut bee, config);
                        return bee;
                    }
                }
                let flow_heading = cell.map(|c| flow.heading_at(c));
                agent::ambient_step(bee, false, flow_heading, config, &mut rng)
            })
            .collect();
        self.bees.apply(&rows);
    }

    /// Rebuild the flow field from this tick's claim results.
    fn stage_flow(&mut self, active_cells: u32) {
        let source = &self.claim_source;
        self.flow.rebuild(
            &self.density,
            active_cells,
            self.config.population,
            |cell| source.claims(cell),
        );
    }

    /// Aggregate per-state fractions and append the bounded history entry.
    fn stage_summary(
        &mut self,
        active_cells: u32,
        claimed: u32,
        override_active: bool,
    ) -> TickSummary {
        let mut idle = 0_usize;
        let mut crawling = 0_usize;
        let mut flying = 0_usize;
        let mut accelerating = 0_usize;
        for state in self.bees.states() {
            match state {
                BeeState::Idle => idle += 1,
                BeeState::Crawling => crawling += 1,
                BeeState::Flying => flying += 1,
                BeeState::Accelerating => accelerating += 1,
            }
        }
        let population = self.bees.len();
        let scale = 1.0 / population.max(1) as f32;
        let summary = TickSummary {
            tick: self.tick,
            population,
            mix: StateMix {
                idle: idle as f32 * scale,
                crawling: crawling as f32 * scale,
                flying: flying as f32 * scale,
                accelerating: accelerating as f32 * scale,
            },
            capacity: self.claim_source.capacity(),
            active_edge_cells: active_cells,
            claimed,
            override_active,
        };
        if self.history.len() >= self.config.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(summary.clone());
        summary
    }

    /// Returns an immutable reference to configuration.
    #[must_use]
    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    /// Current simulation tick.
    #[must_use]
    pub const fn tick(&self) -> Tick {
        self.tick
    }

    /// Number of bees.
    #[must_use]
    pub fn population(&self) -> usize {
        self.bees.len()
    }

    /// Read-only access to the bee columns (positions, headings, states)
    /// consumed by the rendering collaborator.
    #[must_use]
    pub fn bees(&self) -> &BeeColumns {
        &self.bees
    }

    /// Read-only access to the flow field, for debug overlays.
    #[must_use]
    pub fn flow(&self) -> &FlowField {
        &self.flow
    }

    /// Read-only access to the trace canvas, for debug overlays.
    #[must_use]
    pub fn trace(&self) -> &TraceCanvas {
        &self.trace
    }

    /// Read-only access to the active claim source.
    #[must_use]
    pub fn claim_source(&self) -> &dyn ClaimSource {
        self.claim_source.as_ref()
    }

    /// Iterate over retained tick summaries, oldest first.
    pub fn history(&self) -> impl Iterator<Item = &TickSummary> {
        self.history.iter()
    }
}

/// Derive a per-bee RNG seed from the tick seed and the bee index
/// (splitmix64 finalizer), keeping the parallel phase deterministic.
fn agent_seed(tick_seed: u64, index: usize) -> u64 {
    let mut z = tick_seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
