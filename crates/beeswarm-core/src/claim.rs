//! Claim sources: who may reserve a stimulus cell, and for how long.
//!
//! Two interchangeable implementations back the stimulus grid. The
//! instantaneous [`StimulusField`] reacts to the current tick's mask alone
//! with a capacity-bounded counter per cell; the [`PersistentScoreField`]
//! smooths stimulus over a sliding window of recent frames and binds one
//! claimant per cell. The variant is chosen once at construction.

use std::collections::VecDeque;

use beeswarm_field::{GridError, GridGeometry, ScalarGrid};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Which claim source backs the stimulus grid.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClaimVariant {
    /// Capacity-bounded counters recomputed from the instantaneous mask.
    #[default]
    Instantaneous,
    /// Decayed hit-counts over the last K stimulus frames.
    Persistent,
}

/// Per-tick claim bookkeeping over the stimulus grid.
///
/// Claims are resolved by a single-threaded pass in ascending agent-index
/// order each tick; implementations are not required to tolerate concurrent
/// `try_claim` calls. The parallel behavior phase only reads the results.
pub trait ClaimSource: Send {
    /// Start a tick from the freshly downsampled edge density.
    ///
    /// `density` holds active mask cells per stimulus cell, `mask_cells` the
    /// total mask resolution, and `active_cells` the number of active mask
    /// cells.
    fn begin_tick(&mut self, density: &[u32], mask_cells: u32, active_cells: u32, population: usize);

    /// Attempt to claim `cell` for `agent`, returning whether it succeeded.
    ///
    /// `on_stimulus` reports whether the agent's position samples an active
    /// mask cell this tick. The instantaneous source requires it; the
    /// persistent source relies on its windowed scores instead, so a cell
    /// seen in recent frames keeps attracting through mask flicker.
    fn try_claim(&mut self, cell: usize, agent: usize, on_stimulus: bool) -> bool;

    /// Number of claims currently held at `cell`.
    fn claims(&self, cell: usize) -> u32;

    /// The per-cell claim limit in force for the current tick.
    fn capacity(&self) -> u32;

    /// Drop all claims while keeping accumulated stimulus state (override
    /// modes suspend claiming without forgetting history).
    fn clear(&mut self);

    /// Forget everything: claims and accumulated stimulus state.
    fn reset(&mut self);
}

/// Instantaneous claim source: one capacity-bounded counter per cell.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StimulusField {
    counts: ScalarGrid<u32>,
    capacity: u32,
    capacity_max: u32,
}

impl StimulusField {
    /// Construct a field covering `geometry` with all counters zeroed.
    pub fn new(geometry: &GridGeometry, capacity_max: u32) -> Result<Self, GridError> {
        Ok(Self {
            counts: ScalarGrid::for_geometry(geometry, 0)?,
            capacity: 1,
            capacity_max,
        })
    }

    /// Claim counters, one per stimulus cell.
    #[must_use]
    pub fn counts(&self) -> &[u32] {
        self.counts.cells()
    }
}

impl ClaimSource for StimulusField {
    fn begin_tick(
        &mut self,
        density: &[u32],
        mask_cells: u32,
        active_cells: u32,
        population: usize,
    ) {
        debug_assert_eq!(density.len(), self.counts.cells().len());
        self.counts.fill(0);
        self.capacity = if active_cells == 0 {
            1
        } else {
            // mask cells per stimulus cell scale the fair share of agents
            let ratio = mask_cells as f32 / self.counts.cells().len() as f32;
            let fair = (population as f32 * ratio / active_cells as f32).round() as u32;
            fair.clamp(1, self.capacity_max)
        };
    }

    fn try_claim(&mut self, cell: usize, _agent: usize, on_stimulus: bool) -> bool {
        if !on_stimulus {
            return false;
        }
        let count = &mut self.counts.cells_mut()[cell];
        if *count < self.capacity {
            *count += 1;
            true
        } else {
            false
        }
    }

    fn claims(&self, cell: usize) -> u32 {
        self.counts.cells()[cell]
    }

    fn capacity(&self) -> u32 {
        self.capacity
    }

    fn clear(&mut self) {
        self.counts.fill(0);
    }

    fn reset(&mut self) {
        self.counts.fill(0);
        self.capacity = 1;
    }
}

/// Persistent-score claim source: a sliding window of the last K stimulus
/// frames feeds a decayed per-cell hit count, and a cell binds at most one
/// claimant while its score stays above the window floor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistentScoreField {
    claimants: Vec<Option<u32>>,
    scores: Vec<i32>,
    history: VecDeque<Vec<u32>>,
    window: usize,
    avg_fraction: f32,
    evict_scratch: Vec<bool>,
}

impl PersistentScoreField {
    /// Construct an empty field covering `geometry`.
    #[must_use]
    pub fn new(geometry: &GridGeometry, window: usize, avg_fraction: f32) -> Self {
        let len = geometry.len();
        Self {
            claimants: vec![None; len],
            scores: vec![0; len],
            history: VecDeque::with_capacity(window + 1),
            window,
            avg_fraction,
            evict_scratch: vec![false; len],
        }
    }

    /// Score floor a cell must exceed to hold a claimant.
    #[must_use]
    fn score_floor(&self) -> f32 {
        self.avg_fraction * self.window as f32
    }

    /// Decayed hit counts, one per stimulus cell.
    #[must_use]
    pub fn scores(&self) -> &[i32] {
        &self.scores
    }

    /// Ingest one frame of stimulus cells, deduplicating repeats, and evict
    /// the oldest frame once the window overflows.
    ///
    /// The eviction decrement is partitioned across the rayon pool; evicted
    /// cells are unique within a frame so the cell-parallel pass is race-free.
    pub fn ingest_frame<I>(&mut self, cells: I)
    where
        I: IntoIterator<Item = usize>,
    {
        let mut frame: Vec<u32> = Vec::new();
        {
            let seen = &mut self.evict_scratch;
            seen.fill(false);
            for cell in cells {
                if !seen[cell] {
                    seen[cell] = true;
                    frame.push(cell as u32);
                }
            }
        }
        let window = self.window as i32;
        for &cell in &frame {
            let score = &mut self.scores[cell as usize];
            *score = (*score + 1).min(window);
        }
        self.history.push_back(frame);

        if self.history.len() > self.window
            && let Some(oldest) = self.history.pop_front()
        {
            let floor = self.avg_fraction * self.window as f32;
            let evict = &mut self.evict_scratch;
            evict.fill(false);
            for &cell in &oldest {
                evict[cell as usize] = true;
            }
            self.scores
                .par_iter_mut()
                .zip(self.claimants.par_iter_mut())
                .zip(evict.par_iter())
                .for_each(|((score, claimant), &evicted)| {
                    if evicted {
                        *score = (*score - 1).max(0);
                        if (*score as f32) < floor {
                            *claimant = None;
                        }
                    }
                });
        }
    }
}

impl ClaimSource for PersistentScoreField {
    fn begin_tick(
        &mut self,
        density: &[u32],
        _mask_cells: u32,
        _active_cells: u32,
        _population: usize,
    ) {
        debug_assert_eq!(density.len(), self.scores.len());
        let frame = density
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(cell, _)| cell);
        self.ingest_frame(frame);
    }

    fn try_claim(&mut self, cell: usize, agent: usize, _on_stimulus: bool) -> bool {
        match self.claimants[cell] {
            Some(holder) => holder == agent as u32,
            None => {
                if self.scores[cell] as f32 > self.score_floor() {
                    self.claimants[cell] = Some(agent as u32);
                    true
                } else {
                    false
                }
            }
        }
    }

    fn claims(&self, cell: usize) -> u32 {
        u32::from(self.claimants[cell].is_some())
    }

    fn capacity(&self) -> u32 {
        1
    }

    fn clear(&mut self) {
        self.claimants.fill(None);
    }

    fn reset(&mut self) {
        self.claimants.fill(None);
        self.scores.fill(0);
        self.history.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> GridGeometry {
        GridGeometry::from_extent(100, 100, 10).expect("geometry")
    }

    #[test]
    fn capacity_tracks_population_and_active_cells() {
        let geometry = geometry();
        let mut field = StimulusField::new(&geometry, 255).expect("field");
        let mut density = vec![0_u32; geometry.len()];
        density[0] = 1;
        // mask resolution equals the grid: ratio 1, one active cell
        field.begin_tick(&density, geometry.len() as u32, 1, 100);
        assert_eq!(field.capacity(), 100);
        // no active cells forces the safe minimum
        density[0] = 0;
        field.begin_tick(&density, geometry.len() as u32, 0, 100);
        assert_eq!(field.capacity(), 1);
        // the cap holds when edges are scarce relative to the population
        density[0] = 1;
        field.begin_tick(&density, geometry.len() as u32, 1, 1_000_000);
        assert_eq!(field.capacity(), 255);
    }

    #[test]
    fn claims_stop_at_capacity() {
        let geometry = geometry();
        let mut field = StimulusField::new(&geometry, 255).expect("field");
        let density = vec![1_u32; geometry.len()];
        field.begin_tick(&density, geometry.len() as u32, geometry.len() as u32, 300);
        let capacity = field.capacity();
        assert_eq!(capacity, 3);
        for agent in 0..capacity as usize {
            assert!(field.try_claim(5, agent, true));
        }
        assert!(!field.try_claim(5, 99, true));
        assert_eq!(field.claims(5), capacity);
        field.clear();
        assert_eq!(field.claims(5), 0);
    }

    #[test]
    fn begin_tick_zeroes_previous_claims() {
        let geometry = geometry();
        let mut field = StimulusField::new(&geometry, 255).expect("field");
        let density = vec![1_u32; geometry.len()];
        field.begin_tick(&density, geometry.len() as u32, geometry.len() as u32, 500);
        assert!(field.try_claim(7, 0, true));
        field.begin_tick(&density, geometry.len() as u32, geometry.len() as u32, 500);
        assert_eq!(field.claims(7), 0);
    }

    #[test]
    fn persistent_scores_stay_within_window() {
        let geometry = geometry();
        let mut field = PersistentScoreField::new(&geometry, 3, 0.5);
        for _ in 0..10 {
            field.ingest_frame([4_usize, 4, 4, 9]);
            for &score in field.scores() {
                assert!((0..=3).contains(&score));
            }
        }
        // duplicates within one frame count once
        assert_eq!(field.scores()[4], 3);
        assert_eq!(field.scores()[9], 3);
    }

    #[test]
    fn persistent_claim_requires_score_above_floor() {
        let geometry = geometry();
        let mut field = PersistentScoreField::new(&geometry, 4, 0.5);
        // floor is 2.0: a single sighting is not enough
        field.ingest_frame([11_usize]);
        assert!(!field.try_claim(11, 0, true));
        field.ingest_frame([11_usize]);
        assert!(!field.try_claim(11, 0, true));
        field.ingest_frame([11_usize]);
        assert!(field.try_claim(11, 0, true));
        // the holder retains the cell; others are refused
        assert!(field.try_claim(11, 0, true));
        assert!(!field.try_claim(11, 1, true));
    }

    #[test]
    fn eviction_releases_claimants_below_floor() {
        let geometry = geometry();
        let mut field = PersistentScoreField::new(&geometry, 2, 0.4);
        // floor is 0.8: one sighting suffices
        field.ingest_frame([3_usize]);
        assert!(field.try_claim(3, 5, true));
        // two empty frames push the sighting out of the window
        field.ingest_frame(std::iter::empty());
        field.ingest_frame(std::iter::empty());
        assert_eq!(field.scores()[3], 0);
        assert_eq!(field.claims(3), 0);
        assert!(!field.try_claim(3, 5, true));
    }

    #[test]
    fn reset_forgets_scores_and_claims() {
        let geometry = geometry();
        let mut field = PersistentScoreField::new(&geometry, 2, 0.1);
        field.ingest_frame([1_usize, 2, 3]);
        assert!(field.try_claim(2, 0, true));
        field.reset();
        assert_eq!(field.scores().iter().sum::<i32>(), 0);
        assert_eq!(field.claims(2), 0);
    }
}
