//! Flow field: per-cell headings steering flying bees toward the nearest
//! under-served stimulus cell.
//!
//! Rebuilt from scratch every tick by a multi-source flood fill over the
//! 4-connected stimulus grid; no state survives between ticks. With a
//! degenerate mask the field falls back to radial dispersal from the grid
//! center so airborne bees spread out instead of stalling.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use beeswarm_field::GridGeometry;

const UNASSIGNED: u32 = u32::MAX;

/// Grid of desired headings, one per stimulus cell.
///
/// Only meaningful where a bee's own cell is unclaimed; consumers read it
/// only on the unclaimed path.
#[derive(Debug, Clone)]
pub struct FlowField {
    geometry: GridGeometry,
    headings: Vec<f32>,
    nearest: Vec<u32>,
}

impl FlowField {
    /// Construct a zeroed field covering `geometry`.
    #[must_use]
    pub fn new(geometry: GridGeometry) -> Self {
        let len = geometry.len();
        Self {
            geometry,
            headings: vec![0.0; len],
            nearest: vec![UNASSIGNED; len],
        }
    }

    /// Desired heading at a cell.
    #[must_use]
    pub fn heading_at(&self, cell: usize) -> f32 {
        self.headings[cell]
    }

    /// All headings in row-major order.
    #[must_use]
    pub fn headings(&self) -> &[f32] {
        &self.headings
    }

    /// Reset every heading to zero (used on swarm reset).
    pub fn clear(&mut self) {
        self.headings.fill(0.0);
    }

    /// Recompute the field for this tick.
    ///
    /// Sources are stimulus cells whose claim count covers less than half of
    /// the claims their edge density justifies (`population · density /
    /// active_cells`). The flood fill expands in squared-distance order with
    /// ties broken by the source cell's raster index, then insertion order,
    /// so rebuilds are deterministic.
    pub fn rebuild<F>(&mut self, density: &[u32], active_cells: u32, population: usize, claims: F)
    where
        F: Fn(usize) -> u32,
    {
        debug_assert_eq!(density.len(), self.headings.len());
        self.nearest.fill(UNASSIGNED);

        let mut heap: BinaryHeap<Reverse<(u64, u32, u32, u32)>> = BinaryHeap::new();
        let mut sequence: u32 = 0;
        if active_cells > 0 {
            for (cell, &cell_density) in density.iter().enumerate() {
                if cell_density == 0 {
                    continue;
                }
                let justified = ((population as u64 * cell_density as u64
                    + active_cells as u64 / 2)
                    / active_cells as u64)
                    .max(1);
                if u64::from(claims(cell)) * 2 < justified {
                    heap.push(Reverse((0, cell as u32, sequence, cell as u32)));
                    sequence += 1;
                }
            }
        }
        if heap.is_empty() {
            self.fill_radial();
            return;
        }

        let cols = self.geometry.cols();
        let rows = self.geometry.rows();
        while let Some(Reverse((_, source, _, cell))) = heap.pop() {
            let cell_idx = cell as usize;
            if self.nearest[cell_idx] != UNASSIGNED {
                continue;
            }
            self.nearest[cell_idx] = source;
            let (col, row) = self.geometry.coords(cell_idx);
            let (src_col, src_row) = self.geometry.coords(source as usize);
            self.headings[cell_idx] =
                (src_row as f32 - row as f32).atan2(src_col as f32 - col as f32);

            let neighbors = [
                (col.wrapping_sub(1), row),
                (col + 1, row),
                (col, row.wrapping_sub(1)),
                (col, row + 1),
            ];
            for (ncol, nrow) in neighbors {
                if ncol >= cols || nrow >= rows {
                    continue;
                }
                let neighbor = self.geometry.index(ncol, nrow);
                if self.nearest[neighbor] != UNASSIGNED {
                    continue;
                }
                let dx = i64::from(src_col) - i64::from(ncol);
                let dy = i64::from(src_row) - i64::from(nrow);
                let dist_sq = (dx * dx + dy * dy) as u64;
                heap.push(Reverse((dist_sq, source, sequence, neighbor as u32)));
                sequence += 1;
            }
        }
    }

    /// Point every cell outward from the grid center.
    fn fill_radial(&mut self) {
        let center_col = (self.geometry.cols() as f32 - 1.0) * 0.5;
        let center_row = (self.geometry.rows() as f32 - 1.0) * 0.5;
        for cell in 0..self.headings.len() {
            let (col, row) = self.geometry.coords(cell);
            let dx = col as f32 - center_col;
            let dy = row as f32 - center_row;
            self.headings[cell] = dy.atan2(dx);
        }
    }
}
