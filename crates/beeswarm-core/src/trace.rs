//! Trace canvas for the path-following gesture override.
//!
//! Gesture centers are rasterized onto a slowly decaying floating-point
//! canvas sharing the stimulus grid geometry. A force field is derived from
//! the canvas by stamping a precomputed radial attract kernel at every
//! sufficiently drawn cell whose stimulus cell is unclaimed; flying bees
//! sample the force at their own cell.

use beeswarm_field::{GridError, GridGeometry, ScalarGrid};

/// Precomputed radial kernel of unit vectors pointing toward its center.
#[derive(Debug, Clone)]
struct AttractKernel {
    offsets: Vec<(i32, i32, f32, f32)>,
}

impl AttractKernel {
    fn new(radius: u32) -> Self {
        let radius = radius as i32;
        let mut offsets = Vec::new();
        for dy in -radius..=radius {
            for dx in -radius..=radius {
                if dx == 0 && dy == 0 {
                    continue;
                }
                let dist_sq = dx * dx + dy * dy;
                if dist_sq > radius * radius {
                    continue;
                }
                let length = (dist_sq as f32).sqrt();
                // unit vector from the offset cell back toward the kernel center
                offsets.push((dx, dy, -(dx as f32) / length, -(dy as f32) / length));
            }
        }
        Self { offsets }
    }
}

/// Decaying canvas plus the force field derived from it.
#[derive(Debug, Clone)]
pub struct TraceCanvas {
    geometry: GridGeometry,
    values: ScalarGrid<f32>,
    force_x: Vec<f32>,
    force_y: Vec<f32>,
    last_point: Option<(u32, u32)>,
    kernel: AttractKernel,
    decay: f32,
    threshold: f32,
}

impl TraceCanvas {
    /// Construct an empty canvas covering `geometry`.
    pub fn new(
        geometry: GridGeometry,
        decay: f32,
        threshold: f32,
        kernel_radius: u32,
    ) -> Result<Self, GridError> {
        let len = geometry.len();
        Ok(Self {
            values: ScalarGrid::for_geometry(&geometry, 0.0)?,
            geometry,
            force_x: vec![0.0; len],
            force_y: vec![0.0; len],
            last_point: None,
            kernel: AttractKernel::new(kernel_radius),
            decay,
            threshold,
        })
    }

    /// Canvas values, one per stimulus cell.
    #[must_use]
    pub fn values(&self) -> &[f32] {
        self.values.cells()
    }

    /// Canvas value at a cell.
    #[must_use]
    pub fn value_at(&self, cell: usize) -> f32 {
        self.values.cells()[cell]
    }

    /// Whether a cell is drawn strongly enough to attract.
    #[must_use]
    pub fn is_drawn(&self, cell: usize) -> bool {
        self.values.cells()[cell] > self.threshold
    }

    /// Apply one tick of decay to the whole canvas.
    pub fn fade(&mut self) {
        for value in self.values.cells_mut() {
            *value *= self.decay;
        }
    }

    /// Close the current trace; the next draw starts as an isolated point.
    pub fn end_trace(&mut self) {
        self.last_point = None;
    }

    /// Forget the canvas, force field, and trace continuity.
    pub fn reset(&mut self) {
        self.values.fill(0.0);
        self.force_x.fill(0.0);
        self.force_y.fill(0.0);
        self.last_point = None;
    }

    /// Rasterize a gesture center (simulation coordinates) onto the canvas,
    /// connecting it to the previous tick's center with a line.
    ///
    /// Positions outside the extent end the trace without drawing.
    pub fn draw(&mut self, x: f32, y: f32) {
        let Some(cell) = self.geometry.cell_of(x, y) else {
            self.last_point = None;
            return;
        };
        let (col, row) = self.geometry.coords(cell);
        match self.last_point {
            Some((prev_col, prev_row)) => self.draw_line(prev_col, prev_row, col, row),
            None => self.plot(col, row),
        }
        self.last_point = Some((col, row));
    }

    fn plot(&mut self, col: u32, row: u32) {
        let idx = self.geometry.index(col, row);
        self.values.cells_mut()[idx] = 1.0;
    }

    /// Bresenham line between two cells, inclusive of both endpoints.
    fn draw_line(&mut self, col0: u32, row0: u32, col1: u32, row1: u32) {
        let (mut x0, mut y0) = (col0 as i64, row0 as i64);
        let (x1, y1) = (col1 as i64, row1 as i64);
        let dx = (x1 - x0).abs();
        let dy = -(y1 - y0).abs();
        let step_x = if x0 < x1 { 1 } else { -1 };
        let step_y = if y0 < y1 { 1 } else { -1 };
        let mut error = dx + dy;
        loop {
            self.plot(x0 as u32, y0 as u32);
            if x0 == x1 && y0 == y1 {
                break;
            }
            let doubled = 2 * error;
            if doubled >= dy {
                error += dy;
                x0 += step_x;
            }
            if doubled <= dx {
                error += dx;
                y0 += step_y;
            }
        }
    }

    /// Rebuild the force field by stamping the attract kernel at every drawn
    /// cell whose stimulus cell is unclaimed.
    pub fn rebuild_force<F>(&mut self, claims: F)
    where
        F: Fn(usize) -> u32,
    {
        self.force_x.fill(0.0);
        self.force_y.fill(0.0);
        let cols = self.geometry.cols() as i32;
        let rows = self.geometry.rows() as i32;
        for cell in 0..self.values.cells().len() {
            if self.values.cells()[cell] <= self.threshold || claims(cell) > 0 {
                continue;
            }
            let (col, row) = self.geometry.coords(cell);
            for &(dx, dy, unit_x, unit_y) in &self.kernel.offsets {
                let target_col = col as i32 + dx;
                let target_row = row as i32 + dy;
                if target_col < 0 || target_col >= cols || target_row < 0 || target_row >= rows {
                    continue;
                }
                let target = self.geometry.index(target_col as u32, target_row as u32);
                self.force_x[target] += unit_x;
                self.force_y[target] += unit_y;
            }
        }
    }

    /// Accumulated attract force at a cell.
    #[must_use]
    pub fn force_at(&self, cell: usize) -> (f32, f32) {
        (self.force_x[cell], self.force_y[cell])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn geometry() -> GridGeometry {
        GridGeometry::from_extent(200, 200, 10).expect("geometry")
    }

    fn canvas() -> TraceCanvas {
        TraceCanvas::new(geometry(), 0.99, 0.65, 3).expect("canvas")
    }

    #[test]
    fn isolated_point_marks_one_cell() {
        let mut canvas = canvas();
        canvas.draw(55.0, 55.0);
        let cell = geometry().cell_of(55.0, 55.0).expect("cell");
        assert_eq!(canvas.value_at(cell), 1.0);
        assert_eq!(canvas.values().iter().filter(|&&v| v > 0.0).count(), 1);
    }

    #[test]
    fn consecutive_draws_connect_with_a_line() {
        let mut canvas = canvas();
        canvas.draw(15.0, 15.0);
        canvas.draw(165.0, 15.0);
        // every cell along row 1 between the endpoints is drawn
        let geometry = geometry();
        for col in 1..=16 {
            assert_eq!(canvas.value_at(geometry.index(col, 1)), 1.0, "col {col}");
        }
    }

    #[test]
    fn ending_a_trace_breaks_continuity() {
        let mut canvas = canvas();
        canvas.draw(15.0, 15.0);
        canvas.end_trace();
        canvas.draw(165.0, 15.0);
        let geometry = geometry();
        assert_eq!(canvas.value_at(geometry.index(8, 1)), 0.0);
    }

    #[test]
    fn fade_decays_by_the_configured_factor() {
        let mut canvas = canvas();
        canvas.draw(55.0, 55.0);
        let cell = geometry().cell_of(55.0, 55.0).expect("cell");
        for _ in 0..50 {
            canvas.fade();
        }
        let expected = 0.99_f32.powi(50);
        assert!((canvas.value_at(cell) - expected).abs() < 1e-4);
        assert!(!canvas.is_drawn(cell), "faded past the draw threshold");
    }

    #[test]
    fn force_points_toward_the_drawn_cell() {
        let mut canvas = canvas();
        canvas.draw(105.0, 105.0);
        canvas.rebuild_force(|_| 0);
        let geometry = geometry();
        // a cell to the right of the stroke is pulled left
        let (fx, fy) = canvas.force_at(geometry.index(12, 10));
        assert!(fx < 0.0);
        assert!(fy.abs() < 1e-5);
        // a cell below is pulled up
        let (fx, fy) = canvas.force_at(geometry.index(10, 12));
        assert!(fx.abs() < 1e-5);
        assert!(fy < 0.0);
        // outside the kernel radius there is no force
        let (fx, fy) = canvas.force_at(geometry.index(17, 10));
        assert_eq!((fx, fy), (0.0, 0.0));
    }

    #[test]
    fn claimed_cells_do_not_attract() {
        let mut canvas = canvas();
        canvas.draw(105.0, 105.0);
        let geometry = geometry();
        let drawn = geometry.cell_of(105.0, 105.0).expect("cell");
        canvas.rebuild_force(move |cell| u32::from(cell == drawn));
        let (fx, fy) = canvas.force_at(geometry.index(12, 10));
        assert_eq!((fx, fy), (0.0, 0.0));
    }
}
