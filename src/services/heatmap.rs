//! Decaying occupancy grid for heatmap derivation
//!
//! Fixed-resolution grid over the normalized frame. Each present person
//! deposits into the cell under their position every tick; all cells decay
//! by a constant factor every tick so influence fades rather than vanishing.
//! Emission normalizes intensities against the current hottest cell and
//! drops cells below a small floor.

use crate::domain::types::{HeatPoint, HeatmapData};

/// Cells per axis
pub const GRID_SIZE: usize = 20;

/// Per-tick decay factor applied to every cell
const DECAY: f64 = 0.98;

/// Cells at or below this value are not emitted
const EMISSION_FLOOR: f64 = 0.5;

pub struct OccupancyGrid {
    cells: [[f64; GRID_SIZE]; GRID_SIZE],
}

impl OccupancyGrid {
    pub fn new() -> Self {
        Self { cells: [[0.0; GRID_SIZE]; GRID_SIZE] }
    }

    /// Add one observation at a normalized position
    pub fn deposit(&mut self, x: f64, y: f64) {
        let col = cell_index(x);
        let row = cell_index(y);
        self.cells[row][col] += 1.0;
    }

    /// Apply the per-tick decay to every cell
    pub fn decay(&mut self) {
        for row in self.cells.iter_mut() {
            for cell in row.iter_mut() {
                *cell *= DECAY;
            }
        }
    }

    /// Emit the current grid as normalized heat points
    pub fn heatmap(&self) -> HeatmapData {
        let max = self
            .cells
            .iter()
            .flatten()
            .fold(1.0f64, |acc, &v| acc.max(v));

        let mut points = Vec::new();
        for (row, cells) in self.cells.iter().enumerate() {
            for (col, &value) in cells.iter().enumerate() {
                if value > EMISSION_FLOOR {
                    points.push(HeatPoint {
                        x: col as f64 / GRID_SIZE as f64,
                        y: row as f64 / GRID_SIZE as f64,
                        intensity: (value / max).min(1.0),
                    });
                }
            }
        }

        HeatmapData {
            points,
            grid_width: Some(GRID_SIZE as u32),
            grid_height: Some(GRID_SIZE as u32),
        }
    }
}

impl Default for OccupancyGrid {
    fn default() -> Self {
        Self::new()
    }
}

/// Map a normalized coordinate into a grid index, clamping out-of-range input
fn cell_index(v: f64) -> usize {
    let idx = (v * GRID_SIZE as f64).floor();
    (idx.max(0.0) as usize).min(GRID_SIZE - 1)
}
