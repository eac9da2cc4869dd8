//! Spatially uniform keypoint selection.
//!
//! Detectors cluster keypoints on high-texture regions. The filter divides the
//! image into square cells and keeps at most `max_points_per_cell` keypoints
//! per cell, scanning in detector rank order.

use crate::config::GridFilterConfig;
use crate::tracking::frame::Keypoint;

#[derive(Debug, Clone)]
pub struct GridKeypointFilter {
    config: GridFilterConfig,
}

/// Cell layout for one image size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct CellLayout {
    cell_size: usize,
    rows: usize,
    cols: usize,
}

impl CellLayout {
    fn new(image_rows: usize, image_cols: usize, cell_size: usize) -> Self {
        Self {
            cell_size,
            rows: (image_rows / cell_size).max(1),
            cols: (image_cols / cell_size).max(1),
        }
    }

    /// Row-major cell index. Points outside the grid land in the nearest
    /// border cell.
    fn cell_of(&self, kp: &Keypoint) -> usize {
        let to_cell = |v: f64, n: usize| -> usize {
            if v <= 0.0 || !v.is_finite() {
                0
            } else {
                ((v as usize) / self.cell_size).min(n - 1)
            }
        };
        let row = to_cell(kp.pt.y, self.rows);
        let col = to_cell(kp.pt.x, self.cols);
        row * self.cols + col
    }

    fn num_cells(&self) -> usize {
        self.rows * self.cols
    }
}

impl GridKeypointFilter {
    pub fn new(config: GridFilterConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &GridFilterConfig {
        &self.config
    }

    /// Select keypoints from `keypoints` (ranked best first).
    ///
    /// A keypoint is kept while its cell holds fewer than
    /// `max_points_per_cell` kept keypoints. Scanning stops as soon as the
    /// kept count exceeds `max_keypoints_after_filter`, so the output can hold
    /// one keypoint more than that limit. Dropped keypoints are not moved to
    /// other cells.
    pub fn select(
        &self,
        keypoints: &[Keypoint],
        image_rows: usize,
        image_cols: usize,
    ) -> Vec<Keypoint> {
        let layout = CellLayout::new(image_rows, image_cols, self.config.grid_cell_size);
        let mut occupancy = vec![0usize; layout.num_cells()];
        let capacity = self.config.max_keypoints_after_filter.min(keypoints.len()) + 1;
        let mut selected = Vec::with_capacity(capacity);

        for kp in keypoints {
            let cell = layout.cell_of(kp);
            if occupancy[cell] < self.config.max_points_per_cell {
                occupancy[cell] += 1;
                selected.push(*kp);
                if selected.len() > self.config.max_keypoints_after_filter {
                    break;
                }
            }
        }

        selected
    }
}
