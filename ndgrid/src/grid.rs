/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;

use crate::interval::Index;
use crate::interval::IndexBox;
use crate::interval::IndexInterval;
use crate::interval::INF_INDEX;
use crate::interval::MAX_FINITE_INDEX;
use crate::interval::MIN_FINITE_INDEX;

/// The type of error for grid construction.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum GridError {
    #[error("cell size {size} for grid dimension {dim} must be positive")]
    NonPositiveCellSize { dim: usize, size: Index },

    #[error("no split points for grid dimension {dim}")]
    EmptySplitPoints { dim: usize },

    #[error("split points for grid dimension {dim} not strictly increasing")]
    UnsortedSplitPoints { dim: usize },

    #[error("split point {point} for grid dimension {dim} outside the finite index range")]
    SplitPointOutOfRange { dim: usize, point: Index },
}

/// A per-dimension partition of the integer line into disjoint cells.
///
/// Implementations must be pure: for every representable `x`,
/// `cell_interval(d, output_to_cell(d, x))` contains `x`, and the cells
/// of each dimension tile the entire line. Grids are immutable values;
/// sharing one across concurrent partition calls is safe.
pub trait Grid {
    /// The number of grid dimensions.
    fn grid_rank(&self) -> usize;

    /// The cell containing `output_index` along grid dimension
    /// `grid_dim`.
    fn output_to_cell(&self, grid_dim: usize, output_index: Index) -> Index;

    /// The output-coordinate interval spanned by `cell_index` along
    /// grid dimension `grid_dim`.
    fn cell_interval(&self, grid_dim: usize, cell_index: Index) -> IndexInterval;

    /// The box of cells with finite extent, for grids that have one.
    fn cell_bounds(&self) -> Option<IndexBox> {
        None
    }
}

impl<G: Grid + ?Sized> Grid for &G {
    fn grid_rank(&self) -> usize {
        (**self).grid_rank()
    }

    fn output_to_cell(&self, grid_dim: usize, output_index: Index) -> Index {
        (**self).output_to_cell(grid_dim, output_index)
    }

    fn cell_interval(&self, grid_dim: usize, cell_index: Index) -> IndexInterval {
        (**self).cell_interval(grid_dim, cell_index)
    }

    fn cell_bounds(&self) -> Option<IndexBox> {
        (**self).cell_bounds()
    }
}

/// A grid with a fixed cell size per dimension: cell `c` of dimension
/// `d` spans `[c * size_d, (c + 1) * size_d)`. Cell indices may be
/// negative; the grid is unbounded.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Debug)]
pub struct RegularGrid {
    cell_shape: Vec<Index>,
}

impl RegularGrid {
    /// Creates a regular grid from per-dimension cell sizes.
    pub fn new(cell_shape: Vec<Index>) -> Result<Self, GridError> {
        for (dim, &size) in cell_shape.iter().enumerate() {
            if size <= 0 {
                return Err(GridError::NonPositiveCellSize { dim, size });
            }
        }
        Ok(RegularGrid { cell_shape })
    }

    /// The per-dimension cell sizes.
    pub fn cell_shape(&self) -> &[Index] {
        &self.cell_shape
    }
}

impl Grid for RegularGrid {
    fn grid_rank(&self) -> usize {
        self.cell_shape.len()
    }

    fn output_to_cell(&self, grid_dim: usize, output_index: Index) -> Index {
        output_index.div_euclid(self.cell_shape[grid_dim])
    }

    fn cell_interval(&self, grid_dim: usize, cell_index: Index) -> IndexInterval {
        let size = self.cell_shape[grid_dim] as i128;
        let min = cell_index as i128 * size;
        IndexInterval::from_closed_clamped(min, min + size - 1)
    }
}

/// A grid defined by explicit sorted split points per dimension.
///
/// With split points `p_0 < … < p_{k-1}`, cell `i` for `0 <= i < k-1`
/// spans `[p_i, p_{i+1})`; cell `-1` spans everything below `p_0` and
/// cell `k-1` everything at or above `p_{k-1}`.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IrregularGrid {
    split_points: Vec<Vec<Index>>,
}

impl IrregularGrid {
    /// Creates an irregular grid from per-dimension split points.
    pub fn new(split_points: Vec<Vec<Index>>) -> Result<Self, GridError> {
        for (dim, points) in split_points.iter().enumerate() {
            if points.is_empty() {
                return Err(GridError::EmptySplitPoints { dim });
            }
            for (i, &point) in points.iter().enumerate() {
                if point < MIN_FINITE_INDEX || point > MAX_FINITE_INDEX {
                    return Err(GridError::SplitPointOutOfRange { dim, point });
                }
                if i > 0 && points[i - 1] >= point {
                    return Err(GridError::UnsortedSplitPoints { dim });
                }
            }
        }
        Ok(IrregularGrid { split_points })
    }

    /// The split points of grid dimension `dim`.
    pub fn split_points(&self, dim: usize) -> &[Index] {
        &self.split_points[dim]
    }

    /// The number of bounded cells along `dim`.
    pub fn num_cells(&self, dim: usize) -> Index {
        self.split_points[dim].len() as Index - 1
    }
}

impl Grid for IrregularGrid {
    fn grid_rank(&self) -> usize {
        self.split_points.len()
    }

    fn output_to_cell(&self, grid_dim: usize, output_index: Index) -> Index {
        let points = &self.split_points[grid_dim];
        points.partition_point(|&p| p <= output_index) as Index - 1
    }

    fn cell_interval(&self, grid_dim: usize, cell_index: Index) -> IndexInterval {
        let points = &self.split_points[grid_dim];
        let last = points.len() as Index - 1;
        if cell_index < 0 {
            return IndexInterval::from_closed_clamped(-(INF_INDEX as i128), points[0] as i128 - 1);
        }
        if cell_index >= last {
            return IndexInterval::from_closed_clamped(
                points[last as usize] as i128,
                INF_INDEX as i128 - 1,
            );
        }
        let i = cell_index as usize;
        IndexInterval::from_closed_clamped(points[i] as i128, points[i + 1] as i128 - 1)
    }

    /// The box of bounded cells, `[0, num_cells)` per dimension. The
    /// two unbounded boundary cells of each dimension are excluded.
    fn cell_bounds(&self) -> Option<IndexBox> {
        Some(IndexBox::new(
            self.split_points
                .iter()
                .map(|points| {
                    IndexInterval::new(0, points.len() as Index - 1)
                        .expect("split point count fits the index range")
                })
                .collect(),
        ))
    }
}
