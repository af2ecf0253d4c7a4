/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Coalesced enumeration of grid cells as axis-aligned boxes.
//!
//! [`get_grid_cell_ranges`] covers exactly the cells that
//! [`partition`](fn@crate::partition) would emit (clipped to
//! `grid_bounds`), but groups them into rectangular runs wherever a
//! suffix of the grid dimension list is *unconstrained*: reachable in
//! full regardless of the cells chosen for the outer dimensions. A
//! consumer issuing one request per box then issues one request per
//! run instead of one per cell.

use crate::grid::Grid;
use crate::interval::Index;
use crate::interval::IndexBox;
use crate::interval::IndexInterval;
use crate::partition::pre_partition;
use crate::partition::PartitionError;
use crate::partition::PositionOwner;
use crate::transform::checked_affine;
use crate::transform::IndexTransform;

/// Emits axis-aligned boxes of cell indices jointly covering, without
/// duplicates, every grid cell of `grid_bounds` intersected by the
/// image of `transform`. Boxes are emitted in lexicographic order of
/// their lower corners. Cells outside `grid_bounds` (including the
/// unbounded boundary cells of an
/// [`IrregularGrid`](crate::IrregularGrid)) are clipped away.
pub fn get_grid_cell_ranges<G: Grid>(
    transform: &IndexTransform,
    grid_output_dimensions: &[usize],
    grid_bounds: &IndexBox,
    grid: &G,
    mut callback: impl FnMut(&IndexBox) -> Result<(), PartitionError>,
) -> Result<(), PartitionError> {
    let num_grid_dims = grid_output_dimensions.len();
    if grid_bounds.rank() != num_grid_dims {
        return Err(PartitionError::InvalidDims {
            expected: num_grid_dims,
            got: grid_bounds.rank(),
        });
    }
    if grid_bounds.is_empty() {
        return Ok(());
    }
    if transform.input_rank() > 0 && transform.domain().is_empty() {
        return Ok(());
    }

    let plan = pre_partition(transform, grid_output_dimensions, grid)?;

    // A position is unconstrained when every cell of its bounds is
    // reachable independently of the cells chosen for other grid
    // dimensions: a constant map or a single-dimension strided set
    // whose reachable cell range covers the bounds. Index-array sets
    // and coupled strided sets never qualify.
    let mut unconstrained = vec![false; num_grid_dims];
    for position in 0..num_grid_dims {
        let reachable = match plan.position_owner(position) {
            Some(PositionOwner::Constant(cell)) => {
                IndexInterval::from_closed_clamped(cell as i128, cell as i128)
            }
            Some(PositionOwner::Strided { set }) => {
                let strided = &plan.strided_sets()[set];
                if strided.grid_dims.len() != 1 {
                    continue;
                }
                let interval = transform.domain().interval(strided.input_dim);
                if interval.is_empty() {
                    continue;
                }
                let (offset, stride) = strided.coefficients[0];
                // A non-unit stride can step over whole cells, leaving
                // gaps inside [min_cell, max_cell].
                if stride != 1 && stride != -1 {
                    continue;
                }
                let output_dim = grid_output_dimensions[position];
                let a = checked_affine(offset, stride, interval.inclusive_min(), output_dim)?;
                let b = checked_affine(offset, stride, interval.exclusive_max() - 1, output_dim)?;
                let min_cell = grid.output_to_cell(position, a.min(b));
                let max_cell = grid.output_to_cell(position, a.max(b));
                IndexInterval::from_closed_clamped(min_cell as i128, max_cell as i128)
            }
            Some(PositionOwner::IndexArray { .. }) => continue,
            None => {
                return Err(PartitionError::Internal {
                    message: "grid position owned by no construct".to_string(),
                })
            }
        };
        unconstrained[position] = reachable.contains_interval(grid_bounds.interval(position));
    }

    let mut split = num_grid_dims;
    while split > 0 && unconstrained[split - 1] {
        split -= 1;
    }
    if split == 0 {
        return callback(grid_bounds);
    }

    // Enumerate the constrained prefix alone, then stitch full-bounds
    // suffixes back on.
    let prefix_plan = pre_partition(transform, &grid_output_dimensions[..split], grid)?;
    let mut tuples: Vec<Vec<Index>> = Vec::new();
    prefix_plan.for_each_cell_index(transform, grid, |cells| {
        let in_bounds = cells
            .iter()
            .enumerate()
            .all(|(position, &cell)| grid_bounds.interval(position).contains(cell));
        if in_bounds {
            tuples.push(cells.to_vec());
        }
        Ok(())
    })?;
    tuples.sort();
    tuples.dedup();

    let mut i = 0;
    while i < tuples.len() {
        let run_start = tuples[i][split - 1];
        let mut run_end = run_start + 1;
        let mut j = i + 1;
        while j < tuples.len()
            && tuples[j][..split - 1] == tuples[i][..split - 1]
            && tuples[j][split - 1] == run_end
        {
            run_end += 1;
            j += 1;
        }
        let mut intervals = Vec::with_capacity(num_grid_dims);
        for d in 0..split - 1 {
            intervals.push(IndexInterval::new(tuples[i][d], 1)?);
        }
        intervals.push(IndexInterval::from_bounds(run_start, run_end)?);
        for d in split..num_grid_dims {
            intervals.push(*grid_bounds.interval(d));
        }
        callback(&IndexBox::new(intervals))?;
        i = j;
    }
    Ok(())
}
