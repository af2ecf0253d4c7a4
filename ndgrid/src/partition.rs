/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Partitioning of an [`IndexTransform`] over a [`Grid`].
//!
//! Given a transform from an n-dimensional input box to an
//! m-dimensional output space and a grid over some of the output
//! dimensions, [`partition`] enumerates every grid cell intersected by
//! the transform's image. For each such cell it synthesizes a *cell
//! transform*: a transform whose image under the original transform's
//! input space covers exactly the pre-images landing in that cell.
//!
//! The work splits into an analysis phase ([`pre_partition`], producing
//! an immutable [`PartitionPlan`]) and an enumeration phase
//! ([`PartitionPlan::for_each_cell`]). The analysis classifies output
//! dimensions by the structure of their output maps, groups dimensions
//! coupled through shared input dimensions into *connected sets*, and
//! for sets driven by index arrays precomputes the partition of input
//! positions by cell.

use crate::grid::Grid;
use crate::grid::GridError;
use crate::interval::Index;
use crate::interval::IndexBox;
use crate::interval::IndexInterval;
use crate::transform::checked_affine;
use crate::transform::IndexTransform;
use crate::transform::OutputIndexMap;
use crate::transform::TransformError;

/// The type of error for partition operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum PartitionError {
    #[error("invalid dims: expected {expected}, got {got}")]
    InvalidDims { expected: usize, got: usize },

    #[error("grid dimension {grid_dim} out of range for output rank {output_rank}")]
    GridDimOutOfRange { grid_dim: usize, output_rank: usize },

    #[error("duplicate grid dimension {grid_dim}")]
    DuplicateGridDim { grid_dim: usize },

    #[error("grid of rank {grid_rank} cannot serve {expected} grid dimensions")]
    GridRankMismatch { grid_rank: usize, expected: usize },

    #[error("too many index combinations to partition")]
    TooManyCombinations,

    #[error("cancelled: {message}")]
    Cancelled { message: String },

    #[error("internal invariant violation: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Grid(#[from] GridError),

    #[error(transparent)]
    Interval(#[from] crate::interval::IntervalError),
}

fn internal(message: impl Into<String>) -> PartitionError {
    let message = message.into();
    debug_assert!(false, "{}", message);
    PartitionError::Internal { message }
}

/// A connected set whose output maps are all affine in one input
/// dimension: enumerable by pure interval arithmetic.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct StridedSet {
    pub(crate) input_dim: usize,
    /// Positions into the grid dimension list, in scan order.
    pub(crate) grid_dims: Vec<usize>,
    /// `(offset, stride)` of the member map, per `grid_dims` entry.
    pub(crate) coefficients: Vec<(Index, Index)>,
}

/// One group of input positions mapping into a single grid cell.
#[derive(Debug, Clone, Eq, PartialEq)]
pub(crate) struct CellPartition {
    pub(crate) cell_indices: Vec<Index>,
    /// Flattened `[num_rows][input_dims.len()]` input coordinates.
    pub(crate) input_rows: Vec<Index>,
}

/// A connected set containing at least one index-array output map:
/// enumerable only by visiting the cartesian product of its input
/// dimensions, precomputed here as rows grouped by cell-index tuple.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct IndexArraySet {
    /// Member input dimensions, ascending.
    pub(crate) input_dims: Vec<usize>,
    /// Positions into the grid dimension list, in scan order.
    pub(crate) grid_dims: Vec<usize>,
    /// Row groups, ordered lexicographically by cell-index tuple.
    pub(crate) partitions: Vec<CellPartition>,
}

impl IndexArraySet {
    /// The member input dimensions, ascending.
    pub fn input_dims(&self) -> &[usize] {
        &self.input_dims
    }

    /// The number of distinct cell-index tuples reached by this set.
    pub fn num_partitions(&self) -> usize {
        self.partitions.len()
    }

    fn num_rows(&self, partition: usize) -> usize {
        self.partitions[partition].input_rows.len() / self.input_dims.len()
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
enum InputDimRole {
    /// Consumed by an index-array set; reproduced in cell transforms by
    /// reading `column` of the set's stored rows.
    IndexArray { set: usize, column: usize },
    /// Carried through to cell transforms at input position `position`.
    Retained { position: usize },
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub(crate) enum PositionOwner {
    Constant(Index),
    Strided { set: usize },
    IndexArray { set: usize },
}

/// The immutable result of analyzing a transform against a grid: the
/// connected-set decomposition plus everything precomputed that cell
/// enumeration needs. Built by [`pre_partition`].
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct PartitionPlan {
    grid_output_dimensions: Vec<usize>,
    input_rank: usize,
    empty_domain: bool,
    /// `(position, cell)` for grid dimensions with constant output
    /// maps, whose cell never varies.
    constant_cells: Vec<(usize, Index)>,
    index_array_sets: Vec<IndexArraySet>,
    strided_sets: Vec<StridedSet>,
    /// Input dimensions not consumed by any index-array set, ascending.
    retained_input_dims: Vec<usize>,
    roles: Vec<InputDimRole>,
}

/// Mutable cursor state threaded through enumeration.
struct WalkState {
    cells: Vec<Index>,
    array_partitions: Vec<usize>,
    strided_intervals: Vec<IndexInterval>,
}

struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        UnionFind {
            parent: (0..n).collect(),
        }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        let mut x = x;
        while self.parent[x] != root {
            let next = self.parent[x];
            self.parent[x] = root;
            x = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let ra = self.find(a);
        let rb = self.find(b);
        if ra != rb {
            self.parent[rb] = ra;
        }
    }
}

pub(crate) fn floor_div(a: i128, b: i128) -> i128 {
    let q = a / b;
    let r = a % b;
    if r != 0 && ((r < 0) != (b < 0)) {
        q - 1
    } else {
        q
    }
}

pub(crate) fn ceil_div(a: i128, b: i128) -> i128 {
    -floor_div(-a, b)
}

/// The set of inputs `x` with `offset + stride * x` inside `range`.
pub(crate) fn affine_preimage(
    offset: Index,
    stride: Index,
    range: &IndexInterval,
) -> IndexInterval {
    if range.is_empty() {
        return IndexInterval::from_closed_clamped(0, -1);
    }
    let lo = range.inclusive_min() as i128 - offset as i128;
    let hi = range.exclusive_max() as i128 - 1 - offset as i128;
    let s = stride as i128;
    let (min, max) = if s > 0 {
        (ceil_div(lo, s), floor_div(hi, s))
    } else {
        (ceil_div(hi, s), floor_div(lo, s))
    };
    IndexInterval::from_closed_clamped(min, max)
}

fn validate_grid_dimensions<G: Grid>(
    transform: &IndexTransform,
    grid_output_dimensions: &[usize],
    grid: &G,
) -> Result<(), PartitionError> {
    let output_rank = transform.output_rank();
    for (i, &grid_dim) in grid_output_dimensions.iter().enumerate() {
        if grid_dim >= output_rank {
            return Err(PartitionError::GridDimOutOfRange {
                grid_dim,
                output_rank,
            });
        }
        if grid_output_dimensions[..i].contains(&grid_dim) {
            return Err(PartitionError::DuplicateGridDim { grid_dim });
        }
    }
    if grid.grid_rank() < grid_output_dimensions.len() {
        return Err(PartitionError::GridRankMismatch {
            grid_rank: grid.grid_rank(),
            expected: grid_output_dimensions.len(),
        });
    }
    Ok(())
}

/// The input dimensions an output map actually depends on: for a
/// single-input-dimension map, that dimension; for an index-array map,
/// the listed dimensions along which the array is not broadcast.
fn dependent_input_dims(map: &OutputIndexMap) -> Vec<usize> {
    match map {
        OutputIndexMap::Constant { .. } => vec![],
        OutputIndexMap::SingleInputDimension { input_dim, .. } => vec![*input_dim],
        OutputIndexMap::IndexArray {
            array, input_dims, ..
        } => input_dims
            .iter()
            .enumerate()
            .filter(|&(pos, _)| array.shape()[pos] > 1)
            .map(|(_, &d)| d)
            .collect(),
    }
}

/// Evaluates the output map of `output_dim` at one combination of the
/// connected set's input coordinates (`coords` parallel to
/// `set_input_dims`).
fn evaluate_set_output(
    transform: &IndexTransform,
    output_dim: usize,
    set_input_dims: &[usize],
    coords: &[Index],
) -> Result<Index, PartitionError> {
    let coord_of = |input_dim: usize| -> Result<Index, PartitionError> {
        set_input_dims
            .iter()
            .position(|&d| d == input_dim)
            .map(|i| coords[i])
            .ok_or_else(|| internal("connected set missing an input dimension it references"))
    };
    match transform.output_map(output_dim) {
        OutputIndexMap::Constant { .. } => {
            Err(internal("constant output map inside a connected set"))
        }
        OutputIndexMap::SingleInputDimension {
            offset,
            stride,
            input_dim,
        } => Ok(checked_affine(*offset, *stride, coord_of(*input_dim)?, output_dim)?),
        OutputIndexMap::IndexArray {
            offset,
            stride,
            array,
            input_dims,
        } => {
            let mut point = Vec::with_capacity(input_dims.len());
            for (pos, &d) in input_dims.iter().enumerate() {
                if array.shape()[pos] == 1 {
                    point.push(array.origin()[pos]);
                } else {
                    point.push(coord_of(d)?);
                }
            }
            let value = array.get(&point).map_err(TransformError::from)?;
            Ok(checked_affine(*offset, *stride, value, output_dim)?)
        }
    }
}

/// Classifies the grid output dimensions of `transform`, groups coupled
/// dimensions into connected sets, and precomputes each index-array
/// set's cell partition. The returned plan is immutable; repeated calls
/// with the same inputs yield equal plans.
pub fn pre_partition<G: Grid>(
    transform: &IndexTransform,
    grid_output_dimensions: &[usize],
    grid: &G,
) -> Result<PartitionPlan, PartitionError> {
    validate_grid_dimensions(transform, grid_output_dimensions, grid)?;

    let input_rank = transform.input_rank();
    let num_grid_dims = grid_output_dimensions.len();
    let empty_domain = input_rank > 0 && transform.domain().is_empty();

    if empty_domain {
        return Ok(PartitionPlan {
            grid_output_dimensions: grid_output_dimensions.to_vec(),
            input_rank,
            empty_domain,
            constant_cells: vec![],
            index_array_sets: vec![],
            strided_sets: vec![],
            retained_input_dims: (0..input_rank).collect(),
            roles: (0..input_rank)
                .map(|i| InputDimRole::Retained { position: i })
                .collect(),
        });
    }

    // Nodes 0..input_rank are input dimensions; node input_rank + j is
    // the grid dimension at position j.
    let mut uf = UnionFind::new(input_rank + num_grid_dims);
    let mut constant_cells = Vec::new();
    let mut is_array_position = vec![false; num_grid_dims];
    let mut is_constant_position = vec![false; num_grid_dims];

    for (position, &output_dim) in grid_output_dimensions.iter().enumerate() {
        let map = transform.output_map(output_dim);
        let deps = dependent_input_dims(map);
        if deps.is_empty() {
            // Constant maps, and index-array maps broadcast along every
            // dimension, hit a single fixed cell.
            let value = match map {
                OutputIndexMap::Constant { value } => *value,
                OutputIndexMap::SingleInputDimension { .. } => {
                    return Err(internal("single-input-dimension map without a dependency"));
                }
                OutputIndexMap::IndexArray {
                    offset,
                    stride,
                    array,
                    ..
                } => {
                    let value = array
                        .get(&array.origin().to_vec())
                        .map_err(TransformError::from)?;
                    checked_affine(*offset, *stride, value, output_dim)?
                }
            };
            constant_cells.push((position, grid.output_to_cell(position, value)));
            is_constant_position[position] = true;
            continue;
        }
        if matches!(map, OutputIndexMap::IndexArray { .. }) {
            is_array_position[position] = true;
        }
        for dim in deps {
            uf.union(dim, input_rank + position);
        }
    }

    // Connected components, ordered by first appearance in the grid
    // dimension scan.
    struct Component {
        root: usize,
        grid_positions: Vec<usize>,
        input_dims: Vec<usize>,
        has_array: bool,
    }
    let mut components: Vec<Component> = Vec::new();
    for position in 0..num_grid_dims {
        if is_constant_position[position] {
            continue;
        }
        let root = uf.find(input_rank + position);
        match components.iter_mut().find(|c| c.root == root) {
            Some(component) => {
                component.grid_positions.push(position);
                component.has_array |= is_array_position[position];
            }
            None => components.push(Component {
                root,
                grid_positions: vec![position],
                input_dims: vec![],
                has_array: is_array_position[position],
            }),
        }
    }
    for dim in 0..input_rank {
        let root = uf.find(dim);
        if let Some(component) = components.iter_mut().find(|c| c.root == root) {
            component.input_dims.push(dim);
        }
    }

    let mut index_array_sets = Vec::new();
    let mut strided_sets = Vec::new();
    for component in &components {
        if component.has_array {
            let partitions = build_array_partitions(
                transform,
                grid_output_dimensions,
                grid,
                &component.input_dims,
                &component.grid_positions,
            )?;
            index_array_sets.push(IndexArraySet {
                input_dims: component.input_dims.clone(),
                grid_dims: component.grid_positions.clone(),
                partitions,
            });
        } else {
            if component.input_dims.len() != 1 {
                return Err(internal("strided connected set with more than one input dim"));
            }
            let input_dim = component.input_dims[0];
            let coefficients = component
                .grid_positions
                .iter()
                .map(|&position| {
                    match transform.output_map(grid_output_dimensions[position]) {
                        OutputIndexMap::SingleInputDimension { offset, stride, .. } => {
                            Ok((*offset, *stride))
                        }
                        _ => Err(internal("non-affine map in a strided connected set")),
                    }
                })
                .collect::<Result<Vec<_>, _>>()?;
            strided_sets.push(StridedSet {
                input_dim,
                grid_dims: component.grid_positions.clone(),
                coefficients,
            });
        }
    }

    let mut roles = vec![InputDimRole::Retained { position: 0 }; input_rank];
    let mut consumed = vec![false; input_rank];
    for (set, array_set) in index_array_sets.iter().enumerate() {
        for (column, &dim) in array_set.input_dims.iter().enumerate() {
            roles[dim] = InputDimRole::IndexArray { set, column };
            consumed[dim] = true;
        }
    }
    let mut retained_input_dims = Vec::new();
    for dim in 0..input_rank {
        if !consumed[dim] {
            roles[dim] = InputDimRole::Retained {
                position: index_array_sets.len() + retained_input_dims.len(),
            };
            retained_input_dims.push(dim);
        }
    }

    let plan = PartitionPlan {
        grid_output_dimensions: grid_output_dimensions.to_vec(),
        input_rank,
        empty_domain,
        constant_cells,
        index_array_sets,
        strided_sets,
        retained_input_dims,
        roles,
    };
    tracing::debug!(
        grid_dims = plan.grid_output_dimensions.len(),
        constant = plan.constant_cells.len(),
        index_array_sets = plan.index_array_sets.len(),
        strided_sets = plan.strided_sets.len(),
        "built partition plan"
    );
    Ok(plan)
}

/// Visits the cartesian product of the set's input dimensions,
/// evaluates every member output map at each combination, and groups
/// the combinations by cell-index tuple (lexicographically ordered;
/// rows within a group stay in visit order).
fn build_array_partitions<G: Grid>(
    transform: &IndexTransform,
    grid_output_dimensions: &[usize],
    grid: &G,
    input_dims: &[usize],
    grid_positions: &[usize],
) -> Result<Vec<CellPartition>, PartitionError> {
    let domain = transform.domain();
    let sub_box = IndexBox::new(
        input_dims
            .iter()
            .map(|&d| *domain.interval(d))
            .collect::<Vec<_>>(),
    );
    let total = sub_box
        .intervals()
        .iter()
        .map(|i| i.size() as u128)
        .product::<u128>();
    if total > usize::MAX as u128 {
        return Err(PartitionError::TooManyCombinations);
    }

    let mut rows: Vec<(Vec<Index>, Vec<Index>)> = Vec::with_capacity(total as usize);
    for coords in sub_box.points() {
        let mut cells = Vec::with_capacity(grid_positions.len());
        for &position in grid_positions {
            let output = evaluate_set_output(
                transform,
                grid_output_dimensions[position],
                input_dims,
                &coords,
            )?;
            cells.push(grid.output_to_cell(position, output));
        }
        rows.push((cells, coords));
    }
    // Stable by construction: rows within one cell keep visit order.
    rows.sort_by(|a, b| a.0.cmp(&b.0));

    let mut partitions: Vec<CellPartition> = Vec::new();
    for (cells, coords) in rows {
        match partitions.last_mut() {
            Some(last) if last.cell_indices == cells => last.input_rows.extend(coords),
            _ => partitions.push(CellPartition {
                cell_indices: cells,
                input_rows: coords,
            }),
        }
    }
    Ok(partitions)
}

impl PartitionPlan {
    /// The grid output dimensions the plan was built for.
    pub fn grid_output_dimensions(&self) -> &[usize] {
        &self.grid_output_dimensions
    }

    /// The index-array connected sets, in scan order.
    pub fn index_array_sets(&self) -> &[IndexArraySet] {
        &self.index_array_sets
    }

    /// The strided connected sets, in scan order.
    pub fn strided_sets(&self) -> &[StridedSet] {
        &self.strided_sets
    }

    pub(crate) fn position_owner(&self, position: usize) -> Option<PositionOwner> {
        if let Some(&(_, cell)) = self
            .constant_cells
            .iter()
            .find(|&&(pos, _)| pos == position)
        {
            return Some(PositionOwner::Constant(cell));
        }
        if let Some(set) = self
            .strided_sets
            .iter()
            .position(|s| s.grid_dims.contains(&position))
        {
            return Some(PositionOwner::Strided { set });
        }
        if let Some(set) = self
            .index_array_sets
            .iter()
            .position(|s| s.grid_dims.contains(&position))
        {
            return Some(PositionOwner::IndexArray { set });
        }
        None
    }

    /// Invokes `callback(cell_indices, cell_transform)` for every grid
    /// cell intersecting the image of `transform`, which must be the
    /// transform the plan was built from. Index-array sets iterate
    /// outermost in lexicographic cell order; strided sets iterate
    /// innermost, walking their input dimension upward from its origin.
    /// The first callback error stops enumeration and is returned
    /// verbatim.
    pub fn for_each_cell<G: Grid>(
        &self,
        transform: &IndexTransform,
        grid: &G,
        mut callback: impl FnMut(&[Index], &IndexTransform) -> Result<(), PartitionError>,
    ) -> Result<(), PartitionError> {
        if transform.input_rank() != self.input_rank {
            return Err(PartitionError::InvalidDims {
                expected: self.input_rank,
                got: transform.input_rank(),
            });
        }
        if self.empty_domain {
            return Ok(());
        }
        let mut state = WalkState {
            cells: vec![0; self.grid_output_dimensions.len()],
            array_partitions: vec![0; self.index_array_sets.len()],
            strided_intervals: vec![IndexInterval::from_closed_clamped(0, -1); self.strided_sets.len()],
        };
        for &(position, cell) in &self.constant_cells {
            state.cells[position] = cell;
        }
        self.walk(transform, grid, 0, &mut state, &mut |state| {
            let cell_transform = self.build_cell_transform(transform, state)?;
            callback(&state.cells, &cell_transform)
        })
    }

    /// Like [`Self::for_each_cell`] but yields only the cell-index
    /// tuples, skipping cell-transform assembly.
    pub(crate) fn for_each_cell_index<G: Grid>(
        &self,
        transform: &IndexTransform,
        grid: &G,
        mut callback: impl FnMut(&[Index]) -> Result<(), PartitionError>,
    ) -> Result<(), PartitionError> {
        if transform.input_rank() != self.input_rank {
            return Err(PartitionError::InvalidDims {
                expected: self.input_rank,
                got: transform.input_rank(),
            });
        }
        if self.empty_domain {
            return Ok(());
        }
        let mut state = WalkState {
            cells: vec![0; self.grid_output_dimensions.len()],
            array_partitions: vec![0; self.index_array_sets.len()],
            strided_intervals: vec![IndexInterval::from_closed_clamped(0, -1); self.strided_sets.len()],
        };
        for &(position, cell) in &self.constant_cells {
            state.cells[position] = cell;
        }
        self.walk(transform, grid, 0, &mut state, &mut |state| {
            callback(&state.cells)
        })
    }

    fn walk<G: Grid>(
        &self,
        transform: &IndexTransform,
        grid: &G,
        set_index: usize,
        state: &mut WalkState,
        leaf: &mut dyn FnMut(&WalkState) -> Result<(), PartitionError>,
    ) -> Result<(), PartitionError> {
        let num_array_sets = self.index_array_sets.len();
        if set_index == num_array_sets + self.strided_sets.len() {
            return leaf(state);
        }
        if set_index < num_array_sets {
            let set = &self.index_array_sets[set_index];
            for p in 0..set.partitions.len() {
                state.array_partitions[set_index] = p;
                for (i, &position) in set.grid_dims.iter().enumerate() {
                    state.cells[position] = set.partitions[p].cell_indices[i];
                }
                self.walk(transform, grid, set_index + 1, state, leaf)?;
            }
            return Ok(());
        }

        let strided_index = set_index - num_array_sets;
        let set = &self.strided_sets[strided_index];
        let domain_interval = *transform.domain().interval(set.input_dim);
        let mut start = domain_interval.inclusive_min();
        let domain_end = domain_interval.exclusive_max();
        while start < domain_end {
            let mut end = domain_end;
            for (i, &position) in set.grid_dims.iter().enumerate() {
                let (offset, stride) = set.coefficients[i];
                let output = checked_affine(
                    offset,
                    stride,
                    start,
                    self.grid_output_dimensions[position],
                )?;
                let cell = grid.output_to_cell(position, output);
                state.cells[position] = cell;
                let preimage =
                    affine_preimage(offset, stride, &grid.cell_interval(position, cell));
                if !preimage.contains(start) {
                    return Err(internal("grid cell preimage does not cover its own point"));
                }
                end = end.min(preimage.exclusive_max());
            }
            state.strided_intervals[strided_index] =
                IndexInterval::from_closed_clamped(start as i128, end as i128 - 1);
            self.walk(transform, grid, set_index + 1, state, leaf)?;
            start = end;
        }
        Ok(())
    }

    /// Assembles the cell transform for the current cursor state: one
    /// synthetic input dimension per index-array set (in set order),
    /// then the retained original input dimensions in original order.
    /// Output dimension `j` reproduces original input dimension `j`.
    fn build_cell_transform(
        &self,
        transform: &IndexTransform,
        state: &WalkState,
    ) -> Result<IndexTransform, PartitionError> {
        let num_array_sets = self.index_array_sets.len();
        let mut intervals = Vec::with_capacity(num_array_sets + self.retained_input_dims.len());
        for (set_index, set) in self.index_array_sets.iter().enumerate() {
            let rows = set.num_rows(state.array_partitions[set_index]);
            intervals.push(
                IndexInterval::new(0, rows as Index)
                    .map_err(|_| internal("row count exceeds index range"))?,
            );
        }
        for &dim in &self.retained_input_dims {
            match self
                .strided_sets
                .iter()
                .position(|s| s.input_dim == dim)
            {
                Some(strided_index) => intervals.push(state.strided_intervals[strided_index]),
                None => intervals.push(*transform.domain().interval(dim)),
            }
        }

        let mut output = Vec::with_capacity(self.input_rank);
        for dim in 0..self.input_rank {
            match self.roles[dim] {
                InputDimRole::IndexArray { set, column } => {
                    let array_set = &self.index_array_sets[set];
                    let partition = &array_set.partitions[state.array_partitions[set]];
                    let width = array_set.input_dims.len();
                    let rows = partition.input_rows.len() / width;
                    let values = (0..rows)
                        .map(|r| partition.input_rows[r * width + column])
                        .collect::<Vec<_>>();
                    output.push(OutputIndexMap::IndexArray {
                        offset: 0,
                        stride: 1,
                        array: crate::array::IndexArray::from_values(values),
                        input_dims: vec![set],
                    });
                }
                InputDimRole::Retained { position } => {
                    output.push(OutputIndexMap::SingleInputDimension {
                        offset: 0,
                        stride: 1,
                        input_dim: position,
                    });
                }
            }
        }

        IndexTransform::new(IndexBox::new(intervals), output)
            .map_err(|e| internal(format!("cell transform construction failed: {}", e)))
    }

    /// Directly constructs the cell transform for one cell-index tuple,
    /// without enumerating. Returns `Ok(None)` when the tuple does not
    /// intersect the transform's image.
    pub fn cell_transform<G: Grid>(
        &self,
        transform: &IndexTransform,
        grid: &G,
        cell_indices: &[Index],
    ) -> Result<Option<IndexTransform>, PartitionError> {
        if cell_indices.len() != self.grid_output_dimensions.len() {
            return Err(PartitionError::InvalidDims {
                expected: self.grid_output_dimensions.len(),
                got: cell_indices.len(),
            });
        }
        if self.empty_domain {
            return Ok(None);
        }
        for &(position, cell) in &self.constant_cells {
            if cell_indices[position] != cell {
                return Ok(None);
            }
        }
        let mut state = WalkState {
            cells: cell_indices.to_vec(),
            array_partitions: vec![0; self.index_array_sets.len()],
            strided_intervals: vec![IndexInterval::from_closed_clamped(0, -1); self.strided_sets.len()],
        };
        for (set_index, set) in self.index_array_sets.iter().enumerate() {
            let target = set
                .grid_dims
                .iter()
                .map(|&position| cell_indices[position])
                .collect::<Vec<_>>();
            match set
                .partitions
                .binary_search_by(|p| p.cell_indices.as_slice().cmp(target.as_slice()))
            {
                Ok(p) => state.array_partitions[set_index] = p,
                Err(_) => return Ok(None),
            }
        }
        for (strided_index, set) in self.strided_sets.iter().enumerate() {
            let mut interval = *transform.domain().interval(set.input_dim);
            for (i, &position) in set.grid_dims.iter().enumerate() {
                let (offset, stride) = set.coefficients[i];
                let cell_interval = grid.cell_interval(position, cell_indices[position]);
                interval = interval.intersect(&affine_preimage(offset, stride, &cell_interval));
            }
            if interval.is_empty() {
                return Ok(None);
            }
            state.strided_intervals[strided_index] = interval;
        }
        Ok(Some(self.build_cell_transform(transform, &state)?))
    }
}

/// Enumerates the grid cells intersected by the image of `transform`
/// over the grid dimensions `grid_output_dimensions`, invoking
/// `callback(cell_indices, cell_transform)` once per cell. See
/// [`PartitionPlan::for_each_cell`] for ordering guarantees.
pub fn partition<G: Grid>(
    transform: &IndexTransform,
    grid_output_dimensions: &[usize],
    grid: &G,
    callback: impl FnMut(&[Index], &IndexTransform) -> Result<(), PartitionError>,
) -> Result<(), PartitionError> {
    let plan = pre_partition(transform, grid_output_dimensions, grid)?;
    plan.for_each_cell(transform, grid, callback)
}

/// Convenience over [`partition`] for a [`RegularGrid`] with the given
/// cell sizes.
///
/// [`RegularGrid`]: crate::RegularGrid
pub fn partition_regular(
    transform: &IndexTransform,
    grid_output_dimensions: &[usize],
    cell_shape: &[Index],
    callback: impl FnMut(&[Index], &IndexTransform) -> Result<(), PartitionError>,
) -> Result<(), PartitionError> {
    let grid = crate::grid::RegularGrid::new(cell_shape.to_vec())?;
    partition(transform, grid_output_dimensions, &grid, callback)
}
