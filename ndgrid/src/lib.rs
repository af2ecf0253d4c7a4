/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Grid partitioning of index transforms.
//!
//! An [`IndexTransform`] maps an n-dimensional integer input box to an
//! m-dimensional output space through per-dimension output maps
//! (constant, affine in one input dimension, or driven by an index
//! array). A [`Grid`] partitions selected output dimensions into
//! cells. This crate enumerates the grid cells intersected by a
//! transform's image and, for each cell, produces a restricted *cell
//! transform* whose image lies entirely within that cell:
//!
//! ```
//! use ndgrid::{partition_regular, IndexTransformBuilder};
//!
//! let transform = IndexTransformBuilder::new(1, 1)
//!     .input_origin(vec![-4])
//!     .input_shape(vec![5])
//!     .output_identity()
//!     .build()
//!     .unwrap();
//! let mut cells = Vec::new();
//! partition_regular(&transform, &[0], &[2], |cell_indices, cell_transform| {
//!     cells.push((cell_indices.to_vec(), cell_transform.domain().clone()));
//!     Ok(())
//! })
//! .unwrap();
//! assert_eq!(cells.len(), 3);
//! assert_eq!(cells[0].0, vec![-2]);
//! ```
//!
//! The analysis and enumeration phases are split: [`pre_partition`]
//! builds an immutable [`PartitionPlan`] which can be walked any number
//! of times. [`get_grid_cell_ranges`] is an alternative enumeration
//! that coalesces cells into rectangular runs for bulk consumers.

mod array;
mod grid;
mod interval;
mod partition;
mod range;
mod transform;

pub use array::ArrayError;
pub use array::IndexArray;
pub use grid::Grid;
pub use grid::GridError;
pub use grid::IrregularGrid;
pub use grid::RegularGrid;
pub use interval::Index;
pub use interval::IndexBox;
pub use interval::IndexInterval;
pub use interval::IntervalError;
pub use interval::INF_INDEX;
pub use interval::MAX_FINITE_INDEX;
pub use interval::MIN_FINITE_INDEX;
pub use partition::partition;
pub use partition::partition_regular;
pub use partition::pre_partition;
pub use partition::IndexArraySet;
pub use partition::PartitionError;
pub use partition::PartitionPlan;
pub use partition::StridedSet;
pub use range::get_grid_cell_ranges;
pub use transform::IndexTransform;
pub use transform::IndexTransformBuilder;
pub use transform::OutputIndexMap;
pub use transform::TransformError;

/// Property-based generators for randomized test input.
pub mod strategy;
