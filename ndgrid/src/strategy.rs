/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Property-based generators for transforms and grids.
//!
//! These strategies are used in `proptest`-based tests to construct
//! randomized [`IndexTransform`]s mixing all three output map kinds,
//! together with [`RegularGrid`]s to partition them over. Domains are
//! kept small so that oracle tests can afford to visit every input
//! point.
//!
//! Example usage:
//!
//! ```
//! use proptest::prelude::*;
//!
//! use ndgrid::strategy::gen_transform_and_grid;
//!
//! proptest! {
//!     #[test]
//!     fn test_transform(
//!         (transform, grid) in gen_transform_and_grid(3, 3, 5)
//!     ) {
//!         // Use `transform` and `grid` as partition inputs
//!     }
//! }
//! ```

use proptest::prelude::*;

use crate::array::IndexArray;
use crate::grid::RegularGrid;
use crate::interval::Index;
use crate::interval::IndexBox;
use crate::transform::IndexTransform;
use crate::transform::OutputIndexMap;

/// Generates an input box with `1..=max_rank` dimensions, origins in
/// `[-6, 6]`, and sizes in `[0, max_size]` (empty domains included).
pub fn gen_domain(max_rank: usize, max_size: Index) -> impl Strategy<Value = IndexBox> {
    prop::collection::vec((-6i64..=6, 0i64..=max_size), 1..=max_rank).prop_map(|dims| {
        let (origin, shape): (Vec<_>, Vec<_>) = dims.into_iter().unzip();
        IndexBox::from_origin_and_shape(origin, shape).expect("small extents are valid")
    })
}

/// Generates one output map over the given domain: constant, affine in
/// a random input dimension, or an index array spanning a random input
/// dimension.
fn gen_output_map(domain: IndexBox) -> impl Strategy<Value = OutputIndexMap> {
    let input_rank = domain.rank();
    let constant = (-20i64..=20).prop_map(|value| OutputIndexMap::Constant { value });
    let single = (
        -10i64..=10,
        prop_oneof![Just(-3i64), Just(-2), Just(-1), Just(1), Just(2), Just(3)],
        0..input_rank,
    )
        .prop_map(
            |(offset, stride, input_dim)| OutputIndexMap::SingleInputDimension {
                offset,
                stride,
                input_dim,
            },
        );
    let array = (0..input_rank, -10i64..=10, prop_oneof![Just(-2i64), Just(-1), Just(1), Just(2)])
        .prop_flat_map(move |(input_dim, offset, stride)| {
            let interval = *domain.interval(input_dim);
            prop::collection::vec(-20i64..=20, interval.size() as usize).prop_map(
                move |values| {
                    let array = IndexArray::new(
                        vec![interval.inclusive_min()],
                        vec![interval.size()],
                        values,
                    )
                    .expect("shape matches value count");
                    OutputIndexMap::IndexArray {
                        offset,
                        stride,
                        array,
                        input_dims: vec![input_dim],
                    }
                },
            )
        });
    prop_oneof![
        2 => constant,
        4 => single,
        3 => array,
    ]
}

/// Generates a transform over a random domain with `1..=max_output_rank`
/// output dimensions mixing all map kinds.
pub fn gen_transform(
    max_input_rank: usize,
    max_output_rank: usize,
    max_size: Index,
) -> impl Strategy<Value = IndexTransform> {
    gen_domain(max_input_rank, max_size).prop_flat_map(move |domain| {
        prop::collection::vec(gen_output_map(domain.clone()), 1..=max_output_rank).prop_map(
            move |output| {
                IndexTransform::new(domain.clone(), output)
                    .expect("generated maps stay within checked ranges")
            },
        )
    })
}

/// Generates a regular grid with one cell size in `[1, 4]` per grid
/// dimension.
pub fn gen_regular_grid(rank: usize) -> impl Strategy<Value = RegularGrid> {
    prop::collection::vec(1i64..=4, rank)
        .prop_map(|cell_shape| RegularGrid::new(cell_shape).expect("positive cell sizes"))
}

/// Generates a transform together with a grid sized for partitioning
/// all of its output dimensions.
pub fn gen_transform_and_grid(
    max_input_rank: usize,
    max_output_rank: usize,
    max_size: Index,
) -> impl Strategy<Value = (IndexTransform, RegularGrid)> {
    gen_transform(max_input_rank, max_output_rank, max_size).prop_flat_map(|transform| {
        let rank = transform.output_rank();
        gen_regular_grid(rank).prop_map(move |grid| (transform.clone(), grid))
    })
}

#[cfg(test)]
mod tests {
    use proptest::strategy::ValueTree;
    use proptest::test_runner::Config;
    use proptest::test_runner::TestRunner;

    use super::*;

    #[test]
    fn generated_transforms_are_valid() {
        let mut runner = TestRunner::new(Config::default());
        for _ in 0..64 {
            let (transform, grid) = gen_transform_and_grid(3, 3, 5)
                .new_tree(&mut runner)
                .unwrap()
                .current();
            assert!(transform.output_rank() >= 1);
            assert_eq!(grid.cell_shape().len(), transform.output_rank());
            // Every domain point must evaluate cleanly.
            for point in transform.domain().points() {
                transform.apply(&point).unwrap();
            }
        }
    }

    proptest! {
        #[test]
        fn domains_stay_small((transform, _grid) in gen_transform_and_grid(3, 3, 5)) {
            let total: i64 = transform.domain().shape().iter().product();
            prop_assert!(total <= 125);
        }
    }
}
