/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

//! Oracle-backed property tests for the grid partitioner.
//!
//! The reference enumerator walks every point of a transform's input
//! domain, applies the transform, and buckets the points by the cell
//! tuple of their outputs. Partitioning the same transform must
//! reproduce those buckets exactly: every cell once (no duplication),
//! every pre-image reachable through its cell transform (coverage), and
//! nothing mapping outside its cell (confinement).

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use ndgrid::get_grid_cell_ranges;
use ndgrid::pre_partition;
use ndgrid::strategy::gen_transform_and_grid;
use ndgrid::Grid;
use ndgrid::Index;
use ndgrid::IndexBox;
use ndgrid::IndexTransform;
use ndgrid::RegularGrid;
use proptest::prelude::*;

/// Buckets every input point of the domain by the cell tuple its
/// outputs land in. All output dimensions are gridded, in order.
fn reference_cells(
    transform: &IndexTransform,
    grid: &RegularGrid,
) -> BTreeMap<Vec<Index>, BTreeSet<Vec<Index>>> {
    let mut buckets: BTreeMap<Vec<Index>, BTreeSet<Vec<Index>>> = BTreeMap::new();
    for point in transform.domain().points() {
        let outputs = transform.apply(&point).unwrap();
        let cells: Vec<Index> = outputs
            .iter()
            .enumerate()
            .map(|(position, &output)| grid.output_to_cell(position, output))
            .collect();
        buckets.entry(cells).or_default().insert(point);
    }
    buckets
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 256, ..ProptestConfig::default()
    })]

    #[test]
    fn partition_agrees_with_reference(
        (transform, grid) in gen_transform_and_grid(3, 3, 5)
    ) {
        let dims: Vec<usize> = (0..transform.output_rank()).collect();
        let expected = reference_cells(&transform, &grid);

        let plan = pre_partition(&transform, &dims, &grid).unwrap();
        let mut emitted: Vec<Vec<Index>> = Vec::new();
        let mut seen: BTreeMap<Vec<Index>, BTreeSet<Vec<Index>>> = BTreeMap::new();
        plan.for_each_cell(&transform, &grid, |cells, cell_transform| {
            emitted.push(cells.to_vec());

            // The direct lookup must reproduce the enumerator's cell
            // transform.
            let direct = plan
                .cell_transform(&transform, &grid, cells)
                .unwrap()
                .expect("emitted cell resolves directly");
            assert_eq!(&direct, cell_transform);

            let bucket = seen.entry(cells.to_vec()).or_default();
            for point in cell_transform.domain().points() {
                let original = cell_transform.apply(&point).unwrap();
                assert!(
                    bucket.insert(original),
                    "cell transform repeats a pre-image"
                );
            }
            Ok(())
        })
        .unwrap();

        // No cell tuple is emitted twice.
        let unique: BTreeSet<_> = emitted.iter().cloned().collect();
        prop_assert_eq!(unique.len(), emitted.len());

        // Coverage and confinement: the pre-images grouped per cell
        // equal the reference buckets exactly.
        prop_assert_eq!(seen, expected);
    }

    #[test]
    fn pre_partition_is_idempotent(
        (transform, grid) in gen_transform_and_grid(3, 3, 5)
    ) {
        let dims: Vec<usize> = (0..transform.output_rank()).collect();
        let a = pre_partition(&transform, &dims, &grid).unwrap();
        let b = pre_partition(&transform, &dims, &grid).unwrap();
        prop_assert_eq!(a, b);
    }

    #[test]
    fn ranges_cover_exactly_the_partitioned_cells(
        (transform, grid) in gen_transform_and_grid(3, 3, 5)
    ) {
        let rank = transform.output_rank();
        let dims: Vec<usize> = (0..rank).collect();
        let cells: BTreeSet<Vec<Index>> =
            reference_cells(&transform, &grid).into_keys().collect();

        // Two bounds: the hull of every reachable cell (no clipping),
        // and a fixed window (exercises clipping).
        let hull = if cells.is_empty() {
            IndexBox::from_origin_and_shape(vec![0; rank], vec![0; rank]).unwrap()
        } else {
            IndexBox::from_origin_and_shape(
                (0..rank)
                    .map(|d| cells.iter().map(|c| c[d]).min().unwrap())
                    .collect(),
                (0..rank)
                    .map(|d| {
                        let min = cells.iter().map(|c| c[d]).min().unwrap();
                        let max = cells.iter().map(|c| c[d]).max().unwrap();
                        max - min + 1
                    })
                    .collect(),
            )
            .unwrap()
        };
        let window = IndexBox::from_origin_and_shape(vec![-1; rank], vec![4; rank]).unwrap();

        for bounds in [hull, window] {
            let mut covered: BTreeSet<Vec<Index>> = BTreeSet::new();
            get_grid_cell_ranges(&transform, &dims, &bounds, &grid, |cell_box| {
                for point in cell_box.points() {
                    assert!(covered.insert(point), "overlapping range boxes");
                }
                Ok(())
            })
            .unwrap();

            let expected: BTreeSet<Vec<Index>> = cells
                .iter()
                .filter(|c| bounds.contains(c))
                .cloned()
                .collect();
            prop_assert_eq!(covered, expected, "bounds = {}", bounds);
        }
    }
}
