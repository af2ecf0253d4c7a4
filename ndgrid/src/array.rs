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

/// The type of error for index-array operations.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum ArrayError {
    #[error("invalid dims: expected {expected}, got {got}")]
    InvalidDims { expected: usize, got: usize },

    #[error("negative extent {size} in dimension {dim}")]
    NegativeExtent { dim: usize, size: Index },

    #[error("shape {shape:?} does not match {len} stored values")]
    ShapeDataMismatch { shape: Vec<Index>, len: usize },

    #[error("index {index} out of bounds for dimension {dim} of extent [{origin}, {origin}+{size})")]
    IndexOutOfBounds {
        dim: usize,
        index: Index,
        origin: Index,
        size: Index,
    },
}

/// A multidimensional array of [`Index`] values with an origin and a
/// per-dimension shape, stored in row-major order.
///
/// A dimension of size 1 is a broadcast dimension: lookups along it
/// ignore the supplied coordinate. This is how a lower-rank payload is
/// applied across a larger domain.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IndexArray {
    origin: Vec<Index>,
    shape: Vec<Index>,
    data: Vec<Index>,
}

impl IndexArray {
    /// Creates an array from its origin, shape, and row-major values.
    pub fn new(
        origin: Vec<Index>,
        shape: Vec<Index>,
        data: Vec<Index>,
    ) -> Result<Self, ArrayError> {
        if origin.len() != shape.len() {
            return Err(ArrayError::InvalidDims {
                expected: origin.len(),
                got: shape.len(),
            });
        }
        let mut expected: u128 = 1;
        for (dim, &size) in shape.iter().enumerate() {
            if size < 0 {
                return Err(ArrayError::NegativeExtent { dim, size });
            }
            expected = expected.saturating_mul(size as u128);
        }
        if expected != data.len() as u128 {
            return Err(ArrayError::ShapeDataMismatch {
                shape,
                len: data.len(),
            });
        }
        Ok(IndexArray {
            origin,
            shape,
            data,
        })
    }

    /// Creates a rank-1 array with origin 0 from a list of values.
    pub fn from_values(values: Vec<Index>) -> Self {
        IndexArray {
            origin: vec![0],
            shape: vec![values.len() as Index],
            data: values,
        }
    }

    /// The rank of the array.
    pub fn rank(&self) -> usize {
        self.origin.len()
    }

    /// The per-dimension lower bounds.
    pub fn origin(&self) -> &[Index] {
        &self.origin
    }

    /// The per-dimension sizes.
    pub fn shape(&self) -> &[Index] {
        &self.shape
    }

    /// The stored values, in row-major order.
    pub fn values(&self) -> &[Index] {
        &self.data
    }

    /// The value at `point`, honoring broadcast dimensions.
    ///
    /// Coordinates of size-1 dimensions are ignored; all other
    /// coordinates are bounds-checked against `[origin, origin+size)`.
    pub fn get(&self, point: &[Index]) -> Result<Index, ArrayError> {
        if point.len() != self.rank() {
            return Err(ArrayError::InvalidDims {
                expected: self.rank(),
                got: point.len(),
            });
        }
        let mut flat: usize = 0;
        for (dim, &x) in point.iter().enumerate() {
            let size = self.shape[dim];
            let pos = if size == 1 {
                0
            } else {
                let origin = self.origin[dim];
                let rel = x as i128 - origin as i128;
                if rel < 0 || rel >= size as i128 {
                    return Err(ArrayError::IndexOutOfBounds {
                        dim,
                        index: x,
                        origin,
                        size,
                    });
                }
                rel as usize
            };
            flat = flat * size as usize + pos;
        }
        Ok(self.data[flat])
    }

    /// The minimum and maximum stored value, or `None` for an array
    /// with no elements.
    pub fn value_range(&self) -> Option<(Index, Index)> {
        let mut iter = self.data.iter();
        let first = *iter.next()?;
        let (mut min, mut max) = (first, first);
        for &v in iter {
            min = min.min(v);
            max = max.max(v);
        }
        Some((min, max))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rank1_lookup() {
        let a = IndexArray::new(vec![100], vec![4], vec![7, 8, 9, 10]).unwrap();
        assert_eq!(a.get(&[100]).unwrap(), 7);
        assert_eq!(a.get(&[103]).unwrap(), 10);
        assert!(matches!(
            a.get(&[104]),
            Err(ArrayError::IndexOutOfBounds { dim: 0, index: 104, .. })
        ));
    }

    #[test]
    fn test_rank2_row_major() {
        let a = IndexArray::new(vec![0, 0], vec![2, 3], vec![1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(a.get(&[0, 0]).unwrap(), 1);
        assert_eq!(a.get(&[0, 2]).unwrap(), 3);
        assert_eq!(a.get(&[1, 0]).unwrap(), 4);
        assert_eq!(a.get(&[1, 2]).unwrap(), 6);
    }

    #[test]
    fn test_broadcast_dimension() {
        // Shape [2, 1]: the second coordinate is ignored.
        let a = IndexArray::new(vec![0, 0], vec![2, 1], vec![101, 102]).unwrap();
        assert_eq!(a.get(&[0, 55]).unwrap(), 101);
        assert_eq!(a.get(&[1, -55]).unwrap(), 102);
    }

    #[test]
    fn test_shape_data_mismatch() {
        assert!(matches!(
            IndexArray::new(vec![0], vec![3], vec![1, 2]),
            Err(ArrayError::ShapeDataMismatch { .. })
        ));
        assert!(matches!(
            IndexArray::new(vec![0, 0], vec![2], vec![1, 2]),
            Err(ArrayError::InvalidDims { .. })
        ));
    }

    #[test]
    fn test_value_range() {
        let a = IndexArray::from_values(vec![10, 3, 4, -5, -6, 11]);
        assert_eq!(a.value_range(), Some((-6, 11)));
        assert_eq!(IndexArray::from_values(vec![]).value_range(), None);
    }
}
