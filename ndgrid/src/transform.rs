/*
 * Copyright (c) Meta Platforms, Inc. and affiliates.
 * All rights reserved.
 *
 * This source code is licensed under the BSD-style license found in the
 * LICENSE file in the root directory of this source tree.
 */

use serde::Deserialize;
use serde::Serialize;

use crate::array::ArrayError;
use crate::array::IndexArray;
use crate::interval::Index;
use crate::interval::IndexBox;
use crate::interval::IntervalError;
use crate::interval::MAX_FINITE_INDEX;
use crate::interval::MIN_FINITE_INDEX;

/// The type of error for transform construction and evaluation.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum TransformError {
    #[error("invalid dims: expected {expected}, got {got}")]
    InvalidDims { expected: usize, got: usize },

    #[error("input dimension {input_dim} out of range for input rank {input_rank}")]
    InputDimOutOfRange { input_dim: usize, input_rank: usize },

    #[error("zero stride for output dimension {output_dim}")]
    ZeroStride { output_dim: usize },

    #[error("duplicate input dimension {input_dim} for output dimension {output_dim}")]
    DuplicateInputDim { output_dim: usize, input_dim: usize },

    #[error(
        "index array for output dimension {output_dim} does not span input dimension {input_dim}"
    )]
    ArrayShapeMismatch { output_dim: usize, input_dim: usize },

    #[error("output dimension {output_dim} overflows the representable index range")]
    OutOfRange { output_dim: usize },

    #[error("input point {point:?} outside the transform domain")]
    PointOutsideDomain { point: Vec<Index> },

    #[error(transparent)]
    Array(#[from] ArrayError),

    #[error(transparent)]
    Interval(#[from] IntervalError),
}

/// The rule producing one output coordinate of an [`IndexTransform`].
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Debug)]
pub enum OutputIndexMap {
    /// `output = value`, regardless of input.
    Constant { value: Index },

    /// `output = offset + stride * input[input_dim]`.
    SingleInputDimension {
        offset: Index,
        stride: Index,
        input_dim: usize,
    },

    /// `output = offset + stride * array[project(input, input_dims)]`.
    ///
    /// The array has one dimension per entry of `input_dims`; each
    /// array dimension either spans the corresponding input dimension
    /// of the domain or broadcasts across it (size 1).
    IndexArray {
        offset: Index,
        stride: Index,
        array: IndexArray,
        input_dims: Vec<usize>,
    },
}

pub(crate) fn checked_affine(
    offset: Index,
    stride: Index,
    x: Index,
    output_dim: usize,
) -> Result<Index, TransformError> {
    let v = offset as i128 + stride as i128 * x as i128;
    if v < MIN_FINITE_INDEX as i128 || v > MAX_FINITE_INDEX as i128 {
        return Err(TransformError::OutOfRange { output_dim });
    }
    Ok(v as Index)
}

/// A map from an n-dimensional integer input box to an m-dimensional
/// integer output space, one [`OutputIndexMap`] per output dimension.
///
/// Construction validates that every output map evaluates without
/// overflow over the whole input box, so evaluation never wraps.
#[derive(Serialize, Deserialize, Clone, Eq, PartialEq, Hash, Debug)]
pub struct IndexTransform {
    domain: IndexBox,
    output: Vec<OutputIndexMap>,
}

impl IndexTransform {
    /// Creates a transform from its input domain and output maps.
    pub fn new(domain: IndexBox, output: Vec<OutputIndexMap>) -> Result<Self, TransformError> {
        let input_rank = domain.rank();
        let domain_empty = domain.is_empty();
        for (output_dim, map) in output.iter().enumerate() {
            match map {
                OutputIndexMap::Constant { value } => {
                    if *value < MIN_FINITE_INDEX || *value > MAX_FINITE_INDEX {
                        return Err(TransformError::OutOfRange { output_dim });
                    }
                }
                OutputIndexMap::SingleInputDimension {
                    offset,
                    stride,
                    input_dim,
                } => {
                    if *input_dim >= input_rank {
                        return Err(TransformError::InputDimOutOfRange {
                            input_dim: *input_dim,
                            input_rank,
                        });
                    }
                    if *stride == 0 {
                        return Err(TransformError::ZeroStride { output_dim });
                    }
                    let interval = domain.interval(*input_dim);
                    if !interval.is_empty() {
                        checked_affine(*offset, *stride, interval.inclusive_min(), output_dim)?;
                        checked_affine(*offset, *stride, interval.exclusive_max() - 1, output_dim)?;
                    }
                }
                OutputIndexMap::IndexArray {
                    offset,
                    stride,
                    array,
                    input_dims,
                } => {
                    if input_dims.len() != array.rank() {
                        return Err(TransformError::InvalidDims {
                            expected: array.rank(),
                            got: input_dims.len(),
                        });
                    }
                    for (pos, &input_dim) in input_dims.iter().enumerate() {
                        if input_dim >= input_rank {
                            return Err(TransformError::InputDimOutOfRange {
                                input_dim,
                                input_rank,
                            });
                        }
                        if input_dims[..pos].contains(&input_dim) {
                            return Err(TransformError::DuplicateInputDim {
                                output_dim,
                                input_dim,
                            });
                        }
                        let interval = domain.interval(input_dim);
                        let spans = array.origin()[pos] == interval.inclusive_min()
                            && array.shape()[pos] == interval.size();
                        if array.shape()[pos] != 1 && !spans {
                            return Err(TransformError::ArrayShapeMismatch {
                                output_dim,
                                input_dim,
                            });
                        }
                    }
                    if !domain_empty {
                        if let Some((min, max)) = array.value_range() {
                            checked_affine(*offset, *stride, min, output_dim)?;
                            checked_affine(*offset, *stride, max, output_dim)?;
                        }
                    }
                }
            }
        }
        Ok(IndexTransform { domain, output })
    }

    /// The identity transform over `domain`.
    pub fn identity(domain: IndexBox) -> Self {
        let output = (0..domain.rank())
            .map(|input_dim| OutputIndexMap::SingleInputDimension {
                offset: 0,
                stride: 1,
                input_dim,
            })
            .collect();
        IndexTransform { domain, output }
    }

    /// The rank of the input domain.
    pub fn input_rank(&self) -> usize {
        self.domain.rank()
    }

    /// The number of output dimensions.
    pub fn output_rank(&self) -> usize {
        self.output.len()
    }

    /// The input domain.
    pub fn domain(&self) -> &IndexBox {
        &self.domain
    }

    /// All output maps, indexed by output dimension.
    pub fn output_maps(&self) -> &[OutputIndexMap] {
        &self.output
    }

    /// The output map of dimension `output_dim`.
    pub fn output_map(&self, output_dim: usize) -> &OutputIndexMap {
        &self.output[output_dim]
    }

    /// Evaluates the transform at one input point, yielding one output
    /// coordinate per output map.
    pub fn apply(&self, point: &[Index]) -> Result<Vec<Index>, TransformError> {
        if point.len() != self.input_rank() {
            return Err(TransformError::InvalidDims {
                expected: self.input_rank(),
                got: point.len(),
            });
        }
        if !self.domain.contains(point) {
            return Err(TransformError::PointOutsideDomain {
                point: point.to_vec(),
            });
        }
        let mut result = Vec::with_capacity(self.output.len());
        for (output_dim, map) in self.output.iter().enumerate() {
            let value = match map {
                OutputIndexMap::Constant { value } => *value,
                OutputIndexMap::SingleInputDimension {
                    offset,
                    stride,
                    input_dim,
                } => checked_affine(*offset, *stride, point[*input_dim], output_dim)?,
                OutputIndexMap::IndexArray {
                    offset,
                    stride,
                    array,
                    input_dims,
                } => {
                    let projected: Vec<Index> =
                        input_dims.iter().map(|&d| point[d]).collect();
                    checked_affine(*offset, *stride, array.get(&projected)?, output_dim)?
                }
            };
            result.push(value);
        }
        Ok(result)
    }
}

impl std::fmt::Display for IndexTransform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Incremental construction of an [`IndexTransform`].
///
/// Unset output maps default to `Constant { value: 0 }`.
///
/// ```
/// # use ndgrid::IndexTransformBuilder;
/// let transform = IndexTransformBuilder::new(1, 2)
///     .input_origin(vec![-4])
///     .input_shape(vec![6])
///     .output_single_input_dimension(0, 5, 3, 0)
///     .output_single_input_dimension(1, 7, -2, 0)
///     .build()
///     .unwrap();
/// assert_eq!(transform.apply(&[-4]).unwrap(), vec![-7, 15]);
/// ```
#[derive(Debug, Clone)]
pub struct IndexTransformBuilder {
    input_rank: usize,
    input_origin: Option<Vec<Index>>,
    input_shape: Option<Vec<Index>>,
    output: Vec<Option<OutputIndexMap>>,
}

impl IndexTransformBuilder {
    /// Starts a builder for a transform of the given input and output
    /// ranks.
    pub fn new(input_rank: usize, output_rank: usize) -> Self {
        IndexTransformBuilder {
            input_rank,
            input_origin: None,
            input_shape: None,
            output: vec![None; output_rank],
        }
    }

    /// Sets the per-dimension lower bounds of the input domain
    /// (default: all zeros).
    pub fn input_origin(mut self, origin: Vec<Index>) -> Self {
        self.input_origin = Some(origin);
        self
    }

    /// Sets the per-dimension sizes of the input domain (default: all
    /// zeros).
    pub fn input_shape(mut self, shape: Vec<Index>) -> Self {
        self.input_shape = Some(shape);
        self
    }

    /// Sets the input domain from a box.
    pub fn input_box(mut self, domain: &IndexBox) -> Self {
        self.input_origin = Some(domain.origin());
        self.input_shape = Some(domain.shape());
        self
    }

    /// Maps output dimension `output_dim` to the constant `value`.
    pub fn output_constant(mut self, output_dim: usize, value: Index) -> Self {
        self.output[output_dim] = Some(OutputIndexMap::Constant { value });
        self
    }

    /// Maps output dimension `output_dim` to
    /// `offset + stride * input[input_dim]`.
    pub fn output_single_input_dimension(
        mut self,
        output_dim: usize,
        offset: Index,
        stride: Index,
        input_dim: usize,
    ) -> Self {
        self.output[output_dim] = Some(OutputIndexMap::SingleInputDimension {
            offset,
            stride,
            input_dim,
        });
        self
    }

    /// Maps output dimension `output_dim` to
    /// `offset + stride * array[project(input, input_dims)]`.
    pub fn output_index_array(
        mut self,
        output_dim: usize,
        offset: Index,
        stride: Index,
        array: IndexArray,
        input_dims: Vec<usize>,
    ) -> Self {
        self.output[output_dim] = Some(OutputIndexMap::IndexArray {
            offset,
            stride,
            array,
            input_dims,
        });
        self
    }

    /// Maps every output dimension `j` to input dimension `j` with
    /// offset 0 and stride 1.
    pub fn output_identity(mut self) -> Self {
        for (j, slot) in self.output.iter_mut().enumerate() {
            *slot = Some(OutputIndexMap::SingleInputDimension {
                offset: 0,
                stride: 1,
                input_dim: j,
            });
        }
        self
    }

    /// Validates and builds the transform.
    pub fn build(self) -> Result<IndexTransform, TransformError> {
        let origin = self
            .input_origin
            .unwrap_or_else(|| vec![0; self.input_rank]);
        let shape = self.input_shape.unwrap_or_else(|| vec![0; self.input_rank]);
        if origin.len() != self.input_rank {
            return Err(TransformError::InvalidDims {
                expected: self.input_rank,
                got: origin.len(),
            });
        }
        if shape.len() != self.input_rank {
            return Err(TransformError::InvalidDims {
                expected: self.input_rank,
                got: shape.len(),
            });
        }
        let domain = IndexBox::from_origin_and_shape(origin, shape)?;
        let output = self
            .output
            .into_iter()
            .map(|slot| slot.unwrap_or(OutputIndexMap::Constant { value: 0 }))
            .collect();
        IndexTransform::new(domain, output)
    }
}
