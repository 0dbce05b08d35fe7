use std::fmt;

use crate::constants::{MAX_RANK, MAX_TENSOR_ELEMENTS};
use crate::error::{PackError, Result};

/// Ordered list of positive dimension sizes. The empty shape is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Builds a shape, rejecting zero-sized dimensions and anything the record format cannot
    /// hold: more than [`MAX_RANK`] dimensions or more than [`MAX_TENSOR_ELEMENTS`] elements.
    pub fn new(dims: impl Into<Vec<usize>>) -> Result<Self> {
        let dims = dims.into();
        if dims.len() > MAX_RANK as usize {
            return Err(PackError::InvalidShape {
                reason: format!("rank {} exceeds the limit of {MAX_RANK}", dims.len()).into(),
            });
        }
        if dims.iter().any(|dim| *dim == 0) {
            return Err(PackError::InvalidShape {
                reason: format!("dimensions must be positive, got {dims:?}").into(),
            });
        }
        match checked_product(&dims) {
            Some(count) if count as u64 <= MAX_TENSOR_ELEMENTS => Ok(Self(dims)),
            _ => Err(PackError::InvalidShape {
                reason: format!("{dims:?} holds more than {MAX_TENSOR_ELEMENTS} elements").into(),
            }),
        }
    }

    #[must_use]
    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    #[must_use]
    pub fn rank(&self) -> usize {
        self.0.len()
    }

    /// Product of the dimensions; validated at construction so it never overflows.
    #[must_use]
    pub fn num_elements(&self) -> usize {
        self.0.iter().product()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (idx, dim) in self.0.iter().enumerate() {
            if idx > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{dim}")?;
        }
        f.write_str("]")
    }
}

impl TryFrom<&[usize]> for Shape {
    type Error = PackError;

    fn try_from(dims: &[usize]) -> Result<Self> {
        Self::new(dims.to_vec())
    }
}

pub(crate) fn checked_product(dims: &[usize]) -> Option<usize> {
    dims.iter().try_fold(1usize, |acc, dim| acc.checked_mul(*dim))
}

/// Dense `f32` tensor stored row-major over its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    shape: Shape,
    values: Vec<f32>,
}

impl Tensor {
    /// Pairs a shape with its values; the value count must equal the shape's element count.
    pub fn new(shape: Shape, values: Vec<f32>) -> Result<Self> {
        if values.len() != shape.num_elements() {
            return Err(PackError::InvalidShape {
                reason: format!(
                    "shape {shape} holds {} elements but {} values were given",
                    shape.num_elements(),
                    values.len()
                )
                .into(),
            });
        }
        Ok(Self { shape, values })
    }

    #[must_use]
    pub fn zeros(shape: Shape) -> Self {
        let values = vec![0.0; shape.num_elements()];
        Self { shape, values }
    }

    #[must_use]
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Replaces the values, keeping the shape.
    pub fn set_values(&mut self, values: Vec<f32>) -> Result<()> {
        if values.len() != self.shape.num_elements() {
            return Err(PackError::InvalidShape {
                reason: format!(
                    "shape {} holds {} elements but {} values were given",
                    self.shape,
                    self.shape.num_elements(),
                    values.len()
                )
                .into(),
            });
        }
        self.values = values;
        Ok(())
    }

    #[must_use]
    pub fn into_parts(self) -> (Shape, Vec<f32>) {
        (self.shape, self.values)
    }
}
