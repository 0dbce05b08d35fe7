use crate::error::Result;

use super::tensor::{Shape, Tensor};

/// A single named dense tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    name: String,
    tensor: Tensor,
}

impl Parameter {
    pub fn new(name: impl Into<String>, tensor: Tensor) -> Self {
        Self {
            name: name.into(),
            tensor,
        }
    }

    pub fn zeros(name: impl Into<String>, shape: Shape) -> Self {
        Self::new(name, Tensor::zeros(shape))
    }

    /// Convenience constructor validating `values` against `dims`.
    pub fn from_values(name: impl Into<String>, dims: &[usize], values: Vec<f32>) -> Result<Self> {
        let tensor = Tensor::new(Shape::try_from(dims)?, values)?;
        Ok(Self::new(name, tensor))
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn shape(&self) -> &Shape {
        self.tensor.shape()
    }

    #[must_use]
    pub fn values(&self) -> &[f32] {
        self.tensor.values()
    }

    #[must_use]
    pub fn tensor(&self) -> &Tensor {
        &self.tensor
    }

    pub fn tensor_mut(&mut self) -> &mut Tensor {
        &mut self.tensor
    }
}

/// Embedding table: `N` rows addressed by integer index, each with its own shape.
#[derive(Debug, Clone, PartialEq)]
pub struct LookupParameter {
    name: String,
    rows: Vec<Tensor>,
}

impl LookupParameter {
    pub fn new(name: impl Into<String>, rows: Vec<Tensor>) -> Self {
        Self {
            name: name.into(),
            rows,
        }
    }

    /// Table of `count` zero rows sharing `row_shape`.
    pub fn zeros(name: impl Into<String>, count: usize, row_shape: &Shape) -> Self {
        let rows = (0..count).map(|_| Tensor::zeros(row_shape.clone())).collect();
        Self::new(name, rows)
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[must_use]
    pub fn rows(&self) -> &[Tensor] {
        &self.rows
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub(crate) fn rows_mut(&mut self) -> &mut [Tensor] {
        &mut self.rows
    }
}
