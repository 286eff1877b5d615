//! Shaped storage with data and gradient views

use crate::error::{Error, Result};
use ndarray::Array1;

/// Row-major `f32` storage with a companion gradient buffer of equal size.
///
/// Elements are addressed as `outer × axis × inner`, where `outer` is the
/// product of the dimensions before an axis and `inner` the product of the
/// dimensions after it.
#[derive(Debug, Clone, PartialEq)]
pub struct Blob {
    shape: Vec<usize>,
    data: Array1<f32>,
    diff: Array1<f32>,
}

impl Blob {
    /// Create a zero-filled blob
    pub fn zeros(shape: &[usize]) -> Self {
        let count: usize = shape.iter().product();
        Self {
            shape: shape.to_vec(),
            data: Array1::zeros(count),
            diff: Array1::zeros(count),
        }
    }

    /// Create a blob from row-major values
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidShape`] if `values.len()` does not match the
    /// product of `shape`.
    pub fn from_shape_vec(shape: &[usize], values: Vec<f32>) -> Result<Self> {
        let count: usize = shape.iter().product();
        if count != values.len() {
            return Err(Error::InvalidShape {
                shape: shape.to_vec(),
                len: values.len(),
            });
        }
        Ok(Self {
            shape: shape.to_vec(),
            data: Array1::from(values),
            diff: Array1::zeros(count),
        })
    }

    /// Resize to `shape`; buffers are reallocated only when the element count changes
    pub fn reshape(&mut self, shape: &[usize]) {
        let count: usize = shape.iter().product();
        if count != self.data.len() {
            self.data = Array1::zeros(count);
            self.diff = Array1::zeros(count);
        }
        self.shape = shape.to_vec();
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Size of dimension `axis`
    pub fn shape_at(&self, axis: usize) -> usize {
        self.shape[axis]
    }

    pub fn num_axes(&self) -> usize {
        self.shape.len()
    }

    /// Total number of elements
    pub fn count(&self) -> usize {
        self.data.len()
    }

    /// Product of dimensions in `[start, end)`
    pub fn count_range(&self, start: usize, end: usize) -> usize {
        self.shape[start..end].iter().product()
    }

    /// Product of dimensions from `start` to the last axis
    pub fn count_from(&self, start: usize) -> usize {
        self.count_range(start, self.shape.len())
    }

    /// Resolve a possibly negative axis index (`-1` is the last axis)
    pub fn canonical_axis_index(&self, axis: i32) -> Result<usize> {
        let num_axes = self.shape.len();
        let resolved = if axis < 0 {
            axis + num_axes as i32
        } else {
            axis
        };
        if resolved < 0 || resolved as usize >= num_axes {
            return Err(Error::AxisOutOfRange { axis, num_axes });
        }
        Ok(resolved as usize)
    }

    pub fn data(&self) -> &Array1<f32> {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Array1<f32> {
        &mut self.data
    }

    /// Gradient with respect to this blob's data
    pub fn diff(&self) -> &Array1<f32> {
        &self.diff
    }

    pub fn diff_mut(&mut self) -> &mut Array1<f32> {
        &mut self.diff
    }
}
