//! Softmax along one axis of a [`Blob`]

use crate::blob::Blob;
use crate::error::{Error, Result};

/// Maps a logit blob to a probability blob of the same shape.
pub trait SoftmaxOp {
    /// Prepare `output` (and any cached geometry) for `input`'s shape
    fn reshape(&mut self, input: &Blob, output: &mut Blob) -> Result<()>;

    /// Write `softmax(input)` into `output`
    fn forward(&self, input: &Blob, output: &mut Blob) -> Result<()>;
}

/// Numerically stable softmax over a configurable axis
///
/// softmax(x)_c = exp(x_c - max(x)) / Σ exp(x_k - max(x))
///
/// # Example
///
/// ```
/// use destilar::{AxisSoftmax, Blob, SoftmaxOp};
///
/// let logits = Blob::from_shape_vec(&[1, 3], vec![1.0, 2.0, 3.0]).unwrap();
/// let mut probs = Blob::zeros(&[1]);
/// let mut softmax = AxisSoftmax::new(1);
/// softmax.reshape(&logits, &mut probs).unwrap();
/// softmax.forward(&logits, &mut probs).unwrap();
///
/// let sum: f32 = probs.data().sum();
/// assert!((sum - 1.0).abs() < 1e-6);
/// ```
#[derive(Debug, Clone)]
pub struct AxisSoftmax {
    axis: i32,
    geometry: Option<(usize, usize, usize)>,
}

impl AxisSoftmax {
    /// Create a softmax over `axis` (negative values count from the last axis)
    pub fn new(axis: i32) -> Self {
        Self {
            axis,
            geometry: None,
        }
    }

    pub fn axis(&self) -> i32 {
        self.axis
    }
}

impl SoftmaxOp for AxisSoftmax {
    fn reshape(&mut self, input: &Blob, output: &mut Blob) -> Result<()> {
        let axis = input.canonical_axis_index(self.axis)?;
        self.geometry = Some((
            input.count_range(0, axis),
            input.shape_at(axis),
            input.count_from(axis + 1),
        ));
        output.reshape(input.shape());
        Ok(())
    }

    fn forward(&self, input: &Blob, output: &mut Blob) -> Result<()> {
        let (outer, channels, inner) = self.geometry.ok_or(Error::NotReshaped)?;
        let expected = outer * channels * inner;
        for (what, got) in [("softmax input", input.count()), ("softmax output", output.count())] {
            if got != expected {
                return Err(Error::ShapeMismatch {
                    what,
                    expected,
                    got,
                });
            }
        }

        let x = input.data();
        let y = output.data_mut();
        let dim = channels * inner;
        for i in 0..outer {
            for j in 0..inner {
                let base = i * dim + j;
                let max_val = (0..channels)
                    .map(|c| x[base + c * inner])
                    .fold(f32::NEG_INFINITY, f32::max);

                let mut sum = 0.0;
                for c in 0..channels {
                    let e = (x[base + c * inner] - max_val).exp();
                    y[base + c * inner] = e;
                    sum += e;
                }
                for c in 0..channels {
                    y[base + c * inner] /= sum;
                }
            }
        }
        Ok(())
    }
}
