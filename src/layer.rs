//! Host layer contract for loss layers

use crate::blob::Blob;
use crate::error::{Error, Result};

/// Loss layer driven by a host runtime
///
/// The host calls [`reshape`](LossLayer::reshape) whenever input shapes
/// change, then [`forward`](LossLayer::forward) and optionally
/// [`backward`](LossLayer::backward) once per training step.
pub trait LossLayer {
    /// Registered type name of the layer
    fn layer_type(&self) -> &'static str;

    fn min_bottom_blobs(&self) -> usize;

    fn max_bottom_blobs(&self) -> usize;

    /// Validate input shapes and resize internal buffers
    fn reshape(&mut self, bottom: &[Blob]) -> Result<()>;

    /// Compute the scalar loss
    fn forward(&mut self, bottom: &[Blob]) -> Result<f32>;

    /// Write input gradients into `bottom[..].diff_mut()`
    ///
    /// `top_diff` is the gradient of the objective with respect to the loss.
    fn backward(
        &mut self,
        top_diff: f32,
        propagate_down: &PropagateDown,
        bottom: &mut [Blob],
    ) -> Result<()>;

    /// Reject input counts outside `[min_bottom_blobs, max_bottom_blobs]`
    fn check_bottom_count(&self, got: usize) -> Result<()> {
        let (min, max) = (self.min_bottom_blobs(), self.max_bottom_blobs());
        if got < min || got > max {
            return Err(Error::BottomCount { min, max, got });
        }
        Ok(())
    }
}

/// Which inputs a backward pass should produce gradients for
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagateDown(Vec<bool>);

impl PropagateDown {
    pub fn new(flags: Vec<bool>) -> Self {
        Self(flags)
    }

    /// Request a gradient for the first input only
    pub fn first_of(num_inputs: usize) -> Self {
        Self((0..num_inputs).map(|i| i == 0).collect())
    }

    /// Whether input `index` needs a gradient; missing entries read as `false`
    pub fn get(&self, index: usize) -> bool {
        self.0.get(index).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<bool>> for PropagateDown {
    fn from(flags: Vec<bool>) -> Self {
        Self(flags)
    }
}
