//! Temperature-softened distribution for one side of the distillation pair

use crate::blob::Blob;
use crate::error::{Error, Result};
use crate::softmax::{AxisSoftmax, SoftmaxOp};

/// Which model a [`DistributionBranch`] belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Student,
    Teacher,
}

impl Role {
    pub fn logits_name(&self) -> &'static str {
        match self {
            Self::Student => "student logits",
            Self::Teacher => "teacher logits",
        }
    }
}

/// Owns the scaled logits `x / T` and the resulting `softmax(x / T)` for
/// one model. The loss holds one branch per side; the teacher branch is
/// never differentiated.
#[derive(Debug, Clone)]
pub struct DistributionBranch<S = AxisSoftmax> {
    role: Role,
    scaled: Blob,
    prob: Blob,
    softmax: S,
}

impl<S: SoftmaxOp> DistributionBranch<S> {
    pub fn new(role: Role, softmax: S) -> Self {
        Self {
            role,
            scaled: Blob::zeros(&[0]),
            prob: Blob::zeros(&[0]),
            softmax,
        }
    }

    /// Resize the scaled buffer and the probability blob to `input`'s shape
    pub fn reshape(&mut self, input: &Blob) -> Result<()> {
        self.scaled.reshape(input.shape());
        self.softmax.reshape(&self.scaled, &mut self.prob)
    }

    /// Recompute `softmax(input / temperature)`
    ///
    /// # Errors
    ///
    /// [`Error::ShapeMismatch`] if `input` no longer matches the shape
    /// this branch was last reshaped to.
    pub fn compute(&mut self, input: &Blob, temperature: f32) -> Result<()> {
        if input.shape() != self.scaled.shape() {
            return Err(Error::ShapeMismatch {
                what: self.role.logits_name(),
                expected: self.scaled.count(),
                got: input.count(),
            });
        }

        let inv_t = 1.0 / temperature;
        let scaled = self.scaled.data_mut();
        scaled.assign(input.data());
        scaled.mapv_inplace(|v| v * inv_t);

        self.softmax.forward(&self.scaled, &mut self.prob)
    }

    /// Output of the last [`compute`](Self::compute)
    pub fn probabilities(&self) -> &Blob {
        &self.prob
    }
}
