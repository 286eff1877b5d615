//! Knowledge distillation loss layer

use super::branch::{DistributionBranch, Role};
use super::normalizer::normalizer;
use crate::blob::Blob;
use crate::config::{validate_config, DistillConfig};
use crate::error::{Error, Result};
use crate::layer::{LossLayer, PropagateDown};
use crate::softmax::{AxisSoftmax, SoftmaxOp};
use tracing::{debug, trace};

/// Floor applied to probabilities before taking logarithms
const PROB_FLOOR: f32 = f32::MIN_POSITIVE;

/// Resolved `outer × classes × inner` layout of the current inputs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    /// Class axis after resolving negative indices
    pub axis: usize,
    /// Product of dimensions before the class axis
    pub outer_num: usize,
    /// Size of the class axis
    pub num_classes: usize,
    /// Product of dimensions after the class axis
    pub inner_num: usize,
}

impl Geometry {
    fn positions(&self) -> usize {
        self.outer_num * self.inner_num
    }

    fn dim(&self) -> usize {
        self.num_classes * self.inner_num
    }
}

/// Knowledge Distillation Loss
///
/// Softens student and teacher logits with temperature `T` and measures
/// how far the student distribution `p` is from the teacher distribution `q`.
///
/// # Formula
///
/// ```text
/// p = softmax(student / T),  q = softmax(teacher / T)
/// L = -Σ q · log(p / q) / normalizer
/// ∂L/∂student = T · (p - q) · top_diff / normalizer
/// ```
///
/// The gradient carries the `T²` distillation factor (times `1/T` from the
/// chain rule through the scaling). Only the student receives a gradient.
///
/// Inputs are the student logits, the teacher logits and, optionally, a
/// label blob with one entry per `outer × inner` position. Positions whose
/// label equals the configured ignore label are excluded.
///
/// # Example
///
/// ```
/// use destilar::{Blob, DistillConfig, KnowledgeDistillationLoss, LossLayer, PropagateDown};
///
/// let mut bottom = vec![
///     Blob::from_shape_vec(&[1, 3], vec![1.0, 2.0, 3.0]).unwrap(),
///     Blob::from_shape_vec(&[1, 3], vec![3.0, 2.0, 1.0]).unwrap(),
/// ];
///
/// let mut loss_fn = KnowledgeDistillationLoss::setup(DistillConfig::new(1.0)).unwrap();
/// loss_fn.reshape(&bottom).unwrap();
/// let loss = loss_fn.forward(&bottom).unwrap();
/// assert!((loss - 1.150_420_9).abs() < 1e-5);
///
/// loss_fn.backward(1.0, &PropagateDown::first_of(2), &mut bottom).unwrap();
/// assert!((bottom[0].diff()[0] + 0.575_210_4).abs() < 1e-5);
/// ```
#[derive(Debug, Clone)]
pub struct KnowledgeDistillationLoss<S = AxisSoftmax> {
    config: DistillConfig,
    student: DistributionBranch<S>,
    teacher: DistributionBranch<S>,
    geometry: Option<Geometry>,
}

impl KnowledgeDistillationLoss<AxisSoftmax> {
    /// Create the loss with the built-in softmax over `config.axis()`
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration fails validation.
    pub fn setup(config: DistillConfig) -> Result<Self> {
        Self::with_softmax(config, AxisSoftmax::new(config.axis()))
    }
}

impl<S: SoftmaxOp + Clone> KnowledgeDistillationLoss<S> {
    /// Create the loss with a custom softmax operator
    ///
    /// `softmax` must normalize along `config.axis()`. Student and teacher
    /// each get their own copy.
    pub fn with_softmax(config: DistillConfig, softmax: S) -> Result<Self> {
        validate_config(&config)?;
        debug!(
            temperature = config.temperature(),
            normalization = %config.normalization(),
            ignore_label = ?config.ignore_label(),
            axis = config.axis(),
            "Setting up knowledge distillation loss"
        );
        Ok(Self {
            config,
            student: DistributionBranch::new(Role::Student, softmax.clone()),
            teacher: DistributionBranch::new(Role::Teacher, softmax),
            geometry: None,
        })
    }
}

impl<S: SoftmaxOp> KnowledgeDistillationLoss<S> {
    pub fn config(&self) -> &DistillConfig {
        &self.config
    }

    /// Layout resolved by the last successful reshape
    pub fn geometry(&self) -> Option<Geometry> {
        self.geometry
    }

    /// `softmax(student / T)` from the last forward pass
    pub fn student_probabilities(&self) -> &Blob {
        self.student.probabilities()
    }

    /// `softmax(teacher / T)` from the last forward pass
    pub fn teacher_probabilities(&self) -> &Blob {
        self.teacher.probabilities()
    }

    /// Divisor for the current geometry and configured normalization mode
    pub fn normalizer(&self, valid_count: Option<usize>) -> Result<f32> {
        let geometry = self.geometry.ok_or(Error::NotReshaped)?;
        Ok(normalizer(
            self.config.normalization(),
            geometry.outer_num,
            geometry.inner_num,
            valid_count,
        ))
    }

    /// Run reshape, forward and backward for one training step
    ///
    /// The backward pass is seeded with the configured loss weight, and the
    /// returned loss is scaled by it.
    pub fn step(&mut self, bottom: &mut [Blob], propagate_down: &PropagateDown) -> Result<f32> {
        self.reshape(bottom)?;
        let loss = self.forward(bottom)?;
        let loss_weight = self.config.loss_weight();
        self.backward(loss_weight, propagate_down, bottom)?;
        Ok(loss * loss_weight)
    }

    /// Label blob that takes part in masking, if any
    ///
    /// Re-checked on every pass: the label blob can change between
    /// `reshape` and `forward`/`backward`.
    fn checked_labels<'a>(
        &self,
        bottom: &'a [Blob],
        geometry: &Geometry,
    ) -> Result<Option<&'a Blob>> {
        let labels = bottom.get(2);
        let ignore_label_set = self.config.ignore_label().is_some();
        if labels.is_some() != ignore_label_set {
            return Err(Error::IgnoreLabelMismatch {
                labels_given: labels.is_some(),
                ignore_label_set,
            });
        }
        if let Some(labels) = labels {
            if labels.count() != geometry.positions() {
                return Err(Error::ShapeMismatch {
                    what: "label count",
                    expected: geometry.positions(),
                    got: labels.count(),
                });
            }
        }
        Ok(labels)
    }

    fn is_ignored(&self, labels: Option<&Blob>, index: usize) -> bool {
        match (labels, self.config.ignore_label()) {
            (Some(labels), Some(ignore_label)) => labels.data()[index] as i32 == ignore_label,
            _ => false,
        }
    }
}

impl<S: SoftmaxOp> LossLayer for KnowledgeDistillationLoss<S> {
    fn layer_type(&self) -> &'static str {
        "KnowledgeDistillation"
    }

    fn min_bottom_blobs(&self) -> usize {
        2
    }

    fn max_bottom_blobs(&self) -> usize {
        3
    }

    fn reshape(&mut self, bottom: &[Blob]) -> Result<()> {
        self.check_bottom_count(bottom.len())?;
        let (student, teacher) = (&bottom[0], &bottom[1]);

        let axis = student.canonical_axis_index(self.config.axis())?;
        let geometry = Geometry {
            axis,
            outer_num: student.count_range(0, axis),
            num_classes: student.shape_at(axis),
            inner_num: student.count_from(axis + 1),
        };
        self.checked_labels(bottom, &geometry)?;

        let teacher_axis = teacher.canonical_axis_index(self.config.axis())?;
        let checks = [
            (
                "outer dimensions of teacher logits",
                geometry.outer_num,
                teacher.count_range(0, teacher_axis),
            ),
            (
                "inner dimensions of teacher logits",
                geometry.inner_num,
                teacher.count_from(teacher_axis + 1),
            ),
            (
                "class dimension of teacher logits",
                geometry.num_classes,
                teacher.shape_at(teacher_axis),
            ),
        ];
        for (what, expected, got) in checks {
            if expected != got {
                return Err(Error::ShapeMismatch {
                    what,
                    expected,
                    got,
                });
            }
        }

        self.student.reshape(student)?;
        self.teacher.reshape(teacher)?;
        if self.geometry != Some(geometry) {
            debug!(
                outer_num = geometry.outer_num,
                num_classes = geometry.num_classes,
                inner_num = geometry.inner_num,
                axis = geometry.axis,
                "Reshaped knowledge distillation loss"
            );
        }
        self.geometry = Some(geometry);
        Ok(())
    }

    fn forward(&mut self, bottom: &[Blob]) -> Result<f32> {
        self.check_bottom_count(bottom.len())?;
        let geometry = self.geometry.ok_or(Error::NotReshaped)?;
        let labels = self.checked_labels(bottom, &geometry)?;
        let temperature = self.config.temperature();

        self.student.compute(&bottom[0], temperature)?;
        self.teacher.compute(&bottom[1], temperature)?;

        let prob = self.student.probabilities().data();
        let soft_label = self.teacher.probabilities().data();
        let dim = geometry.dim();
        let inner_num = geometry.inner_num;

        let mut loss = 0.0f32;
        let mut count = 0usize;
        for i in 0..geometry.outer_num {
            for j in 0..inner_num {
                if self.is_ignored(labels, i * inner_num + j) {
                    continue;
                }
                for c in 0..geometry.num_classes {
                    let pos = i * dim + c * inner_num + j;
                    let (p, q) = (prob[pos], soft_label[pos]);
                    loss -= q * (p.max(PROB_FLOOR).ln() - q.max(PROB_FLOOR).ln());
                }
                count += 1;
            }
        }

        if count == 0 && geometry.positions() > 0 {
            debug!(
                positions = geometry.positions(),
                "Every position carries the ignore label; loss is zero"
            );
        }

        let loss = loss / self.normalizer(Some(count))?;
        trace!(loss, valid = count, "Distillation forward");
        Ok(loss)
    }

    fn backward(
        &mut self,
        top_diff: f32,
        propagate_down: &PropagateDown,
        bottom: &mut [Blob],
    ) -> Result<()> {
        self.check_bottom_count(bottom.len())?;
        if propagate_down.get(1) {
            return Err(Error::UnsupportedGradientRequest {
                input: Role::Teacher.logits_name(),
            });
        }
        if bottom.len() == 3 && propagate_down.get(2) {
            return Err(Error::UnsupportedGradientRequest { input: "labels" });
        }
        if !propagate_down.get(0) {
            return Ok(());
        }

        let geometry = self.geometry.ok_or(Error::NotReshaped)?;
        self.checked_labels(bottom, &geometry)?;
        let temperature = self.config.temperature();
        let prob = self.student.probabilities();
        let soft_label = self.teacher.probabilities();

        let (student, rest) = bottom.split_at_mut(1);
        let student = &mut student[0];
        if student.shape() != prob.shape() {
            return Err(Error::ShapeMismatch {
                what: Role::Student.logits_name(),
                expected: prob.count(),
                got: student.count(),
            });
        }
        let labels = rest.get(1);

        // T * (p - q): T² from the distillation objective, 1/T from the scaling
        let diff = student.diff_mut();
        diff.assign(prob.data());
        diff.mapv_inplace(|v| v * temperature);
        diff.scaled_add(-temperature, soft_label.data());

        let dim = geometry.dim();
        let inner_num = geometry.inner_num;
        let mut count = geometry.positions();
        if labels.is_some() {
            count = 0;
            for i in 0..geometry.outer_num {
                for j in 0..inner_num {
                    if self.is_ignored(labels, i * inner_num + j) {
                        for c in 0..geometry.num_classes {
                            diff[i * dim + c * inner_num + j] = 0.0;
                        }
                    } else {
                        count += 1;
                    }
                }
            }
        }

        let loss_weight = top_diff / self.normalizer(Some(count))?;
        diff.mapv_inplace(|v| v * loss_weight);
        trace!(loss_weight, valid = count, "Distillation backward");
        Ok(())
    }
}
