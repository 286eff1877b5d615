//! # Destilar: Knowledge-Distillation Loss
//!
//! Destilar computes the temperature-scaled KL divergence between a student
//! and a teacher model's class distributions, together with the gradient
//! for the student logits, so the student can be trained to mimic the teacher.
//!
//! ## Architecture
//!
//! - **blob**: Shaped storage with data and gradient views
//! - **softmax**: Axis softmax operator
//! - **layer**: Loss layer contract (reshape / forward / backward)
//! - **config**: Declarative YAML configuration
//! - **distill**: Normalizer, per-model distributions, and the loss itself

pub mod blob;
pub mod config;
pub mod distill;
pub mod layer;
pub mod softmax;

pub mod error;

// Re-export commonly used types
pub use blob::Blob;
pub use config::{DistillConfig, NormalizationMode};
pub use distill::KnowledgeDistillationLoss;
pub use error::{Error, Result};
pub use layer::{LossLayer, PropagateDown};
pub use softmax::{AxisSoftmax, SoftmaxOp};
