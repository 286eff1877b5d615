//! Knowledge Distillation
//!
//! Temperature-scaled KL divergence between a student and a teacher
//! distribution, with a gradient for the student logits only.
//!
//! ## Components
//!
//! - **normalizer**: divisor selection for the configured normalization mode
//! - **branch**: per-model `softmax(logits / T)` buffers
//! - **loss**: the forward (loss) and backward (student gradient) passes
//!
//! ## Example
//!
//! ```
//! use destilar::{Blob, DistillConfig, KnowledgeDistillationLoss, PropagateDown};
//!
//! let config = DistillConfig::new(2.0).with_ignore_label(-1);
//! let mut loss_fn = KnowledgeDistillationLoss::setup(config).unwrap();
//!
//! let mut bottom = vec![
//!     Blob::from_shape_vec(&[2, 3], vec![1.0, 2.0, 1.5, 0.0, 0.0, 0.0]).unwrap(),
//!     Blob::from_shape_vec(&[2, 3], vec![1.2, 1.8, 1.6, 3.0, 1.0, 0.0]).unwrap(),
//!     Blob::from_shape_vec(&[2], vec![1.0, -1.0]).unwrap(),
//! ];
//! let loss = loss_fn.step(&mut bottom, &PropagateDown::first_of(3)).unwrap();
//! assert!(loss > 0.0);
//! assert!(bottom[0].diff().iter().skip(3).all(|&g| g == 0.0));
//! ```

mod branch;
mod loss;
mod normalizer;


pub use branch::{DistributionBranch, Role};
pub use loss::{Geometry, KnowledgeDistillationLoss};
pub use normalizer::normalizer;
