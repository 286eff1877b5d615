//! Declarative YAML configuration
//!
//! # Example
//!
//! ```yaml
//! temperature: 4.0
//! ignore_label: -1
//! normalization: valid
//! axis: 1
//! loss_weight: 1.0
//! ```
//!
//! The legacy `normalize: true|false` switch is honoured when
//! `normalization` is absent.

mod load;
mod schema;
mod validate;


pub use load::load_config;
pub use schema::{DistillConfig, DistillSpec, NormalizationMode};
pub use validate::validate_config;
