//! Error types for destilar

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid temperature: {0} (must be finite and > 0.0)")]
    InvalidTemperature(f32),

    #[error("Invalid loss weight: {0} (must be finite)")]
    InvalidLossWeight(f32),

    #[error("Unknown normalization mode: {0} (must be one of: full, valid, batch_size, none)")]
    UnknownNormalization(String),

    #[error(
        "ignore_label is only valid when label inputs are given as the third input \
         (labels given: {labels_given}, ignore_label set: {ignore_label_set})"
    )]
    IgnoreLabelMismatch {
        labels_given: bool,
        ignore_label_set: bool,
    },

    #[error("Shape mismatch for {what}: expected {expected}, got {got}")]
    ShapeMismatch {
        what: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("Invalid blob shape {shape:?} for {len} elements")]
    InvalidShape { shape: Vec<usize>, len: usize },

    #[error("Axis {axis} out of range for a blob with {num_axes} axes")]
    AxisOutOfRange { axis: i32, num_axes: usize },

    #[error("Expected between {min} and {max} input blobs, got {got}")]
    BottomCount { min: usize, max: usize, got: usize },

    #[error("Cannot backpropagate to {input}: teacher logits and labels are constants")]
    UnsupportedGradientRequest { input: &'static str },

    #[error("Layer used before reshape")]
    NotReshaped,

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
