//! Configuration types for the distillation loss

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// How the summed loss is divided before it is reported
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum NormalizationMode {
    /// Divide by `outer_num * inner_num`
    Full,
    /// Divide by the number of positions not marked with the ignore label
    #[default]
    Valid,
    /// Divide by `outer_num`
    BatchSize,
    /// Report the plain sum
    None,
}

impl NormalizationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Full => "FULL",
            Self::Valid => "VALID",
            Self::BatchSize => "BATCH_SIZE",
            Self::None => "NONE",
        }
    }
}

impl fmt::Display for NormalizationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for NormalizationMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "full" => Ok(Self::Full),
            "valid" => Ok(Self::Valid),
            "batch_size" => Ok(Self::BatchSize),
            "none" => Ok(Self::None),
            _ => Err(Error::UnknownNormalization(s.to_string())),
        }
    }
}

/// Raw YAML form of the loss configuration
///
/// ```yaml
/// temperature: 4.0
/// ignore_label: -1
/// normalization: valid
/// axis: 1
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DistillSpec {
    /// Divisor applied to both logit tensors before softmax
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Label value whose positions are excluded from loss and gradient
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignore_label: Option<i32>,

    /// Normalization mode name: "full" | "valid" | "batch_size" | "none"
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalization: Option<String>,

    /// Legacy switch, consulted only when `normalization` is absent:
    /// `true` selects VALID, `false` selects BATCH_SIZE
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub normalize: Option<bool>,

    /// Class axis; negative values count from the last axis
    #[serde(default = "default_axis")]
    pub axis: i32,

    /// Gradient seed used by `KnowledgeDistillationLoss::step`
    #[serde(default = "default_loss_weight")]
    pub loss_weight: f32,
}

fn default_temperature() -> f32 {
    1.0
}

fn default_axis() -> i32 {
    1
}

fn default_loss_weight() -> f32 {
    1.0
}

impl Default for DistillSpec {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            ignore_label: None,
            normalization: None,
            normalize: None,
            axis: default_axis(),
            loss_weight: default_loss_weight(),
        }
    }
}

impl DistillSpec {
    /// Resolve the effective normalization mode
    pub fn normalization_mode(&self) -> Result<NormalizationMode> {
        match (&self.normalization, self.normalize) {
            (Some(name), _) => name.parse(),
            (None, Some(true)) => Ok(NormalizationMode::Valid),
            (None, Some(false)) => Ok(NormalizationMode::BatchSize),
            (None, None) => Ok(NormalizationMode::default()),
        }
    }
}

/// Validated, immutable loss configuration
///
/// # Example
///
/// ```
/// use destilar::{DistillConfig, NormalizationMode};
///
/// let config = DistillConfig::new(4.0)
///     .with_ignore_label(-1)
///     .with_normalization(NormalizationMode::BatchSize);
///
/// assert_eq!(config.temperature(), 4.0);
/// assert_eq!(config.ignore_label(), Some(-1));
/// ```
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DistillConfig {
    temperature: f32,
    ignore_label: Option<i32>,
    normalization: NormalizationMode,
    axis: i32,
    loss_weight: f32,
}

impl Default for DistillConfig {
    fn default() -> Self {
        Self::new(default_temperature())
    }
}

impl DistillConfig {
    /// Configuration with the given temperature and defaults elsewhere
    /// (no ignore label, VALID normalization, axis 1, loss weight 1)
    pub fn new(temperature: f32) -> Self {
        Self {
            temperature,
            ignore_label: None,
            normalization: NormalizationMode::default(),
            axis: default_axis(),
            loss_weight: default_loss_weight(),
        }
    }

    pub fn with_ignore_label(mut self, label: i32) -> Self {
        self.ignore_label = Some(label);
        self
    }

    pub fn with_normalization(mut self, mode: NormalizationMode) -> Self {
        self.normalization = mode;
        self
    }

    pub fn with_axis(mut self, axis: i32) -> Self {
        self.axis = axis;
        self
    }

    pub fn with_loss_weight(mut self, loss_weight: f32) -> Self {
        self.loss_weight = loss_weight;
        self
    }

    pub fn temperature(&self) -> f32 {
        self.temperature
    }

    pub fn ignore_label(&self) -> Option<i32> {
        self.ignore_label
    }

    pub fn normalization(&self) -> NormalizationMode {
        self.normalization
    }

    pub fn axis(&self) -> i32 {
        self.axis
    }

    pub fn loss_weight(&self) -> f32 {
        self.loss_weight
    }

    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let spec: DistillSpec = serde_yaml::from_str(yaml)
            .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))?;
        Self::try_from(spec)
    }

    /// Raw form suitable for serialization
    pub fn to_spec(&self) -> DistillSpec {
        DistillSpec {
            temperature: self.temperature,
            ignore_label: self.ignore_label,
            normalization: Some(self.normalization.as_str().to_ascii_lowercase()),
            normalize: None,
            axis: self.axis,
            loss_weight: self.loss_weight,
        }
    }
}

impl TryFrom<DistillSpec> for DistillConfig {
    type Error = Error;

    fn try_from(spec: DistillSpec) -> Result<Self> {
        let config = Self {
            temperature: spec.temperature,
            ignore_label: spec.ignore_label,
            normalization: spec.normalization_mode()?,
            axis: spec.axis,
            loss_weight: spec.loss_weight,
        };
        super::validate_config(&config)?;
        Ok(config)
    }
}
