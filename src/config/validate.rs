//! Configuration validation

use super::schema::DistillConfig;
use crate::error::{Error, Result};

/// Validate a loss configuration
///
/// Checks:
/// - temperature is finite and positive
/// - loss weight is finite
///
/// Axis and ignore-label consistency depend on the inputs and are checked
/// when the layer is reshaped.
pub fn validate_config(config: &DistillConfig) -> Result<()> {
    let temperature = config.temperature();
    if !temperature.is_finite() || temperature <= 0.0 {
        return Err(Error::InvalidTemperature(temperature));
    }

    if !config.loss_weight().is_finite() {
        return Err(Error::InvalidLossWeight(config.loss_weight()));
    }

    Ok(())
}
