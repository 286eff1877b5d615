//! Loading loss configuration from YAML files

use super::schema::DistillConfig;
use crate::error::{Error, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Load and validate a loss configuration from a YAML file
///
/// # Example
///
/// ```no_run
/// use destilar::config::load_config;
///
/// let config = load_config("distill.yaml")?;
/// println!("T = {}", config.temperature());
/// # Ok::<(), destilar::Error>(())
/// ```
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<DistillConfig> {
    let path = path.as_ref();
    let yaml = fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!(
            "Failed to read config file {}: {}",
            path.display(),
            e
        ))
    })?;

    let config = DistillConfig::from_yaml_str(&yaml)?;
    info!(
        path = %path.display(),
        temperature = config.temperature(),
        normalization = %config.normalization(),
        ignore_label = ?config.ignore_label(),
        "Loaded distillation config"
    );
    Ok(config)
}
