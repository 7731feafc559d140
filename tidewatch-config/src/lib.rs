//! Host-side sensor configuration loader
//!
//! Reads a TOML file with one optional section per sensor family and runs
//! the configuration guard on each section before handing it out. Fields
//! left out of a section keep their defaults.
//!
//! ```toml
//! [ld2413]
//! min_distance_mm = 250
//! max_distance_mm = 8000
//! report_cycle_ms = 100
//!
//! [ld8001h]
//! modbus_address = 3
//! range_m = 20
//! installation_height_cm = 450
//! ```

use std::path::{Path, PathBuf};

use log::{debug, info};
use serde::Deserialize;
use thiserror::Error;
use tidewatch_core::config::{ConfigError, Ld2413Config, Ld8001hConfig, Validate};

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read configuration from {path:?}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration")]
    Parse(#[from] toml::de::Error),
    #[error("invalid [{section}] configuration: {reason}")]
    Invalid {
        section: &'static str,
        reason: ConfigError,
    },
    #[error("configuration defines no sensor sections")]
    Empty,
}

/// Parsed configuration file
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SensorsFile {
    pub ld2413: Option<Ld2413Config>,
    pub ld8001h: Option<Ld8001hConfig>,
}

impl SensorsFile {
    /// Run the configuration guard on every present section
    pub fn validate(&self) -> Result<(), LoadError> {
        if let Some(config) = &self.ld2413 {
            check("ld2413", config)?;
        }
        if let Some(config) = &self.ld8001h {
            check("ld8001h", config)?;
        }
        Ok(())
    }
}

fn check(section: &'static str, config: &impl Validate) -> Result<(), LoadError> {
    config
        .validate()
        .map_err(|reason| LoadError::Invalid { section, reason })
}

/// Parse and validate configuration text
pub fn load_str(text: &str) -> Result<SensorsFile, LoadError> {
    let file: SensorsFile = toml::from_str(text)?;

    if file.ld2413.is_none() && file.ld8001h.is_none() {
        return Err(LoadError::Empty);
    }
    file.validate()?;

    if let Some(config) = &file.ld2413 {
        info!(
            "ld2413: window {}..{} mm, report cycle {} ms",
            config.min_distance_mm, config.max_distance_mm, config.report_cycle_ms
        );
    }
    if let Some(config) = &file.ld8001h {
        info!(
            "ld8001h: address {}, range {} m",
            config.modbus_address, config.range_m
        );
    }
    Ok(file)
}

/// Read, parse and validate a configuration file
pub fn load_file(path: impl AsRef<Path>) -> Result<SensorsFile, LoadError> {
    let path = path.as_ref();
    debug!("loading sensor configuration from {}", path.display());
    let text = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_str(&text)
}
