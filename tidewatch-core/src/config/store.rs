//! Persisted configuration
//!
//! Configurations are stored as postcard binary data behind a small
//! header. Loading checks the header and re-runs the configuration guard,
//! so a blob written by an older build with looser limits is refused
//! instead of arming a driver with bad values.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::types::{ConfigError, Validate};

/// Magic number identifying a stored configuration ("TDWC")
pub const STORE_MAGIC: u32 = 0x5444_5743;

/// Current stored format version
pub const STORE_VERSION: u8 = 1;

/// Buffer size that fits any stored configuration
pub const MAX_STORED_LEN: usize = 64;

/// Persistence errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum StoreError {
    /// Serialization failed (buffer too small)
    Serialize,
    /// Deserialization failed
    Deserialize,
    /// Invalid magic or version
    InvalidFormat,
    /// Stored values fail the guard
    Invalid(ConfigError),
}

impl From<ConfigError> for StoreError {
    fn from(e: ConfigError) -> Self {
        StoreError::Invalid(e)
    }
}

#[derive(Serialize)]
struct EnvelopeRef<'a, T> {
    magic: u32,
    version: u8,
    config: &'a T,
}

#[derive(Deserialize)]
struct Envelope<T> {
    magic: u32,
    version: u8,
    config: T,
}

/// Serialize a validated configuration into `buffer`
///
/// Returns the used part of the buffer.
pub fn save<'a, T>(config: &T, buffer: &'a mut [u8]) -> Result<&'a mut [u8], StoreError>
where
    T: Serialize + Validate,
{
    config.validate()?;

    let envelope = EnvelopeRef {
        magic: STORE_MAGIC,
        version: STORE_VERSION,
        config,
    };
    postcard::to_slice(&envelope, buffer).map_err(|_| StoreError::Serialize)
}

/// Deserialize and validate a stored configuration
pub fn load<T>(bytes: &[u8]) -> Result<T, StoreError>
where
    T: DeserializeOwned + Validate,
{
    let envelope: Envelope<T> =
        postcard::from_bytes(bytes).map_err(|_| StoreError::Deserialize)?;

    if envelope.magic != STORE_MAGIC || envelope.version != STORE_VERSION {
        return Err(StoreError::InvalidFormat);
    }

    envelope.config.validate()?;
    Ok(envelope.config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Ld2413Config, Ld8001hConfig};

    #[test]
    fn test_save_then_load() {
        let config = Ld8001hConfig {
            installation_height_cm: Some(250),
            water_level_readout: true,
            ..Default::default()
        };
        let mut buffer = [0u8; MAX_STORED_LEN];
        let used = save(&config, &mut buffer).unwrap().len();

        let loaded: Ld8001hConfig = load(&buffer[..used]).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_save_refuses_invalid() {
        let config = Ld2413Config {
            min_distance_mm: 5000,
            max_distance_mm: 1000,
            ..Default::default()
        };
        let mut buffer = [0u8; MAX_STORED_LEN];
        assert!(matches!(
            save(&config, &mut buffer),
            Err(StoreError::Invalid(ConfigError::DistanceBoundsInverted { .. }))
        ));
    }

    #[test]
    fn test_load_rejects_bad_magic() {
        let mut buffer = [0u8; MAX_STORED_LEN];
        let used = save(&Ld2413Config::default(), &mut buffer).unwrap().len();
        // Magic is the leading varint, flip a bit in it
        buffer[0] ^= 0x01;
        assert_eq!(
            load::<Ld2413Config>(&buffer[..used]),
            Err(StoreError::InvalidFormat)
        );
    }

    #[test]
    fn test_load_revalidates() {
        #[derive(Serialize)]
        struct Raw {
            magic: u32,
            version: u8,
            config: Ld2413Config,
        }
        let raw = Raw {
            magic: STORE_MAGIC,
            version: STORE_VERSION,
            config: Ld2413Config {
                report_cycle_ms: 10,
                ..Default::default()
            },
        };
        let mut buffer = [0u8; MAX_STORED_LEN];
        let used = postcard::to_slice(&raw, &mut buffer).unwrap().len();

        assert_eq!(
            load::<Ld2413Config>(&buffer[..used]),
            Err(StoreError::Invalid(ConfigError::ReportCycleOutOfRange {
                cycle_ms: 10
            }))
        );
    }

    #[test]
    fn test_load_truncated() {
        let mut buffer = [0u8; MAX_STORED_LEN];
        let used = save(&Ld2413Config::default(), &mut buffer).unwrap().len();
        assert_eq!(
            load::<Ld2413Config>(&buffer[..used - 1]),
            Err(StoreError::Deserialize)
        );
    }
}
