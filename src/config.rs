use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::constants::DEFAULT_MAX_RECORD_BYTES;
use crate::error::{PackError, Result};

/// Store-wide settings, loadable from a JSON file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PackConfig {
    /// fsync the data and index files before a save returns.
    pub sync_writes: bool,
    /// Reject records whose blake3 digest does not match. When off, mismatches are only logged.
    pub verify_checksums: bool,
    /// Upper bound on the size of a single decoded record.
    pub max_record_bytes: u64,
}

impl Default for PackConfig {
    fn default() -> Self {
        Self {
            sync_writes: true,
            verify_checksums: true,
            max_record_bytes: DEFAULT_MAX_RECORD_BYTES,
        }
    }
}

impl PackConfig {
    /// Reads a JSON config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        let data = match std::fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => return Err(PackError::io_at(err, path)),
        };
        let config: Self = serde_json::from_str(&data).map_err(|err| PackError::Config {
            reason: format!("{}: {err}", path.display()),
        })?;
        if config.max_record_bytes == 0 {
            return Err(PackError::Config {
                reason: "max_record_bytes must be non-zero".into(),
            });
        }
        Ok(config)
    }
}
