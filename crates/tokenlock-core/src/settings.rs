use crate::error::{Error, Result};
use crate::paths::{DEFAULT_AUDIT_LOG_PATH, DEFAULT_KEYFILE_PATH};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_KEY_SIZE: usize = 2048;
pub const DEFAULT_AUDIT_LOG_MAX_BYTES: u64 = 5 * 1024 * 1024;

/// Runtime configuration handed to every component at construction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct KeySettings {
    /// Length in bytes of every issued secret and of the region read from a device.
    pub key_size: usize,
    pub keyfile: PathBuf,
    pub audit_log: PathBuf,
    pub audit_log_max_bytes: u64,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            key_size: DEFAULT_KEY_SIZE,
            keyfile: PathBuf::from(DEFAULT_KEYFILE_PATH),
            audit_log: PathBuf::from(DEFAULT_AUDIT_LOG_PATH),
            audit_log_max_bytes: DEFAULT_AUDIT_LOG_MAX_BYTES,
        }
    }
}

impl KeySettings {
    /// Read settings from a JSON file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("read {}: {e}", path.display())))?;
        let settings: KeySettings = serde_json::from_str(&data)
            .map_err(|e| Error::Config(format!("parse {}: {e}", path.display())))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Resolve and load settings; `None` yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::from_file(p),
            None => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.key_size == 0 {
            return Err(Error::Config("key_size must be greater than zero".into()));
        }
        if self.keyfile.as_os_str().is_empty() {
            return Err(Error::Config("keyfile path is empty".into()));
        }
        if self.audit_log.as_os_str().is_empty() {
            return Err(Error::Config("audit_log path is empty".into()));
        }
        Ok(())
    }

    /// Settings rooted in `dir`, used by tests and throwaway setups.
    pub fn in_dir(dir: &Path, key_size: usize) -> Self {
        Self {
            key_size,
            keyfile: dir.join("keyfile.json"),
            audit_log: dir.join("audit.log"),
            ..Self::default()
        }
    }
}
