use std::path::PathBuf;

pub const CONFIG_ENV: &str = "TOKENLOCK_CONFIG";

pub const DEFAULT_CONFIG_PATH: &str = "/etc/tokenlock/config.json";
pub const DEFAULT_KEYFILE_PATH: &str = "/etc/tokenlock/keyfile.json";
pub const DEFAULT_AUDIT_LOG_PATH: &str = "/var/log/tokenlock/audit.log";

/// Configuration file to read, if any.
///
/// An explicit path wins, then `TOKENLOCK_CONFIG`, then the system-wide file
/// when it exists. `None` means built-in defaults.
pub fn config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path);
    }
    if let Ok(override_path) = std::env::var(CONFIG_ENV) {
        if !override_path.is_empty() {
            return Some(PathBuf::from(override_path));
        }
    }
    let system = PathBuf::from(DEFAULT_CONFIG_PATH);
    if system.exists() {
        Some(system)
    } else {
        None
    }
}
