//! Error types for tokenlock.

use std::io;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    // ── Storage ─────────────────────────────────────────────────────────────
    #[error("storage error at {path}: {reason}")]
    Storage { path: PathBuf, reason: String },

    #[error("no key stored for identity {0}")]
    IdentityNotFound(String),

    // ── Device I/O ──────────────────────────────────────────────────────────
    #[error("device {0} not present")]
    DeviceNotPresent(PathBuf),

    #[error("device {device}: short read, expected {expected} bytes, got {actual}")]
    DeviceShortRead {
        device: PathBuf,
        expected: usize,
        actual: usize,
    },

    #[error("device {device}: {source}")]
    DeviceIo {
        device: PathBuf,
        #[source]
        source: io::Error,
    },

    // ── Unlock security checks ──────────────────────────────────────────────
    #[error("key device {device} could not be read: {reason}")]
    DeviceNotFound { device: PathBuf, reason: String },

    #[error("no stored key matches device {0}")]
    NoKeyFound(PathBuf),

    #[error("expected exactly one active session, found {0}")]
    UnexpectedSessionCount(usize),

    #[error("key belongs to {key_owner} but the active session belongs to {session_owner}")]
    IdentityMismatch {
        key_owner: String,
        session_owner: String,
    },

    #[error("active session for {0} has an empty session id")]
    InvalidSession(String),

    // ── Collaborators ───────────────────────────────────────────────────────
    #[error("device {device} is not safe to overwrite: {reason}")]
    UnsafeDevice { device: PathBuf, reason: String },

    #[error("block device inventory: {0}")]
    Inventory(String),

    #[error("session manager: {0}")]
    Session(String),

    // ── Configuration ───────────────────────────────────────────────────────
    #[error("configuration: {0}")]
    Config(String),

    #[error("invalid identity {0:?}")]
    InvalidIdentity(String),
}

impl Error {
    pub(crate) fn storage(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Storage {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    /// Errors on the unlock path that must be recorded in the audit log.
    pub fn is_security_event(&self) -> bool {
        matches!(
            self,
            Error::DeviceNotFound { .. }
                | Error::NoKeyFound(_)
                | Error::UnexpectedSessionCount(_)
                | Error::IdentityMismatch { .. }
                | Error::InvalidSession(_)
                | Error::UnsafeDevice { .. }
        )
    }

    /// Stable identifier used as the `reason` field of audit entries.
    pub fn code(&self) -> &'static str {
        match self {
            Error::Storage { .. } => "STORAGE_ERROR",
            Error::IdentityNotFound(_) => "NOT_FOUND",
            Error::DeviceNotPresent(_) => "DEVICE_NOT_PRESENT",
            Error::DeviceShortRead { .. } => "DEVICE_SHORT_READ",
            Error::DeviceIo { .. } => "DEVICE_IO_ERROR",
            Error::DeviceNotFound { .. } => "DEVICE_NOT_FOUND",
            Error::NoKeyFound(_) => "NO_KEY_FOUND",
            Error::UnexpectedSessionCount(_) => "UNEXPECTED_SESSION_COUNT",
            Error::IdentityMismatch { .. } => "IDENTITY_MISMATCH",
            Error::InvalidSession(_) => "INVALID_SESSION",
            Error::UnsafeDevice { .. } => "UNSAFE_DEVICE",
            Error::Inventory(_) => "INVENTORY_ERROR",
            Error::Session(_) => "SESSION_ERROR",
            Error::Config(_) => "CONFIG_ERROR",
            Error::InvalidIdentity(_) => "INVALID_IDENTITY",
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
