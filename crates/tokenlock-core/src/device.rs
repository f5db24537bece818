//! Raw key region at the start of a block device.
//!
//! The first `key_size` bytes of the device are the secret: no header, no
//! checksum. Handles are opened per call and closed on return.

use crate::crypto::Secret;
use crate::error::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{ErrorKind, Read, Write};
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Copy)]
pub struct DeviceKeyCodec {
    key_size: usize,
}

impl DeviceKeyCodec {
    pub fn new(key_size: usize) -> Self {
        Self { key_size }
    }

    pub fn key_size(&self) -> usize {
        self.key_size
    }

    /// Overwrite the leading bytes of `device` with `secret`.
    ///
    /// Destroys whatever was stored there. The caller must have checked
    /// that the device is safe to overwrite.
    pub fn write(&self, device: &Path, secret: &Secret) -> Result<()> {
        let mut file = open_for_write(device)?;
        file.write_all(secret.as_bytes())
            .and_then(|_| file.flush())
            .and_then(|_| file.sync_all())
            .map_err(|e| device_error(device, e))?;
        debug!(device = %device.display(), bytes = secret.len(), "key written to device");
        Ok(())
    }

    /// Read exactly `key_size` bytes from the start of `device`.
    pub fn read(&self, device: &Path) -> Result<Secret> {
        let file = File::open(device).map_err(|e| device_error(device, e))?;
        let mut buf = Vec::with_capacity(self.key_size);
        file.take(self.key_size as u64)
            .read_to_end(&mut buf)
            .map_err(|e| device_error(device, e))?;
        let secret = Secret::from_bytes(buf);
        if secret.len() < self.key_size {
            return Err(Error::DeviceShortRead {
                device: device.to_path_buf(),
                expected: self.key_size,
                actual: secret.len(),
            });
        }
        Ok(secret)
    }
}

fn open_for_write(device: &Path) -> Result<File> {
    let mut opts = OpenOptions::new();
    opts.write(true).create(false).truncate(false);
    // O_EXCL on a block device fails while the kernel holds it (mounted).
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        opts.custom_flags(libc::O_EXCL);
    }
    opts.open(device).map_err(|e| device_error(device, e))
}

fn device_error(device: &Path, e: std::io::Error) -> Error {
    if e.kind() == ErrorKind::NotFound {
        Error::DeviceNotPresent(device.to_path_buf())
    } else {
        Error::DeviceIo {
            device: device.to_path_buf(),
            source: e,
        }
    }
}
